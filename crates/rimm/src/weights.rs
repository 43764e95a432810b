//! # Weight Maps
//!
//! A [`WeightMap`] is the raw input of the pipeline: an insertion-ordered
//! map from dotted parameter paths (``encoder.blocks.0.conv.weight``) to
//! [`TensorData`].
//!
//! The inspection helpers here are the shape-inference vocabulary shared by
//! every architecture detector:
//!
//! * [`WeightMap::shape_of_rank`] - the shape at a key, if it has the expected rank.
//! * [`WeightMap::dim`] - a single dimension at a key.
//! * [`WeightMap::seq_len`] - the length of a ``{prefix}.{i}.`` sequence.
//! * [`WeightMap::top_level_names`] - structural markers.

use burn::tensor::TensorData;
use indexmap::IndexMap;
use indexmap::map::{IntoIter, Iter, Keys};
use std::collections::BTreeSet;

/// An insertion-ordered map of parameter names to tensors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightMap {
    entries: IndexMap<String, TensorData>,
}

impl WeightMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the map empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a tensor; returns the previous tensor under the key, if any.
    ///
    /// Replacing a key keeps its original position.
    pub fn insert<K: Into<String>>(
        &mut self,
        key: K,
        data: TensorData,
    ) -> Option<TensorData> {
        self.entries.insert(key.into(), data)
    }

    /// Builder-style [`WeightMap::insert`].
    pub fn with<K: Into<String>>(
        mut self,
        key: K,
        data: TensorData,
    ) -> Self {
        self.insert(key, data);
        self
    }

    /// Remove a tensor, preserving the order of the remaining keys.
    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<TensorData> {
        self.entries.shift_remove(key)
    }

    /// Get the tensor at a key.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&TensorData> {
        self.entries.get(key)
    }

    /// Does the map contain the key?
    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.entries.contains_key(key)
    }

    /// Does the map contain every key?
    pub fn contains_all<I, S>(
        &self,
        keys: I,
    ) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter().all(|k| self.contains_key(k.as_ref()))
    }

    /// Keys, in insertion order.
    pub fn keys(&self) -> Keys<'_, String, TensorData> {
        self.entries.keys()
    }

    /// Entries, in insertion order.
    pub fn iter(&self) -> Iter<'_, String, TensorData> {
        self.entries.iter()
    }

    /// The shape at a key.
    pub fn shape(
        &self,
        key: &str,
    ) -> Option<&[usize]> {
        self.get(key).map(|data| data.shape.as_slice())
    }

    /// The shape at a key, if the tensor has exactly `rank` dimensions.
    pub fn shape_of_rank(
        &self,
        key: &str,
        rank: usize,
    ) -> Option<&[usize]> {
        self.shape(key).filter(|shape| shape.len() == rank)
    }

    /// A single dimension of the tensor at a key.
    pub fn dim(
        &self,
        key: &str,
        axis: usize,
    ) -> Option<usize> {
        self.shape(key).and_then(|shape| shape.get(axis).copied())
    }

    /// Does any key start with ``{prefix}``?
    pub fn has_prefix(
        &self,
        prefix: &str,
    ) -> bool {
        self.keys().any(|k| k.starts_with(prefix))
    }

    /// The length of the sequence ``{prefix}.{i}.*``.
    ///
    /// This is ``max(i) + 1`` over every key of the form ``{prefix}.{i}.{rest}``,
    /// or `0` when there are no such keys. Gaps in the sequence (index
    /// positions holding parameter-free modules) are counted.
    pub fn seq_len(
        &self,
        prefix: &str,
    ) -> usize {
        let lead = format!("{prefix}.");
        self.keys()
            .filter_map(|k| k.strip_prefix(&lead))
            .filter_map(|rest| {
                let (index, tail) = rest.split_once('.')?;
                if tail.is_empty() {
                    return None;
                }
                index.parse::<usize>().ok()
            })
            .max()
            .map_or(0, |i| i + 1)
    }

    /// The set of first path components across all keys.
    pub fn top_level_names(&self) -> BTreeSet<&str> {
        self.keys()
            .map(|k| k.split_once('.').map_or(k.as_str(), |(head, _)| head))
            .collect()
    }

    /// The sub-map under ``{prefix}``, with the prefix removed from its keys.
    ///
    /// Returns `None` if no key has the prefix.
    pub fn select_prefix(
        &self,
        prefix: &str,
    ) -> Option<WeightMap> {
        let entries: IndexMap<String, TensorData> = self
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect();

        if entries.is_empty() {
            None
        } else {
            Some(WeightMap { entries })
        }
    }

    /// Remove ``{prefix}`` from every key, if every key has it.
    ///
    /// Otherwise the map is returned unchanged.
    pub fn strip_common_prefix(
        self,
        prefix: &str,
    ) -> Self {
        let shared = !self.is_empty()
            && self
                .keys()
                .all(|k| k.len() > prefix.len() && k.starts_with(prefix));
        if !shared {
            return self;
        }
        WeightMap {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (k[prefix.len()..].to_string(), v))
                .collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, TensorData)> for WeightMap {
    fn from_iter<T: IntoIterator<Item = (K, TensorData)>>(iter: T) -> Self {
        WeightMap {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for WeightMap {
    type Item = (String, TensorData);
    type IntoIter = IntoIter<String, TensorData>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a WeightMap {
    type Item = (&'a String, &'a TensorData);
    type IntoIter = Iter<'a, String, TensorData>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamcrest::prelude::*;

    fn zeros(shape: &[usize]) -> TensorData {
        TensorData::zeros::<f32, _>(shape.to_vec())
    }

    fn sample() -> WeightMap {
        WeightMap::new()
            .with("body.0.weight", zeros(&[8, 3, 3, 3]))
            .with("body.0.bias", zeros(&[8]))
            .with("body.1.weight", zeros(&[8]))
            .with("body.4.weight", zeros(&[12, 8, 3, 3]))
            .with("head.weight", zeros(&[2, 12]))
    }

    #[test]
    fn test_insertion_order() {
        let weights = sample();
        let keys: Vec<&str> = weights.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "body.0.weight",
                "body.0.bias",
                "body.1.weight",
                "body.4.weight",
                "head.weight"
            ]
        );
    }

    #[test]
    fn test_shape_queries() {
        let weights = sample();
        assert_eq!(weights.shape("body.0.weight"), Some(&[8, 3, 3, 3][..]));
        assert_eq!(weights.shape_of_rank("body.0.weight", 4), Some(&[8, 3, 3, 3][..]));
        assert_eq!(weights.shape_of_rank("body.0.weight", 2), None);
        assert_eq!(weights.shape("nope"), None);
        assert_eq!(weights.dim("head.weight", 1), Some(12));
        assert_eq!(weights.dim("head.weight", 2), None);
        assert!(weights.contains_all(["body.0.weight", "head.weight"]));
        assert!(!weights.contains_all(["body.0.weight", "tail.weight"]));
    }

    #[test]
    fn test_seq_len() {
        let weights = sample();
        assert_eq!(weights.seq_len("body"), 5);
        assert_eq!(weights.seq_len("head"), 0);
        assert_eq!(weights.seq_len("missing"), 0);
        assert_eq!(weights.seq_len("bod"), 0);
    }

    #[test]
    fn test_top_level_names() {
        let weights = sample();
        let names: Vec<&str> = weights.top_level_names().into_iter().collect();
        assert_that!(&names, contains(vec!["body", "head"]).exactly());
    }

    #[test]
    fn test_select_prefix() {
        let weights = WeightMap::new()
            .with("params_ema.conv.weight", zeros(&[1, 1, 1, 1]))
            .with("params.conv.weight", zeros(&[2, 1, 1, 1]));

        let selected = weights.select_prefix("params_ema.").unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.shape("conv.weight"), Some(&[1, 1, 1, 1][..]));

        assert!(weights.select_prefix("state_dict.").is_none());
    }

    #[test]
    fn test_strip_common_prefix() {
        let weights = WeightMap::new()
            .with("module.conv.weight", zeros(&[1, 1, 1, 1]))
            .with("module.conv.bias", zeros(&[1]));
        let stripped = weights.strip_common_prefix("module.");
        assert!(stripped.contains_all(["conv.weight", "conv.bias"]));

        let mixed = WeightMap::new()
            .with("module.conv.weight", zeros(&[1, 1, 1, 1]))
            .with("conv.bias", zeros(&[1]));
        let unchanged = mixed.clone().strip_common_prefix("module.");
        assert_eq!(unchanged, mixed);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut weights = sample();
        assert!(weights.remove("body.0.bias").is_some());
        assert!(weights.remove("body.0.bias").is_none());
        let keys: Vec<&str> = weights.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys[..2], ["body.0.weight", "body.1.weight"]);
    }
}
