//! # Network Layouts
//!
//! [`NetworkLayout`] is the backend-free result of constructing an architecture:
//! the ordered set of parameter keys, with shape and storage kind.
//!
//! Layouts are assembled through a [`LayoutBuilder`], by walking nested
//! [`LayoutScope`]s and declaring layers into them:
//!
//! ```rust
//! use burn::nn::conv::Conv2dConfig;
//! use rimm::network::LayoutBuilder;
//!
//! let mut builder = LayoutBuilder::new("Tiny");
//! {
//!     let mut root = builder.root();
//!     root.layer("head", &Conv2dConfig::new([3, 8], [3, 3]));
//!     root.child("tail").param("scale", [8]);
//! }
//! let layout = builder.build().unwrap();
//! assert_eq!(layout.shape("head.weight"), Some(&[8, 3, 3, 3][..]));
//! assert_eq!(layout.shape("tail.scale"), Some(&[8][..]));
//! ```

use crate::errors::{LoadError, ShapeMismatch};
use crate::layers::ParamLayout;
use crate::weights::WeightMap;
use burn::tensor::DType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// How a declared tensor is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// A learned floating point parameter.
    Parameter,

    /// A floating point buffer (running statistics, masks).
    Buffer,

    /// An integer buffer (counters, index tables).
    IndexBuffer,
}

impl ParamKind {
    /// The dtype used when serializing a tensor of this kind.
    pub fn dtype(&self) -> DType {
        match self {
            ParamKind::Parameter | ParamKind::Buffer => DType::F32,
            ParamKind::IndexBuffer => DType::I64,
        }
    }
}

/// A declared tensor: shape and storage kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// The shape; may be empty for scalars.
    pub shape: Vec<usize>,

    /// The storage kind.
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// The full parameter layout of a constructed network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLayout {
    name: String,
    params: IndexMap<String, ParamSpec>,
}

impl NetworkLayout {
    /// The network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared tensors.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Is the layout empty?
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of declared elements.
    pub fn num_elements(&self) -> usize {
        self.params.values().map(|p| p.num_elements()).sum()
    }

    /// The declared spec for a key.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&ParamSpec> {
        self.params.get(key)
    }

    /// The declared shape for a key.
    pub fn shape(
        &self,
        key: &str,
    ) -> Option<&[usize]> {
        self.get(key).map(|p| p.shape.as_slice())
    }

    /// Iterate over `(key, spec)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Does the weight map have exactly these keys and shapes?
    pub fn matches(
        &self,
        weights: &WeightMap,
    ) -> bool {
        weights.len() == self.len()
            && self
                .iter()
                .all(|(key, spec)| weights.shape(key) == Some(spec.shape.as_slice()))
    }

    /// Check a weight map against the layout.
    ///
    /// Missing and mis-shaped keys are reported first, as
    /// [`LoadError::WeightShapeMismatch`]; then keys the layout does not
    /// declare, as [`LoadError::UnexpectedWeightKeys`].
    pub fn check(
        &self,
        weights: &WeightMap,
    ) -> Result<(), LoadError> {
        let mismatches: Vec<ShapeMismatch> = self
            .iter()
            .filter_map(|(key, spec)| match weights.shape(key) {
                None => Some(ShapeMismatch::Missing {
                    key: key.to_string(),
                    expected: spec.shape.clone(),
                }),
                Some(actual) if actual != spec.shape.as_slice() => Some(ShapeMismatch::Shape {
                    key: key.to_string(),
                    expected: spec.shape.clone(),
                    actual: actual.to_vec(),
                }),
                Some(_) => None,
            })
            .collect();
        if !mismatches.is_empty() {
            return Err(LoadError::WeightShapeMismatch {
                architecture: self.name.clone(),
                mismatches,
            });
        }

        let unexpected: Vec<String> = weights
            .keys()
            .filter(|k| !self.params.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(LoadError::UnexpectedWeightKeys {
                architecture: self.name.clone(),
                keys: unexpected,
            });
        }

        Ok(())
    }
}

/// Incremental [`NetworkLayout`] builder.
///
/// Declaration problems (duplicate keys, zero-sized dimensions) are collected
/// and reported by [`LayoutBuilder::build`].
#[derive(Debug)]
pub struct LayoutBuilder {
    name: String,
    params: IndexMap<String, ParamSpec>,
    problems: Vec<String>,
}

impl LayoutBuilder {
    /// Create a builder for a named network.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            params: IndexMap::new(),
            problems: Vec::new(),
        }
    }

    /// The root scope.
    pub fn root(&mut self) -> LayoutScope<'_> {
        LayoutScope {
            builder: self,
            prefix: String::new(),
        }
    }

    fn declare(
        &mut self,
        key: String,
        spec: ParamSpec,
    ) {
        if spec.shape.contains(&0) {
            self.problems
                .push(format!("\"{key}\" has a zero-sized dimension: {:?}", spec.shape));
        }
        if self.params.contains_key(&key) {
            self.problems.push(format!("\"{key}\" is declared twice"));
            return;
        }
        self.params.insert(key, spec);
    }

    /// Finish the layout.
    pub fn build(self) -> Result<NetworkLayout, LoadError> {
        if !self.problems.is_empty() {
            return Err(LoadError::invalid_config(
                &self.name,
                self.problems.join("; "),
            ));
        }
        Ok(NetworkLayout {
            name: self.name,
            params: self.params,
        })
    }
}

/// A dotted-path scope within a [`LayoutBuilder`].
#[derive(Debug)]
pub struct LayoutScope<'a> {
    builder: &'a mut LayoutBuilder,
    prefix: String,
}

impl LayoutScope<'_> {
    /// The full key for a name in this scope.
    pub fn key<K: Display>(
        &self,
        name: K,
    ) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    /// A nested scope; names may be indices.
    pub fn child<K: Display>(
        &mut self,
        name: K,
    ) -> LayoutScope<'_> {
        let prefix = self.key(name);
        LayoutScope {
            builder: &mut *self.builder,
            prefix,
        }
    }

    /// Declare a tensor in this scope.
    pub fn declare<K: Display, S: Into<Vec<usize>>>(
        &mut self,
        name: K,
        shape: S,
        kind: ParamKind,
    ) -> &mut Self {
        let key = self.key(name);
        self.builder.declare(
            key,
            ParamSpec {
                shape: shape.into(),
                kind,
            },
        );
        self
    }

    /// Declare a learned parameter.
    pub fn param<K: Display, S: Into<Vec<usize>>>(
        &mut self,
        name: K,
        shape: S,
    ) -> &mut Self {
        self.declare(name, shape, ParamKind::Parameter)
    }

    /// Declare a float buffer.
    pub fn buffer<K: Display, S: Into<Vec<usize>>>(
        &mut self,
        name: K,
        shape: S,
    ) -> &mut Self {
        self.declare(name, shape, ParamKind::Buffer)
    }

    /// Declare an integer buffer.
    pub fn index_buffer<K: Display, S: Into<Vec<usize>>>(
        &mut self,
        name: K,
        shape: S,
    ) -> &mut Self {
        self.declare(name, shape, ParamKind::IndexBuffer)
    }

    /// Declare a layer's tensors under ``{name}``.
    pub fn layer<K: Display, L: ParamLayout + ?Sized>(
        &mut self,
        name: K,
        layer: &L,
    ) -> &mut Self {
        layer.declare(&mut self.child(name));
        self
    }
}
