//! Shared test helpers for architecture handlers.

use crate::arch::Architecture;
use crate::arch::compact::{Compact, CompactConfig};
use crate::arch::femasr::{Codebook, FeMaSR, FeMaSRConfig};
use crate::arch::fftformer::{FFTformer, FFTformerConfig};
use crate::network::NetworkLayout;
use crate::registry::MAIN_REGISTRY;
use crate::weights::WeightMap;
use burn::backend::NdArray;
use burn::tensor::TensorData;
use std::collections::BTreeSet;

type TestBackend = NdArray<f32>;

/// Serialize a freshly initialized network of a layout.
pub fn zero_weights(layout: &NetworkLayout) -> WeightMap {
    layout
        .init::<TestBackend>(&Default::default())
        .to_weight_map()
}

/// Replace the tensor at `key` with one whose leading dimension is one larger.
pub fn perturb_shape(
    mut weights: WeightMap,
    key: &str,
) -> WeightMap {
    let mut shape = weights
        .shape(key)
        .unwrap_or_else(|| panic!("no tensor at {key}"))
        .to_vec();
    shape[0] += 1;
    weights.insert(key, TensorData::zeros::<f32, _>(shape));
    weights
}

/// Small configurations of every shipped architecture.
fn sample_layouts() -> Vec<(&'static str, NetworkLayout)> {
    vec![
        (
            Compact.id(),
            Compact
                .layout(&CompactConfig::new().with_num_feat(8).with_num_conv(2))
                .unwrap(),
        ),
        (
            FFTformer.id(),
            FFTformer
                .layout(&FFTformerConfig::new().with_dim(8).with_num_blocks(vec![1, 1, 1]))
                .unwrap(),
        ),
        (
            FeMaSR.id(),
            FeMaSR
                .layout(
                    &FeMaSRConfig::new()
                        .with_gt_resolution(128)
                        .with_codebook_params(vec![Codebook::new(32, 16, 8)]),
                )
                .unwrap(),
        ),
    ]
}

/// Check the round-trip, exclusivity, and load completeness properties.
///
/// For every config:
/// * exactly one registered handler, `arch`, detects the serialized network;
/// * the detected config equals the input config, up to ambiguous fields, and
///   reproduces the input layout;
/// * the registry loads the weights, and the loaded network has exactly the
///   weight map's keys and shapes.
pub fn assert_loads_correctly<A, I>(
    arch: &A,
    configs: I,
) where
    A: Architecture,
    I: IntoIterator<Item = A::Config>,
{
    for config in configs {
        let layout = arch
            .layout(&config)
            .unwrap_or_else(|err| panic!("{config:?}: {err}"));
        let weights = zero_weights(&layout);

        assert_eq!(
            MAIN_REGISTRY.detect_all(&weights),
            vec![arch.id()],
            "{config:?}"
        );

        let detection = arch
            .detect(&weights)
            .unwrap_or_else(|| panic!("{config:?}: not detected"));
        let mismatched = detection.mismatched_fields(&config).unwrap();
        assert!(
            mismatched.is_empty(),
            "{config:?}: detected {:?}, mismatched fields {mismatched:?}",
            detection.config
        );
        let detected_layout = arch
            .layout(&detection.config)
            .unwrap_or_else(|err| panic!("{:?}: {err}", detection.config));
        assert_eq!(detected_layout, layout, "{config:?}");

        let desc = MAIN_REGISTRY
            .load::<TestBackend>(weights.clone(), &Default::default())
            .unwrap_or_else(|err| panic!("{config:?}: {err}"));
        assert_eq!(desc.architecture(), arch.id());
        assert_eq!(desc.purpose(), arch.purpose());

        let model_keys: BTreeSet<&str> = desc.model().keys().collect();
        let weight_keys: BTreeSet<&str> = weights.keys().map(|k| k.as_str()).collect();
        assert_eq!(model_keys, weight_keys, "{config:?}");
        for (key, data) in weights.iter() {
            assert_eq!(
                desc.model().layout().shape(key),
                Some(data.shape.as_slice()),
                "{key}"
            );
        }
    }
}

/// Check that `arch` rejects foreign weight maps without panicking.
pub fn assert_detection_fails<A: Architecture>(arch: &A) {
    let zeros = |shape: &[usize]| TensorData::zeros::<f32, _>(shape.to_vec());

    let foreign = [
        WeightMap::new(),
        WeightMap::new()
            .with("conv_first.weight", zeros(&[64, 3, 3, 3]))
            .with("conv_last.weight", zeros(&[3, 64, 3, 3])),
        WeightMap::new().with("body.0.weight", zeros(&[64, 3])),
        WeightMap::new()
            .with("body.0.weight", zeros(&[64, 3, 3, 3]))
            .with("body.1.weight", zeros(&[64])),
        WeightMap::new()
            .with("patch_embed.proj.weight", zeros(&[48]))
            .with("output.weight", zeros(&[3, 48, 3, 3])),
        WeightMap::new()
            .with("multiscale_encoder.in_conv.weight", zeros(&[64, 3, 4]))
            .with("out_conv.weight", zeros(&[3, 64, 3, 3])),
        WeightMap::new().with("scalar", zeros(&[])),
    ];
    for weights in &foreign {
        assert!(
            arch.detect(weights).is_none(),
            "{} matched {:?}",
            arch.id(),
            weights.keys().collect::<Vec<_>>()
        );
    }

    for (id, layout) in sample_layouts() {
        if id == arch.id() {
            continue;
        }
        assert!(
            arch.detect(&zero_weights(&layout)).is_none(),
            "{} matched {id}",
            arch.id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_layouts_are_exclusive() {
        for (id, layout) in sample_layouts() {
            assert_eq!(MAIN_REGISTRY.detect_all(&zero_weights(&layout)), vec![id]);
        }
    }

    #[test]
    fn test_perturb_shape() {
        let weights = WeightMap::new().with("w", TensorData::zeros::<f32, _>([2, 3]));
        let perturbed = perturb_shape(weights, "w");
        assert_eq!(perturbed.shape("w"), Some(&[3, 3][..]));
    }
}
