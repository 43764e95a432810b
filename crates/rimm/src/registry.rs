//! # Architecture Registry
//!
//! [`ArchRegistry`] is an ordered list of [`ArchHandler`]s, and the detection
//! pipeline over them:
//!
//! 1. every handler's detector is evaluated against the weight map;
//! 2. exactly one must match ([`LoadError::UnrecognizedArchitecture`],
//!    [`LoadError::AmbiguousArchitecture`] otherwise);
//! 3. the detected layout is initialized on a device, and the weights are
//!    loaded into it through [`ModelDescriptor::new`].
//!
//! [`MAIN_REGISTRY`] holds every architecture this crate ships. It is built
//! once, on first use, and is read-only afterwards.

use crate::arch::compact::Compact;
use crate::arch::femasr::FeMaSR;
use crate::arch::fftformer::FFTformer;
use crate::arch::{ArchHandler, Architecture, Detected};
use crate::descriptor::ModelDescriptor;
use crate::errors::LoadError;
use crate::weights::WeightMap;
use burn::prelude::Backend;
use std::fmt::{Debug, Formatter};
use std::sync::LazyLock;

/// The registry of every architecture shipped by this crate.
pub static MAIN_REGISTRY: LazyLock<ArchRegistry> = LazyLock::new(|| {
    let handlers: Vec<Box<dyn ArchHandler>> =
        vec![Box::new(FFTformer), Box::new(FeMaSR), Box::new(Compact)];
    ArchRegistry::from_handlers(handlers)
});

/// An ordered collection of architecture handlers.
#[derive(Default)]
pub struct ArchRegistry {
    handlers: Vec<Box<dyn ArchHandler>>,
}

impl Debug for ArchRegistry {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ArchRegistry")
            .field("architectures", &self.architectures())
            .finish()
    }
}

impl ArchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids must be distinct; checked in tests.
    fn from_handlers(handlers: Vec<Box<dyn ArchHandler>>) -> Self {
        Self { handlers }
    }

    /// Register an architecture.
    ///
    /// # Errors
    ///
    /// [`LoadError::DuplicateArchitecture`] if the id is already registered.
    pub fn add<A: Architecture>(
        &mut self,
        arch: A,
    ) -> Result<&mut Self, LoadError> {
        if self.contains(arch.id()) {
            return Err(LoadError::DuplicateArchitecture {
                id: arch.id().to_string(),
            });
        }
        self.handlers.push(Box::new(arch));
        Ok(self)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Look up a handler by id.
    pub fn get(
        &self,
        id: &str,
    ) -> Option<&dyn ArchHandler> {
        self.handlers
            .iter()
            .find(|h| h.architecture_id() == id)
            .map(|h| &**h)
    }

    /// Is an id registered?
    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.get(id).is_some()
    }

    /// Registered ids, in registration order.
    pub fn architectures(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.architecture_id()).collect()
    }

    /// Every handler id whose detector matches, in registration order.
    ///
    /// A diagnostic view; a well-formed registry yields at most one id for
    /// any real weight map.
    pub fn detect_all(
        &self,
        weights: &WeightMap,
    ) -> Vec<&'static str> {
        self.detect_filtered(weights, |_| true)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    fn detect_filtered<F>(
        &self,
        weights: &WeightMap,
        enabled: F,
    ) -> Vec<(&'static str, Result<Detected, LoadError>)>
    where
        F: Fn(&str) -> bool,
    {
        self.handlers
            .iter()
            .filter(|h| enabled(h.architecture_id()))
            .filter_map(|h| {
                let id = h.architecture_id();
                let result = h.detect_weights(weights);
                tracing::debug!(architecture = id, matched = result.is_some(), "detect");
                result.map(|r| (id, r))
            })
            .collect()
    }

    /// Detect the unique matching architecture.
    ///
    /// # Errors
    ///
    /// * [`LoadError::UnrecognizedArchitecture`] if no handler matches.
    /// * [`LoadError::AmbiguousArchitecture`] if several handlers match.
    /// * [`LoadError::InternalDetection`] if the matching handler cannot
    ///   construct its own detection.
    pub fn detect(
        &self,
        weights: &WeightMap,
    ) -> Result<Detected, LoadError> {
        self.detect_where(weights, |_| true)
    }

    /// [`ArchRegistry::detect`], restricted to the ids accepted by `enabled`.
    pub fn detect_where<F>(
        &self,
        weights: &WeightMap,
        enabled: F,
    ) -> Result<Detected, LoadError>
    where
        F: Fn(&str) -> bool,
    {
        let mut matches = self.detect_filtered(weights, enabled);
        match matches.len() {
            0 => Err(LoadError::UnrecognizedArchitecture {
                num_keys: weights.len(),
                top_level: weights
                    .top_level_names()
                    .into_iter()
                    .map(String::from)
                    .collect(),
            }),
            1 => {
                let (_, result) = matches.remove(0);
                let detected = result?;
                if !detected.ambiguous.is_empty() {
                    tracing::warn!(
                        architecture = detected.architecture,
                        fields = ?detected.ambiguous,
                        "shape-ambiguous hyperparameters were resolved canonically"
                    );
                }
                Ok(detected)
            }
            _ => Err(LoadError::AmbiguousArchitecture {
                matches: matches.into_iter().map(|(id, _)| id).collect(),
            }),
        }
    }

    /// Detect, construct, and load a weight map.
    ///
    /// # Errors
    ///
    /// Any detection error (see [`ArchRegistry::detect`]), and the load
    /// errors of [`ModelDescriptor::new`].
    #[tracing::instrument(skip_all, fields(keys = weights.len()))]
    pub fn load<B: Backend>(
        &self,
        weights: WeightMap,
        device: &B::Device,
    ) -> Result<ModelDescriptor<B>, LoadError> {
        let detected = self.detect(&weights)?;
        build_descriptor(detected, weights, device)
    }
}

/// Construct and load a detected architecture.
pub(crate) fn build_descriptor<B: Backend>(
    detected: Detected,
    weights: WeightMap,
    device: &B::Device,
) -> Result<ModelDescriptor<B>, LoadError> {
    let network = detected.layout.init::<B>(device);
    let desc = ModelDescriptor::new(
        detected.purpose,
        detected.architecture,
        network,
        weights,
        detected.metadata,
    )?;
    tracing::info!(
        architecture = desc.architecture(),
        purpose = %desc.purpose(),
        scale = desc.scale(),
        input_channels = desc.input_channels(),
        output_channels = desc.output_channels(),
        num_params = desc.model().num_params(),
        "loaded model"
    );
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Detection;
    use crate::arch::compact::CompactConfig;
    use crate::arch::fftformer::FFTformerConfig;
    use crate::descriptor::{ModelMetadata, Purpose};
    use crate::errors::ShapeMismatch;
    use crate::network::{LayoutBuilder, NetworkLayout};
    use crate::testing::{perturb_shape, zero_weights};
    use burn::backend::NdArray;
    use burn::prelude::Config;
    use burn::tensor::TensorData;
    use hamcrest::prelude::*;

    type TestBackend = NdArray<f32>;

    #[derive(Config, Debug)]
    struct ProbeConfig {
        width: usize,
    }

    /// Matches any map with a ``probe.weight`` vector.
    struct Probe(&'static str);

    impl Architecture for Probe {
        type Config = ProbeConfig;

        fn id(&self) -> &'static str {
            self.0
        }

        fn purpose(&self) -> Purpose {
            Purpose::Restoration
        }

        fn detect(
            &self,
            weights: &WeightMap,
        ) -> Option<Detection<ProbeConfig>> {
            let width = weights.shape_of_rank("probe.weight", 1)?[0];
            Some(Detection::exact(ProbeConfig::new(width)))
        }

        fn layout(
            &self,
            config: &ProbeConfig,
        ) -> Result<NetworkLayout, LoadError> {
            let mut builder = LayoutBuilder::new(self.id());
            builder.root().param("probe.weight", [config.width]);
            builder.build()
        }

        fn metadata(
            &self,
            _config: &ProbeConfig,
        ) -> ModelMetadata {
            ModelMetadata::new(3, 3)
        }
    }

    fn probe_weights() -> WeightMap {
        WeightMap::new().with("probe.weight", TensorData::zeros::<f32, _>([6]))
    }

    #[test]
    fn test_main_registry() {
        assert_that!(
            &MAIN_REGISTRY.architectures(),
            contains(vec!["FFTformer", "FeMaSR", "Compact"]).exactly()
        );
        let mut ids = MAIN_REGISTRY.architectures();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), MAIN_REGISTRY.len());

        assert!(MAIN_REGISTRY.contains("Compact"));
        assert!(!MAIN_REGISTRY.contains("ESRGAN"));
        assert_eq!(
            MAIN_REGISTRY.get("FeMaSR").unwrap().architecture_purpose(),
            Purpose::SuperResolution
        );
    }

    #[test]
    fn test_duplicate_id() {
        let mut registry = ArchRegistry::new();
        registry.add(Probe("a")).unwrap().add(Probe("b")).unwrap();
        assert_eq!(registry.architectures(), vec!["a", "b"]);

        match registry.add(Probe("a")) {
            Err(LoadError::DuplicateArchitecture { id }) => assert_eq!(id, "a"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unrecognized() {
        let weights = WeightMap::new()
            .with("mystery.0.weight", TensorData::zeros::<f32, _>([2, 2]))
            .with("other.bias", TensorData::zeros::<f32, _>([2]));

        match MAIN_REGISTRY.load::<TestBackend>(weights, &Default::default()) {
            Err(LoadError::UnrecognizedArchitecture {
                num_keys,
                top_level,
            }) => {
                assert_eq!(num_keys, 2);
                assert_eq!(top_level, vec!["mystery", "other"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(matches!(
            ArchRegistry::new().detect(&probe_weights()),
            Err(LoadError::UnrecognizedArchitecture { num_keys: 1, .. })
        ));
    }

    #[test]
    fn test_ambiguous() {
        let mut registry = ArchRegistry::new();
        registry.add(Probe("first")).unwrap();
        registry.add(Probe("second")).unwrap();

        assert_eq!(registry.detect_all(&probe_weights()), vec!["first", "second"]);
        match registry.detect(&probe_weights()) {
            Err(LoadError::AmbiguousArchitecture { matches }) => {
                assert_eq!(matches, vec!["first", "second"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let detected = registry
            .detect_where(&probe_weights(), |id| id != "first")
            .unwrap();
        assert_eq!(detected.architecture, "second");
    }

    #[test]
    fn test_load() {
        let mut registry = ArchRegistry::new();
        registry.add(Probe("probe")).unwrap();

        let desc = registry
            .load::<TestBackend>(probe_weights(), &Default::default())
            .unwrap();
        assert_eq!(desc.architecture(), "probe");
        assert_eq!(desc.purpose(), Purpose::Restoration);
        assert_eq!(desc.scale(), 1);
        assert_eq!(desc.weights(), &probe_weights());
    }

    #[test]
    fn test_perturbed_shape_fails_to_load() {
        let config = CompactConfig::new().with_num_feat(16).with_num_conv(2);
        let layout = Compact.layout(&config).unwrap();
        let weights = perturb_shape(zero_weights(&layout), "body.4.weight");

        match MAIN_REGISTRY.load::<TestBackend>(weights, &Default::default()) {
            Err(LoadError::WeightShapeMismatch {
                architecture,
                mismatches,
            }) => {
                assert_eq!(architecture, "Compact");
                assert_eq!(mismatches.len(), 1);
                assert!(matches!(
                    &mismatches[0],
                    ShapeMismatch::Shape { key, .. } if key == "body.4.weight"
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_extra_keys_fail_to_load() {
        let layout = FFTformer
            .layout(&FFTformerConfig::new().with_dim(8).with_num_blocks(vec![1, 1, 1]))
            .unwrap();
        let weights = zero_weights(&layout)
            .with("output.extra", TensorData::zeros::<f32, _>([1]));

        match MAIN_REGISTRY.load::<TestBackend>(weights, &Default::default()) {
            Err(LoadError::UnexpectedWeightKeys { keys, .. }) => {
                assert_eq!(keys, vec!["output.extra"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
