//! # Model Loader
//!
//! [`ModelLoader`] binds an [`ArchRegistry`], a [`LoaderConfig`], and a target
//! device. Before detection it canonicalizes the weight map the way
//! training checkpoints are commonly wrapped:
//!
//! * a single wrapper prefix is unwrapped (``params_ema.``, ``state_dict.``, ...);
//!   the first configured prefix present in the map wins, and keys outside it
//!   are dropped;
//! * a prefix shared by every key (``module.``, ``netG.``) is stripped.

use crate::descriptor::ModelDescriptor;
use crate::errors::LoadError;
use crate::registry::{ArchRegistry, MAIN_REGISTRY, build_descriptor};
use crate::weights::WeightMap;
use burn::prelude::{Backend, Config};

/// [`ModelLoader`] settings.
#[derive(Config, Debug)]
pub struct LoaderConfig {
    /// Wrapper prefixes, in priority order.
    #[config(default = r#"vec![
        "params_ema.".to_string(),
        "params-ema.".to_string(),
        "params.".to_string(),
        "state_dict.".to_string(),
        "model.".to_string(),
        "net.".to_string(),
    ]"#)]
    pub unwrap_prefixes: Vec<String>,

    /// Prefixes stripped when every key carries them.
    #[config(default = r#"vec!["module.".to_string(), "netG.".to_string()]"#)]
    pub strip_prefixes: Vec<String>,

    /// Architecture ids excluded from detection.
    #[config(default = "Vec::new()")]
    pub disabled_architectures: Vec<String>,
}

impl LoaderConfig {
    /// Disable an architecture id.
    pub fn with_disabled<S: Into<String>>(
        mut self,
        id: S,
    ) -> Self {
        self.disabled_architectures.push(id.into());
        self
    }

    /// Is an architecture id enabled?
    pub fn is_enabled(
        &self,
        id: &str,
    ) -> bool {
        !self.disabled_architectures.iter().any(|d| d == id)
    }

    /// Unwrap and strip the configured prefixes.
    pub fn canonicalize(
        &self,
        weights: WeightMap,
    ) -> WeightMap {
        let mut weights = self
            .unwrap_prefixes
            .iter()
            .find_map(|prefix| {
                weights.select_prefix(prefix).inspect(|_| {
                    tracing::debug!(prefix = prefix.as_str(), "unwrapped state dict");
                })
            })
            .unwrap_or(weights);

        for prefix in &self.strip_prefixes {
            weights = weights.strip_common_prefix(prefix);
        }
        weights
    }
}

/// Loads weight maps onto a device through a registry.
#[derive(Debug, Clone)]
pub struct ModelLoader<'a, B: Backend> {
    registry: &'a ArchRegistry,
    config: LoaderConfig,
    device: B::Device,
}

impl<B: Backend> ModelLoader<'static, B> {
    /// A loader over [`MAIN_REGISTRY`] with default settings.
    pub fn new(device: &B::Device) -> Self {
        Self::with_registry(&MAIN_REGISTRY, LoaderConfig::new(), device)
    }
}

impl<'a, B: Backend> ModelLoader<'a, B> {
    /// A loader over a given registry.
    pub fn with_registry(
        registry: &'a ArchRegistry,
        config: LoaderConfig,
        device: &B::Device,
    ) -> Self {
        Self {
            registry,
            config,
            device: device.clone(),
        }
    }

    /// Replace the settings.
    pub fn with_config(
        self,
        config: LoaderConfig,
    ) -> Self {
        Self { config, ..self }
    }

    /// The settings.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The target device.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Canonicalize, detect, construct, and load a weight map.
    ///
    /// # Errors
    ///
    /// As [`ArchRegistry::load`]; disabled architectures never match.
    #[tracing::instrument(skip_all, fields(keys = weights.len()))]
    pub fn load(
        &self,
        weights: WeightMap,
    ) -> Result<ModelDescriptor<B>, LoadError> {
        let weights = self.config.canonicalize(weights);
        let detected = self
            .registry
            .detect_where(&weights, |id| self.config.is_enabled(id))?;
        build_descriptor(detected, weights, &self.device)
    }
}
