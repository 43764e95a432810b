//! # Normalization Config
//!
//! Wraps the built-in ``burn::nn`` norm configs:
//! * [`Batch`](NormalizationConfig::Batch) - [`BatchNormConfig`]
//! * [`Group`](NormalizationConfig::Group) - [`GroupNormConfig`]
//! * [`Instance`](NormalizationConfig::Instance) - [`InstanceNormConfig`]
//!
//! The enum is non-exhaustive, to prepare for future additions.

use crate::layers::ParamLayout;
use crate::network::LayoutScope;
use burn::nn::{BatchNormConfig, GroupNormConfig, InstanceNormConfig};
use burn::prelude::Config;

/// Normalization Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationConfig {
    /// [`BatchNormConfig`].
    Batch(BatchNormConfig),

    /// [`GroupNormConfig`].
    Group(GroupNormConfig),

    /// [`InstanceNormConfig`].
    Instance(InstanceNormConfig),
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl From<InstanceNormConfig> for NormalizationConfig {
    fn from(config: InstanceNormConfig) -> Self {
        Self::Instance(config)
    }
}

impl ParamLayout for NormalizationConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        match self {
            NormalizationConfig::Batch(config) => config.declare(scope),
            NormalizationConfig::Group(config) => config.declare(scope),
            NormalizationConfig::Instance(config) => config.declare(scope),
        }
    }
}
