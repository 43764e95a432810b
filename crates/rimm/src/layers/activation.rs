//! # Activation Layer Config
//!
//! Most activations are parameter-free; only [`ActivationConfig::PRelu`]
//! contributes a tensor (``weight [num_parameters]``) to a layout.
//!
//! Because parameter-free activations leave no trace in a weight map, a
//! detector can only ever recover "PReLU" or "something parameter-free".
use crate::layers::ParamLayout;
use crate::network::LayoutScope;
use burn::nn::{LeakyReluConfig, PReluConfig};
use burn::prelude::Config;

/// Activation Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum ActivationConfig {
    /// ``GELU`` activation.
    Gelu,

    /// ``PReLU`` activation.
    PRelu(PReluConfig),

    /// ``ReLU`` activation.
    Relu,

    /// ``LeakyReLU`` activation.
    LeakyRelu(LeakyReluConfig),

    /// ``SiLU`` / swish activation.
    Silu,
}

impl From<LeakyReluConfig> for ActivationConfig {
    fn from(config: LeakyReluConfig) -> Self {
        Self::LeakyRelu(config)
    }
}

impl From<PReluConfig> for ActivationConfig {
    fn from(config: PReluConfig) -> Self {
        Self::PRelu(config)
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::Relu
    }
}

impl ActivationConfig {
    /// Does this activation own parameter tensors?
    pub fn has_params(&self) -> bool {
        matches!(self, ActivationConfig::PRelu(_))
    }

    /// Adjust a channel-wise activation to the feature size.
    ///
    /// Parameter-free activations are returned unchanged.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            ActivationConfig::PRelu(config) => config.with_num_parameters(num_features).into(),
            other => other,
        }
    }
}

impl ParamLayout for ActivationConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        if let ActivationConfig::PRelu(config) = self {
            config.declare(scope);
        }
    }
}
