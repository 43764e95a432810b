//! # Model Descriptors
//!
//! A [`ModelDescriptor`] is the uniform result of a successful load: the
//! constructed and loaded [`Network`], the [`WeightMap`] it was loaded from,
//! and the inference-relevant [`ModelMetadata`].
//!
//! Purpose categories are not separate types; a [`Purpose`] fixes which
//! invariant combination of scale and channels the descriptor enforces.

mod metadata;
mod size;

pub use metadata::{ModelMetadata, Purpose};
pub use size::SizeRequirements;

use crate::errors::{LoadError, SizeViolation};
use crate::network::Network;
use crate::weights::WeightMap;
use burn::prelude::Backend;

/// A constructed, fully loaded network and its metadata.
///
/// Every field is fixed at construction; the only mutator is
/// [`ModelDescriptor::relocate`].
#[derive(Debug, Clone)]
pub struct ModelDescriptor<B: Backend> {
    purpose: Purpose,
    architecture: String,
    model: Network<B>,
    weights: WeightMap,
    metadata: ModelMetadata,
}

impl<B: Backend> ModelDescriptor<B> {
    /// Validate the metadata and load `weights` into `model`.
    ///
    /// # Errors
    ///
    /// * [`LoadError::InvalidConfiguration`] if `scale`, a channel count, or a
    ///   size constraint is zero, or `scale` overrides the purpose's fixed scale.
    /// * [`LoadError::WeightShapeMismatch`], [`LoadError::UnexpectedWeightKeys`],
    ///   [`LoadError::InvalidTensor`] if the weights do not load exactly.
    pub fn new<S: Into<String>>(
        purpose: Purpose,
        architecture: S,
        mut model: Network<B>,
        weights: WeightMap,
        metadata: ModelMetadata,
    ) -> Result<Self, LoadError> {
        let architecture = architecture.into();

        if metadata.scale < 1 {
            return Err(LoadError::invalid_config(
                &architecture,
                format!("scale must be >= 1, got {}", metadata.scale),
            ));
        }
        if let Some(fixed) = purpose.fixed_scale() {
            if metadata.scale != fixed {
                return Err(LoadError::invalid_config(
                    &architecture,
                    format!(
                        "{purpose} models have a fixed scale of {fixed}, got {}",
                        metadata.scale
                    ),
                ));
            }
        }
        if metadata.input_channels < 1 || metadata.output_channels < 1 {
            return Err(LoadError::invalid_config(
                &architecture,
                format!(
                    "channel counts must be >= 1, got {} -> {}",
                    metadata.input_channels, metadata.output_channels
                ),
            ));
        }

        let size = metadata.size;
        if size.minimum == Some(0) || size.multiple_of == Some(0) {
            return Err(LoadError::invalid_config(
                &architecture,
                format!("size constraints must be positive, got {size:?}"),
            ));
        }

        model.load_weights(&weights)?;

        Ok(Self {
            purpose,
            architecture,
            model,
            weights,
            metadata,
        })
    }

    /// The purpose category.
    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// The architecture id.
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// The loaded network.
    pub fn model(&self) -> &Network<B> {
        &self.model
    }

    /// The weight map the network was loaded from.
    pub fn weights(&self) -> &WeightMap {
        &self.weights
    }

    /// All metadata fields.
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Variant / capacity tags.
    pub fn tags(&self) -> &[String] {
        &self.metadata.tags
    }

    /// Can the network run in `f16`?
    pub fn supports_half(&self) -> bool {
        self.metadata.supports_half
    }

    /// Can the network run in `bf16`?
    pub fn supports_bfloat16(&self) -> bool {
        self.metadata.supports_bfloat16
    }

    /// Output / input edge ratio.
    pub fn scale(&self) -> usize {
        self.metadata.scale
    }

    /// Number of input channels.
    pub fn input_channels(&self) -> usize {
        self.metadata.input_channels
    }

    /// Number of output channels.
    pub fn output_channels(&self) -> usize {
        self.metadata.output_channels
    }

    /// Input size constraints.
    pub fn size(&self) -> SizeRequirements {
        self.metadata.size
    }

    /// Reject an input size before inference.
    pub fn check_input_size(
        &self,
        width: usize,
        height: usize,
    ) -> Result<(), SizeViolation> {
        self.metadata.size.check(width, height)
    }

    /// Move the network to a device, in place.
    pub fn relocate(
        &mut self,
        device: &B::Device,
    ) -> &mut Self {
        self.model.relocate(device);
        self
    }

    /// Take the loaded network.
    pub fn into_model(self) -> Network<B> {
        self.model
    }
}
