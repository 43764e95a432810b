//! # Purpose and Metadata

use crate::descriptor::SizeRequirements;
use burn::prelude::Config;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The task class a network performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    /// Image super-resolution; `scale >= 1`.
    SuperResolution,

    /// Face super-resolution; `scale >= 1`.
    FaceSuperResolution,

    /// Inpainting; the output matches the input size.
    Inpainting,

    /// Restoration (denoise, deblur, ...); the output matches the input size.
    Restoration,
}

impl Purpose {
    /// The scale this purpose fixes, if any.
    pub fn fixed_scale(&self) -> Option<usize> {
        match self {
            Purpose::SuperResolution | Purpose::FaceSuperResolution => None,
            Purpose::Inpainting | Purpose::Restoration => Some(1),
        }
    }

    /// Short name.
    pub fn name(&self) -> &'static str {
        match self {
            Purpose::SuperResolution => "SR",
            Purpose::FaceSuperResolution => "FaceSR",
            Purpose::Inpainting => "Inpainting",
            Purpose::Restoration => "Restoration",
        }
    }
}

impl Display for Purpose {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Descriptor fields computed by an architecture from its hyperparameters.
#[derive(Config, Debug)]
pub struct ModelMetadata {
    /// Number of input image channels.
    pub input_channels: usize,

    /// Number of output image channels.
    pub output_channels: usize,

    /// Short variant / capacity descriptors.
    #[config(default = "Vec::new()")]
    pub tags: Vec<String>,

    /// Can the network run in `f16`?
    #[config(default = true)]
    pub supports_half: bool,

    /// Can the network run in `bf16`?
    #[config(default = true)]
    pub supports_bfloat16: bool,

    /// Output / input edge ratio.
    #[config(default = 1)]
    pub scale: usize,

    /// Input size constraints.
    #[config(default = "SizeRequirements::default()")]
    pub size: SizeRequirements,
}

impl ModelMetadata {
    /// Append a tag.
    pub fn with_tag<S: Into<String>>(
        mut self,
        tag: S,
    ) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_scale() {
        assert_eq!(Purpose::SuperResolution.fixed_scale(), None);
        assert_eq!(Purpose::FaceSuperResolution.fixed_scale(), None);
        assert_eq!(Purpose::Inpainting.fixed_scale(), Some(1));
        assert_eq!(Purpose::Restoration.fixed_scale(), Some(1));
        assert_eq!(Purpose::FaceSuperResolution.to_string(), "FaceSR");
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = ModelMetadata::new(3, 1).with_tag("64nf").with_tag("16nc");
        assert_eq!(meta.scale, 1);
        assert!(meta.supports_half);
        assert!(meta.supports_bfloat16);
        assert!(meta.size.is_none());
        assert_eq!(meta.tags, vec!["64nf".to_string(), "16nc".to_string()]);

        let json = serde_json::to_value(&meta).unwrap();
        let back: ModelMetadata = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(serde_json::to_value(&back).unwrap(), json);
    }
}
