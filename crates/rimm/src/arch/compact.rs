//! # Compact SR
//!
//! A compact VGG-style super-resolution network: a flat ``body`` sequence
//! of ``3x3`` convolutions and activations, ending in a pixel-shuffle
//! upsampler.
//!
//! ```text
//! body.0          conv  num_in_ch -> num_feat
//! body.1          act
//! body.{2i+2}     conv  num_feat -> num_feat        (i < num_conv)
//! body.{2i+3}     act
//! body.{2n+2}     conv  num_feat -> num_out_ch * upscale^2
//! ```
//!
//! The last convolution only fixes the product ``num_out_ch * upscale^2``;
//! detection reads ``num_out_ch = num_in_ch`` where that gives a square
//! factor, and reports both fields as ambiguous.

use crate::arch::prefabs::{StaticPreFabConfig, StaticPreFabMap};
use crate::arch::{Architecture, Detection};
use crate::descriptor::{ModelMetadata, Purpose};
use crate::errors::LoadError;
use crate::layers::activation::ActivationConfig;
use crate::network::{LayoutBuilder, NetworkLayout};
use crate::weights::WeightMap;
use burn::nn::PReluConfig;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::Config;

/// [`Compact`] hyperparameters.
#[derive(Config, Debug)]
pub struct CompactConfig {
    /// Input image channels.
    #[config(default = 3)]
    pub num_in_ch: usize,

    /// Output image channels.
    #[config(default = 3)]
    pub num_out_ch: usize,

    /// Feature width.
    #[config(default = 64)]
    pub num_feat: usize,

    /// Number of body convolutions.
    #[config(default = 16)]
    pub num_conv: usize,

    /// Upscaling factor.
    #[config(default = 4)]
    pub upscale: usize,

    /// Body activation; ``PReLU`` is channel-wise over ``num_feat``.
    #[config(default = "ActivationConfig::PRelu(PReluConfig::new())")]
    pub act_type: ActivationConfig,
}

/// Well-known [`CompactConfig`]s.
pub static PREFAB_COMPACT_MAP: StaticPreFabMap<CompactConfig> = StaticPreFabMap {
    name: "compact",
    description: "Well-known compact SR configs",
    items: &[
        &StaticPreFabConfig {
            name: "realesr_general_x4v3",
            description: "General purpose 4x, 32 body convolutions",
            builder: || CompactConfig::new().with_num_conv(32),
        },
        &StaticPreFabConfig {
            name: "realesr_animevideov3",
            description: "Anime video 4x, 16 body convolutions",
            builder: CompactConfig::new,
        },
    ],
};

/// The Compact SR architecture handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compact;

fn conv3x3(
    d_input: usize,
    d_output: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([d_input, d_output], [3, 3])
}

/// The integer square root of `n`, if `n` is a perfect square.
fn exact_sqrt(n: usize) -> Option<usize> {
    let root = n.isqrt();
    (root * root == n).then_some(root)
}

impl Architecture for Compact {
    type Config = CompactConfig;

    fn id(&self) -> &'static str {
        "Compact"
    }

    fn purpose(&self) -> Purpose {
        Purpose::SuperResolution
    }

    fn detect(
        &self,
        weights: &WeightMap,
    ) -> Option<Detection<CompactConfig>> {
        if weights.is_empty() || !weights.keys().all(|k| k.starts_with("body.")) {
            return None;
        }

        let first = weights.shape_of_rank("body.0.weight", 4)?;
        if first[2..] != [3, 3] {
            return None;
        }
        let (num_feat, num_in_ch) = (first[0], first[1]);
        if num_feat == 0 || num_in_ch == 0 {
            return None;
        }

        let last_index = weights.seq_len("body").checked_sub(1)?;
        // Each convolution carries a weight and a bias.
        if last_index < 2 || last_index % 2 != 0 || last_index >= weights.len() {
            return None;
        }
        let num_conv = (last_index - 2) / 2;
        let last_out = weights.shape_of_rank(&format!("body.{last_index}.weight"), 4)?[0];

        let prelu = weights.contains_key("body.1.weight");
        let act_type = if prelu {
            PReluConfig::new().into()
        } else {
            ActivationConfig::Relu
        };

        let same_channels = (last_out % num_in_ch == 0)
            .then(|| exact_sqrt(last_out / num_in_ch))
            .flatten();
        let (num_out_ch, upscale) = match (same_channels, exact_sqrt(last_out)) {
            (Some(upscale), _) => (num_in_ch, upscale),
            (None, Some(upscale)) => (1, upscale),
            (None, None) => (last_out, 1),
        };

        let config = CompactConfig::new()
            .with_num_in_ch(num_in_ch)
            .with_num_out_ch(num_out_ch)
            .with_num_feat(num_feat)
            .with_num_conv(num_conv)
            .with_upscale(upscale)
            .with_act_type(act_type);

        let detection = Detection::exact(config)
            .with_ambiguous("num_out_ch")
            .with_ambiguous("upscale");
        Some(if prelu {
            detection
        } else {
            detection.with_ambiguous("act_type")
        })
    }

    fn layout(
        &self,
        config: &CompactConfig,
    ) -> Result<NetworkLayout, LoadError> {
        for (name, value) in [
            ("num_in_ch", config.num_in_ch),
            ("num_out_ch", config.num_out_ch),
            ("num_feat", config.num_feat),
            ("upscale", config.upscale),
        ] {
            if value == 0 {
                return Err(LoadError::invalid_config(
                    self.id(),
                    format!("{name} must be >= 1"),
                ));
            }
        }

        let feat = config.num_feat;
        let act = config.act_type.clone().with_num_features(feat);

        let mut builder = LayoutBuilder::new(self.id());
        {
            let mut root = builder.root();
            let mut body = root.child("body");
            body.layer(0, &conv3x3(config.num_in_ch, feat));
            body.layer(1, &act);
            for i in 0..config.num_conv {
                body.layer(2 * i + 2, &conv3x3(feat, feat));
                body.layer(2 * i + 3, &act);
            }
            body.layer(
                2 * config.num_conv + 2,
                &conv3x3(feat, config.num_out_ch * config.upscale * config.upscale),
            );
        }
        builder.build()
    }

    fn metadata(
        &self,
        config: &CompactConfig,
    ) -> ModelMetadata {
        ModelMetadata::new(config.num_in_ch, config.num_out_ch)
            .with_scale(config.upscale)
            .with_tag(format!("{}nf", config.num_feat))
            .with_tag(format!("{}nc", config.num_conv))
    }
}
