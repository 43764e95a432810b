//! # FFTformer
//!
//! A frequency-domain transformer for image deblurring: a three-level
//! encoder / decoder of transformer blocks, with a refinement stage and
//! two fusion blocks on the skip connections.
//!
//! Each transformer block has a frequency-domain feed-forward network
//! (``ffn``), and decoder-side blocks add frequency-domain self-attention
//! (``attn``). The feed-forward hidden width is ``floor(dim * factor)``.

use crate::arch::prefabs::{StaticPreFabConfig, StaticPreFabMap};
use crate::arch::{Architecture, Detection};
use crate::descriptor::{ModelMetadata, Purpose, SizeRequirements};
use crate::errors::LoadError;
use crate::network::{LayoutBuilder, LayoutScope, NetworkLayout};
use crate::weights::WeightMap;
use burn::nn::LayerNormConfig;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::Config;

/// Fusion block expansion factor.
const FUSE_FFN_EXPANSION_FACTOR: f64 = 2.66;

/// Frequency patch size of the feed-forward filter.
const FFT_PATCH_SIZE: usize = 8;

/// Top-level key names of an FFTformer weight map.
const TOP_LEVEL_NAMES: [&str; 15] = [
    "patch_embed",
    "encoder_level1",
    "down1_2",
    "encoder_level2",
    "down2_3",
    "encoder_level3",
    "decoder_level3",
    "up3_2",
    "decoder_level2",
    "up2_1",
    "decoder_level1",
    "refinement",
    "fuse2",
    "fuse1",
    "output",
];

/// [`FFTformer`] hyperparameters.
#[derive(Config, Debug)]
pub struct FFTformerConfig {
    /// Input image channels.
    #[config(default = 3)]
    pub inp_channels: usize,

    /// Output image channels.
    #[config(default = 3)]
    pub out_channels: usize,

    /// Base feature width; levels 2 and 3 use ``2 * dim`` and ``4 * dim``.
    #[config(default = 48)]
    pub dim: usize,

    /// Transformer blocks per encoder / decoder level.
    #[config(default = "vec![6, 6, 12]")]
    pub num_blocks: Vec<usize>,

    /// Transformer blocks in the refinement stage.
    #[config(default = 4)]
    pub num_refinement_blocks: usize,

    /// Feed-forward expansion factor.
    #[config(default = 3.0)]
    pub ffn_expansion_factor: f64,

    /// Use biases in the transformer blocks and the output projection.
    #[config(default = false)]
    pub bias: bool,
}

/// Well-known [`FFTformerConfig`]s.
pub static PREFAB_FFTFORMER_MAP: StaticPreFabMap<FFTformerConfig> = StaticPreFabMap {
    name: "fftformer",
    description: "Well-known FFTformer configs",
    items: &[&StaticPreFabConfig {
        name: "fftformer_gopro",
        description: "Deblurring, trained on GoPro",
        builder: FFTformerConfig::new,
    }],
};

/// The FFTformer architecture handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct FFTformer;

fn conv(
    d_input: usize,
    d_output: usize,
    kernel: usize,
    bias: bool,
) -> Conv2dConfig {
    Conv2dConfig::new([d_input, d_output], [kernel, kernel]).with_bias(bias)
}

fn depthwise(
    channels: usize,
    bias: bool,
) -> Conv2dConfig {
    conv(channels, channels, 3, bias).with_groups(channels)
}

/// The feed-forward hidden width of a block.
fn hidden_features(
    dim: usize,
    factor: f64,
) -> usize {
    (dim as f64 * factor + 1e-6).floor() as usize
}

#[derive(Debug, Clone, Copy)]
struct BlockSpec {
    dim: usize,
    factor: f64,
    bias: bool,
    att: bool,
}

impl BlockSpec {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        let dim = self.dim;
        if self.att {
            scope.layer("norm1.body", &LayerNormConfig::new(dim));
            let mut attn = scope.child("attn");
            attn.layer("to_hidden", &conv(dim, dim * 6, 1, self.bias))
                .layer("to_hidden_dw", &depthwise(dim * 6, self.bias))
                .layer("project_out", &conv(dim * 2, dim, 1, self.bias))
                .layer("norm.body", &LayerNormConfig::new(dim * 2));
        }
        scope.layer("norm2.body", &LayerNormConfig::new(dim));

        let hidden = hidden_features(dim, self.factor);
        let mut ffn = scope.child("ffn");
        ffn.param(
            "fft",
            [hidden * 2, 1, 1, FFT_PATCH_SIZE, FFT_PATCH_SIZE / 2 + 1],
        )
        .layer("project_in", &conv(dim, hidden * 2, 1, self.bias))
        .layer("dwconv", &depthwise(hidden * 2, self.bias))
        .layer("project_out", &conv(hidden, dim, 1, self.bias));
    }

    fn declare_seq(
        &self,
        scope: &mut LayoutScope<'_>,
        name: &str,
        count: usize,
    ) {
        let mut seq = scope.child(name);
        for i in 0..count {
            self.declare(&mut seq.child(i));
        }
    }
}

fn declare_fuse(
    scope: &mut LayoutScope<'_>,
    name: &str,
    dim: usize,
) {
    let mut fuse = scope.child(name);
    BlockSpec {
        dim: dim * 2,
        factor: FUSE_FFN_EXPANSION_FACTOR,
        bias: false,
        att: false,
    }
    .declare(&mut fuse.child("att_channel"));
    fuse.layer("conv", &conv(dim * 2, dim * 2, 1, true))
        .layer("conv2", &conv(dim * 2, dim * 2, 1, true));
}

impl Architecture for FFTformer {
    type Config = FFTformerConfig;

    fn id(&self) -> &'static str {
        "FFTformer"
    }

    fn purpose(&self) -> Purpose {
        Purpose::Restoration
    }

    fn detect(
        &self,
        weights: &WeightMap,
    ) -> Option<Detection<FFTformerConfig>> {
        if !weights
            .top_level_names()
            .iter()
            .all(|name| TOP_LEVEL_NAMES.contains(name))
        {
            return None;
        }

        let patch_embed = weights.shape_of_rank("patch_embed.proj.weight", 4)?;
        let output = weights.shape_of_rank("output.weight", 4)?;
        weights.shape_of_rank("encoder_level1.0.ffn.fft", 5)?;
        weights.shape_of_rank("decoder_level1.0.attn.to_hidden.weight", 4)?;
        weights.shape_of_rank("fuse1.att_channel.ffn.fft", 5)?;
        weights.shape_of_rank("down1_2.body.1.weight", 4)?;

        let (dim, inp_channels) = (patch_embed[0], patch_embed[1]);
        let out_channels = output[0];
        if dim == 0 {
            return None;
        }

        let num_blocks: Vec<usize> = (1..=3)
            .map(|level| weights.seq_len(&format!("encoder_level{level}")))
            .collect();
        let num_refinement_blocks = weights.seq_len("refinement");
        // Every block owns several keys.
        if num_blocks.iter().any(|&n| n == 0 || n > weights.len())
            || num_refinement_blocks > weights.len()
        {
            return None;
        }

        let hidden =
            weights.shape_of_rank("encoder_level3.0.ffn.project_out.weight", 4)?[1];
        let ffn_expansion_factor = hidden as f64 / (4 * dim) as f64;

        let config = FFTformerConfig::new()
            .with_inp_channels(inp_channels)
            .with_out_channels(out_channels)
            .with_dim(dim)
            .with_num_blocks(num_blocks)
            .with_num_refinement_blocks(num_refinement_blocks)
            .with_ffn_expansion_factor(ffn_expansion_factor)
            .with_bias(weights.contains_key("output.bias"));

        Some(Detection::exact(config).with_ambiguous("ffn_expansion_factor"))
    }

    fn layout(
        &self,
        config: &FFTformerConfig,
    ) -> Result<NetworkLayout, LoadError> {
        let invalid = |reason: String| LoadError::invalid_config(self.id(), reason);

        let [nb1, nb2, nb3] = config.num_blocks[..] else {
            return Err(invalid(format!(
                "num_blocks must have 3 levels, got {:?}",
                config.num_blocks
            )));
        };
        if config.num_blocks.contains(&0) {
            return Err(invalid(format!(
                "every level needs at least one block, got {:?}",
                config.num_blocks
            )));
        }
        if !(config.ffn_expansion_factor.is_finite() && config.ffn_expansion_factor > 0.0) {
            return Err(invalid(format!(
                "ffn_expansion_factor must be positive, got {}",
                config.ffn_expansion_factor
            )));
        }

        let dim = config.dim;
        let block = |dim: usize, att: bool| BlockSpec {
            dim,
            factor: config.ffn_expansion_factor,
            bias: config.bias,
            att,
        };

        let mut builder = LayoutBuilder::new(self.id());
        {
            let mut root = builder.root();
            root.layer("patch_embed.proj", &conv(config.inp_channels, dim, 3, false));

            block(dim, false).declare_seq(&mut root, "encoder_level1", nb1);
            root.layer("down1_2.body.1", &conv(dim, dim * 2, 3, false));
            block(dim * 2, false).declare_seq(&mut root, "encoder_level2", nb2);
            root.layer("down2_3.body.1", &conv(dim * 2, dim * 4, 3, false));
            block(dim * 4, false).declare_seq(&mut root, "encoder_level3", nb3);

            block(dim * 4, true).declare_seq(&mut root, "decoder_level3", nb3);
            root.layer("up3_2.body.1", &conv(dim * 4, dim * 2, 3, false));
            block(dim * 2, true).declare_seq(&mut root, "decoder_level2", nb2);
            root.layer("up2_1.body.1", &conv(dim * 2, dim, 3, false));
            block(dim, true).declare_seq(&mut root, "decoder_level1", nb1);

            block(dim, true).declare_seq(&mut root, "refinement", config.num_refinement_blocks);

            declare_fuse(&mut root, "fuse2", dim * 2);
            declare_fuse(&mut root, "fuse1", dim);

            root.layer("output", &conv(dim, config.out_channels, 3, config.bias));
        }
        builder.build()
    }

    fn metadata(
        &self,
        config: &FFTformerConfig,
    ) -> ModelMetadata {
        ModelMetadata::new(config.inp_channels, config.out_channels)
            .with_tag(format!("{}dim", config.dim))
            .with_tag(format!("{}rb", config.num_refinement_blocks))
            .with_supports_half(false)
            .with_supports_bfloat16(false)
            .with_size(SizeRequirements::default().with_multiple_of(32))
    }
}
