//! # FeMaSR
//!
//! A super-resolution network built around multi-scale vector-quantized
//! codebooks of high-resolution features.
//!
//! The network has:
//! * ``multiscale_encoder`` - an input conv and ``encode_depth`` stride-2
//!   downsampling blocks; in the LQ stage, a stack of Swin residual layers.
//! * ``quantize_group`` / ``before_quant_group`` / ``after_quant_group`` -
//!   one codebook and its adapters per entry of ``codebook_params``.
//! * ``decoder_group`` - ``max_depth`` upsampling blocks and ``out_conv``.
//!
//! Channel widths are a fixed function of spatial resolution
//! ([`channels_at`]), which makes several resolutions (8 through 64)
//! shape-equivalent. Detection searches the candidate resolutions, keeps
//! the largest one that reproduces the weight shapes, and reports the
//! resolution fields as ambiguous when more than one does.

use crate::arch::prefabs::{StaticPreFabConfig, StaticPreFabMap};
use crate::arch::{Architecture, Detection};
use crate::descriptor::{ModelMetadata, Purpose, SizeRequirements};
use crate::errors::LoadError;
use crate::layers::activation::ActivationConfig;
use crate::layers::normalization::NormalizationConfig;
use crate::network::{LayoutBuilder, LayoutScope, NetworkLayout};
use crate::weights::WeightMap;
use burn::nn::conv::Conv2dConfig;
use burn::nn::{
    BatchNormConfig, EmbeddingConfig, GroupNormConfig, InstanceNormConfig, LayerNormConfig,
    LinearConfig,
};
use burn::prelude::Config;
use serde::{Deserialize, Serialize};

/// ``(resolution, channels)``, in descending resolution.
const CHANNEL_TABLE: [(usize, usize); 7] = [
    (512, 32),
    (256, 64),
    (128, 128),
    (64, 256),
    (32, 256),
    (16, 256),
    (8, 256),
];

/// Feature channels at a spatial resolution.
pub fn channels_at(resolution: usize) -> Option<usize> {
    CHANNEL_TABLE
        .iter()
        .find(|(res, _)| *res == resolution)
        .map(|(_, ch)| *ch)
}

/// Resolutions with a given channel width, in descending order.
fn resolutions_with(channels: usize) -> impl Iterator<Item = usize> {
    CHANNEL_TABLE
        .iter()
        .filter(move |(_, ch)| *ch == channels)
        .map(|(res, _)| *res)
}

/// Swin residual layers of the LQ-stage encoder.
mod swin {
    pub const EMBED_DIM: usize = 256;
    pub const INPUT_RESOLUTION: usize = 32;
    pub const WINDOW_SIZE: usize = 8;
    pub const NUM_HEADS: usize = 8;
    pub const DEPTH: usize = 6;
    pub const NUM_LAYERS: usize = 4;
    pub const MLP_RATIO: usize = 4;
}

/// Normalization layer choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeMaSRNorm {
    /// ``GroupNorm(32, C)``, affine.
    #[serde(rename = "gn")]
    Group,

    /// ``BatchNorm2d(C)``.
    #[serde(rename = "bn")]
    Batch,

    /// ``InstanceNorm2d(C)``, no affine parameters.
    #[serde(rename = "in")]
    Instance,
}

impl FeMaSRNorm {
    /// The norm config for a channel width.
    pub fn norm_config(
        &self,
        channels: usize,
    ) -> NormalizationConfig {
        match self {
            FeMaSRNorm::Group => GroupNormConfig::new(32, channels).into(),
            FeMaSRNorm::Batch => BatchNormConfig::new(channels).into(),
            FeMaSRNorm::Instance => InstanceNormConfig::new(channels).with_affine(false).into(),
        }
    }
}

/// One vector-quantized codebook.
#[derive(Config, Debug, PartialEq)]
pub struct Codebook {
    /// Spatial resolution the codebook quantizes at.
    pub scale: usize,

    /// Number of code vectors.
    pub num_embeddings: usize,

    /// Code vector width.
    pub embedding_dim: usize,
}

/// [`FeMaSR`] hyperparameters.
#[derive(Config, Debug)]
pub struct FeMaSRConfig {
    /// Image channels, in and out.
    #[config(default = 3)]
    pub in_channel: usize,

    /// Codebooks, coarsest-first by convention.
    #[config(default = "vec![Codebook::new(32, 1024, 512)]")]
    pub codebook_params: Vec<Codebook>,

    /// High-quality (output) training resolution.
    #[config(default = 256)]
    pub gt_resolution: usize,

    /// Low-quality input stage (super-resolution) vs. high-quality prior.
    #[config(default = false)]
    pub lq_stage: bool,

    /// Normalization layers.
    #[config(default = "FeMaSRNorm::Group")]
    pub norm_type: FeMaSRNorm,

    /// Activation layers; must be parameter-free.
    #[config(default = "ActivationConfig::Silu")]
    pub act_type: ActivationConfig,

    /// Upscaling factor of the LQ stage; ignored otherwise.
    #[config(default = 4)]
    pub scale_factor: usize,
}

impl FeMaSRConfig {
    /// The effective output scale.
    pub fn scale(&self) -> usize {
        if self.lq_stage { self.scale_factor } else { 1 }
    }
}

/// Well-known [`FeMaSRConfig`]s.
pub static PREFAB_FEMASR_MAP: StaticPreFabMap<FeMaSRConfig> = StaticPreFabMap {
    name: "femasr",
    description: "Well-known FeMaSR configs",
    items: &[
        &StaticPreFabConfig {
            name: "femasr_hrp",
            description: "High-resolution prior (1x)",
            builder: FeMaSRConfig::new,
        },
        &StaticPreFabConfig {
            name: "femasr_srx2",
            description: "Super-resolution 2x",
            builder: || FeMaSRConfig::new().with_lq_stage(true).with_scale_factor(2),
        },
        &StaticPreFabConfig {
            name: "femasr_srx4",
            description: "Super-resolution 4x",
            builder: || FeMaSRConfig::new().with_lq_stage(true).with_scale_factor(4),
        },
    ],
};

/// The FeMaSR architecture handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeMaSR;

/// Derived depths and resolutions of a valid config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    /// Number of decoder blocks.
    max_depth: usize,

    /// Number of encoder downsampling blocks.
    encode_depth: usize,

    /// Encoder input resolution.
    input_resolution: usize,
}

fn exact_log2(n: usize) -> Option<usize> {
    n.is_power_of_two().then(|| n.trailing_zeros() as usize)
}

fn conv(
    d_input: usize,
    d_output: usize,
    kernel: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([d_input, d_output], [kernel, kernel])
}

impl FeMaSRConfig {
    fn geometry(&self) -> Result<Geometry, String> {
        let first = self
            .codebook_params
            .first()
            .ok_or("codebook_params must not be empty")?;
        let scale = self.scale();
        if first.scale == 0 || scale == 0 {
            return Err("codebook scale and scale_factor must be >= 1".to_string());
        }

        let gt = self.gt_resolution;
        let max_depth = (gt % first.scale == 0)
            .then(|| exact_log2(gt / first.scale))
            .flatten()
            .filter(|depth| *depth >= 1)
            .ok_or_else(|| {
                format!(
                    "gt_resolution {gt} must be a power-of-two multiple (>= 2) of the first codebook scale {}",
                    first.scale
                )
            })?;

        let input_resolution = gt / scale;
        let encode_depth = (gt % scale == 0 && input_resolution % first.scale == 0)
            .then(|| exact_log2(input_resolution / first.scale))
            .flatten()
            .filter(|depth| *depth <= max_depth)
            .ok_or_else(|| {
                format!(
                    "scale {scale} must be a power of two with gt_resolution / scale >= {}",
                    first.scale
                )
            })?;

        Ok(Geometry {
            max_depth,
            encode_depth,
            input_resolution,
        })
    }
}

fn channels(resolution: usize) -> Result<usize, String> {
    channels_at(resolution).ok_or_else(|| format!("no channel width for resolution {resolution}"))
}

fn declare_res_block(
    scope: &mut LayoutScope<'_>,
    channels: usize,
    norm: FeMaSRNorm,
) {
    let norm = norm.norm_config(channels);
    let mut conv_seq = scope.child("conv");
    conv_seq
        .layer("0.norm", &norm)
        .layer(2, &conv(channels, channels, 3))
        .layer("3.norm", &norm)
        .layer(5, &conv(channels, channels, 3));
}

fn declare_swin_layers(scope: &mut LayoutScope<'_>) {
    use self::swin::*;

    let dim = EMBED_DIM;
    let tokens = WINDOW_SIZE * WINDOW_SIZE;
    let num_windows = (INPUT_RESOLUTION / WINDOW_SIZE).pow(2);
    let table = (2 * WINDOW_SIZE - 1).pow(2);

    let mut layers = scope.child("swin_blks");
    for i in 0..NUM_LAYERS {
        let mut rstb = layers.child(i);
        {
            let mut group = rstb.child("residual_group");
            let mut blocks = group.child("blocks");
            for j in 0..DEPTH {
                let mut block = blocks.child(j);
                // Shifted windows carry their attention mask.
                if j % 2 == 1 {
                    block.buffer("attn_mask", [num_windows, tokens, tokens]);
                }
                block.layer("norm1", &LayerNormConfig::new(dim));
                block
                    .child("attn")
                    .param("relative_position_bias_table", [table, NUM_HEADS])
                    .index_buffer("relative_position_index", [tokens, tokens])
                    .layer("qkv", &LinearConfig::new(dim, dim * 3))
                    .layer("proj", &LinearConfig::new(dim, dim));
                block.layer("norm2", &LayerNormConfig::new(dim));
                block
                    .child("mlp")
                    .layer("fc1", &LinearConfig::new(dim, dim * MLP_RATIO))
                    .layer("fc2", &LinearConfig::new(dim * MLP_RATIO, dim));
            }
        }
        rstb.layer("conv", &conv(dim, dim, 3));
    }
}

impl FeMaSR {
    fn build_layout(
        &self,
        config: &FeMaSRConfig,
    ) -> Result<NetworkLayout, String> {
        if config.in_channel == 0 {
            return Err("in_channel must be >= 1".to_string());
        }
        if config.act_type.has_params() {
            return Err(format!(
                "act_type must be parameter-free, got {:?}",
                config.act_type
            ));
        }
        let geometry = config.geometry()?;
        let norm = config.norm_type;

        let mut builder = LayoutBuilder::new(self.id());
        {
            let mut root = builder.root();

            let mut encoder = root.child("multiscale_encoder");
            let mut res = geometry.input_resolution;
            encoder.layer("in_conv", &conv(config.in_channel, channels(res)?, 4));
            {
                let mut blocks = encoder.child("blocks");
                for i in 0..geometry.encode_depth {
                    let (ch_in, ch_out) = (channels(res)?, channels(res / 2)?);
                    let mut block = blocks.child(i);
                    block.layer(0, &conv(ch_in, ch_out, 3));
                    declare_res_block(&mut block.child(1), ch_out, norm);
                    declare_res_block(&mut block.child(2), ch_out, norm);
                    res /= 2;
                }
                if config.lq_stage {
                    declare_swin_layers(&mut blocks.child(geometry.encode_depth));
                }
            }

            let cs0 = config.gt_resolution >> geometry.max_depth;
            {
                let mut decoder = root.child("decoder_group");
                for i in 0..geometry.max_depth {
                    let res = cs0 << i;
                    let (ch_in, ch_out) = (channels(res)?, channels(res * 2)?);
                    let mut stage = decoder.child(i);
                    let mut block = stage.child("block");
                    block.layer(1, &conv(ch_in, ch_out, 3));
                    declare_res_block(&mut block.child(2), ch_out, norm);
                    declare_res_block(&mut block.child(3), ch_out, norm);
                }
            }
            root.layer(
                "out_conv",
                &conv(channels(config.gt_resolution)?, config.in_channel, 3),
            );

            for (s, codebook) in config.codebook_params.iter().enumerate() {
                root.child("quantize_group").layer(
                    format!("{s}.embedding"),
                    &EmbeddingConfig::new(codebook.num_embeddings, codebook.embedding_dim),
                );
            }
            for (s, codebook) in config.codebook_params.iter().enumerate() {
                let ch = channels(codebook.scale)?;
                let d_input = if s == 0 { ch } else { ch * 2 };
                root.child("before_quant_group")
                    .layer(s, &conv(d_input, codebook.embedding_dim, 1));
            }
            for (s, codebook) in config.codebook_params.iter().enumerate() {
                let ch = channels(codebook.scale)?;
                let d_input = match s {
                    0 => codebook.embedding_dim,
                    _ => config.codebook_params[s - 1].embedding_dim + codebook.embedding_dim,
                };
                root.child("after_quant_group")
                    .layer(format!("{s}.conv"), &conv(d_input, ch, 3));
            }
        }
        builder.build().map_err(|err| err.to_string())
    }

    /// Codebook scales consistent with the quantizer channel widths.
    ///
    /// Later codebooks prefer half the previous scale.
    fn codebook_scales(
        first_scale: usize,
        channels: &[usize],
    ) -> Option<Vec<usize>> {
        let mut scales = vec![first_scale];
        for &ch in &channels[1..] {
            let prev = *scales.last()?;
            let preferred = prev / 2;
            let scale = if channels_at(preferred) == Some(ch) {
                preferred
            } else {
                resolutions_with(ch).next()?
            };
            scales.push(scale);
        }
        Some(scales)
    }
}

impl Architecture for FeMaSR {
    type Config = FeMaSRConfig;

    fn id(&self) -> &'static str {
        "FeMaSR"
    }

    fn purpose(&self) -> Purpose {
        Purpose::SuperResolution
    }

    fn detect(
        &self,
        weights: &WeightMap,
    ) -> Option<Detection<FeMaSRConfig>> {
        let in_conv = weights.shape_of_rank("multiscale_encoder.in_conv.weight", 4)?;
        let (encoder_channels, in_channel) = (in_conv[0], in_conv[1]);
        let out_conv = weights.shape_of_rank("out_conv.weight", 4)?;
        if out_conv[0] != in_channel || in_channel == 0 {
            return None;
        }
        let decoder_channels = out_conv[1];

        let max_depth = weights.seq_len("decoder_group");
        let num_blocks = weights.seq_len("multiscale_encoder.blocks");
        // Every decoder stage and codebook owns several keys.
        if max_depth == 0 || max_depth >= usize::BITS as usize || max_depth > weights.len() {
            return None;
        }
        let lq_stage = num_blocks > 0
            && weights.has_prefix(&format!(
                "multiscale_encoder.blocks.{}.swin_blks.",
                num_blocks - 1
            ));
        let encode_depth = if lq_stage { num_blocks - 1 } else { num_blocks };
        if encode_depth > max_depth || (!lq_stage && encode_depth != max_depth) {
            return None;
        }
        let scale = 1usize.checked_shl(u32::try_from(max_depth - encode_depth).ok()?)?;

        let num_codebooks = weights.seq_len("quantize_group");
        if num_codebooks == 0 || num_codebooks > weights.len() {
            return None;
        }
        let mut codebooks: Vec<(usize, usize)> = Vec::new();
        let mut quant_channels: Vec<usize> = Vec::new();
        for s in 0..num_codebooks {
            let embedding =
                weights.shape_of_rank(&format!("quantize_group.{s}.embedding.weight"), 2)?;
            let after = weights.shape_of_rank(&format!("after_quant_group.{s}.conv.weight"), 4)?;
            codebooks.push((embedding[0], embedding[1]));
            quant_channels.push(after[0]);
        }

        let norm_prefix = "decoder_group.0.block.2.conv.0.norm";
        let norm_type = if weights.contains_key(&format!("{norm_prefix}.running_mean")) {
            FeMaSRNorm::Batch
        } else if weights.contains_key(&format!("{norm_prefix}.weight")) {
            FeMaSRNorm::Group
        } else {
            FeMaSRNorm::Instance
        };

        let mut structural: Option<FeMaSRConfig> = None;
        let mut verified: Vec<FeMaSRConfig> = Vec::new();
        for gt_resolution in resolutions_with(decoder_channels) {
            let cs0 = gt_resolution >> max_depth;
            if cs0 << max_depth != gt_resolution
                || channels_at(cs0) != Some(quant_channels[0])
                || channels_at(gt_resolution / scale) != Some(encoder_channels)
            {
                continue;
            }
            let Some(scales) = Self::codebook_scales(cs0, &quant_channels) else {
                continue;
            };

            let config = FeMaSRConfig::new()
                .with_in_channel(in_channel)
                .with_codebook_params(
                    scales
                        .iter()
                        .zip(&codebooks)
                        .map(|(&scale, &(num, dim))| Codebook::new(scale, num, dim))
                        .collect(),
                )
                .with_gt_resolution(gt_resolution)
                .with_lq_stage(lq_stage)
                .with_norm_type(norm_type)
                .with_scale_factor(if lq_stage { scale } else { 4 });

            match self.build_layout(&config) {
                Ok(layout) if layout.matches(weights) => verified.push(config),
                Ok(_) => {
                    tracing::debug!(gt_resolution, "FeMaSR candidate does not reproduce shapes");
                    structural.get_or_insert(config);
                }
                Err(reason) => {
                    tracing::debug!(gt_resolution, %reason, "FeMaSR candidate rejected");
                }
            }
        }

        let ambiguous_resolution = verified.len() > 1;
        let config = verified.into_iter().next().or(structural)?;

        let mut detection = Detection::exact(config).with_ambiguous("act_type");
        if !lq_stage {
            detection = detection.with_ambiguous("scale_factor");
        }
        if ambiguous_resolution {
            detection = detection
                .with_ambiguous("gt_resolution")
                .with_ambiguous("codebook_params");
        }
        if quant_channels[1..]
            .iter()
            .any(|ch| resolutions_with(*ch).count() > 1)
        {
            detection = detection.with_ambiguous("codebook_params");
        }
        Some(detection)
    }

    fn layout(
        &self,
        config: &FeMaSRConfig,
    ) -> Result<NetworkLayout, LoadError> {
        self.build_layout(config)
            .map_err(|reason| LoadError::invalid_config(self.id(), reason))
    }

    fn metadata(
        &self,
        config: &FeMaSRConfig,
    ) -> ModelMetadata {
        let encode_depth = config.geometry().map_or(0, |g| g.encode_depth);
        let multiple_of = (1 << encode_depth) * if config.lq_stage { 8 } else { 1 };

        let mut meta = ModelMetadata::new(config.in_channel, config.in_channel)
            .with_scale(config.scale())
            .with_supports_half(false)
            .with_size(SizeRequirements::default().with_multiple_of(multiple_of))
            .with_tag(if config.lq_stage { "lq" } else { "hq" });
        for codebook in &config.codebook_params {
            meta = meta.with_tag(format!(
                "{}x{}",
                codebook.num_embeddings, codebook.embedding_dim
            ));
        }
        meta
    }
}
