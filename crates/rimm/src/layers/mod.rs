//! # Layer Parameter Layouts
//!
//! [`ParamLayout`] describes how a layer unit contributes tensors to a
//! [`crate::network::NetworkLayout`]. Keys follow the torch ``state_dict``
//! naming convention (``weight``, ``bias``, ``running_mean``, ...), and
//! shapes follow torch storage order (e.g. ``Linear.weight`` is
//! ``[d_output, d_input]``).
//!
//! The `burn::nn` layer configs are the opaque units:
//! * [`Conv2dConfig`] - ``weight [out, in / groups, kh, kw]``, optional ``bias [out]``.
//! * [`LinearConfig`] - ``weight [d_output, d_input]``, optional ``bias [d_output]``.
//! * [`LayerNormConfig`] - ``weight, bias [d_model]``.
//! * [`GroupNormConfig`], [`InstanceNormConfig`] - ``weight, bias [C]`` when affine.
//! * [`BatchNormConfig`] - affine params, running stats, ``num_batches_tracked``.
//! * [`EmbeddingConfig`] - ``weight [n_embedding, d_model]``.
//! * [`PReluConfig`] - ``weight [num_parameters]``.

pub mod activation;
pub mod normalization;

use crate::network::LayoutScope;
use burn::nn::conv::Conv2dConfig;
use burn::nn::{
    BatchNormConfig, EmbeddingConfig, GroupNormConfig, InstanceNormConfig, LayerNormConfig,
    LinearConfig, PReluConfig,
};

/// A unit that declares parameter tensors into a layout scope.
pub trait ParamLayout {
    /// Declare this unit's tensors into `scope`.
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    );
}

impl ParamLayout for Conv2dConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        let [d_in, d_out] = self.channels;
        let [kh, kw] = self.kernel_size;
        let groups = self.groups.max(1);
        scope.param("weight", [d_out, d_in / groups, kh, kw]);
        if self.bias {
            scope.param("bias", [d_out]);
        }
    }
}

impl ParamLayout for LinearConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        scope.param("weight", [self.d_output, self.d_input]);
        if self.bias {
            scope.param("bias", [self.d_output]);
        }
    }
}

impl ParamLayout for LayerNormConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        scope
            .param("weight", [self.d_model])
            .param("bias", [self.d_model]);
    }
}

impl ParamLayout for GroupNormConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        if self.affine {
            scope
                .param("weight", [self.num_channels])
                .param("bias", [self.num_channels]);
        }
    }
}

impl ParamLayout for InstanceNormConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        if self.affine {
            scope
                .param("weight", [self.num_channels])
                .param("bias", [self.num_channels]);
        }
    }
}

impl ParamLayout for BatchNormConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        let n = self.num_features;
        scope
            .param("weight", [n])
            .param("bias", [n])
            .buffer("running_mean", [n])
            .buffer("running_var", [n])
            .index_buffer("num_batches_tracked", Vec::<usize>::new());
    }
}

impl ParamLayout for EmbeddingConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        scope.param("weight", [self.n_embedding, self.d_model]);
    }
}

impl ParamLayout for PReluConfig {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        scope.param("weight", [self.num_parameters]);
    }
}

impl<L: ParamLayout> ParamLayout for Option<L> {
    fn declare(
        &self,
        scope: &mut LayoutScope<'_>,
    ) {
        if let Some(layer) = self {
            layer.declare(scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LayoutBuilder, NetworkLayout, ParamKind};

    fn layout_of<L: ParamLayout>(layer: &L) -> NetworkLayout {
        let mut builder = LayoutBuilder::new("Layer");
        builder.root().layer("l", layer);
        builder.build().unwrap()
    }

    fn shapes(layout: &NetworkLayout) -> Vec<(String, Vec<usize>)> {
        layout
            .iter()
            .map(|(k, spec)| (k.to_string(), spec.shape.clone()))
            .collect()
    }

    #[test]
    fn test_conv2d_layout() {
        let layout = layout_of(&Conv2dConfig::new([6, 12], [3, 1]).with_groups(3));
        assert_eq!(
            shapes(&layout),
            vec![
                ("l.weight".to_string(), vec![12, 2, 3, 1]),
                ("l.bias".to_string(), vec![12]),
            ]
        );

        let layout = layout_of(&Conv2dConfig::new([6, 12], [3, 3]).with_bias(false));
        assert_eq!(
            shapes(&layout),
            vec![("l.weight".to_string(), vec![12, 6, 3, 3])]
        );
    }

    #[test]
    fn test_linear_layout_is_torch_ordered() {
        let layout = layout_of(&LinearConfig::new(4, 10));
        assert_eq!(layout.shape("l.weight"), Some(&[10, 4][..]));
        assert_eq!(layout.shape("l.bias"), Some(&[10][..]));
    }

    #[test]
    fn test_norm_layouts() {
        let layout = layout_of(&BatchNormConfig::new(8));
        assert_eq!(layout.len(), 5);
        assert_eq!(layout.get("l.running_var").unwrap().kind, ParamKind::Buffer);
        assert_eq!(layout.shape("l.num_batches_tracked"), Some(&[][..]));

        let layout = layout_of(&GroupNormConfig::new(4, 8));
        assert_eq!(layout.len(), 2);

        let layout = layout_of(&GroupNormConfig::new(4, 8).with_affine(false));
        assert!(layout.is_empty());

        let layout = layout_of(&InstanceNormConfig::new(8).with_affine(false));
        assert!(layout.is_empty());

        let layout = layout_of(&LayerNormConfig::new(8));
        assert_eq!(layout.shape("l.bias"), Some(&[8][..]));
    }

    #[test]
    fn test_misc_layouts() {
        let layout = layout_of(&EmbeddingConfig::new(1024, 512));
        assert_eq!(layout.shape("l.weight"), Some(&[1024, 512][..]));

        let layout = layout_of(&PReluConfig::new().with_num_parameters(16));
        assert_eq!(layout.shape("l.weight"), Some(&[16][..]));

        let layout = layout_of(&None::<LinearConfig>);
        assert!(layout.is_empty());
    }
}
