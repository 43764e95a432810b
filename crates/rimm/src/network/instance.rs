//! # Network Instances
//!
//! A [`Network`] is a [`NetworkLayout`] materialized on a backend device.
//! Each declared tensor is held flat (rank 1), so scalars and arbitrary
//! ranks share one storage path; the declared shape lives in the layout.

use crate::errors::LoadError;
use crate::network::{NetworkLayout, ParamKind, ParamSpec};
use crate::weights::WeightMap;
use burn::prelude::{Backend, Tensor};
use burn::tensor::{DType, Int, TensorData};

#[derive(Debug, Clone)]
enum Slot<B: Backend> {
    Float(Tensor<B, 1>),
    Index(Tensor<B, 1, Int>),
}

impl<B: Backend> Slot<B> {
    fn zeros(
        spec: &ParamSpec,
        device: &B::Device,
    ) -> Self {
        let n = spec.num_elements();
        match spec.kind {
            ParamKind::Parameter | ParamKind::Buffer => Slot::Float(Tensor::zeros([n], device)),
            ParamKind::IndexBuffer => Slot::Index(Tensor::zeros([n], device)),
        }
    }

    fn from_data(
        spec: &ParamSpec,
        mut data: TensorData,
        device: &B::Device,
    ) -> Self {
        data.shape = vec![spec.num_elements()];
        match spec.kind {
            ParamKind::Parameter | ParamKind::Buffer => {
                Slot::Float(Tensor::from_data(data.convert::<f32>(), device))
            }
            ParamKind::IndexBuffer => Slot::Index(Tensor::from_data(data.convert::<i64>(), device)),
        }
    }

    fn to_data(
        &self,
        spec: &ParamSpec,
    ) -> TensorData {
        let mut data = match self {
            Slot::Float(t) => t.to_data().convert::<f32>(),
            Slot::Index(t) => t.to_data().convert::<i64>(),
        };
        data.shape = spec.shape.clone();
        data
    }

    fn to_device(
        self,
        device: &B::Device,
    ) -> Self {
        match self {
            Slot::Float(t) => Slot::Float(t.to_device(device)),
            Slot::Index(t) => Slot::Index(t.to_device(device)),
        }
    }
}

/// Verify a source tensor can be converted into network storage.
fn check_tensor(
    key: &str,
    spec: &ParamSpec,
    data: &TensorData,
) -> Result<(), LoadError> {
    let invalid = |reason: String| LoadError::InvalidTensor {
        key: key.to_string(),
        reason,
    };
    match data.dtype {
        DType::F64
        | DType::F32
        | DType::F16
        | DType::BF16
        | DType::I64
        | DType::I32
        | DType::I16
        | DType::I8
        | DType::U64
        | DType::U32
        | DType::U16
        | DType::U8 => {}
        other => return Err(invalid(format!("unsupported dtype {other:?}"))),
    }

    let expected = spec.num_elements() * data.dtype.size();
    let actual = data.as_bytes().len();
    if actual != expected {
        return Err(invalid(format!(
            "{actual} bytes of {:?} data for shape {:?} (expected {expected})",
            data.dtype, spec.shape
        )));
    }
    Ok(())
}

/// A constructed network: a layout plus device-resident parameter storage.
#[derive(Debug, Clone)]
pub struct Network<B: Backend> {
    layout: NetworkLayout,
    slots: Vec<Slot<B>>,
    device: B::Device,
}

impl NetworkLayout {
    /// Materialize an empty (zero-filled) network on a device.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Network<B> {
        Network {
            layout: self.clone(),
            slots: self
                .iter()
                .map(|(_, spec)| Slot::zeros(spec, device))
                .collect(),
            device: device.clone(),
        }
    }
}

impl<B: Backend> Network<B> {
    /// The layout this network was built from.
    pub fn layout(&self) -> &NetworkLayout {
        &self.layout
    }

    /// The network name.
    pub fn name(&self) -> &str {
        self.layout.name()
    }

    /// The device holding the parameters.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Total number of parameter elements.
    pub fn num_params(&self) -> usize {
        self.layout.num_elements()
    }

    /// Parameter keys, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.layout.iter().map(|(k, _)| k)
    }

    /// Read back a single tensor, in its declared shape.
    pub fn tensor_data(
        &self,
        key: &str,
    ) -> Option<TensorData> {
        self.layout
            .iter()
            .zip(&self.slots)
            .find(|((k, _), _)| *k == key)
            .map(|((_, spec), slot)| slot.to_data(spec))
    }

    /// Load a complete weight map.
    ///
    /// The map must have exactly the layout's keys and shapes. Every tensor
    /// is validated before any storage is replaced; on error the network is
    /// left untouched.
    #[tracing::instrument(skip_all, fields(network = %self.layout.name()))]
    pub fn load_weights(
        &mut self,
        weights: &WeightMap,
    ) -> Result<(), LoadError> {
        self.layout.check(weights)?;

        let mut staged = Vec::with_capacity(self.slots.len());
        for (key, spec) in self.layout.iter() {
            let data = weights
                .get(key)
                .ok_or_else(|| LoadError::InvalidTensor {
                    key: key.to_string(),
                    reason: "missing".to_string(),
                })?;
            check_tensor(key, spec, data)?;
            staged.push((spec, data.clone()));
        }

        self.slots = staged
            .into_iter()
            .map(|(spec, data)| Slot::from_data(spec, data, &self.device))
            .collect();
        tracing::debug!(tensors = self.slots.len(), "loaded weights");
        Ok(())
    }

    /// Serialize the network into a weight map.
    ///
    /// Parameters and buffers are emitted as `f32`, index buffers as `i64`.
    pub fn to_weight_map(&self) -> WeightMap {
        self.layout
            .iter()
            .zip(&self.slots)
            .map(|((key, spec), slot)| (key, slot.to_data(spec)))
            .collect()
    }

    /// Move all parameter storage to a device.
    pub fn to_device(
        mut self,
        device: &B::Device,
    ) -> Self {
        self.relocate(device);
        self
    }

    /// Move all parameter storage to a device, in place.
    pub fn relocate(
        &mut self,
        device: &B::Device,
    ) {
        self.slots = std::mem::take(&mut self.slots)
            .into_iter()
            .map(|slot| slot.to_device(device))
            .collect();
        self.device = device.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::LayoutBuilder;
    use burn::backend::NdArray;
    use burn::nn::BatchNormConfig;
    use burn::nn::conv::Conv2dConfig;

    type TestBackend = NdArray<f32>;

    fn layout() -> NetworkLayout {
        let mut builder = LayoutBuilder::new("Small");
        {
            let mut root = builder.root();
            root.layer("conv", &Conv2dConfig::new([2, 3], [1, 1]));
            root.layer("bn", &BatchNormConfig::new(3));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_init_and_serialize() {
        let device = Default::default();
        let network: Network<TestBackend> = layout().init(&device);
        assert_eq!(network.name(), "Small");
        assert_eq!(network.num_params(), 6 + 3 + 4 * 3 + 1);

        let weights = network.to_weight_map();
        assert_eq!(weights.len(), 7);
        assert_eq!(weights.shape("conv.weight"), Some(&[3, 2, 1, 1][..]));
        assert_eq!(weights.get("conv.weight").unwrap().dtype, DType::F32);

        let counter = weights.get("bn.num_batches_tracked").unwrap();
        assert_eq!(counter.dtype, DType::I64);
        assert!(counter.shape.is_empty());

        assert!(layout().matches(&weights));
    }

    #[test]
    fn test_load_weights_round_trip() {
        let device = Default::default();
        let mut network: Network<TestBackend> = layout().init(&device);

        let weights = network
            .to_weight_map()
            .with(
                "conv.weight",
                TensorData::new(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2, 1, 1]),
            )
            .with("bn.num_batches_tracked", TensorData::new(vec![7i32], Vec::<usize>::new()));

        network.load_weights(&weights).unwrap();

        let conv = network.tensor_data("conv.weight").unwrap();
        assert_eq!(conv.shape, vec![3, 2, 1, 1]);
        assert_eq!(
            conv.to_vec::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );

        let counter = network.tensor_data("bn.num_batches_tracked").unwrap();
        assert_eq!(counter.to_vec::<i64>().unwrap(), vec![7]);
        assert!(network.tensor_data("nope").is_none());
    }

    #[test]
    fn test_load_weights_is_all_or_nothing() {
        let device = Default::default();
        let mut network: Network<TestBackend> = layout().init(&device);

        let weights = network
            .to_weight_map()
            .with("conv.bias", TensorData::new(vec![1.0f32, 1.0, 1.0], [3]))
            .with("bn.weight", TensorData::new(vec![true, false, true], [3]));

        match network.load_weights(&weights).unwrap_err() {
            LoadError::InvalidTensor { key, .. } => assert_eq!(key, "bn.weight"),
            err => panic!("unexpected error: {err:?}"),
        }

        let bias = network.tensor_data("conv.bias").unwrap();
        assert_eq!(bias.to_vec::<f32>().unwrap(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_load_weights_rejects_mismatch() {
        let device = Default::default();
        let mut network: Network<TestBackend> = layout().init(&device);

        let mut weights = network.to_weight_map();
        weights.remove("bn.running_var");
        assert!(matches!(
            network.load_weights(&weights),
            Err(LoadError::WeightShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_relocate() {
        let device = Default::default();
        let network: Network<TestBackend> = layout().init(&device);
        let before = network.to_weight_map();

        let moved = network.to_device(&device);
        assert_eq!(moved.device(), &device);
        assert_eq!(moved.to_weight_map(), before);
    }
}
