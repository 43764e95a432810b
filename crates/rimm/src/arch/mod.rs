//! # Architecture Handlers
//!
//! An [`Architecture`] is a stateless detector + constructor pair for one
//! network family:
//!
//! * [`Architecture::detect`] - recognize a [`WeightMap`] and recover a
//!   hyperparameter set from tensor shapes and key patterns; `None` for
//!   foreign weight maps.
//! * [`Architecture::layout`] - the exact parameter layout a hyperparameter
//!   set produces.
//! * [`Architecture::metadata`] - descriptor fields for a hyperparameter set.
//!
//! The registry stores handlers as [`ArchHandler`] trait objects; every
//! [`Architecture`] is an [`ArchHandler`] through a blanket impl.
//!
//! ## Shape Ambiguity
//!
//! Some hyperparameters cannot be recovered from shapes alone. Detectors
//! choose a canonical value for these, and list the field names in
//! [`Detection::ambiguous`]; comparisons against a known configuration
//! must skip them (see [`Detection::mismatched_fields`]).

pub mod compact;
pub mod femasr;
pub mod fftformer;
pub mod prefabs;

use crate::descriptor::{ModelMetadata, Purpose};
use crate::errors::LoadError;
use crate::network::{Network, NetworkLayout};
use crate::utility::config_diff::{config_value, mismatched_fields};
use crate::weights::WeightMap;
use burn::prelude::{Backend, Config};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// The result of a successful detection.
#[derive(Debug, Clone)]
pub struct Detection<C> {
    /// The recovered hyperparameters.
    pub config: C,

    /// Fields holding a canonical choice among shape-equivalent values.
    pub ambiguous: Vec<&'static str>,
}

impl<C> Detection<C> {
    /// A detection with no ambiguous fields.
    pub fn exact(config: C) -> Self {
        Self {
            config,
            ambiguous: Vec::new(),
        }
    }

    /// Mark a field as ambiguous.
    pub fn with_ambiguous(
        mut self,
        field: &'static str,
    ) -> Self {
        if !self.ambiguous.contains(&field) {
            self.ambiguous.push(field);
        }
        self
    }

    /// Is a field ambiguous?
    pub fn is_ambiguous(
        &self,
        field: &str,
    ) -> bool {
        self.ambiguous.contains(&field)
    }
}

impl<C: Serialize> Detection<C> {
    /// Fields that differ from `expected`, ignoring ambiguous fields.
    pub fn mismatched_fields(
        &self,
        expected: &C,
    ) -> Result<Vec<String>, serde_json::Error> {
        Ok(mismatched_fields(
            &config_value(expected)?,
            &config_value(&self.config)?,
            &self.ambiguous,
        ))
    }
}

/// A network family: detection, construction, and metadata.
pub trait Architecture: Send + Sync + 'static {
    /// The hyperparameter set.
    type Config: Config + Debug + Clone;

    /// Stable architecture id.
    fn id(&self) -> &'static str;

    /// The purpose category.
    fn purpose(&self) -> Purpose;

    /// Recognize a weight map and recover its hyperparameters.
    ///
    /// Must return `None`, not panic, for weight maps of other families.
    fn detect(
        &self,
        weights: &WeightMap,
    ) -> Option<Detection<Self::Config>>;

    /// The parameter layout of a hyperparameter set.
    ///
    /// # Errors
    ///
    /// [`LoadError::InvalidConfiguration`] for inconsistent hyperparameters.
    fn layout(
        &self,
        config: &Self::Config,
    ) -> Result<NetworkLayout, LoadError>;

    /// Descriptor metadata of a hyperparameter set.
    fn metadata(
        &self,
        config: &Self::Config,
    ) -> ModelMetadata;

    /// Construct an empty network.
    fn construct<B: Backend>(
        &self,
        config: &Self::Config,
        device: &B::Device,
    ) -> Result<Network<B>, LoadError>
    where
        Self: Sized,
    {
        Ok(self.layout(config)?.init(device))
    }
}

/// A type-erased detection, ready for construction.
#[derive(Debug, Clone)]
pub struct Detected {
    /// Architecture id.
    pub architecture: &'static str,

    /// Purpose category.
    pub purpose: Purpose,

    /// The recovered hyperparameters, serialized.
    pub config: Value,

    /// Ambiguous fields of `config`.
    pub ambiguous: Vec<&'static str>,

    /// The layout of `config`.
    pub layout: NetworkLayout,

    /// Descriptor metadata of `config`.
    pub metadata: ModelMetadata,
}

/// Object-safe view of an [`Architecture`], as stored by the registry.
pub trait ArchHandler: Send + Sync {
    /// Stable architecture id.
    fn architecture_id(&self) -> &'static str;

    /// The purpose category.
    fn architecture_purpose(&self) -> Purpose;

    /// Detect, and resolve the detected config into a layout and metadata.
    ///
    /// `None` is "no match"; an error means the handler failed to
    /// construct its own detected configuration.
    fn detect_weights(
        &self,
        weights: &WeightMap,
    ) -> Option<Result<Detected, LoadError>>;
}

impl<A: Architecture> ArchHandler for A {
    fn architecture_id(&self) -> &'static str {
        self.id()
    }

    fn architecture_purpose(&self) -> Purpose {
        self.purpose()
    }

    fn detect_weights(
        &self,
        weights: &WeightMap,
    ) -> Option<Result<Detected, LoadError>> {
        let detection = self.detect(weights)?;
        Some(resolve(self, detection))
    }
}

fn resolve<A: Architecture>(
    arch: &A,
    detection: Detection<A::Config>,
) -> Result<Detected, LoadError> {
    let architecture = arch.id();
    let internal = |reason: String| LoadError::InternalDetection {
        architecture,
        reason,
    };

    let layout = arch
        .layout(&detection.config)
        .map_err(|err| internal(err.to_string()))?;
    let config = config_value(&detection.config).map_err(|err| internal(err.to_string()))?;
    Ok(Detected {
        architecture,
        purpose: arch.purpose(),
        config,
        metadata: arch.metadata(&detection.config),
        ambiguous: detection.ambiguous,
        layout,
    })
}
