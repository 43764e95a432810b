#![warn(missing_docs)]
//!# rimm - Restoration Image Model Map
//!
//! Detect, construct, and load pretrained image restoration networks from
//! bare weight maps; no config file required.
//!
//! ```rust,no_run
//! use burn::backend::NdArray;
//! use rimm::registry::MAIN_REGISTRY;
//! use rimm::weights::WeightMap;
//!
//! # fn read_checkpoint() -> WeightMap { WeightMap::new() }
//! let weights: WeightMap = read_checkpoint();
//! let desc = MAIN_REGISTRY
//!     .load::<NdArray<f32>>(weights, &Default::default())
//!     .unwrap();
//! println!("{} x{}", desc.architecture(), desc.scale());
//! ```
//!
//! ## Notable Components
//!
//! * [`weights`] - the raw input: ordered parameter name to tensor maps.
//! * [`network`] - parameter layouts, and the networks built from them.
//! * [`layers`] - parameter declarations for ``burn`` layer configs.
//!   * [`layers::activation`] - activation choice wrapper.
//!   * [`layers::normalization`] - norm layer choice wrapper.
//! * [`arch`] - architecture handlers.
//!   * [`arch::compact`] - compact VGG-style SR.
//!   * [`arch::femasr`] - ``FeMaSR``, codebook SR.
//!   * [`arch::fftformer`] - ``FFTformer``, frequency-domain deblurring.
//!   * [`arch::prefabs`] - well-known configs.
//! * [`registry`] - handler registry and the detection pipeline.
//! * [`loader`] - checkpoint canonicalization and device binding.
//! * [`descriptor`] - loaded model descriptors and size requirements.
//! * [`errors`] - the error taxonomy.
//! * [`utility`] - misc utilities.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

#[cfg(test)]
pub(crate) mod testing;

pub mod errors;
pub mod weights;

pub mod layers;
pub mod network;

pub mod arch;
pub mod descriptor;
pub mod loader;
pub mod registry;
pub mod utility;
