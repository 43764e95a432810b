//! # Utilities
//!
//! * [`config_diff`] - field-level comparison of serialized configs.

pub mod config_diff;
