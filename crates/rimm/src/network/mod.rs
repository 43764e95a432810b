//! # Networks
//!
//! * [`NetworkLayout`] - the backend-free parameter layout of a constructed architecture.
//! * [`Network`] - a layout materialized on a burn device.

mod instance;
mod layout;

pub use instance::Network;
pub use layout::{LayoutBuilder, LayoutScope, NetworkLayout, ParamKind, ParamSpec};
