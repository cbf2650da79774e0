//! Demo node package: a handful of core nodes served over the node runtime.

pub mod nodes;

use node_runtime::NodeRegistry;

use crate::nodes::{DebugMessage, Fail, SetValue};

pub const SET_VALUE: &str = "Robomotion.Core.SetValue";
pub const DEBUG: &str = "Robomotion.Core.Debug";
pub const FAIL: &str = "Robomotion.Core.Fail";

/// Every node type this package serves.
pub fn registry() -> NodeRegistry {
    NodeRegistry::new()
        .with::<SetValue>(SET_VALUE)
        .with::<DebugMessage>(DEBUG)
        .with::<Fail>(FAIL)
}
