use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::Context, runtime::Runtime};

/// A message-processing unit created from host-supplied configuration.
///
/// Hooks return `anyhow::Result` so node code can use `?` freely; return a
/// [`crate::Error`] or [`crate::RpcError`] to control the code the host sees.
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Called once after the config is deserialized, before registration.
    async fn on_create(&mut self, _rt: &Runtime) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_message(&mut self, ctx: &mut dyn Context, rt: &Runtime) -> anyhow::Result<()>;

    async fn on_close(&mut self, _rt: &Runtime) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fields every node config carries next to its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCommon {
    pub guid: String,
    #[serde(default)]
    pub name: String,
    /// Seconds; applied by the host.
    #[serde(default)]
    pub delay_before: f64,
    #[serde(default)]
    pub delay_after: f64,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub scope: String,
}
