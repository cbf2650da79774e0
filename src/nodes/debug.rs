use async_trait::async_trait;
use node_runtime::{Context, Node, NodeCommon, Runtime};
use serde::Deserialize;
use serde_json::Value;

/// Sends the message, or one path of it, to the host's debug stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugMessage {
    #[serde(flatten)]
    pub common: NodeCommon,
    /// Empty means the whole message.
    #[serde(default)]
    pub path: String,
}

#[async_trait]
impl Node for DebugMessage {
    async fn on_message(&mut self, ctx: &mut dyn Context, rt: &Runtime) -> anyhow::Result<()> {
        let value = if self.path.is_empty() {
            serde_json::from_slice(&ctx.get_raw(&[])?)?
        } else {
            ctx.get(&self.path).unwrap_or(Value::Null)
        };
        rt.emit_debug(&self.common.guid, &self.common.name, &value).await?;
        Ok(())
    }
}
