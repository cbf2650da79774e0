use async_trait::async_trait;
use node_runtime::{Context, InVariable, Node, NodeCommon, OutVariable, Runtime};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Copies `inValue` into `outValue`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetValue {
    #[serde(flatten)]
    pub common: NodeCommon,
    pub in_value: InVariable<Value>,
    pub out_value: OutVariable<Value>,
}

#[async_trait]
impl Node for SetValue {
    async fn on_message(&mut self, ctx: &mut dyn Context, rt: &Runtime) -> anyhow::Result<()> {
        let value = self.in_value.get(ctx, rt).await?;
        debug!(guid = %self.common.guid, from = %self.in_value.scope, to = %self.out_value.scope, "set value");
        self.out_value.set(ctx, rt, value).await?;
        Ok(())
    }
}
