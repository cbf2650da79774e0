use anyhow::anyhow;
use async_trait::async_trait;
use node_runtime::{Context, Node, NodeCommon, Runtime, RpcError};
use serde::Deserialize;

/// Fails every message it sees.
///
/// With `code` set the host receives that code, otherwise `Err.Unknown`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fail {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

fn default_message() -> String {
    "failed on purpose".to_string()
}

#[async_trait]
impl Node for Fail {
    async fn on_message(&mut self, _ctx: &mut dyn Context, _rt: &Runtime) -> anyhow::Result<()> {
        match &self.code {
            Some(code) => Err(RpcError::new(code.clone(), self.message.clone()).into()),
            None => Err(anyhow!(self.message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use node_runtime::{Error, MessageContext, RuntimeConfig};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn custom_code_reaches_the_host() {
        let rt = Runtime::new(RuntimeConfig::default());
        let mut n: Fail = serde_json::from_value(json!({
            "guid": "f1", "message": "nope", "code": "Err.Custom"
        }))
        .unwrap();
        let mut ctx = MessageContext::default();
        let err = Error::from_anyhow(n.on_message(&mut ctx, &rt).await.unwrap_err());
        assert_eq!(err.to_rpc_error(), RpcError::new("Err.Custom", "nope"));
    }

    #[tokio::test]
    async fn default_is_unknown() {
        let rt = Runtime::new(RuntimeConfig::default());
        let mut n: Fail = serde_json::from_value(json!({"guid": "f1"})).unwrap();
        let mut ctx = MessageContext::default();
        let err = Error::from_anyhow(n.on_message(&mut ctx, &rt).await.unwrap_err());
        assert_eq!(err.code(), "Err.Unknown");
        assert_eq!(err.to_string(), "failed on purpose");
    }
}
