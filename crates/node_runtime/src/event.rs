use serde::Serialize;

use crate::{error::Result, runtime::Runtime};

/// Events a node reports back to the flow.
impl Runtime {
    /// Sends `message`, serialized as JSON, to the host's debug stream.
    pub async fn emit_debug<T>(&self, guid: &str, name: &str, message: &T) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let host = self.host()?;
        let bytes = serde_json::to_vec(message)?;
        host.emit_debug(guid, name, bytes).await
    }

    pub async fn emit_output(&self, guid: &str, output: Vec<u8>, port: i32) -> Result<()> {
        self.host()?.emit_output(guid, output, port).await
    }

    pub async fn emit_input(&self, guid: &str, input: Vec<u8>) -> Result<()> {
        self.host()?.emit_input(guid, input).await
    }

    pub async fn emit_error(&self, guid: &str, name: &str, message: &str) -> Result<()> {
        self.host()?.emit_error(guid, name, message).await
    }

    pub async fn emit_flow_event(&self, guid: &str, name: &str) -> Result<()> {
        self.host()?.emit_flow_event(guid, name).await
    }
}
