//! Reverse channel to the host: variables, robot info, vault and events.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    jsonrpc::{HostMethod, Id, Message, Request, Response},
    message::*,
    value::HostValue,
};

/// Calls a node package makes on its host.
#[async_trait]
pub trait HostClient: Send + Sync + 'static {
    async fn get_variable(&self, variable: VariableRef) -> Result<HostValue>;
    async fn set_variable(&self, variable: VariableRef, value: HostValue) -> Result<()>;
    async fn get_robot_info(&self) -> Result<HostValue>;
    async fn get_vault_item(&self, vault_id: &str, item_id: &str) -> Result<HostValue>;
    async fn set_vault_item(
        &self,
        vault_id: &str,
        item_id: &str,
        data: Vec<u8>,
    ) -> Result<HostValue>;
    async fn emit_debug(&self, guid: &str, name: &str, message: Vec<u8>) -> Result<()>;
    async fn emit_output(&self, guid: &str, output: Vec<u8>, port: i32) -> Result<()>;
    async fn emit_input(&self, guid: &str, input: Vec<u8>) -> Result<()>;
    async fn emit_error(&self, guid: &str, name: &str, message: &str) -> Result<()>;
    async fn emit_flow_event(&self, guid: &str, name: &str) -> Result<()>;
    /// Tells the host this package is going away.
    async fn close(&self) -> Result<()>;
    /// False once the connection to the host has ended.
    fn is_connected(&self) -> bool;
}

type Outbound = (Request, oneshot::Sender<Response>);

/// [`HostClient`] speaking JSON-RPC over TCP to `127.0.0.1:<port>`.
#[derive(Debug, Clone)]
pub struct RpcHostClient {
    /// outbound <Request, responder> channel shared with the writer task
    tx: mpsc::Sender<Outbound>,
    connected: Arc<AtomicBool>,
}

impl RpcHostClient {
    /// Connects to the host's callback server and spawns the I/O tasks.
    pub async fn connect(port: u16) -> Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|e| Error::HostRpc(format!("connecting to host on port {port}: {e}")))?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();

        let (tx, mut rx) = mpsc::channel::<Outbound>(32);
        let connected = Arc::new(AtomicBool::new(true));
        // track in-flight calls by encoded `id`
        let inflight: Arc<DashMap<String, oneshot::Sender<Response>>> = Arc::new(DashMap::new());

        {
            let inflight = Arc::clone(&inflight);
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                let mut w = BufWriter::new(write_half);
                while let Some((req, rsp_tx)) = rx.recv().await {
                    let key = req.id.as_ref().map(Id::key).unwrap_or_default();
                    let line = match serde_json::to_string(&req) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(method = %req.method, error = %e, "could not encode host call");
                            continue;
                        }
                    };
                    inflight.insert(key.clone(), rsp_tx);
                    // the reader may have cleared the map already; dropping
                    // the responder fails the call
                    if !connected.load(Ordering::Acquire) {
                        inflight.remove(&key);
                        continue;
                    }
                    let written = async {
                        w.write_all(line.as_bytes()).await?;
                        w.write_all(b"\n").await?;
                        w.flush().await
                    }
                    .await;
                    if let Err(e) = written {
                        warn!(error = %e, "host connection write failed");
                        inflight.remove(&key);
                        connected.store(false, Ordering::Release);
                        break;
                    }
                }
            });
        }

        {
            let inflight = Arc::clone(&inflight);
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                let mut rdr = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = rdr.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Message>(&line) {
                        Ok(Message::Response(rsp)) => {
                            if let Some((_, tx_rsp)) = inflight.remove(&rsp.id.key()) {
                                let _ = tx_rsp.send(rsp);
                            }
                        }
                        Ok(Message::Request(req)) => {
                            debug!(method = %req.method, "ignoring request from host");
                        }
                        Err(e) => debug!(error = %e, "ignoring malformed line from host"),
                    }
                }
                info!("host connection closed");
                connected.store(false, Ordering::Release);
                // fail everything still waiting
                inflight.clear();
            });
        }

        Ok(Self { tx, connected })
    }

    /// Send `method` with `params` and deserialize the JSON-RPC result into `R`.
    async fn call<R, P>(&self, method: HostMethod, params: P) -> Result<R>
    where
        R: DeserializeOwned,
        P: Serialize,
    {
        if !self.is_connected() {
            return Err(Error::HostRpc("host connection is closed".into()));
        }
        let id = Id::String(Uuid::new_v4().to_string());
        let req = Request::call(id, method, Some(serde_json::to_value(params)?));

        let (tx_rsp, rx_rsp) = oneshot::channel();
        self.tx
            .send((req, tx_rsp))
            .await
            .map_err(|_| Error::HostRpc("host writer is gone".into()))?;

        let rsp = rx_rsp
            .await
            .map_err(|_| Error::HostRpc(format!("no response to {method}")))?;

        if let Some(err) = rsp.error {
            return Err(match err.rpc_error() {
                Some(rpc) => Error::Rpc(rpc),
                None => Error::HostRpc(format!("{method} failed ({}): {}", err.code, err.message)),
            });
        }
        Ok(serde_json::from_value(rsp.result.unwrap_or(Value::Null))?)
    }
}

#[async_trait]
impl HostClient for RpcHostClient {
    async fn get_variable(&self, variable: VariableRef) -> Result<HostValue> {
        let res: GetVariableResult = self
            .call(HostMethod::GetVariable, GetVariableParams { variable })
            .await?;
        Ok(res.value)
    }

    async fn set_variable(&self, variable: VariableRef, value: HostValue) -> Result<()> {
        self.call(HostMethod::SetVariable, SetVariableParams { variable, value })
            .await
    }

    async fn get_robot_info(&self) -> Result<HostValue> {
        let res: GetRobotInfoResult = self.call(HostMethod::GetRobotInfo, Value::Null).await?;
        Ok(res.robot)
    }

    async fn get_vault_item(&self, vault_id: &str, item_id: &str) -> Result<HostValue> {
        let params = GetVaultItemParams {
            vault_id: vault_id.into(),
            item_id: item_id.into(),
        };
        let res: VaultItemResult = self.call(HostMethod::GetVaultItem, params).await?;
        Ok(res.item)
    }

    async fn set_vault_item(
        &self,
        vault_id: &str,
        item_id: &str,
        data: Vec<u8>,
    ) -> Result<HostValue> {
        let params = SetVaultItemParams {
            vault_id: vault_id.into(),
            item_id: item_id.into(),
            data,
        };
        let res: VaultItemResult = self.call(HostMethod::SetVaultItem, params).await?;
        Ok(res.item)
    }

    async fn emit_debug(&self, guid: &str, name: &str, message: Vec<u8>) -> Result<()> {
        let params = DebugParams {
            guid: guid.into(),
            name: name.into(),
            message,
        };
        self.call(HostMethod::Debug, params).await
    }

    async fn emit_output(&self, guid: &str, output: Vec<u8>, port: i32) -> Result<()> {
        let params = EmitOutputParams {
            guid: guid.into(),
            output,
            port,
        };
        self.call(HostMethod::EmitOutput, params).await
    }

    async fn emit_input(&self, guid: &str, input: Vec<u8>) -> Result<()> {
        let params = EmitInputParams {
            guid: guid.into(),
            input,
        };
        self.call(HostMethod::EmitInput, params).await
    }

    async fn emit_error(&self, guid: &str, name: &str, message: &str) -> Result<()> {
        let params = EmitErrorParams {
            guid: guid.into(),
            name: name.into(),
            message: message.into(),
        };
        self.call(HostMethod::EmitError, params).await
    }

    async fn emit_flow_event(&self, guid: &str, name: &str) -> Result<()> {
        let params = EmitFlowEventParams {
            guid: guid.into(),
            name: name.into(),
        };
        self.call(HostMethod::EmitFlowEvent, params).await
    }

    async fn close(&self) -> Result<()> {
        self.call(HostMethod::Close, Value::Null).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Answers every call with `reply(method, params)` until the peer hangs up.
    async fn fake_host<F>(reply: F) -> (u16, tokio::task::JoinHandle<Vec<Request>>)
    where
        F: Fn(&str, &Value) -> Response + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (r, mut w) = stream.into_split();
            let mut lines = BufReader::new(r).lines();
            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Request = serde_json::from_str(&line).unwrap();
                let params = req.params.clone().unwrap_or(Value::Null);
                let mut rsp = reply(&req.method, &params);
                rsp.id = req.id.clone().unwrap();
                w.write_all(format!("{}\n", serde_json::to_string(&rsp).unwrap()).as_bytes())
                    .await
                    .unwrap();
                seen.push(req);
                if seen.len() == 2 {
                    break;
                }
            }
            seen
        });
        (port, handle)
    }

    #[tokio::test]
    async fn calls_are_matched_to_responses() {
        let (port, host) = fake_host(|method, params| match method {
            "getVariable" => {
                assert_eq!(params["variable"]["name"], "count");
                Response::success(Id::Null, json!({"value": {"kind": "number", "value": 3.0}}))
            }
            _ => Response::success(Id::Null, Value::Null),
        })
        .await;

        let client = RpcHostClient::connect(port).await.unwrap();
        let var = VariableRef {
            scope: "Global".into(),
            name: "count".into(),
            payload: vec![],
        };
        let value = client.get_variable(var).await.unwrap();
        assert_eq!(value.into_json(), json!(3));

        client.emit_flow_event("n1", "started").await.unwrap();

        let seen = host.await.unwrap();
        assert_eq!(seen[1].method, "emitFlowEvent");
        assert_eq!(seen[1].params.as_ref().unwrap()["guid"], "n1");
    }

    #[tokio::test]
    async fn typed_host_errors_are_kept() {
        let (port, _host) = fake_host(|_, _| {
            Response::rpc_error(
                Id::Null,
                &crate::error::RpcError::new("Err.NoVault", "vault locked"),
            )
        })
        .await;
        let client = RpcHostClient::connect(port).await.unwrap();
        let err = client.get_vault_item("v", "i").await.unwrap_err();
        assert_eq!(err.code(), "Err.NoVault");
    }

    #[tokio::test]
    async fn hangup_clears_the_connected_flag() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        let client = RpcHostClient::connect(port).await.unwrap();
        accept.await.unwrap();

        for _ in 0..100 {
            if !client.is_connected() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!client.is_connected());
        let err = client.get_robot_info().await.unwrap_err();
        assert_eq!(err.code(), "Err.HostRpc");
    }
}
