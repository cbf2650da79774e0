//! Serves a [`NodeServer`] to the host as newline-delimited JSON-RPC over TCP.
//!
//! Usage:
//! ```ignore
//! use std::sync::Arc;
//! use node_runtime::{NodeRegistry, NodeServer, Runtime, RuntimeConfig, plugin_runtime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rt = Arc::new(Runtime::new(RuntimeConfig::load()));
//!     let server = Arc::new(NodeServer::new(rt, NodeRegistry::new().with::<MyNode>("My.Node")));
//!     plugin_runtime::serve(server).await?;
//!     Ok(())
//! }
//! ```

use std::{io::Write, net::SocketAddr, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::{TcpListener, TcpStream},
    sync::mpsc::{self, UnboundedSender},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    jsonrpc::{
        INVALID_PARAMS, Id, METHOD_NOT_FOUND, Message, NodeMethod, PARSE_ERROR, Request, Response,
    },
    message::*,
    server::NodeServer,
};

pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const APP_PROTOCOL_VERSION: u32 = 1;

/// The line the host reads from stdout to find us.
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{CORE_PROTOCOL_VERSION}|{APP_PROTOCOL_VERSION}|tcp|{addr}|jsonrpc")
}

/// Listens on an ephemeral loopback port and accepts host connections in
/// the background.
pub async fn bind(server: Arc<NodeServer>) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "host connected");
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, server).await {
                            warn!(error = %e, "connection ended with an error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    });
    Ok((addr, handle))
}

/// Binds, prints the handshake, and returns once the shutdown latch opens.
pub async fn serve(server: Arc<NodeServer>) -> Result<()> {
    let (addr, accept) = bind(Arc::clone(&server)).await?;
    {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", handshake_line(addr))?;
        out.flush()?;
    }
    info!(%addr, "serving nodes");

    server.latch().wait().await;
    info!("shutting down");
    server.shutdown();
    accept.abort();
    Ok(())
}

/// Runs one host connection until EOF.
pub async fn serve_connection(stream: TcpStream, server: Arc<NodeServer>) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut w = BufWriter::new(write_half);
        while let Some(line) = rx.recv().await {
            if let Err(e) = w.write_all(line.as_bytes()).await {
                warn!(error = %e, "response write failed");
                break;
            }
            if w.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(Message::Request(req)) => {
                let server = Arc::clone(&server);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(resp) = handle_request(&server, req).await {
                        enqueue(&tx, &resp);
                    }
                });
            }
            Ok(Message::Response(_)) => { /* nothing is ever asked of the host on this socket */ }
            Err(e) => {
                let err = Response::fail(
                    Id::Null,
                    PARSE_ERROR,
                    "Parse error",
                    Some(json!(e.to_string())),
                );
                enqueue(&tx, &err);
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Helper that serialises a `Response` and sends it to the writer queue.
fn enqueue(tx: &UnboundedSender<String>, resp: &Response) {
    match serde_json::to_string(resp) {
        Ok(s) => {
            let _ = tx.send(format!("{s}\n"));
        }
        Err(e) => warn!(error = %e, "could not encode response"),
    }
}

enum CallError {
    InvalidParams(serde_json::Error),
    Failed(Error),
}

impl From<Error> for CallError {
    fn from(err: Error) -> Self {
        CallError::Failed(err)
    }
}

fn params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, CallError> {
    serde_json::from_value(params).map_err(CallError::InvalidParams)
}

/// Dispatches one request. Notifications run but get no response.
pub async fn handle_request(server: &NodeServer, req: Request) -> Option<Response> {
    let Request {
        method,
        params: p,
        id,
        ..
    } = req;
    let outcome = match method.parse::<NodeMethod>() {
        Ok(m) => dispatch(server, m, p.unwrap_or(Value::Null)).await,
        Err(_) => {
            debug!(%method, "unknown method");
            return id.map(|id| {
                Response::fail(id, METHOD_NOT_FOUND, "Method not found", Some(json!(method)))
            });
        }
    };
    let id = id?;
    Some(match outcome {
        Ok(result) => Response::success(id, result),
        Err(CallError::InvalidParams(e)) => {
            Response::fail(id, INVALID_PARAMS, "Invalid params", Some(json!(e.to_string())))
        }
        Err(CallError::Failed(err)) => Response::rpc_error(id, &err.to_rpc_error()),
    })
}

async fn dispatch(
    server: &NodeServer,
    method: NodeMethod,
    p: Value,
) -> std::result::Result<Value, CallError> {
    match method {
        NodeMethod::Init => {
            let p: InitParams = params(p)?;
            server.init(p.port).await?;
            Ok(Value::Null)
        }
        NodeMethod::OnCreate => {
            let p: OnCreateParams = params(p)?;
            server.on_create(&p.name, &p.config).await?;
            Ok(Value::Null)
        }
        NodeMethod::OnMessage => {
            let p: OnMessageParams = params(p)?;
            let out_message = server.on_message(&p.guid, p.in_message).await?;
            Ok(serde_json::to_value(OnMessageResult { out_message }).map_err(Error::from)?)
        }
        NodeMethod::OnClose => {
            let p: OnCloseParams = params(p)?;
            server.on_close(&p.guid).await?;
            Ok(Value::Null)
        }
    }
}
