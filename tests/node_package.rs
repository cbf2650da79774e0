//! Drives the package the way a robot does: a fake host on one socket, the
//! package's JSON-RPC server on the other.

use std::{
    io::{Read, Write},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use node_runtime::{
    HostValue, NodeServer, Runtime, RuntimeConfig,
    jsonrpc::{Id, Message, Request, Response},
    plugin_runtime,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    time::timeout,
};

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// Host side of the reverse channel: answers robot info and records every
/// other call.
async fn fake_host(lmo: bool) -> (u16, mpsc::UnboundedReceiver<Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (r, mut w) = stream.into_split();
        let mut lines = BufReader::new(r).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(Message::Request(req)) = serde_json::from_str::<Message>(&line) else {
                continue;
            };
            let result = match req.method.as_str() {
                "getRobotInfo" => json!({"robot": HostValue::from(json!({
                    "id": "robot-7", "version": "24.1", "capabilities": {"lmo": lmo}
                }))}),
                "getVariable" => json!({"value": HostValue::String("from-host".into())}),
                _ => Value::Null,
            };
            let id = req.id.clone().unwrap_or(Id::Null);
            if req.method != "getRobotInfo" {
                let _ = seen_tx.send(req);
            }
            let rsp = Response::success(id, result);
            let line = format!("{}\n", serde_json::to_string(&rsp).unwrap());
            if w.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });
    (port, seen_rx)
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    w: OwnedWriteHalf,
    next_id: i64,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (r, w) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            lines: BufReader::new(r).lines(),
            w,
            next_id: 0,
        }
    }

    async fn call(&mut self, method: &str, params: Value) -> Response {
        self.next_id += 1;
        let req = Request::call(Id::Number(self.next_id), method, Some(params));
        let line = format!("{}\n", serde_json::to_string(&req).unwrap());
        self.w.write_all(line.as_bytes()).await.unwrap();
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("response in time")
            .unwrap()
            .unwrap();
        let rsp: Response = serde_json::from_str(&line).unwrap();
        assert_eq!(rsp.id, Id::Number(self.next_id));
        rsp
    }

    async fn create(&mut self, name: &str, config: Value) -> Response {
        let config = STANDARD.encode(serde_json::to_vec(&config).unwrap());
        self.call("onCreate", json!({"name": name, "config": config})).await
    }

    /// Sends `msg` gzip+base64 and returns the raw (still compressed) reply bytes.
    async fn message(&mut self, guid: &str, msg: &[u8]) -> Result<Vec<u8>, Response> {
        let rsp = self
            .call("onMessage", json!({"guid": guid, "inMessage": STANDARD.encode(gzip(msg))}))
            .await;
        if rsp.error.is_some() {
            return Err(rsp);
        }
        let out = rsp.result.as_ref().unwrap()["outMessage"].as_str().unwrap().to_string();
        Ok(STANDARD.decode(out).unwrap())
    }
}

async fn start(tmp: &TempDir) -> (Arc<NodeServer>, SocketAddr) {
    let config = RuntimeConfig::default()
        .with_config_root(tmp.path())
        .with_lmo_limit(128)
        .with_watch_interval(Duration::from_millis(20));
    let rt = Arc::new(Runtime::new(config));
    let server = Arc::new(NodeServer::new(rt, robomotion_nodes::registry()));
    let (addr, _accept) = plugin_runtime::bind(Arc::clone(&server)).await.unwrap();
    (server, addr)
}

#[tokio::test]
async fn full_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let (server, addr) = start(&tmp).await;
    let (host_port, mut host_seen) = fake_host(false).await;
    let mut client = Client::connect(addr).await;

    let rsp = client.call("init", json!({"port": host_port})).await;
    assert!(rsp.error.is_none(), "{:?}", rsp.error);

    let rsp = client
        .create(
            robomotion_nodes::SET_VALUE,
            json!({
                "guid": "set-1", "name": "Set Value",
                "inValue": {"scope": "Global", "name": "greeting"},
                "outValue": {"scope": "Message", "name": "out.text"},
            }),
        )
        .await;
    assert!(rsp.error.is_none(), "{:?}", rsp.error);
    client
        .create(robomotion_nodes::DEBUG, json!({"guid": "dbg-1", "name": "Debug", "path": "out"}))
        .await;

    let out = client.message("set-1", br#"{"id":"m1"}"#).await.unwrap();
    let out: Value = serde_json::from_slice(&gunzip(&out)).unwrap();
    assert_eq!(out, json!({"id": "m1", "out": {"text": "from-host"}}));

    let lookup = host_seen.recv().await.unwrap();
    assert_eq!(lookup.method, "getVariable");
    let payload = lookup.params.unwrap()["variable"]["payload"].as_str().unwrap().to_string();
    assert_eq!(STANDARD.decode(payload).unwrap(), br#"{"id":"m1"}"#.to_vec());

    client
        .message("dbg-1", &serde_json::to_vec(&out).unwrap())
        .await
        .unwrap();
    let debug = host_seen.recv().await.unwrap();
    assert_eq!(debug.method, "debug");
    let params = debug.params.unwrap();
    assert_eq!(params["guid"], "dbg-1");
    let shown = STANDARD.decode(params["message"].as_str().unwrap()).unwrap();
    assert_eq!(shown, br#"{"text":"from-host"}"#.to_vec());

    assert!(client.call("onClose", json!({"guid": "set-1"})).await.error.is_none());
    assert!(!server.latch().is_open());
    assert!(client.call("onClose", json!({"guid": "dbg-1"})).await.error.is_none());
    timeout(Duration::from_secs(2), server.latch().wait()).await.unwrap();
}

#[tokio::test]
async fn failing_nodes() {
    let tmp = TempDir::new().unwrap();
    let (_server, addr) = start(&tmp).await;
    let mut client = Client::connect(addr).await;

    client
        .create(robomotion_nodes::FAIL, json!({"guid": "f1", "continueOnError": true}))
        .await;
    client
        .create(
            robomotion_nodes::FAIL,
            json!({"guid": "f2", "code": "Err.Custom", "message": "bad"}),
        )
        .await;

    let input = br#"{"id":"m1","x":1}"#;
    let rsp = client
        .call("onMessage", json!({"guid": "f1", "inMessage": STANDARD.encode(gzip(input))}))
        .await;
    let echoed = rsp.result.unwrap()["outMessage"].as_str().unwrap().to_string();
    assert_eq!(echoed, STANDARD.encode(gzip(input)));

    let err = client.message("f2", input).await.unwrap_err().error.unwrap();
    assert_eq!(err.rpc_error().unwrap().code, "Err.Custom");

    let err = client.message("missing", input).await.unwrap_err().error.unwrap();
    assert_eq!(err.rpc_error().unwrap().code, "Err.UnknownInstance");

    let rsp = client.create("Robomotion.Core.Nope", json!({"guid": "x"})).await;
    assert_eq!(rsp.error.unwrap().rpc_error().unwrap().code, "Err.UnknownNodeType");
}

#[tokio::test]
async fn large_values_spill_to_disk_when_the_robot_allows_it() {
    let tmp = TempDir::new().unwrap();
    let (_server, addr) = start(&tmp).await;
    let (host_port, _seen) = fake_host(true).await;
    let mut client = Client::connect(addr).await;
    client.call("init", json!({"port": host_port})).await;

    let big = "z".repeat(1000);
    client
        .create(
            robomotion_nodes::SET_VALUE,
            json!({
                "guid": "s1",
                "inValue": {"scope": "Custom", "name": big},
                "outValue": {"scope": "Message", "name": "blob"},
            }),
        )
        .await;

    let out = client.message("s1", br#"{"id":"m1"}"#).await.unwrap();
    let out: Value = serde_json::from_slice(&gunzip(&out)).unwrap();
    assert_eq!(out["blob"]["magic"], json!(node_runtime::lmo::LMO_MAGIC));
    assert_eq!(out["blob"]["size"], json!(1002));

    let id = out["blob"]["id"].as_str().unwrap();
    let file = tmp.path().join("temp/robots/robot-7").join(format!("{id}.lmo"));
    assert!(file.exists());
}

#[tokio::test]
async fn losing_the_host_opens_the_latch() {
    let tmp = TempDir::new().unwrap();
    let (server, addr) = start(&tmp).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hangup = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stream);
    });

    let mut client = Client::connect(addr).await;
    assert!(client.call("init", json!({"port": port})).await.error.is_none());
    hangup.await.unwrap();

    timeout(Duration::from_secs(2), server.latch().wait()).await.unwrap();
    assert_eq!(server.state(), node_runtime::ServerState::Draining);
}
