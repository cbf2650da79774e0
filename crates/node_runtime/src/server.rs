//! Lifecycle calls from the host: `init`, `onCreate`, `onMessage`, `onClose`.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    context::{Context, MessageContext},
    error::{Error, Result},
    host::{HostClient, RpcHostClient},
    latch::ShutdownLatch,
    registry::NodeRegistry,
    runtime::Runtime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No host channel yet.
    Uninitialized,
    Ready,
    /// The host went away; the process is about to exit.
    Draining,
    /// Every node has been closed.
    Stopped,
}

pub struct NodeServer {
    rt: Arc<Runtime>,
    registry: NodeRegistry,
    latch: Arc<ShutdownLatch>,
    active: AtomicUsize,
    closed_any: AtomicBool,
    state: Arc<Mutex<ServerState>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl NodeServer {
    pub fn new(rt: Arc<Runtime>, registry: NodeRegistry) -> Self {
        Self {
            rt,
            registry,
            latch: Arc::new(ShutdownLatch::new(1)),
            active: AtomicUsize::new(0),
            closed_any: AtomicBool::new(false),
            state: Arc::new(Mutex::new(ServerState::Uninitialized)),
            watcher: Mutex::new(None),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.rt
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn latch(&self) -> Arc<ShutdownLatch> {
        Arc::clone(&self.latch)
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: ServerState) {
        set_state(&self.state, state);
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Connects back to the host's callback server on `port`.
    pub async fn init(&self, port: u16) -> Result<()> {
        let host = RpcHostClient::connect(port).await?;
        info!(port, "connected to host");
        self.attach_host(Arc::new(host));
        Ok(())
    }

    /// Installs `host` as the reverse channel and starts watching it.
    pub fn attach_host(&self, host: Arc<dyn HostClient>) {
        self.rt.set_host(Arc::clone(&host));
        self.set_state(ServerState::Ready);

        let latch = Arc::clone(&self.latch);
        let state = Arc::clone(&self.state);
        let interval = self.rt.config().watch_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = latch.wait() => break,
                    _ = sleep(interval) => {
                        if !host.is_connected() {
                            warn!("lost connection to host, shutting down");
                            set_state(&state, ServerState::Draining);
                            latch.count_down();
                            break;
                        }
                    }
                }
            }
            debug!("connection watcher stopped");
        });

        let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = watcher.replace(handle) {
            old.abort();
        }
    }

    /// Creates a node instance. A failed create leaves the active count as
    /// it was.
    ///
    /// A create that fails while racing the last close is what brings the
    /// count to zero, so it opens the latch in that case.
    pub async fn on_create(&self, name: &str, config: &[u8]) -> Result<()> {
        self.active.fetch_add(1, Ordering::AcqRel);
        match self.registry.create_instance(name, config, &self.rt).await {
            Ok(guid) => {
                debug!(%guid, active = self.active_count(), "onCreate");
                Ok(())
            }
            Err(err) => {
                error!(name, error = %err, "onCreate failed");
                let remaining = self.release();
                if remaining == 0
                    && self.closed_any.load(Ordering::Acquire)
                    && self.registry.is_empty()
                {
                    self.stop();
                }
                Err(err)
            }
        }
    }

    /// Runs the instance's message hook and returns the outgoing message.
    ///
    /// When the hook fails and the node has `continueOnError` set, the
    /// inbound bytes are returned exactly as received.
    pub async fn on_message(&self, guid: &str, in_message: Vec<u8>) -> Result<Vec<u8>> {
        let codec = self.rt.codec();
        let data = codec.decompress(&in_message)?;
        let mut ctx = MessageContext::new(data);
        let inst = self.registry.get(guid)?;

        let outcome = {
            let mut node = inst.node.lock().await;
            node.on_message(&mut ctx, &self.rt).await
        };

        match outcome {
            Ok(()) => codec.compress(&ctx.get_raw(&[])?),
            Err(err) => {
                let err = Error::from_anyhow(err);
                if inst.common.continue_on_error {
                    warn!(%guid, msg_id = ctx.id(), error = %err, "onMessage failed, passing message through");
                    Ok(in_message)
                } else {
                    error!(%guid, msg_id = ctx.id(), error = %err, "onMessage failed");
                    Err(err)
                }
            }
        }
    }

    /// Closes and forgets the instance. Closing the last one opens the
    /// shutdown latch.
    pub async fn on_close(&self, guid: &str) -> Result<()> {
        let inst = self.registry.remove(guid)?;
        let outcome = {
            let mut node = inst.node.lock().await;
            node.on_close(&self.rt).await
        };

        self.closed_any.store(true, Ordering::Release);
        let remaining = self.release();
        debug!(%guid, remaining, "onClose");
        if remaining == 0 {
            self.stop();
        }

        outcome.map_err(Error::from_anyhow)
    }

    /// Drops one from the active count and returns what is left.
    fn release(&self) -> usize {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|prev| prev - 1)
            .unwrap_or(0)
    }

    fn stop(&self) {
        info!("all nodes closed");
        self.set_state(ServerState::Stopped);
        self.latch.count_down();
    }

    /// Stops the watcher and opens the latch.
    pub fn shutdown(&self) {
        if let Some(handle) = self.watcher.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
        if self.state() != ServerState::Draining {
            self.set_state(ServerState::Stopped);
        }
        self.latch.count_down();
    }
}

impl Drop for NodeServer {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }
}

fn set_state(state: &Mutex<ServerState>, next: ServerState) {
    let mut cur = state.lock().unwrap_or_else(|p| p.into_inner());
    if *cur != next {
        debug!(from = ?*cur, to = ?next, "server state");
        *cur = next;
    }
}
