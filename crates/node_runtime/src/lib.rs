pub mod compress;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod event;
pub mod host;
pub mod jsonrpc;
pub mod latch;
pub mod lmo;
pub mod logging;
pub mod message;
pub mod node;
pub mod plugin_runtime;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod value;
pub mod variable;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::RuntimeConfig;
pub use context::{Context, MessageContext};
pub use document::PathDocument;
pub use error::{Error, Result, RpcError};
pub use host::{HostClient, RpcHostClient};
pub use latch::ShutdownLatch;
pub use lmo::{LargeMessageObject, LmoStore};
pub use logging::{LogLevel, init_tracing};
pub use node::{Node, NodeCommon};
pub use registry::NodeRegistry;
pub use runtime::{Capabilities, RobotInfo, Runtime};
pub use server::{NodeServer, ServerState};
pub use value::HostValue;
pub use variable::{InVariable, OptVariable, OutVariable, Scope, Variable, VariableResolver};
