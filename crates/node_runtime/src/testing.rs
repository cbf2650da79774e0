//! In-memory host for unit tests of nodes and of the runtime itself.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;

use crate::{error::Result, host::HostClient, message::VariableRef, value::HostValue};

/// Everything a node reported through the event calls.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Debug {
        guid: String,
        name: String,
        message: Vec<u8>,
    },
    Output {
        guid: String,
        output: Vec<u8>,
        port: i32,
    },
    Input { guid: String, input: Vec<u8> },
    Error {
        guid: String,
        name: String,
        message: String,
    },
    FlowEvent { guid: String, name: String },
    Close,
}

pub struct MockHost {
    variables: DashMap<String, HostValue>,
    vault: DashMap<(String, String), HostValue>,
    robot: Mutex<HostValue>,
    robot_info_calls: AtomicUsize,
    connected: AtomicBool,
    events: Mutex<Vec<HostEvent>>,
    lookups: Mutex<Vec<VariableRef>>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    /// A connected host for robot `robot-1` without LMO support.
    pub fn new() -> Self {
        Self {
            variables: DashMap::new(),
            vault: DashMap::new(),
            robot: Mutex::new(robot(false)),
            robot_info_calls: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_lmo(self, lmo: bool) -> Self {
        *self.robot.lock().unwrap() = robot(lmo);
        self
    }

    pub fn with_variable(self, scope: &str, name: &str, value: serde_json::Value) -> Self {
        self.variables.insert(key(scope, name), HostValue::from(value));
        self
    }

    pub fn variable(&self, scope: &str, name: &str) -> Option<serde_json::Value> {
        self.variables.get(&key(scope, name)).map(|v| v.clone().into_json())
    }

    /// Every `get_variable` request seen so far.
    pub fn lookups(&self) -> Vec<VariableRef> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn robot_info_calls(&self) -> usize {
        self.robot_info_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn record(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn key(scope: &str, name: &str) -> String {
    format!("{scope}/{name}")
}

fn robot(lmo: bool) -> HostValue {
    HostValue::from(json!({
        "id": "robot-1",
        "version": "1.0.0",
        "capabilities": {"lmo": lmo},
    }))
}

#[async_trait]
impl HostClient for MockHost {
    async fn get_variable(&self, variable: VariableRef) -> Result<HostValue> {
        let value = self
            .variables
            .get(&key(&variable.scope, &variable.name))
            .map(|v| v.clone())
            .unwrap_or_default();
        self.lookups.lock().unwrap().push(variable);
        Ok(value)
    }

    async fn set_variable(&self, variable: VariableRef, value: HostValue) -> Result<()> {
        self.variables.insert(key(&variable.scope, &variable.name), value);
        Ok(())
    }

    async fn get_robot_info(&self) -> Result<HostValue> {
        self.robot_info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.robot.lock().unwrap().clone())
    }

    async fn get_vault_item(&self, vault_id: &str, item_id: &str) -> Result<HostValue> {
        Ok(self
            .vault
            .get(&(vault_id.to_string(), item_id.to_string()))
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn set_vault_item(
        &self,
        vault_id: &str,
        item_id: &str,
        data: Vec<u8>,
    ) -> Result<HostValue> {
        let item = HostValue::from(json!({"data": String::from_utf8_lossy(&data)}));
        self.vault
            .insert((vault_id.to_string(), item_id.to_string()), item.clone());
        Ok(item)
    }

    async fn emit_debug(&self, guid: &str, name: &str, message: Vec<u8>) -> Result<()> {
        self.record(HostEvent::Debug {
            guid: guid.into(),
            name: name.into(),
            message,
        });
        Ok(())
    }

    async fn emit_output(&self, guid: &str, output: Vec<u8>, port: i32) -> Result<()> {
        self.record(HostEvent::Output {
            guid: guid.into(),
            output,
            port,
        });
        Ok(())
    }

    async fn emit_input(&self, guid: &str, input: Vec<u8>) -> Result<()> {
        self.record(HostEvent::Input {
            guid: guid.into(),
            input,
        });
        Ok(())
    }

    async fn emit_error(&self, guid: &str, name: &str, message: &str) -> Result<()> {
        self.record(HostEvent::Error {
            guid: guid.into(),
            name: name.into(),
            message: message.into(),
        });
        Ok(())
    }

    async fn emit_flow_event(&self, guid: &str, name: &str) -> Result<()> {
        self.record(HostEvent::FlowEvent {
            guid: guid.into(),
            name: name.into(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(HostEvent::Close);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
