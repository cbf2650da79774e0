//! Node types by name and live node instances by GUID.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    node::{Node, NodeCommon},
    runtime::Runtime,
};

type Factory = Arc<dyn Fn(&[u8]) -> Result<Box<dyn Node>> + Send + Sync>;

/// One created node. Hooks run under `node`'s lock, so a single instance
/// never sees two messages at once.
pub struct NodeInstance {
    pub common: NodeCommon,
    pub node: Mutex<Box<dyn Node>>,
}

#[derive(Default)]
pub struct NodeRegistry {
    factories: DashMap<String, Factory>,
    instances: DashMap<String, Arc<NodeInstance>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under the node type `name`.
    ///
    /// `T` is deserialized from the same config bytes as [`NodeCommon`].
    pub fn register<T>(&self, name: &str)
    where
        T: Node + DeserializeOwned,
    {
        let type_name = name.to_string();
        let factory: Factory = Arc::new(move |config: &[u8]| {
            let node: T = serde_json::from_slice(config)
                .map_err(|e| Error::MalformedConfig(format!("{type_name}: {e}")))?;
            Ok(Box::new(node) as Box<dyn Node>)
        });
        self.factories.insert(name.to_string(), factory);
        debug!(name, "registered node type");
    }

    pub fn with<T>(self, name: &str) -> Self
    where
        T: Node + DeserializeOwned,
    {
        self.register::<T>(name);
        self
    }

    pub fn node_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Builds a node of type `name` from `config`, runs its create hook and
    /// registers it under the config's GUID.
    pub async fn create_instance(&self, name: &str, config: &[u8], rt: &Runtime) -> Result<String> {
        let factory = self
            .factories
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| Error::UnknownNodeType(name.to_string()))?;

        let common: NodeCommon = serde_json::from_slice(config)
            .map_err(|e| Error::MalformedConfig(format!("{name}: {e}")))?;
        let mut node = factory(config)?;

        if self.instances.contains_key(&common.guid) {
            return Err(Error::DuplicateInstance(common.guid));
        }
        node.on_create(rt).await.map_err(Error::from_anyhow)?;

        let guid = common.guid.clone();
        match self.instances.entry(guid.clone()) {
            Entry::Occupied(_) => return Err(Error::DuplicateInstance(guid)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(NodeInstance {
                    common,
                    node: Mutex::new(node),
                }));
            }
        }
        info!(%guid, name, "node created");
        Ok(guid)
    }

    pub fn get(&self, guid: &str) -> Result<Arc<NodeInstance>> {
        self.instances
            .get(guid)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| Error::UnknownInstance(guid.to_string()))
    }

    pub fn remove(&self, guid: &str) -> Result<Arc<NodeInstance>> {
        self.instances
            .remove(guid)
            .map(|(_, inst)| inst)
            .ok_or_else(|| Error::UnknownInstance(guid.to_string()))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
