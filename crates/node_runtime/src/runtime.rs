//! The process-wide context handed to the server, the resolver and every node hook.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{
    compress::Codec,
    config::RuntimeConfig,
    error::{Error, Result},
    host::HostClient,
    lmo::{LmoStore, robot_dir},
    value::HostValue,
    variable::VariableResolver,
};

/// Feature bits a package advertises; the effective set is the intersection
/// with what the package was built to support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities(u64);

impl Capabilities {
    pub const LMO: u64 = 1 << 0;

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, capability: u64) -> bool {
        self.0 & capability == capability
    }

    /// Keeps only the bits also present in `capability`.
    pub fn restrict(self, capability: u64) -> Self {
        Self(self.0 & capability)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self(u64::MAX).restrict(Self::LMO)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotCapabilities {
    #[serde(default)]
    pub lmo: bool,
}

/// What the host reports about the robot running this package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: RobotCapabilities,
}

impl RobotInfo {
    pub fn from_host(value: HostValue) -> Result<Self> {
        match Value::from(value) {
            Value::Null => Ok(Self::default()),
            v => Ok(serde_json::from_value(v)?),
        }
    }
}

/// Shared state of one node package process.
///
/// Built once at startup; the host handle is attached when the host calls
/// `init`.
pub struct Runtime {
    config: RuntimeConfig,
    capabilities: Capabilities,
    host: RwLock<Option<Arc<dyn HostClient>>>,
    robot_info: OnceCell<RobotInfo>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .field("has_host", &self.has_host())
            .finish()
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            capabilities: Capabilities::default(),
            host: RwLock::new(None),
            robot_info: OnceCell::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn set_host(&self, host: Arc<dyn HostClient>) {
        *self.host.write().unwrap_or_else(|p| p.into_inner()) = Some(host);
    }

    /// The host channel, or [`Error::RuntimeNotReady`] before `init`.
    pub fn host(&self) -> Result<Arc<dyn HostClient>> {
        self.host
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(Error::RuntimeNotReady)
    }

    pub fn has_host(&self) -> bool {
        self.host.read().map(|h| h.is_some()).unwrap_or(false)
    }

    pub fn codec(&self) -> Codec {
        Codec::new(self.config.compress)
    }

    pub fn resolver(&self) -> VariableResolver<'_> {
        VariableResolver::new(self)
    }

    /// Fetched from the host on first use, then cached.
    pub async fn robot_info(&self) -> Result<&RobotInfo> {
        self.robot_info
            .get_or_try_init(|| async {
                let info = self.host()?.get_robot_info().await?;
                RobotInfo::from_host(info)
            })
            .await
    }

    pub async fn robot_id(&self) -> Result<String> {
        Ok(self.robot_info().await?.id.clone())
    }

    /// True only when both this package and the robot support large
    /// message objects. Any failure to ask the host counts as no.
    pub async fn is_lmo_capable(&self) -> bool {
        if !self.capabilities.contains(Capabilities::LMO) {
            return false;
        }
        match self.robot_info().await {
            Ok(info) => info.capabilities.lmo,
            Err(err) => {
                debug!(error = %err, "robot info unavailable, large message objects disabled");
                false
            }
        }
    }

    /// Spillover store for the current robot; disabled when the robot is
    /// not LMO capable.
    pub async fn lmo_store(&self) -> LmoStore {
        let limit = self.config.lmo_limit;
        if self.is_lmo_capable().await {
            if let Ok(info) = self.robot_info().await {
                return LmoStore::new(true, limit, robot_dir(&self.config.config_root, &info.id));
            }
        }
        LmoStore::new(false, limit, self.config.config_root.join("temp").join("robots"))
    }

    pub async fn get_vault_item(&self, vault_id: &str, item_id: &str) -> Result<Value> {
        Ok(self.host()?.get_vault_item(vault_id, item_id).await?.into_json())
    }

    pub async fn set_vault_item(
        &self,
        vault_id: &str,
        item_id: &str,
        data: Vec<u8>,
    ) -> Result<Value> {
        Ok(self.host()?.set_vault_item(vault_id, item_id, data).await?.into_json())
    }

    /// Asks the host to shut this package down.
    pub async fn close(&self) -> Result<()> {
        self.host()?.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHost;
    use tempfile::TempDir;

    fn runtime(root: &TempDir) -> Runtime {
        Runtime::new(RuntimeConfig::default().with_config_root(root.path()))
    }

    #[tokio::test]
    async fn no_host_means_not_ready() {
        let tmp = TempDir::new().unwrap();
        let rt = runtime(&tmp);
        assert!(matches!(rt.host(), Err(Error::RuntimeNotReady)));
        assert!(matches!(rt.robot_info().await, Err(Error::RuntimeNotReady)));
        assert!(!rt.is_lmo_capable().await);
        assert!(!rt.lmo_store().await.is_enabled());
    }

    #[tokio::test]
    async fn robot_info_is_cached() {
        let tmp = TempDir::new().unwrap();
        let rt = runtime(&tmp);
        let host = Arc::new(MockHost::new().with_lmo(true));
        rt.set_host(host.clone());

        assert_eq!(rt.robot_id().await.unwrap(), "robot-1");
        assert!(rt.is_lmo_capable().await);
        assert_eq!(host.robot_info_calls(), 1);

        let store = rt.lmo_store().await;
        assert!(store.is_enabled());
        assert_eq!(store.dir(), robot_dir(tmp.path(), "robot-1"));
    }

    #[tokio::test]
    async fn package_capabilities_gate_lmo() {
        let tmp = TempDir::new().unwrap();
        let rt = runtime(&tmp).with_capabilities(Capabilities::from_bits(0));
        rt.set_host(Arc::new(MockHost::new().with_lmo(true)));
        assert!(!rt.is_lmo_capable().await);
    }

    #[test]
    fn default_capabilities_are_lmo_only() {
        let caps = Capabilities::default();
        assert!(caps.contains(Capabilities::LMO));
        assert_eq!(caps.bits(), Capabilities::LMO);
    }

    #[test]
    fn robot_info_tolerates_missing_fields() {
        let info = RobotInfo::from_host(HostValue::from(serde_json::json!({"id": "r9"}))).unwrap();
        assert_eq!(info.id, "r9");
        assert!(!info.capabilities.lmo);
    }
}
