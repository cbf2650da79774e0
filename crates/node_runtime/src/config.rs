use std::{collections::HashMap, env, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::{logging::LogLevel, lmo::LMO_LIMIT};

pub const ENV_COMPRESS: &str = "ROBOMOTION_COMPRESS";
pub const ENV_LMO_LIMIT: &str = "ROBOMOTION_LMO_LIMIT";
pub const ENV_CONFIG_ROOT: &str = "ROBOMOTION_CONFIG_ROOT";
pub const ENV_LOG_LEVEL: &str = "ROBOMOTION_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "ROBOMOTION_LOG_DIR";
pub const ENV_WATCH_INTERVAL_MS: &str = "ROBOMOTION_WATCH_INTERVAL_MS";

/// Settings for one node package process.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Gzip request and response bodies.
    pub compress: bool,
    /// Serialized size at which a message field spills to disk.
    pub lmo_limit: usize,
    /// Root under which `temp/robots/<robot id>` lives.
    pub config_root: PathBuf,
    pub log_level: LogLevel,
    pub log_dir: Option<PathBuf>,
    /// How often the host connection is checked.
    pub watch_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            compress: true,
            lmo_limit: LMO_LIMIT,
            config_root: default_config_root(),
            log_level: LogLevel::Info,
            log_dir: None,
            watch_interval: Duration::from_secs(1),
        }
    }
}

/// `~/.config/robomotion`, or `%USERPROFILE%\AppData\Local\Robomotion` on Windows.
pub fn default_config_root() -> PathBuf {
    let home = home::home_dir().unwrap_or_else(env::temp_dir);
    if cfg!(windows) {
        home.join("AppData").join("Local").join("Robomotion")
    } else {
        home.join(".config").join("robomotion")
    }
}

impl RuntimeConfig {
    /// Defaults, then `<config root>/.env`, then the process environment.
    ///
    /// The `.env` file is read without touching the process environment.
    pub fn load() -> Self {
        let mut vars: HashMap<String, String> = HashMap::new();

        let root = env::var(ENV_CONFIG_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_root());
        let env_file = root.join(".env");
        if env_file.exists() {
            match dotenvy::from_path_iter(&env_file) {
                Ok(iter) => {
                    for (k, v) in iter.flatten() {
                        vars.insert(k, v);
                    }
                    info!("Loaded .env from {}", env_file.display());
                }
                Err(err) => warn!("could not read {}: {err}", env_file.display()),
            }
        }
        for (k, v) in env::vars() {
            if k.starts_with("ROBOMOTION_") {
                vars.insert(k, v);
            }
        }

        let mut cfg = Self::from_vars(&vars);
        if !vars.contains_key(ENV_CONFIG_ROOT) {
            cfg.config_root = root;
        }
        cfg
    }

    /// Builds a config from key/value pairs; unknown keys are ignored and
    /// unparseable values keep their default.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = parse_var::<bool>(vars, ENV_COMPRESS) {
            cfg.compress = v;
        }
        if let Some(v) = parse_var::<usize>(vars, ENV_LMO_LIMIT) {
            cfg.lmo_limit = v;
        }
        if let Some(v) = vars.get(ENV_CONFIG_ROOT) {
            cfg.config_root = PathBuf::from(v);
        }
        if let Some(v) = vars.get(ENV_LOG_LEVEL) {
            cfg.log_level = LogLevel::parse(v);
        }
        if let Some(v) = vars.get(ENV_LOG_DIR).filter(|v| !v.is_empty()) {
            cfg.log_dir = Some(PathBuf::from(v));
        }
        if let Some(ms) = parse_var::<u64>(vars, ENV_WATCH_INTERVAL_MS) {
            cfg.watch_interval = Duration::from_millis(ms);
        }
        cfg
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_lmo_limit(mut self, limit: usize) -> Self {
        self.lmo_limit = limit;
        self
    }

    pub fn with_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = root.into();
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }
}

fn parse_var<T: FromStr>(vars: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = vars.get(key)?;
    match raw.trim().to_lowercase().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={raw}: not a valid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.compress);
        assert_eq!(cfg.lmo_limit, 256 * 1024);
        assert_eq!(cfg.watch_interval, Duration::from_secs(1));
        assert!(cfg.config_root.ends_with("robomotion") || cfg.config_root.ends_with("Robomotion"));
    }

    #[test]
    fn vars_override_defaults() {
        let cfg = RuntimeConfig::from_vars(&vars(&[
            (ENV_COMPRESS, "FALSE"),
            (ENV_LMO_LIMIT, "1024"),
            (ENV_CONFIG_ROOT, "/tmp/rm"),
            (ENV_LOG_LEVEL, "debug"),
            (ENV_LOG_DIR, "/tmp/rm/logs"),
            (ENV_WATCH_INTERVAL_MS, "250"),
        ]));
        assert!(!cfg.compress);
        assert_eq!(cfg.lmo_limit, 1024);
        assert_eq!(cfg.config_root, PathBuf::from("/tmp/rm"));
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/rm/logs")));
        assert_eq!(cfg.watch_interval, Duration::from_millis(250));
    }

    #[test]
    fn bad_values_keep_defaults() {
        let cfg = RuntimeConfig::from_vars(&vars(&[
            (ENV_COMPRESS, "maybe"),
            (ENV_LMO_LIMIT, "lots"),
            (ENV_LOG_DIR, ""),
        ]));
        assert!(cfg.compress);
        assert_eq!(cfg.lmo_limit, LMO_LIMIT);
        assert_eq!(cfg.log_dir, None);
    }
}
