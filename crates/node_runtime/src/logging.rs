use std::{panic, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{Dispatch, dispatcher, level_filters::LevelFilter};
use tracing_appender::rolling::daily;
use tracing_subscriber::{Layer, Registry, fmt, prelude::__tracing_subscriber_SubscriberExt};

/// What log levels are supported?
/// Higher‐value variants are more severe.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

impl LogLevel {
    /// Case-insensitive; anything unrecognised is `Info`.
    pub fn parse(level: &str) -> LogLevel {
        match level.trim().to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "critical" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

/// Installs the global subscriber once per process.
///
/// With `log_dir` logs roll daily into `node.log`; without it they go to
/// stderr. Stdout is never used: the host reads the handshake from it.
pub fn init_tracing(level: LogLevel, log_dir: Option<&Path>) {
    static LOG_INIT: std::sync::Once = std::sync::Once::new();
    LOG_INIT.call_once(|| {
        let result = panic::catch_unwind(|| {
            let filter = level.filter();
            let dispatch: Dispatch = match log_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir).ok(); // best-effort
                    Dispatch::new(
                        Registry::default().with(
                            fmt::layer()
                                .with_ansi(false)
                                .with_target(false)
                                .with_writer(daily(dir, "node.log"))
                                .with_filter(filter),
                        ),
                    )
                }
                None => Dispatch::new(
                    Registry::default().with(
                        fmt::layer()
                            .with_target(false)
                            .with_writer(std::io::stderr)
                            .with_filter(filter),
                    ),
                ),
            };
            if dispatcher::set_global_default(dispatch).is_err() {
                eprintln!("a global tracing subscriber was already installed");
            }
        });
        if result.is_err() {
            eprintln!("❌ Logging setup failed");
        }
    });
}
