//! Shared test setup: tracing subscriber with console and file output.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... list operations; build with `--features tracing` to see them
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Filter directives (e.g., `couplist=debug,couplist::list::traverse=trace`)
//! - `COUPLIST_LOG_DIR`: Log directory (default: `logs/`)
//! - `COUPLIST_LOG_CONSOLE`: Set to "0" to disable console output
//!
//! # Log Files
//!
//! Logs are appended to `logs/couplist.jsonl` as newline-delimited JSON.
//!
//! ```bash
//! # Every teardown and split, in order
//! cat logs/couplist.jsonl | jq 'select(.fields.message | test("teardown|split"))'
//!
//! # Operations that lost a race against teardown
//! cat logs/couplist.jsonl | jq 'select(.level == "WARN")'
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the subscriber. Only the first call in a process has any effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        setup_tracing();
    });
}

/// Configuration for tracing setup.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Log file name.
    pub log_file: String,
    /// Enable console output.
    pub console_enabled: bool,
    /// Default log level if `RUST_LOG` is not set.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "couplist.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::WARN,
        }
    }
}

impl TracingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("COUPLIST_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("COUPLIST_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

fn setup_tracing() {
    let config = TracingConfig::from_env();

    std::fs::create_dir_all(&config.log_dir).expect("failed to create log directory");
    let log_path = config.log_dir.join(&config.log_file);

    // Append: each integration test binary is its own process.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("failed to open log file");

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_thread_names(true)
            .with_target(true)
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(make_filter(config.default_level));

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
