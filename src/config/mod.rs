// SPDX-License-Identifier: MIT
//! Daemon configuration.
//!
//! Loaded from an optional TOML file (`graded.toml`), with environment
//! variables overriding file values for the sandbox credentials. Every
//! section is serde-defaulted so a partial file is always valid.

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_PORT: u16 = 4310;
const DEFAULT_SETTLE_MS: u64 = 100;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_INIT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SANDBOX_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LOOP_ITERATION_LIMIT: u64 = 1_000_000;
const DEFAULT_RECURSION_LIMIT: usize = 512;
const DEFAULT_SNAPSHOT_MAX_CHARS: usize = 500;

// ─── EngineConfig ─────────────────────────────────────────────────────────────

/// In-process evaluation engine tuning (`[engine]` in graded.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Settle window after document construction before the first probe runs.
    /// Deferred-init scripts get their zero-delay timers flushed here. This is
    /// a heuristic, not a guarantee; slower async init may still be missed.
    pub settle_ms: u64,
    /// Per-probe wall-clock budget.
    pub probe_timeout_ms: u64,
    /// Budget for harness bootstrap plus submission script execution.
    pub init_timeout_ms: u64,
    /// Boa loop-iteration cap, the backstop against `while(true)` submissions.
    pub loop_iteration_limit: u64,
    /// Boa recursion cap.
    pub recursion_limit: usize,
    /// DOM snapshot truncation length for diagnostics.
    pub snapshot_max_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            loop_iteration_limit: DEFAULT_LOOP_ITERATION_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            snapshot_max_chars: DEFAULT_SNAPSHOT_MAX_CHARS,
        }
    }
}

// ─── SandboxConfig ────────────────────────────────────────────────────────────

/// Remote sandbox provider settings (`[sandbox]` in graded.toml).
///
/// Credentials can also come from `GRADED_SANDBOX_CLIENT_ID` /
/// `GRADED_SANDBOX_CLIENT_SECRET`, which take precedence over the file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Provider execute endpoint.
    pub endpoint: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Interpreter language id sent to the provider.
    pub language: String,
    /// Interpreter version id sent to the provider.
    pub version_index: String,
    /// Whole-call budget for the remote round trip. Timeout is terminal —
    /// never retried, so interactive latency stays bounded.
    pub timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.jdoodle.com/v1/execute".to_string(),
            client_id: None,
            client_secret: None,
            language: "nodejs".to_string(),
            version_index: "4".to_string(),
            timeout_ms: DEFAULT_SANDBOX_TIMEOUT_MS,
        }
    }
}

// ─── ServerConfig ─────────────────────────────────────────────────────────────

/// REST server settings (`[server]` in graded.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default local only; use 0.0.0.0 for LAN access).
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// ─── Top-level config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub sandbox: SandboxConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration: file (if given) → env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config file: {}", path.display()))?;
                let parsed: Config = toml::from_str(&raw)
                    .with_context(|| format!("parse config file: {}", path.display()))?;
                info!(path = %path.display(), "loaded config file");
                parsed
            }
            None => Config::default(),
        };

        if let Ok(id) = std::env::var("GRADED_SANDBOX_CLIENT_ID") {
            config.sandbox.client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("GRADED_SANDBOX_CLIENT_SECRET") {
            config.sandbox.client_secret = Some(secret);
        }
        if let Ok(endpoint) = std::env::var("GRADED_SANDBOX_ENDPOINT") {
            config.sandbox.endpoint = endpoint;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.engine.settle_ms, 100);
        assert_eq!(config.engine.snapshot_max_chars, 500);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.sandbox.language, "nodejs");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nsettle_ms = 250\n\n[server]\nport = 9000").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.engine.settle_ms, 250);
        assert_eq!(config.engine.probe_timeout_ms, DEFAULT_PROBE_TIMEOUT_MS);
        assert_eq!(config.server.port, 9000);
    }
}
