//! Host configuration, read once from the environment at startup.
//! Everything is overridable for development: the external tool binary, its
//! reasoning effort, the per-call timeout, the log path, and a force-mock
//! switch that bypasses the subprocess entirely.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CLI_BIN: &str = "codex";
pub const DEFAULT_REASONING_EFFORT: &str = "low";
pub const DEFAULT_CLI_TIMEOUT_MS: u64 = 45_000;

const ENV_FORCE_MOCK: &str = "TEXTSWIFT_HOST_FORCE_MOCK";
const ENV_CLI_BIN: &str = "TEXTSWIFT_CLI_BIN";
const ENV_REASONING_EFFORT: &str = "TEXTSWIFT_CLI_REASONING_EFFORT";
const ENV_LOG_PATH: &str = "TEXTSWIFT_HOST_LOG_PATH";
const ENV_CLI_TIMEOUT_MS: &str = "TEXTSWIFT_CLI_TIMEOUT_MS";

/// Runtime mode of the host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMode {
    Mock,
    Cli,
}

impl HostMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostMode::Mock => "mock",
            HostMode::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub force_mock: bool,
    pub cli_bin: String,
    pub reasoning_effort: String,
    pub log_path: PathBuf,
    pub cli_timeout: Duration,
}

impl HostConfig {
    pub fn from_env() -> Self {
        Self {
            force_mock: std::env::var(ENV_FORCE_MOCK)
                .map(|v| v == "1")
                .unwrap_or(false),
            cli_bin: env_or(ENV_CLI_BIN, DEFAULT_CLI_BIN),
            reasoning_effort: env_or(ENV_REASONING_EFFORT, DEFAULT_REASONING_EFFORT),
            log_path: std::env::var(ENV_LOG_PATH)
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_log_path),
            cli_timeout: std::env::var(ENV_CLI_TIMEOUT_MS)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(DEFAULT_CLI_TIMEOUT_MS)),
        }
    }

    pub fn mode(&self) -> HostMode {
        if self.force_mock {
            HostMode::Mock
        } else {
            HostMode::Cli
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            force_mock: false,
            cli_bin: DEFAULT_CLI_BIN.to_string(),
            reasoning_effort: DEFAULT_REASONING_EFFORT.to_string(),
            log_path: default_log_path(),
            cli_timeout: Duration::from_millis(DEFAULT_CLI_TIMEOUT_MS),
        }
    }
}

/// Default log location under the user's home directory.
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Library/Logs/textswift-host.log")
}

fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
