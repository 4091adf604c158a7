//! Persisted configuration schema and the async store seam.
//! The orchestration core reads and patches settings through `SettingsStore`;
//! production embeddings bring their own backing store, tests and standalone
//! use rely on the in-memory one.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::protocol::{Transport, FAST_FALLBACK_MODEL, FAST_PRIMARY_MODEL};

/// Payload size class used by the benchmark matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSize {
    Short,
    Medium,
    Long,
}

impl TextSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextSize::Short => "short",
            TextSize::Medium => "medium",
            TextSize::Long => "long",
        }
    }
}

/// One benchmark cell outcome, persisted as part of `BenchmarkState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRun {
    pub model: String,
    pub text_size: TextSize,
    pub latency_ms: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub timestamp: String,
}

/// User-facing configuration consumed by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub source_lang: String,
    pub target_lang: String,
    pub preferred_model: String,
    pub fallback_model: String,
    pub transport: Transport,
    pub native_host_available: bool,
    pub native_host_checked_at: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_lang: "auto".to_string(),
            target_lang: "ko".to_string(),
            preferred_model: FAST_PRIMARY_MODEL.to_string(),
            fallback_model: FAST_FALLBACK_MODEL.to_string(),
            transport: Transport::Native,
            native_host_available: false,
            native_host_checked_at: None,
        }
    }
}

/// Partial settings update; `None` fields keep their current value.
/// `native_host_checked_at` is set-only, it is never cleared back to null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub preferred_model: Option<String>,
    pub fallback_model: Option<String>,
    pub transport: Option<Transport>,
    pub native_host_available: Option<bool>,
    pub native_host_checked_at: Option<String>,
}

impl Settings {
    /// Apply a partial update, returning the merged value.
    pub fn merged(&self, patch: SettingsPatch) -> Settings {
        Settings {
            source_lang: patch.source_lang.unwrap_or_else(|| self.source_lang.clone()),
            target_lang: patch.target_lang.unwrap_or_else(|| self.target_lang.clone()),
            preferred_model: patch
                .preferred_model
                .unwrap_or_else(|| self.preferred_model.clone()),
            fallback_model: patch
                .fallback_model
                .unwrap_or_else(|| self.fallback_model.clone()),
            transport: patch.transport.unwrap_or(self.transport),
            native_host_available: patch
                .native_host_available
                .unwrap_or(self.native_host_available),
            native_host_checked_at: patch
                .native_host_checked_at
                .or_else(|| self.native_host_checked_at.clone()),
        }
    }
}

/// Latest benchmark outcome, persisted for the UI and future elections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BenchmarkState {
    pub runs: Vec<BenchmarkRun>,
    pub preferred_model: Option<String>,
    pub updated_at: Option<String>,
}

/// Async key-value seam for settings and benchmark state.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self) -> Result<Settings, AppError>;
    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, AppError>;
    async fn get_benchmark_state(&self) -> Result<BenchmarkState, AppError>;
    async fn set_benchmark_state(&self, state: BenchmarkState) -> Result<(), AppError>;
}

/// In-memory store for tests and embeddings without persistence.
#[derive(Default)]
pub struct MemoryStore {
    settings: Mutex<Settings>,
    benchmark: Mutex<BenchmarkState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            benchmark: Mutex::new(BenchmarkState::default()),
        }
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self) -> Result<Settings, AppError> {
        Ok(self.settings.lock().clone())
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, AppError> {
        let mut settings = self.settings.lock();
        *settings = settings.merged(patch);
        Ok(settings.clone())
    }

    async fn get_benchmark_state(&self) -> Result<BenchmarkState, AppError> {
        Ok(self.benchmark.lock().clone())
    }

    async fn set_benchmark_state(&self, state: BenchmarkState) -> Result<(), AppError> {
        *self.benchmark.lock() = state;
        Ok(())
    }
}

/// Store wrapper that fails every call, for exercising error paths.
#[cfg(test)]
pub(crate) struct FailingStore;

#[cfg(test)]
#[async_trait]
impl SettingsStore for FailingStore {
    async fn get_settings(&self) -> Result<Settings, AppError> {
        Err(AppError::new(ErrorCode::Unexpected, "settings store offline"))
    }

    async fn update_settings(&self, _patch: SettingsPatch) -> Result<Settings, AppError> {
        Err(AppError::new(ErrorCode::Unexpected, "settings store offline"))
    }

    async fn get_benchmark_state(&self) -> Result<BenchmarkState, AppError> {
        Err(AppError::new(ErrorCode::Unexpected, "settings store offline"))
    }

    async fn set_benchmark_state(&self, _state: BenchmarkState) -> Result<(), AppError> {
        Err(AppError::new(ErrorCode::Unexpected, "settings store offline"))
    }
}
