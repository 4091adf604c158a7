//! Latency benchmark: drives the broker over a fixed model x size x
//! iteration matrix, summarizes percentile latencies per model and persists
//! the elected preferred/fallback pair.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::broker::{Broker, TranslatePayload};
use crate::error::{AppError, ErrorCode};
use crate::logger::{now_rfc3339, EventLog};
use crate::protocol::{Transport, FAST_FALLBACK_MODEL, FAST_PRIMARY_MODEL};
use crate::settings::{BenchmarkRun, BenchmarkState, SettingsPatch, SettingsStore, TextSize};

pub const BENCHMARK_DEFAULT_ITERATIONS: u32 = 2;
pub const BENCHMARK_MAX_ITERATIONS: u32 = 5;

/// Per-model digest of one benchmark pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub model: String,
    pub runs: usize,
    pub failures: usize,
    pub p50_ms: u64,
    pub p95_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub summary: Vec<ModelSummary>,
    pub recommended_model: String,
    pub fallback_model: String,
    pub updated_at: String,
}

/// Serialized benchmark executor. At most one pass runs process-wide; a
/// request arriving while one is active joins its result.
pub struct BenchmarkRunner {
    broker: Arc<Broker>,
    store: Arc<dyn SettingsStore>,
    log: Arc<EventLog>,
    active: Mutex<Option<Vec<oneshot::Sender<Result<BenchmarkReport, AppError>>>>>,
}

impl BenchmarkRunner {
    pub fn new(broker: Arc<Broker>, store: Arc<dyn SettingsStore>, log: Arc<EventLog>) -> Self {
        Self {
            broker,
            store,
            log,
            active: Mutex::new(None),
        }
    }

    /// Run the matrix, or join the pass already in flight. A joiner's
    /// iteration count is ignored; the leader's pass decides.
    pub async fn run(
        self: &Arc<Self>,
        iterations: Option<u32>,
    ) -> Result<BenchmarkReport, AppError> {
        let (tx, rx) = oneshot::channel();
        let leads = {
            let mut active = self.active.lock();
            match active.as_mut() {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    *active = Some(vec![tx]);
                    true
                }
            }
        };

        if leads {
            let runner = Arc::clone(self);
            let iterations = clamp_iterations(iterations);
            tokio::spawn(async move {
                let outcome = runner.run_matrix(iterations).await;
                let waiters = runner.active.lock().take().unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::unexpected("benchmark task dropped")),
        }
    }

    /// One full pass: every cell is a complete broker call, executed one at
    /// a time so contention never distorts the measured latency.
    async fn run_matrix(&self, iterations: u32) -> Result<BenchmarkReport, AppError> {
        self.log
            .log(
                "benchmark",
                "benchmark_started",
                json!({ "iterations": iterations }),
            )
            .await;

        let models = [FAST_PRIMARY_MODEL, FAST_FALLBACK_MODEL];
        let mut runs: Vec<BenchmarkRun> = Vec::new();

        for model in models {
            for (text_size, text) in sample_texts() {
                for _ in 0..iterations {
                    let payload = TranslatePayload {
                        request_id: Some(Uuid::new_v4().to_string()),
                        text: text.to_string(),
                        source_lang: Some("auto".to_string()),
                        target_lang: Some("ko".to_string()),
                        model: Some(model.to_string()),
                        transport: Some(Transport::Native),
                    };
                    let started = Instant::now();
                    let outcome = self.broker.translate_single(payload).await;
                    let latency_ms = started.elapsed().as_millis() as u64;
                    runs.push(BenchmarkRun {
                        model: model.to_string(),
                        text_size,
                        latency_ms,
                        ok: outcome.is_ok(),
                        error_code: outcome.err().map(|err| err.code),
                        timestamp: now_rfc3339(),
                    });
                }
            }
        }

        if !runs.iter().any(|run| run.ok) {
            let mut codes: Vec<ErrorCode> = Vec::new();
            for run in &runs {
                if let Some(code) = run.error_code {
                    if !codes.contains(&code) {
                        codes.push(code);
                    }
                }
            }
            let joined = codes
                .iter()
                .map(|code| code.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.log
                .log("benchmark", "benchmark_failed", json!({ "errorCodes": codes }))
                .await;
            return Err(AppError::new(
                ErrorCode::BenchmarkFailed,
                format!(
                    "No successful benchmark runs. Check the native host and translator CLI setup. ({joined})"
                ),
            ));
        }

        let summary: Vec<ModelSummary> =
            models.iter().map(|model| summarize(model, &runs)).collect();
        let recommended_model = elect(&summary, models[0]);
        let fallback_model = if recommended_model == models[0] {
            models[1].to_string()
        } else {
            models[0].to_string()
        };
        let updated_at = now_rfc3339();

        self.store
            .set_benchmark_state(BenchmarkState {
                runs,
                preferred_model: Some(recommended_model.clone()),
                updated_at: Some(updated_at.clone()),
            })
            .await?;
        self.store
            .update_settings(SettingsPatch {
                preferred_model: Some(recommended_model.clone()),
                fallback_model: Some(fallback_model.clone()),
                ..Default::default()
            })
            .await?;

        self.log
            .log(
                "benchmark",
                "benchmark_complete",
                json!({
                    "recommendedModel": recommended_model,
                    "fallbackModel": fallback_model,
                }),
            )
            .await;

        Ok(BenchmarkReport {
            summary,
            recommended_model,
            fallback_model,
            updated_at,
        })
    }
}

fn sample_texts() -> [(TextSize, &'static str); 3] {
    [
        (
            TextSize::Short,
            "TextSwift translates selected text quickly.",
        ),
        (
            TextSize::Medium,
            "Selection translation should feel instant: the broker reuses warm results, \
             walks a fallback chain on failure, and keeps latency visible to the user.",
        ),
        (
            TextSize::Long,
            "TextSwift is a browser extension focused on in-context translation.\n\n\
             Popup mode and the inline widget are expected to behave identically.\n\n\
             Native messaging reuses the local translator CLI login without exposing credentials.\n\n\
             Model speed is measured with repeated runs and percentile latency.\n\n\
             The interface should stay responsive even during longer translations.",
        ),
    ]
}

fn clamp_iterations(iterations: Option<u32>) -> u32 {
    match iterations {
        None => BENCHMARK_DEFAULT_ITERATIONS,
        Some(n) if n < 1 => BENCHMARK_DEFAULT_ITERATIONS,
        Some(n) => n.min(BENCHMARK_MAX_ITERATIONS),
    }
}

fn summarize(model: &str, runs: &[BenchmarkRun]) -> ModelSummary {
    let model_runs: Vec<&BenchmarkRun> = runs.iter().filter(|run| run.model == model).collect();
    let latencies: Vec<u64> = model_runs
        .iter()
        .filter(|run| run.ok)
        .map(|run| run.latency_ms)
        .collect();
    let failures = model_runs.iter().filter(|run| !run.ok).count();
    ModelSummary {
        model: model.to_string(),
        runs: model_runs.len(),
        failures,
        p50_ms: percentile(&latencies, 50),
        p95_ms: percentile(&latencies, 95),
    }
}

/// Nearest-rank percentile over successful latencies; an empty set is 0.
fn percentile(values: &[u64], p: u32) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = ((p as f64 / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Stable sort by (failures, p95, p50); ties keep the configured order, so
/// the primary model wins an exact draw.
fn elect(summary: &[ModelSummary], fallback: &str) -> String {
    let mut ranked: Vec<&ModelSummary> = summary.iter().collect();
    ranked.sort_by(|a, b| {
        a.failures
            .cmp(&b.failures)
            .then(a.p95_ms.cmp(&b.p95_ms))
            .then(a.p50_ms.cmp(&b.p50_ms))
    });
    ranked
        .first()
        .map(|item| item.model.clone())
        .unwrap_or_else(|| fallback.to_string())
}
