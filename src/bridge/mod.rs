//! Native translation bridge: one external tool subprocess per request.
//! Builds the prompt and argument vector, runs the tool against a private
//! scratch directory and maps failures onto the closed error taxonomy.

pub mod process;
pub mod prompt;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::HostConfig;
use crate::error::{AppError, ErrorCode};
use crate::logger::EventLog;
use process::{run_process, ExecPlan, ProcessResult, KILL_GRACE};
use prompt::{build_translation_prompt, collapse_whitespace, sanitize_translation};

/// File the external tool writes its final message into.
const OUTPUT_FILE: &str = "last-message.txt";
/// Cap on tool error text propagated to callers.
const MAX_ERROR_MESSAGE_CHARS: usize = 280;

/// One translation to execute against a backend.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub request_id: String,
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub model: String,
}

/// Adapter seam for translation backends.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        job: &TranslationJob,
        cancel: &CancellationToken,
    ) -> Result<String, AppError>;
}

/// Invocation parameters for the external tool.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub cli_bin: String,
    pub reasoning_effort: String,
    pub timeout: Duration,
}

impl From<&HostConfig> for BridgeConfig {
    fn from(config: &HostConfig) -> Self {
        Self {
            cli_bin: config.cli_bin.clone(),
            reasoning_effort: config.reasoning_effort.clone(),
            timeout: config.cli_timeout,
        }
    }
}

/// Subprocess-backed translator delegating to the external CLI.
pub struct ToolBridge {
    config: BridgeConfig,
    log: Arc<EventLog>,
}

impl ToolBridge {
    pub fn new(config: BridgeConfig, log: Arc<EventLog>) -> Self {
        Self { config, log }
    }

    fn plan(&self, job: &TranslationJob, output_path: &Path) -> ExecPlan {
        ExecPlan {
            program: self.config.cli_bin.clone(),
            args: vec![
                "exec".to_string(),
                "-m".to_string(),
                job.model.clone(),
                "-c".to_string(),
                format!("model_reasoning_effort=\"{}\"", self.config.reasoning_effort),
                "-c".to_string(),
                "reasoning_summaries=\"none\"".to_string(),
                "--skip-git-repo-check".to_string(),
                "--ephemeral".to_string(),
                "--color".to_string(),
                "never".to_string(),
                "--output-last-message".to_string(),
                output_path.display().to_string(),
                "-".to_string(),
            ],
            stdin_payload: build_translation_prompt(&job.text, &job.source_lang, &job.target_lang),
        }
    }

    /// Classify a failed run. Precedence: timeout, missing binary, then
    /// substring matching on the combined output, then a generic failure
    /// carrying the compacted tool output.
    fn map_tool_failure(&self, result: &ProcessResult) -> AppError {
        if result.timed_out {
            return AppError::new(
                ErrorCode::ModelTimeout,
                "Translation timed out. Please retry.",
            );
        }
        if result.spawn_error == Some(std::io::ErrorKind::NotFound) {
            return AppError::new(
                ErrorCode::ExternalToolNotFound,
                format!(
                    "`{}` CLI is not installed or not in PATH.",
                    self.config.cli_bin
                ),
            );
        }

        let combined = format!("{}\n{}", result.stderr, result.stdout).to_lowercase();
        if combined.contains("login")
            || combined.contains("not logged")
            || combined.contains("unauthorized")
        {
            return AppError::new(
                ErrorCode::AuthRequired,
                "Translator CLI auth is missing or expired. Log in and retry.",
            );
        }
        if combined.contains("model") && combined.contains("not found") {
            return AppError::new(ErrorCode::ModelNotFound, "Requested model is unavailable.");
        }
        if combined.contains("rate limit") {
            return AppError::new(
                ErrorCode::ModelRateLimit,
                "Model rate limit reached. Retry shortly.",
            );
        }

        let source = if result.stderr.is_empty() {
            &result.stdout
        } else {
            &result.stderr
        };
        let compact: String = collapse_whitespace(source)
            .chars()
            .take(MAX_ERROR_MESSAGE_CHARS)
            .collect();
        if compact.is_empty() {
            AppError::new(ErrorCode::ModelExecFailed, "external translator failed")
        } else {
            AppError::new(ErrorCode::ModelExecFailed, compact)
        }
    }
}

#[async_trait]
impl Translator for ToolBridge {
    async fn translate(
        &self,
        job: &TranslationJob,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        // Dropped on every exit path, which removes the directory best-effort.
        let scratch = tempfile::Builder::new()
            .prefix("textswift-host-")
            .tempdir()
            .map_err(|e| AppError::unexpected(format!("scratch dir: {e}")))?;
        let output_path = scratch.path().join(OUTPUT_FILE);
        let plan = self.plan(job, &output_path);

        self.log
            .log(
                &job.request_id,
                "exec_start",
                json!({ "model": job.model, "bin": self.config.cli_bin }),
            )
            .await;

        let result = run_process(plan, self.config.timeout, KILL_GRACE, cancel).await;

        if result.timed_out || result.exit_code != 0 {
            let err = self.map_tool_failure(&result);
            self.log
                .log(
                    &job.request_id,
                    "exec_error",
                    json!({
                        "errorCode": err.code,
                        "exitCode": result.exit_code,
                        "timedOut": result.timed_out,
                    }),
                )
                .await;
            return Err(err);
        }

        let raw = tokio::fs::read_to_string(&output_path)
            .await
            .unwrap_or_default();
        match sanitize_translation(&raw) {
            Ok(text) => {
                self.log
                    .log(&job.request_id, "exec_success", json!({ "model": job.model }))
                    .await;
                Ok(text)
            }
            Err(err) => {
                self.log
                    .log(
                        &job.request_id,
                        "exec_error",
                        json!({ "errorCode": err.code }),
                    )
                    .await;
                Err(err)
            }
        }
    }
}
