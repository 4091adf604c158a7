//! Client side of the native messaging channel. Spawns the host binary,
//! performs one framed round trip per call and maps channel failures onto
//! the error taxonomy.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::bridge::{TranslationJob, Translator};
use crate::error::{AppError, ErrorCode};
use crate::framing::{encode_frame, FrameDecoder};
use crate::protocol::{NativeResponse, HOST_NAME};

/// Ceiling for one host round trip, matching the host's own CLI deadline.
pub const HOST_CALL_TIMEOUT: Duration = Duration::from_millis(45_000);

pub struct HostClient {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl HostClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: HOST_CALL_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ping the host binary; returns the host name it reports.
    pub async fn ping(&self) -> Result<String, AppError> {
        let response = self.round_trip(&json!({ "type": "ping" })).await?;
        if !response.ok {
            return Err(map_error_response(response));
        }
        Ok(response.host.unwrap_or_else(|| HOST_NAME.to_string()))
    }

    /// One translate round trip. The full response is returned so callers
    /// can read the host-measured latency and model.
    pub async fn translate(&self, job: &TranslationJob) -> Result<NativeResponse, AppError> {
        let response = self
            .round_trip(&json!({
                "type": "translate",
                "requestId": job.request_id,
                "text": job.text,
                "sourceLang": job.source_lang,
                "targetLang": job.target_lang,
                "model": job.model,
            }))
            .await?;
        if !response.ok {
            return Err(map_error_response(response));
        }
        if response.translated_text.is_none() {
            return Err(bad_response());
        }
        Ok(response)
    }

    async fn round_trip(&self, request: &serde_json::Value) -> Result<NativeResponse, AppError> {
        match timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::new(
                ErrorCode::ModelTimeout,
                "Native host response timed out.",
            )),
        }
    }

    /// Spawn the host, write one frame, close stdin and read the reply.
    async fn exchange(&self, request: &serde_json::Value) -> Result<NativeResponse, AppError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::new(ErrorCode::HostUnavailable, e.to_string()))?;

        let body = serde_json::to_vec(request).map_err(|e| AppError::unexpected(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&encode_frame(&body))
                .await
                .map_err(|e| AppError::new(ErrorCode::HostUnavailable, e.to_string()))?;
            // Dropping stdin signals EOF so a well-behaved host exits after
            // replying.
        }

        let mut raw = Vec::new();
        match child.stdout.take() {
            Some(mut stdout) => {
                stdout
                    .read_to_end(&mut raw)
                    .await
                    .map_err(|e| AppError::new(ErrorCode::HostUnavailable, e.to_string()))?;
            }
            None => return Err(bad_response()),
        }
        let _ = child.wait().await;

        let mut decoder = FrameDecoder::new();
        let frame = decoder
            .feed(&raw)
            .into_iter()
            .next()
            .ok_or_else(bad_response)?;
        serde_json::from_slice(&frame).map_err(|_| bad_response())
    }
}

#[async_trait]
impl Translator for HostClient {
    async fn translate(
        &self,
        job: &TranslationJob,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        tokio::select! {
            result = HostClient::translate(self, job) => {
                result?.translated_text.ok_or_else(bad_response)
            }
            _ = cancel.cancelled() => Err(AppError::new(
                ErrorCode::ModelTimeout,
                "Native host response timed out.",
            )),
        }
    }
}

fn map_error_response(response: NativeResponse) -> AppError {
    AppError::new(
        response.error_code.unwrap_or(ErrorCode::NativeBadResponse),
        response
            .message
            .unwrap_or_else(|| "Invalid response from native host.".to_string()),
    )
}

fn bad_response() -> AppError {
    AppError::new(
        ErrorCode::NativeBadResponse,
        "Invalid response from native host.",
    )
}
