//! Framed stdio host: decodes length-prefixed JSON requests, dispatches
//! ping and translate, writes one framed reply per request until EOF.
//! Runs in mock mode or against the CLI bridge.

pub mod client;

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::bridge::prompt::collapse_whitespace;
use crate::bridge::{BridgeConfig, ToolBridge, TranslationJob, Translator};
use crate::config::{HostConfig, HostMode};
use crate::error::{AppError, ErrorCode};
use crate::framing::{encode_frame, FrameDecoder};
use crate::logger::EventLog;
use crate::protocol::{NativeRequest, NativeResponse, HOST_NAME, MAX_TEXT_LENGTH};

pub struct HostService {
    mode: HostMode,
    translator: Option<Arc<dyn Translator>>,
    log: Arc<EventLog>,
}

impl HostService {
    pub fn new(mode: HostMode, translator: Option<Arc<dyn Translator>>, log: Arc<EventLog>) -> Self {
        Self {
            mode,
            translator,
            log,
        }
    }

    pub fn from_config(config: &HostConfig, log: Arc<EventLog>) -> Self {
        match config.mode() {
            HostMode::Mock => Self::new(HostMode::Mock, None, log),
            HostMode::Cli => {
                let bridge = ToolBridge::new(BridgeConfig::from(config), log.clone());
                Self::new(HostMode::Cli, Some(Arc::new(bridge)), log)
            }
        }
    }

    pub fn mode(&self) -> HostMode {
        self.mode
    }

    /// Serve frames until the reader hits EOF. Each decoded request produces
    /// exactly one reply frame; a reply that fails to encode is dropped with
    /// an error trace rather than killing the loop.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            for frame in decoder.feed(&buf[..n]) {
                let response = self.handle(&frame).await;
                let encoded = match serde_json::to_vec(&response) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        error!(error = %e, "failed to encode reply frame");
                        continue;
                    }
                };
                writer.write_all(&encode_frame(&encoded)).await?;
                writer.flush().await?;
            }
        }
    }

    /// Dispatch one raw request body to a reply.
    pub async fn handle(&self, raw: &[u8]) -> NativeResponse {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(_) => {
                return self.error_response(
                    None,
                    ErrorCode::InvalidJson,
                    "Request body is not valid JSON.",
                )
            }
        };

        match serde_json::from_value::<NativeRequest>(value.clone()) {
            Ok(NativeRequest::Ping { request_id }) => {
                let log_id = request_id.as_deref().unwrap_or("ping");
                self.log
                    .log(log_id, "ping", json!({ "mode": self.mode.as_str() }))
                    .await;
                NativeResponse {
                    ok: true,
                    host: Some(HOST_NAME.to_string()),
                    mode: Some(self.mode.as_str().to_string()),
                    ..Default::default()
                }
            }
            Ok(NativeRequest::Translate {
                request_id,
                text,
                source_lang,
                target_lang,
                model,
            }) => {
                self.handle_translate(request_id, text, source_lang, target_lang, model)
                    .await
            }
            Err(_) => {
                let request_id = value
                    .get("requestId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let kind = match value.get("type") {
                    None | Some(Value::Null) => "undefined".to_string(),
                    Some(Value::String(kind)) => kind.clone(),
                    Some(other) => other.to_string(),
                };
                self.error_response(
                    request_id,
                    ErrorCode::UnknownType,
                    format!("Unsupported request type: {kind}"),
                )
            }
        }
    }

    async fn handle_translate(
        &self,
        request_id: Option<String>,
        text: Option<String>,
        source_lang: Option<String>,
        target_lang: Option<String>,
        model: Option<String>,
    ) -> NativeResponse {
        let started = Instant::now();
        let outcome = self
            .translate_validated(&request_id, &text, &source_lang, &target_lang, &model)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let log_id = request_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or("unknown")
            .to_string();

        match outcome {
            Ok(translated_text) => {
                self.log
                    .log(
                        &log_id,
                        "translate_success",
                        json!({
                            "mode": self.mode.as_str(),
                            "model": model.as_deref().unwrap_or_default(),
                            "latencyMs": latency_ms,
                        }),
                    )
                    .await;
                NativeResponse {
                    ok: true,
                    request_id,
                    translated_text: Some(translated_text),
                    model,
                    latency_ms: Some(latency_ms),
                    mode: Some(self.mode.as_str().to_string()),
                    ..Default::default()
                }
            }
            Err(err) => {
                let mut fields = json!({
                    "mode": self.mode.as_str(),
                    "errorCode": err.code,
                    "message": err.message.clone(),
                });
                if let Some(model) = model.as_deref() {
                    fields["model"] = json!(model);
                }
                self.log.log(&log_id, "translate_error", fields).await;
                NativeResponse {
                    ok: false,
                    request_id,
                    error_code: Some(err.code),
                    message: Some(err.message),
                    mode: Some(self.mode.as_str().to_string()),
                    ..Default::default()
                }
            }
        }
    }

    /// Field validation in reply order, then the mock or bridge run.
    async fn translate_validated(
        &self,
        request_id: &Option<String>,
        text: &Option<String>,
        source_lang: &Option<String>,
        target_lang: &Option<String>,
        model: &Option<String>,
    ) -> Result<String, AppError> {
        let request_id = match request_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                return Err(AppError::new(
                    ErrorCode::MissingRequestId,
                    "requestId is required.",
                ))
            }
        };
        let text = text.as_deref().unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AppError::new(ErrorCode::EmptyText, "text is required."));
        }
        if text.chars().count() > MAX_TEXT_LENGTH {
            return Err(AppError::new(
                ErrorCode::PayloadTooLarge,
                format!("text must be <= {MAX_TEXT_LENGTH} chars."),
            ));
        }
        let target_lang = match target_lang.as_deref().filter(|lang| !lang.trim().is_empty()) {
            Some(lang) => lang,
            None => {
                return Err(AppError::new(
                    ErrorCode::MissingTargetLang,
                    "targetLang is required.",
                ))
            }
        };
        let model = match model.as_deref().filter(|model| !model.trim().is_empty()) {
            Some(model) => model,
            None => return Err(AppError::new(ErrorCode::MissingModel, "model is required.")),
        };
        let source_lang = source_lang
            .as_deref()
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or("auto");

        self.log
            .log(
                request_id,
                "translate_start",
                json!({
                    "mode": self.mode.as_str(),
                    "model": model,
                    "sourceLang": source_lang,
                    "targetLang": target_lang,
                    "textLength": text.chars().count(),
                }),
            )
            .await;

        match self.mode {
            HostMode::Mock => Ok(format!(
                "[native-mock:{model}:{source_lang}->{target_lang}] {}",
                collapse_whitespace(text)
            )),
            HostMode::Cli => {
                let translator = match &self.translator {
                    Some(translator) => translator,
                    None => return Err(AppError::unexpected("no translator configured")),
                };
                let job = TranslationJob {
                    request_id: request_id.to_string(),
                    text: text.to_string(),
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                    model: model.to_string(),
                };
                translator.translate(&job, &CancellationToken::new()).await
            }
        }
    }

    fn error_response(
        &self,
        request_id: Option<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> NativeResponse {
        NativeResponse {
            ok: false,
            request_id,
            error_code: Some(code),
            message: Some(message.into()),
            mode: Some(self.mode.as_str().to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LOG_ROTATE_BYTES;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedTranslator(Result<String, AppError>);

    #[async_trait]
    impl Translator for FixedTranslator {
        async fn translate(
            &self,
            _job: &TranslationJob,
            _cancel: &CancellationToken,
        ) -> Result<String, AppError> {
            self.0.clone()
        }
    }

    fn mock_service(dir: &TempDir) -> HostService {
        HostService::new(
            HostMode::Mock,
            None,
            Arc::new(EventLog::new(dir.path().join("host.log"), LOG_ROTATE_BYTES)),
        )
    }

    fn cli_service(dir: &TempDir, outcome: Result<String, AppError>) -> HostService {
        HostService::new(
            HostMode::Cli,
            Some(Arc::new(FixedTranslator(outcome))),
            Arc::new(EventLog::new(dir.path().join("host.log"), LOG_ROTATE_BYTES)),
        )
    }

    #[tokio::test]
    async fn malformed_json_yields_invalid_json() {
        let dir = TempDir::new().unwrap();
        let service = mock_service(&dir);
        let resp = service.handle(b"{not json").await;
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(ErrorCode::InvalidJson));
        assert_eq!(resp.message.as_deref(), Some("Request body is not valid JSON."));
        assert_eq!(resp.mode.as_deref(), Some("mock"));
        assert_eq!(resp.request_id, None);
    }

    #[tokio::test]
    async fn ping_replies_with_host_and_mode() {
        let dir = TempDir::new().unwrap();
        let service = mock_service(&dir);
        let resp = service.handle(br#"{"type":"ping","requestId":"r1"}"#).await;
        assert!(resp.ok);
        assert_eq!(resp.host.as_deref(), Some(HOST_NAME));
        assert_eq!(resp.mode.as_deref(), Some("mock"));
        assert_eq!(resp.request_id, None);
    }

    #[tokio::test]
    async fn unknown_type_echoes_the_type_and_request_id() {
        let dir = TempDir::new().unwrap();
        let service = mock_service(&dir);

        let resp = service
            .handle(br#"{"type":"frobnicate","requestId":"r2"}"#)
            .await;
        assert_eq!(resp.error_code, Some(ErrorCode::UnknownType));
        assert_eq!(
            resp.message.as_deref(),
            Some("Unsupported request type: frobnicate")
        );
        assert_eq!(resp.request_id.as_deref(), Some("r2"));

        let resp = service.handle(br#"{"requestId":"r3"}"#).await;
        assert_eq!(resp.error_code, Some(ErrorCode::UnknownType));
        assert_eq!(
            resp.message.as_deref(),
            Some("Unsupported request type: undefined")
        );
    }

    #[tokio::test]
    async fn translate_validation_rejects_in_field_order() {
        let dir = TempDir::new().unwrap();
        let service = mock_service(&dir);

        let cases: &[(&str, ErrorCode, &str)] = &[
            (
                r#"{"type":"translate"}"#,
                ErrorCode::MissingRequestId,
                "requestId is required.",
            ),
            (
                r#"{"type":"translate","requestId":"r1"}"#,
                ErrorCode::EmptyText,
                "text is required.",
            ),
            (
                r#"{"type":"translate","requestId":"r1","text":"  \n "}"#,
                ErrorCode::EmptyText,
                "text is required.",
            ),
            (
                r#"{"type":"translate","requestId":"r1","text":"hi"}"#,
                ErrorCode::MissingTargetLang,
                "targetLang is required.",
            ),
            (
                r#"{"type":"translate","requestId":"r1","text":"hi","targetLang":"ko"}"#,
                ErrorCode::MissingModel,
                "model is required.",
            ),
        ];
        for (raw, code, message) in cases {
            let resp = service.handle(raw.as_bytes()).await;
            assert!(!resp.ok, "{raw}");
            assert_eq!(resp.error_code, Some(*code), "{raw}");
            assert_eq!(resp.message.as_deref(), Some(*message), "{raw}");
        }

        let oversized = format!(
            r#"{{"type":"translate","requestId":"r1","text":"{}","targetLang":"ko","model":"m1"}}"#,
            "a".repeat(MAX_TEXT_LENGTH + 1)
        );
        let resp = service.handle(oversized.as_bytes()).await;
        assert_eq!(resp.error_code, Some(ErrorCode::PayloadTooLarge));
        assert_eq!(
            resp.message.as_deref(),
            Some("text must be <= 12000 chars.")
        );
    }

    #[tokio::test]
    async fn mock_translate_condenses_text_and_defaults_source_lang() {
        let dir = TempDir::new().unwrap();
        let service = mock_service(&dir);
        let resp = service
            .handle(
                br#"{"type":"translate","requestId":"r7","text":"  hi   there ","targetLang":"ko","model":"m1"}"#,
            )
            .await;
        assert!(resp.ok);
        assert_eq!(
            resp.translated_text.as_deref(),
            Some("[native-mock:m1:auto->ko] hi there")
        );
        assert_eq!(resp.request_id.as_deref(), Some("r7"));
        assert_eq!(resp.model.as_deref(), Some("m1"));
        assert!(resp.latency_ms.is_some());
        assert_eq!(resp.mode.as_deref(), Some("mock"));
    }

    #[tokio::test]
    async fn cli_mode_forwards_bridge_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let service = cli_service(&dir, Ok("번역".to_string()));
        let resp = service
            .handle(
                br#"{"type":"translate","requestId":"r8","text":"hello","sourceLang":"en","targetLang":"ko","model":"m1"}"#,
            )
            .await;
        assert!(resp.ok);
        assert_eq!(resp.translated_text.as_deref(), Some("번역"));
        assert_eq!(resp.mode.as_deref(), Some("cli"));

        let service = cli_service(
            &dir,
            Err(AppError::new(
                ErrorCode::ModelTimeout,
                "Translation timed out. Please retry.",
            )),
        );
        let resp = service
            .handle(
                br#"{"type":"translate","requestId":"r9","text":"hello","targetLang":"ko","model":"m1"}"#,
            )
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(ErrorCode::ModelTimeout));
        assert_eq!(resp.request_id.as_deref(), Some("r9"));
    }

    #[tokio::test]
    async fn run_serves_framed_requests_until_eof() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(mock_service(&dir));
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);

        let serve = {
            let service = service.clone();
            tokio::spawn(async move { service.run(server_read, server_write).await })
        };

        client
            .write_all(&encode_frame(br#"{"type":"ping"}"#))
            .await
            .unwrap();
        client
            .write_all(&encode_frame(
                br#"{"type":"translate","requestId":"r1","text":"hola","targetLang":"ko","model":"m1"}"#,
            ))
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        serve.await.unwrap().unwrap();

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&raw);
        assert_eq!(frames.len(), 2);

        let ping: NativeResponse = serde_json::from_slice(&frames[0]).unwrap();
        assert!(ping.ok);
        assert_eq!(ping.host.as_deref(), Some(HOST_NAME));

        let translate: NativeResponse = serde_json::from_slice(&frames[1]).unwrap();
        assert!(translate.ok);
        assert_eq!(
            translate.translated_text.as_deref(),
            Some("[native-mock:m1:auto->ko] hola")
        );
    }
}
