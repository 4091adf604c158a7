//! Request broker: payload validation, per-origin rate limiting, result
//! caching, single-flight coalescing and the model fallback chain. One
//! broker instance owns all translation traffic for the process.

pub mod cache;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::bridge::{TranslationJob, Translator};
use crate::error::{AppError, ErrorCode};
use crate::host::client::HostClient;
use crate::logger::{now_rfc3339, EventLog};
use crate::protocol::{Transport, FAST_FALLBACK_MODEL, FAST_PRIMARY_MODEL, MAX_TEXT_LENGTH};
use crate::settings::{Settings, SettingsPatch, SettingsStore};
use cache::{CacheKey, CachedTranslation, TranslationCache};

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_millis(500);
pub const CACHE_CAPACITY: usize = 120;
pub const CACHE_TTL: Duration = Duration::from_secs(120);

const MOCK_DELAY_BASE_MS: u64 = 260;
const MOCK_DELAY_CAP_MS: u64 = 1400;

// --- Payloads ---

/// Caller-supplied translation request. Optional fields fall back to
/// settings or generated values during normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatePayload {
    pub request_id: Option<String>,
    pub text: String,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub model: Option<String>,
    pub transport: Option<Transport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateSuccess {
    pub request_id: String,
    pub translated_text: String,
    pub model: String,
    pub latency_ms: u64,
    pub transport: Transport,
    pub cached: bool,
}

/// Outcome of a host availability probe, mirrored into settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPing {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub native_host_available: bool,
    pub checked_at: String,
}

struct NormalizedRequest {
    request_id: String,
    text: String,
    source_lang: String,
    target_lang: String,
    model: Option<String>,
    transport: Option<Transport>,
}

type FlightOutcome = Result<CachedTranslation, AppError>;

// --- Rate limiting ---

/// Per-origin request gate. A request is rejected if the same origin issued
/// one within the window; the rejection itself does not refresh the window.
/// Callers without an origin are exempt.
pub struct RateGate {
    window: Duration,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl RateGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, origin: Option<&str>) -> Result<(), AppError> {
        let origin = match origin {
            Some(origin) => origin,
            None => return Ok(()),
        };
        let mut last_seen = self.last_seen.lock();
        let now = Instant::now();
        if let Some(last) = last_seen.get(origin) {
            if now.duration_since(*last) < self.window {
                return Err(AppError::new(
                    ErrorCode::RateLimited,
                    "Too many requests. Please wait a moment.",
                ));
            }
        }
        last_seen.insert(origin.to_string(), now);
        Ok(())
    }
}

// --- Broker ---

pub struct Broker {
    store: Arc<dyn SettingsStore>,
    native: Arc<dyn Translator>,
    log: Arc<EventLog>,
    cache: TranslationCache,
    rate: RateGate,
    in_flight: Mutex<HashMap<CacheKey, Vec<oneshot::Sender<FlightOutcome>>>>,
}

impl Broker {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        native: Arc<dyn Translator>,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            store,
            native,
            log,
            cache: TranslationCache::new(CACHE_CAPACITY, CACHE_TTL),
            rate: RateGate::new(RATE_LIMIT_WINDOW),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Translate `payload`, walking the model fallback chain until a
    /// candidate succeeds. `origin` identifies the caller for rate limiting.
    pub async fn translate(
        self: &Arc<Self>,
        payload: TranslatePayload,
        origin: Option<&str>,
    ) -> Result<TranslateSuccess, AppError> {
        let request = normalize_payload(payload)?;
        self.rate.check(origin)?;

        let settings = self.store.get_settings().await?;
        let transport = request.transport.unwrap_or(settings.transport);
        let chain = build_model_chain(request.model.as_deref(), &settings);

        let mut last_error: Option<AppError> = None;
        for model in &chain {
            let key = TranslationCache::compute_key(
                transport,
                model,
                &request.source_lang,
                &request.target_lang,
                &request.text,
            );

            if let Some(hit) = self.cache.get(&key) {
                return Ok(TranslateSuccess {
                    request_id: request.request_id,
                    translated_text: hit.translated_text,
                    model: model.clone(),
                    latency_ms: hit.latency_ms,
                    transport,
                    cached: true,
                });
            }

            match self.run_candidate(&request, model, transport, key).await {
                Ok(result) => {
                    return Ok(TranslateSuccess {
                        request_id: request.request_id,
                        translated_text: result.translated_text,
                        model: model.clone(),
                        latency_ms: result.latency_ms,
                        transport,
                        cached: false,
                    });
                }
                Err(err) => {
                    self.log
                        .log(
                            &request.request_id,
                            "translate_attempt_failed",
                            json!({
                                "model": model,
                                "transport": transport,
                                "errorCode": err.code,
                                "message": err.message.clone(),
                            }),
                        )
                        .await;
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::unexpected("Unexpected error")))
    }

    /// Run one translation against exactly one candidate model, bypassing
    /// the cache and the fallback chain. Benchmark cells use this so latency
    /// and failures attribute to the requested model alone.
    pub async fn translate_single(
        self: &Arc<Self>,
        payload: TranslatePayload,
    ) -> Result<TranslateSuccess, AppError> {
        let request = normalize_payload(payload)?;
        let model = match request.model {
            Some(model) => model,
            None => return Err(AppError::new(ErrorCode::MissingModel, "model is required.")),
        };
        let settings = self.store.get_settings().await?;
        let transport = request.transport.unwrap_or(settings.transport);
        let job = TranslationJob {
            request_id: request.request_id.clone(),
            text: request.text,
            source_lang: request.source_lang,
            target_lang: request.target_lang,
            model: model.clone(),
        };
        let result = self.run_transport(&job, transport).await?;
        Ok(TranslateSuccess {
            request_id: request.request_id,
            translated_text: result.translated_text,
            model,
            latency_ms: result.latency_ms,
            transport,
            cached: false,
        })
    }

    /// Probe the native host and persist the availability check either way.
    pub async fn ping_host(&self, client: &HostClient) -> HostPing {
        let outcome = client.ping().await;
        let checked_at = now_rfc3339();
        let patch = SettingsPatch {
            native_host_available: Some(outcome.is_ok()),
            native_host_checked_at: Some(checked_at.clone()),
            ..Default::default()
        };
        if let Err(e) = self.store.update_settings(patch).await {
            warn!(error = %e, "failed to persist host availability");
        }
        match outcome {
            Ok(host) => HostPing {
                ok: true,
                host: Some(host),
                error_code: None,
                message: None,
                native_host_available: true,
                checked_at,
            },
            Err(err) => HostPing {
                ok: false,
                host: None,
                error_code: Some(err.code),
                message: Some(err.message),
                native_host_available: false,
                checked_at,
            },
        }
    }

    /// Run one chain candidate, coalescing concurrent identical requests.
    /// The first caller for a key becomes the leader and spawns the actual
    /// execution; everyone (leader included) awaits the settled outcome.
    async fn run_candidate(
        self: &Arc<Self>,
        request: &NormalizedRequest,
        model: &str,
        transport: Transport,
        key: CacheKey,
    ) -> FlightOutcome {
        let (tx, rx) = oneshot::channel();
        let leads = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get_mut(&key) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    in_flight.insert(key, vec![tx]);
                    true
                }
            }
        };

        if leads {
            let broker = Arc::clone(self);
            let job = TranslationJob {
                request_id: request.request_id.clone(),
                text: request.text.clone(),
                source_lang: request.source_lang.clone(),
                target_lang: request.target_lang.clone(),
                model: model.to_string(),
            };
            tokio::spawn(async move {
                let outcome = broker.run_transport(&job, transport).await;
                if let Ok(result) = &outcome {
                    broker.cache.insert(key, result.clone());
                }
                let waiters = broker.in_flight.lock().remove(&key).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::unexpected("translation task dropped")),
        }
    }

    async fn run_transport(&self, job: &TranslationJob, transport: Transport) -> FlightOutcome {
        let started = Instant::now();
        match transport {
            Transport::Mock => {
                sleep(mock_delay(&job.text)).await;
                let condensed = crate::bridge::prompt::collapse_whitespace(&job.text);
                Ok(CachedTranslation {
                    translated_text: format!(
                        "[mock:{}->{}] {}",
                        job.model, job.target_lang, condensed
                    ),
                    latency_ms: started.elapsed().as_millis() as u64,
                })
            }
            Transport::Native => {
                let cancel = CancellationToken::new();
                let translated_text = self.native.translate(job, &cancel).await?;
                Ok(CachedTranslation {
                    translated_text,
                    latency_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

// --- Normalization ---

fn normalize_payload(payload: TranslatePayload) -> Result<NormalizedRequest, AppError> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(AppError::new(
            ErrorCode::EmptyText,
            "Text is required for translation.",
        ));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(AppError::new(
            ErrorCode::PayloadTooLarge,
            "Selected text is too long.",
        ));
    }
    Ok(NormalizedRequest {
        request_id: payload
            .request_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        text: text.to_string(),
        source_lang: sanitize_lang(payload.source_lang.as_deref(), "auto"),
        target_lang: sanitize_lang(payload.target_lang.as_deref(), "ko"),
        model: payload
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        transport: payload.transport,
    })
}

fn sanitize_lang(lang: Option<&str>, fallback: &str) -> String {
    match lang {
        Some(lang) if !lang.trim().is_empty() => lang.trim().to_lowercase(),
        _ => fallback.to_string(),
    }
}

/// Ordered, de-duplicated candidate models: explicit request model first,
/// then the configured preferred/fallback pair. Blanks are skipped; an
/// entirely blank configuration falls back to the built-in pair.
fn build_model_chain(explicit: Option<&str>, settings: &Settings) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    let candidates = [
        explicit.unwrap_or(""),
        settings.preferred_model.as_str(),
        settings.fallback_model.as_str(),
    ];
    for candidate in candidates {
        if candidate.is_empty() || chain.iter().any(|m| m == candidate) {
            continue;
        }
        chain.push(candidate.to_string());
    }
    if chain.is_empty() {
        return vec![
            FAST_PRIMARY_MODEL.to_string(),
            FAST_FALLBACK_MODEL.to_string(),
        ];
    }
    chain
}

fn mock_delay(text: &str) -> Duration {
    let chars = text.chars().count();
    let ms = MOCK_DELAY_BASE_MS + (chars as f64 * 1.1).floor() as u64;
    Duration::from_millis(ms.min(MOCK_DELAY_CAP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LOG_ROTATE_BYTES;
    use crate::settings::{FailingStore, MemoryStore};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct StubTranslator {
        jobs: Mutex<Vec<TranslationJob>>,
        failing_models: HashSet<String>,
        delay: Duration,
    }

    impl StubTranslator {
        fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                failing_models: HashSet::new(),
                delay: Duration::ZERO,
            }
        }

        fn failing(models: &[&str]) -> Self {
            let mut stub = Self::new();
            stub.failing_models = models.iter().map(|m| m.to_string()).collect();
            stub
        }

        fn with_delay(delay: Duration) -> Self {
            let mut stub = Self::new();
            stub.delay = delay;
            stub
        }

        fn models_called(&self) -> Vec<String> {
            self.jobs.lock().iter().map(|j| j.model.clone()).collect()
        }
    }

    #[async_trait]
    impl Translator for StubTranslator {
        async fn translate(
            &self,
            job: &TranslationJob,
            _cancel: &CancellationToken,
        ) -> Result<String, AppError> {
            self.jobs.lock().push(job.clone());
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.failing_models.contains(&job.model) {
                return Err(AppError::new(
                    ErrorCode::ModelExecFailed,
                    format!("{} is down", job.model),
                ));
            }
            Ok(format!("[{}] {}", job.model, job.text))
        }
    }

    fn test_broker(dir: &TempDir, stub: Arc<StubTranslator>) -> Arc<Broker> {
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(EventLog::new(dir.path().join("events.log"), LOG_ROTATE_BYTES));
        Arc::new(Broker::new(store, stub, log))
    }

    fn payload(text: &str) -> TranslatePayload {
        TranslatePayload {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Script that drains stdin and replies with one framed ping response.
    #[cfg(unix)]
    fn fake_ping_host(dir: &TempDir) -> String {
        use std::os::unix::fs::PermissionsExt;
        let reply = br#"{"ok":true,"host":"com.textswift.host","mode":"mock"}"#;
        let escaped: String = crate::framing::encode_frame(reply)
            .iter()
            .map(|b| format!("\\{b:03o}"))
            .collect();
        let path = dir.path().join("fake-host.sh");
        std::fs::write(
            &path,
            format!("#!/bin/sh\ncat >/dev/null\nprintf '{escaped}'\n"),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn mock_transport_formats_the_reply_and_skips_the_backend() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::new());
        let broker = test_broker(&dir, stub.clone());

        let mut request = payload("Hello   world");
        request.transport = Some(Transport::Mock);
        let result = broker.translate(request, None).await.unwrap();

        assert_eq!(
            result.translated_text,
            format!("[mock:{FAST_PRIMARY_MODEL}->ko] Hello world")
        );
        assert_eq!(result.transport, Transport::Mock);
        assert!(!result.cached);
        assert!(result.latency_ms >= MOCK_DELAY_BASE_MS);
        assert!(stub.models_called().is_empty());
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_before_any_transport_runs() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::new());
        let broker = test_broker(&dir, stub.clone());

        let err = broker
            .translate(payload(&"a".repeat(MAX_TEXT_LENGTH + 1)), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PayloadTooLarge);
        assert!(stub.models_called().is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let dir = TempDir::new().unwrap();
        let broker = test_broker(&dir, Arc::new(StubTranslator::new()));
        let err = broker.translate(payload("   \n "), None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyText);
    }

    #[tokio::test]
    async fn native_transport_normalizes_and_forwards_the_job() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::new());
        let broker = test_broker(&dir, stub.clone());

        let request = TranslatePayload {
            request_id: Some("r-9".to_string()),
            text: "  bonjour  ".to_string(),
            source_lang: Some(" FR ".to_string()),
            target_lang: None,
            model: None,
            transport: None,
        };
        let result = broker.translate(request, None).await.unwrap();

        assert_eq!(result.request_id, "r-9");
        assert_eq!(
            result.translated_text,
            format!("[{FAST_PRIMARY_MODEL}] bonjour")
        );
        assert_eq!(result.transport, Transport::Native);

        let jobs = stub.jobs.lock();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].request_id, "r-9");
        assert_eq!(jobs[0].text, "bonjour");
        assert_eq!(jobs[0].source_lang, "fr");
        assert_eq!(jobs[0].target_lang, "ko");
    }

    #[tokio::test]
    async fn missing_request_id_gets_a_generated_uuid() {
        let dir = TempDir::new().unwrap();
        let broker = test_broker(&dir, Arc::new(StubTranslator::new()));
        let result = broker.translate(payload("hi"), None).await.unwrap();
        assert_eq!(result.request_id.len(), 36);
        assert!(result.request_id.contains('-'));
    }

    #[tokio::test]
    async fn repeat_request_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::new());
        let broker = test_broker(&dir, stub.clone());

        let first = broker.translate(payload("ciao"), None).await.unwrap();
        let second = broker.translate(payload("ciao"), None).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.translated_text, first.translated_text);
        assert_eq!(second.latency_ms, first.latency_ms);
        assert_eq!(stub.models_called().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_execution() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::with_delay(Duration::from_millis(150)));
        let broker = test_broker(&dir, stub.clone());

        let (a, b) = tokio::join!(
            broker.translate(payload("shared"), None),
            broker.translate(payload("shared"), None)
        );
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(a.translated_text, b.translated_text);
        assert_eq!(stub.models_called().len(), 1);
    }

    #[tokio::test]
    async fn failed_primary_falls_back_to_the_next_model() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::failing(&[FAST_PRIMARY_MODEL]));
        let broker = test_broker(&dir, stub.clone());

        let result = broker.translate(payload("salut"), None).await.unwrap();
        assert_eq!(result.model, FAST_FALLBACK_MODEL);
        assert_eq!(
            stub.models_called(),
            vec![FAST_PRIMARY_MODEL.to_string(), FAST_FALLBACK_MODEL.to_string()]
        );
    }

    #[tokio::test]
    async fn explicit_model_equal_to_preferred_is_not_tried_twice() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::failing(&[
            FAST_PRIMARY_MODEL,
            FAST_FALLBACK_MODEL,
        ]));
        let broker = test_broker(&dir, stub.clone());

        let mut request = payload("hola");
        request.model = Some(FAST_PRIMARY_MODEL.to_string());
        let err = broker.translate(request, None).await.unwrap_err();

        assert_eq!(
            stub.models_called(),
            vec![FAST_PRIMARY_MODEL.to_string(), FAST_FALLBACK_MODEL.to_string()]
        );
        // Last candidate's error, not an aggregate.
        assert_eq!(err.code, ErrorCode::ModelExecFailed);
        assert!(err.message.contains(FAST_FALLBACK_MODEL));
    }

    #[tokio::test]
    async fn settings_store_failure_surfaces_to_the_caller() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FailingStore);
        let log = Arc::new(EventLog::new(dir.path().join("events.log"), LOG_ROTATE_BYTES));
        let broker = Arc::new(Broker::new(store, Arc::new(StubTranslator::new()), log));

        let err = broker.translate(payload("hi"), None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unexpected);
        assert_eq!(err.message, "settings store offline");
    }

    #[tokio::test]
    async fn same_origin_is_limited_inside_the_window() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::new());
        let broker = test_broker(&dir, stub.clone());

        broker
            .translate(payload("uno"), Some("tab-1"))
            .await
            .unwrap();
        let err = broker
            .translate(payload("due"), Some("tab-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);

        sleep(RATE_LIMIT_WINDOW + Duration::from_millis(100)).await;
        broker
            .translate(payload("tre"), Some("tab-1"))
            .await
            .unwrap();
        // Origin-less callers are never limited.
        broker.translate(payload("quattro"), None).await.unwrap();
        broker.translate(payload("cinque"), None).await.unwrap();
    }

    #[tokio::test]
    async fn translate_single_skips_cache_and_fallback() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTranslator::failing(&[FAST_PRIMARY_MODEL]));
        let broker = test_broker(&dir, stub.clone());

        let mut request = payload("benchmark cell");
        request.model = Some(FAST_PRIMARY_MODEL.to_string());
        let err = broker.translate_single(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ModelExecFailed);
        assert_eq!(stub.models_called(), vec![FAST_PRIMARY_MODEL.to_string()]);

        let mut request = payload("benchmark cell");
        request.model = Some(FAST_FALLBACK_MODEL.to_string());
        broker.translate_single(request.clone()).await.unwrap();
        broker.translate_single(request).await.unwrap();
        // Two identical calls, two backend runs: nothing was cached.
        assert_eq!(stub.models_called().len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn host_ping_success_is_mirrored_into_settings() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(EventLog::new(dir.path().join("events.log"), LOG_ROTATE_BYTES));
        let broker = Arc::new(Broker::new(
            store.clone(),
            Arc::new(StubTranslator::new()),
            log,
        ));

        let client = HostClient::new(fake_ping_host(&dir));
        let ping = broker.ping_host(&client).await;

        assert!(ping.ok);
        assert_eq!(ping.host.as_deref(), Some("com.textswift.host"));
        assert!(ping.native_host_available);

        let settings = store.get_settings().await.unwrap();
        assert!(settings.native_host_available);
        assert_eq!(
            settings.native_host_checked_at.as_deref(),
            Some(ping.checked_at.as_str())
        );
    }

    #[tokio::test]
    async fn host_ping_failure_is_recorded_with_the_checked_time() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(EventLog::new(dir.path().join("events.log"), LOG_ROTATE_BYTES));
        let broker = Arc::new(Broker::new(
            store.clone(),
            Arc::new(StubTranslator::new()),
            log,
        ));

        let client = HostClient::new("/definitely/not/a/host-binary");
        let ping = broker.ping_host(&client).await;

        assert!(!ping.ok);
        assert_eq!(ping.error_code, Some(ErrorCode::HostUnavailable));
        assert!(!ping.native_host_available);

        let settings = store.get_settings().await.unwrap();
        assert!(!settings.native_host_available);
        assert_eq!(settings.native_host_checked_at, Some(ping.checked_at));
    }

    #[test]
    fn rejection_does_not_refresh_the_rate_window() {
        let gate = RateGate::new(Duration::from_millis(200));
        gate.check(Some("tab-1")).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        assert!(gate.check(Some("tab-1")).is_err());
        std::thread::sleep(Duration::from_millis(120));
        // 240 ms since the accepted request; the rejection at 120 ms must not
        // have restarted the window.
        assert!(gate.check(Some("tab-1")).is_ok());
    }

    #[test]
    fn chain_prefers_explicit_then_settings_without_duplicates() {
        let settings = Settings::default();
        assert_eq!(
            build_model_chain(None, &settings),
            vec![FAST_PRIMARY_MODEL.to_string(), FAST_FALLBACK_MODEL.to_string()]
        );
        assert_eq!(
            build_model_chain(Some("m-custom"), &settings),
            vec![
                "m-custom".to_string(),
                FAST_PRIMARY_MODEL.to_string(),
                FAST_FALLBACK_MODEL.to_string()
            ]
        );
        assert_eq!(
            build_model_chain(Some(FAST_PRIMARY_MODEL), &settings),
            vec![FAST_PRIMARY_MODEL.to_string(), FAST_FALLBACK_MODEL.to_string()]
        );

        let blank = Settings {
            preferred_model: String::new(),
            fallback_model: String::new(),
            ..Settings::default()
        };
        assert_eq!(
            build_model_chain(None, &blank),
            vec![FAST_PRIMARY_MODEL.to_string(), FAST_FALLBACK_MODEL.to_string()]
        );
    }

    #[test]
    fn mock_delay_grows_with_length_and_caps() {
        assert_eq!(mock_delay("ab"), Duration::from_millis(262));
        assert_eq!(mock_delay(&"x".repeat(100)), Duration::from_millis(370));
        assert_eq!(mock_delay(&"x".repeat(5000)), Duration::from_millis(1400));
    }

    #[test]
    fn blank_model_override_is_ignored() {
        let normalized = normalize_payload(TranslatePayload {
            model: Some("   ".to_string()),
            ..payload("hi")
        })
        .unwrap();
        assert!(normalized.model.is_none());
    }
}
