//! Wire types for the native messaging channel plus shared identifiers.
//! Requests dispatch on the `type` tag; replies are a single flat shape with
//! optional fields so both success and error frames share one struct.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ErrorCode;

/// Registered native messaging host name.
pub const HOST_NAME: &str = "com.textswift.host";

/// Hard cap on translatable text, in characters.
pub const MAX_TEXT_LENGTH: usize = 12_000;

/// Built-in model pair used when settings carry no preference.
pub const FAST_PRIMARY_MODEL: &str = "gpt-5.3-codex-low";
pub const FAST_FALLBACK_MODEL: &str = "gpt-5.1-codex-mini";

/// Execution strategy for a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Mock,
    Native,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Mock => "mock",
            Transport::Native => "native",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests accepted by the host. Fields arrive from untyped callers, so
/// string fields are read leniently: a non-string value counts as absent and
/// is caught by field validation rather than failing the whole parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NativeRequest {
    Ping {
        #[serde(default, rename = "requestId", deserialize_with = "lenient_string")]
        request_id: Option<String>,
    },
    Translate {
        #[serde(default, rename = "requestId", deserialize_with = "lenient_string")]
        request_id: Option<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        text: Option<String>,
        #[serde(default, rename = "sourceLang", deserialize_with = "lenient_string")]
        source_lang: Option<String>,
        #[serde(default, rename = "targetLang", deserialize_with = "lenient_string")]
        target_lang: Option<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        model: Option<String>,
    },
}

/// Host reply frame. `ok` plus whichever optional fields the outcome filled;
/// `None` fields are omitted from the encoded JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}
