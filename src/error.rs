//! Closed error taxonomy shared by the broker, bridge, host and benchmark.
//! Every failure a caller can observe is an `AppError`: a stable code plus a
//! short human-readable message.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Stable error codes, serialized on the wire and in log records as
/// SCREAMING_SNAKE strings. Unrecognized inbound codes collapse to
/// `Unexpected` so the set stays closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidJson,
    MissingRequestId,
    EmptyText,
    PayloadTooLarge,
    MissingTargetLang,
    MissingModel,
    RateLimited,
    ModelTimeout,
    ExternalToolNotFound,
    AuthRequired,
    ModelNotFound,
    ModelRateLimit,
    ModelExecFailed,
    EmptyOutput,
    NativeBadResponse,
    HostUnavailable,
    BenchmarkFailed,
    UnknownType,
    Unexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::MissingRequestId => "MISSING_REQUEST_ID",
            ErrorCode::EmptyText => "EMPTY_TEXT",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::MissingTargetLang => "MISSING_TARGET_LANG",
            ErrorCode::MissingModel => "MISSING_MODEL",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ModelTimeout => "MODEL_TIMEOUT",
            ErrorCode::ExternalToolNotFound => "EXTERNAL_TOOL_NOT_FOUND",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::ModelRateLimit => "MODEL_RATE_LIMIT",
            ErrorCode::ModelExecFailed => "MODEL_EXEC_FAILED",
            ErrorCode::EmptyOutput => "EMPTY_OUTPUT",
            ErrorCode::NativeBadResponse => "NATIVE_BAD_RESPONSE",
            ErrorCode::HostUnavailable => "HOST_UNAVAILABLE",
            ErrorCode::BenchmarkFailed => "BENCHMARK_FAILED",
            ErrorCode::UnknownType => "UNKNOWN_TYPE",
            ErrorCode::Unexpected => "UNEXPECTED",
        }
    }

    /// Parse a wire code. Anything outside the known set is `Unexpected`.
    pub fn from_code(raw: &str) -> Self {
        match raw {
            "INVALID_JSON" => ErrorCode::InvalidJson,
            "MISSING_REQUEST_ID" => ErrorCode::MissingRequestId,
            "EMPTY_TEXT" => ErrorCode::EmptyText,
            "PAYLOAD_TOO_LARGE" => ErrorCode::PayloadTooLarge,
            "MISSING_TARGET_LANG" => ErrorCode::MissingTargetLang,
            "MISSING_MODEL" => ErrorCode::MissingModel,
            "RATE_LIMITED" => ErrorCode::RateLimited,
            "MODEL_TIMEOUT" => ErrorCode::ModelTimeout,
            "EXTERNAL_TOOL_NOT_FOUND" => ErrorCode::ExternalToolNotFound,
            "AUTH_REQUIRED" => ErrorCode::AuthRequired,
            "MODEL_NOT_FOUND" => ErrorCode::ModelNotFound,
            "MODEL_RATE_LIMIT" => ErrorCode::ModelRateLimit,
            "MODEL_EXEC_FAILED" => ErrorCode::ModelExecFailed,
            "EMPTY_OUTPUT" => ErrorCode::EmptyOutput,
            "NATIVE_BAD_RESPONSE" => ErrorCode::NativeBadResponse,
            "HOST_UNAVAILABLE" => ErrorCode::HostUnavailable,
            "BENCHMARK_FAILED" => ErrorCode::BenchmarkFailed,
            "UNKNOWN_TYPE" => ErrorCode::UnknownType,
            _ => ErrorCode::Unexpected,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorCode::from_code(&raw))
    }
}

/// A terminal failure: stable code plus a message safe to surface to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wrap an internal failure that has no dedicated code.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unexpected, message)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ModelTimeout).unwrap();
        assert_eq!(json, "\"MODEL_TIMEOUT\"");
        let json = serde_json::to_string(&ErrorCode::ExternalToolNotFound).unwrap();
        assert_eq!(json, "\"EXTERNAL_TOOL_NOT_FOUND\"");
    }

    #[test]
    fn serde_representation_matches_as_str() {
        for code in [
            ErrorCode::InvalidJson,
            ErrorCode::RateLimited,
            ErrorCode::ModelExecFailed,
            ErrorCode::BenchmarkFailed,
            ErrorCode::Unexpected,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }

    #[test]
    fn unknown_code_degrades_to_unexpected() {
        let code: ErrorCode = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(code, ErrorCode::Unexpected);
    }

    #[test]
    fn app_error_display_includes_code_and_message() {
        let err = AppError::new(ErrorCode::EmptyText, "Text is required for translation.");
        assert_eq!(
            err.to_string(),
            "EMPTY_TEXT: Text is required for translation."
        );
    }
}
