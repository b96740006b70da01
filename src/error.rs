use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

use crate::model::ElementRole;
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Locator,
    Interaction,
    Workflow,
    Polling,
    Generic,
}

/// Numeric failure codes, grouped by range: 1xx locator/interaction,
/// 2xx workflow, 3xx polling, 9xx generic.
///
/// The numbers are part of the external contract; never renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    InputNotFound = 101,
    SubmitNotFound = 102,
    NewSessionNotFound = 103,

    DispatchFailed = 150,
    ValueNotCommitted = 151,
    TypingSessionActive = 152,

    InvalidMessage = 200,
    ResetFailed = 201,
    InjectionFailed = 202,
    CaptureFailed = 203,
    FallbackFailed = 204,

    MaxAttemptsReached = 300,

    Unknown = 900,
    InvalidConfig = 901,
    Cancelled = 902,
}

impl ErrorCode {
    const ALL: [ErrorCode; 15] = [
        ErrorCode::InputNotFound,
        ErrorCode::SubmitNotFound,
        ErrorCode::NewSessionNotFound,
        ErrorCode::DispatchFailed,
        ErrorCode::ValueNotCommitted,
        ErrorCode::TypingSessionActive,
        ErrorCode::InvalidMessage,
        ErrorCode::ResetFailed,
        ErrorCode::InjectionFailed,
        ErrorCode::CaptureFailed,
        ErrorCode::FallbackFailed,
        ErrorCode::MaxAttemptsReached,
        ErrorCode::Unknown,
        ErrorCode::InvalidConfig,
        ErrorCode::Cancelled,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<ErrorCode> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn category(self) -> ErrorCategory {
        match self.code() {
            100..=149 => ErrorCategory::Locator,
            150..=199 => ErrorCategory::Interaction,
            200..=299 => ErrorCategory::Workflow,
            300..=399 => ErrorCategory::Polling,
            _ => ErrorCategory::Generic,
        }
    }

    /// Locator code for a missing mandatory element.
    pub fn missing(role: ElementRole) -> ErrorCode {
        match role {
            ElementRole::Input => ErrorCode::InputNotFound,
            ElementRole::Submit => ErrorCode::SubmitNotFound,
            ElementRole::NewSession => ErrorCode::NewSessionNotFound,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{} {:?}", self.code(), self)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u16::deserialize(deserializer)?;
        ErrorCode::from_code(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code {raw}")))
    }
}

/// Diagnostics attached to every raised error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub selector: Option<String>,
    pub location: Option<String>,
    pub timestamp_ms: u64,
    /// Quick existence checks of the mandatory elements at raise time.
    pub element_checks: Vec<(ElementRole, bool)>,
}

impl ErrorContext {
    pub fn now() -> Self {
        Self {
            timestamp_ms: unix_millis(),
            ..Default::default()
        }
    }

    pub async fn capture(surface: &dyn Surface, selector: Option<&str>) -> Self {
        let mut element_checks = Vec::with_capacity(ElementRole::MANDATORY.len());
        for role in ElementRole::MANDATORY {
            element_checks.push((role, surface.locate(role).await.is_some()));
        }
        Self {
            selector: selector.map(str::to_string),
            location: Some(surface.location()),
            timestamp_ms: unix_millis(),
            element_checks,
        }
    }

    fn missing_roles(&self) -> Vec<&'static str> {
        self.element_checks
            .iter()
            .filter(|(_, present)| !present)
            .map(|(role, _)| role.as_str())
            .collect()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().try_into().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[derive(Debug, Error)]
#[error("{operation} failed ({code}): {message}")]
pub struct SimError {
    pub operation: &'static str,
    pub code: ErrorCode,
    pub message: String,
    pub context: ErrorContext,
}

impl SimError {
    /// Error without surface diagnostics (cancellation, configuration).
    pub fn bare(operation: &'static str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            operation,
            code,
            message: message.into(),
            context: ErrorContext::now(),
        }
    }

    pub fn cancelled(operation: &'static str) -> Self {
        Self::bare(operation, ErrorCode::Cancelled, "cancelled by caller")
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl From<anyhow::Error> for SimError {
    fn from(err: anyhow::Error) -> Self {
        Self::bare("unknown", ErrorCode::Unknown, format!("{err:#}"))
    }
}

pub type SimResult<T> = std::result::Result<T, SimError>;

/// Builds a `SimError` with full context, logs it, and hands it back to be
/// propagated. Never swallows.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    enabled: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Reporter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub async fn raise(
        &self,
        surface: &dyn Surface,
        operation: &'static str,
        code: ErrorCode,
        message: impl Into<String>,
        selector: Option<&str>,
    ) -> SimError {
        let context = ErrorContext::capture(surface, selector).await;
        let err = SimError {
            operation,
            code,
            message: message.into(),
            context,
        };
        self.log(&err);
        err
    }

    pub fn log(&self, err: &SimError) {
        if !self.enabled {
            return;
        }
        warn!(
            operation = err.operation,
            code = err.code.code(),
            selector = err.context.selector.as_deref().unwrap_or("-"),
            location = err.context.location.as_deref().unwrap_or("-"),
            missing = ?err.context.missing_roles(),
            "{}",
            err.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_numeric_ranges() {
        assert_eq!(ErrorCode::SubmitNotFound.category(), ErrorCategory::Locator);
        assert_eq!(
            ErrorCode::ValueNotCommitted.category(),
            ErrorCategory::Interaction
        );
        assert_eq!(ErrorCode::InjectionFailed.category(), ErrorCategory::Workflow);
        assert_eq!(
            ErrorCode::MaxAttemptsReached.category(),
            ErrorCategory::Polling
        );
        assert_eq!(ErrorCode::Cancelled.category(), ErrorCategory::Generic);
    }

    #[test]
    fn serializes_as_numeric_code() {
        let json = serde_json::to_string(&ErrorCode::MaxAttemptsReached).unwrap();
        assert_eq!(json, "300");
        let back: ErrorCode = serde_json::from_str("103").unwrap();
        assert_eq!(back, ErrorCode::NewSessionNotFound);
        assert!(serde_json::from_str::<ErrorCode>("999").is_err());
    }

    #[test]
    fn display_includes_code() {
        let err = SimError::bare("poll", ErrorCode::MaxAttemptsReached, "no response");
        assert_eq!(
            err.to_string(),
            "poll failed (E300 MaxAttemptsReached): no response"
        );
    }
}
