//! Configuration error types and reporting.
//!
//! Problems with a single config item never abort a build. They are pushed
//! into a [`ConfigErrorReporter`] and the offending item is skipped. Only
//! failures that make the whole snapshot untrustworthy surface as a
//! [`ConfigError`].

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

/// Error raised by a configuration repository.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RepositoryError {
    message: String,
}

impl RepositoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fatal failure of a build or apply.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {source_name} from repository: {error}")]
    Repository {
        source_name: &'static str,
        #[source]
        error: RepositoryError,
    },

    #[error("configuration apply was cancelled")]
    Cancelled,

    #[error("config manager is shut down")]
    ShutDown,
}

/// Codes for per-item configuration problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigErrorCode {
    DuplicateRouteId,
    RouteMissingMatch,
    InvalidHost,
    InvalidPath,
    InvalidMethod,
    DuplicateMethod,
    InvalidEndpointAddress,
    InvalidHealthCheckOptions,
}

impl ConfigErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigErrorCode::DuplicateRouteId => "duplicate route id",
            ConfigErrorCode::RouteMissingMatch => "route has no host or path",
            ConfigErrorCode::InvalidHost => "invalid route host",
            ConfigErrorCode::InvalidPath => "invalid route path",
            ConfigErrorCode::InvalidMethod => "invalid route method",
            ConfigErrorCode::DuplicateMethod => "duplicate route method",
            ConfigErrorCode::InvalidEndpointAddress => "invalid endpoint address",
            ConfigErrorCode::InvalidHealthCheckOptions => "invalid health check options",
        }
    }
}

impl fmt::Display for ConfigErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for non-fatal build and apply errors.
pub trait ConfigErrorReporter: Send + Sync {
    fn report_error(&self, code: ConfigErrorCode, item_id: &str, message: &str);
}

/// Reporter that emits every error as a `warn` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorReporter;

impl ConfigErrorReporter for LoggingErrorReporter {
    fn report_error(&self, code: ConfigErrorCode, item_id: &str, message: &str) {
        tracing::warn!(code = %code, item_id = %item_id, "Config error: {}", message);
    }
}

/// A single reported error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub code: ConfigErrorCode,
    pub item_id: String,
    pub message: String,
}

/// Reporter that keeps every error for later inspection. Errors are also
/// logged.
#[derive(Debug, Default)]
pub struct CollectingErrorReporter {
    errors: Mutex<Vec<ReportedError>>,
}

impl CollectingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all errors reported so far.
    pub fn errors(&self) -> Vec<ReportedError> {
        self.errors.lock().clone()
    }

    /// Number of errors reported with the given code.
    pub fn count(&self, code: ConfigErrorCode) -> usize {
        self.errors.lock().iter().filter(|e| e.code == code).count()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ConfigErrorReporter for CollectingErrorReporter {
    fn report_error(&self, code: ConfigErrorCode, item_id: &str, message: &str) {
        LoggingErrorReporter.report_error(code, item_id, message);
        self.errors.lock().push(ReportedError {
            code,
            item_id: item_id.to_string(),
            message: message.to_string(),
        });
    }
}
