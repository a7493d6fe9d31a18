use std::sync::Arc;
use std::{
    env::VarError, io::Error as IO_ERROR, num::ParseIntError,
    str::ParseBoolError as PARSE_BOOL_ERROR,
};

use bigdecimal::ParseBigDecimalError as BIG_DECIMAL_ERROR;
use serde_json::Error as JSON_ERROR;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::Error as WS_ERROR;
use tracing::subscriber::SetGlobalDefaultError as TRACING_GLOBAL_DEFAULT_ERROR;
use url::ParseError as URL_ERROR;

use crate::model::{MetricField, RecordKind};

/// Failures of a single round trip to the analytics API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("upstream responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("undecodable response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return TransportError::Timeout;
        }

        if let Some(status) = error.status() {
            return TransportError::HttpStatus(status.as_u16());
        }

        if error.is_decode() || error.is_body() {
            return TransportError::Body(error.to_string());
        }

        TransportError::ConnectionFailed(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] IO_ERROR),

    #[error("{0}")]
    URL(#[from] URL_ERROR),

    #[error("{0}")]
    INT(#[from] ParseIntError),

    #[error("{0}")]
    VAR(#[from] VarError),

    #[error("{0}")]
    ParseBoolError(#[from] PARSE_BOOL_ERROR),

    #[error("{0}")]
    TokioJoinError(#[from] JoinError),

    #[error("{0}")]
    BigDecimalError(#[from] BIG_DECIMAL_ERROR),

    #[error("{0}")]
    JsonError(#[from] JSON_ERROR),

    #[error("{0}")]
    WS(#[from] WS_ERROR),

    #[error("Tracing error: {0}")]
    SetGlobalDefaultError(#[from] TRACING_GLOBAL_DEFAULT_ERROR),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid bucket spec: {0}")]
    InvalidBucketSpec(String),

    #[error("Metric {metric:?} is not defined for {kind:?} records")]
    UnsupportedMetric { metric: MetricField, kind: RecordKind },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Fetch for {0} ended without a result")]
    FetchAbandoned(String),

    #[error("{0}")]
    Shared(Arc<Error>),
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Unwraps errors fanned out to several single-flight waiters.
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(inner) => inner.root(),
            other => other,
        }
    }
}
