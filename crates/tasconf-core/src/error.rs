// ── Core error types ──
//
// Every failure here is scoped to one device. The reconciler turns it into
// the `Failed` outcome of that device's report; the driver moves on to the
// next device.

use serde::Serialize;
use thiserror::Error;

use crate::correlator::ResponseError;
use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("subscribing to '{topic}' failed: {source}")]
    Subscription {
        topic: String,
        #[source]
        source: tasconf_api::Error,
    },

    #[error("querying '{setting}' failed: {source}")]
    Query {
        setting: String,
        #[source]
        source: tasconf_api::Error,
    },

    #[error("reading '{setting}' failed: {source}")]
    Extraction {
        setting: String,
        #[source]
        source: ResponseError,
    },

    #[error("applying changes failed: {source}")]
    Apply {
        #[source]
        source: tasconf_api::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

/// Coarse failure category, stable across releases for scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Subscription,
    Timeout,
    TypeMismatch,
    FieldNotFound,
    UnexpectedShape,
    Malformed,
    StreamClosed,
    Query,
    Apply,
    Cancelled,
}

impl CoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Subscription { .. } => FailureKind::Subscription,
            Self::Query { .. } => FailureKind::Query,
            Self::Apply { .. } => FailureKind::Apply,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Extraction { source, .. } => match source {
                ResponseError::Timeout { .. } => FailureKind::Timeout,
                ResponseError::StreamClosed => FailureKind::StreamClosed,
                ResponseError::Decode(e) => match e {
                    ExtractError::Malformed { .. } => FailureKind::Malformed,
                    ExtractError::FieldNotFound { .. } => FailureKind::FieldNotFound,
                    ExtractError::TypeMismatch { .. } => FailureKind::TypeMismatch,
                    ExtractError::UnexpectedShape { .. } => FailureKind::UnexpectedShape,
                },
            },
        }
    }
}
