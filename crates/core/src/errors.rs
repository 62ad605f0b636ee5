use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::capability::CapabilityResponse;

/// Error taxonomy carried across the dispatcher/worker boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthRequired,
    AmbiguousEntity,
    EntityNotFound,
    MissingField,
    QuotaExceeded,
    RoutingFailure,
    Timeout,
    ExternalActionFailed,
    WorkerUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AmbiguousEntity => "AMBIGUOUS_ENTITY",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::MissingField => "MISSING_FIELD",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::RoutingFailure => "ROUTING_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::ExternalActionFailed => "EXTERNAL_ACTION_FAILED",
            Self::WorkerUnavailable => "WORKER_UNAVAILABLE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::WorkerUnavailable)
    }

    /// Kinds that are answered with a clarification prompt instead of a
    /// terminal failure.
    pub fn is_clarification(&self) -> bool {
        matches!(self, Self::AmbiguousEntity | Self::EntityNotFound | Self::MissingField)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthRequired => "That service needs to be connected before I can use it.",
            Self::AmbiguousEntity => "More than one person matches that name.",
            Self::EntityNotFound => "I couldn't find anyone matching that name.",
            Self::MissingField => "I need a bit more information to do that.",
            Self::QuotaExceeded => "You've hit the action limit for now.",
            Self::RoutingFailure => "I wasn't sure which service should handle that.",
            Self::Timeout => "The service took too long to respond. Please try again.",
            Self::ExternalActionFailed => "The service reported an error.",
            Self::WorkerUnavailable => "That service is not running right now. Please retry shortly.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("agent transport failure: {0}")]
    Transport(String),
    #[error("directory unavailable: {0}")]
    Directory(String),
}

impl ApplicationError {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Integration(_) | Self::Directory(_) | Self::Configuration(_) => {
                ErrorKind::ExternalActionFailed
            }
            Self::Transport(_) => ErrorKind::WorkerUnavailable,
        }
    }

    /// Folds the error into a failed worker response so it never crosses an
    /// agent boundary as a panic or an `Err`.
    pub fn into_response(self) -> CapabilityResponse {
        let kind = self.error_kind();
        CapabilityResponse::failed(kind, self.to_string())
    }
}
