use covenant_blocks::BlocksError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// External collaborator that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Drafter,
    Store,
    Mailer,
    Pdf,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Drafter => "drafter",
            Self::Store => "store",
            Self::Mailer => "mailer",
            Self::Pdf => "pdf renderer",
        })
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Blocks(#[from] BlocksError),

    /// Drafter answer could not be parsed into the document schema
    #[error("Generation contract violation: {0}")]
    MalformedDraft(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Contract not found: {0}")]
    NotFound(String),

    #[error("Contract {id} changed concurrently (expected version {expected:?}, found {actual:?})")]
    VersionConflict {
        id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("Contract {0} has a mutation in flight")]
    MutationInFlight(String),

    #[error("Not allowed on contract {id}: {reason}")]
    Forbidden { id: String, reason: String },

    #[error("{service} transport error: {message}")]
    Transport {
        service: Collaborator,
        message: String,
    },

    #[error("{service} timed out")]
    Timeout { service: Collaborator },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    pub fn transport(service: Collaborator, message: impl Into<String>) -> Self {
        Self::Transport {
            service,
            message: message.into(),
        }
    }

    pub fn forbidden(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Forbidden {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Stable snake_case code for the wire envelope
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Blocks(inner) => inner.code(),
            Self::MalformedDraft(_) => "generation_contract_violation",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::MutationInFlight(_) => "mutation_in_flight",
            Self::Forbidden { .. } => "forbidden",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "invalid_config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether the caller may simply try again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Blocks(BlocksError::GenerationContractViolation { .. })
                | Self::MalformedDraft(_)
                | Self::VersionConflict { .. }
                | Self::MutationInFlight(_)
                | Self::Transport { .. }
                | Self::Timeout { .. }
        )
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                service: Collaborator::Drafter,
            }
        } else {
            Self::transport(Collaborator::Drafter, err.to_string())
        }
    }
}
