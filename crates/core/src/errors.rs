use thiserror::Error;

use crate::domain::document::WorkflowState;
use crate::gateway::GatewayError;
use crate::matrix::MatrixError;
use crate::workflow::WorkflowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid workflow transition from `{from}` to `{to}`")]
    InvalidWorkflowTransition { from: WorkflowState, to: WorkflowState },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("validation failure: {0}")]
    Validation(String),
    #[error("document is read-only: {0}")]
    ReadOnly(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable machine-readable class used in command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::Validation(_) => "validation",
            Self::ReadOnly(_) => "read_only",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Validation(error) => Self::Validation(error.to_string()),
            WorkflowError::Matrix(error) => Self::from(error),
            WorkflowError::Domain(error) => Self::Domain(error),
            WorkflowError::ReadOnly(notice) => Self::ReadOnly(notice.message()),
            WorkflowError::ActionInFlight => {
                Self::Validation("an action for this document is already in flight".to_string())
            }
            WorkflowError::ActionFailed { message, .. } => Self::Integration(message),
            WorkflowError::Gateway(error) => Self::from(error),
            WorkflowError::Decode(error) => Self::Integration(error.to_string()),
        }
    }
}

impl From<MatrixError> for ApplicationError {
    fn from(value: MatrixError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<GatewayError> for ApplicationError {
    fn from(value: GatewayError) -> Self {
        Self::Integration(value.to_string())
    }
}

/// What an operator sees: the failure detail plus fixed guidance for its kind.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check the selection and inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The procurement service is temporarily unavailable. Your selection was kept; please retry."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { message }
            | Self::ServiceUnavailable { message }
            | Self::Internal { message } => message,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest { message: error.to_string() },
            ApplicationError::Validation(message) | ApplicationError::ReadOnly(message) => {
                Self::BadRequest { message }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message }
            }
            ApplicationError::Configuration(message) => Self::Internal { message },
        }
    }
}
