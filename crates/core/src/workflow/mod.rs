pub mod gate;
pub mod requests;
pub mod session;

use thiserror::Error;

use crate::errors::DomainError;
use crate::gateway::{DecodeError, GatewayError};
use crate::matrix::MatrixError;

pub use gate::{check_actionable, check_submittable, ReadOnlyNotice, ReadOnlyReason};
pub use requests::{
    build_approve_request, build_send_back_request, build_submit_rfq_request, ValidationError,
};
pub use session::{
    ActionOutcome, ActionRegistry, LoadingState, Navigation, ReviewAction, ReviewServices,
    ReviewSession,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{}", .0.message())]
    ReadOnly(ReadOnlyNotice),
    #[error("an approve or send-back for this document is already in flight")]
    ActionInFlight,
    #[error("action failed: {message}")]
    ActionFailed { status: Option<u16>, message: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
