pub mod aggregation;
pub mod audit;
pub mod config;
pub mod domain;
pub mod draft;
pub mod errors;
pub mod gateway;
pub mod matrix;
pub mod resolver;
pub mod selection;
pub mod workflow;

pub use aggregation::{
    aggregate_vendor_groups, saturating_total, saving_loss, AggregationPolicy, VendorGroup, VendorItemView,
    DEFAULT_TARGET_DISCOUNT_FACTOR,
};
pub use domain::document::{
    DocumentId, DocumentKind, ItemId, ItemStatus, LineItem, ProcurementDocument, ProjectId,
    WorkflowState,
};
pub use domain::rfq::{ItemQuoteDetail, RfqData, VendorQuote};
pub use domain::target_rate::{ContributingQuote, TargetRateDetail, TargetRateMap};
pub use domain::vendor::{VendorId, VendorRef};
pub use draft::{DraftStore, DraftStoreError, InMemoryDraftStore};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use gateway::{
    ActionResponse, ApproveRequest, GatewayError, ProcurementGateway, SendBackRequest,
    SubmitRfqRequest, TargetRateRequest, TargetRateSource,
};
pub use matrix::{parse_quote_input, MatrixError, QuoteInputError, QuoteMatrix};
pub use resolver::{TargetRateKey, TargetRateResolution, TargetRateResolver};
pub use selection::{CheckboxState, SelectionError, SelectionState, SelectionSummary};
pub use workflow::{
    ActionOutcome, ActionRegistry, LoadingState, Navigation, ReadOnlyNotice, ReviewAction,
    ReviewServices, ReviewSession, ValidationError, WorkflowError,
};
