use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use procura_core::aggregation::saturating_total;
use procura_core::domain::document::{DocumentId, ItemId, ProcurementDocument, ProjectId};
use procura_core::domain::vendor::VendorId;
use procura_core::gateway::RawDocument;

pub mod document;
pub mod draft;
pub mod history;
pub mod purchase_order;

pub use document::SqlDocumentRepository;
pub use draft::SqlDraftStore;
pub use history::SqlQuotationHistoryRepository;
pub use purchase_order::SqlPurchaseOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// An approved quote kept as history for target-rate calculation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovedQuotation {
    pub id: String,
    pub item_id: ItemId,
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub purchase_order_id: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub quote: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PurchaseOrderLine {
    pub item_id: ItemId,
    pub item_name: String,
    pub quantity: Decimal,
    pub unit: String,
    pub quote: Decimal,
    pub make: Option<String>,
}

impl PurchaseOrderLine {
    pub fn amount(&self) -> Decimal {
        self.quantity.saturating_mul(self.quote)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub document_id: DocumentId,
    pub project_id: ProjectId,
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub lines: Vec<PurchaseOrderLine>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn total_amount(&self) -> Decimal {
        saturating_total(self.lines.iter().map(PurchaseOrderLine::amount))
    }
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// The stored row in wire shape, with `order_list` and `rfq_data` as JSON text.
    async fn find_raw(&self, id: &DocumentId) -> Result<Option<RawDocument>, RepositoryError>;
    async fn find(&self, id: &DocumentId) -> Result<Option<ProcurementDocument>, RepositoryError>;
    async fn save(&self, document: &ProcurementDocument) -> Result<(), RepositoryError>;
    async fn list_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<ProcurementDocument>, RepositoryError>;
}

#[async_trait]
pub trait QuotationHistoryRepository: Send + Sync {
    async fn record(&self, quotations: &[ApprovedQuotation]) -> Result<(), RepositoryError>;
    /// Most recent first.
    async fn recent_for_item(
        &self,
        item_id: &ItemId,
        limit: u32,
    ) -> Result<Vec<ApprovedQuotation>, RepositoryError>;
}

#[async_trait]
pub trait PurchaseOrderRepository: Send + Sync {
    async fn save(&self, order: &PurchaseOrder) -> Result<(), RepositoryError>;
    async fn list_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<PurchaseOrder>, RepositoryError>;
}

pub(crate) fn parse_decimal(value: &str, column: &str) -> Result<Decimal, RepositoryError> {
    value
        .parse::<Decimal>()
        .map_err(|error| RepositoryError::Decode(format!("{column} `{value}`: {error}")))
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{value}`: {error}")))
}
