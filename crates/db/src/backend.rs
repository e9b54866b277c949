//! SQLite-backed procurement backend.
//!
//! Implements the same gateway traits as the HTTP client so a review session can run
//! entirely against the local database. Every action runs in one transaction; a refused
//! action rolls back and leaves the document untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use procura_core::domain::document::{
    DocumentId, DocumentKind, ItemId, ItemStatus, ProcurementDocument, WorkflowState,
};
use procura_core::domain::rfq::RfqData;
use procura_core::domain::vendor::VendorId;
use procura_core::gateway::{
    decode_document, ActionResponse, ApproveRequest, ContributingQuoteRecord, GatewayError,
    ProcurementGateway, RawDocument, SendBackRequest, SubmitRfqRequest, TargetRateRecord,
    TargetRateRequest, TargetRateSource,
};

use crate::repositories::document::{count_derived_from, fetch_raw, record_origin, upsert};
use crate::repositories::draft::{delete_draft, fetch_draft};
use crate::repositories::history::insert_quotation;
use crate::repositories::purchase_order::{insert_purchase_order, next_purchase_order_id};
use crate::repositories::{
    ApprovedQuotation, PurchaseOrder, PurchaseOrderLine, QuotationHistoryRepository,
    RepositoryError, SqlQuotationHistoryRepository,
};
use crate::DbPool;

pub const DEFAULT_HISTORY_WINDOW: u32 = 5;

pub struct LocalProcurementBackend {
    pool: DbPool,
    history: SqlQuotationHistoryRepository,
    history_window: u32,
    actor: Option<String>,
}

enum ActionError {
    Refused(ActionResponse),
    Gateway(GatewayError),
}

impl From<RepositoryError> for ActionError {
    fn from(error: RepositoryError) -> Self {
        Self::Gateway(unavailable(error))
    }
}

fn unavailable(error: impl Display) -> GatewayError {
    GatewayError::Unavailable(error.to_string())
}

fn refused(status: u16, message: impl Into<String>) -> ActionError {
    ActionError::Refused(ActionResponse::failed(status, message))
}

impl LocalProcurementBackend {
    pub fn new(pool: DbPool) -> Self {
        Self {
            history: SqlQuotationHistoryRepository::new(pool.clone()),
            pool,
            history_window: DEFAULT_HISTORY_WINDOW,
            actor: None,
        }
    }

    /// Number of recent approved quotes averaged into an item's target rate.
    pub fn with_history_window(mut self, window: u32) -> Self {
        self.history_window = window.max(1);
        self
    }

    /// Recorded as `modified_by` on documents this backend changes.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    async fn load_actionable(
        &self,
        conn: &mut SqliteConnection,
        id: &DocumentId,
    ) -> Result<ProcurementDocument, ActionError> {
        let raw = fetch_raw(&mut *conn, id)
            .await?
            .ok_or_else(|| ActionError::Gateway(GatewayError::NotFound(id.clone())))?;
        let document = decode_document(raw).map_err(|error| refused(422, error.to_string()))?;

        if !document.workflow_state.accepts_review_actions() {
            return Err(refused(
                409,
                format!("{} is {}; review actions are closed", document.id, document.workflow_state),
            ));
        }
        Ok(document)
    }

    /// The RFQ the reviewer is working from: the stored draft when it has content.
    async fn working_rfq(&self, conn: &mut SqliteConnection, document: &ProcurementDocument) -> RfqData {
        let known: BTreeSet<ItemId> = document.items.iter().map(|item| item.item_id.clone()).collect();
        match fetch_draft(&mut *conn, &document.id).await {
            Ok(Some(draft)) if !draft.is_empty() => draft.sanitized(&known),
            Ok(_) => document.rfq.clone(),
            Err(error) => {
                warn!(
                    event_name = "backend.draft.unreadable",
                    document_id = %document.id,
                    error = %error,
                    "ignoring unreadable draft"
                );
                document.rfq.clone()
            }
        }
    }

    fn settle(&self, document: &mut ProcurementDocument, next: WorkflowState) -> Result<(), ActionError> {
        document.transition_to(next).map_err(|error| refused(409, error.to_string()))?;
        if let Some(actor) = &self.actor {
            document.modified_by = Some(actor.clone());
        }
        Ok(())
    }

    async fn apply_approval(
        &self,
        conn: &mut SqliteConnection,
        request: &ApproveRequest,
    ) -> Result<String, ActionError> {
        if request.selected_items.is_empty() {
            return Err(refused(400, "no items were selected for approval"));
        }

        let mut document = self.load_actionable(conn, &request.document_id).await?;
        let rfq = self.working_rfq(conn, &document).await;

        let mut lines_by_vendor: BTreeMap<VendorId, Vec<PurchaseOrderLine>> = BTreeMap::new();
        for item_id in &request.selected_items {
            let Some(vendor_id) = request.selected_vendors.get(item_id) else {
                return Err(refused(422, format!("no vendor was chosen for item {item_id}")));
            };
            let Some(item) = document.item_mut(item_id) else {
                return Err(refused(404, format!("item {item_id} is not on the document")));
            };
            if !item.is_pending() {
                return Err(refused(
                    409,
                    format!("item {item_id} is already {}", item.status.as_str()),
                ));
            }
            if !rfq.has_vendor(vendor_id) {
                return Err(refused(422, format!("vendor {vendor_id} is not on the RFQ")));
            }
            let entry = rfq.entry(item_id, vendor_id);
            let Some(quote) = entry.and_then(|entry| entry.quote).filter(|quote| *quote > Decimal::ZERO)
            else {
                return Err(refused(
                    422,
                    format!("vendor {vendor_id} has not quoted item {item_id}"),
                ));
            };
            let make = entry.and_then(|entry| entry.make.clone());

            item.status = ItemStatus::Approved;
            item.vendor = Some(vendor_id.clone());
            item.quote = Some(quote);
            item.make = make.clone();

            lines_by_vendor.entry(vendor_id.clone()).or_default().push(PurchaseOrderLine {
                item_id: item_id.clone(),
                item_name: item.name.clone(),
                quantity: item.quantity,
                unit: item.unit.clone(),
                quote,
                make,
            });
        }

        let now = Utc::now();
        let mut order_ids = Vec::with_capacity(lines_by_vendor.len());
        for (vendor_id, lines) in lines_by_vendor {
            let vendor_name = rfq
                .vendor(&vendor_id)
                .map(|vendor| vendor.display_name().to_string())
                .unwrap_or_else(|| vendor_id.0.clone());
            let order = PurchaseOrder {
                id: next_purchase_order_id(conn).await?,
                document_id: document.id.clone(),
                project_id: document.project_id.clone(),
                vendor_id,
                vendor_name,
                lines,
                created_by: self.actor.clone(),
                created_at: now,
            };
            insert_purchase_order(conn, &order).await?;
            record_history(conn, &order, now).await?;
            order_ids.push(order.id);
        }

        document.rfq = rfq;
        let next = document.settled_state();
        self.settle(&mut document, next)?;
        upsert(&mut *conn, &document).await?;

        Ok(format!(
            "approved {} item(s); raised {}",
            request.selected_items.len(),
            order_ids.join(", ")
        ))
    }

    async fn apply_send_back(
        &self,
        conn: &mut SqliteConnection,
        request: &SendBackRequest,
    ) -> Result<String, ActionError> {
        let mut document = self.load_actionable(conn, request.document_id()).await?;

        match request {
            SendBackRequest::Items { selected_items, comment, .. } => {
                if document.is_custom() {
                    return Err(refused(409, "custom documents are sent back as a whole"));
                }
                if selected_items.is_empty() {
                    return Err(refused(400, "no items were selected to send back"));
                }

                let rfq = self.working_rfq(conn, &document).await;
                let mut returned = Vec::with_capacity(selected_items.len());
                for item_id in selected_items {
                    let Some(item) = document.item_mut(item_id) else {
                        return Err(refused(404, format!("item {item_id} is not on the document")));
                    };
                    if !item.is_pending() {
                        return Err(refused(
                            409,
                            format!("item {item_id} is already {}", item.status.as_str()),
                        ));
                    }
                    item.status = ItemStatus::Rejected;

                    let mut reopened = item.clone();
                    reopened.status = ItemStatus::Pending;
                    reopened.vendor = None;
                    reopened.quote = None;
                    reopened.make = None;
                    returned.push(reopened);
                }

                let sequence = count_derived_from(&mut *conn, &document.id).await? + 1;
                let returned_ids: BTreeSet<ItemId> =
                    returned.iter().map(|item| item.item_id.clone()).collect();
                let sent_back = ProcurementDocument {
                    id: DocumentId(format!("{}-SB{sequence}", document.id)),
                    project_id: document.project_id.clone(),
                    kind: DocumentKind::SentBack,
                    category: document.category.clone(),
                    workflow_state: WorkflowState::Pending,
                    items: returned,
                    rfq: rfq.sanitized(&returned_ids),
                    modified_by: self.actor.clone(),
                };

                let next = document.settled_state();
                self.settle(&mut document, next)?;
                upsert(&mut *conn, &document).await?;
                upsert(&mut *conn, &sent_back).await?;
                record_origin(&mut *conn, &sent_back.id, Some(&document.id), comment.as_deref())
                    .await?;

                Ok(format!("sent back {} item(s) as {}", returned_ids.len(), sent_back.id))
            }
            SendBackRequest::Document { comment, .. } => {
                if !document.is_custom() {
                    return Err(refused(409, "category documents are sent back item by item"));
                }
                for item in document.items.iter_mut().filter(|item| item.is_pending()) {
                    item.status = ItemStatus::Rejected;
                }

                self.settle(&mut document, WorkflowState::Rejected)?;
                upsert(&mut *conn, &document).await?;
                record_origin(&mut *conn, &document.id, None, comment.as_deref()).await?;

                Ok(format!("{} sent back", document.id))
            }
        }
    }

    async fn apply_submission(
        &self,
        conn: &mut SqliteConnection,
        request: &SubmitRfqRequest,
    ) -> Result<String, ActionError> {
        let id = &request.document_id;
        let raw = fetch_raw(&mut *conn, id)
            .await?
            .ok_or_else(|| ActionError::Gateway(GatewayError::NotFound(id.clone())))?;
        let mut document = decode_document(raw).map_err(|error| refused(422, error.to_string()))?;
        if document.workflow_state.rfq_submission_path().is_none() {
            return Err(refused(
                409,
                format!(
                    "{} is {}; its RFQ can no longer be submitted",
                    document.id, document.workflow_state
                ),
            ));
        }

        let known: BTreeSet<ItemId> = document.items.iter().map(|item| item.item_id.clone()).collect();
        let pending = document
            .submit_rfq(request.rfq_data.sanitized(&known))
            .map_err(|error| refused(422, error.to_string()))?;
        if let Some(actor) = &self.actor {
            document.modified_by = Some(actor.clone());
        }
        upsert(&mut *conn, &document).await?;
        delete_draft(&mut *conn, &document.id)
            .await
            .map_err(|error| ActionError::Gateway(unavailable(error)))?;

        Ok(format!("{} is up for approval with {pending} pending item(s)", document.id))
    }

    async fn run_action(
        &self,
        action: &'static str,
        document_id: &DocumentId,
        outcome: Result<String, ActionError>,
        tx: sqlx::Transaction<'_, sqlx::Sqlite>,
    ) -> Result<ActionResponse, GatewayError> {
        match outcome {
            Ok(message) => {
                tx.commit().await.map_err(unavailable)?;
                info!(
                    event_name = "backend.action.applied",
                    action,
                    document_id = %document_id,
                    message = %message,
                    "procurement action applied"
                );
                Ok(ActionResponse::ok(message))
            }
            Err(ActionError::Refused(response)) => {
                warn!(
                    event_name = "backend.action.refused",
                    action,
                    document_id = %document_id,
                    status = response.status,
                    error = %response.failure_message(),
                    "procurement action refused"
                );
                Ok(response)
            }
            Err(ActionError::Gateway(error)) => Err(error),
        }
    }
}

async fn record_history(
    conn: &mut SqliteConnection,
    order: &PurchaseOrder,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    for line in &order.lines {
        let quotation = ApprovedQuotation {
            id: Uuid::new_v4().to_string(),
            item_id: line.item_id.clone(),
            vendor_id: order.vendor_id.clone(),
            vendor_name: order.vendor_name.clone(),
            purchase_order_id: Some(order.id.clone()),
            quantity: line.quantity,
            unit: line.unit.clone(),
            quote: line.quote,
            created_at: at,
        };
        insert_quotation(&mut *conn, &quotation).await?;
    }
    Ok(())
}

/// Mean of the positive quotes, to two decimal places.
fn mean_quote(history: &[ApprovedQuotation]) -> Option<Decimal> {
    let quotes: Vec<Decimal> =
        history.iter().map(|quotation| quotation.quote).filter(|quote| *quote > Decimal::ZERO).collect();
    if quotes.is_empty() {
        return None;
    }
    let total = quotes.iter().try_fold(Decimal::ZERO, |total, quote| total.checked_add(*quote))?;
    total.checked_div(Decimal::from(quotes.len())).map(|mean| mean.round_dp(2))
}

fn target_rate_record(item_id: &ItemId, history: &[ApprovedQuotation]) -> TargetRateRecord {
    TargetRateRecord {
        item_id: item_id.0.clone(),
        rate: mean_quote(history).map(|rate| Value::String(rate.to_string())).unwrap_or(Value::Null),
        selected_quotations_items: history
            .iter()
            .map(|quotation| ContributingQuoteRecord {
                vendor: Some(quotation.vendor_name.clone()),
                purchase_order: quotation.purchase_order_id.clone(),
                quantity: Value::String(quotation.quantity.to_string()),
                unit: Some(quotation.unit.clone()),
                quote: Value::String(quotation.quote.to_string()),
                created_at: Some(quotation.created_at.to_rfc3339()),
            })
            .collect(),
    }
}

#[async_trait]
impl ProcurementGateway for LocalProcurementBackend {
    async fn fetch_document(&self, id: &DocumentId) -> Result<RawDocument, GatewayError> {
        fetch_raw(&self.pool, id)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| GatewayError::NotFound(id.clone()))
    }

    async fn approve(&self, request: ApproveRequest) -> Result<ActionResponse, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let outcome = self.apply_approval(&mut tx, &request).await;
        self.run_action("approve", &request.document_id, outcome, tx).await
    }

    async fn send_back(&self, request: SendBackRequest) -> Result<ActionResponse, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let outcome = self.apply_send_back(&mut tx, &request).await;
        self.run_action("send_back", request.document_id(), outcome, tx).await
    }

    async fn submit_rfq(&self, request: SubmitRfqRequest) -> Result<ActionResponse, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let outcome = self.apply_submission(&mut tx, &request).await;
        self.run_action("submit_rfq", &request.document_id, outcome, tx).await
    }
}

#[async_trait]
impl TargetRateSource for LocalProcurementBackend {
    async fn fetch_target_rates(
        &self,
        request: &TargetRateRequest,
    ) -> Result<Vec<TargetRateRecord>, GatewayError> {
        let item_ids: BTreeSet<&ItemId> = request.item_ids.iter().collect();
        let mut records = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let history = self
                .history
                .recent_for_item(item_id, self.history_window)
                .await
                .map_err(unavailable)?;
            records.push(target_rate_record(item_id, &history));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use procura_core::domain::document::{
        DocumentId, DocumentKind, ItemId, ItemStatus, WorkflowState,
    };
    use procura_core::domain::rfq::RfqData;
    use procura_core::domain::vendor::VendorId;
    use procura_core::draft::DraftStore;
    use procura_core::gateway::{
        decode_target_rates, ApproveRequest, GatewayError, ProcurementGateway, SendBackRequest,
        SubmitRfqRequest, TargetRateRequest, TargetRateSource,
    };
    use rust_decimal::Decimal;
    use sqlx::Row;

    use super::LocalProcurementBackend;
    use crate::fixtures::{DemoDataset, DEMO_CATEGORY_DOCUMENT_ID, DEMO_CUSTOM_DOCUMENT_ID};
    use crate::repositories::{
        DocumentRepository, PurchaseOrderRepository, QuotationHistoryRepository,
        SqlDocumentRepository, SqlDraftStore, SqlPurchaseOrderRepository,
        SqlQuotationHistoryRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seeded() -> (LocalProcurementBackend, DbPool) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDataset::load(&pool).await.expect("seed");
        (LocalProcurementBackend::new(pool.clone()).with_actor("approver@example.com"), pool)
    }

    fn id(value: &str) -> ItemId {
        ItemId(value.to_string())
    }

    fn category_id() -> DocumentId {
        DocumentId(DEMO_CATEGORY_DOCUMENT_ID.to_string())
    }

    fn approve_request(picks: &[(&str, &str)]) -> ApproveRequest {
        let selected_vendors: BTreeMap<ItemId, VendorId> = picks
            .iter()
            .map(|(item, vendor)| (id(item), VendorId((*vendor).to_string())))
            .collect();
        ApproveRequest {
            project_id: procura_core::ProjectId("PRJ-DEMO".to_string()),
            document_id: category_id(),
            selected_items: selected_vendors.keys().cloned().collect(),
            selected_vendors,
            custom: false,
        }
    }

    async fn load(pool: &DbPool, document_id: &DocumentId) -> procura_core::ProcurementDocument {
        SqlDocumentRepository::new(pool.clone())
            .find(document_id)
            .await
            .expect("find")
            .expect("document exists")
    }

    #[tokio::test]
    async fn partial_approval_raises_one_order_per_vendor() {
        let (backend, pool) = seeded().await;

        let response = backend
            .approve(approve_request(&[("CABLE-4SQMM", "V-BOLT"), ("MCB-32A", "V-CORE")]))
            .await
            .expect("approve");
        assert!(response.is_success(), "{response:?}");

        let document = load(&pool, &category_id()).await;
        assert_eq!(document.workflow_state, WorkflowState::PartiallyApproved);
        assert_eq!(document.modified_by.as_deref(), Some("approver@example.com"));
        let cable = document.item(&id("CABLE-4SQMM")).expect("cable");
        assert_eq!(cable.status, ItemStatus::Approved);
        assert_eq!(cable.vendor, Some(VendorId("V-BOLT".to_string())));
        assert_eq!(cable.quote, Some(Decimal::new(4550, 2)));
        assert_eq!(cable.make.as_deref(), Some("Havells"));
        assert_eq!(document.item(&id("DB-8WAY")).expect("db").status, ItemStatus::Pending);

        let orders = SqlPurchaseOrderRepository::new(pool.clone())
            .list_for_document(&category_id())
            .await
            .expect("orders");
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, "PO-00001");
        assert_eq!(orders[0].vendor_name, "Bolt Traders");
        assert_eq!(orders[0].total_amount(), Decimal::new(4550, 0));
        assert_eq!(orders[1].vendor_id, VendorId("V-CORE".to_string()));

        let history = SqlQuotationHistoryRepository::new(pool)
            .recent_for_item(&id("CABLE-4SQMM"), 1)
            .await
            .expect("history");
        assert_eq!(history[0].quote, Decimal::new(4550, 2));
        assert_eq!(history[0].purchase_order_id.as_deref(), Some("PO-00001"));
    }

    #[tokio::test]
    async fn approving_the_last_pending_items_settles_the_document() {
        let (backend, pool) = seeded().await;
        backend.approve(approve_request(&[("CABLE-4SQMM", "V-BOLT")])).await.expect("first");
        let response = backend
            .approve(approve_request(&[("MCB-32A", "V-ACME"), ("DB-8WAY", "V-BOLT")]))
            .await
            .expect("second");
        assert!(response.is_success());

        let document = load(&pool, &category_id()).await;
        assert_eq!(document.workflow_state, WorkflowState::Approved);
        assert_eq!(document.pending_count(), 0);

        let closed = backend
            .approve(approve_request(&[("MCB-32A", "V-ACME")]))
            .await
            .expect("approve on closed document");
        assert_eq!(closed.status, 409);
    }

    #[tokio::test]
    async fn refused_approval_rolls_back_every_change() {
        let (backend, pool) = seeded().await;
        backend.approve(approve_request(&[("CABLE-4SQMM", "V-BOLT")])).await.expect("first");

        let response = backend
            .approve(approve_request(&[("CABLE-4SQMM", "V-ACME"), ("DB-8WAY", "V-BOLT")]))
            .await
            .expect("second");
        assert_eq!(response.status, 409);
        assert!(response.failure_message().contains("CABLE-4SQMM"));

        let document = load(&pool, &category_id()).await;
        assert_eq!(document.item(&id("DB-8WAY")).expect("db").status, ItemStatus::Pending);
        let orders = SqlPurchaseOrderRepository::new(pool)
            .list_for_document(&category_id())
            .await
            .expect("orders");
        assert_eq!(orders.len(), 1);
    }

    #[tokio::test]
    async fn approval_without_a_quote_is_refused() {
        let (backend, _pool) = seeded().await;
        let response =
            backend.approve(approve_request(&[("MCB-32A", "V-BOLT")])).await.expect("approve");
        assert_eq!(response.status, 422);
        assert!(response.failure_message().contains("has not quoted"));
    }

    #[tokio::test]
    async fn approval_uses_the_working_draft_quotes() {
        let (backend, pool) = seeded().await;
        let document = load(&pool, &category_id()).await;
        let draft = document.rfq.with_quote(
            &id("CABLE-4SQMM"),
            &VendorId("V-ACME".to_string()),
            Some(Decimal::new(44, 0)),
        );
        SqlDraftStore::new(pool.clone()).save(&category_id(), &draft).await.expect("save draft");

        let response = backend
            .approve(approve_request(&[("CABLE-4SQMM", "V-ACME")]))
            .await
            .expect("approve");
        assert!(response.is_success());

        let document = load(&pool, &category_id()).await;
        assert_eq!(document.item(&id("CABLE-4SQMM")).expect("cable").quote, Some(Decimal::new(44, 0)));
        assert_eq!(
            document.rfq.quote_for(&id("CABLE-4SQMM"), &VendorId("V-ACME".to_string())),
            Some(Decimal::new(44, 0))
        );
    }

    #[tokio::test]
    async fn empty_draft_falls_back_to_the_stored_rfq() {
        let (backend, pool) = seeded().await;
        SqlDraftStore::new(pool.clone())
            .save(&category_id(), &RfqData::default())
            .await
            .expect("save empty draft");

        let response = backend
            .approve(approve_request(&[("CABLE-4SQMM", "V-BOLT")]))
            .await
            .expect("approve");
        assert!(response.is_success(), "{response:?}");

        let document = load(&pool, &category_id()).await;
        assert_eq!(document.item(&id("CABLE-4SQMM")).expect("cable").quote, Some(Decimal::new(4550, 2)));
        assert!(!document.rfq.is_empty());
    }

    #[tokio::test]
    async fn category_send_back_raises_a_sent_back_document() {
        let (backend, pool) = seeded().await;

        let response = backend
            .send_back(SendBackRequest::Items {
                document_id: category_id(),
                selected_items: vec![id("DB-8WAY")],
                comment: Some("re-quote with a local make".to_string()),
            })
            .await
            .expect("send back");
        assert!(response.is_success(), "{response:?}");

        let source = load(&pool, &category_id()).await;
        assert_eq!(source.item(&id("DB-8WAY")).expect("db").status, ItemStatus::Rejected);
        assert_eq!(source.workflow_state, WorkflowState::VendorSelected);

        let sent_back_id = DocumentId(format!("{DEMO_CATEGORY_DOCUMENT_ID}-SB1"));
        let sent_back = load(&pool, &sent_back_id).await;
        assert_eq!(sent_back.kind, DocumentKind::SentBack);
        assert_eq!(sent_back.workflow_state, WorkflowState::Pending);
        assert_eq!(sent_back.items.len(), 1);
        assert!(sent_back.items[0].is_pending());
        assert_eq!(
            sent_back.rfq.quote_for(&id("DB-8WAY"), &VendorId("V-CORE".to_string())),
            Some(Decimal::new(2600, 0))
        );

        let row = sqlx::query(
            "SELECT source_document_id, comment FROM procurement_document WHERE id = ?",
        )
        .bind(&sent_back_id.0)
        .fetch_one(&pool)
        .await
        .expect("origin row");
        assert_eq!(row.get::<String, _>("source_document_id"), DEMO_CATEGORY_DOCUMENT_ID);
        assert_eq!(row.get::<String, _>("comment"), "re-quote with a local make");
    }

    #[tokio::test]
    async fn submitted_sent_back_document_becomes_approvable() {
        let (backend, pool) = seeded().await;
        backend
            .send_back(SendBackRequest::Items {
                document_id: category_id(),
                selected_items: vec![id("DB-8WAY")],
                comment: None,
            })
            .await
            .expect("send back");
        let sent_back_id = DocumentId(format!("{DEMO_CATEGORY_DOCUMENT_ID}-SB1"));
        let sent_back = load(&pool, &sent_back_id).await;
        SqlDraftStore::new(pool.clone())
            .save(&sent_back_id, &sent_back.rfq)
            .await
            .expect("save draft");

        let submitted = backend
            .submit_rfq(SubmitRfqRequest {
                document_id: sent_back_id.clone(),
                rfq_data: sent_back.rfq.clone(),
            })
            .await
            .expect("submit");
        assert!(submitted.is_success(), "{submitted:?}");
        assert_eq!(load(&pool, &sent_back_id).await.workflow_state, WorkflowState::VendorSelected);
        assert_eq!(
            SqlDraftStore::new(pool.clone()).load(&sent_back_id).await.expect("draft"),
            None
        );

        let approved = backend
            .approve(ApproveRequest {
                project_id: sent_back.project_id.clone(),
                document_id: sent_back_id.clone(),
                selected_items: vec![id("DB-8WAY")],
                selected_vendors: BTreeMap::from([(id("DB-8WAY"), VendorId("V-CORE".to_string()))]),
                custom: false,
            })
            .await
            .expect("approve");
        assert!(approved.is_success(), "{approved:?}");
        assert_eq!(load(&pool, &sent_back_id).await.workflow_state, WorkflowState::Approved);
    }

    #[tokio::test]
    async fn submission_is_refused_once_approvals_start() {
        let (backend, pool) = seeded().await;
        backend.approve(approve_request(&[("CABLE-4SQMM", "V-BOLT")])).await.expect("approve");
        let document = load(&pool, &category_id()).await;

        let response = backend
            .submit_rfq(SubmitRfqRequest { document_id: category_id(), rfq_data: document.rfq.clone() })
            .await
            .expect("submit");
        assert_eq!(response.status, 409);
        assert!(response.failure_message().contains("can no longer be submitted"));
    }

    #[tokio::test]
    async fn custom_send_back_rejects_the_whole_document() {
        let (backend, pool) = seeded().await;
        let custom_id = DocumentId(DEMO_CUSTOM_DOCUMENT_ID.to_string());

        let response = backend
            .send_back(SendBackRequest::Document { document_id: custom_id.clone(), comment: None })
            .await
            .expect("send back");
        assert!(response.is_success());

        let document = load(&pool, &custom_id).await;
        assert_eq!(document.workflow_state, WorkflowState::Rejected);
        assert!(document.items.iter().all(|item| item.status == ItemStatus::Rejected));
    }

    #[tokio::test]
    async fn send_back_shape_must_match_the_document_kind() {
        let (backend, _pool) = seeded().await;

        let whole_category = backend
            .send_back(SendBackRequest::Document { document_id: category_id(), comment: None })
            .await
            .expect("send back");
        assert_eq!(whole_category.status, 409);

        let custom_items = backend
            .send_back(SendBackRequest::Items {
                document_id: DocumentId(DEMO_CUSTOM_DOCUMENT_ID.to_string()),
                selected_items: vec![id("SITE-SIGNAGE")],
                comment: None,
            })
            .await
            .expect("send back");
        assert_eq!(custom_items.status, 409);
    }

    #[tokio::test]
    async fn target_rate_is_the_mean_of_the_recent_window() {
        let (_, pool) = seeded().await;
        let backend = LocalProcurementBackend::new(pool).with_history_window(2);
        let requested = vec![id("CABLE-4SQMM"), id("MCB-32A"), id("DB-8WAY")];

        let records = backend
            .fetch_target_rates(&TargetRateRequest { item_ids: requested.clone() })
            .await
            .expect("target rates");
        let rates = decode_target_rates(records, &requested);

        assert_eq!(rates.rate_for(&id("CABLE-4SQMM")), Some(Decimal::new(48, 0)));
        assert_eq!(rates.rate_for(&id("MCB-32A")), Some(Decimal::new(310, 0)));
        assert_eq!(rates.rate_for(&id("DB-8WAY")), None);
        assert_eq!(rates.contributing_quotes(&id("CABLE-4SQMM")).len(), 2);
        assert_eq!(rates.contributing_quotes(&id("CABLE-4SQMM"))[0].vendor, "Acme Electricals");
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let (backend, _pool) = seeded().await;
        let missing = DocumentId("PR-MISSING".to_string());

        let error = backend.fetch_document(&missing).await.expect_err("missing");
        assert_eq!(error, GatewayError::NotFound(missing));
    }
}
