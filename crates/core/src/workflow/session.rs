//! One approver working through one document: quote edits, derived vendor groups,
//! selection, and the approve/send-back round trip.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregation::{aggregate_vendor_groups, AggregationPolicy, VendorGroup};
use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::document::{DocumentId, ItemId, ProcurementDocument};
use crate::domain::rfq::RfqData;
use crate::domain::target_rate::TargetRateMap;
use crate::domain::vendor::{VendorId, VendorRef};
use crate::draft::DraftStore;
use crate::gateway::{decode_document, ActionResponse, GatewayError, ProcurementGateway, SendBackRequest};
use crate::matrix::QuoteMatrix;
use crate::resolver::{TargetRateResolution, TargetRateResolver};
use crate::selection::{summarize, CheckboxState, SelectionState, SelectionSummary};
use crate::workflow::gate::{check_actionable, check_submittable, ReadOnlyNotice};
use crate::workflow::requests::{
    build_approve_request, build_send_back_request, build_submit_rfq_request, ValidationError,
};
use crate::workflow::WorkflowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    SendBack,
    SubmitRfq,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::SendBack => "send_back",
            Self::SubmitRfq => "submit_rfq",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    /// Items remain pending; the review continues on the refreshed document.
    Stay,
    /// Nothing is left to decide on this document.
    Leave,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ReviewAction,
    pub processed: usize,
    pub pending_before: usize,
    pub remaining_pending: usize,
    pub navigation: Navigation,
    /// False when the action succeeded but the follow-up refetch did not.
    pub refreshed: bool,
    pub message: Option<String>,
}

/// Observable loading flags. Clones share state, so a caller can hold one while the
/// session works.
#[derive(Clone, Debug, Default)]
pub struct LoadingState {
    target_rates: Arc<AtomicBool>,
    action: Arc<AtomicBool>,
}

impl LoadingState {
    pub fn is_loading(&self) -> bool {
        self.is_resolving_target_rates() || self.is_submitting()
    }

    pub fn is_resolving_target_rates(&self) -> bool {
        self.target_rates.load(Ordering::SeqCst)
    }

    pub fn is_submitting(&self) -> bool {
        self.action.load(Ordering::SeqCst)
    }
}

struct FlagGuard(Arc<AtomicBool>);

impl FlagGuard {
    fn raise(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Arc::clone(flag))
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Documents with an approve or send-back outstanding, shared by every session in a
/// process.
#[derive(Clone, Debug, Default)]
pub struct ActionRegistry {
    in_flight: Arc<Mutex<HashSet<DocumentId>>>,
}

impl ActionRegistry {
    pub fn is_in_flight(&self, document_id: &DocumentId) -> bool {
        self.lock().contains(document_id)
    }

    fn begin(&self, document_id: &DocumentId, loading: &Arc<AtomicBool>) -> Option<ActionTicket> {
        if !self.lock().insert(document_id.clone()) {
            return None;
        }
        Some(ActionTicket {
            registry: self.clone(),
            document_id: document_id.clone(),
            _loading: FlagGuard::raise(loading),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<DocumentId>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

struct ActionTicket {
    registry: ActionRegistry,
    document_id: DocumentId,
    _loading: FlagGuard,
}

impl Drop for ActionTicket {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.document_id);
    }
}

#[derive(Clone)]
pub struct ReviewServices {
    pub gateway: Arc<dyn ProcurementGateway>,
    pub target_rates: Arc<TargetRateResolver>,
    pub drafts: Arc<dyn DraftStore>,
    pub audit: Arc<dyn AuditSink>,
    pub actions: ActionRegistry,
    pub policy: AggregationPolicy,
}

struct GroupMemo {
    matrix_version: u64,
    document_revision: u64,
    rates: Arc<TargetRateMap>,
    groups: Arc<Vec<VendorGroup>>,
}

pub struct ReviewSession {
    services: ReviewServices,
    audit: AuditContext,
    document: ProcurementDocument,
    document_revision: u64,
    matrix: QuoteMatrix,
    target_rates: TargetRateResolution,
    selection: SelectionState,
    dialog: Option<ReviewAction>,
    loading: LoadingState,
    memo: Mutex<Option<GroupMemo>>,
}

impl ReviewSession {
    pub async fn open(
        services: ReviewServices,
        document_id: &DocumentId,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        let audit = AuditContext::new(Some(document_id.clone()), correlation_id, actor);
        let document = fetch_document(services.gateway.as_ref(), document_id).await?;
        let matrix = QuoteMatrix::load(&document, Arc::clone(&services.drafts)).await;
        let loading = LoadingState::default();
        let target_rates = resolve_target_rates(&services.target_rates, &loading, &document).await;

        info!(
            event_name = "review.session.opened",
            document_id = %document.id,
            correlation_id = %audit.correlation_id,
            workflow_state = %document.workflow_state,
            pending = document.pending_count(),
            "review session opened"
        );

        Ok(Self {
            services,
            audit,
            document,
            document_revision: 0,
            matrix,
            target_rates,
            selection: SelectionState::default(),
            dialog: None,
            loading,
            memo: Mutex::new(None),
        })
    }

    pub fn document(&self) -> &ProcurementDocument {
        &self.document
    }

    pub fn rfq(&self) -> Arc<RfqData> {
        self.matrix.get()
    }

    pub fn matrix_version(&self) -> u64 {
        self.matrix.version()
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn target_rates(&self) -> &TargetRateResolution {
        &self.target_rates
    }

    pub fn target_rate_warning(&self) -> Option<&str> {
        self.target_rates.warning.as_deref()
    }

    pub fn loading(&self) -> LoadingState {
        self.loading.clone()
    }

    pub fn dialog(&self) -> Option<ReviewAction> {
        self.dialog
    }

    /// Present when approve and send-back are unavailable for the current document.
    pub fn read_only_notice(&self) -> Option<ReadOnlyNotice> {
        check_actionable(&self.document).err()
    }

    pub async fn set_vendors(&mut self, vendors: Vec<VendorRef>) {
        self.matrix.set_vendors(vendors).await;
        self.prune_selection();
    }

    pub async fn set_quote(
        &mut self,
        item_id: &ItemId,
        vendor_id: &VendorId,
        input: &str,
    ) -> Result<(), WorkflowError> {
        self.matrix.set_quote(item_id, vendor_id, input).await?;
        Ok(())
    }

    pub async fn set_make(
        &mut self,
        item_id: &ItemId,
        vendor_id: &VendorId,
        make: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.matrix.set_make(item_id, vendor_id, make).await?;
        Ok(())
    }

    /// Drops the vendor from the RFQ along with its quotes and any staged selection.
    pub async fn remove_vendor(&mut self, vendor_id: &VendorId) -> Result<(), WorkflowError> {
        self.matrix.remove_vendor(vendor_id).await?;
        self.selection = self.selection.without_vendor(vendor_id);
        Ok(())
    }

    /// Vendor groups for the current matrix, document and target rates. Recomputed only
    /// when one of them has changed.
    pub fn vendor_groups(&self) -> Arc<Vec<VendorGroup>> {
        let mut memo = match self.memo.lock() {
            Ok(memo) => memo,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cached) = memo.as_ref() {
            if cached.matrix_version == self.matrix.version()
                && cached.document_revision == self.document_revision
                && Arc::ptr_eq(&cached.rates, &self.target_rates.rates)
            {
                return Arc::clone(&cached.groups);
            }
        }

        let groups = Arc::new(aggregate_vendor_groups(
            &self.document.pending_items(),
            &self.matrix.get(),
            &self.target_rates.rates,
            &self.services.policy,
        ));
        *memo = Some(GroupMemo {
            matrix_version: self.matrix.version(),
            document_revision: self.document_revision,
            rates: Arc::clone(&self.target_rates.rates),
            groups: Arc::clone(&groups),
        });
        groups
    }

    pub fn vendor_group(&self, vendor_id: &VendorId) -> Option<VendorGroup> {
        self.vendor_groups().iter().find(|group| &group.vendor.id == vendor_id).cloned()
    }

    /// Selects or clears every item listed in the vendor's group.
    pub fn toggle_vendor(&mut self, vendor_id: &VendorId, checked: bool) {
        let item_ids =
            self.vendor_group(vendor_id).map(|group| group.item_ids()).unwrap_or_default();
        self.selection = self.selection.toggle_vendor(vendor_id, item_ids, checked);
    }

    pub fn toggle_item(
        &mut self,
        vendor_id: &VendorId,
        item_id: &ItemId,
        checked: bool,
    ) -> Result<(), WorkflowError> {
        if checked {
            match self.document.item(item_id) {
                None => return Err(ValidationError::UnknownItem(item_id.clone()).into()),
                Some(item) if !item.is_pending() => {
                    return Err(ValidationError::ItemNotPending {
                        item_id: item_id.clone(),
                        status: item.status,
                    }
                    .into())
                }
                Some(_) => {}
            }
            if !self.matrix.get().has_vendor(vendor_id) {
                return Err(ValidationError::VendorNotSelected(vendor_id.clone()).into());
            }
        }
        self.selection = self.selection.toggle_item(vendor_id, item_id, checked);
        Ok(())
    }

    pub fn vendor_checkbox_state(&self, vendor_id: &VendorId) -> CheckboxState {
        let total = self.vendor_group(vendor_id).map(|group| group.item_count()).unwrap_or(0);
        self.selection.vendor_checkbox_state(vendor_id, total)
    }

    pub fn selection_summary(&self) -> SelectionSummary {
        summarize(&self.selection, &self.vendor_groups())
    }

    pub fn clear_selection(&mut self) {
        self.selection = SelectionState::default();
    }

    /// Opens the confirmation dialog for an action. Refused while the document is
    /// read-only or another action is outstanding.
    pub fn open_dialog(&mut self, action: ReviewAction) -> Result<(), WorkflowError> {
        let allowed = match action {
            ReviewAction::SubmitRfq => check_submittable(&self.document),
            ReviewAction::Approve | ReviewAction::SendBack => check_actionable(&self.document),
        };
        allowed.map_err(WorkflowError::ReadOnly)?;
        if self.services.actions.is_in_flight(&self.document.id) {
            return Err(WorkflowError::ActionInFlight);
        }
        self.dialog = Some(action);
        Ok(())
    }

    pub fn close_dialog(&mut self) {
        self.dialog = None;
    }

    pub async fn approve(&mut self) -> Result<ActionOutcome, WorkflowError> {
        let action = ReviewAction::Approve;
        let rfq = self.matrix.get();
        let request = check_actionable(&self.document)
            .map_err(WorkflowError::ReadOnly)
            .and_then(|()| {
                build_approve_request(&self.document, &rfq, &self.selection).map_err(Into::into)
            });
        let request = match request {
            Ok(request) => request,
            Err(error) => return Err(self.record_rejection(action, error)),
        };

        let _ticket = self.begin_action(action)?;
        let processed = request.selected_items.len();
        info!(
            event_name = "review.approve.submitted",
            document_id = %self.document.id,
            correlation_id = %self.audit.correlation_id,
            items = processed,
            custom = request.custom,
            "submitting approval"
        );
        let result = self.services.gateway.approve(request).await;
        self.finish_action(action, processed, false, result).await
    }

    /// Custom documents are rejected whole; category documents send back the selected
    /// items only.
    pub async fn send_back(&mut self, comment: Option<String>) -> Result<ActionOutcome, WorkflowError> {
        let action = ReviewAction::SendBack;
        let request = check_actionable(&self.document)
            .map_err(WorkflowError::ReadOnly)
            .and_then(|()| {
                build_send_back_request(&self.document, &self.selection, comment)
                    .map_err(Into::into)
            });
        let request = match request {
            Ok(request) => request,
            Err(error) => return Err(self.record_rejection(action, error)),
        };

        let _ticket = self.begin_action(action)?;
        let (processed, whole_document) = match &request {
            SendBackRequest::Items { selected_items, .. } => (selected_items.len(), false),
            SendBackRequest::Document { .. } => (self.document.pending_count(), true),
        };
        info!(
            event_name = "review.send_back.submitted",
            document_id = %self.document.id,
            correlation_id = %self.audit.correlation_id,
            items = processed,
            whole_document,
            "submitting send-back"
        );
        let result = self.services.gateway.send_back(request).await;
        self.finish_action(action, processed, whole_document, result).await
    }

    /// Publishes the working RFQ and puts the document up for approval. Allowed until
    /// the first approval lands.
    pub async fn submit_rfq(&mut self) -> Result<ActionOutcome, WorkflowError> {
        let action = ReviewAction::SubmitRfq;
        let rfq = self.matrix.get();
        let prepared = check_submittable(&self.document)
            .map_err(WorkflowError::ReadOnly)
            .and_then(|()| build_submit_rfq_request(&self.document, &rfq).map_err(Into::into))
            .and_then(|request| {
                let mut preview = self.document.clone();
                let processed = preview.submit_rfq(request.rfq_data.clone())?;
                Ok((request, processed))
            });
        let (request, processed) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => return Err(self.record_rejection(action, error)),
        };

        let _ticket = self.begin_action(action)?;
        info!(
            event_name = "review.submit_rfq.submitted",
            document_id = %self.document.id,
            correlation_id = %self.audit.correlation_id,
            items = processed,
            vendors = request.rfq_data.selected_vendors.len(),
            "submitting rfq"
        );
        let result = self.services.gateway.submit_rfq(request).await;
        self.finish_action(action, processed, false, result).await
    }

    /// Refetches the document and rebuilds everything derived from it. Quotes typed in
    /// this session are kept.
    pub async fn refresh(&mut self) -> Result<(), WorkflowError> {
        let document = fetch_document(self.services.gateway.as_ref(), &self.document.id).await?;
        self.matrix.reseed(&document);
        self.document = document;
        self.document_revision += 1;
        self.prune_selection();
        self.target_rates =
            resolve_target_rates(&self.services.target_rates, &self.loading, &self.document).await;
        Ok(())
    }

    fn begin_action(&self, action: ReviewAction) -> Result<ActionTicket, WorkflowError> {
        self.services.actions.begin(&self.document.id, &self.loading.action).ok_or_else(|| {
            warn!(
                event_name = "review.action.in_flight",
                document_id = %self.document.id,
                action = action.as_str(),
                "refusing a second submission while one is outstanding"
            );
            WorkflowError::ActionInFlight
        })
    }

    async fn finish_action(
        &mut self,
        action: ReviewAction,
        processed: usize,
        whole_document: bool,
        result: Result<ActionResponse, GatewayError>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let response = match result {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                let error = WorkflowError::ActionFailed {
                    status: Some(response.status),
                    message: response.failure_message(),
                };
                return Err(self.record_failure(action, error));
            }
            Err(error) => {
                let error = WorkflowError::ActionFailed { status: None, message: error.to_string() };
                return Err(self.record_failure(action, error));
            }
        };

        let pending_before = self.document.pending_count();
        let navigation = if action == ReviewAction::SubmitRfq {
            Navigation::Stay
        } else if whole_document || processed == pending_before {
            Navigation::Leave
        } else {
            Navigation::Stay
        };

        self.selection = SelectionState::default();
        self.dialog = None;
        if action == ReviewAction::Approve {
            self.services.target_rates.invalidate();
        }
        if navigation == Navigation::Leave || action == ReviewAction::SubmitRfq {
            self.matrix.clear_draft().await;
        }

        info!(
            event_name = "review.action.succeeded",
            document_id = %self.document.id,
            correlation_id = %self.audit.correlation_id,
            action = action.as_str(),
            processed,
            pending_before,
            navigation = ?navigation,
            "review action accepted"
        );
        self.services.audit.emit(
            self.audit
                .event(
                    format!("review.{}_succeeded", action.as_str()),
                    AuditCategory::Review,
                    AuditOutcome::Success,
                )
                .with_metadata("processed", processed.to_string())
                .with_metadata("pending_before", pending_before.to_string())
                .with_metadata("whole_document", whole_document.to_string()),
        );

        let refreshed = match self.refresh().await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "review.refresh_failed",
                    document_id = %self.document.id,
                    correlation_id = %self.audit.correlation_id,
                    error = %error,
                    "action succeeded but the document could not be refetched"
                );
                false
            }
        };
        let remaining_pending = if refreshed {
            self.document.pending_count()
        } else if action == ReviewAction::SubmitRfq {
            processed
        } else {
            pending_before.saturating_sub(processed)
        };

        Ok(ActionOutcome {
            action,
            processed,
            pending_before,
            remaining_pending,
            navigation,
            refreshed,
            message: response.message,
        })
    }

    fn record_rejection(&self, action: ReviewAction, error: WorkflowError) -> WorkflowError {
        info!(
            event_name = "review.action.rejected",
            document_id = %self.document.id,
            correlation_id = %self.audit.correlation_id,
            action = action.as_str(),
            error = %error,
            "review action rejected before submission"
        );
        self.services.audit.emit(
            self.audit
                .event(
                    format!("review.{}_rejected", action.as_str()),
                    AuditCategory::Review,
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
        );
        error
    }

    fn record_failure(&self, action: ReviewAction, error: WorkflowError) -> WorkflowError {
        warn!(
            event_name = "review.action.failed",
            document_id = %self.document.id,
            correlation_id = %self.audit.correlation_id,
            action = action.as_str(),
            error = %error,
            "review action failed; selection and draft kept for retry"
        );
        self.services.audit.emit(
            self.audit
                .event(
                    format!("review.{}_failed", action.as_str()),
                    AuditCategory::Gateway,
                    AuditOutcome::Failed,
                )
                .with_metadata("error", error.to_string()),
        );
        error
    }

    /// Keeps the selection consistent with the pending items and the vendor list.
    fn prune_selection(&mut self) {
        let rfq = self.matrix.get();
        let mut next = self.selection.retain_items(&self.document.pending_item_ids());
        let stale: Vec<VendorId> = next
            .iter()
            .map(|(vendor_id, _)| vendor_id.clone())
            .filter(|vendor_id| !rfq.has_vendor(vendor_id))
            .collect();
        for vendor_id in &stale {
            next = next.without_vendor(vendor_id);
        }
        self.selection = next;
    }
}

async fn fetch_document(
    gateway: &dyn ProcurementGateway,
    document_id: &DocumentId,
) -> Result<ProcurementDocument, WorkflowError> {
    let raw = gateway.fetch_document(document_id).await?;
    Ok(decode_document(raw)?)
}

async fn resolve_target_rates(
    resolver: &TargetRateResolver,
    loading: &LoadingState,
    document: &ProcurementDocument,
) -> TargetRateResolution {
    let _resolving = FlagGuard::raise(&loading.target_rates);
    resolver.resolve(&document.items).await
}
