//! Local validation of a staged selection and construction of the action payloads.

use thiserror::Error;

use crate::domain::document::{ItemId, ItemStatus, ProcurementDocument};
use crate::domain::rfq::RfqData;
use crate::domain::vendor::VendorId;
use crate::gateway::{ApproveRequest, SendBackRequest, SubmitRfqRequest};
use crate::selection::{SelectionError, SelectionState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("select at least one item before submitting")]
    EmptySelection,
    #[error("item `{item_id}` is selected under more than one vendor: {vendors:?}")]
    AmbiguousVendor { item_id: ItemId, vendors: Vec<VendorId> },
    #[error("item `{0}` is not part of this document")]
    UnknownItem(ItemId),
    #[error("item `{item_id}` is {status:?} and cannot be acted on again")]
    ItemNotPending { item_id: ItemId, status: ItemStatus },
    #[error("vendor `{0}` is not part of this RFQ")]
    VendorNotSelected(VendorId),
    #[error("add at least one vendor before submitting the RFQ")]
    NoVendors,
}

impl From<SelectionError> for ValidationError {
    fn from(value: SelectionError) -> Self {
        match value {
            SelectionError::AmbiguousItem { item_id, vendors } => {
                Self::AmbiguousVendor { item_id, vendors }
            }
        }
    }
}

/// Vendors are checked against the in-memory `rfq`, which may hold vendors the server copy
/// has not seen yet.
pub fn build_approve_request(
    document: &ProcurementDocument,
    rfq: &RfqData,
    selection: &SelectionState,
) -> Result<ApproveRequest, ValidationError> {
    if selection.is_empty() {
        return Err(ValidationError::EmptySelection);
    }

    let pairs = selection.item_vendor_pairs()?;
    for (item_id, vendor_id) in &pairs {
        ensure_pending(document, item_id)?;
        if !rfq.has_vendor(vendor_id) {
            return Err(ValidationError::VendorNotSelected(vendor_id.clone()));
        }
    }

    Ok(ApproveRequest {
        project_id: document.project_id.clone(),
        document_id: document.id.clone(),
        selected_items: pairs.keys().cloned().collect(),
        selected_vendors: pairs,
        custom: document.is_custom(),
    })
}

/// Custom documents are rejected as a whole and need no selection. Category documents
/// send back only the selected items.
pub fn build_send_back_request(
    document: &ProcurementDocument,
    selection: &SelectionState,
    comment: Option<String>,
) -> Result<SendBackRequest, ValidationError> {
    let comment = comment.map(|comment| comment.trim().to_string()).filter(|c| !c.is_empty());

    if document.is_custom() {
        return Ok(SendBackRequest::Document { document_id: document.id.clone(), comment });
    }

    if selection.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    let selected_items = selection.selected_item_ids();
    for item_id in &selected_items {
        ensure_pending(document, item_id)?;
    }

    Ok(SendBackRequest::Items {
        document_id: document.id.clone(),
        selected_items: selected_items.into_iter().collect(),
        comment,
    })
}

/// The working RFQ goes out as a whole; it needs at least one vendor.
pub fn build_submit_rfq_request(
    document: &ProcurementDocument,
    rfq: &RfqData,
) -> Result<SubmitRfqRequest, ValidationError> {
    if rfq.selected_vendors.is_empty() {
        return Err(ValidationError::NoVendors);
    }
    Ok(SubmitRfqRequest { document_id: document.id.clone(), rfq_data: rfq.clone() })
}

fn ensure_pending(document: &ProcurementDocument, item_id: &ItemId) -> Result<(), ValidationError> {
    match document.item(item_id) {
        None => Err(ValidationError::UnknownItem(item_id.clone())),
        Some(item) if item.is_pending() => Ok(()),
        Some(item) => {
            Err(ValidationError::ItemNotPending { item_id: item_id.clone(), status: item.status })
        }
    }
}
