use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::rfq::RfqData;
use crate::domain::vendor::VendorId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    Pending,
    Approved,
    Delayed,
    Rejected,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Delayed => "Delayed",
            Self::Rejected => "Rejected",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "delayed" => Ok(Self::Delayed),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported line item status `{other}` (expected pending|approved|delayed|rejected)"
            ))),
        }
    }
}

/// Document-level workflow state. States the engine does not recognise are kept
/// verbatim so they can be shown back to the user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkflowState {
    Pending,
    InProgress,
    VendorSelected,
    PartiallyApproved,
    Approved,
    Rejected,
    Other(String),
}

impl WorkflowState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::VendorSelected => "Vendor Selected",
            Self::PartiallyApproved => "Partially Approved",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Other(value) => value,
        }
    }

    /// States in which an approver may still act on pending items.
    pub fn accepts_review_actions(&self) -> bool {
        matches!(self, Self::VendorSelected | Self::PartiallyApproved)
    }

    pub fn can_transition_to(&self, next: &WorkflowState) -> bool {
        use WorkflowState::{
            Approved, InProgress, PartiallyApproved, Pending, Rejected, VendorSelected,
        };

        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, VendorSelected)
                | (VendorSelected, VendorSelected)
                | (VendorSelected, PartiallyApproved)
                | (VendorSelected, Approved)
                | (VendorSelected, Rejected)
                | (PartiallyApproved, PartiallyApproved)
                | (PartiallyApproved, Approved)
                | (Rejected, InProgress)
        )
    }

    /// Steps an RFQ submission takes from this state to Vendor Selected. `None` once
    /// approvals have started or the document is closed.
    pub fn rfq_submission_path(&self) -> Option<Vec<WorkflowState>> {
        match self {
            Self::Pending | Self::Rejected => Some(vec![Self::InProgress, Self::VendorSelected]),
            Self::InProgress | Self::VendorSelected => Some(vec![Self::VendorSelected]),
            Self::PartiallyApproved | Self::Approved | Self::Other(_) => None,
        }
    }
}

impl From<String> for WorkflowState {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "in progress" | "in_progress" => Self::InProgress,
            "vendor selected" | "vendor_selected" => Self::VendorSelected,
            "partially approved" | "partially_approved" => Self::PartiallyApproved,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for WorkflowState {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<WorkflowState> for String {
    fn from(value: WorkflowState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    ProcurementRequest,
    SentBack,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcurementRequest => "procurement_request",
            Self::SentBack => "sent_back",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: ItemId,
    pub name: String,
    pub category: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub status: ItemStatus,
    pub vendor: Option<VendorId>,
    pub quote: Option<Decimal>,
    pub make: Option<String>,
}

impl LineItem {
    pub fn pending(item_id: impl Into<String>, quantity: Decimal, unit: impl Into<String>) -> Self {
        let item_id = item_id.into();
        Self {
            name: item_id.clone(),
            item_id: ItemId(item_id),
            category: None,
            quantity,
            unit: unit.into(),
            status: ItemStatus::Pending,
            vendor: None,
            quote: None,
            make: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementDocument {
    pub id: DocumentId,
    pub project_id: ProjectId,
    pub kind: DocumentKind,
    /// Absent for custom documents, which follow a separate backend path.
    pub category: Option<String>,
    pub workflow_state: WorkflowState,
    pub items: Vec<LineItem>,
    pub rfq: RfqData,
    pub modified_by: Option<String>,
}

impl ProcurementDocument {
    pub fn is_custom(&self) -> bool {
        self.category.as_deref().map(str::trim).unwrap_or_default().is_empty()
    }

    pub fn item(&self, item_id: &ItemId) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.item_id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &ItemId) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|item| &item.item_id == item_id)
    }

    pub fn pending_items(&self) -> Vec<LineItem> {
        self.items.iter().filter(|item| item.is_pending()).cloned().collect()
    }

    pub fn pending_item_ids(&self) -> BTreeSet<ItemId> {
        self.items.iter().filter(|item| item.is_pending()).map(|item| item.item_id.clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_pending()).count()
    }

    pub fn count_with_status(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    /// State a document settles into once a review round has been applied to its items.
    pub fn settled_state(&self) -> WorkflowState {
        let approved = self.count_with_status(ItemStatus::Approved);
        if self.pending_count() > 0 {
            if approved > 0 {
                WorkflowState::PartiallyApproved
            } else {
                self.workflow_state.clone()
            }
        } else if approved > 0 {
            WorkflowState::Approved
        } else {
            WorkflowState::Rejected
        }
    }

    /// Publishes `rfq` and puts the document up for approval. A rejected custom document
    /// reopens its rejected items. Returns the number of items awaiting a decision.
    pub fn submit_rfq(&mut self, rfq: RfqData) -> Result<usize, DomainError> {
        let Some(path) = self.workflow_state.rfq_submission_path() else {
            return Err(DomainError::InvalidWorkflowTransition {
                from: self.workflow_state.clone(),
                to: WorkflowState::VendorSelected,
            });
        };
        if rfq.selected_vendors.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "{} has no vendors on its RFQ",
                self.id
            )));
        }

        if self.workflow_state == WorkflowState::Rejected && self.is_custom() {
            for item in self.items.iter_mut().filter(|item| item.status == ItemStatus::Rejected) {
                item.status = ItemStatus::Pending;
                item.vendor = None;
                item.quote = None;
                item.make = None;
            }
        }
        let pending = self.pending_count();
        if pending == 0 {
            return Err(DomainError::InvariantViolation(format!(
                "{} has no pending items to put up for approval",
                self.id
            )));
        }

        for next in path {
            self.transition_to(next)?;
        }
        self.rfq = rfq;
        Ok(pending)
    }

    pub fn transition_to(&mut self, next: WorkflowState) -> Result<(), DomainError> {
        if self.workflow_state.can_transition_to(&next) {
            self.workflow_state = next;
            return Ok(());
        }

        Err(DomainError::InvalidWorkflowTransition { from: self.workflow_state.clone(), to: next })
    }
}
