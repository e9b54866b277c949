use serde::{Deserialize, Serialize};

use crate::domain::document::{DocumentId, ProcurementDocument, WorkflowState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOnlyReason {
    StateNotActionable,
    NothingPending,
    RfqClosed,
}

/// Returned instead of performing an action on a document that no longer accepts one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyNotice {
    pub document_id: DocumentId,
    pub workflow_state: WorkflowState,
    pub modified_by: Option<String>,
    pub reason: ReadOnlyReason,
}

impl ReadOnlyNotice {
    pub fn message(&self) -> String {
        let modifier = self.modified_by.as_deref().filter(|name| !name.trim().is_empty());
        let base = match modifier {
            Some(name) => format!(
                "{} is {} (last modified by {name})",
                self.document_id, self.workflow_state
            ),
            None => format!("{} is {}", self.document_id, self.workflow_state),
        };
        match self.reason {
            ReadOnlyReason::StateNotActionable => format!("{base}; no review actions are available"),
            ReadOnlyReason::NothingPending => format!("{base}; every item has already been decided"),
            ReadOnlyReason::RfqClosed => format!("{base}; its RFQ can no longer be submitted"),
        }
    }
}

/// Approve and send-back only run while the document awaits a vendor decision and still
/// has pending items.
pub fn check_actionable(document: &ProcurementDocument) -> Result<(), ReadOnlyNotice> {
    let reason = if !document.workflow_state.accepts_review_actions() {
        ReadOnlyReason::StateNotActionable
    } else if document.pending_count() == 0 {
        ReadOnlyReason::NothingPending
    } else {
        return Ok(());
    };

    Err(ReadOnlyNotice {
        document_id: document.id.clone(),
        workflow_state: document.workflow_state.clone(),
        modified_by: document.modified_by.clone(),
        reason,
    })
}

/// RFQ submission runs until the first approval lands.
pub fn check_submittable(document: &ProcurementDocument) -> Result<(), ReadOnlyNotice> {
    if document.workflow_state.rfq_submission_path().is_some() {
        return Ok(());
    }
    Err(ReadOnlyNotice {
        document_id: document.id.clone(),
        workflow_state: document.workflow_state.clone(),
        modified_by: document.modified_by.clone(),
        reason: ReadOnlyReason::RfqClosed,
    })
}
