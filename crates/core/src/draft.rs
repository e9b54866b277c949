use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::document::DocumentId;
use crate::domain::rfq::RfqData;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DraftStoreError {
    #[error("draft storage failure: {0}")]
    Storage(String),
    #[error("stored draft could not be decoded: {0}")]
    Decode(String),
}

/// Keyed storage for unsubmitted RFQ drafts, one entry per document.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self, id: &DocumentId) -> Result<Option<RfqData>, DraftStoreError>;
    async fn save(&self, id: &DocumentId, rfq: &RfqData) -> Result<(), DraftStoreError>;
    async fn clear(&self, id: &DocumentId) -> Result<(), DraftStoreError>;
}

/// Keeps drafts serialized, the same way a persistent store would hold them.
#[derive(Clone, Default)]
pub struct InMemoryDraftStore {
    drafts: Arc<Mutex<HashMap<DocumentId, String>>>,
}

impl InMemoryDraftStore {
    pub fn raw(&self, id: &DocumentId) -> Option<String> {
        match self.drafts.lock() {
            Ok(drafts) => drafts.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        }
    }

    pub fn insert_raw(&self, id: &DocumentId, payload: impl Into<String>) {
        match self.drafts.lock() {
            Ok(mut drafts) => drafts.insert(id.clone(), payload.into()),
            Err(poisoned) => poisoned.into_inner().insert(id.clone(), payload.into()),
        };
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn load(&self, id: &DocumentId) -> Result<Option<RfqData>, DraftStoreError> {
        self.raw(id)
            .map(|payload| {
                serde_json::from_str(&payload)
                    .map_err(|error| DraftStoreError::Decode(error.to_string()))
            })
            .transpose()
    }

    async fn save(&self, id: &DocumentId, rfq: &RfqData) -> Result<(), DraftStoreError> {
        let payload =
            serde_json::to_string(rfq).map_err(|error| DraftStoreError::Storage(error.to_string()))?;
        self.insert_raw(id, payload);
        Ok(())
    }

    async fn clear(&self, id: &DocumentId) -> Result<(), DraftStoreError> {
        match self.drafts.lock() {
            Ok(mut drafts) => drafts.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        };
        Ok(())
    }
}
