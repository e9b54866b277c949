//! Quote matrix store: the editable RFQ draft for one document.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::document::{DocumentId, ItemId, ItemStatus, ProcurementDocument};
use crate::domain::rfq::RfqData;
use crate::domain::vendor::{VendorId, VendorRef};
use crate::draft::DraftStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QuoteInputError {
    #[error("`{0}` is not a valid quote; use digits with at most one decimal point")]
    Malformed(String),
    #[error("quote `{0}` must not be negative")]
    Negative(String),
    #[error("quote `{0}` is too large for the item quantity")]
    OutOfRange(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error(transparent)]
    QuoteInput(#[from] QuoteInputError),
    #[error("item `{0}` is not part of this document")]
    UnknownItem(ItemId),
    #[error("item `{item_id}` is {status:?} and can no longer be quoted")]
    ItemLocked { item_id: ItemId, status: ItemStatus },
    #[error("vendor `{0}` has not been added to this RFQ")]
    UnknownVendor(VendorId),
}

/// Parses quote text typed by a user. Blank input clears the quote.
pub fn parse_quote_input(input: &str) -> Result<Option<Decimal>, QuoteInputError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('-') {
        return Err(QuoteInputError::Negative(trimmed.to_string()));
    }

    let well_formed = trimmed.chars().all(|ch| ch.is_ascii_digit() || ch == '.')
        && trimmed.chars().filter(|ch| *ch == '.').count() <= 1
        && trimmed.chars().any(|ch| ch.is_ascii_digit());
    if !well_formed {
        return Err(QuoteInputError::Malformed(trimmed.to_string()));
    }

    Decimal::from_str(trimmed)
        .map(Some)
        .map_err(|_| QuoteInputError::Malformed(trimmed.to_string()))
}

/// Draft RFQ data for one document.
///
/// Each edit swaps in a new [`RfqData`] value and bumps [`QuoteMatrix::version`], so
/// derived views can be memoized on the version. Every edit is written through to the
/// draft store; a failed write is logged and does not undo the edit.
pub struct QuoteMatrix {
    document_id: DocumentId,
    item_status: BTreeMap<ItemId, ItemStatus>,
    quantities: BTreeMap<ItemId, Decimal>,
    rfq: Arc<RfqData>,
    version: u64,
    store: Arc<dyn DraftStore>,
}

impl QuoteMatrix {
    /// Seeds the matrix from a non-empty local draft when one exists, otherwise from the
    /// server copy held by the document.
    pub async fn load(document: &ProcurementDocument, store: Arc<dyn DraftStore>) -> Self {
        let item_status = item_status(document);
        let known_items: BTreeSet<ItemId> = item_status.keys().cloned().collect();

        let draft = match store.load(&document.id).await {
            Ok(draft) => draft.filter(|draft| !draft.is_empty()),
            Err(error) => {
                warn!(
                    event_name = "rfq.draft.load_failed",
                    document_id = %document.id,
                    error = %error,
                    "ignoring unreadable rfq draft; seeding from server copy"
                );
                None
            }
        };

        let (rfq, source) = match draft {
            Some(draft) => (draft.sanitized(&known_items), "local_draft"),
            None => (document.rfq.clone(), "server"),
        };
        debug!(
            event_name = "rfq.matrix.loaded",
            document_id = %document.id,
            source,
            vendors = rfq.selected_vendors.len(),
            "quote matrix seeded"
        );

        Self {
            document_id: document.id.clone(),
            item_status,
            quantities: quantities(document),
            rfq: Arc::new(rfq),
            version: 0,
            store,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn get(&self) -> Arc<RfqData> {
        Arc::clone(&self.rfq)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub async fn set_vendors(&mut self, vendors: Vec<VendorRef>) {
        let next = self.rfq.with_vendors(vendors);
        self.commit(next).await;
    }

    /// Applies typed quote text. Malformed, negative or out-of-range text is rejected and
    /// the stored value stays as it was.
    pub async fn set_quote(
        &mut self,
        item_id: &ItemId,
        vendor_id: &VendorId,
        input: &str,
    ) -> Result<(), MatrixError> {
        self.ensure_editable(item_id, vendor_id)?;
        let quote = parse_quote_input(input)?;
        if let Some(quote) = quote {
            let quantity = self.quantities.get(item_id).copied().unwrap_or(Decimal::ZERO);
            if quote.checked_mul(quantity).is_none() {
                return Err(QuoteInputError::OutOfRange(input.trim().to_string()).into());
            }
        }
        let next = self.rfq.with_quote(item_id, vendor_id, quote);
        self.commit(next).await;
        Ok(())
    }

    pub async fn set_make(
        &mut self,
        item_id: &ItemId,
        vendor_id: &VendorId,
        make: Option<String>,
    ) -> Result<(), MatrixError> {
        self.ensure_editable(item_id, vendor_id)?;
        let make = make.map(|make| make.trim().to_string()).filter(|make| !make.is_empty());
        let next = self.rfq.with_make(item_id, vendor_id, make);
        self.commit(next).await;
        Ok(())
    }

    pub async fn remove_vendor(&mut self, vendor_id: &VendorId) -> Result<(), MatrixError> {
        if !self.rfq.has_vendor(vendor_id) {
            return Err(MatrixError::UnknownVendor(vendor_id.clone()));
        }
        let next = self.rfq.without_vendor(vendor_id);
        self.commit(next).await;
        Ok(())
    }

    /// Picks up item statuses from a refetched document. The in-memory matrix stays
    /// authoritative for quotes.
    pub fn reseed(&mut self, document: &ProcurementDocument) {
        self.item_status = item_status(document);
        self.quantities = quantities(document);
    }

    pub async fn clear_draft(&self) {
        if let Err(error) = self.store.clear(&self.document_id).await {
            warn!(
                event_name = "rfq.draft.clear_failed",
                document_id = %self.document_id,
                error = %error,
                "rfq draft could not be cleared"
            );
        }
    }

    fn ensure_editable(&self, item_id: &ItemId, vendor_id: &VendorId) -> Result<(), MatrixError> {
        match self.item_status.get(item_id) {
            None => return Err(MatrixError::UnknownItem(item_id.clone())),
            Some(ItemStatus::Pending) => {}
            Some(status) => {
                return Err(MatrixError::ItemLocked { item_id: item_id.clone(), status: *status })
            }
        }
        if !self.rfq.has_vendor(vendor_id) {
            return Err(MatrixError::UnknownVendor(vendor_id.clone()));
        }
        Ok(())
    }

    async fn commit(&mut self, next: RfqData) {
        self.rfq = Arc::new(next);
        self.version += 1;

        match self.store.save(&self.document_id, &self.rfq).await {
            Ok(()) => debug!(
                event_name = "rfq.draft.saved",
                document_id = %self.document_id,
                version = self.version,
                "rfq draft persisted"
            ),
            Err(error) => warn!(
                event_name = "rfq.draft.save_failed",
                document_id = %self.document_id,
                version = self.version,
                error = %error,
                "rfq draft could not be persisted; edit kept in memory"
            ),
        }
    }
}

fn item_status(document: &ProcurementDocument) -> BTreeMap<ItemId, ItemStatus> {
    document.items.iter().map(|item| (item.item_id.clone(), item.status)).collect()
}

fn quantities(document: &ProcurementDocument) -> BTreeMap<ItemId, Decimal> {
    document.items.iter().map(|item| (item.item_id.clone(), item.quantity)).collect()
}
