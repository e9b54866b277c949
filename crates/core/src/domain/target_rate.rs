use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::document::ItemId;

/// A historical approved quote that fed an item's target rate. Audit display only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributingQuote {
    pub vendor: String,
    pub purchase_order: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub quote: Option<Decimal>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRateDetail {
    pub item_id: ItemId,
    /// `None` means there is no benchmark for the item; it is never read as zero.
    pub rate: Option<Decimal>,
    pub contributing_quotes: Vec<ContributingQuote>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRateMap {
    details: BTreeMap<ItemId, TargetRateDetail>,
}

impl TargetRateMap {
    pub fn new(details: impl IntoIterator<Item = TargetRateDetail>) -> Self {
        Self { details: details.into_iter().map(|detail| (detail.item_id.clone(), detail)).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    pub fn len(&self) -> usize {
        self.details.len()
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&TargetRateDetail> {
        self.details.get(item_id)
    }

    pub fn rate_for(&self, item_id: &ItemId) -> Option<Decimal> {
        self.details.get(item_id).and_then(|detail| detail.rate)
    }

    pub fn contributing_quotes(&self, item_id: &ItemId) -> &[ContributingQuote] {
        self.details
            .get(item_id)
            .map(|detail| detail.contributing_quotes.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetRateDetail> {
        self.details.values()
    }
}
