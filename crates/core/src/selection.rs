//! Selection state: the (vendor, item) pairs an approver has staged for action.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregation::{saturating_total, VendorGroup};
use crate::domain::document::ItemId;
use crate::domain::vendor::VendorId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxState {
    Unchecked,
    Checked,
    Indeterminate,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("item `{item_id}` is selected under more than one vendor: {vendors:?}")]
    AmbiguousItem { item_id: ItemId, vendors: Vec<VendorId> },
}

/// Vendor id to the items selected under it.
///
/// A vendor key exists only while its item set is non-empty. All operations return a
/// new state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    vendors: BTreeMap<VendorId, BTreeSet<ItemId>>,
}

impl SelectionState {
    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }

    pub fn vendor_count(&self) -> usize {
        self.vendors.len()
    }

    /// Number of (vendor, item) pairs.
    pub fn pair_count(&self) -> usize {
        self.vendors.values().map(BTreeSet::len).sum()
    }

    pub fn items_for(&self, vendor_id: &VendorId) -> Option<&BTreeSet<ItemId>> {
        self.vendors.get(vendor_id)
    }

    pub fn contains(&self, vendor_id: &VendorId, item_id: &ItemId) -> bool {
        self.vendors.get(vendor_id).is_some_and(|items| items.contains(item_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VendorId, &BTreeSet<ItemId>)> {
        self.vendors.iter()
    }

    /// Selects every listed item under the vendor, or drops the vendor entirely.
    pub fn toggle_vendor(
        &self,
        vendor_id: &VendorId,
        all_item_ids: impl IntoIterator<Item = ItemId>,
        checked: bool,
    ) -> Self {
        let mut next = self.clone();
        if checked {
            let items: BTreeSet<ItemId> = all_item_ids.into_iter().collect();
            if items.is_empty() {
                next.vendors.remove(vendor_id);
            } else {
                next.vendors.insert(vendor_id.clone(), items);
            }
        } else {
            next.vendors.remove(vendor_id);
        }
        next
    }

    pub fn toggle_item(&self, vendor_id: &VendorId, item_id: &ItemId, checked: bool) -> Self {
        let mut next = self.clone();
        if checked {
            next.vendors.entry(vendor_id.clone()).or_default().insert(item_id.clone());
        } else if let Some(items) = next.vendors.get_mut(vendor_id) {
            items.remove(item_id);
            if items.is_empty() {
                next.vendors.remove(vendor_id);
            }
        }
        next
    }

    pub fn vendor_checkbox_state(&self, vendor_id: &VendorId, total_items: usize) -> CheckboxState {
        match self.vendors.get(vendor_id).map(BTreeSet::len) {
            None | Some(0) => CheckboxState::Unchecked,
            Some(selected) if selected >= total_items => CheckboxState::Checked,
            Some(_) => CheckboxState::Indeterminate,
        }
    }

    pub fn without_vendor(&self, vendor_id: &VendorId) -> Self {
        let mut next = self.clone();
        next.vendors.remove(vendor_id);
        next
    }

    /// Keeps only the listed items, e.g. the items still pending after a refetch.
    pub fn retain_items(&self, item_ids: &BTreeSet<ItemId>) -> Self {
        let vendors = self
            .vendors
            .iter()
            .filter_map(|(vendor_id, items)| {
                let kept: BTreeSet<ItemId> = items.intersection(item_ids).cloned().collect();
                (!kept.is_empty()).then(|| (vendor_id.clone(), kept))
            })
            .collect();
        Self { vendors }
    }

    pub fn selected_item_ids(&self) -> BTreeSet<ItemId> {
        self.vendors.values().flatten().cloned().collect()
    }

    /// Flattens the selection to item -> vendor. An item staged under two vendors cannot
    /// be resolved to one purchase.
    pub fn item_vendor_pairs(&self) -> Result<BTreeMap<ItemId, VendorId>, SelectionError> {
        let mut pairs: BTreeMap<ItemId, VendorId> = BTreeMap::new();
        for (vendor_id, items) in &self.vendors {
            for item_id in items {
                if pairs.insert(item_id.clone(), vendor_id.clone()).is_some() {
                    let vendors = self
                        .vendors
                        .iter()
                        .filter(|(_, items)| items.contains(item_id))
                        .map(|(vendor_id, _)| vendor_id.clone())
                        .collect();
                    return Err(SelectionError::AmbiguousItem { item_id: item_id.clone(), vendors });
                }
            }
        }
        Ok(pairs)
    }
}

/// Totals over the currently selected rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSummary {
    pub vendor_count: usize,
    pub item_count: usize,
    pub total_amount: Decimal,
    pub potential_saving_loss: Decimal,
}

pub fn summarize(selection: &SelectionState, groups: &[VendorGroup]) -> SelectionSummary {
    let mut summary = SelectionSummary::default();
    for group in groups {
        let Some(items) = selection.items_for(&group.vendor.id) else {
            continue;
        };
        let rows: Vec<_> = group.items.iter().filter(|view| items.contains(&view.item.item_id)).collect();
        if rows.is_empty() {
            continue;
        }
        summary.vendor_count += 1;
        summary.item_count += rows.len();
        summary.total_amount = saturating_total(
            std::iter::once(summary.total_amount).chain(rows.iter().map(|view| view.amount)),
        );
        summary.potential_saving_loss = saturating_total(
            std::iter::once(summary.potential_saving_loss)
                .chain(rows.iter().map(|view| view.saving_loss.unwrap_or(Decimal::ZERO))),
        );
    }
    summary
}
