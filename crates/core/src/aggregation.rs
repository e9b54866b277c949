//! Vendor aggregation: folds the quote matrix and target rates into per-vendor views.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::document::{ItemId, LineItem};
use crate::domain::rfq::RfqData;
use crate::domain::target_rate::{ContributingQuote, TargetRateMap};
use crate::domain::vendor::VendorRef;

/// Expected discount below the historical rate when benchmarking a quote.
pub const DEFAULT_TARGET_DISCOUNT_FACTOR: Decimal = Decimal::from_parts(98, 0, 0, false, 2);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationPolicy {
    pub target_discount_factor: Decimal,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self { target_discount_factor: DEFAULT_TARGET_DISCOUNT_FACTOR }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorItemView {
    pub item: LineItem,
    pub quote: Option<Decimal>,
    pub make: Option<String>,
    pub amount: Decimal,
    pub target_rate: Option<Decimal>,
    pub target_amount: Option<Decimal>,
    pub lowest_quoted_amount: Option<Decimal>,
    /// Positive is a saving, negative a loss. `None` when there is nothing to compare against.
    pub saving_loss: Option<Decimal>,
    pub is_lowest_quote: bool,
    pub contributing_quotes: Vec<ContributingQuote>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorGroup {
    pub vendor: VendorRef,
    pub items: Vec<VendorItemView>,
    pub total_amount: Decimal,
    pub potential_saving_loss: Decimal,
}

impl VendorGroup {
    pub fn item_ids(&self) -> BTreeSet<ItemId> {
        self.items.iter().map(|view| view.item.item_id.clone()).collect()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn item(&self, item_id: &ItemId) -> Option<&VendorItemView> {
        self.items.iter().find(|view| &view.item.item_id == item_id)
    }
}

/// Saving or loss of a quoted amount against the best available benchmark: the target
/// amount first, then the lowest amount quoted in this round.
pub fn saving_loss(
    amount: Decimal,
    target_amount: Option<Decimal>,
    lowest_quoted_amount: Option<Decimal>,
) -> Option<Decimal> {
    target_amount.or(lowest_quoted_amount).and_then(|benchmark| benchmark.checked_sub(amount))
}

/// Sums amounts, skipping any term that would push the total out of range.
pub fn saturating_total(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
    amounts
        .into_iter()
        .fold(Decimal::ZERO, |total, amount| total.checked_add(amount).unwrap_or(total))
}

/// Builds one group per selected vendor that has an entry for at least one pending item.
/// Groups are ordered by vendor display name, then id.
pub fn aggregate_vendor_groups(
    pending_items: &[LineItem],
    rfq: &RfqData,
    target_rates: &TargetRateMap,
    policy: &AggregationPolicy,
) -> Vec<VendorGroup> {
    let mut groups: Vec<VendorGroup> = rfq
        .selected_vendors
        .iter()
        .filter_map(|vendor| {
            let items: Vec<VendorItemView> = pending_items
                .iter()
                .filter(|item| item.is_pending())
                .filter_map(|item| {
                    let entry = rfq.entry(&item.item_id, &vendor.id)?;
                    Some(item_view(item, entry.quote, entry.make.clone(), rfq, target_rates, policy))
                })
                .collect();

            if items.is_empty() {
                return None;
            }

            let total_amount = saturating_total(items.iter().map(|view| view.amount));
            let potential_saving_loss = saturating_total(
                items.iter().map(|view| view.saving_loss.unwrap_or(Decimal::ZERO)),
            );
            Some(VendorGroup { vendor: vendor.clone(), items, total_amount, potential_saving_loss })
        })
        .collect();

    groups.sort_by(|left, right| {
        left.vendor
            .display_name()
            .cmp(right.vendor.display_name())
            .then_with(|| left.vendor.id.cmp(&right.vendor.id))
    });
    groups
}

/// Lowest positive unit quote any selected vendor gave for the item.
pub fn lowest_unit_quote(rfq: &RfqData, item_id: &ItemId) -> Option<Decimal> {
    let detail = rfq.details.get(item_id)?;
    rfq.selected_vendors
        .iter()
        .filter_map(|vendor| detail.vendor_quotes.get(&vendor.id).and_then(|entry| entry.quote))
        .filter(|quote| *quote > Decimal::ZERO)
        .min()
}

fn item_view(
    item: &LineItem,
    quote: Option<Decimal>,
    make: Option<String>,
    rfq: &RfqData,
    target_rates: &TargetRateMap,
    policy: &AggregationPolicy,
) -> VendorItemView {
    // Quotes that cannot be multiplied out contribute no amount.
    let line_amount = quote.and_then(|quote| quote.checked_mul(item.quantity));
    let amount = line_amount.unwrap_or(Decimal::ZERO);
    let lowest_unit = lowest_unit_quote(rfq, &item.item_id);
    let lowest_quoted_amount = lowest_unit.and_then(|lowest| lowest.checked_mul(item.quantity));
    let target_rate = target_rates.rate_for(&item.item_id);
    let target_amount = target_rate.and_then(|rate| {
        rate.checked_mul(item.quantity)?.checked_mul(policy.target_discount_factor)
    });
    let saving_loss = match (quote, line_amount) {
        (Some(_), None) => None,
        _ => saving_loss(amount, target_amount, lowest_quoted_amount),
    };

    VendorItemView {
        item: item.clone(),
        quote,
        make,
        amount,
        target_rate,
        target_amount,
        lowest_quoted_amount,
        saving_loss,
        is_lowest_quote: quote.is_some() && quote == lowest_unit,
        contributing_quotes: target_rates.contributing_quotes(&item.item_id).to_vec(),
    }
}
