use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::document::ItemId;
use crate::domain::vendor::{VendorId, VendorRef};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorQuote {
    #[serde(default)]
    pub quote: Option<Decimal>,
    #[serde(default)]
    pub make: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuoteDetail {
    #[serde(default)]
    pub vendor_quotes: BTreeMap<VendorId, VendorQuote>,
    #[serde(default)]
    pub makes: Vec<String>,
}

/// The items × vendors quote matrix of one RFQ round.
///
/// Every transform returns a new value; callers never observe a half-applied edit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqData {
    #[serde(default)]
    pub selected_vendors: Vec<VendorRef>,
    #[serde(default)]
    pub details: BTreeMap<ItemId, ItemQuoteDetail>,
}

impl RfqData {
    /// True when nothing has been entered: no vendors and no quote or make on any item.
    pub fn is_empty(&self) -> bool {
        self.selected_vendors.is_empty()
            && self.details.values().all(|detail| {
                detail.vendor_quotes.values().all(|entry| entry.quote.is_none() && entry.make.is_none())
            })
    }

    pub fn has_vendor(&self, vendor_id: &VendorId) -> bool {
        self.selected_vendors.iter().any(|vendor| &vendor.id == vendor_id)
    }

    pub fn vendor(&self, vendor_id: &VendorId) -> Option<&VendorRef> {
        self.selected_vendors.iter().find(|vendor| &vendor.id == vendor_id)
    }

    pub fn entry(&self, item_id: &ItemId, vendor_id: &VendorId) -> Option<&VendorQuote> {
        self.details.get(item_id).and_then(|detail| detail.vendor_quotes.get(vendor_id))
    }

    pub fn quote_for(&self, item_id: &ItemId, vendor_id: &VendorId) -> Option<Decimal> {
        self.entry(item_id, vendor_id).and_then(|entry| entry.quote)
    }

    /// Replaces the vendor list. Duplicate ids keep their first occurrence and vendors
    /// no longer listed lose their quotes on every item.
    pub fn with_vendors(&self, vendors: Vec<VendorRef>) -> Self {
        let mut seen = BTreeSet::new();
        let selected_vendors: Vec<VendorRef> =
            vendors.into_iter().filter(|vendor| seen.insert(vendor.id.clone())).collect();

        let mut next = Self { selected_vendors, details: self.details.clone() };
        for detail in next.details.values_mut() {
            detail.vendor_quotes.retain(|vendor_id, _| seen.contains(vendor_id));
        }
        next
    }

    pub fn with_quote(&self, item_id: &ItemId, vendor_id: &VendorId, quote: Option<Decimal>) -> Self {
        let mut next = self.clone();
        let detail = next.details.entry(item_id.clone()).or_default();
        detail.vendor_quotes.entry(vendor_id.clone()).or_default().quote = quote;
        next
    }

    pub fn with_make(&self, item_id: &ItemId, vendor_id: &VendorId, make: Option<String>) -> Self {
        let mut next = self.clone();
        let detail = next.details.entry(item_id.clone()).or_default();
        if let Some(make) = make.as_ref() {
            if !detail.makes.contains(make) {
                detail.makes.push(make.clone());
            }
        }
        detail.vendor_quotes.entry(vendor_id.clone()).or_default().make = make;
        next
    }

    pub fn without_vendor(&self, vendor_id: &VendorId) -> Self {
        let mut next = self.clone();
        next.selected_vendors.retain(|vendor| &vendor.id != vendor_id);
        for detail in next.details.values_mut() {
            detail.vendor_quotes.remove(vendor_id);
        }
        next
    }

    /// Drops entries that break the matrix invariants: details for unknown items and
    /// quotes from vendors that are not selected.
    pub fn sanitized(&self, known_items: &BTreeSet<ItemId>) -> Self {
        let vendors: BTreeSet<&VendorId> =
            self.selected_vendors.iter().map(|vendor| &vendor.id).collect();
        let details = self
            .details
            .iter()
            .filter(|(item_id, _)| known_items.contains(*item_id))
            .map(|(item_id, detail)| {
                let vendor_quotes = detail
                    .vendor_quotes
                    .iter()
                    .filter(|(vendor_id, _)| vendors.contains(vendor_id))
                    .map(|(vendor_id, entry)| (vendor_id.clone(), entry.clone()))
                    .collect();
                (item_id.clone(), ItemQuoteDetail { vendor_quotes, makes: detail.makes.clone() })
            })
            .collect();

        Self { selected_vendors: self.selected_vendors.clone(), details }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::RfqData;
    use crate::domain::document::ItemId;
    use crate::domain::vendor::{VendorId, VendorRef};

    fn item(id: &str) -> ItemId {
        ItemId(id.to_string())
    }

    fn vendor(id: &str) -> VendorId {
        VendorId(id.to_string())
    }

    #[test]
    fn decodes_camel_case_wire_shape() {
        let raw = r#"{
            "selectedVendors": [{"value": "V-1", "label": "Acme"}],
            "details": {
                "ITEM-1": {
                    "vendorQuotes": {"V-1": {"quote": 120.5, "make": "Havells"}},
                    "makes": ["Havells", "Polycab"]
                }
            }
        }"#;
        let rfq: RfqData = serde_json::from_str(raw).expect("decode rfq");

        assert_eq!(rfq.selected_vendors[0].name, "Acme");
        assert_eq!(rfq.quote_for(&item("ITEM-1"), &vendor("V-1")), Some(Decimal::new(1205, 1)));
        assert_eq!(rfq.details[&item("ITEM-1")].makes.len(), 2);
    }

    #[test]
    fn with_vendors_dedupes_and_cascades_dropped_vendors() {
        let rfq = RfqData::default()
            .with_vendors(vec![VendorRef::new("V-1", "Acme"), VendorRef::new("V-2", "Bolt")])
            .with_quote(&item("ITEM-1"), &vendor("V-1"), Some(Decimal::TEN))
            .with_quote(&item("ITEM-1"), &vendor("V-2"), Some(Decimal::ONE));

        let next = rfq.with_vendors(vec![
            VendorRef::new("V-2", "Bolt"),
            VendorRef::new("V-2", "Bolt again"),
        ]);

        assert_eq!(next.selected_vendors.len(), 1);
        assert_eq!(next.selected_vendors[0].name, "Bolt");
        assert_eq!(next.quote_for(&item("ITEM-1"), &vendor("V-1")), None);
        assert_eq!(next.quote_for(&item("ITEM-1"), &vendor("V-2")), Some(Decimal::ONE));
        assert_eq!(rfq.quote_for(&item("ITEM-1"), &vendor("V-1")), Some(Decimal::TEN));
    }

    #[test]
    fn makes_are_collected_once() {
        let rfq = RfqData::default()
            .with_vendors(vec![VendorRef::new("V-1", "Acme"), VendorRef::new("V-2", "Bolt")])
            .with_make(&item("ITEM-1"), &vendor("V-1"), Some("Havells".to_string()))
            .with_make(&item("ITEM-1"), &vendor("V-2"), Some("Havells".to_string()));

        assert_eq!(rfq.details[&item("ITEM-1")].makes, vec!["Havells".to_string()]);
    }

    #[test]
    fn sanitized_drops_unknown_items_and_unselected_vendors() {
        let mut rfq = RfqData::default()
            .with_vendors(vec![VendorRef::new("V-1", "Acme")])
            .with_quote(&item("ITEM-1"), &vendor("V-1"), Some(Decimal::TEN))
            .with_quote(&item("GONE"), &vendor("V-1"), Some(Decimal::TEN));
        rfq = rfq.with_quote(&item("ITEM-1"), &vendor("V-9"), Some(Decimal::ONE));

        let known: BTreeSet<ItemId> = [item("ITEM-1")].into_iter().collect();
        let clean = rfq.sanitized(&known);

        assert!(!clean.details.contains_key(&item("GONE")));
        assert_eq!(clean.details[&item("ITEM-1")].vendor_quotes.len(), 1);
    }

    #[test]
    fn emptiness_ignores_blank_entries() {
        let blank = RfqData::default().with_quote(&item("ITEM-1"), &vendor("V-1"), None);
        assert!(blank.is_empty());

        let with_vendor = RfqData::default().with_vendors(vec![VendorRef::new("V-1", "Acme")]);
        assert!(!with_vendor.is_empty());
    }
}
