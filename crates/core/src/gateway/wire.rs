use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::document::{
    DocumentId, DocumentKind, ItemId, ItemStatus, LineItem, ProcurementDocument, ProjectId,
    WorkflowState,
};
use crate::domain::rfq::RfqData;
use crate::domain::target_rate::{ContributingQuote, TargetRateDetail, TargetRateMap};
use crate::domain::vendor::VendorId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("field `{field}` could not be decoded: {message}")]
    Field { field: &'static str, message: String },
    #[error("line item `{item_id}` is invalid: {message}")]
    LineItem { item_id: String, message: String },
    #[error("line item `{0}` appears more than once")]
    DuplicateItem(String),
}

/// A document as the backend sends it. `order_list` and `rfq_data` may arrive either
/// as JSON-encoded strings or as native JSON values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, alias = "work_package")]
    pub category: Option<String>,
    #[serde(default)]
    pub workflow_state: String,
    #[serde(default)]
    pub order_list: Value,
    #[serde(default)]
    pub rfq_data: Value,
    #[serde(default)]
    pub modified_by: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    #[serde(alias = "name")]
    pub item_id: String,
    #[serde(default, alias = "item")]
    pub item_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub quantity: Value,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub quote: Value,
    #[serde(default)]
    pub make: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributingQuoteRecord {
    #[serde(default, alias = "vendor_name")]
    pub vendor: Option<String>,
    #[serde(default, alias = "procurement_order")]
    pub purchase_order: Option<String>,
    #[serde(default)]
    pub quantity: Value,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub quote: Value,
    #[serde(default, alias = "creation")]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRateRecord {
    pub item_id: String,
    #[serde(default)]
    pub rate: Value,
    #[serde(default)]
    pub selected_quotations_items: Vec<ContributingQuoteRecord>,
}

/// Turns a backend document into domain types. This is the only place loosely typed
/// document fields are interpreted.
pub fn decode_document(raw: RawDocument) -> Result<ProcurementDocument, DecodeError> {
    if raw.id.trim().is_empty() {
        return Err(DecodeError::Field { field: "id", message: "must not be empty".to_string() });
    }

    let order_list = match embedded_value(raw.order_list, "order_list")? {
        Value::Object(mut object) => object.remove("list").unwrap_or(Value::Null),
        other => other,
    };
    let raw_items: Vec<RawLineItem> = match order_list {
        Value::Null => Vec::new(),
        other => serde_json::from_value(other).map_err(|error| DecodeError::Field {
            field: "order_list",
            message: error.to_string(),
        })?,
    };

    let mut seen = BTreeSet::new();
    let mut items = Vec::with_capacity(raw_items.len());
    for raw_item in raw_items {
        if !seen.insert(raw_item.item_id.clone()) {
            return Err(DecodeError::DuplicateItem(raw_item.item_id));
        }
        items.push(decode_line_item(raw_item)?);
    }

    let rfq = match embedded_value(raw.rfq_data, "rfq_data")? {
        Value::Null => RfqData::default(),
        other => serde_json::from_value::<RfqData>(other).map_err(|error| DecodeError::Field {
            field: "rfq_data",
            message: error.to_string(),
        })?,
    };
    let known_items: BTreeSet<ItemId> = items.iter().map(|item| item.item_id.clone()).collect();

    Ok(ProcurementDocument {
        id: DocumentId(raw.id),
        project_id: ProjectId(raw.project),
        kind: decode_kind(raw.kind.as_deref()),
        category: raw.category.filter(|category| !category.trim().is_empty()),
        workflow_state: WorkflowState::from(raw.workflow_state),
        items,
        rfq: rfq.sanitized(&known_items),
        modified_by: raw.modified_by.filter(|value| !value.trim().is_empty()),
    })
}

pub fn encode_document(document: &ProcurementDocument) -> RawDocument {
    let order_list = document
        .items
        .iter()
        .map(|item| RawLineItem {
            item_id: item.item_id.0.clone(),
            item_name: Some(item.name.clone()),
            category: item.category.clone(),
            quantity: Value::String(item.quantity.to_string()),
            unit: Some(item.unit.clone()),
            status: Some(item.status.as_str().to_string()),
            vendor: item.vendor.as_ref().map(|vendor| vendor.0.clone()),
            quote: item.quote.map(|quote| Value::String(quote.to_string())).unwrap_or(Value::Null),
            make: item.make.clone(),
        })
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect();

    RawDocument {
        id: document.id.0.clone(),
        project: document.project_id.0.clone(),
        kind: Some(document.kind.as_str().to_string()),
        category: document.category.clone(),
        workflow_state: document.workflow_state.as_str().to_string(),
        order_list: Value::Array(order_list),
        rfq_data: serde_json::to_value(&document.rfq).unwrap_or(Value::Null),
        modified_by: document.modified_by.clone(),
    }
}

/// Builds the lookup table for the requested items. Records for other items are
/// ignored, and a rate that is missing, blank, non-numeric or not positive means
/// "no target".
pub fn decode_target_rates(records: Vec<TargetRateRecord>, requested: &[ItemId]) -> TargetRateMap {
    let requested: BTreeSet<&ItemId> = requested.iter().collect();

    TargetRateMap::new(records.into_iter().filter_map(|record| {
        let item_id = ItemId(record.item_id);
        if !requested.contains(&item_id) {
            return None;
        }

        let rate = lenient_decimal(&record.rate).filter(|rate| *rate > Decimal::ZERO);
        let contributing_quotes = record
            .selected_quotations_items
            .into_iter()
            .map(|quote| ContributingQuote {
                vendor: quote.vendor.unwrap_or_default(),
                purchase_order: quote.purchase_order,
                quantity: lenient_decimal(&quote.quantity),
                unit: quote.unit,
                quote: lenient_decimal(&quote.quote),
                created_at: quote.created_at.as_deref().and_then(parse_timestamp),
            })
            .collect();

        Some(TargetRateDetail { item_id, rate, contributing_quotes })
    }))
}

fn decode_line_item(raw: RawLineItem) -> Result<LineItem, DecodeError> {
    let item_error =
        |message: String| DecodeError::LineItem { item_id: raw.item_id.clone(), message };

    if raw.item_id.trim().is_empty() {
        return Err(item_error("item id must not be empty".to_string()));
    }

    let quantity = strict_decimal(&raw.quantity).map_err(&item_error)?.unwrap_or(Decimal::ZERO);
    if quantity < Decimal::ZERO {
        return Err(item_error(format!("quantity {quantity} must not be negative")));
    }

    let quote = strict_decimal(&raw.quote).map_err(&item_error)?;
    if let Some(quote) = quote.filter(|quote| *quote < Decimal::ZERO) {
        return Err(item_error(format!("quote {quote} must not be negative")));
    }
    let status = match raw.status.as_deref() {
        Some(status) => {
            ItemStatus::from_str(status).map_err(|error| item_error(error.to_string()))?
        }
        None => ItemStatus::Pending,
    };

    Ok(LineItem {
        item_id: ItemId(raw.item_id.clone()),
        name: raw.item_name.clone().unwrap_or_else(|| raw.item_id.clone()),
        category: raw.category.clone(),
        quantity,
        unit: raw.unit.clone().unwrap_or_default(),
        status,
        vendor: raw.vendor.clone().filter(|vendor| !vendor.trim().is_empty()).map(VendorId),
        quote,
        make: raw.make.clone().filter(|make| !make.trim().is_empty()),
    })
}

fn decode_kind(kind: Option<&str>) -> DocumentKind {
    match kind.map(|kind| kind.trim().to_ascii_lowercase().replace(' ', "_")) {
        Some(kind) if kind == "sent_back" || kind == "sent_back_category" => DocumentKind::SentBack,
        _ => DocumentKind::ProcurementRequest,
    }
}

fn embedded_value(value: Value, field: &'static str) -> Result<Value, DecodeError> {
    match value {
        Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|error| DecodeError::Field { field, message: error.to_string() }),
        other => Ok(other),
    }
}

fn strict_decimal(value: &Value) -> Result<Option<Decimal>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => parse_decimal_text(text.trim())
            .map(Some)
            .ok_or_else(|| format!("`{text}` is not a number")),
        Value::Number(number) => parse_decimal_text(&number.to_string())
            .map(Some)
            .ok_or_else(|| format!("`{number}` is out of range")),
        other => Err(format!("expected a number, found `{other}`")),
    }
}

fn lenient_decimal(value: &Value) -> Option<Decimal> {
    strict_decimal(value).ok().flatten()
}

fn parse_decimal_text(text: &str) -> Option<Decimal> {
    Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)).ok()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
