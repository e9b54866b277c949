use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use procura_core::domain::document::{
    DocumentId, DocumentKind, ItemId, LineItem, ProcurementDocument, ProjectId, WorkflowState,
};
use procura_core::domain::rfq::RfqData;
use procura_core::domain::vendor::{VendorId, VendorRef};

use crate::connection::DbPool;
use crate::repositories::{
    ApprovedQuotation, DocumentRepository, QuotationHistoryRepository, RepositoryError,
    SqlDocumentRepository, SqlQuotationHistoryRepository,
};

pub const DEMO_PROJECT_ID: &str = "PRJ-DEMO";
pub const DEMO_CATEGORY_DOCUMENT_ID: &str = "PR-DEMO-0001";
pub const DEMO_CUSTOM_DOCUMENT_ID: &str = "PR-DEMO-0002";

/// Demo project: one category request with three vendors quoting, one custom request,
/// and approved-quote history for two of the category items.
pub struct DemoDataset;

impl DemoDataset {
    /// Loads the dataset. Safe to run repeatedly; documents are reset to their seeded state.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let documents = SqlDocumentRepository::new(pool.clone());
        let history = SqlQuotationHistoryRepository::new(pool.clone());

        let seeded = [demo_category_document(), demo_custom_document()];
        for document in &seeded {
            documents.save(document).await?;
        }
        let quotations = demo_history();
        history.record(&quotations).await?;

        Ok(SeedResult {
            documents_seeded: seeded.iter().map(|document| document.id.clone()).collect(),
            history_records: quotations.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let documents = SqlDocumentRepository::new(pool.clone());
        let history = SqlQuotationHistoryRepository::new(pool.clone());

        let mut checks = Vec::new();
        for id in [DEMO_CATEGORY_DOCUMENT_ID, DEMO_CUSTOM_DOCUMENT_ID] {
            let present = documents.find(&DocumentId(id.to_string())).await?.is_some();
            checks.push((id, present));
        }
        let cable_history =
            history.recent_for_item(&ItemId("CABLE-4SQMM".to_string()), 10).await?;
        checks.push(("history:CABLE-4SQMM", cable_history.len() >= 3));

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub documents_seeded: Vec<DocumentId>,
    pub history_records: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

fn item(id: &str, name: &str, quantity: Decimal, unit: &str, category: Option<&str>) -> LineItem {
    let mut item = LineItem::pending(id, quantity, unit);
    item.name = name.to_string();
    item.category = category.map(str::to_string);
    item
}

fn quote(
    rfq: RfqData,
    item_id: &str,
    vendor_id: &str,
    value: Decimal,
    make: Option<&str>,
) -> RfqData {
    let item_id = ItemId(item_id.to_string());
    let vendor_id = VendorId(vendor_id.to_string());
    let rfq = rfq.with_quote(&item_id, &vendor_id, Some(value));
    match make {
        Some(make) => rfq.with_make(&item_id, &vendor_id, Some(make.to_string())),
        None => rfq,
    }
}

pub fn demo_category_document() -> ProcurementDocument {
    let rfq = RfqData::default().with_vendors(vec![
        VendorRef::new("V-ACME", "Acme Electricals"),
        VendorRef::new("V-BOLT", "Bolt Traders"),
        VendorRef::new("V-CORE", "Core Supplies"),
    ]);
    let rfq = quote(rfq, "CABLE-4SQMM", "V-ACME", Decimal::new(48, 0), Some("Polycab"));
    let rfq = quote(rfq, "CABLE-4SQMM", "V-BOLT", Decimal::new(4550, 2), Some("Havells"));
    let rfq = quote(rfq, "MCB-32A", "V-ACME", Decimal::new(310, 0), Some("Schneider"));
    let rfq = quote(rfq, "MCB-32A", "V-CORE", Decimal::new(295, 0), None);
    let rfq = quote(rfq, "DB-8WAY", "V-BOLT", Decimal::new(2450, 0), None);
    let rfq = quote(rfq, "DB-8WAY", "V-CORE", Decimal::new(2600, 0), Some("Legrand"));

    ProcurementDocument {
        id: DocumentId(DEMO_CATEGORY_DOCUMENT_ID.to_string()),
        project_id: ProjectId(DEMO_PROJECT_ID.to_string()),
        kind: DocumentKind::ProcurementRequest,
        category: Some("Electrical".to_string()),
        workflow_state: WorkflowState::VendorSelected,
        items: vec![
            item("CABLE-4SQMM", "4 sq mm copper cable", Decimal::new(100, 0), "m", Some("Wiring")),
            item("MCB-32A", "32A MCB", Decimal::new(12, 0), "nos", Some("Switchgear")),
            item("DB-8WAY", "8-way distribution board", Decimal::TWO, "nos", Some("Switchgear")),
        ],
        rfq,
        modified_by: Some("procurement@example.com".to_string()),
    }
}

pub fn demo_custom_document() -> ProcurementDocument {
    let rfq = RfqData::default().with_vendors(vec![VendorRef::new("V-BOLT", "Bolt Traders")]);
    let rfq = quote(rfq, "SITE-SIGNAGE", "V-BOLT", Decimal::new(1800, 0), None);

    ProcurementDocument {
        id: DocumentId(DEMO_CUSTOM_DOCUMENT_ID.to_string()),
        project_id: ProjectId(DEMO_PROJECT_ID.to_string()),
        kind: DocumentKind::ProcurementRequest,
        category: None,
        workflow_state: WorkflowState::VendorSelected,
        items: vec![item("SITE-SIGNAGE", "Site safety signage", Decimal::new(4, 0), "nos", None)],
        rfq,
        modified_by: Some("procurement@example.com".to_string()),
    }
}

fn seeded_at(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, 10, 0, 0).single().unwrap_or_else(Utc::now)
}

pub fn demo_history() -> Vec<ApprovedQuotation> {
    let record = |id: &str, item_id: &str, vendor: (&str, &str), quote: i64, at: DateTime<Utc>| {
        ApprovedQuotation {
            id: id.to_string(),
            item_id: ItemId(item_id.to_string()),
            vendor_id: VendorId(vendor.0.to_string()),
            vendor_name: vendor.1.to_string(),
            purchase_order_id: Some(format!("PO-HIST-{id}")),
            quantity: Decimal::new(50, 0),
            unit: (if item_id.starts_with("CABLE") { "m" } else { "nos" }).to_string(),
            quote: Decimal::new(quote, 0),
            created_at: at,
        }
    };

    vec![
        record("AQ-DEMO-1", "CABLE-4SQMM", ("V-ACME", "Acme Electricals"), 50, seeded_at(1, 5)),
        record("AQ-DEMO-2", "CABLE-4SQMM", ("V-BOLT", "Bolt Traders"), 47, seeded_at(2, 9)),
        record("AQ-DEMO-3", "CABLE-4SQMM", ("V-ACME", "Acme Electricals"), 49, seeded_at(3, 14)),
        record("AQ-DEMO-4", "MCB-32A", ("V-CORE", "Core Supplies"), 300, seeded_at(2, 20)),
        record("AQ-DEMO-5", "MCB-32A", ("V-ACME", "Acme Electricals"), 320, seeded_at(4, 2)),
    ]
}

#[cfg(test)]
mod tests {
    use super::{DemoDataset, DEMO_CATEGORY_DOCUMENT_ID};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn demo_dataset_loads_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let seeded = DemoDataset::load(&pool).await.expect("load");
        assert_eq!(seeded.documents_seeded.len(), 2);
        assert_eq!(seeded.documents_seeded[0].0, DEMO_CATEGORY_DOCUMENT_ID);
        assert_eq!(seeded.history_records, 5);

        DemoDataset::load(&pool).await.expect("reload is idempotent");

        let verification = DemoDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "checks: {:?}", verification.checks);
    }

    #[tokio::test]
    async fn verify_reports_missing_data_on_an_empty_database() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let verification = DemoDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
    }
}
