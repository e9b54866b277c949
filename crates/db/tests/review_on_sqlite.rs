use std::sync::Arc;

use rust_decimal::Decimal;

use procura_core::audit::InMemoryAuditSink;
use procura_core::draft::DraftStore;
use procura_core::{
    ActionRegistry, AggregationPolicy, DocumentId, ItemId, ItemStatus, Navigation,
    ReviewServices, ReviewSession, TargetRateResolver, VendorId, WorkflowState,
};
use procura_db::fixtures::DEMO_CATEGORY_DOCUMENT_ID;
use procura_db::repositories::{
    DocumentRepository, PurchaseOrderRepository, SqlDocumentRepository, SqlDraftStore,
    SqlPurchaseOrderRepository,
};
use procura_db::{connect_with_settings, migrations, DbPool, DemoDataset, LocalProcurementBackend};

type ReviewTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

fn item(id: &str) -> ItemId {
    ItemId(id.to_string())
}

fn vendor(id: &str) -> VendorId {
    VendorId(id.to_string())
}

async fn seeded_pool() -> ReviewTestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrations: {error}"))?;
    DemoDataset::load(&pool).await.map_err(|error| format!("seed: {error}"))?;
    Ok(pool)
}

fn services(pool: &DbPool) -> ReviewServices {
    let backend = Arc::new(LocalProcurementBackend::new(pool.clone()).with_actor("approver@example.com"));
    ReviewServices {
        gateway: backend.clone(),
        target_rates: Arc::new(TargetRateResolver::new(backend)),
        drafts: Arc::new(SqlDraftStore::new(pool.clone())),
        audit: Arc::new(InMemoryAuditSink::default()),
        actions: ActionRegistry::default(),
        policy: AggregationPolicy::default(),
    }
}

#[tokio::test]
async fn partial_then_full_approval_against_sqlite() -> ReviewTestResult {
    let pool = seeded_pool().await?;
    let document_id = DocumentId(DEMO_CATEGORY_DOCUMENT_ID.to_string());
    let drafts = SqlDraftStore::new(pool.clone());

    let mut session = ReviewSession::open(services(&pool), &document_id, "corr-sqlite-1", "approver")
        .await
        .map_err(|error| format!("open: {error}"))?;

    require_eq!(session.target_rates().rates.rate_for(&item("CABLE-4SQMM")), Some(Decimal::new(4867, 2)));
    require_eq!(session.target_rates().rates.rate_for(&item("DB-8WAY")), None::<Decimal>);

    session
        .set_quote(&item("CABLE-4SQMM"), &vendor("V-ACME"), "44")
        .await
        .map_err(|error| format!("set quote: {error}"))?;
    let draft = drafts.load(&document_id).await.map_err(|error| format!("load draft: {error}"))?;
    require!(draft.is_some(), "editing a quote should persist a draft");

    session
        .toggle_item(&vendor("V-ACME"), &item("CABLE-4SQMM"), true)
        .map_err(|error| format!("toggle cable: {error}"))?;
    session
        .toggle_item(&vendor("V-CORE"), &item("MCB-32A"), true)
        .map_err(|error| format!("toggle mcb: {error}"))?;

    let outcome = session.approve().await.map_err(|error| format!("first approve: {error}"))?;
    require_eq!(outcome.navigation, Navigation::Stay);
    require_eq!(outcome.remaining_pending, 1);
    require!(session.selection().is_empty(), "selection should be cleared after success");
    require_eq!(session.document().workflow_state, WorkflowState::PartiallyApproved);

    let stored = SqlDocumentRepository::new(pool.clone())
        .find(&document_id)
        .await
        .map_err(|error| format!("find: {error}"))?
        .ok_or_else(|| "document should exist".to_string())?;
    let cable = stored.item(&item("CABLE-4SQMM")).ok_or_else(|| "cable row".to_string())?;
    require_eq!(cable.status, ItemStatus::Approved);
    require_eq!(cable.quote, Some(Decimal::new(44, 0)));

    session.toggle_vendor(&vendor("V-BOLT"), true);
    require_eq!(session.selection().pair_count(), 1);

    let outcome = session.approve().await.map_err(|error| format!("second approve: {error}"))?;
    require_eq!(outcome.navigation, Navigation::Leave);
    require_eq!(outcome.remaining_pending, 0);

    let draft = drafts.load(&document_id).await.map_err(|error| format!("load draft: {error}"))?;
    require!(draft.is_none(), "draft should be cleared once the document is done");

    let orders = SqlPurchaseOrderRepository::new(pool)
        .list_for_document(&document_id)
        .await
        .map_err(|error| format!("orders: {error}"))?;
    require_eq!(orders.len(), 3);
    Ok(())
}

#[tokio::test]
async fn category_send_back_from_a_session_keeps_other_items_pending() -> ReviewTestResult {
    let pool = seeded_pool().await?;
    let document_id = DocumentId(DEMO_CATEGORY_DOCUMENT_ID.to_string());

    let mut session = ReviewSession::open(services(&pool), &document_id, "corr-sqlite-2", "approver")
        .await
        .map_err(|error| format!("open: {error}"))?;
    session
        .toggle_item(&vendor("V-CORE"), &item("DB-8WAY"), true)
        .map_err(|error| format!("toggle: {error}"))?;

    let outcome = session
        .send_back(Some("needs a second make".to_string()))
        .await
        .map_err(|error| format!("send back: {error}"))?;

    require_eq!(outcome.navigation, Navigation::Stay);
    require_eq!(outcome.remaining_pending, 2);
    require!(session.read_only_notice().is_none(), "two items are still pending");

    let sent_back = SqlDocumentRepository::new(pool)
        .find(&DocumentId(format!("{DEMO_CATEGORY_DOCUMENT_ID}-SB1")))
        .await
        .map_err(|error| format!("find: {error}"))?;
    require!(sent_back.is_some(), "a sent-back document should be raised");
    Ok(())
}
