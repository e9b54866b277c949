use procura_core::aggregation::saturating_total;
use procura_core::config::AppConfig;
use procura_core::domain::document::DocumentId;
use procura_db::repositories::{PurchaseOrderRepository, SqlPurchaseOrderRepository};
use serde_json::json;

use super::context::open_pool;
use super::{execute, CommandFailure, CommandResult, GlobalOptions};

/// Purchase orders the local backend raised for a document.
pub fn run(options: &GlobalOptions, document_id: &str) -> CommandResult {
    execute("orders", options, |config| list(config, document_id))
}

async fn list(config: AppConfig, document_id: &str) -> Result<CommandResult, CommandFailure> {
    let pool = open_pool(&config).await?;
    let orders = SqlPurchaseOrderRepository::new(pool.clone())
        .list_for_document(&DocumentId(document_id.to_string()))
        .await
        .map_err(|error| ("persistence", error.to_string(), 4u8));
    pool.close().await;
    let orders = orders?;

    let total = saturating_total(orders.iter().map(|order| order.total_amount()));
    let rendered: Vec<_> = orders
        .iter()
        .map(|order| json!({ "order": order, "total_amount": order.total_amount() }))
        .collect();

    Ok(CommandResult::success_with_data(
        "orders",
        format!("{} purchase order(s) for {document_id}", orders.len()),
        Some(json!({ "orders": rendered, "total_amount": total })),
    ))
}
