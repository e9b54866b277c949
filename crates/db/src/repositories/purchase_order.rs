use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use procura_core::domain::document::{DocumentId, ItemId, ProjectId};
use procura_core::domain::vendor::VendorId;

use super::{
    parse_decimal, parse_timestamp, PurchaseOrder, PurchaseOrderLine, PurchaseOrderRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlPurchaseOrderRepository {
    pool: DbPool,
}

impl SqlPurchaseOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_line(row: &SqliteRow) -> Result<PurchaseOrderLine, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let quote: String = row.try_get("quote")?;

    Ok(PurchaseOrderLine {
        item_id: ItemId(row.try_get("item_id")?),
        item_name: row.try_get("item_name")?,
        quantity: parse_decimal(&quantity, "quantity")?,
        unit: row.try_get("unit")?,
        quote: parse_decimal(&quote, "quote")?,
        make: row.try_get("make")?,
    })
}

/// Next sequential order number, `PO-00001` onwards.
pub(crate) async fn next_purchase_order_id(
    conn: &mut SqliteConnection,
) -> Result<String, RepositoryError> {
    let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM purchase_order")
        .fetch_one(&mut *conn)
        .await?
        .try_get("count")?;
    Ok(format!("PO-{:05}", count + 1))
}

pub(crate) async fn insert_purchase_order(
    conn: &mut SqliteConnection,
    order: &PurchaseOrder,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO purchase_order (id, document_id, project_id, vendor_id, vendor_name,
                                     total_amount, created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.id)
    .bind(&order.document_id.0)
    .bind(&order.project_id.0)
    .bind(&order.vendor_id.0)
    .bind(&order.vendor_name)
    .bind(order.total_amount().to_string())
    .bind(&order.created_by)
    .bind(order.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    for line in &order.lines {
        sqlx::query(
            "INSERT INTO purchase_order_line (purchase_order_id, item_id, item_name, quantity,
                                              unit, quote, make)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(&line.item_id.0)
        .bind(&line.item_name)
        .bind(line.quantity.to_string())
        .bind(&line.unit)
        .bind(line.quote.to_string())
        .bind(&line.make)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl PurchaseOrderRepository for SqlPurchaseOrderRepository {
    async fn save(&self, order: &PurchaseOrder) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_purchase_order(&mut *tx, order).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<PurchaseOrder>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, document_id, project_id, vendor_id, vendor_name, created_by, created_at
             FROM purchase_order WHERE document_id = ? ORDER BY id ASC",
        )
        .bind(&document_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let created_at: String = row.try_get("created_at")?;
            let lines: Vec<SqliteRow> = sqlx::query(
                "SELECT item_id, item_name, quantity, unit, quote, make
                 FROM purchase_order_line WHERE purchase_order_id = ? ORDER BY item_id ASC",
            )
            .bind(&id)
            .fetch_all(&self.pool)
            .await?;

            orders.push(PurchaseOrder {
                document_id: DocumentId(row.try_get("document_id")?),
                project_id: ProjectId(row.try_get("project_id")?),
                vendor_id: VendorId(row.try_get("vendor_id")?),
                vendor_name: row.try_get("vendor_name")?,
                lines: lines.iter().map(row_to_line).collect::<Result<Vec<_>, _>>()?,
                created_by: row.try_get("created_by")?,
                created_at: parse_timestamp(&created_at, "created_at")?,
                id,
            });
        }

        Ok(orders)
    }
}
