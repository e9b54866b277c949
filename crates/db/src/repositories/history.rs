use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use procura_core::domain::document::ItemId;
use procura_core::domain::vendor::VendorId;

use super::{parse_decimal, parse_timestamp, ApprovedQuotation, QuotationHistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuotationHistoryRepository {
    pool: DbPool,
}

impl SqlQuotationHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_quotation(row: &SqliteRow) -> Result<ApprovedQuotation, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let quote: String = row.try_get("quote")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ApprovedQuotation {
        id: row.try_get("id")?,
        item_id: ItemId(row.try_get("item_id")?),
        vendor_id: VendorId(row.try_get("vendor_id")?),
        vendor_name: row.try_get("vendor_name")?,
        purchase_order_id: row.try_get("purchase_order_id")?,
        quantity: parse_decimal(&quantity, "quantity")?,
        unit: row.try_get("unit")?,
        quote: parse_decimal(&quote, "quote")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

/// Inserts one history row; re-recording the same id is a no-op.
pub(crate) async fn insert_quotation<'e, E>(
    executor: E,
    quotation: &ApprovedQuotation,
) -> Result<(), RepositoryError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO approved_quotation (id, item_id, vendor_id, vendor_name, purchase_order_id,
                                         quantity, unit, quote, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(&quotation.id)
    .bind(&quotation.item_id.0)
    .bind(&quotation.vendor_id.0)
    .bind(&quotation.vendor_name)
    .bind(&quotation.purchase_order_id)
    .bind(quotation.quantity.to_string())
    .bind(&quotation.unit)
    .bind(quotation.quote.to_string())
    .bind(quotation.created_at.to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl QuotationHistoryRepository for SqlQuotationHistoryRepository {
    async fn record(&self, quotations: &[ApprovedQuotation]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for quotation in quotations {
            insert_quotation(&mut *tx, quotation).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn recent_for_item(
        &self,
        item_id: &ItemId,
        limit: u32,
    ) -> Result<Vec<ApprovedQuotation>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, item_id, vendor_id, vendor_name, purchase_order_id, quantity, unit, quote,
                    created_at
             FROM approved_quotation
             WHERE item_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(&item_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_quotation).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use procura_core::domain::document::ItemId;
    use procura_core::domain::vendor::VendorId;
    use rust_decimal::Decimal;

    use super::SqlQuotationHistoryRepository;
    use crate::repositories::{ApprovedQuotation, QuotationHistoryRepository};
    use crate::{connect_with_settings, migrations};

    fn quotation(index: i64, item: &str, quote: i64) -> ApprovedQuotation {
        ApprovedQuotation {
            id: format!("AQ-{index}"),
            item_id: ItemId(item.to_string()),
            vendor_id: VendorId("V-1".to_string()),
            vendor_name: "Acme".to_string(),
            purchase_order_id: Some(format!("PO-{index}")),
            quantity: Decimal::TEN,
            unit: "nos".to_string(),
            quote: Decimal::new(quote, 0),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).single().expect("timestamp")
                + Duration::days(index),
        }
    }

    #[tokio::test]
    async fn recent_for_item_is_newest_first_and_limited() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlQuotationHistoryRepository::new(pool);

        repo.record(&[
            quotation(1, "A", 100),
            quotation(2, "A", 110),
            quotation(3, "A", 120),
            quotation(4, "B", 999),
        ])
        .await
        .expect("record");

        let recent = repo.recent_for_item(&ItemId("A".to_string()), 2).await.expect("recent");

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].quote, Decimal::new(120, 0));
        assert_eq!(recent[1].quote, Decimal::new(110, 0));
        assert_eq!(recent[0].purchase_order_id.as_deref(), Some("PO-3"));
    }

    #[tokio::test]
    async fn recording_the_same_quotation_twice_keeps_one_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlQuotationHistoryRepository::new(pool);

        repo.record(&[quotation(1, "A", 100)]).await.expect("first");
        repo.record(&[quotation(1, "A", 100)]).await.expect("second");

        let recent = repo.recent_for_item(&ItemId("A".to_string()), 10).await.expect("recent");
        assert_eq!(recent.len(), 1);
    }
}
