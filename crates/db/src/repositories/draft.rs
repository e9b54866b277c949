use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteExecutor};
use tracing::debug;

use procura_core::domain::document::DocumentId;
use procura_core::domain::rfq::RfqData;
use procura_core::draft::{DraftStore, DraftStoreError};

use crate::DbPool;

/// RFQ drafts kept in the same database as the documents they belong to.
#[derive(Clone)]
pub struct SqlDraftStore {
    pool: DbPool,
}

impl SqlDraftStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn storage(error: sqlx::Error) -> DraftStoreError {
    DraftStoreError::Storage(error.to_string())
}

pub(crate) async fn fetch_draft<'e, E>(
    executor: E,
    id: &DocumentId,
) -> Result<Option<RfqData>, DraftStoreError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT payload FROM rfq_draft WHERE document_id = ?")
        .bind(&id.0)
        .fetch_optional(executor)
        .await
        .map_err(storage)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let payload: String = row.try_get("payload").map_err(storage)?;
    serde_json::from_str(&payload)
        .map(Some)
        .map_err(|error| DraftStoreError::Decode(error.to_string()))
}

pub(crate) async fn delete_draft<'e, E>(executor: E, id: &DocumentId) -> Result<(), DraftStoreError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("DELETE FROM rfq_draft WHERE document_id = ?")
        .bind(&id.0)
        .execute(executor)
        .await
        .map_err(storage)?;
    Ok(())
}

#[async_trait]
impl DraftStore for SqlDraftStore {
    async fn load(&self, id: &DocumentId) -> Result<Option<RfqData>, DraftStoreError> {
        fetch_draft(&self.pool, id).await
    }

    async fn save(&self, id: &DocumentId, rfq: &RfqData) -> Result<(), DraftStoreError> {
        let payload = serde_json::to_string(rfq)
            .map_err(|error| DraftStoreError::Storage(error.to_string()))?;

        sqlx::query(
            "INSERT INTO rfq_draft (document_id, payload, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(document_id) DO UPDATE SET
                 payload = excluded.payload,
                 updated_at = excluded.updated_at",
        )
        .bind(&id.0)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        debug!(event_name = "draft.saved", document_id = %id, "rfq draft saved");
        Ok(())
    }

    async fn clear(&self, id: &DocumentId) -> Result<(), DraftStoreError> {
        delete_draft(&self.pool, id).await?;

        debug!(event_name = "draft.cleared", document_id = %id, "rfq draft cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use procura_core::domain::document::{DocumentId, ItemId};
    use procura_core::domain::rfq::RfqData;
    use procura_core::domain::vendor::{VendorId, VendorRef};
    use procura_core::draft::{DraftStore, DraftStoreError};
    use rust_decimal::Decimal;

    use super::SqlDraftStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> (SqlDraftStore, sqlx::SqlitePool) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        (SqlDraftStore::new(pool.clone()), pool)
    }

    fn rfq(quote: i64) -> RfqData {
        RfqData::default().with_vendors(vec![VendorRef::new("V-1", "Acme")]).with_quote(
            &ItemId("A".to_string()),
            &VendorId("V-1".to_string()),
            Some(Decimal::new(quote, 0)),
        )
    }

    #[tokio::test]
    async fn save_overwrites_and_clear_removes() {
        let (store, _pool) = store().await;
        let id = DocumentId("PR-1".to_string());

        assert_eq!(store.load(&id).await.expect("empty load"), None);

        store.save(&id, &rfq(10)).await.expect("first save");
        store.save(&id, &rfq(12)).await.expect("second save");
        assert_eq!(store.load(&id).await.expect("load"), Some(rfq(12)));

        store.clear(&id).await.expect("clear");
        assert_eq!(store.load(&id).await.expect("load after clear"), None);
    }

    #[tokio::test]
    async fn drafts_are_isolated_per_document() {
        let (store, _pool) = store().await;
        store.save(&DocumentId("PR-1".to_string()), &rfq(10)).await.expect("save");

        assert_eq!(store.load(&DocumentId("PR-2".to_string())).await.expect("load"), None);
    }

    #[tokio::test]
    async fn unreadable_payload_is_a_decode_error() {
        let (store, pool) = store().await;
        sqlx::query("INSERT INTO rfq_draft (document_id, payload, updated_at) VALUES ('PR-1', '{oops', '')")
            .execute(&pool)
            .await
            .expect("insert corrupt draft");

        let result = store.load(&DocumentId("PR-1".to_string())).await;
        assert!(matches!(result, Err(DraftStoreError::Decode(_))));
    }
}
