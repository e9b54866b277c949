use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use procura_core::domain::document::{DocumentId, ProcurementDocument, ProjectId};
use procura_core::gateway::{decode_document, encode_document, RawDocument};

use super::{DocumentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_raw(row: &SqliteRow) -> Result<RawDocument, RepositoryError> {
    let order_list: String = row.try_get("order_list")?;
    let rfq_data: String = row.try_get("rfq_data")?;

    Ok(RawDocument {
        id: row.try_get("id")?,
        project: row.try_get("project_id")?,
        kind: Some(row.try_get("kind")?),
        category: row.try_get("category")?,
        workflow_state: row.try_get("workflow_state")?,
        order_list: Value::String(order_list),
        rfq_data: Value::String(rfq_data),
        modified_by: row.try_get("modified_by")?,
    })
}

fn decode(raw: RawDocument) -> Result<ProcurementDocument, RepositoryError> {
    decode_document(raw).map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) async fn fetch_raw<'e, E>(
    executor: E,
    id: &DocumentId,
) -> Result<Option<RawDocument>, RepositoryError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, project_id, kind, category, workflow_state, order_list, rfq_data, modified_by
         FROM procurement_document WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_raw).transpose()
}

pub(crate) async fn fetch<'e, E>(
    executor: E,
    id: &DocumentId,
) -> Result<Option<ProcurementDocument>, RepositoryError>
where
    E: SqliteExecutor<'e>,
{
    fetch_raw(executor, id).await?.map(decode).transpose()
}

pub(crate) async fn upsert<'e, E>(
    executor: E,
    document: &ProcurementDocument,
) -> Result<(), RepositoryError>
where
    E: SqliteExecutor<'e>,
{
    let raw = encode_document(document);
    let order_list = serde_json::to_string(&raw.order_list)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let rfq_data = serde_json::to_string(&raw.rfq_data)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO procurement_document (id, project_id, kind, category, workflow_state,
                                           order_list, rfq_data, modified_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             project_id = excluded.project_id,
             kind = excluded.kind,
             category = excluded.category,
             workflow_state = excluded.workflow_state,
             order_list = excluded.order_list,
             rfq_data = excluded.rfq_data,
             modified_by = excluded.modified_by,
             updated_at = excluded.updated_at",
    )
    .bind(&raw.id)
    .bind(&raw.project)
    .bind(document.kind.as_str())
    .bind(&raw.category)
    .bind(&raw.workflow_state)
    .bind(order_list)
    .bind(rfq_data)
    .bind(&raw.modified_by)
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;

    Ok(())
}

/// Links a sent-back document to the document it came from, with the reviewer's comment.
pub(crate) async fn record_origin<'e, E>(
    executor: E,
    id: &DocumentId,
    source: Option<&DocumentId>,
    comment: Option<&str>,
) -> Result<(), RepositoryError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE procurement_document SET source_document_id = ?, comment = ? WHERE id = ?")
        .bind(source.map(|source| source.0.as_str()))
        .bind(comment)
        .bind(&id.0)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn count_derived_from<'e, E>(
    executor: E,
    source: &DocumentId,
) -> Result<i64, RepositoryError>
where
    E: SqliteExecutor<'e>,
{
    let count = sqlx::query(
        "SELECT COUNT(*) AS count FROM procurement_document WHERE source_document_id = ?",
    )
    .bind(&source.0)
    .fetch_one(executor)
    .await?
    .try_get::<i64, _>("count")?;
    Ok(count)
}

#[async_trait::async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn find_raw(&self, id: &DocumentId) -> Result<Option<RawDocument>, RepositoryError> {
        fetch_raw(&self.pool, id).await
    }

    async fn find(&self, id: &DocumentId) -> Result<Option<ProcurementDocument>, RepositoryError> {
        fetch(&self.pool, id).await
    }

    async fn save(&self, document: &ProcurementDocument) -> Result<(), RepositoryError> {
        upsert(&self.pool, document).await
    }

    async fn list_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<ProcurementDocument>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, project_id, kind, category, workflow_state, order_list, rfq_data, modified_by
             FROM procurement_document WHERE project_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(&project_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_raw(row).and_then(decode)).collect()
    }
}
