use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use procura_core::config::AppConfig;
use procura_core::domain::document::ProcurementDocument;
use procura_db::repositories::{DocumentRepository, SqlDocumentRepository};
use serde_json::json;

use super::context::open_pool;
use super::{execute, CommandFailure, CommandResult, GlobalOptions};

/// Loads a procurement document from a JSON file into the local database, replacing any
/// stored copy with the same id.
pub fn run(options: &GlobalOptions, path: &Path) -> CommandResult {
    let document = match read_document(path) {
        Ok(document) => document,
        Err(error) => {
            return CommandResult::failure("import", "validation", format!("{error:#}"), 8);
        }
    };

    execute("import", options, |config| save(config, document))
}

async fn save(
    config: AppConfig,
    document: ProcurementDocument,
) -> Result<CommandResult, CommandFailure> {
    let pool = open_pool(&config).await?;
    let saved = SqlDocumentRepository::new(pool.clone())
        .save(&document)
        .await
        .map_err(|error| ("persistence", error.to_string(), 4u8));
    pool.close().await;
    saved?;

    Ok(CommandResult::success_with_data(
        "import",
        format!("imported {}", document.id),
        Some(json!({
            "document_id": document.id,
            "items": document.items.len(),
            "pending": document.pending_count(),
        })),
    ))
}

fn read_document(path: &Path) -> anyhow::Result<ProcurementDocument> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;
    let document: ProcurementDocument = serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not a procurement document", path.display()))?;

    if document.id.0.trim().is_empty() {
        bail!("document id must not be empty");
    }
    let mut seen = std::collections::BTreeSet::new();
    for item in &document.items {
        if !seen.insert(&item.item_id) {
            bail!("item `{}` appears more than once", item.item_id);
        }
    }
    Ok(document)
}
