use procura_core::config::AppConfig;
use procura_db::{DbPool, DemoDataset, SeedResult, VerificationResult};
use serde_json::json;
use tracing::info;

use super::context::open_pool;
use super::{execute, CommandFailure, CommandResult, GlobalOptions};

/// Loads the demo project and checks that it landed.
pub fn run(options: &GlobalOptions) -> CommandResult {
    execute("seed", options, seed)
}

async fn seed(config: AppConfig) -> Result<CommandResult, CommandFailure> {
    let pool = open_pool(&config).await?;
    let outcome = load_and_verify(&pool).await;
    pool.close().await;
    let (seeded, verification) = outcome?;

    if !verification.all_present {
        let missing: Vec<_> =
            verification.checks.iter().filter(|(_, ok)| !ok).map(|(name, _)| *name).collect();
        return Err(("verification", format!("seed verification failed: {missing:?}"), 6u8));
    }

    info!(
        event_name = "cli.seed.completed",
        documents = seeded.documents_seeded.len(),
        history_records = seeded.history_records,
        "demo dataset loaded"
    );

    Ok(CommandResult::success_with_data(
        "seed",
        format!(
            "seeded {} document(s) and {} approved quote(s)",
            seeded.documents_seeded.len(),
            seeded.history_records
        ),
        Some(json!({ "documents": seeded.documents_seeded })),
    ))
}

async fn load_and_verify(
    pool: &DbPool,
) -> Result<(SeedResult, VerificationResult), CommandFailure> {
    let seeded =
        DemoDataset::load(pool).await.map_err(|error| ("seed", error.to_string(), 4u8))?;
    let verification = DemoDataset::verify(pool)
        .await
        .map_err(|error| ("verification", error.to_string(), 6u8))?;
    Ok((seeded, verification))
}
