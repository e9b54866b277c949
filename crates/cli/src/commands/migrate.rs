use procura_core::config::AppConfig;
use procura_db::{connect_with_config, migrations};

use super::{execute, CommandFailure, CommandResult, GlobalOptions};

pub fn run(options: &GlobalOptions) -> CommandResult {
    execute("migrate", options, migrate)
}

async fn migrate(config: AppConfig) -> Result<CommandResult, CommandFailure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    let applied =
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8));
    pool.close().await;
    applied?;
    Ok(CommandResult::success("migrate", "applied pending migrations"))
}
