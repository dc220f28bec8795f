use anyhow::Context;

use crate::config::AppConfig;
use crate::database::DatabaseManager;

pub async fn handle() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    let database = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the database")?;
    database.migrate().await.context("failed to apply migrations")?;
    database.close().await;
    println!("Migrations applied");
    Ok(())
}
