use anyhow::Context;
use clap::Args;

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::state::AppState;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, help = "Port to listen on (overrides PORT)")]
    pub port: Option<u16>,

    #[arg(long, help = "Keep all data in process memory instead of Postgres")]
    pub in_memory: bool,
}

pub async fn handle(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    tracing::info!("Starting Natours API in {:?} mode", config.environment);

    let state = if args.in_memory {
        tracing::warn!("Serving from the in-memory store; data is lost on exit");
        AppState::in_memory(config)
    } else {
        let database = DatabaseManager::connect(&config.database)
            .await
            .context("failed to connect to the database")?;
        database.migrate().await.context("failed to apply migrations")?;
        AppState::postgres(config, &database)
    };

    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Natours API listening on http://{}", bind_addr);

    crate::serve(listener, state).await.context("server error")
}
