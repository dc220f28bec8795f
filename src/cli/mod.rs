pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "natours")]
#[command(about = "Natours - tour booking API server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the HTTP API server")]
    Serve(commands::serve::ServeArgs),

    #[command(about = "Apply pending database migrations")]
    Migrate,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => commands::serve::handle(args).await,
        Commands::Migrate => commands::migrate::handle().await,
    }
}
