//! Standalone schema-migration runner, invoked out-of-band from the
//! server binary (deploy tooling, operator shell).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crawlctl_core::config::Config;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Runs crawlctl's Postgres schema migrations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Up,
    /// Report applied vs. pending migrations
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Commands::Up => {
            sqlx::migrate!("./migrations").run(&pool).await.context("migration run failed")?;
            println!("migrations applied");
        }
        Commands::Status => {
            let applied = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM _sqlx_migrations")
                .fetch_one(&pool)
                .await
                .unwrap_or(0);
            println!("{applied} migrations applied");
        }
    }

    Ok(())
}
