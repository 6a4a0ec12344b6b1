mod catalog;
mod sync;

use clap::{Parser, Subcommand};
use kdeal_core::AppConfig;
use tracing_subscriber::EnvFilter;

use crate::catalog::CatalogCommands;
use crate::sync::SyncCommands;

#[derive(Debug, Parser)]
#[command(name = "kdeal")]
#[command(about = "KortingDeal catalog and feed sync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run and inspect feed syncs
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect the storefront catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database answers
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert the category taxonomy from the categories file
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("kdeal: no command given; run `kdeal --help`");
        return Ok(());
    };

    let config = kdeal_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Db { command } => run_db(&config, command).await,
        Commands::Sync { command } => sync::run_sync(&config, command).await,
        Commands::Catalog { command } => catalog::run_catalog(&config, command).await,
    }
}

pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    Ok(kdeal_db::connect_pool_from_app_config(config).await?)
}

async fn run_db(config: &AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    match command {
        DbCommands::Ping => {
            kdeal_db::health_check(&pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = kdeal_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Seed => {
            let file = kdeal_core::load_categories(&config.categories_path)?;
            let seeded = kdeal_db::seed_categories(&pool, &file.categories).await?;
            println!(
                "seeded {seeded} categories from {}",
                config.categories_path.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
