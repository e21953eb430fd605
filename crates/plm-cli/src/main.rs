//! plm-cli entry point.
//!
//! Operator-facing commands: `migrate` (apply pending SQLx migrations) and
//! `recalc` (trigger `RecalculateScope` over a named group range). Both talk
//! to Postgres directly through `plm-db`/`plm-ingestion`, the same as the
//! daemon, rather than going over HTTP.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "plm")]
#[command(about = "Payment-limit monitor operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending SQLx migrations.
    Migrate,

    /// Compute layered config hash + print canonical JSON.
    ConfigHash {
        /// Paths in merge order (base -> environment overlay).
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Trigger RecalculateScope over a pts/processing_entity/counterparty/date-range scope.
    Recalc {
        /// Omit to target every pts.
        #[arg(long)]
        pts: Option<String>,

        /// Omit to target every processing_entity.
        #[arg(long)]
        processing_entity: Option<String>,

        /// Omit to target every counterparty under the entity.
        #[arg(long)]
        counterparty_id: Option<String>,

        #[arg(long)]
        value_date_from: NaiveDate,

        #[arg(long)]
        value_date_to: NaiveDate,

        #[arg(long)]
        user_id: String,

        #[arg(long)]
        reason: String,

        /// Required when the scope matches one or more existing groups.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Migrate => commands::migrate().await?,
        Commands::ConfigHash { paths } => commands::config_hash(&paths)?,
        Commands::Recalc {
            pts,
            processing_entity,
            counterparty_id,
            value_date_from,
            value_date_to,
            user_id,
            reason,
            yes,
        } => {
            commands::recalc(commands::RecalcArgs {
                pts,
                processing_entity,
                counterparty_id,
                value_date_from,
                value_date_to,
                user_id,
                reason,
                yes,
            })
            .await?
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
