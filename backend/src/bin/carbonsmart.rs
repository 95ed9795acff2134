//! Admin CLI: seeding, chain status and credit approvals

use anyhow::{bail, Context, Result};
use carbonsmart_backend::chain::{
    approve_all_credits, approve_credit, ledger_from_config, ApprovalOutcome, ChainConfig,
};
use carbonsmart_backend::config::DatabaseConfig;
use carbonsmart_backend::database::{create_pool, run_migrations};
use carbonsmart_backend::repositories::{ActivityRepository, GoalRepository, UserRepository};
use carbonsmart_backend::services::SeedService;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "carbonsmart", version, about = "CarbonSmart admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the database with the demo account, activities and goals
    Seed,
    /// Show the chain connection status
    Status,
    /// List the carbon credits owned by a wallet
    Credits {
        /// Wallet address (0x...)
        wallet: String,
    },
    /// Approve the marketplace operator for one credit
    Approve {
        #[arg(long)]
        token_id: u64,
        /// Operator address (0x...)
        #[arg(long)]
        operator: String,
        /// Private key of the credit owner
        #[arg(long, env = "OWNER_PRIVATE_KEY", hide_env_values = true)]
        owner_key: String,
    },
    /// Approve the marketplace operator for every credit of the owner
    ApproveAll {
        #[arg(long)]
        operator: String,
        #[arg(long, env = "OWNER_PRIVATE_KEY", hide_env_values = true)]
        owner_key: String,
    },
}

fn print_outcome(outcome: &ApprovalOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    if !outcome.success {
        bail!(
            "approval failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carbonsmart_backend=info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Seed => {
            let db_config = DatabaseConfig::from_env().map_err(anyhow::Error::msg)?;
            let pool = create_pool(&db_config)
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;

            let seed = SeedService::new(
                Arc::new(UserRepository::new(pool.clone())),
                Arc::new(ActivityRepository::new(pool.clone())),
                Arc::new(GoalRepository::new(pool)),
            );
            let report = seed.run().await?;
            println!(
                "Seeded {} users, {} activities, {} goals",
                report.users, report.activities, report.goals
            );
        }
        Commands::Status => {
            let ledger = ledger_from_config(ChainConfig::from_env().map_err(anyhow::Error::msg)?)?;
            let status = ledger.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Credits { wallet } => {
            let ledger = ledger_from_config(ChainConfig::from_env().map_err(anyhow::Error::msg)?)?;
            let credits = ledger.user_credits(&wallet).await?;
            println!("{} credits owned by {}", credits.len(), wallet);
            for credit in &credits {
                println!(
                    "  #{:<6} {:>10.3} kg  {:<18} minted at {}",
                    credit.token_id, credit.co2_amount_kg, credit.activity_type, credit.timestamp
                );
            }
        }
        Commands::Approve {
            token_id,
            operator,
            owner_key,
        } => {
            let ledger = ledger_from_config(ChainConfig::from_env().map_err(anyhow::Error::msg)?)?;
            let outcome = approve_credit(ledger.as_ref(), &owner_key, &operator, token_id).await;
            print_outcome(&outcome)?;
        }
        Commands::ApproveAll {
            operator,
            owner_key,
        } => {
            let ledger = ledger_from_config(ChainConfig::from_env().map_err(anyhow::Error::msg)?)?;
            let outcome = approve_all_credits(ledger.as_ref(), &owner_key, &operator).await;
            print_outcome(&outcome)?;
        }
    }

    Ok(())
}
