//! EstateShare Simulator
//!
//! Drives the ledger engine with concurrent investors and checks the share
//! supply invariant after every phase.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod controller;
mod investor;
mod metrics;
mod scenario;

use estateshare_common::SharePrice;
use estateshare_ledger::{
    DatabaseConfig, IdentityResolver, LedgerConfig, LedgerStore, MemoryStore, PgStore,
};

use controller::{SimulationController, SimulationSettings};
use scenario::Scenario;

/// EstateShare Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "EstateShare ledger load and fault simulation")]
struct Args {
    /// Number of simulated investors
    #[arg(short, long, default_value = "8")]
    investors: usize,

    /// Number of properties to list
    #[arg(short, long, default_value = "3")]
    properties: usize,

    /// Shares minted per property
    #[arg(long, default_value = "1000")]
    shares: i64,

    /// Price per share
    #[arg(long, default_value = "25.00")]
    price: String,

    /// Scenario to run (sellout, race, churn, outage)
    #[arg(short, long, default_value = "churn")]
    scenario: String,

    /// Random trades for the churn and outage scenarios
    #[arg(short, long, default_value = "200")]
    trades: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// PostgreSQL URL; the in-memory store is used when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = LedgerConfig::from_env();
    if let Some(url) = &args.database_url {
        let mut database = config.database.take().unwrap_or_default();
        database.url = url.clone();
        config.database = Some(database);
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let settings = SimulationSettings {
        investors: args.investors,
        properties: args.properties,
        shares_per_property: args.shares,
        price_per_share: SharePrice::parse(&args.price)?,
        seed: args.seed,
    };
    let scenario = Scenario::load(&args.scenario, args.trades)?;

    info!("Starting EstateShare Simulator");
    info!("Investors: {}", settings.investors);
    info!("Properties: {} x {} shares", settings.properties, settings.shares_per_property);

    match config.database.clone() {
        Some(database) => {
            let store = Arc::new(connect(&database).await?);
            let controller = SimulationController::new(store, config, settings);
            run(controller, &scenario).await
        }
        None => {
            let store = Arc::new(MemoryStore::new());
            let controller = SimulationController::new(Arc::clone(&store), config, settings)
                .with_fault_injection(store);
            run(controller, &scenario).await
        }
    }
}

async fn connect(database: &DatabaseConfig) -> anyhow::Result<PgStore> {
    let store = PgStore::connect(database).await?;
    store.migrate().await?;
    info!("Connected to PostgreSQL");
    Ok(store)
}

async fn run<S>(mut controller: SimulationController<S>, scenario: &Scenario) -> anyhow::Result<()>
where
    S: LedgerStore + IdentityResolver + 'static,
{
    controller.initialize().await?;
    controller.run_scenario(scenario).await?;

    // Print metrics
    let metrics = controller.get_metrics();
    info!("Simulation complete");
    info!("Total trades: {}", metrics.total_trades);
    info!("Committed: {}", metrics.committed_trades);
    info!("Rejected: {}", metrics.rejected_trades);
    info!("Failed: {}", metrics.failed_trades);
    info!("Success rate: {:.1}%", metrics.success_rate() * 100.0);
    info!(
        "Latency: avg {}us, p50 {}us, p99 {}us",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    println!("{}", serde_json::to_string_pretty(metrics)?);
    print!("{}", controller.ledger_metrics());

    if metrics.invariant_violations > 0 {
        anyhow::bail!(
            "{} share supply invariant violations detected",
            metrics.invariant_violations
        );
    }

    Ok(())
}
