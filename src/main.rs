//! CDP Liquidation & Bidding Engine
//!
//! Client-side engine for a collateralized-debt-position protocol:
//! - Position risk scanning with fee-curve revenue reporting
//! - Premium-queue and stability-pool state models
//! - Batched claim aggregation
//! - Simulate/fee-buffer/sign/broadcast transaction pipeline

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bidder_api::{IndexerClient, InvalidationBus};
use bidder_chain::{GasPolicyTable, HttpSigner, TransactionPipeline};
use bidder_core::{EngineConfig, LiquidationEngine};

/// Environment variable names.
mod env {
    pub const SIGNER_URL: &str = "SIGNER_URL";
    pub const LCD_URL: &str = "LCD_URL";
    pub const SIGNER_ADDRESS: &str = "SIGNER_ADDRESS";
    pub const GAS_POLICY_FILE: &str = "GAS_POLICY_FILE";
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bidder_core=debug,bidder_chain=debug")),
        )
        .init();

    // Engine config: profile via ENGINE_PROFILE (testing, production, or
    // a TOML file path)
    let config = EngineConfig::from_env();
    config.log_config();

    // Optional per-chain gas policy table
    let gas_policies = match std::env::var(env::GAS_POLICY_FILE) {
        Ok(path) => {
            let table = GasPolicyTable::from_file(&path)?;
            info!(path, "gas policy table loaded");
            table
        }
        Err(_) => GasPolicyTable::new(),
    };

    // Remote signer + broadcast endpoint
    let signer = Arc::new(HttpSigner::new(
        get_env(env::SIGNER_URL)?,
        get_env(env::LCD_URL)?,
        get_env(env::SIGNER_ADDRESS)?,
    ));

    let pipeline = Arc::new(TransactionPipeline::new(
        signer,
        gas_policies,
        config.chain_id.clone(),
    ));

    let source = Arc::new(IndexerClient::new(config.indexer_url.clone()));
    let bus = Arc::new(InvalidationBus::new());

    let engine = LiquidationEngine::new(source, pipeline, bus, config);

    info!("Starting scan loop");
    engine.run().await
}

fn get_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("Missing env var: {}", name))
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╔╗ ╦╔╦╗╔╦╗╔═╗╦═╗
    ╠╩╗║ ║║ ║║║╣ ╠╦╝
    ╚═╝╩═╩╝═╩╝╚═╝╩╚═
    CDP Liquidation Engine v0.1.0
    "#
    );
}
