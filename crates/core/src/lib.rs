//! Liquidation and bidding engine core.
//!
//! This crate provides the engine's semantics:
//! - Position risk evaluation with fee-curve revenue reporting
//! - Premium-bucketed single-asset bid queues (slots 0..=9)
//! - The FIFO omni-asset stability pool with the unstake delay
//! - Claim aggregation into one batched transaction
//! - Scan/evaluate/execute orchestration over the api and chain crates
//!
//! All state here is snapshot-derived and passed by reference; the chain
//! is the sole source of truth and every state transition is expressed as
//! a message intent it applies authoritatively.

mod bid_queue;
mod claims;
pub mod config;
mod engine;
mod error;
pub mod math;
mod position;
mod risk;
mod stability_pool;

pub use bid_queue::{Bid, BidFill, BidQueues, FillOutcome, PREMIUM_SLOTS};
pub use claims::{
    ClaimAggregator, ClaimAvailability, ClaimInputs, ClaimSummary, Claimable, SubClaim,
};
pub use config::{ContractsConfig, EngineConfig, PROFILE_ENV};
pub use engine::{LiquidationEngine, Snapshot};
pub use error::EngineError;
pub use position::{
    BasketConfig, CollateralEntry, CollateralType, InterestRate, LiquidationFeeCurve, Position,
    PriceEntry, PriceMap, CREDIT_DECIMALS,
};
pub use risk::{LiquidationCandidate, PositionRiskEvaluator, RiskReport};
pub use stability_pool::{
    Deposit, PoolAbsorption, PoolFill, StabilityPool, POOL_PREMIUM_PCT, UNSTAKE_DELAY_SECS,
};
