//! Read collaborators and caching for the liquidation engine.
//!
//! This crate provides:
//! - A REST indexer client behind the [`SnapshotSource`] seam
//! - A single-flight query cache keyed by stable strings
//! - The invalidation bus that stales dependent reads after a broadcast

mod cache;
mod client;

pub use cache::{InvalidationBus, QueryCache, QueryKey};
pub use client::{
    BasketDto, BidDto, CoinDto, CollateralTypeDto, DepositDto, FeeCurveDto, IndexerClient,
    InterestRateDto, PositionDto, PriceDto, SnapshotSource, StakingDto,
};
