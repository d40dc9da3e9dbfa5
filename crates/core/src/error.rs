//! Engine-internal invariant violations.
//!
//! These are rejected synchronously at the call boundary, before any
//! message is derived, so an invalid action can never reach the chain.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid premium slot {premium}, valid slots are 0..=9")]
    InvalidPremium { premium: u8 },

    #[error("bid amount must be greater than zero")]
    ZeroBidAmount,

    #[error("deposit amount must be greater than zero")]
    ZeroDepositAmount,

    #[error("bid {0} not found")]
    BidNotFound(u64),

    #[error("cannot retract {requested}, bid has {remaining} remaining")]
    RetractExceedsRemaining { requested: u128, remaining: u128 },

    #[error("deposit {0} not found")]
    DepositNotFound(u64),

    #[error("deposit {0} has no pending unstake")]
    UnstakeNotRequested(u64),

    #[error("deposit is still locked until {unlocks_at}")]
    StillLocked { unlocks_at: DateTime<Utc> },

    #[error("unknown collateral asset {0}")]
    UnknownAsset(String),
}
