//! Chain plumbing for the liquidation engine.
//!
//! This crate owns everything between a derived intent and the chain:
//! - Typed contract-execute messages with validated constructors
//! - Signer/broadcaster abstraction with a remote-signer implementation
//! - Per-chain gas policy table (buffer multiplier + gas price override)
//! - The simulate/sign/broadcast pipeline state machine with bounded
//!   slippage auto-recovery
//!
//! Engine semantics (which positions to liquidate, how bids fill) live in
//! `bidder-core`; this crate only moves message batches safely on chain.

mod error;
mod gas;
mod msg;
mod pipeline;
mod signer;

pub use error::{is_slippage_reason, PipelineError};
pub use gas::{Fee, GasPolicy, GasPolicyTable};
pub use msg::{Coin, ExecuteMsg, MsgError, TransactionIntent, WireMsg, MAX_PREMIUM_SLOT};
pub use pipeline::{
    PipelineOutcome, PipelineState, TransactionPipeline, MAX_SLIPPAGE_RETRIES, SLIPPAGE_STEP_PCT,
};
pub use signer::{BroadcastResult, HttpSigner, SignedTx, TxSigner};
