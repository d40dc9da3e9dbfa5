//! Pipeline error taxonomy.
//!
//! Three classes with different propagation rules:
//! - missing/empty input never errors, it resolves to an inert outcome
//!   upstream (see `pipeline::PipelineOutcome::NothingToDo`);
//! - simulation and broadcast failures are always surfaced with a parsed
//!   reason, with one auto-recoverable sub-kind (slippage);
//! - signing rejection is surfaced distinctly and never retried.

use thiserror::Error;

/// Error substrings the chain emits when a swap exceeds its spread bound.
/// A failure matching one of these is auto-recoverable by widening the
/// slippage tolerance and re-simulating.
const SLIPPAGE_MARKERS: [&str; 2] = ["max spread", "token amount calculated"];

/// Typed failure reasons for the transaction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Gas estimation or dry-run execution rejected the message list.
    #[error("simulation failed: {reason}")]
    Simulation { reason: String, slippage: bool },

    /// The signer declined to sign. Never retried.
    #[error("signing rejected: {reason}")]
    SigningRejected { reason: String },

    /// The chain accepted the signed transaction but execution failed.
    #[error("broadcast failed with code {code}: {raw_log}")]
    Broadcast { code: u32, raw_log: String },

    /// The network call itself failed before the chain saw the tx.
    #[error("transport error: {0}")]
    Transport(String),
}

impl PipelineError {
    /// Build a simulation failure, classifying the reason string.
    pub fn simulation(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let slippage = is_slippage_reason(&reason);
        Self::Simulation { reason, slippage }
    }

    /// Whether this failure is the auto-recoverable slippage kind.
    pub fn is_slippage(&self) -> bool {
        match self {
            Self::Simulation { slippage, .. } => *slippage,
            Self::Broadcast { raw_log, .. } => is_slippage_reason(raw_log),
            _ => false,
        }
    }
}

/// Check a raw chain error message for a slippage-related condition.
pub fn is_slippage_reason(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    SLIPPAGE_MARKERS.iter().any(|m| lower.contains(m))
}
