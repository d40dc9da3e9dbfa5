//! Claim aggregation and availability gating.
//!
//! Merges everything a user can claim (liquidation proceeds, stability
//! pool unstakes, staking rewards, vesting allocations) into one summary
//! and one message list, so the user signs exactly one transaction. Each
//! sub-claim is independently optional: a source whose simulate probe
//! failed is left out without poisoning the rest.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bidder_chain::WireMsg;

/// A claimable denom/amount pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimable {
    pub denom: String,
    pub amount: u128,
}

impl Claimable {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// One independently-sourced claim: its amounts, the messages that would
/// collect it, and whether its simulate probe succeeded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubClaim {
    pub claims: Vec<Claimable>,
    pub msgs: Vec<WireMsg>,
    pub simulate_ok: bool,
}

impl SubClaim {
    pub fn new(claims: Vec<Claimable>, msgs: Vec<WireMsg>, simulate_ok: bool) -> Self {
        Self {
            claims,
            msgs,
            simulate_ok,
        }
    }

    pub fn empty() -> Self {
        Self {
            claims: Vec::new(),
            msgs: Vec::new(),
            simulate_ok: true,
        }
    }

    fn total(&self) -> u128 {
        self.claims.iter().map(|c| c.amount).sum()
    }
}

/// The four claim sources feeding one aggregation pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClaimInputs {
    pub liquidation: SubClaim,
    pub pool_unstaking: SubClaim,
    pub staking: SubClaim,
    pub vesting: SubClaim,
}

/// Combined view of everything claimable, recomputed per evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClaimSummary {
    pub liquidation: Vec<Claimable>,
    pub pool_unstaking: Vec<Claimable>,
    pub staking: Vec<Claimable>,
    pub vesting: Vec<Claimable>,
}

impl ClaimSummary {
    /// Totals per denom across all four sources.
    pub fn totals(&self) -> BTreeMap<String, u128> {
        let mut totals = BTreeMap::new();
        for claimable in self
            .liquidation
            .iter()
            .chain(&self.pool_unstaking)
            .chain(&self.staking)
            .chain(&self.vesting)
        {
            *totals.entry(claimable.denom.clone()).or_insert(0) += claimable.amount;
        }
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.liquidation.is_empty()
            && self.pool_unstaking.is_empty()
            && self.staking.is_empty()
            && self.vesting.is_empty()
    }
}

/// Merges sub-claims into one summary and one batched message list.
///
/// Pure: aggregating the same inputs twice yields identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimAggregator;

impl ClaimAggregator {
    pub fn aggregate(inputs: &ClaimInputs) -> (ClaimSummary, Vec<WireMsg>) {
        let summary = ClaimSummary {
            liquidation: nonzero(&inputs.liquidation.claims),
            pool_unstaking: nonzero(&inputs.pool_unstaking.claims),
            staking: nonzero(&inputs.staking.claims),
            vesting: nonzero(&inputs.vesting.claims),
        };

        let mut msgs = Vec::new();
        for (name, sub) in [
            ("liquidation", &inputs.liquidation),
            ("pool_unstaking", &inputs.pool_unstaking),
            ("staking", &inputs.staking),
            ("vesting", &inputs.vesting),
        ] {
            if !sub.simulate_ok {
                debug!(source = name, "sub-claim simulate failed, excluded from batch");
                continue;
            }
            // Staking rewards/unstakes only ride along when strictly
            // positive; the other sources gate on their messages alone.
            if name == "staking" && sub.total() == 0 {
                continue;
            }
            msgs.extend(sub.msgs.iter().cloned());
        }

        (summary, msgs)
    }
}

fn nonzero(claims: &[Claimable]) -> Vec<Claimable> {
    claims.iter().filter(|c| c.amount > 0).cloned().collect()
}

/// Pure time-boundary check for the claim/liquidate action.
///
/// After the claimable set goes empty the action stays enabled for a
/// short grace window, tolerating in-flight simulate latency. New
/// claimables or an in-progress broadcast cancel the pending disable.
/// The caller polls; nothing here owns a timer.
#[derive(Debug, Clone)]
pub struct ClaimAvailability {
    grace: Duration,
    empty_since: Option<DateTime<Utc>>,
}

impl ClaimAvailability {
    pub fn new(grace_secs: i64) -> Self {
        Self {
            grace: Duration::seconds(grace_secs),
            empty_since: None,
        }
    }

    /// Record one observation and report whether the action is enabled.
    pub fn observe(
        &mut self,
        has_claimables: bool,
        broadcast_in_progress: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if has_claimables || broadcast_in_progress {
            self.empty_since = None;
            return true;
        }
        let since = *self.empty_since.get_or_insert(now);
        now - since < self.grace
    }
}
