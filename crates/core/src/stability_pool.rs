//! Omni-asset stability pool.
//!
//! A single FIFO queue per basket at a fixed 10% premium, conceptually
//! one slot deeper than every single-asset bid slot. Deposits absorb
//! liquidation overflow in arrival order. Withdrawal is a two-step
//! lifecycle: request unstake, then withdraw once a fixed one-day delay
//! has elapsed. A pending-unstake deposit keeps absorbing liquidations
//! until it is actually withdrawn.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bidder_api::DepositDto;

use crate::error::EngineError;

/// Fixed premium of the pool, one step past the last queue slot.
pub const POOL_PREMIUM_PCT: u8 = 10;

/// Delay between an unstake request and withdrawability.
pub const UNSTAKE_DELAY_SECS: i64 = 86_400;

fn unstake_delay() -> Duration {
    Duration::seconds(UNSTAKE_DELAY_SECS)
}

/// A stability-pool deposit in credit-asset micro-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: u64,
    pub user: String,
    pub amount: u128,
    /// Set when an unstake has been requested; the deposit becomes
    /// withdrawable a fixed delay after this instant.
    pub unstake_time: Option<DateTime<Utc>>,
}

impl Deposit {
    /// When this deposit can be withdrawn, if an unstake is pending.
    pub fn withdrawable_at(&self) -> Option<DateTime<Utc>> {
        self.unstake_time.map(|t| t + unstake_delay())
    }

    pub fn is_pending_unstake(&self) -> bool {
        self.unstake_time.is_some()
    }
}

/// One deposit's share of an absorbed liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolFill {
    pub deposit_id: u64,
    pub user: String,
    pub amount: u128,
}

/// Result of absorbing a liquidation amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAbsorption {
    pub fills: Vec<PoolFill>,
    /// Volume the pool could not cover.
    pub remaining: u128,
}

/// FIFO stability pool for one basket.
#[derive(Debug, Clone)]
pub struct StabilityPool {
    basket_id: u64,
    deposits: VecDeque<Deposit>,
    next_id: u64,
}

impl StabilityPool {
    pub fn new(basket_id: u64) -> Self {
        Self {
            basket_id,
            deposits: VecDeque::new(),
            next_id: 0,
        }
    }

    pub fn basket_id(&self) -> u64 {
        self.basket_id
    }

    /// Rebuild pool state from a deposit snapshot, preserving order.
    pub fn hydrate(basket_id: u64, deposits: impl IntoIterator<Item = Deposit>) -> Self {
        let mut pool = Self::new(basket_id);
        for deposit in deposits {
            if deposit.amount == 0 {
                continue;
            }
            pool.next_id = pool.next_id.max(deposit.id + 1);
            pool.deposits.push_back(deposit);
        }
        pool
    }

    /// Append a deposit to the tail of the queue.
    pub fn deposit(&mut self, user: impl Into<String>, amount: u128) -> Result<u64, EngineError> {
        if amount == 0 {
            return Err(EngineError::ZeroDepositAmount);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.deposits.push_back(Deposit {
            id,
            user: user.into(),
            amount,
            unstake_time: None,
        });
        debug!(deposit_id = id, amount, "pool deposit");
        Ok(id)
    }

    /// Start the unstake countdown. Returns when the deposit becomes
    /// withdrawable. Requesting again restarts the countdown.
    pub fn request_unstake(
        &mut self,
        deposit_id: u64,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        let deposit = self.find_mut(deposit_id)?;
        deposit.unstake_time = Some(now);
        let unlocks_at = now + unstake_delay();
        debug!(deposit_id, %unlocks_at, "unstake requested");
        Ok(unlocks_at)
    }

    /// Cancel a pending unstake, returning the deposit to fully active.
    pub fn restake(&mut self, deposit_id: u64) -> Result<(), EngineError> {
        let deposit = self.find_mut(deposit_id)?;
        deposit.unstake_time = None;
        Ok(())
    }

    /// Withdraw a deposit. Only permitted once the unstake delay has
    /// fully elapsed; earlier attempts fail with a still-locked error
    /// rather than silently doing nothing.
    pub fn withdraw(
        &mut self,
        deposit_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Deposit, EngineError> {
        let pos = self
            .deposits
            .iter()
            .position(|d| d.id == deposit_id)
            .ok_or(EngineError::DepositNotFound(deposit_id))?;

        let unlocks_at = self.deposits[pos]
            .withdrawable_at()
            .ok_or(EngineError::UnstakeNotRequested(deposit_id))?;
        if now < unlocks_at {
            return Err(EngineError::StillLocked { unlocks_at });
        }

        let deposit = self
            .deposits
            .remove(pos)
            .ok_or(EngineError::DepositNotFound(deposit_id))?;
        debug!(deposit_id, amount = deposit.amount, "pool withdrawal");
        Ok(deposit)
    }

    /// Absorb a liquidation amount FIFO. Pending-unstake deposits still
    /// participate; only withdrawn deposits are out of the pool.
    pub fn absorb(&mut self, mut amount: u128) -> PoolAbsorption {
        let mut fills = Vec::new();
        while amount > 0 {
            let Some(head) = self.deposits.front_mut() else {
                break;
            };
            let consumed = head.amount.min(amount);
            amount -= consumed;
            fills.push(PoolFill {
                deposit_id: head.id,
                user: head.user.clone(),
                amount: consumed,
            });
            head.amount -= consumed;
            if head.amount == 0 {
                self.deposits.pop_front();
            }
        }
        PoolAbsorption {
            fills,
            remaining: amount,
        }
    }

    /// Sum of deposits placed before this one that are still in the pool.
    /// Estimates how much liquidation volume must pass before this
    /// deposit is touched.
    pub fn capital_ahead_of(&self, deposit_id: u64) -> Result<u128, EngineError> {
        let pos = self
            .deposits
            .iter()
            .position(|d| d.id == deposit_id)
            .ok_or(EngineError::DepositNotFound(deposit_id))?;
        Ok(self.deposits.iter().take(pos).map(|d| d.amount).sum())
    }

    /// Total volume still absorbing liquidations.
    pub fn total_active(&self) -> u128 {
        self.deposits.iter().map(|d| d.amount).sum()
    }

    pub fn deposits(&self) -> impl Iterator<Item = &Deposit> {
        self.deposits.iter()
    }

    fn find_mut(&mut self, deposit_id: u64) -> Result<&mut Deposit, EngineError> {
        self.deposits
            .iter_mut()
            .find(|d| d.id == deposit_id)
            .ok_or(EngineError::DepositNotFound(deposit_id))
    }
}

impl TryFrom<&DepositDto> for Deposit {
    type Error = anyhow::Error;

    fn try_from(dto: &DepositDto) -> anyhow::Result<Self> {
        use anyhow::Context;
        use chrono::TimeZone;

        let unstake_time = match dto.unstake_time {
            Some(secs) => match Utc.timestamp_opt(secs as i64, 0).single() {
                Some(t) => Some(t),
                None => {
                    warn!(deposit_id = %dto.id, secs, "out-of-range unstake time, treated as active");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            id: dto.id.parse().with_context(|| format!("malformed deposit id: {}", dto.id))?,
            user: dto.user.clone(),
            amount: dto
                .amount
                .parse()
                .with_context(|| format!("malformed deposit amount: {}", dto.amount))?,
            unstake_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_withdraw_timing() {
        let mut pool = StabilityPool::new(1);
        let id = pool.deposit("osmo1lp", 1_000_000_000).unwrap();

        // Withdraw before requesting unstake is rejected
        assert_eq!(
            pool.withdraw(id, t0()),
            Err(EngineError::UnstakeNotRequested(id))
        );

        let unlocks_at = pool.request_unstake(id, t0()).unwrap();
        assert_eq!(unlocks_at, t0() + Duration::days(1));

        // 23 hours in: still locked
        assert_eq!(
            pool.withdraw(id, t0() + Duration::hours(23)),
            Err(EngineError::StillLocked { unlocks_at })
        );

        // Exactly 24 hours: withdrawable
        let deposit = pool.withdraw(id, t0() + Duration::hours(24)).unwrap();
        assert_eq!(deposit.amount, 1_000_000_000);
        assert_eq!(pool.total_active(), 0);
    }

    #[test]
    fn test_pending_unstake_still_absorbs() {
        let mut pool = StabilityPool::new(1);
        let id = pool.deposit("osmo1lp", 500).unwrap();
        pool.request_unstake(id, t0()).unwrap();

        // The countdown does not remove the deposit from the active pool
        assert_eq!(pool.total_active(), 500);

        let absorption = pool.absorb(200);
        assert_eq!(absorption.fills.len(), 1);
        assert_eq!(absorption.fills[0].amount, 200);
        assert_eq!(pool.total_active(), 300);

        // And the reduced deposit can still be withdrawn after the delay
        let deposit = pool.withdraw(id, t0() + Duration::days(1)).unwrap();
        assert_eq!(deposit.amount, 300);
    }

    #[test]
    fn test_fifo_absorption_order() {
        let mut pool = StabilityPool::new(1);
        let a = pool.deposit("osmo1a", 100).unwrap();
        let b = pool.deposit("osmo1b", 100).unwrap();

        let absorption = pool.absorb(150);
        assert_eq!(absorption.remaining, 0);
        assert_eq!(absorption.fills[0].deposit_id, a);
        assert_eq!(absorption.fills[0].amount, 100);
        assert_eq!(absorption.fills[1].deposit_id, b);
        assert_eq!(absorption.fills[1].amount, 50);

        // First deposit fully consumed and removed
        assert!(pool.capital_ahead_of(a).is_err());
        assert_eq!(pool.capital_ahead_of(b).unwrap(), 0);
    }

    #[test]
    fn test_absorb_overflow() {
        let mut pool = StabilityPool::new(1);
        pool.deposit("osmo1a", 100).unwrap();

        let absorption = pool.absorb(250);
        assert_eq!(absorption.remaining, 150);
        assert_eq!(pool.total_active(), 0);
    }

    #[test]
    fn test_capital_ahead() {
        let mut pool = StabilityPool::new(1);
        let a = pool.deposit("osmo1a", 100).unwrap();
        let b = pool.deposit("osmo1b", 200).unwrap();
        let c = pool.deposit("osmo1c", 300).unwrap();

        assert_eq!(pool.capital_ahead_of(a).unwrap(), 0);
        assert_eq!(pool.capital_ahead_of(b).unwrap(), 100);
        assert_eq!(pool.capital_ahead_of(c).unwrap(), 300);
    }

    #[test]
    fn test_restake_clears_countdown() {
        let mut pool = StabilityPool::new(1);
        let id = pool.deposit("osmo1lp", 100).unwrap();
        pool.request_unstake(id, t0()).unwrap();
        pool.restake(id).unwrap();

        // Withdrawal now requires a fresh unstake request
        assert_eq!(
            pool.withdraw(id, t0() + Duration::days(2)),
            Err(EngineError::UnstakeNotRequested(id))
        );
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let mut pool = StabilityPool::new(1);
        assert_eq!(
            pool.deposit("osmo1lp", 0),
            Err(EngineError::ZeroDepositAmount)
        );
    }

    #[test]
    fn test_hydrate_skips_empty() {
        let pool = StabilityPool::hydrate(
            1,
            vec![
                Deposit {
                    id: 3,
                    user: "osmo1a".into(),
                    amount: 700,
                    unstake_time: None,
                },
                Deposit {
                    id: 4,
                    user: "osmo1b".into(),
                    amount: 0,
                    unstake_time: None,
                },
            ],
        );
        assert_eq!(pool.total_active(), 700);
        assert_eq!(pool.deposits().count(), 1);
    }
}
