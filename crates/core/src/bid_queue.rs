//! Premium-bucketed bid queues, one per collateral asset.
//!
//! A queue holds ten premium slots (0..=9 percent). Liquidations fill
//! strictly ascending by premium because a liquidated position always
//! prefers the cheapest discount; within a slot, bids fill oldest first.

use std::collections::{HashMap, VecDeque};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bidder_api::BidDto;

use crate::error::EngineError;

/// Number of premium slots in a single-asset queue.
pub const PREMIUM_SLOTS: usize = 10;

/// A standing bid in credit-asset micro-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: u64,
    pub user: String,
    pub asset: String,
    /// Premium slot, 0..=9 percent.
    pub premium: u8,
    /// Remaining (unfilled, unretracted) amount.
    pub amount: u128,
}

/// One bid's share of a liquidation fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidFill {
    pub bid_id: u64,
    pub user: String,
    pub premium: u8,
    /// Credit-asset amount consumed from the bid.
    pub amount: u128,
}

/// Result of matching a liquidation amount against one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillOutcome {
    pub fills: Vec<BidFill>,
    /// Liquidation volume the queue could not absorb; spills over to the
    /// stability pool.
    pub remaining: u128,
}

/// Premium-slot queue for one collateral asset.
#[derive(Debug, Clone)]
struct BidQueue {
    slots: [VecDeque<Bid>; PREMIUM_SLOTS],
}

impl BidQueue {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| VecDeque::new()),
        }
    }

    fn push(&mut self, bid: Bid) {
        self.slots[bid.premium as usize].push_back(bid);
    }

    fn iter(&self) -> impl Iterator<Item = &Bid> {
        self.slots.iter().flat_map(|slot| slot.iter())
    }

    /// Capital that fills before a hypothetical new bid at `premium`:
    /// everything in cheaper slots plus everything already in its slot.
    fn capital_ahead(&self, premium: u8) -> u128 {
        self.slots[..=premium as usize]
            .iter()
            .flat_map(|slot| slot.iter())
            .map(|bid| bid.amount)
            .sum()
    }

    /// Capital that fills before an existing bid: cheaper slots in full,
    /// plus older bids within its own slot.
    fn capital_ahead_of(&self, bid_id: u64) -> Option<u128> {
        for (premium, slot) in self.slots.iter().enumerate() {
            if let Some(pos) = slot.iter().position(|b| b.id == bid_id) {
                let cheaper: u128 = self.slots[..premium]
                    .iter()
                    .flat_map(|s| s.iter())
                    .map(|b| b.amount)
                    .sum();
                let older: u128 = slot.iter().take(pos).map(|b| b.amount).sum();
                return Some(cheaper + older);
            }
        }
        None
    }

    /// Consume `amount` ascending by premium, oldest first within a slot.
    /// Fully consumed bids are removed; a partially consumed head bid is
    /// decremented in place.
    fn fill(&mut self, mut amount: u128) -> FillOutcome {
        let mut fills = Vec::new();
        for slot in self.slots.iter_mut() {
            while amount > 0 {
                let Some(head) = slot.front_mut() else {
                    break;
                };
                let consumed = head.amount.min(amount);
                amount -= consumed;
                fills.push(BidFill {
                    bid_id: head.id,
                    user: head.user.clone(),
                    premium: head.premium,
                    amount: consumed,
                });
                head.amount -= consumed;
                if head.amount == 0 {
                    slot.pop_front();
                }
            }
            if amount == 0 {
                break;
            }
        }
        FillOutcome {
            fills,
            remaining: amount,
        }
    }

    fn find_mut(&mut self, bid_id: u64) -> Option<(usize, usize)> {
        for (premium, slot) in self.slots.iter().enumerate() {
            if let Some(pos) = slot.iter().position(|b| b.id == bid_id) {
                return Some((premium, pos));
            }
        }
        None
    }

    fn contains(&self, bid_id: u64) -> bool {
        self.iter().any(|b| b.id == bid_id)
    }
}

/// All single-asset bid queues plus the bid-id index across them.
#[derive(Debug, Clone, Default)]
pub struct BidQueues {
    queues: HashMap<String, BidQueue>,
    /// bid id -> collateral asset
    index: HashMap<u64, String>,
    next_bid_id: u64,
}

impl BidQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild queue state from a snapshot of standing bids. Bids with an
    /// out-of-range premium are dropped with a warning rather than
    /// poisoning the model.
    pub fn hydrate(bids: impl IntoIterator<Item = Bid>) -> Self {
        let mut queues = Self::new();
        for bid in bids {
            if bid.premium as usize >= PREMIUM_SLOTS {
                warn!(bid_id = bid.id, premium = bid.premium, "bid with invalid premium, dropped");
                continue;
            }
            if bid.amount == 0 {
                continue;
            }
            queues.next_bid_id = queues.next_bid_id.max(bid.id + 1);
            queues.index.insert(bid.id, bid.asset.clone());
            queues
                .queues
                .entry(bid.asset.clone())
                .or_insert_with(BidQueue::new)
                .push(bid);
        }
        queues
    }

    /// Place a standing bid. Rejects zero amounts and premiums outside
    /// the ten valid slots.
    pub fn place_bid(
        &mut self,
        user: impl Into<String>,
        asset: impl Into<String>,
        premium: u8,
        amount: u128,
    ) -> Result<u64, EngineError> {
        if premium as usize >= PREMIUM_SLOTS {
            return Err(EngineError::InvalidPremium { premium });
        }
        if amount == 0 {
            return Err(EngineError::ZeroBidAmount);
        }

        let id = self.next_bid_id;
        self.next_bid_id += 1;
        let asset = asset.into();
        let bid = Bid {
            id,
            user: user.into(),
            asset: asset.clone(),
            premium,
            amount,
        };
        debug!(bid_id = id, %asset, premium, amount, "bid placed");
        self.index.insert(id, asset.clone());
        self.queues
            .entry(asset)
            .or_insert_with(BidQueue::new)
            .push(bid);
        Ok(id)
    }

    /// Retract a bid partially (`Some(amount)`) or in full (`None`).
    /// Retracting more than the remaining amount is rejected. Returns the
    /// bid's state after retraction (amount zero when fully removed).
    pub fn retract_bid(
        &mut self,
        bid_id: u64,
        amount: Option<u128>,
    ) -> Result<Bid, EngineError> {
        let asset = self
            .index
            .get(&bid_id)
            .cloned()
            .ok_or(EngineError::BidNotFound(bid_id))?;
        let queue = self
            .queues
            .get_mut(&asset)
            .ok_or(EngineError::BidNotFound(bid_id))?;
        let (premium, pos) = queue
            .find_mut(bid_id)
            .ok_or(EngineError::BidNotFound(bid_id))?;

        let remaining = queue.slots[premium][pos].amount;
        let retract = amount.unwrap_or(remaining);
        if retract > remaining {
            return Err(EngineError::RetractExceedsRemaining {
                requested: retract,
                remaining,
            });
        }

        if retract == remaining {
            let mut bid = queue.slots[premium]
                .remove(pos)
                .ok_or(EngineError::BidNotFound(bid_id))?;
            bid.amount = 0;
            self.index.remove(&bid_id);
            debug!(bid_id, "bid fully retracted");
            Ok(bid)
        } else {
            let bid = &mut queue.slots[premium][pos];
            bid.amount -= retract;
            debug!(bid_id, retracted = retract, remaining = bid.amount, "bid reduced");
            Ok(bid.clone())
        }
    }

    /// Move a bid to a different premium slot. The bid re-enters at the
    /// tail of the new slot, losing its queue position.
    pub fn update_bid(&mut self, bid_id: u64, premium: u8) -> Result<Bid, EngineError> {
        if premium as usize >= PREMIUM_SLOTS {
            return Err(EngineError::InvalidPremium { premium });
        }
        let asset = self
            .index
            .get(&bid_id)
            .cloned()
            .ok_or(EngineError::BidNotFound(bid_id))?;
        let queue = self
            .queues
            .get_mut(&asset)
            .ok_or(EngineError::BidNotFound(bid_id))?;
        let (old_premium, pos) = queue
            .find_mut(bid_id)
            .ok_or(EngineError::BidNotFound(bid_id))?;

        let mut bid = queue.slots[old_premium]
            .remove(pos)
            .ok_or(EngineError::BidNotFound(bid_id))?;
        bid.premium = premium;
        queue.push(bid.clone());
        debug!(bid_id, from = old_premium, to = premium, "bid moved");
        Ok(bid)
    }

    /// Match a liquidation amount against one asset's queue. An asset
    /// with no queue absorbs nothing; the whole amount spills over.
    pub fn fill(&mut self, asset: &str, amount: u128) -> FillOutcome {
        let outcome = match self.queues.get_mut(asset) {
            Some(queue) => queue.fill(amount),
            None => FillOutcome {
                fills: Vec::new(),
                remaining: amount,
            },
        };
        for fill in &outcome.fills {
            let consumed_fully = self
                .queues
                .get(asset)
                .map(|q| !q.contains(fill.bid_id))
                .unwrap_or(true);
            if consumed_fully {
                self.index.remove(&fill.bid_id);
            }
        }
        outcome
    }

    /// Capital ahead of a hypothetical new bid at `premium`.
    pub fn capital_ahead(&self, asset: &str, premium: u8) -> Result<u128, EngineError> {
        if premium as usize >= PREMIUM_SLOTS {
            return Err(EngineError::InvalidPremium { premium });
        }
        Ok(self
            .queues
            .get(asset)
            .map(|q| q.capital_ahead(premium))
            .unwrap_or(0))
    }

    /// Capital ahead of an existing bid.
    pub fn capital_ahead_of(&self, bid_id: u64) -> Result<u128, EngineError> {
        let asset = self
            .index
            .get(&bid_id)
            .ok_or(EngineError::BidNotFound(bid_id))?;
        self.queues
            .get(asset)
            .and_then(|q| q.capital_ahead_of(bid_id))
            .ok_or(EngineError::BidNotFound(bid_id))
    }

    /// All standing bids owned by `user`, across assets.
    pub fn user_bids(&self, user: &str) -> Vec<&Bid> {
        let mut bids: Vec<&Bid> = self
            .queues
            .values()
            .flat_map(|q| q.iter())
            .filter(|b| b.user == user)
            .collect();
        bids.sort_by_key(|b| b.id);
        bids
    }

    /// Total standing volume for one asset across all slots.
    pub fn total_queued(&self, asset: &str) -> u128 {
        self.queues
            .get(asset)
            .map(|q| q.iter().map(|b| b.amount).sum())
            .unwrap_or(0)
    }
}

impl TryFrom<&BidDto> for Bid {
    type Error = anyhow::Error;

    fn try_from(dto: &BidDto) -> anyhow::Result<Self> {
        Ok(Self {
            id: dto
                .id
                .parse()
                .with_context(|| format!("malformed bid id: {}", dto.id))?,
            user: dto.user.clone(),
            asset: dto.asset.clone(),
            premium: dto.premium,
            amount: dto
                .amount
                .parse()
                .with_context(|| format!("malformed bid amount: {}", dto.amount))?,
        })
    }
}
