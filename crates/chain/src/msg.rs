//! Typed contract-execute messages for the CDP protocol.
//!
//! Every action the engine can take on chain is one of a closed set of
//! message variants with a validated constructor. Validation happens here,
//! at the call boundary, so malformed intents never reach the chain.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Highest valid premium slot in the single-asset bid queue.
pub const MAX_PREMIUM_SLOT: u8 = 9;

/// A native coin attached to or referenced by an execute message.
///
/// Amounts are serialized as decimal strings, matching the chain's wire
/// convention for 128-bit integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }

    /// Parse the wire amount back into micro-units.
    pub fn amount_u128(&self) -> Result<u128, MsgError> {
        self.amount
            .parse()
            .map_err(|_| MsgError::MalformedAmount(self.amount.clone()))
    }
}

/// Construction errors for execute messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsgError {
    #[error("invalid premium slot {0}, valid slots are 0..={MAX_PREMIUM_SLOT}")]
    InvalidPremium(u8),
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("claim requires at least one user")]
    NoUsers,
    #[error("malformed wire amount: {0}")]
    MalformedAmount(String),
}

/// Closed set of contract-execute actions the engine can derive.
///
/// Variants are constructed through the validating `ExecuteMsg::*` helpers
/// below rather than struct literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecuteMsg {
    /// Place a standing bid in a collateral asset's premium queue.
    PlaceBid {
        asset: String,
        liq_premium: u8,
        funds: Coin,
    },
    /// Retract a standing bid, partially (`amount`) or in full (`None`).
    RetractBid {
        bid_id: u64,
        denom: String,
        amount: Option<u128>,
    },
    /// Move a standing bid to a different premium slot.
    UpdateBid {
        bid_id: u64,
        denom: String,
        liq_premium: u8,
    },
    /// Withdraw from the stability pool.
    WithdrawPool { amount: u128 },
    /// Liquidate an undercollateralized position.
    Liquidate {
        position_id: u64,
        position_owner: String,
    },
    /// Claim everything claimable for the given users.
    Claim {
        users: Vec<String>,
        intent: Option<String>,
    },
}

impl ExecuteMsg {
    pub fn place_bid(
        asset: impl Into<String>,
        liq_premium: u8,
        funds: Coin,
    ) -> Result<Self, MsgError> {
        if liq_premium > MAX_PREMIUM_SLOT {
            return Err(MsgError::InvalidPremium(liq_premium));
        }
        if funds.amount_u128()? == 0 {
            return Err(MsgError::ZeroAmount);
        }
        Ok(Self::PlaceBid {
            asset: asset.into(),
            liq_premium,
            funds,
        })
    }

    pub fn retract_bid(
        bid_id: u64,
        denom: impl Into<String>,
        amount: Option<u128>,
    ) -> Result<Self, MsgError> {
        if amount == Some(0) {
            return Err(MsgError::ZeroAmount);
        }
        Ok(Self::RetractBid {
            bid_id,
            denom: denom.into(),
            amount,
        })
    }

    pub fn update_bid(
        bid_id: u64,
        denom: impl Into<String>,
        liq_premium: u8,
    ) -> Result<Self, MsgError> {
        if liq_premium > MAX_PREMIUM_SLOT {
            return Err(MsgError::InvalidPremium(liq_premium));
        }
        Ok(Self::UpdateBid {
            bid_id,
            denom: denom.into(),
            liq_premium,
        })
    }

    pub fn withdraw_pool(amount: u128) -> Result<Self, MsgError> {
        if amount == 0 {
            return Err(MsgError::ZeroAmount);
        }
        Ok(Self::WithdrawPool { amount })
    }

    pub fn liquidate(position_id: u64, position_owner: impl Into<String>) -> Self {
        Self::Liquidate {
            position_id,
            position_owner: position_owner.into(),
        }
    }

    pub fn claim(users: Vec<String>, intent: Option<String>) -> Result<Self, MsgError> {
        if users.is_empty() {
            return Err(MsgError::NoUsers);
        }
        Ok(Self::Claim { users, intent })
    }

    /// Funds that must ride along with the transaction for this message.
    pub fn attached_funds(&self) -> Vec<Coin> {
        match self {
            Self::PlaceBid { funds, .. } => vec![funds.clone()],
            _ => Vec::new(),
        }
    }

    /// JSON body in the contract's wire shape.
    pub fn wire_body(&self) -> Value {
        match self {
            Self::PlaceBid {
                asset, liq_premium, ..
            } => json!({
                "submit_bid": { "asset": asset, "liq_premium": liq_premium }
            }),
            Self::RetractBid {
                bid_id,
                denom,
                amount,
            } => json!({
                "retract_bid": {
                    "bid_id": bid_id.to_string(),
                    "bid_for": denom,
                    "amount": amount.map(|a| a.to_string()),
                }
            }),
            Self::UpdateBid {
                bid_id,
                denom,
                liq_premium,
            } => json!({
                "update_bid": {
                    "bid_id": bid_id.to_string(),
                    "bid_for": denom,
                    "liq_premium": liq_premium,
                }
            }),
            Self::WithdrawPool { amount } => json!({
                "withdraw": { "amount": amount.to_string() }
            }),
            Self::Liquidate {
                position_id,
                position_owner,
            } => json!({
                "liquidate": {
                    "position_id": position_id.to_string(),
                    "position_owner": position_owner,
                }
            }),
            Self::Claim { users, intent } => json!({
                "claim": { "users": users, "intent": intent }
            }),
        }
    }

    /// Bind this message to a target contract, producing the opaque form
    /// the pipeline batches.
    pub fn to_wire(&self, contract: impl Into<String>) -> WireMsg {
        WireMsg {
            contract: contract.into(),
            msg: self.wire_body(),
            funds: self.attached_funds(),
        }
    }
}

/// A contract-bound execute message ready for simulation and signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMsg {
    pub contract: String,
    pub msg: Value,
    pub funds: Vec<Coin>,
}

/// An ordered batch of messages plus display metadata.
///
/// `cache_key` identifies the derived intent; the pipeline refuses to run
/// two intents with the same key concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionIntent {
    pub msgs: Vec<WireMsg>,
    pub display_amount: Option<String>,
    pub cache_key: String,
}

impl TransactionIntent {
    pub fn new(msgs: Vec<WireMsg>, cache_key: impl Into<String>) -> Self {
        Self {
            msgs,
            display_amount: None,
            cache_key: cache_key.into(),
        }
    }

    pub fn with_display_amount(mut self, display: impl Into<String>) -> Self {
        self.display_amount = Some(display.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_bid_validation() {
        let funds = Coin::new("ucdt", 1_000_000);
        assert!(ExecuteMsg::place_bid("uosmo", 0, funds.clone()).is_ok());
        assert!(ExecuteMsg::place_bid("uosmo", 9, funds.clone()).is_ok());

        assert_eq!(
            ExecuteMsg::place_bid("uosmo", 10, funds),
            Err(MsgError::InvalidPremium(10))
        );
        assert_eq!(
            ExecuteMsg::place_bid("uosmo", 3, Coin::new("ucdt", 0)),
            Err(MsgError::ZeroAmount)
        );
    }

    #[test]
    fn test_retract_bid_validation() {
        assert!(ExecuteMsg::retract_bid(7, "uosmo", None).is_ok());
        assert!(ExecuteMsg::retract_bid(7, "uosmo", Some(500)).is_ok());
        assert_eq!(
            ExecuteMsg::retract_bid(7, "uosmo", Some(0)),
            Err(MsgError::ZeroAmount)
        );
    }

    #[test]
    fn test_wire_shape() {
        let msg = ExecuteMsg::place_bid("uosmo", 4, Coin::new("ucdt", 250_000_000)).unwrap();
        let body = msg.wire_body();
        assert_eq!(body["submit_bid"]["asset"], "uosmo");
        assert_eq!(body["submit_bid"]["liq_premium"], 4);

        let funds = msg.attached_funds();
        assert_eq!(funds.len(), 1);
        assert_eq!(funds[0].amount, "250000000");

        let retract = ExecuteMsg::retract_bid(12, "uosmo", Some(100)).unwrap();
        let body = retract.wire_body();
        assert_eq!(body["retract_bid"]["bid_id"], "12");
        assert_eq!(body["retract_bid"]["amount"], "100");
        // Full retraction leaves the amount null on the wire
        let full = ExecuteMsg::retract_bid(12, "uosmo", None).unwrap();
        assert!(full.wire_body()["retract_bid"]["amount"].is_null());
    }

    #[test]
    fn test_claim_requires_users() {
        assert_eq!(ExecuteMsg::claim(vec![], None), Err(MsgError::NoUsers));
        assert!(ExecuteMsg::claim(vec!["osmo1user".into()], None).is_ok());
    }

    #[test]
    fn test_only_place_bid_attaches_funds() {
        let liq = ExecuteMsg::liquidate(3, "osmo1owner");
        assert!(liq.attached_funds().is_empty());
        let withdraw = ExecuteMsg::withdraw_pool(10).unwrap();
        assert!(withdraw.attached_funds().is_empty());
    }
}
