//! Position and basket domain types.
//!
//! All values here are snapshots converted from indexer DTOs. Raw amounts
//! stay as u128 micro-units; anything derived (values, ratios) is f64.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::warn;

use bidder_api::{BasketDto, CollateralTypeDto, InterestRateDto, PositionDto, PriceDto};

use crate::math;

/// Credit asset decimals (micro-units).
pub const CREDIT_DECIMALS: u8 = 6;

/// One collateral line within a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralEntry {
    pub denom: String,
    pub amount: u128,
}

/// A borrower's collateral-backed debt record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: u64,
    pub owner: String,
    pub basket_id: u64,
    pub collateral: SmallVec<[CollateralEntry; 4]>,
    /// Outstanding credit (debt) in micro-units.
    pub credit_amount: u128,
}

impl Position {
    pub fn has_collateral(&self) -> bool {
        self.collateral.iter().any(|c| c.amount > 0)
    }

    /// Risk-adjusted collateral value in credit-asset terms:
    /// sum of `amount * price * max_borrow_ltv` per entry.
    /// `None` when any entry has no price or no known collateral type.
    pub fn risk_adjusted_value(&self, prices: &PriceMap, basket: &BasketConfig) -> Option<f64> {
        let mut adjusted = 0.0;
        for entry in &self.collateral {
            let ctype = basket.collateral_type(&entry.denom)?;
            let price = prices.get(&entry.denom)?;
            adjusted += math::to_decimal(entry.amount, ctype.decimals) * price * ctype.max_borrow_ltv;
        }
        Some(adjusted)
    }

    /// Raw (unadjusted) collateral value in credit-asset terms.
    pub fn collateral_value(&self, prices: &PriceMap, basket: &BasketConfig) -> Option<f64> {
        let mut total = 0.0;
        for entry in &self.collateral {
            let ctype = basket.collateral_type(&entry.denom)?;
            let price = prices.get(&entry.denom)?;
            total += math::to_decimal(entry.amount, ctype.decimals) * price;
        }
        Some(total)
    }

    /// Debt value in credit-asset terms at the basket's credit price.
    pub fn debt_value(&self, basket: &BasketConfig) -> f64 {
        math::to_decimal(self.credit_amount, CREDIT_DECIMALS) * basket.credit_price
    }
}

/// One accepted collateral type within a basket. Read-only, supplied by
/// the basket service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralType {
    pub denom: String,
    /// Max borrow LTV as a decimal (0-1).
    pub max_borrow_ltv: f64,
    pub decimals: u8,
}

/// Liquidation fee curve configured on the basket.
///
/// The rate grows linearly with how far below 1.0 a position's health has
/// fallen, capped at `max_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationFeeCurve {
    pub base_rate: f64,
    pub rate_per_point: f64,
    pub max_rate: f64,
}

impl LiquidationFeeCurve {
    /// Fee rate for a liquidatable position at the given health ratio.
    pub fn fee_rate(&self, health: f64) -> f64 {
        let depth = (1.0 - health).max(0.0);
        (self.base_rate + self.rate_per_point * depth).min(self.max_rate)
    }
}

/// Basket configuration: the credit asset plus its accepted collateral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketConfig {
    pub basket_id: u64,
    pub credit_denom: String,
    /// Credit repayment price, not market price.
    pub credit_price: f64,
    pub fee_curve: LiquidationFeeCurve,
    pub collateral_types: Vec<CollateralType>,
}

impl BasketConfig {
    pub fn collateral_type(&self, denom: &str) -> Option<&CollateralType> {
        self.collateral_types.iter().find(|c| c.denom == denom)
    }
}

/// Accrued-but-uncharged interest fraction for one collateral denom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRate {
    pub denom: String,
    pub rate: f64,
}

/// A single oracle price entry, as fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub denom: String,
    pub price: String,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time price lookup built once per snapshot.
#[derive(Debug, Clone, Default)]
pub struct PriceMap {
    prices: HashMap<String, f64>,
}

impl PriceMap {
    /// Build the lookup, skipping entries whose price string fails to
    /// parse. A missing price later skips the position, never flags it.
    pub fn from_entries(entries: &[PriceEntry]) -> Self {
        let mut prices = HashMap::with_capacity(entries.len());
        for entry in entries {
            match entry.price.parse::<f64>() {
                Ok(price) if price.is_finite() && price > 0.0 => {
                    prices.insert(entry.denom.clone(), price);
                }
                _ => warn!(denom = %entry.denom, raw = %entry.price, "unparseable price, skipping"),
            }
        }
        Self { prices }
    }

    pub fn get(&self, denom: &str) -> Option<f64> {
        self.prices.get(denom).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

fn parse_u128(raw: &str, what: &str) -> Result<u128> {
    raw.parse()
        .with_context(|| format!("malformed {what}: {raw}"))
}

fn parse_f64(raw: &str, what: &str) -> Result<f64> {
    raw.parse()
        .with_context(|| format!("malformed {what}: {raw}"))
}

fn parse_u64(raw: &str, what: &str) -> Result<u64> {
    raw.parse()
        .with_context(|| format!("malformed {what}: {raw}"))
}

impl TryFrom<&PositionDto> for Position {
    type Error = anyhow::Error;

    fn try_from(dto: &PositionDto) -> Result<Self> {
        let collateral = dto
            .collateral
            .iter()
            .map(|c| {
                Ok(CollateralEntry {
                    denom: c.denom.clone(),
                    amount: parse_u128(&c.amount, "collateral amount")?,
                })
            })
            .collect::<Result<SmallVec<_>>>()?;

        Ok(Self {
            position_id: parse_u64(&dto.position_id, "position id")?,
            owner: dto.owner.clone(),
            basket_id: parse_u64(&dto.basket_id, "basket id")?,
            collateral,
            credit_amount: parse_u128(&dto.credit_amount, "credit amount")?,
        })
    }
}

impl TryFrom<&CollateralTypeDto> for CollateralType {
    type Error = anyhow::Error;

    fn try_from(dto: &CollateralTypeDto) -> Result<Self> {
        Ok(Self {
            denom: dto.denom.clone(),
            max_borrow_ltv: parse_f64(&dto.max_borrow_ltv, "max borrow LTV")?,
            decimals: dto.decimals,
        })
    }
}

impl TryFrom<&BasketDto> for BasketConfig {
    type Error = anyhow::Error;

    fn try_from(dto: &BasketDto) -> Result<Self> {
        Ok(Self {
            basket_id: parse_u64(&dto.basket_id, "basket id")?,
            credit_denom: dto.credit_denom.clone(),
            credit_price: parse_f64(&dto.credit_price, "credit price")?,
            fee_curve: LiquidationFeeCurve {
                base_rate: parse_f64(&dto.liq_fee.base_rate, "fee base rate")?,
                rate_per_point: parse_f64(&dto.liq_fee.rate_per_point, "fee rate per point")?,
                max_rate: parse_f64(&dto.liq_fee.max_rate, "fee max rate")?,
            },
            collateral_types: dto
                .collateral_types
                .iter()
                .map(CollateralType::try_from)
                .collect::<Result<_>>()?,
        })
    }
}

impl From<&PriceDto> for PriceEntry {
    fn from(dto: &PriceDto) -> Self {
        Self {
            denom: dto.denom.clone(),
            price: dto.price.clone(),
            updated_at: Utc
                .timestamp_opt(dto.updated_at as i64, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

impl TryFrom<&InterestRateDto> for InterestRate {
    type Error = anyhow::Error;

    fn try_from(dto: &InterestRateDto) -> Result<Self> {
        Ok(Self {
            denom: dto.denom.clone(),
            rate: parse_f64(&dto.rate, "interest rate")?,
        })
    }
}
