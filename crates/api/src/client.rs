//! Protocol indexer client.
//!
//! Read-only collaborators for the engine: positions, basket config,
//! oracle prices, interest rates, standing bids, stability-pool deposits,
//! staking, vesting allocations, and account balances. All responses are
//! point-in-time snapshots; this client never mutates chain state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A denom/amount pair as the indexer serves it (string amounts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinDto {
    pub denom: String,
    pub amount: String,
}

/// An open borrower position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDto {
    pub position_id: String,
    pub owner: String,
    pub basket_id: String,
    pub collateral: Vec<CoinDto>,
    pub credit_amount: String,
}

/// One accepted collateral type within a basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralTypeDto {
    pub denom: String,
    pub max_borrow_ltv: String,
    pub decimals: u8,
}

/// Liquidation fee curve parameters configured on the basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCurveDto {
    pub base_rate: String,
    pub rate_per_point: String,
    pub max_rate: String,
}

/// Basket configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketDto {
    pub basket_id: String,
    pub credit_denom: String,
    pub credit_price: String,
    pub liq_fee: FeeCurveDto,
    pub collateral_types: Vec<CollateralTypeDto>,
}

/// One oracle price entry. `updated_at` is unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDto {
    pub denom: String,
    pub price: String,
    pub updated_at: u64,
}

/// Accrued-but-uncharged interest fraction per collateral denom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRateDto {
    pub denom: String,
    pub rate: String,
}

/// A standing bid in a collateral asset's premium queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidDto {
    pub id: String,
    pub user: String,
    pub asset: String,
    pub premium: u8,
    pub amount: String,
}

/// A stability-pool deposit. `unstake_time` is unix seconds when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositDto {
    pub id: String,
    pub user: String,
    pub amount: String,
    pub unstake_time: Option<u64>,
}

/// Staking rewards and in-progress unstakes for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingDto {
    pub claimable: Vec<CoinDto>,
    pub unstaking: Vec<CoinDto>,
}

/// Read collaborators the engine consumes, behind one seam so tests can
/// script snapshots without a network.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn positions(&self, basket_id: u64) -> Result<Vec<PositionDto>>;
    async fn basket(&self, basket_id: u64) -> Result<BasketDto>;
    async fn prices(&self) -> Result<Vec<PriceDto>>;
    async fn interest_rates(&self, basket_id: u64) -> Result<Vec<InterestRateDto>>;
    async fn bids(&self, asset: &str) -> Result<Vec<BidDto>>;
    async fn pool_deposits(&self, basket_id: u64) -> Result<Vec<DepositDto>>;
    async fn staking(&self, user: &str) -> Result<StakingDto>;
    async fn allocations(&self, user: &str) -> Result<Vec<CoinDto>>;
    async fn balances(&self, user: &str) -> Result<Vec<CoinDto>>;
    async fn liquidation_claims(&self, user: &str) -> Result<Vec<CoinDto>>;
    async fn pool_claims(&self, user: &str) -> Result<Vec<CoinDto>>;
}

/// REST client for the protocol indexer.
#[derive(Clone)]
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "indexer fetch");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?
            .error_for_status()
            .with_context(|| format!("indexer rejected {path}"))?;
        resp.json()
            .await
            .with_context(|| format!("malformed response from {path}"))
    }
}

impl std::fmt::Debug for IndexerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SnapshotSource for IndexerClient {
    #[instrument(skip(self))]
    async fn positions(&self, basket_id: u64) -> Result<Vec<PositionDto>> {
        self.get_json(&format!("/v1/baskets/{basket_id}/positions"))
            .await
    }

    #[instrument(skip(self))]
    async fn basket(&self, basket_id: u64) -> Result<BasketDto> {
        self.get_json(&format!("/v1/baskets/{basket_id}")).await
    }

    #[instrument(skip(self))]
    async fn prices(&self) -> Result<Vec<PriceDto>> {
        self.get_json("/v1/prices").await
    }

    #[instrument(skip(self))]
    async fn interest_rates(&self, basket_id: u64) -> Result<Vec<InterestRateDto>> {
        self.get_json(&format!("/v1/baskets/{basket_id}/interest"))
            .await
    }

    #[instrument(skip(self))]
    async fn bids(&self, asset: &str) -> Result<Vec<BidDto>> {
        self.get_json(&format!("/v1/bids/{asset}")).await
    }

    #[instrument(skip(self))]
    async fn pool_deposits(&self, basket_id: u64) -> Result<Vec<DepositDto>> {
        self.get_json(&format!("/v1/baskets/{basket_id}/pool/deposits"))
            .await
    }

    #[instrument(skip(self))]
    async fn staking(&self, user: &str) -> Result<StakingDto> {
        self.get_json(&format!("/v1/staking/{user}")).await
    }

    #[instrument(skip(self))]
    async fn allocations(&self, user: &str) -> Result<Vec<CoinDto>> {
        self.get_json(&format!("/v1/allocations/{user}")).await
    }

    #[instrument(skip(self))]
    async fn balances(&self, user: &str) -> Result<Vec<CoinDto>> {
        self.get_json(&format!("/v1/balances/{user}")).await
    }

    #[instrument(skip(self))]
    async fn liquidation_claims(&self, user: &str) -> Result<Vec<CoinDto>> {
        self.get_json(&format!("/v1/liquidation/claims/{user}"))
            .await
    }

    #[instrument(skip(self))]
    async fn pool_claims(&self, user: &str) -> Result<Vec<CoinDto>> {
        self.get_json(&format!("/v1/pool/claims/{user}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_dto_shape() {
        let raw = r#"{
            "position_id": "42",
            "owner": "osmo1borrower",
            "basket_id": "1",
            "collateral": [{ "denom": "uosmo", "amount": "150000000" }],
            "credit_amount": "100000000"
        }"#;
        let dto: PositionDto = serde_json::from_str(raw).unwrap();
        assert_eq!(dto.position_id, "42");
        assert_eq!(dto.collateral[0].amount, "150000000");
    }

    #[test]
    fn test_deposit_dto_optional_unstake_time() {
        let active: DepositDto =
            serde_json::from_str(r#"{ "id": "1", "user": "a", "amount": "5" }"#).unwrap();
        assert_eq!(active.unstake_time, None);

        let pending: DepositDto = serde_json::from_str(
            r#"{ "id": "2", "user": "b", "amount": "5", "unstake_time": 1700000000 }"#,
        )
        .unwrap();
        assert_eq!(pending.unstake_time, Some(1_700_000_000));
    }
}
