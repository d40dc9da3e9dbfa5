//! Engine orchestration.
//!
//! Wires the read collaborators, the risk evaluator, and the transaction
//! pipeline into one scan/evaluate/execute cycle. Every pass works on its
//! own fetched snapshot; after a confirmed broadcast the dependent cache
//! keys are invalidated so the next read reflects the change.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use bidder_api::{CoinDto, InvalidationBus, QueryCache, QueryKey, SnapshotSource};
use bidder_chain::{
    ExecuteMsg, PipelineError, PipelineOutcome, TransactionIntent, TransactionPipeline, TxSigner,
    WireMsg,
};

use crate::bid_queue::{Bid, BidQueues};
use crate::claims::{
    ClaimAggregator, ClaimAvailability, ClaimInputs, ClaimSummary, Claimable, SubClaim,
};
use crate::config::EngineConfig;
use crate::position::{BasketConfig, InterestRate, Position, PriceEntry, PriceMap};
use crate::risk::{LiquidationCandidate, PositionRiskEvaluator, RiskReport};
use crate::stability_pool::{Deposit, StabilityPool};

/// One evaluation's worth of fetched state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub positions: Vec<Position>,
    pub basket: BasketConfig,
    pub prices: PriceMap,
    pub interest: Vec<InterestRate>,
}

/// The liquidation/bidding engine for one basket.
pub struct LiquidationEngine<S, X> {
    source: Arc<S>,
    pipeline: Arc<TransactionPipeline<X>>,
    bus: Arc<InvalidationBus>,
    evaluator: PositionRiskEvaluator,
    availability: Mutex<ClaimAvailability>,
    /// Deduplicates concurrent risk evaluations on one snapshot.
    risk_cache: QueryCache<RiskReport>,
    /// Deduplicates concurrent "what are my claims" requests per user.
    claims_cache: QueryCache<(ClaimSummary, Vec<WireMsg>)>,
    config: EngineConfig,
}

impl<S: SnapshotSource, X: TxSigner> LiquidationEngine<S, X> {
    pub fn new(
        source: Arc<S>,
        pipeline: Arc<TransactionPipeline<X>>,
        bus: Arc<InvalidationBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            pipeline,
            bus: bus.clone(),
            evaluator: PositionRiskEvaluator::new(config.caller_discount),
            availability: Mutex::new(ClaimAvailability::new(config.claim_grace_secs)),
            risk_cache: QueryCache::new(config.query_ttl(), bus.clone()),
            claims_cache: QueryCache::new(config.query_ttl(), bus),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch one coherent snapshot of positions, basket, prices, and
    /// interest. Malformed individual positions are skipped with a
    /// warning; the pass continues on what parsed.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let basket_id = self.config.basket_id;
        let (position_dtos, basket_dto, price_dtos, interest_dtos) = futures::try_join!(
            self.source.positions(basket_id),
            self.source.basket(basket_id),
            self.source.prices(),
            self.source.interest_rates(basket_id),
        )?;

        let positions = position_dtos
            .iter()
            .filter_map(|dto| match Position::try_from(dto) {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!(position_id = %dto.position_id, error = %e, "malformed position, skipped");
                    None
                }
            })
            .collect();

        let basket = BasketConfig::try_from(&basket_dto).context("malformed basket config")?;

        let entries: Vec<PriceEntry> = price_dtos.iter().map(PriceEntry::from).collect();
        let prices = PriceMap::from_entries(&entries);

        let interest = interest_dtos
            .iter()
            .filter_map(|dto| match InterestRate::try_from(dto) {
                Ok(rate) => Some(rate),
                Err(e) => {
                    warn!(denom = %dto.denom, error = %e, "malformed interest rate, skipped");
                    None
                }
            })
            .collect();

        Ok(Snapshot {
            positions,
            basket,
            prices,
            interest,
        })
    }

    /// Evaluate a snapshot for liquidation candidates.
    pub fn evaluate(&self, snapshot: &Snapshot) -> RiskReport {
        self.evaluator.evaluate(
            &snapshot.positions,
            &snapshot.prices,
            &snapshot.basket,
            &snapshot.interest,
        )
    }

    /// Evaluate against the latest snapshot, deduplicated: concurrent
    /// callers share one in-flight fetch, and the cached report stays
    /// valid until its TTL elapses or position data is invalidated.
    pub async fn evaluate_now(&self) -> Result<RiskReport> {
        let key = format!("risk:{}", self.config.basket_id);
        self.risk_cache
            .get_or_fetch(&key, QueryKey::LiquidationInfo, || async {
                let snapshot = self.snapshot().await?;
                Ok(self.evaluate(&snapshot))
            })
            .await
    }

    /// Hydrate the bid queues for a set of collateral assets.
    pub async fn bid_queues(&self, assets: &[String]) -> Result<BidQueues> {
        let fetched =
            try_join_all(assets.iter().map(|asset| self.source.bids(asset))).await?;
        let bids = fetched.into_iter().flatten().filter_map(|dto| {
            match Bid::try_from(&dto) {
                Ok(bid) => Some(bid),
                Err(e) => {
                    warn!(bid_id = %dto.id, error = %e, "malformed bid, skipped");
                    None
                }
            }
        });
        Ok(BidQueues::hydrate(bids))
    }

    /// Hydrate the stability pool from the deposit snapshot.
    pub async fn stability_pool(&self) -> Result<StabilityPool> {
        let deposits = self
            .source
            .pool_deposits(self.config.basket_id)
            .await?
            .iter()
            .filter_map(|dto| match Deposit::try_from(dto) {
                Ok(deposit) => Some(deposit),
                Err(e) => {
                    warn!(deposit_id = %dto.id, error = %e, "malformed deposit, skipped");
                    None
                }
            })
            .collect::<Vec<_>>();
        Ok(StabilityPool::hydrate(self.config.basket_id, deposits))
    }

    /// Submit one liquidation. On confirmation, position-dependent cache
    /// keys go stale.
    #[instrument(skip(self, candidate), fields(position_id = candidate.position_id))]
    pub async fn liquidate(
        &self,
        candidate: &LiquidationCandidate,
    ) -> Result<PipelineOutcome, PipelineError> {
        let msg = ExecuteMsg::liquidate(candidate.position_id, candidate.owner.clone())
            .to_wire(&self.config.contracts.positions);
        let intent = TransactionIntent::new(
            vec![msg],
            format!("liquidate:{}", candidate.position_id),
        )
        .with_display_amount(format!("fee {:.2}", candidate.fee));

        let outcome = self.pipeline.execute(&intent).await?;
        if matches!(outcome, PipelineOutcome::Confirmed(_)) {
            for key in [
                QueryKey::Positions,
                QueryKey::Balances,
                QueryKey::LiquidationInfo,
            ] {
                self.bus.invalidate(key);
            }
        }
        Ok(outcome)
    }

    /// Build the combined claim view and message batch for one user,
    /// deduplicated by user so concurrent requests share one computation.
    pub async fn plan_claims(&self, user: &str) -> Result<(ClaimSummary, Vec<WireMsg>)> {
        let key = format!("claims:{user}");
        self.claims_cache
            .get_or_fetch(&key, QueryKey::LiquidationInfo, || self.build_claim_plan(user))
            .await
    }

    /// Each source is probed independently; a source whose dry-run fails
    /// is reported in the summary but excluded from the batch.
    async fn build_claim_plan(&self, user: &str) -> Result<(ClaimSummary, Vec<WireMsg>)> {
        let (liq_coins, pool_coins, staking_dto, vesting_coins) = futures::try_join!(
            self.source.liquidation_claims(user),
            self.source.pool_claims(user),
            self.source.staking(user),
            self.source.allocations(user),
        )?;

        let contracts = &self.config.contracts;
        let liquidation = self
            .sub_claim(user, claimables(&liq_coins), &contracts.liq_queue)
            .await?;
        let pool_unstaking = self
            .sub_claim(user, claimables(&pool_coins), &contracts.stability_pool)
            .await?;

        let mut staking_claims = claimables(&staking_dto.claimable);
        staking_claims.extend(claimables(&staking_dto.unstaking));
        let staking = self
            .sub_claim(user, staking_claims, &contracts.staking)
            .await?;

        let vesting = self
            .sub_claim(user, claimables(&vesting_coins), &contracts.vesting)
            .await?;

        let inputs = ClaimInputs {
            liquidation,
            pool_unstaking,
            staking,
            vesting,
        };
        Ok(ClaimAggregator::aggregate(&inputs))
    }

    /// Build one source's sub-claim: derive its claim message when there
    /// is anything to collect, then probe it against the signer.
    async fn sub_claim(
        &self,
        user: &str,
        claims: Vec<Claimable>,
        contract: &str,
    ) -> Result<SubClaim> {
        if claims.iter().all(|c| c.amount == 0) {
            return Ok(SubClaim::new(claims, Vec::new(), true));
        }
        let msg = ExecuteMsg::claim(vec![user.to_string()], None)?.to_wire(contract);
        let msgs = vec![msg];
        let simulate_ok = match self.pipeline.probe(&msgs).await {
            Ok(_) => true,
            Err(e) => {
                debug!(contract, error = %e, "sub-claim dry run failed");
                false
            }
        };
        Ok(SubClaim::new(claims, msgs, simulate_ok))
    }

    /// Claim everything claimable for `user` in one transaction.
    ///
    /// Missing claim inputs are not an error: the submit resolves to an
    /// inert nothing-to-do until the upstream reads recover.
    #[instrument(skip(self))]
    pub async fn claim_all(&self, user: &str) -> Result<(ClaimSummary, PipelineOutcome)> {
        let (summary, msgs) = match self.plan_claims(user).await {
            Ok(plan) => plan,
            Err(e) => {
                debug!(error = %e, "claim inputs unavailable, nothing to submit");
                return Ok((ClaimSummary::default(), PipelineOutcome::NothingToDo));
            }
        };

        self.availability.lock().observe(
            !summary.is_empty(),
            self.pipeline.is_busy(),
            Utc::now(),
        );

        if msgs.is_empty() {
            debug!("nothing claimable");
            return Ok((summary, PipelineOutcome::NothingToDo));
        }

        let display = summary
            .totals()
            .iter()
            .map(|(denom, amount)| format!("{amount}{denom}"))
            .collect::<Vec<_>>()
            .join(" + ");
        let intent = TransactionIntent::new(msgs, format!("claims:{user}"))
            .with_display_amount(display);

        let outcome = self.pipeline.execute(&intent).await?;
        if matches!(outcome, PipelineOutcome::Confirmed(_)) {
            for key in [
                QueryKey::Balances,
                QueryKey::LiquidationInfo,
                QueryKey::UserBids,
                QueryKey::StabilityAssetPool,
                QueryKey::Staked,
                QueryKey::Allocations,
            ] {
                self.bus.invalidate(key);
            }
        }
        Ok((summary, outcome))
    }

    /// Poll whether the claim action should stay enabled.
    pub fn claim_enabled(&self, has_claimables: bool, now: DateTime<Utc>) -> bool {
        self.availability
            .lock()
            .observe(has_claimables, self.pipeline.is_busy(), now)
    }

    /// Scan loop: evaluate and liquidate on a fixed interval.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.scan_interval());
        info!(
            basket_id = self.config.basket_id,
            interval_ms = self.config.scan_interval_ms,
            "scan loop started"
        );

        loop {
            ticker.tick().await;

            let report = match self.evaluate_now().await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "snapshot failed, skipping tick");
                    continue;
                }
            };

            if report.is_empty() {
                debug!("no liquidatable positions");
                continue;
            }

            info!(
                candidates = report.liquidatable.len(),
                undiscounted_revenue = report.undiscounted_expected_revenue,
                discounted_revenue = report.discounted_expected_revenue,
                "liquidation candidates found"
            );

            for candidate in report
                .liquidatable
                .iter()
                .take(self.config.max_liquidations_per_tick)
            {
                match self.liquidate(candidate).await {
                    Ok(PipelineOutcome::Confirmed(res)) => {
                        info!(
                            position_id = candidate.position_id,
                            hash = %res.hash,
                            "position liquidated"
                        );
                    }
                    Ok(outcome) => {
                        debug!(position_id = candidate.position_id, ?outcome, "not submitted");
                    }
                    Err(e) => {
                        warn!(
                            position_id = candidate.position_id,
                            error = %e,
                            "liquidation failed"
                        );
                    }
                }
            }
        }
    }
}

/// Parse indexer coins into claimables, skipping malformed amounts.
fn claimables(coins: &[CoinDto]) -> Vec<Claimable> {
    coins
        .iter()
        .filter_map(|coin| match coin.amount.parse::<u128>() {
            Ok(amount) => Some(Claimable::new(coin.denom.clone(), amount)),
            Err(_) => {
                warn!(denom = %coin.denom, raw = %coin.amount, "malformed claim amount, skipped");
                None
            }
        })
        .collect()
}
