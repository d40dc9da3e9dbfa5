//! Transaction pipeline: simulate -> fee-buffer -> sign -> broadcast.
//!
//! The pipeline owns the full submit cycle for a message batch and exposes
//! its current step through an observable state. Failure at any step moves
//! to `Failed` with a typed reason. One failure kind is auto-recoverable:
//! a slippage-classified rejection re-enters simulation with a widened
//! tolerance, bounded by a hard retry cap.
//!
//! Missing input is not a failure: an empty intent resolves to
//! `PipelineOutcome::NothingToDo` without touching the signer.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;
use crate::gas::{Fee, GasPolicyTable};
use crate::msg::{TransactionIntent, WireMsg};
use crate::signer::{BroadcastResult, TxSigner};

/// Hard cap on slippage auto-retries beyond the initial attempt.
/// Each retry widens the tolerance by one percentage point.
pub const MAX_SLIPPAGE_RETRIES: u32 = 5;

/// Tolerance increase per slippage retry, in percentage points.
pub const SLIPPAGE_STEP_PCT: f64 = 1.0;

/// Observable pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Simulating,
    Simulated(Fee),
    Signing,
    Broadcasting,
    Confirmed(BroadcastResult),
    Failed(PipelineError),
}

/// Result of driving an intent through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The transaction executed on chain.
    Confirmed(BroadcastResult),
    /// The intent carried no messages; nothing was submitted.
    NothingToDo,
    /// An identical intent (same cache key) is already in flight.
    AlreadyInFlight,
}

/// Simulate/sign/broadcast state machine over a black-box signer.
pub struct TransactionPipeline<S> {
    signer: Arc<S>,
    gas_policies: GasPolicyTable,
    chain_id: String,
    state: RwLock<PipelineState>,
    in_flight: Mutex<HashSet<String>>,
}

impl<S: TxSigner> TransactionPipeline<S> {
    pub fn new(signer: Arc<S>, gas_policies: GasPolicyTable, chain_id: impl Into<String>) -> Self {
        Self {
            signer,
            gas_policies,
            chain_id: chain_id.into(),
            state: RwLock::new(PipelineState::Idle),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Current pipeline step.
    pub fn state(&self) -> PipelineState {
        self.state.read().clone()
    }

    /// Whether any submit cycle is currently between Simulating and
    /// Broadcasting. Used by callers to hold off disabling claim actions.
    pub fn is_busy(&self) -> bool {
        matches!(
            *self.state.read(),
            PipelineState::Simulating
                | PipelineState::Simulated(_)
                | PipelineState::Signing
                | PipelineState::Broadcasting
        )
    }

    fn set_state(&self, next: PipelineState) {
        debug!(state = ?next, "pipeline transition");
        *self.state.write() = next;
    }

    /// Simulation-only probe: estimate and buffer a fee for a message list
    /// without entering the submit cycle. Empty input yields `None` rather
    /// than an error, per the missing-input propagation rule.
    pub async fn probe(&self, msgs: &[WireMsg]) -> Result<Option<Fee>, PipelineError> {
        if msgs.is_empty() {
            return Ok(None);
        }
        let raw = self
            .signer
            .estimate_fee(msgs)
            .await
            .map_err(|e| PipelineError::simulation(e.to_string()))?;
        Ok(Some(self.gas_policies.apply(&self.chain_id, raw)))
    }

    /// Drive one intent through simulate -> sign -> broadcast.
    #[instrument(skip(self, intent), fields(key = %intent.cache_key))]
    pub async fn execute(
        &self,
        intent: &TransactionIntent,
    ) -> Result<PipelineOutcome, PipelineError> {
        if intent.is_empty() {
            debug!("intent has no messages, nothing to submit");
            return Ok(PipelineOutcome::NothingToDo);
        }

        if !self.in_flight.lock().insert(intent.cache_key.clone()) {
            debug!("identical intent already in flight, deduplicated");
            return Ok(PipelineOutcome::AlreadyInFlight);
        }

        let result = self.run(intent).await;
        self.in_flight.lock().remove(&intent.cache_key);
        result.map(PipelineOutcome::Confirmed)
    }

    async fn run(&self, intent: &TransactionIntent) -> Result<BroadcastResult, PipelineError> {
        self.set_state(PipelineState::Simulating);
        let raw = match self.signer.estimate_fee(&intent.msgs).await {
            Ok(fee) => fee,
            Err(e) => return Err(self.fail(PipelineError::simulation(e.to_string()))),
        };

        let fee = self.gas_policies.apply(&self.chain_id, raw);
        self.set_state(PipelineState::Simulated(fee.clone()));

        self.set_state(PipelineState::Signing);
        let signed = match self.signer.sign(&intent.msgs, &fee).await {
            Ok(tx) => tx,
            Err(e) => {
                return Err(self.fail(PipelineError::SigningRejected {
                    reason: e.to_string(),
                }))
            }
        };

        self.set_state(PipelineState::Broadcasting);
        let result = match self.signer.broadcast(&signed).await {
            Ok(res) => res,
            Err(e) => return Err(self.fail(PipelineError::Transport(e.to_string()))),
        };

        if !result.is_success() {
            return Err(self.fail(PipelineError::Broadcast {
                code: result.code,
                raw_log: result.raw_log,
            }));
        }

        info!(
            hash = %result.hash,
            gas_limit = fee.gas_limit,
            fee = %fee.amount.amount,
            "transaction confirmed"
        );
        self.set_state(PipelineState::Confirmed(result.clone()));
        Ok(result)
    }

    fn fail(&self, err: PipelineError) -> PipelineError {
        warn!(error = %err, "pipeline step failed");
        self.set_state(PipelineState::Failed(err.clone()));
        err
    }

    /// Execute with slippage auto-recovery.
    ///
    /// `build` derives the intent for a given slippage tolerance (percent).
    /// A slippage-classified failure widens the tolerance by
    /// [`SLIPPAGE_STEP_PCT`] and re-enters simulation, up to
    /// [`MAX_SLIPPAGE_RETRIES`] retries; any other failure surfaces
    /// immediately.
    pub async fn execute_adaptive<F>(
        &self,
        mut build: F,
        base_slippage_pct: f64,
    ) -> Result<PipelineOutcome, PipelineError>
    where
        F: FnMut(f64) -> TransactionIntent,
    {
        let mut slippage = base_slippage_pct;
        let mut attempt = 0u32;
        loop {
            match self.execute(&build(slippage)).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_slippage() && attempt < MAX_SLIPPAGE_RETRIES => {
                    attempt += 1;
                    slippage += SLIPPAGE_STEP_PCT;
                    warn!(
                        attempt,
                        slippage_pct = slippage,
                        "slippage exceeded, widening tolerance and re-simulating"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<S> std::fmt::Debug for TransactionPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionPipeline")
            .field("chain_id", &self.chain_id)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::GasPolicy;
    use crate::msg::{Coin, ExecuteMsg};
    use crate::signer::SignedTx;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted signer: pops canned responses, counts calls.
    struct MockSigner {
        estimates: Mutex<VecDeque<Result<Fee, String>>>,
        sign_error: Option<String>,
        broadcasts: Mutex<VecDeque<BroadcastResult>>,
        estimate_calls: AtomicUsize,
        estimate_delay: Option<Duration>,
    }

    impl MockSigner {
        fn happy() -> Self {
            Self {
                estimates: Mutex::new(VecDeque::new()),
                sign_error: None,
                broadcasts: Mutex::new(VecDeque::new()),
                estimate_calls: AtomicUsize::new(0),
                estimate_delay: None,
            }
        }

        fn with_estimate_err(self, err: &str) -> Self {
            self.estimates
                .lock()
                .push_back(Err(err.to_string()));
            self
        }

        fn estimate_count(&self) -> usize {
            self.estimate_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TxSigner for MockSigner {
        fn address(&self) -> &str {
            "osmo1mock"
        }

        async fn estimate_fee(&self, _msgs: &[WireMsg]) -> Result<Fee> {
            self.estimate_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.estimate_delay {
                tokio::time::sleep(delay).await;
            }
            match self.estimates.lock().pop_front() {
                Some(Ok(fee)) => Ok(fee),
                Some(Err(e)) => anyhow::bail!(e),
                None => Ok(Fee::new(200_000, Coin::new("uosmo", 5_000))),
            }
        }

        async fn sign(&self, _msgs: &[WireMsg], _fee: &Fee) -> Result<SignedTx> {
            match &self.sign_error {
                Some(e) => anyhow::bail!(e.clone()),
                None => Ok(SignedTx {
                    tx_bytes: "c2lnbmVk".into(),
                }),
            }
        }

        async fn broadcast(&self, _tx: &SignedTx) -> Result<BroadcastResult> {
            Ok(self.broadcasts.lock().pop_front().unwrap_or(BroadcastResult {
                hash: "HASH".into(),
                code: 0,
                raw_log: String::new(),
            }))
        }
    }

    fn intent(key: &str) -> TransactionIntent {
        let msg = ExecuteMsg::liquidate(1, "osmo1owner").to_wire("osmo1positions");
        TransactionIntent::new(vec![msg], key)
    }

    fn buffered_table() -> GasPolicyTable {
        let mut table = GasPolicyTable::new();
        table.insert(
            "osmosis-1",
            GasPolicy {
                gas_buffer: 1.5,
                fee_denom: "uosmo".into(),
                gas_price: 0.025,
            },
        );
        table
    }

    #[tokio::test]
    async fn test_success_path_applies_gas_buffer() {
        let pipeline = TransactionPipeline::new(
            Arc::new(MockSigner::happy()),
            buffered_table(),
            "osmosis-1",
        );

        let outcome = pipeline.execute(&intent("liq:1")).await.unwrap();
        match outcome {
            PipelineOutcome::Confirmed(res) => assert_eq!(res.hash, "HASH"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Raw estimate 200k gas buffered by 1.5 and repriced at 0.025
        match pipeline.state() {
            PipelineState::Confirmed(_) => {}
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_applies_gas_buffer() {
        let signer = Arc::new(MockSigner::happy());
        let pipeline = TransactionPipeline::new(signer, buffered_table(), "osmosis-1");

        let fee = pipeline
            .probe(&intent("probe").msgs)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fee.gas_limit, 300_000); // ceil(200_000 * 1.5)
        assert_eq!(fee.amount, Coin::new("uosmo", 7_500));
    }

    #[tokio::test]
    async fn test_probe_empty_is_inert() {
        let signer = Arc::new(MockSigner::happy());
        let pipeline = TransactionPipeline::new(signer.clone(), GasPolicyTable::new(), "osmosis-1");

        assert_eq!(pipeline.probe(&[]).await.unwrap(), None);
        assert_eq!(signer.estimate_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_intent_is_nothing_to_do() {
        let signer = Arc::new(MockSigner::happy());
        let pipeline = TransactionPipeline::new(signer.clone(), GasPolicyTable::new(), "osmosis-1");

        let empty = TransactionIntent::new(vec![], "noop");
        assert_eq!(
            pipeline.execute(&empty).await.unwrap(),
            PipelineOutcome::NothingToDo
        );
        assert_eq!(signer.estimate_count(), 0);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_signing_rejection_is_surfaced() {
        let mut signer = MockSigner::happy();
        signer.sign_error = Some("user denied".into());
        let pipeline =
            TransactionPipeline::new(Arc::new(signer), GasPolicyTable::new(), "osmosis-1");

        let err = pipeline.execute(&intent("liq:2")).await.unwrap_err();
        assert!(matches!(err, PipelineError::SigningRejected { .. }));
        assert!(matches!(pipeline.state(), PipelineState::Failed(_)));
    }

    #[tokio::test]
    async fn test_broadcast_failure_code_is_surfaced() {
        let signer = MockSigner::happy();
        signer.broadcasts.lock().push_back(BroadcastResult {
            hash: "BAD".into(),
            code: 11,
            raw_log: "out of gas".into(),
        });
        let pipeline =
            TransactionPipeline::new(Arc::new(signer), GasPolicyTable::new(), "osmosis-1");

        let err = pipeline.execute(&intent("liq:3")).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::Broadcast {
                code: 11,
                raw_log: "out of gas".into()
            }
        );
    }

    #[tokio::test]
    async fn test_slippage_retry_is_bounded() {
        // Every simulation reports a slippage condition
        let signer = MockSigner::happy();
        for _ in 0..16 {
            signer
                .estimates
                .lock()
                .push_back(Err("max spread exceeded".to_string()));
        }
        let signer = Arc::new(signer);
        let pipeline =
            TransactionPipeline::new(signer.clone(), GasPolicyTable::new(), "osmosis-1");

        let seen = Mutex::new(Vec::new());
        let err = pipeline
            .execute_adaptive(
                |slippage| {
                    seen.lock().push(slippage);
                    intent("swap:1")
                },
                1.0,
            )
            .await
            .unwrap_err();

        assert!(err.is_slippage());
        // Initial attempt plus exactly MAX_SLIPPAGE_RETRIES retries
        assert_eq!(signer.estimate_count(), 1 + MAX_SLIPPAGE_RETRIES as usize);
        // Tolerance widened one point per retry: 1, 2, 3, 4, 5, 6
        assert_eq!(*seen.lock(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[tokio::test]
    async fn test_non_slippage_failure_is_not_retried() {
        let signer = Arc::new(MockSigner::happy().with_estimate_err("insufficient funds"));
        let pipeline =
            TransactionPipeline::new(signer.clone(), GasPolicyTable::new(), "osmosis-1");

        let err = pipeline
            .execute_adaptive(|_| intent("swap:2"), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Simulation { slippage: false, .. }));
        assert_eq!(signer.estimate_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_intents_deduplicate() {
        let mut signer = MockSigner::happy();
        signer.estimate_delay = Some(Duration::from_millis(50));
        let pipeline = Arc::new(TransactionPipeline::new(
            Arc::new(signer),
            GasPolicyTable::new(),
            "osmosis-1",
        ));

        let first = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.execute(&intent("claim:osmo1u")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = pipeline.execute(&intent("claim:osmo1u")).await.unwrap();
        assert_eq!(second, PipelineOutcome::AlreadyInFlight);

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, PipelineOutcome::Confirmed(_)));
    }
}
