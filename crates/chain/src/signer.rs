//! Transaction signer and broadcaster abstraction.
//!
//! The pipeline treats the signer as a black box with three operations:
//! estimate a fee for a message list, sign it, broadcast the signed bytes.
//! The production implementation delegates signing to a remote signing
//! sidecar over HTTP and broadcasts through the chain's REST endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::gas::Fee;
use crate::msg::{Coin, WireMsg};

/// An opaque signed transaction, base64 tx bytes as returned by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub tx_bytes: String,
}

/// Outcome of handing a signed transaction to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub hash: String,
    pub code: u32,
    pub raw_log: String,
}

impl BroadcastResult {
    /// Code zero means the transaction executed successfully.
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Signer/broadcaster contract the pipeline runs against.
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Bech32 address of the signing account.
    fn address(&self) -> &str;

    /// Dry-run the message list and return the raw fee estimate.
    async fn estimate_fee(&self, msgs: &[WireMsg]) -> Result<Fee>;

    /// Sign the message list at the given fee.
    async fn sign(&self, msgs: &[WireMsg], fee: &Fee) -> Result<SignedTx>;

    /// Broadcast a signed transaction and return the chain's result.
    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastResult>;
}

/// Remote signer: simulation and signing go to a signing sidecar,
/// broadcast goes straight to the chain's REST endpoint.
pub struct HttpSigner {
    client: reqwest::Client,
    signer_url: String,
    lcd_url: String,
    address: String,
}

#[derive(Serialize)]
struct SimulateRequest<'a> {
    signer: &'a str,
    msgs: &'a [WireMsg],
}

#[derive(Deserialize)]
struct SimulateResponse {
    gas_used: u64,
    fee_amount: String,
    fee_denom: String,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    signer: &'a str,
    msgs: &'a [WireMsg],
    fee: &'a Fee,
}

#[derive(Deserialize)]
struct SignResponse {
    tx_bytes: String,
}

#[derive(Serialize)]
struct BroadcastRequest<'a> {
    tx_bytes: &'a str,
    mode: &'static str,
}

#[derive(Deserialize)]
struct BroadcastResponse {
    tx_response: TxResponse,
}

#[derive(Deserialize)]
struct TxResponse {
    txhash: String,
    code: u32,
    #[serde(default)]
    raw_log: String,
}

impl HttpSigner {
    pub fn new(
        signer_url: impl Into<String>,
        lcd_url: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        let signer = Self {
            client: reqwest::Client::new(),
            signer_url: signer_url.into(),
            lcd_url: lcd_url.into(),
            address: address.into(),
        };
        info!(address = %signer.address, "remote signer initialized");
        signer
    }
}

#[async_trait]
impl TxSigner for HttpSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn estimate_fee(&self, msgs: &[WireMsg]) -> Result<Fee> {
        let start = Instant::now();
        let resp: SimulateResponse = self
            .client
            .post(format!("{}/simulate", self.signer_url))
            .json(&SimulateRequest {
                signer: &self.address,
                msgs,
            })
            .send()
            .await
            .context("simulate request failed")?
            .error_for_status()
            .context("simulate rejected")?
            .json()
            .await
            .context("malformed simulate response")?;

        let amount: u128 = resp
            .fee_amount
            .parse()
            .context("malformed fee amount in simulate response")?;

        debug!(
            gas_used = resp.gas_used,
            fee = %resp.fee_amount,
            elapsed_ms = start.elapsed().as_millis(),
            "fee estimated"
        );

        Ok(Fee::new(resp.gas_used, Coin::new(resp.fee_denom, amount)))
    }

    async fn sign(&self, msgs: &[WireMsg], fee: &Fee) -> Result<SignedTx> {
        let resp: SignResponse = self
            .client
            .post(format!("{}/sign", self.signer_url))
            .json(&SignRequest {
                signer: &self.address,
                msgs,
                fee,
            })
            .send()
            .await
            .context("sign request failed")?
            .error_for_status()
            .context("signer declined")?
            .json()
            .await
            .context("malformed sign response")?;

        Ok(SignedTx {
            tx_bytes: resp.tx_bytes,
        })
    }

    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastResult> {
        let start = Instant::now();
        let resp: BroadcastResponse = self
            .client
            .post(format!("{}/cosmos/tx/v1beta1/txs", self.lcd_url))
            .json(&BroadcastRequest {
                tx_bytes: &tx.tx_bytes,
                mode: "BROADCAST_MODE_SYNC",
            })
            .send()
            .await
            .context("broadcast request failed")?
            .error_for_status()
            .context("broadcast rejected")?
            .json()
            .await
            .context("malformed broadcast response")?;

        info!(
            hash = %resp.tx_response.txhash,
            code = resp.tx_response.code,
            elapsed_ms = start.elapsed().as_millis(),
            "transaction broadcast"
        );

        Ok(BroadcastResult {
            hash: resp.tx_response.txhash,
            code: resp.tx_response.code,
            raw_log: resp.tx_response.raw_log,
        })
    }
}

impl std::fmt::Debug for HttpSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSigner")
            .field("address", &self.address)
            .field("signer_url", &self.signer_url)
            .field("lcd_url", &self.lcd_url)
            .finish_non_exhaustive()
    }
}
