//! Per-call timeouts and bounded retry around the upstream collaborators.
//!
//! Only idempotent reads are retried. Broadcasts, channel opens and closes,
//! payments and invoice creation run exactly once under the timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chain_ln::{ClosedChannel, Invoice, LightningApi, LightningError, OpenedChannel, Payment};
use chain_utxo::{ChainDataProvider, ProviderError, Utxo};

/// Errors the retry loop knows how to classify.
pub trait UpstreamError: Sized + std::fmt::Display {
    fn is_transient(&self) -> bool;
    fn timed_out(operation: &'static str, after: Duration) -> Self;
}

impl UpstreamError for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }

    fn timed_out(operation: &'static str, after: Duration) -> Self {
        ProviderError::Unavailable(format!("{operation} timed out after {after:?}"))
    }
}

impl UpstreamError for LightningError {
    fn is_transient(&self) -> bool {
        LightningError::is_transient(self)
    }

    fn timed_out(operation: &'static str, after: Duration) -> Self {
        LightningError::Unavailable(format!("{operation} timed out after {after:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run one call under the timeout.
    pub async fn once<T, E, Fut>(&self, operation: &'static str, call: Fut) -> Result<T, E>
    where
        E: UpstreamError,
        Fut: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "upstream call timed out");
                Err(E::timed_out(operation, self.timeout))
            }
        }
    }

    /// Run an idempotent call, retrying transient failures with exponential
    /// backoff until `max_attempts` is reached.
    pub async fn retrying<T, E, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, E>
    where
        E: UpstreamError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.once(operation, call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Chain data provider with timeouts on every call and retries on reads.
pub struct RetryingChainProvider {
    inner: Arc<dyn ChainDataProvider>,
    policy: RetryPolicy,
}

impl RetryingChainProvider {
    pub fn new(inner: Arc<dyn ChainDataProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ChainDataProvider for RetryingChainProvider {
    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        self.policy
            .retrying("utxos", || self.inner.utxos(address))
            .await
    }

    async fn raw_tx(&self, txid: &str) -> Result<Vec<u8>, ProviderError> {
        self.policy
            .retrying("raw_tx", || self.inner.raw_tx(txid))
            .await
    }

    async fn balance(&self, address: &str) -> Result<u64, ProviderError> {
        self.policy
            .retrying("balance", || self.inner.balance(address))
            .await
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ProviderError> {
        self.policy
            .once("broadcast", self.inner.broadcast(raw_tx_hex))
            .await
    }
}

/// Lightning API with timeouts on every call and retries on balance reads.
pub struct RetryingLightningApi {
    inner: Arc<dyn LightningApi>,
    policy: RetryPolicy,
}

impl RetryingLightningApi {
    pub fn new(inner: Arc<dyn LightningApi>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LightningApi for RetryingLightningApi {
    async fn register_wallet(&self, private_key_hex: &str) -> Result<String, LightningError> {
        self.policy
            .once("register_wallet", self.inner.register_wallet(private_key_hex))
            .await
    }

    async fn channel_balance(&self, wallet_id: &str) -> Result<u64, LightningError> {
        self.policy
            .retrying("channel_balance", || self.inner.channel_balance(wallet_id))
            .await
    }

    async fn open_channel(
        &self,
        wallet_id: &str,
        node_uri: &str,
        amount_sat: u64,
    ) -> Result<OpenedChannel, LightningError> {
        self.policy
            .once(
                "open_channel",
                self.inner.open_channel(wallet_id, node_uri, amount_sat),
            )
            .await
    }

    async fn close_channel(
        &self,
        wallet_id: &str,
        channel_id: &str,
    ) -> Result<ClosedChannel, LightningError> {
        self.policy
            .once("close_channel", self.inner.close_channel(wallet_id, channel_id))
            .await
    }

    async fn create_invoice(
        &self,
        wallet_id: &str,
        amount_sat: u64,
        memo: &str,
    ) -> Result<Invoice, LightningError> {
        self.policy
            .once(
                "create_invoice",
                self.inner.create_invoice(wallet_id, amount_sat, memo),
            )
            .await
    }

    async fn pay_invoice(
        &self,
        wallet_id: &str,
        payment_request: &str,
    ) -> Result<Payment, LightningError> {
        self.policy
            .once("pay_invoice", self.inner.pay_invoice(wallet_id, payment_request))
            .await
    }
}
