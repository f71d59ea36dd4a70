use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::utxo::Utxo;

/// Failures talking to a chain data provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure, timeout or server-side error.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider understood the request and refused it.
    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// Read and broadcast access to a UTXO chain.
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Unspent outputs of `address`, in the provider's order.
    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;

    /// Raw consensus bytes of a transaction.
    async fn raw_tx(&self, txid: &str) -> Result<Vec<u8>, ProviderError>;

    /// Confirmed balance of `address` in smallest units.
    async fn balance(&self, address: &str) -> Result<u64, ProviderError>;

    /// Submit a signed transaction; returns the txid the provider reports.
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraChainStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraAddress {
    chain_stats: EsploraChainStats,
}

/// HTTP client for an Esplora-compatible REST API.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: reqwest::Client,
    base_url: String,
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(ProviderError::Unavailable(format!("{status}: {body}")))
        } else {
            Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl ChainDataProvider for EsploraClient {
    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/address/{address}/utxo")))
            .send()
            .await?;
        let entries: Vec<EsploraUtxo> = Self::checked(response).await?.json().await?;
        tracing::debug!(address, count = entries.len(), "fetched utxos");

        Ok(entries
            .into_iter()
            .map(|e| Utxo {
                txid: e.txid,
                vout: e.vout,
                amount_sat: e.value,
                script_pubkey: Vec::new(),
            })
            .collect())
    }

    async fn raw_tx(&self, txid: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/tx/{txid}/hex")))
            .send()
            .await?;
        let body = Self::checked(response).await?.text().await?;
        hex::decode(body.trim()).map_err(|e| ProviderError::Malformed(format!("tx {txid}: {e}")))
    }

    async fn balance(&self, address: &str) -> Result<u64, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/address/{address}")))
            .send()
            .await?;
        let info: EsploraAddress = Self::checked(response).await?.json().await?;
        Ok(info
            .chain_stats
            .funded_txo_sum
            .saturating_sub(info.chain_stats.spent_txo_sum))
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.url("/tx"))
            .header("Content-Type", "text/plain")
            .body(raw_tx_hex.to_string())
            .send()
            .await?;
        let txid = Self::checked(response).await?.text().await?;
        Ok(txid.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(ProviderError::Unavailable("timeout".into()).is_transient());
        assert!(!ProviderError::Rejected {
            status: 400,
            body: "bad-txns".into()
        }
        .is_transient());
        assert!(!ProviderError::Malformed("eof".into()).is_transient());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            EsploraClient::new("https://blockstream.info/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://blockstream.info/api");
        assert_eq!(client.url("/tx"), "https://blockstream.info/api/tx");
    }

    #[test]
    fn esplora_utxo_json_parses() {
        let json = r#"[{"txid":"abcd","vout":1,"status":{"confirmed":true},"value":12345}]"#;
        let entries: Vec<EsploraUtxo> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, 12_345);
        assert_eq!(entries[0].vout, 1);
    }

    #[test]
    fn esplora_address_json_parses() {
        let json = r#"{"address":"tb1q","chain_stats":{"funded_txo_count":2,"funded_txo_sum":150000,"spent_txo_count":1,"spent_txo_sum":50000,"tx_count":3}}"#;
        let info: EsploraAddress = serde_json::from_str(json).unwrap();
        assert_eq!(
            info.chain_stats.funded_txo_sum - info.chain_stats.spent_txo_sum,
            100_000
        );
    }
}
