use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::LightningError;

/// A channel the node reports as opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedChannel {
    #[serde(alias = "id")]
    pub channel_id: String,
    pub funding_txid: String,
    #[serde(alias = "capacity")]
    pub capacity_sat: u64,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedChannel {
    pub closing_txid: String,
    #[serde(alias = "settled_balance")]
    pub settled_balance_sat: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub payment_request: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub status: String,
    #[serde(alias = "amount")]
    pub amount_sat: u64,
    /// Payment hash, when the node reports one.
    #[serde(default)]
    pub payment_hash: Option<String>,
}

/// Custodial Lightning node API. Every wallet is registered once with its
/// private key and addressed by the returned wallet id afterwards.
#[async_trait]
pub trait LightningApi: Send + Sync {
    async fn register_wallet(&self, private_key_hex: &str) -> Result<String, LightningError>;

    /// Spendable channel balance in satoshis.
    async fn channel_balance(&self, wallet_id: &str) -> Result<u64, LightningError>;

    async fn open_channel(
        &self,
        wallet_id: &str,
        node_uri: &str,
        amount_sat: u64,
    ) -> Result<OpenedChannel, LightningError>;

    async fn close_channel(
        &self,
        wallet_id: &str,
        channel_id: &str,
    ) -> Result<ClosedChannel, LightningError>;

    async fn create_invoice(
        &self,
        wallet_id: &str,
        amount_sat: u64,
        memo: &str,
    ) -> Result<Invoice, LightningError>;

    async fn pay_invoice(
        &self,
        wallet_id: &str,
        payment_request: &str,
    ) -> Result<Payment, LightningError>;
}

#[derive(Debug, Deserialize)]
struct RegisteredWallet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WalletBalance {
    balance: u64,
}

/// reqwest client for the node's REST API.
#[derive(Debug, Clone)]
pub struct HttpLightningClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLightningClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LightningError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| LightningError::Malformed(format!("api key header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| LightningError::Unavailable(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, LightningError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(LightningError::NotFound(path.to_string()))
        } else if status.is_server_error() {
            Err(LightningError::Unavailable(format!("{status}: {body}")))
        } else {
            Err(LightningError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LightningError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(path, response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, LightningError> {
        let response = self.client.post(self.url(path)).json(&body).send().await?;
        Self::decode(path, response).await
    }
}

#[async_trait]
impl LightningApi for HttpLightningClient {
    async fn register_wallet(&self, private_key_hex: &str) -> Result<String, LightningError> {
        let wallet: RegisteredWallet = self
            .post("/wallets", json!({ "private_key": private_key_hex }))
            .await?;
        tracing::info!(wallet_id = %wallet.id, "registered lightning wallet");
        Ok(wallet.id)
    }

    async fn channel_balance(&self, wallet_id: &str) -> Result<u64, LightningError> {
        let balance: WalletBalance = self.get(&format!("/wallets/{wallet_id}/balance")).await?;
        Ok(balance.balance)
    }

    async fn open_channel(
        &self,
        wallet_id: &str,
        node_uri: &str,
        amount_sat: u64,
    ) -> Result<OpenedChannel, LightningError> {
        if amount_sat == 0 {
            return Err(LightningError::InvalidAmount(
                "channel amount must be positive".into(),
            ));
        }
        self.post(
            &format!("/wallets/{wallet_id}/channels"),
            json!({ "node_uri": node_uri, "amount": amount_sat }),
        )
        .await
    }

    async fn close_channel(
        &self,
        wallet_id: &str,
        channel_id: &str,
    ) -> Result<ClosedChannel, LightningError> {
        self.post(
            &format!("/wallets/{wallet_id}/channels/{channel_id}/close"),
            json!({}),
        )
        .await
    }

    async fn create_invoice(
        &self,
        wallet_id: &str,
        amount_sat: u64,
        memo: &str,
    ) -> Result<Invoice, LightningError> {
        if amount_sat == 0 {
            return Err(LightningError::InvalidAmount(
                "invoice amount must be positive".into(),
            ));
        }
        self.post(
            &format!("/wallets/{wallet_id}/invoices"),
            json!({ "amount": amount_sat, "description": memo, "currency": "BTC" }),
        )
        .await
    }

    async fn pay_invoice(
        &self,
        wallet_id: &str,
        payment_request: &str,
    ) -> Result<Payment, LightningError> {
        self.post(
            &format!("/wallets/{wallet_id}/pay"),
            json!({ "payment_request": payment_request }),
        )
        .await
    }
}
