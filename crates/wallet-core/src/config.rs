//! Engine configuration from environment variables.

use std::env;
use std::time::Duration;

use chain_utxo::{ChainParams, FeePolicy, Network, UtxoChain};

use crate::retry::RetryPolicy;
use crate::types::AssetType;

const DEFAULT_LIGHTNING_API_URL: &str = "https://api.opennode.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 200;

/// Public nodes tried in order when a channel request names none.
const DEFAULT_CANDIDATE_NODES: [&str; 3] = [
    "03864ef025fde8fb587d989186ce6a4a186895ee44a926bfc370e2c366597a3f8f@3.33.236.230:9735",
    "035e4ff418fc8b5554c5d9eea66396c227bd429a3251c8cbc711002ba215bfc226@170.75.163.209:9735",
    "02f1a8c87607f415c8f22c00593002775941dea48869ce23096af27b0cfdcc0b69@52.13.118.208:9735",
];

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub network: Network,
    pub bitcoin_esplora_url: String,
    pub litecoin_esplora_url: String,
    pub lightning_api_url: String,
    pub lightning_api_key: Option<String>,
    /// Upper bound on every collaborator call.
    pub request_timeout: Duration,
    /// Attempts per idempotent read, including the first.
    pub retry_attempts: u32,
    /// Backoff before the second attempt; doubles afterwards.
    pub retry_base_delay: Duration,
    pub candidate_nodes: Vec<String>,
    pub bitcoin_fixed_fee_sat: u64,
    pub litecoin_fixed_fee_sat: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WALLET_NETWORK`: "testnet" (default) or "mainnet"
    /// - `BITCOIN_ESPLORA_URL`, `LITECOIN_ESPLORA_URL`: Esplora endpoints
    ///   (default per network)
    /// - `LIGHTNING_API_URL`, `LIGHTNING_API_KEY`: custodial node API
    /// - `WALLET_REQUEST_TIMEOUT_SECS` (30), `WALLET_RETRY_ATTEMPTS` (3),
    ///   `WALLET_RETRY_BASE_MS` (200)
    /// - `LIGHTNING_CANDIDATE_NODES`: comma-separated node URIs
    /// - `BITCOIN_FIXED_FEE_SAT`, `LITECOIN_FIXED_FEE_SAT` (1000)
    pub fn from_env() -> Self {
        let network = match env::var("WALLET_NETWORK")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "mainnet" => {
                tracing::info!("using mainnet");
                Network::Mainnet
            }
            "testnet" | "" => {
                tracing::info!("using testnet");
                Network::Testnet
            }
            other => {
                tracing::warn!(network = other, "unknown network, defaulting to testnet");
                Network::Testnet
            }
        };

        let bitcoin_esplora_url = env::var("BITCOIN_ESPLORA_URL").unwrap_or_else(|_| {
            ChainParams::new(UtxoChain::Bitcoin, network)
                .default_esplora_url()
                .to_string()
        });
        let litecoin_esplora_url = env::var("LITECOIN_ESPLORA_URL").unwrap_or_else(|_| {
            ChainParams::new(UtxoChain::Litecoin, network)
                .default_esplora_url()
                .to_string()
        });
        tracing::info!(bitcoin = %bitcoin_esplora_url, litecoin = %litecoin_esplora_url, "esplora endpoints");

        let lightning_api_url = env::var("LIGHTNING_API_URL")
            .unwrap_or_else(|_| DEFAULT_LIGHTNING_API_URL.to_string());
        let lightning_api_key = env::var("LIGHTNING_API_KEY").ok().filter(|k| !k.is_empty());
        if lightning_api_key.is_none() {
            tracing::warn!("LIGHTNING_API_KEY is not set; lightning calls will be unauthenticated");
        }

        let candidate_nodes = match env::var("LIGHTNING_CANDIDATE_NODES") {
            Ok(list) => parse_node_list(&list),
            Err(_) => default_candidate_nodes(),
        };

        Self {
            network,
            bitcoin_esplora_url,
            litecoin_esplora_url,
            lightning_api_url,
            lightning_api_key,
            request_timeout: Duration::from_secs(env_number(
                "WALLET_REQUEST_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            retry_attempts: env_number("WALLET_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
            retry_base_delay: Duration::from_millis(env_number(
                "WALLET_RETRY_BASE_MS",
                DEFAULT_RETRY_BASE_MS,
            )),
            candidate_nodes,
            bitcoin_fixed_fee_sat: env_number(
                "BITCOIN_FIXED_FEE_SAT",
                chain_utxo::network::DEFAULT_FIXED_FEE_SAT,
            ),
            litecoin_fixed_fee_sat: env_number(
                "LITECOIN_FIXED_FEE_SAT",
                chain_utxo::network::DEFAULT_FIXED_FEE_SAT,
            ),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.request_timeout,
            max_attempts: self.retry_attempts.max(1),
            base_delay: self.retry_base_delay,
        }
    }

    /// Fee policy for sends of a UTXO asset.
    pub fn fee_policy(&self, asset: AssetType) -> FeePolicy {
        match asset {
            AssetType::Bitcoin => FeePolicy::Fixed(self.bitcoin_fixed_fee_sat),
            AssetType::Litecoin => FeePolicy::Fixed(self.litecoin_fixed_fee_sat),
            AssetType::Lightning => FeePolicy::ChainDefault,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let network = Network::Testnet;
        Self {
            network,
            bitcoin_esplora_url: ChainParams::new(UtxoChain::Bitcoin, network)
                .default_esplora_url()
                .to_string(),
            litecoin_esplora_url: ChainParams::new(UtxoChain::Litecoin, network)
                .default_esplora_url()
                .to_string(),
            lightning_api_url: DEFAULT_LIGHTNING_API_URL.to_string(),
            lightning_api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            candidate_nodes: default_candidate_nodes(),
            bitcoin_fixed_fee_sat: chain_utxo::network::DEFAULT_FIXED_FEE_SAT,
            litecoin_fixed_fee_sat: chain_utxo::network::DEFAULT_FIXED_FEE_SAT,
        }
    }
}

fn default_candidate_nodes() -> Vec<String> {
    DEFAULT_CANDIDATE_NODES.iter().map(|s| s.to_string()).collect()
}

fn parse_node_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_number<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, %default, "not a number, using default");
                default
            }
        },
        Err(_) => default,
    }
}
