use serde::{Deserialize, Serialize};

/// Default Esplora endpoint for Bitcoin mainnet.
pub const BITCOIN_MAINNET_ESPLORA: &str = "https://blockstream.info/api";

/// Default Esplora endpoint for Bitcoin testnet.
pub const BITCOIN_TESTNET_ESPLORA: &str = "https://blockstream.info/testnet/api";

/// Default Esplora endpoint for Litecoin mainnet.
pub const LITECOIN_MAINNET_ESPLORA: &str = "https://litecoinspace.org/api";

/// Default Esplora endpoint for Litecoin testnet.
pub const LITECOIN_TESTNET_ESPLORA: &str = "https://litecoinspace.org/testnet/api";

/// Fixed fee charged per send when no other fee policy is configured.
pub const DEFAULT_FIXED_FEE_SAT: u64 = 1_000;

/// Supported UTXO chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtxoChain {
    Bitcoin,
    Litecoin,
}

/// Mainnet or the public test network of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Address encoding and endpoint parameters for one chain on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub chain: UtxoChain,
    pub network: Network,
}

impl ChainParams {
    pub const fn new(chain: UtxoChain, network: Network) -> Self {
        Self { chain, network }
    }

    /// Human-readable part of native SegWit addresses.
    pub fn bech32_hrp(&self) -> &'static str {
        match (self.chain, self.network) {
            (UtxoChain::Bitcoin, Network::Mainnet) => "bc",
            (UtxoChain::Bitcoin, Network::Testnet) => "tb",
            (UtxoChain::Litecoin, Network::Mainnet) => "ltc",
            (UtxoChain::Litecoin, Network::Testnet) => "tltc",
        }
    }

    /// Base58 version byte of P2PKH addresses.
    pub fn p2pkh_version(&self) -> u8 {
        match (self.chain, self.network) {
            (UtxoChain::Bitcoin, Network::Mainnet) => 0x00,
            (UtxoChain::Litecoin, Network::Mainnet) => 0x30,
            (_, Network::Testnet) => 0x6f,
        }
    }

    /// Base58 version bytes accepted for P2SH addresses. Litecoin still
    /// accepts the legacy `3...` prefix it shared with Bitcoin.
    pub fn p2sh_versions(&self) -> &'static [u8] {
        match (self.chain, self.network) {
            (UtxoChain::Bitcoin, Network::Mainnet) => &[0x05],
            (UtxoChain::Bitcoin, Network::Testnet) => &[0xc4],
            (UtxoChain::Litecoin, Network::Mainnet) => &[0x32, 0x05],
            (UtxoChain::Litecoin, Network::Testnet) => &[0x3a, 0xc4],
        }
    }

    /// BIP-44 coin type used in derivation paths.
    pub fn coin_type(&self) -> u32 {
        match (self.chain, self.network) {
            (_, Network::Testnet) => 1,
            (UtxoChain::Bitcoin, Network::Mainnet) => 0,
            (UtxoChain::Litecoin, Network::Mainnet) => 2,
        }
    }

    /// Return the default Esplora endpoint for this chain and network.
    pub fn default_esplora_url(&self) -> &'static str {
        match (self.chain, self.network) {
            (UtxoChain::Bitcoin, Network::Mainnet) => BITCOIN_MAINNET_ESPLORA,
            (UtxoChain::Bitcoin, Network::Testnet) => BITCOIN_TESTNET_ESPLORA,
            (UtxoChain::Litecoin, Network::Mainnet) => LITECOIN_MAINNET_ESPLORA,
            (UtxoChain::Litecoin, Network::Testnet) => LITECOIN_TESTNET_ESPLORA,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self.chain {
            UtxoChain::Bitcoin => "BTC",
            UtxoChain::Litecoin => "LTC",
        }
    }
}

impl std::fmt::Display for ChainParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.symbol().to_lowercase(), self.network)
    }
}
