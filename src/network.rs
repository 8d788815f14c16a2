//! Supported networks for payment descriptors.
//!
//! The gate and the payer have to agree on the chain a payment settles on.
//! Networks travel on the wire as short names (`"base-sepolia"`), and map to
//! numeric EIP-155 chain ids for EIP-712 domain binding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported Ethereum-compatible networks.
///
/// Used to differentiate between testnet and mainnet environments when
/// issuing descriptors and validating proofs.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Base Sepolia testnet (chain ID 84532).
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
    /// Base mainnet (chain ID 8453).
    #[serde(rename = "base")]
    Base,
    /// Polygon Amoy testnet (chain ID 80002).
    #[serde(rename = "polygon-amoy")]
    PolygonAmoy,
    /// Polygon mainnet (chain ID 137).
    #[serde(rename = "polygon")]
    Polygon,
    /// Avalanche Fuji testnet (chain ID 43113).
    #[serde(rename = "avalanche-fuji")]
    AvalancheFuji,
    /// Avalanche mainnet (chain ID 43114).
    #[serde(rename = "avalanche")]
    Avalanche,
}

impl Network {
    /// The numeric EIP-155 chain id for this network.
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::BaseSepolia => 84532,
            Network::Base => 8453,
            Network::PolygonAmoy => 80002,
            Network::Polygon => 137,
            Network::AvalancheFuji => 43113,
            Network::Avalanche => 43114,
        }
    }

    /// All networks this build knows about.
    pub fn variants() -> &'static [Network] {
        &[
            Network::BaseSepolia,
            Network::Base,
            Network::PolygonAmoy,
            Network::Polygon,
            Network::AvalancheFuji,
            Network::Avalanche,
        ]
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use serde_json to get the serialized string value
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        let s = json.trim_matches('"');
        write!(f, "{}", s)
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Use serde_json to deserialize from the string value
        let json = format!("\"{}\"", s);
        serde_json::from_str(&json).map_err(|e| format!("unknown network '{}': {}", s, e))
    }
}
