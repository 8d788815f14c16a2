//! Automation client for tollbooth-protected resources.
//!
//! A long-running integration would embed `tollbooth-reqwest` directly; this
//! binary is the one-shot form: read the credential and target from the
//! environment, fetch the protected endpoint, pay the 402 transparently,
//! print the body.
//!
//! Environment:
//! - `PRIVATE_KEY` – EVM private key (raw hex or `0x`-prefixed)
//! - `RESOURCE_SERVER_URL` – base URL of the resource server
//! - `ENDPOINT_PATH` – protected path to fetch (e.g. `/weather`)
//! - `X402_MAX_AMOUNT` – optional spend cap in smallest units

use alloy_signer_local::PrivateKeySigner;
use dotenvy::dotenv;
use reqwest::Client;
use std::env;
use std::process;
use tracing_subscriber::EnvFilter;

use tollbooth::proto::TokenAmount;
use tollbooth::signer::Eip155Signer;
use tollbooth_reqwest::{ReqwestWithPayments, ReqwestWithPaymentsBuild, TollboothPayments};

/// Startup failures: missing or malformed environment. Fatal, non-zero exit.
#[derive(Debug, thiserror::Error)]
enum ClientConfigError {
    #[error("{0} missing in environment (.env)")]
    MissingVar(&'static str),
    #[error("PRIVATE_KEY format invalid. Expect 0x + 64 hex, got length={0}")]
    BadPrivateKey(usize),
}

/// Normalizes `PRIVATE_KEY` from the environment: strips quotes and
/// whitespace, adds the `0x` prefix if the user pasted raw hex.
fn normalize_private_key(raw: &str) -> Result<String, ClientConfigError> {
    let mut key = raw.trim().to_string();
    if (key.starts_with('"') && key.ends_with('"'))
        || (key.starts_with('\'') && key.ends_with('\''))
    {
        key = key[1..key.len() - 1].to_string();
    }
    key.retain(|c| !c.is_whitespace());
    let hex_len_ok = |s: &str| s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit());
    if hex_len_ok(&key) {
        key = format!("0x{key}");
    }
    let stripped = key.strip_prefix("0x").unwrap_or(&key);
    if !hex_len_ok(stripped) {
        return Err(ClientConfigError::BadPrivateKey(key.len()));
    }
    Ok(key)
}

fn require_var(name: &'static str) -> Result<String, ClientConfigError> {
    env::var(name).map_err(|_| ClientConfigError::MissingVar(name))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let private_key = normalize_private_key(&require_var("PRIVATE_KEY")?)?;
    let base_url = require_var("RESOURCE_SERVER_URL")?;
    let endpoint_path = require_var("ENDPOINT_PATH")?;

    let signer: PrivateKeySigner = private_key.parse()?;
    tracing::info!("Paying as {}", signer.address());

    let mut payments = TollboothPayments::with_signer(Eip155Signer::new(signer));
    if let Ok(max) = env::var("X402_MAX_AMOUNT")
        && let Ok(amount) = max.parse::<u128>()
    {
        let asset = env::var("X402_ASSET")
            .unwrap_or_else(|_| "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string());
        payments = payments.max(asset, TokenAmount(amount));
    }

    let http_client = Client::new().with_payments(payments).build();

    let url = format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        endpoint_path
    );
    let response = http_client.get(&url).send().await?;

    println!("Status: {}", response.status());
    println!("{}", response.text().await?);

    Ok(())
}

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f";

    #[test]
    fn test_normalize_adds_prefix_to_raw_hex() {
        let key = normalize_private_key(RAW).unwrap();
        assert_eq!(key, format!("0x{RAW}"));
    }

    #[test]
    fn test_normalize_strips_quotes_and_whitespace() {
        let quoted = format!("\"0x{RAW}\" ");
        assert_eq!(normalize_private_key(&quoted).unwrap(), format!("0x{RAW}"));
    }

    #[test]
    fn test_normalize_rejects_short_key() {
        assert!(matches!(
            normalize_private_key("0xdeadbeef"),
            Err(ClientConfigError::BadPrivateKey(_))
        ));
    }
}
