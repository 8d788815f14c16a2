//! The EIP-712 payment claim shared by the signer and the verifier.
//!
//! A payer authorizes a payment by signing a [`PaymentClaim`] bound to the
//! descriptor's nonce, recipient, amount, and deadline. The EIP-712 domain
//! ties the signature to the settlement network (via its EIP-155 chain id)
//! and to the asset contract, so an authorization for one token on one chain
//! can never be replayed against another.

use alloy_primitives::{Address, B256, FixedBytes, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};

use crate::network::Network;
use crate::proto::{Nonce, TokenAmount};
use crate::timestamp::UnixTimestamp;

/// EIP-712 domain name for payment claims.
pub const DOMAIN_NAME: &str = "tollbooth";
/// EIP-712 domain version for payment claims.
pub const DOMAIN_VERSION: &str = "1";

sol! {
    /// Payment authorization bound to one descriptor issuance.
    struct PaymentClaim {
        bytes32 nonce;
        address to;
        uint256 value;
        uint256 validBefore;
    }
}

/// The EIP-712 domain for claims on `network` paying in `asset`.
pub fn payment_domain(network: Network, asset: Address) -> Eip712Domain {
    eip712_domain! {
        name: DOMAIN_NAME,
        version: DOMAIN_VERSION,
        chain_id: network.chain_id(),
        verifying_contract: asset,
    }
}

/// The EIP-712 signing hash of the claim for the given terms.
pub fn claim_signing_hash(
    nonce: &Nonce,
    to: Address,
    value: TokenAmount,
    valid_before: UnixTimestamp,
    domain: &Eip712Domain,
) -> B256 {
    let claim = PaymentClaim {
        nonce: FixedBytes(*nonce.as_array()),
        to,
        value: U256::from(value.0),
        validBefore: U256::from(valid_before.as_secs()),
    };
    claim.eip712_signing_hash(domain)
}

/// Parses a `0x`-prefixed EVM address from its wire form.
pub fn parse_address(s: &str) -> Result<Address, AddressParseError> {
    s.parse::<Address>()
        .map_err(|_| AddressParseError(s.to_string()))
}

/// An address string that is not a valid EVM address.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid EVM address: {0}")]
pub struct AddressParseError(pub String);
