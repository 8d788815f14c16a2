//! Client-side payment signing.
//!
//! [`PaymentSigner`] is the boundary behind which the payer's credential
//! lives: it takes a descriptor and produces a signed [`PaymentProof`], and
//! nothing else in the process reads the key. [`Eip155Signer`] implements it
//! for EVM networks over any [`SignerLike`] credential.

use alloy_primitives::{Address, FixedBytes, Signature};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use std::sync::Arc;

use crate::claim::{claim_signing_hash, parse_address, payment_domain};
use crate::network::Network;
use crate::proto::{EvmSignature, PaymentDescriptor, PaymentProof};
use crate::timestamp::UnixTimestamp;

/// Errors produced while deriving a payment proof from a descriptor.
///
/// All of these are terminal for the call that triggered them: the caller is
/// told, and nothing is retried silently.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The descriptor's deadline passed before signing started; checked
    /// client-side so no signature is produced for a dead descriptor.
    #[error("descriptor expired at {expires_at}, now {now}")]
    DescriptorExpired {
        expires_at: UnixTimestamp,
        now: UnixTimestamp,
    },
    /// The held credential cannot authorize payments on this network.
    #[error("no credential for network {0}")]
    UnsupportedNetwork(Network),
    /// The descriptor carries an address this signer cannot parse.
    #[error("descriptor has an invalid address: {0}")]
    InvalidAddress(String),
    /// The credential failed to produce a signature.
    #[error("failed to sign payment claim: {0}")]
    Signature(String),
}

/// Builds and signs a [`PaymentProof`] satisfying a [`PaymentDescriptor`].
///
/// Implementations may emit an on-chain transaction or payment-channel
/// authorization as a side effect; its durability belongs to the underlying
/// ledger, not to this trait.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// The paying address proofs will carry.
    fn address(&self) -> String;

    /// Signs a proof for `descriptor`.
    async fn sign(&self, descriptor: &PaymentDescriptor) -> Result<PaymentProof, SigningError>;
}

/// [`PaymentSigner`] for EIP-155 networks.
///
/// Signs the payment claim with EIP-712 over the descriptor's exact terms:
/// nonce, recipient, amount, and deadline, domain-bound to the network and
/// asset contract.
#[derive(Debug, Clone)]
pub struct Eip155Signer<S> {
    signer: S,
    networks: Option<Vec<Network>>,
}

impl<S> Eip155Signer<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            networks: None,
        }
    }

    /// Restricts the signer to the given networks. Descriptors for any other
    /// network fail with [`SigningError::UnsupportedNetwork`].
    pub fn restrict_to<N: Into<Vec<Network>>>(mut self, networks: N) -> Self {
        self.networks = Some(networks.into());
        self
    }

    fn assert_network(&self, network: Network) -> Result<(), SigningError> {
        match &self.networks {
            None => Ok(()),
            Some(allowed) if allowed.contains(&network) => Ok(()),
            Some(_) => Err(SigningError::UnsupportedNetwork(network)),
        }
    }
}

#[async_trait]
impl<S> PaymentSigner for Eip155Signer<S>
where
    S: SignerLike + Send + Sync,
{
    fn address(&self) -> String {
        self.signer.address().to_string()
    }

    #[tracing::instrument(name = "tollbooth.sign", skip_all, fields(
        network = %descriptor.network,
        amount = %descriptor.amount,
        nonce = %descriptor.nonce,
    ))]
    async fn sign(&self, descriptor: &PaymentDescriptor) -> Result<PaymentProof, SigningError> {
        // Fast-fail before any cryptographic or network work.
        let now = UnixTimestamp::now();
        if descriptor.expires_at.is_past(now) {
            return Err(SigningError::DescriptorExpired {
                expires_at: descriptor.expires_at,
                now,
            });
        }
        self.assert_network(descriptor.network)?;

        let pay_to = parse_address(&descriptor.pay_to)
            .map_err(|e| SigningError::InvalidAddress(e.0))?;
        let asset = parse_address(&descriptor.asset)
            .map_err(|e| SigningError::InvalidAddress(e.0))?;

        let domain = payment_domain(descriptor.network, asset);
        let hash = claim_signing_hash(
            &descriptor.nonce,
            pay_to,
            descriptor.amount,
            descriptor.expires_at,
            &domain,
        );
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SigningError::Signature(format!("{e}")))?;

        Ok(PaymentProof {
            nonce: descriptor.nonce,
            payer: self.signer.address().to_string(),
            amount: descriptor.amount,
            pay_to: descriptor.pay_to.clone(),
            network: descriptor.network,
            signature: EvmSignature(signature.as_bytes()),
        })
    }
}

/// A trait that abstracts signing operations, allowing both owned signers and Arc-wrapped signers.
///
/// This is necessary because Alloy's `Signer` trait is not implemented for `Arc<T>`,
/// but users may want to share signers via `Arc`.
#[async_trait]
pub trait SignerLike {
    /// Returns the address of the signer.
    fn address(&self) -> Address;

    /// Signs the given hash.
    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error>;
}

#[async_trait]
impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        PrivateKeySigner::address(self)
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

#[async_trait]
impl SignerLike for Arc<PrivateKeySigner> {
    fn address(&self) -> Address {
        PrivateKeySigner::address(self.as_ref())
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self.as_ref(), hash).await
    }
}
