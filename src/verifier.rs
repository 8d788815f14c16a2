//! Server-side payment proof verification.
//!
//! [`ProofVerifier`] validates a submitted [`PaymentProof`] against the
//! descriptor its nonce was issued for. Checks run in a fixed order and
//! short-circuit on the first failure:
//!
//! 1. the nonce exists and is outstanding (not expired, not consumed);
//! 2. the authorized amount covers the descriptor amount;
//! 3. the authorized recipient matches;
//! 4. the authorized network matches;
//! 5. the cryptographic validity of the proof itself, delegated to the
//!    [`Ledger`] collaborator.
//!
//! On all-pass the nonce transitions from outstanding to consumed. The
//! transition is exclusive (see [`InMemoryNonceStore::consume`]); no two
//! concurrent verifications can both succeed for the same nonce. The ledger
//! call is awaited *before* the transition, and a verification that loses
//! the race after a passed ledger check reports `consumed` like any other
//! replay.

use alloy_primitives::Signature;
use async_trait::async_trait;
use std::sync::Arc;

use crate::claim::{claim_signing_hash, parse_address, payment_domain};
use crate::network::Network;
use crate::nonce::{InMemoryNonceStore, NonceLookup};
use crate::proto::{PaymentDescriptor, PaymentProof, TokenAmount};
use crate::timestamp::UnixTimestamp;

/// A rejected payment, with the reason the gate reports back in the fresh
/// 402. Fully recoverable by the client paying again against a new
/// descriptor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentInvalid {
    /// The nonce was never issued here.
    #[error("unknown: nonce was not issued by this gate")]
    UnknownNonce,
    /// The nonce was already consumed by an accepted proof.
    #[error("consumed: nonce was already spent")]
    Consumed,
    /// The descriptor's deadline has passed.
    #[error("expired: descriptor deadline has passed")]
    Expired,
    /// The authorized amount does not cover the descriptor amount.
    #[error("amount: authorized {offered} is below required {required}")]
    Amount {
        required: TokenAmount,
        offered: TokenAmount,
    },
    /// The authorized recipient differs from the descriptor's.
    #[error("recipient: authorized {offered} does not match {required}")]
    Recipient { required: String, offered: String },
    /// The authorized network differs from the descriptor's.
    #[error("network: authorized {offered} does not match {required}")]
    Network { required: Network, offered: Network },
    /// The signature is malformed or does not recover to the payer.
    #[error("signature: {0}")]
    Signature(String),
}

/// The ledger could not be consulted; distinct from a rejection so callers
/// can tell "your payment was rejected" from "we could not check".
#[derive(Debug, Clone, thiserror::Error)]
#[error("could not check payment: {0}")]
pub struct UpstreamError(pub String);

/// Outcome of a failed verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Invalid(#[from] PaymentInvalid),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// An accepted payment: the issued descriptor it settled and who paid.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub descriptor: PaymentDescriptor,
    pub payer: String,
}

/// Errors from the [`Ledger`] collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The proof's cryptographic material is invalid.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// The ledger is unreachable or timed out.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Confirms the cryptographic/settlement validity of a proof.
///
/// The in-process [`Eip155Ledger`] recovers the EIP-712 signer locally; an
/// on-chain settlement implementation would consult its RPC endpoint here,
/// with its own latency and failure modes bounded by the caller's timeout.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn check(
        &self,
        issued: &PaymentDescriptor,
        proof: &PaymentProof,
    ) -> Result<(), LedgerError>;
}

#[async_trait]
impl<L: Ledger> Ledger for Arc<L> {
    async fn check(
        &self,
        issued: &PaymentDescriptor,
        proof: &PaymentProof,
    ) -> Result<(), LedgerError> {
        self.as_ref().check(issued, proof).await
    }
}

/// [`Ledger`] for EIP-155 networks: recovers the EIP-712 claim signer and
/// requires it to match the proof's payer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip155Ledger;

impl Eip155Ledger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Ledger for Eip155Ledger {
    async fn check(
        &self,
        issued: &PaymentDescriptor,
        proof: &PaymentProof,
    ) -> Result<(), LedgerError> {
        let payer = parse_address(&proof.payer)
            .map_err(|e| LedgerError::InvalidSignature(format!("payer: {e}")))?;
        let pay_to = parse_address(&proof.pay_to)
            .map_err(|e| LedgerError::InvalidSignature(format!("recipient: {e}")))?;
        let asset = parse_address(&issued.asset)
            .map_err(|e| LedgerError::InvalidSignature(format!("asset: {e}")))?;

        // Reconstruct the exact claim the payer signed. The deadline comes
        // from the issued descriptor, which the nonce uniquely identifies.
        let domain = payment_domain(issued.network, asset);
        let hash = claim_signing_hash(
            &proof.nonce,
            pay_to,
            proof.amount,
            issued.expires_at,
            &domain,
        );
        let signature = Signature::from_raw_array(&proof.signature.0)
            .map_err(|e| LedgerError::InvalidSignature(format!("{e}")))?;
        let recovered = signature
            .recover_address_from_prehash(&hash)
            .map_err(|e| LedgerError::InvalidSignature(format!("{e}")))?;
        if recovered != payer {
            return Err(LedgerError::InvalidSignature(format!(
                "address mismatch: recovered {recovered}, expected {payer}"
            )));
        }
        Ok(())
    }
}

/// Validates proofs against the outstanding-nonce store and consumes nonces
/// on acceptance.
#[derive(Debug, Clone)]
pub struct ProofVerifier<L> {
    store: Arc<InMemoryNonceStore>,
    ledger: L,
}

impl<L> ProofVerifier<L> {
    pub fn new(store: Arc<InMemoryNonceStore>, ledger: L) -> Self {
        Self { store, ledger }
    }

    pub fn store(&self) -> &Arc<InMemoryNonceStore> {
        &self.store
    }
}

impl<L> ProofVerifier<L>
where
    L: Ledger,
{
    /// Verifies `proof` and, on success, consumes its nonce.
    #[tracing::instrument(name = "tollbooth.verify", skip_all, fields(nonce = %proof.nonce))]
    pub async fn verify(&self, proof: &PaymentProof) -> Result<Accepted, VerifyError> {
        let now = UnixTimestamp::now();
        let issued = match self.store.lookup(&proof.nonce, now) {
            NonceLookup::Outstanding(descriptor) => descriptor,
            NonceLookup::Consumed => return Err(PaymentInvalid::Consumed.into()),
            NonceLookup::Expired => return Err(PaymentInvalid::Expired.into()),
            NonceLookup::Unknown => return Err(PaymentInvalid::UnknownNonce.into()),
        };

        if proof.amount < issued.amount {
            return Err(PaymentInvalid::Amount {
                required: issued.amount,
                offered: proof.amount,
            }
            .into());
        }

        let recipient_matches = match (parse_address(&proof.pay_to), parse_address(&issued.pay_to))
        {
            (Ok(offered), Ok(required)) => offered == required,
            _ => false,
        };
        if !recipient_matches {
            return Err(PaymentInvalid::Recipient {
                required: issued.pay_to.clone(),
                offered: proof.pay_to.clone(),
            }
            .into());
        }

        if proof.network != issued.network {
            return Err(PaymentInvalid::Network {
                required: issued.network,
                offered: proof.network,
            }
            .into());
        }

        match self.ledger.check(&issued, proof).await {
            Ok(()) => {}
            Err(LedgerError::InvalidSignature(reason)) => {
                return Err(PaymentInvalid::Signature(reason).into());
            }
            Err(LedgerError::Unavailable(reason)) => {
                return Err(UpstreamError(reason).into());
            }
        }

        // All checks passed; claim the nonce. Losing the race to another
        // verification of the same nonce is a replay like any other.
        let descriptor = self
            .store
            .consume(&proof.nonce, UnixTimestamp::now())
            .map_err(|state| match state {
                NonceLookup::Consumed => PaymentInvalid::Consumed,
                NonceLookup::Expired => PaymentInvalid::Expired,
                _ => PaymentInvalid::UnknownNonce,
            })?;

        tracing::debug!(payer = %proof.payer, "payment accepted");
        Ok(Accepted {
            descriptor,
            payer: proof.payer.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::Nonce;
    use crate::signer::{Eip155Signer, PaymentSigner};
    use alloy_signer_local::PrivateKeySigner;

    fn descriptor() -> PaymentDescriptor {
        PaymentDescriptor {
            resource: "http://localhost/protected".to_string(),
            description: "Access to premium API".to_string(),
            mime_type: "application/json".to_string(),
            amount: TokenAmount(10000),
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
            network: Network::BaseSepolia,
            pay_to: "0xBAc675C310721717Cd4A37F6cbeA1F081b1C2a07".to_string(),
            expires_at: UnixTimestamp::now() + 300,
            nonce: Nonce::random(),
        }
    }

    fn verifier_with(descriptor: &PaymentDescriptor) -> ProofVerifier<Eip155Ledger> {
        let store = Arc::new(InMemoryNonceStore::new());
        store.issue(descriptor.clone());
        ProofVerifier::new(store, Eip155Ledger::new())
    }

    async fn signed_proof(descriptor: &PaymentDescriptor) -> PaymentProof {
        let signer = Eip155Signer::new(PrivateKeySigner::random());
        signer.sign(descriptor).await.unwrap()
    }

    #[tokio::test]
    async fn test_accepts_valid_proof_exactly_once() {
        let d = descriptor();
        let verifier = verifier_with(&d);
        let proof = signed_proof(&d).await;

        let accepted = verifier.verify(&proof).await.unwrap();
        assert_eq!(accepted.descriptor.nonce, d.nonce);
        assert_eq!(accepted.payer, proof.payer);

        // Replay of the same proof is rejected as consumed.
        let err = verifier.verify(&proof).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invalid(PaymentInvalid::Consumed)
        ));
    }

    #[tokio::test]
    async fn test_rejects_expired_regardless_of_proof() {
        let mut d = descriptor();
        // Sign against the still-valid terms, then issue an expired copy.
        let proof = signed_proof(&d).await;
        d.expires_at = UnixTimestamp::from_secs(1);
        let store = Arc::new(InMemoryNonceStore::new());
        store.issue(d);
        let verifier = ProofVerifier::new(store, Eip155Ledger::new());
        let err = verifier.verify(&proof).await.unwrap_err();
        assert!(matches!(err, VerifyError::Invalid(PaymentInvalid::Expired)));
    }

    #[tokio::test]
    async fn test_rejects_undersized_amount_before_signature_check() {
        let d = descriptor();
        let verifier = verifier_with(&d);
        // Payer authorizes 9999 against a descriptor requiring 10000.
        let mut short = d.clone();
        short.amount = TokenAmount(9999);
        let proof = signed_proof(&short).await;

        let err = verifier.verify(&proof).await.unwrap_err();
        match err {
            VerifyError::Invalid(PaymentInvalid::Amount { required, offered }) => {
                assert_eq!(required, TokenAmount(10000));
                assert_eq!(offered, TokenAmount(9999));
            }
            other => panic!("expected amount rejection, got {other:?}"),
        }
        // The nonce is still outstanding for a corrected payment.
        let good = signed_proof(&d).await;
        assert!(verifier.verify(&good).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_wrong_recipient() {
        let d = descriptor();
        let verifier = verifier_with(&d);
        let mut misdirected = d.clone();
        misdirected.pay_to = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".to_string();
        let proof = signed_proof(&misdirected).await;

        let err = verifier.verify(&proof).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invalid(PaymentInvalid::Recipient { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_wrong_network() {
        let d = descriptor();
        let verifier = verifier_with(&d);
        let mut elsewhere = d.clone();
        elsewhere.network = Network::Base;
        let proof = signed_proof(&elsewhere).await;

        let err = verifier.verify(&proof).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invalid(PaymentInvalid::Network { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_tampered_signature() {
        let d = descriptor();
        let verifier = verifier_with(&d);
        let mut proof = signed_proof(&d).await;
        proof.signature.0[10] ^= 0xff;

        let err = verifier.verify(&proof).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invalid(PaymentInvalid::Signature(_))
        ));
        // Failed check leaves the nonce outstanding.
        let good = signed_proof(&d).await;
        assert!(verifier.verify(&good).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_unknown_nonce() {
        let d = descriptor();
        let verifier = verifier_with(&d);
        let mut foreign = d.clone();
        foreign.nonce = Nonce::random();
        let proof = signed_proof(&foreign).await;

        let err = verifier.verify(&proof).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invalid(PaymentInvalid::UnknownNonce)
        ));
    }

    struct UnreachableLedger;

    #[async_trait]
    impl Ledger for UnreachableLedger {
        async fn check(
            &self,
            _issued: &PaymentDescriptor,
            _proof: &PaymentProof,
        ) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("rpc timeout".to_string()))
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_is_not_a_rejection() {
        let d = descriptor();
        let store = Arc::new(InMemoryNonceStore::new());
        store.issue(d.clone());
        let verifier = ProofVerifier::new(Arc::clone(&store), UnreachableLedger);
        let proof = signed_proof(&d).await;

        let err = verifier.verify(&proof).await.unwrap_err();
        assert!(matches!(err, VerifyError::Upstream(_)));
        // The nonce survives an upstream failure.
        let retry = ProofVerifier::new(store, Eip155Ledger::new());
        assert!(retry.verify(&proof).await.is_ok());
    }
}
