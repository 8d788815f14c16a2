//! Wire types for the pay-per-request handshake.
//!
//! A protected route answers unpaid requests with `402 Payment Required` and
//! a JSON [`PaymentRequired`] body carrying a single [`PaymentDescriptor`]:
//! the amount, asset, network, recipient, expiry deadline, and a one-time
//! nonce. The payer satisfies the descriptor, serializes a [`PaymentProof`]
//! as base64 JSON into the `X-Payment` request header, and retransmits.
//!
//! # Key Types
//!
//! - [`X402Version1`] - Version marker that serializes as `1`
//! - [`PaymentDescriptor`] - Payment terms issued by the gate
//! - [`PaymentProof`] - Signed evidence that a descriptor was satisfied
//! - [`PaymentRequired`] - HTTP 402 (and 400) response body
//! - [`ProtocolError`] - Malformed descriptor or proof encodings

use rand::{Rng, rng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::network::Network;
use crate::timestamp::UnixTimestamp;
use crate::util::Base64Bytes;

/// Name of the request header carrying a base64-encoded [`PaymentProof`].
pub const PAYMENT_HEADER: &str = "X-Payment";

/// Version marker for protocol version 1.
///
/// This type serializes as the integer `1` and is used to identify protocol
/// messages in the wire format.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl PartialEq<u8> for X402Version1 {
    fn eq(&self, other: &u8) -> bool {
        *other == Self::VALUE
    }
}

impl From<X402Version1> for u8 {
    fn from(_: X402Version1) -> Self {
        X402Version1::VALUE
    }
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// An amount in the smallest unit of an asset (e.g. 10000 = 0.01 USDC).
///
/// # Serialization
///
/// Serialized as a stringified integer to avoid loss of precision in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub u128);

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let amount = s
            .parse::<u128>()
            .map_err(|_| serde::de::Error::custom("amount must be a non-negative integer"))?;
        Ok(TokenAmount(amount))
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(value as u128)
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        TokenAmount(value)
    }
}

/// A one-time token identifying a single descriptor issuance.
///
/// 32 random bytes, hex-encoded with a `0x` prefix on the wire. A nonce is
/// unique per issuance and single-use: once a proof against it is accepted,
/// it never validates again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(pub [u8; 32]);

impl Nonce {
    /// Generates a fresh random nonce.
    pub fn random() -> Self {
        let bytes: [u8; 32] = rng().random();
        Nonce(bytes)
    }

    /// The raw nonce bytes.
    pub fn as_array(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Nonce {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| ProtocolError::InvalidNonce)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidNonce)?;
        Ok(Nonce(bytes))
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Nonce::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A 65-byte secp256k1 signature, hex-encoded with a `0x` prefix on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

impl Display for EvmSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for EvmSignature {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| ProtocolError::InvalidSignatureEncoding)?;
        let bytes: [u8; 65] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidSignatureEncoding)?;
        Ok(EvmSignature(bytes))
    }
}

impl Serialize for EvmSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EvmSignature::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Payment terms issued by the gate for one unpaid request.
///
/// Immutable once issued; the nonce is unique per issuance. One descriptor
/// yields at most one accepted proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDescriptor {
    /// URL of the resource being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource content.
    pub mime_type: String,
    /// The payment amount in the asset's smallest unit.
    pub amount: TokenAmount,
    /// The token asset contract address.
    pub asset: String,
    /// The network the payment settles on.
    pub network: Network,
    /// The recipient address for payment.
    pub pay_to: String,
    /// Deadline after which the descriptor is no longer payable.
    pub expires_at: UnixTimestamp,
    /// One-time token identifying this issuance.
    pub nonce: Nonce,
}

/// Signed evidence from the payer that a descriptor's requirement was satisfied.
///
/// The `amount`, `pay_to`, and `network` fields are the values the payer
/// actually authorized, so the verifier can reject an undersized or
/// misdirected authorization without touching the signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// The descriptor nonce this proof claims to satisfy.
    pub nonce: Nonce,
    /// The paying address.
    pub payer: String,
    /// The authorized amount in the asset's smallest unit.
    pub amount: TokenAmount,
    /// The authorized recipient address.
    pub pay_to: String,
    /// The network the authorization is bound to.
    pub network: Network,
    /// EIP-712 signature over the payment claim.
    pub signature: EvmSignature,
}

impl PaymentProof {
    /// Encodes this proof as base64 JSON suitable for the `X-Payment` header.
    pub fn encode_header(&self) -> Result<Base64Bytes<'static>, ProtocolError> {
        let json = serde_json::to_vec(self).map_err(|_| ProtocolError::InvalidProofJson)?;
        Ok(Base64Bytes::encode(json))
    }

    /// Decodes a proof from raw `X-Payment` header bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the bytes are not valid base64 or the
    /// decoded JSON does not describe a proof.
    pub fn decode_header(header: &[u8]) -> Result<Self, ProtocolError> {
        let decoded = Base64Bytes::from(header)
            .decode()
            .map_err(|_| ProtocolError::InvalidBase64)?;
        serde_json::from_slice(&decoded).map_err(|_| ProtocolError::InvalidProofJson)
    }
}

/// HTTP 402 Payment Required response body.
///
/// Returned when a resource requires payment, and on rejected payments with
/// `error` set and a freshly issued descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Optional error message if a submitted payment was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The payment terms for this resource.
    pub descriptor: PaymentDescriptor,
}

/// Malformed descriptor or proof encodings.
///
/// Request-scoped: on the server these yield `400 Bad Request`; on the client
/// they are terminal for the call. They never crash either process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Header bytes are not valid base64.
    #[error("payment header is not valid base64")]
    InvalidBase64,
    /// Decoded payload is not a valid proof document.
    #[error("payment proof is not valid JSON")]
    InvalidProofJson,
    /// The 402 body could not be parsed as a payment-required document.
    #[error("payment required body is not valid JSON")]
    InvalidPaymentRequired,
    /// A nonce string is not 32 hex-encoded bytes.
    #[error("nonce must be 32 hex-encoded bytes")]
    InvalidNonce,
    /// A signature string is not 65 hex-encoded bytes.
    #[error("signature must be 65 hex-encoded bytes")]
    InvalidSignatureEncoding,
}

impl PaymentRequired {
    /// Parses a 402 response body.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|_| ProtocolError::InvalidPaymentRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> PaymentDescriptor {
        PaymentDescriptor {
            resource: "http://localhost:4021/weather".to_string(),
            description: "Access to premium API".to_string(),
            mime_type: "application/json".to_string(),
            amount: TokenAmount(10000),
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
            network: Network::BaseSepolia,
            pay_to: "0xBAc675C310721717Cd4A37F6cbeA1F081b1C2a07".to_string(),
            expires_at: UnixTimestamp::from_secs(1700000300),
            nonce: Nonce::random(),
        }
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let original = descriptor();
        let json = serde_json::to_string(&original).unwrap();
        let back: PaymentDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn test_descriptor_wire_field_names() {
        let json = serde_json::to_value(descriptor()).unwrap();
        assert!(json.get("payTo").is_some());
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("mimeType").is_some());
        assert_eq!(json.get("network").unwrap(), "base-sepolia");
        assert_eq!(json.get("amount").unwrap(), "10000");
    }

    #[test]
    fn test_payment_required_roundtrip() {
        let body = PaymentRequired {
            x402_version: X402Version1,
            error: None,
            descriptor: descriptor(),
        };
        let json = serde_json::to_vec(&body).unwrap();
        let back = PaymentRequired::from_json_bytes(&json).unwrap();
        assert_eq!(back.descriptor, body.descriptor);
        assert!(back.error.is_none());
    }

    #[test]
    fn test_version_marker_rejects_other_versions() {
        let result: Result<X402Version1, _> = serde_json::from_str("2");
        assert!(result.is_err());
        let ok: X402Version1 = serde_json::from_str("1").unwrap();
        assert_eq!(ok, X402Version1);
    }

    #[test]
    fn test_proof_header_roundtrip() {
        let proof = PaymentProof {
            nonce: Nonce::random(),
            payer: "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".to_string(),
            amount: TokenAmount(10000),
            pay_to: "0xBAc675C310721717Cd4A37F6cbeA1F081b1C2a07".to_string(),
            network: Network::BaseSepolia,
            signature: EvmSignature([7u8; 65]),
        };
        let header = proof.encode_header().unwrap();
        let back = PaymentProof::decode_header(header.as_ref()).unwrap();
        assert_eq!(proof, back);
    }

    #[test]
    fn test_decode_header_rejects_garbage() {
        assert_eq!(
            PaymentProof::decode_header(b"%%%not-base64%%%"),
            Err(ProtocolError::InvalidBase64)
        );
        let b64_of_garbage = Base64Bytes::encode(b"{\"not\": \"a proof\"}");
        assert_eq!(
            PaymentProof::decode_header(b64_of_garbage.as_ref()),
            Err(ProtocolError::InvalidProofJson)
        );
    }

    #[test]
    fn test_nonce_uniqueness_and_encoding() {
        let a = Nonce::random();
        let b = Nonce::random();
        assert_ne!(a, b);
        let s = a.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 2 + 64);
        assert_eq!(Nonce::from_str(&s).unwrap(), a);
    }

    #[test]
    fn test_nonce_rejects_wrong_length() {
        assert!(Nonce::from_str("0xdead").is_err());
    }
}
