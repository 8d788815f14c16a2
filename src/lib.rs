//! Core Rust implementation of the [x402 protocol](https://www.x402.org) as a
//! self-contained pay-per-request tollbooth.
//!
//! This crate provides the foundational data structures and the server- and
//! client-side building blocks for gating HTTP resources behind on-chain
//! micropayments: a resource server answers unpaid requests with
//! `402 Payment Required` plus a machine-readable payment descriptor, and a
//! paying client satisfies the descriptor, attaches the proof, and retries
//! once.
//!
//! # Roles
//!
//! - **Gate (server)**: issues [`proto::PaymentDescriptor`]s, tracks their
//!   nonces in a [`nonce::InMemoryNonceStore`], and checks submitted
//!   [`proto::PaymentProof`]s with a [`verifier::ProofVerifier`].
//!   The axum middleware lives in the `tollbooth-axum` crate.
//! - **Payer (client)**: derives and signs a proof for a descriptor via a
//!   [`signer::PaymentSigner`]. The reqwest interceptor that drives the
//!   402-then-retry handshake lives in the `tollbooth-reqwest` crate.
//!
//! # Modules
//!
//! - [`claim`] — The EIP-712 payment claim shared by signer and verifier.
//! - [`network`] — Supported EVM networks and their EIP-155 chain ids.
//! - [`nonce`] — The outstanding-nonce store; single-use descriptor tracking.
//! - [`proto`] — Wire types: descriptors, proofs, the 402 response body.
//! - [`signer`] — Client-side payment signing over an EIP-712 claim.
//! - [`timestamp`] — Unix timestamp type for descriptor expiry windows.
//! - [`util`] — Base64 header payloads and money-amount parsing.
//! - [`verifier`] — Server-side proof verification and the ledger seam.

pub mod claim;
pub mod network;
pub mod nonce;
pub mod proto;
pub mod signer;
pub mod timestamp;
pub mod util;
pub mod verifier;
