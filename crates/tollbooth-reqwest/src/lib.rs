//! Wrapper for reqwest that transparently satisfies HTTP 402 payment
//! challenges.
//!
//! The [`TollboothPayments`] middleware wraps a single logical request so the
//! caller observes only the final outcome. A non-402 response passes through
//! untouched. On a 402, the middleware parses the payment descriptor, signs a
//! proof with the configured [`PaymentSigner`](tollbooth::signer::PaymentSigner),
//! and retransmits the original request exactly once with the proof attached.
//! Whatever the second response says is final: the middleware never loops on
//! repeated 402s.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use alloy_signer_local::PrivateKeySigner;
//! use reqwest::Client;
//! use tollbooth::signer::Eip155Signer;
//! use tollbooth_reqwest::{ReqwestWithPayments, ReqwestWithPaymentsBuild, TollboothPayments};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let signer: PrivateKeySigner = "0x...".parse()?;
//! let payments = TollboothPayments::with_signer(Eip155Signer::new(signer));
//!
//! let client = Client::new().with_payments(payments).build();
//! let response = client
//!     .get("http://localhost:4021/weather")
//!     .send()
//!     .await?;
//! println!("{}", response.text().await?);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod middleware;

pub use builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild};
pub use middleware::{TollboothPayments, TollboothPaymentsError};
