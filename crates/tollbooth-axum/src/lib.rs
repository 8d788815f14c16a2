//! Axum middleware for gating protected routes behind pay-per-request
//! HTTP 402 payments.
//!
//! This crate provides the [`TollboothMiddleware`] Axum layer. A request to a
//! gated route without a payment proof receives `402 Payment Required` with a
//! freshly issued payment descriptor; a request carrying a valid proof in the
//! `X-Payment` header is forwarded to the protected handler exactly once.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::get, Json};
//! use axum::response::IntoResponse;
//! use http::StatusCode;
//! use serde_json::json;
//! use tollbooth::network::Network;
//! use tollbooth::nonce::InMemoryNonceStore;
//! use tollbooth_axum::{RoutePrice, TollboothMiddleware};
//!
//! let store = Arc::new(InMemoryNonceStore::new());
//! let tollbooth = TollboothMiddleware::new(store);
//!
//! let price = RoutePrice {
//!     amount: 10000u64.into(),
//!     asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
//!     network: Network::BaseSepolia,
//!     pay_to: "0xBAc675C310721717Cd4A37F6cbeA1F081b1C2a07".into(),
//! };
//!
//! let app: Router = Router::new().route(
//!     "/paywall",
//!     get(my_handler).layer(
//!         tollbooth
//!             .with_price_tag(price)
//!             .with_description("Premium Content".to_string()),
//!     ),
//! );
//!
//! async fn my_handler() -> impl IntoResponse {
//!     (StatusCode::OK, Json(json!({ "hello": "world" })))
//! }
//! ```
//!
//! The outstanding-nonce store is created by the host process and injected,
//! so several routes can share one store and tests can isolate theirs. See
//! [`TollboothMiddleware`] for configuration options.

pub mod gate;
pub mod layer;

pub use gate::RoutePrice;
pub use layer::TollboothMiddleware;
