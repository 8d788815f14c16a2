//! Tollbooth resource server entrypoint.
//!
//! This binary launches an Axum-based HTTP server whose configured routes are
//! gated behind pay-per-request HTTP 402 payments.
//!
//! Endpoints:
//! - `GET /` – Liveness text
//! - `GET /health` – Unprotected health check
//! - `GET /weather` – Demo content, protected when listed in the route config
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `X402_PAY_TO` sets the payment recipient when absent from the config file
//! - `RUST_LOG` controls log filtering

mod config;
mod run;
mod sig_down;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}
