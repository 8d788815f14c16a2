//! The payment gate: issue descriptors, verify proofs, forward exactly once.
//!
//! Every request to a gated route lands here. The per-request state machine
//! is deliberately small: a request without a proof gets a fresh descriptor
//! and a 402; a request with a valid proof consumes its nonce and runs the
//! protected handler exactly once; a request with an invalid proof gets a
//! 402 with a reissued descriptor. Verification failures are never fatal to
//! the process.

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::{StatusCode, Uri};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use url::Url;

use tollbooth::nonce::InMemoryNonceStore;
use tollbooth::proto::{
    Nonce, PAYMENT_HEADER, PaymentDescriptor, PaymentProof, PaymentRequired, ProtocolError,
    TokenAmount, X402Version1,
};
use tollbooth::timestamp::UnixTimestamp;
use tollbooth::network::Network;
use tollbooth::verifier::{Ledger, PaymentInvalid, ProofVerifier, UpstreamError};

/// Default descriptor expiry window in seconds.
pub const DEFAULT_DESCRIPTOR_TTL_SECONDS: u64 = 300;

/// Payment terms of one protected route, fixed at startup.
#[derive(Debug, Clone)]
pub struct RoutePrice {
    /// Price in the asset's smallest unit.
    pub amount: TokenAmount,
    /// Token asset contract address.
    pub asset: String,
    /// Network the payment settles on.
    pub network: Network,
    /// Address that receives payments.
    pub pay_to: String,
}

/// Builder for resource information included in issued descriptors.
#[derive(Debug, Clone)]
pub struct ResourceInfoBuilder {
    /// Description of the protected resource
    pub description: String,
    /// MIME type of the protected resource
    pub mime_type: String,
    /// Optional explicit URL of the protected resource
    pub url: Option<String>,
}

impl Default for ResourceInfoBuilder {
    fn default() -> Self {
        Self {
            description: "".to_string(),
            mime_type: "application/json".to_string(),
            url: None,
        }
    }
}

/// Resolved resource information for one request.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub description: String,
    pub mime_type: String,
    pub url: String,
}

impl ResourceInfoBuilder {
    /// Determines the resource URL (static or dynamic).
    ///
    /// If `url` is set, returns it directly. Otherwise, constructs a URL by
    /// combining the base URL with the request URI's path and query.
    pub fn as_resource_info(&self, base_url: Option<&Url>, request_uri: &Uri) -> ResourceInfo {
        ResourceInfo {
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            url: self.url.clone().unwrap_or_else(|| {
                let mut url = base_url
                    .cloned()
                    .unwrap_or_else(|| Url::parse("http://localhost/").expect("valid URL"));
                url.set_path(request_uri.path());
                url.set_query(request_uri.query());
                url.to_string()
            }),
        }
    }
}

/// Why a request did not reach the protected handler.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No proof header present: the normal first leg of the handshake.
    #[error("X-Payment header is required")]
    PaymentRequired,
    /// The proof header could not be decoded.
    #[error(transparent)]
    Malformed(#[from] ProtocolError),
    /// The proof was checked and rejected.
    #[error(transparent)]
    Rejected(#[from] PaymentInvalid),
    /// The ledger could not be consulted; not a rejection.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// One route's payment gate, assembled per request by the service layer.
pub struct Gate<L> {
    /// Verifies proofs and consumes nonces
    pub verifier: ProofVerifier<L>,
    /// Payment terms of the route
    pub price: Arc<RoutePrice>,
    /// Resource information for the protected endpoint
    pub resource: ResourceInfo,
    /// Descriptor expiry window
    pub descriptor_ttl_seconds: u64,
}

impl<L> Gate<L>
where
    L: Ledger,
{
    /// Handles an incoming request, enforcing payment.
    ///
    /// Returns a 402 (or 400/502) when the request does not carry an
    /// acceptable proof; otherwise returns the protected handler's response
    /// unchanged.
    #[tracing::instrument(name = "tollbooth.handle_request", skip_all)]
    pub async fn handle_request<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(self.error_into_response(err)),
        }
    }

    /// Handles an incoming request, returning errors as [`GateError`].
    ///
    /// This is the fallible version of `handle_request` that returns an
    /// actual error instead of turning it into an HTTP response.
    pub async fn handle_request_fallible<S>(
        &self,
        mut inner: S,
        req: Request,
    ) -> Result<Response, GateError>
    where
        S: Service<Request, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        let header = req
            .headers()
            .get(PAYMENT_HEADER)
            .ok_or(GateError::PaymentRequired)?;
        let proof = PaymentProof::decode_header(header.as_bytes())?;

        self.verifier.verify(&proof).await.map_err(|err| match err {
            tollbooth::verifier::VerifyError::Invalid(invalid) => GateError::Rejected(invalid),
            tollbooth::verifier::VerifyError::Upstream(upstream) => GateError::Upstream(upstream),
        })?;

        // Payment accepted: the protected handler runs exactly once and its
        // response goes back unchanged.
        let response = match inner.call(req).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        Ok(response)
    }

    /// Issues a fresh descriptor from the route's terms and records its
    /// nonce as outstanding.
    fn issue_descriptor(&self) -> PaymentDescriptor {
        let descriptor = PaymentDescriptor {
            resource: self.resource.url.clone(),
            description: self.resource.description.clone(),
            mime_type: self.resource.mime_type.clone(),
            amount: self.price.amount,
            asset: self.price.asset.clone(),
            network: self.price.network,
            pay_to: self.price.pay_to.clone(),
            expires_at: UnixTimestamp::now() + self.descriptor_ttl_seconds,
            nonce: Nonce::random(),
        };
        self.store().issue(descriptor.clone());
        tracing::debug!(nonce = %descriptor.nonce, "issued payment descriptor");
        descriptor
    }

    fn store(&self) -> &Arc<InMemoryNonceStore> {
        self.verifier.store()
    }

    /// Converts a [`GateError`] into the HTTP response the payer sees.
    ///
    /// Every payment path reissues a fresh descriptor, so the payer can
    /// always retry with corrected terms; an upstream failure does not.
    fn error_into_response(&self, err: GateError) -> Response {
        match err {
            GateError::PaymentRequired => {
                self.payment_required_response(StatusCode::PAYMENT_REQUIRED, None)
            }
            GateError::Rejected(invalid) => self.payment_required_response(
                StatusCode::PAYMENT_REQUIRED,
                Some(invalid.to_string()),
            ),
            GateError::Malformed(protocol) => self
                .payment_required_response(StatusCode::BAD_REQUEST, Some(protocol.to_string())),
            GateError::Upstream(upstream) => {
                let body = Body::from(
                    json!({
                        "error": "Payment verification unavailable",
                        "details": upstream.to_string(),
                    })
                    .to_string(),
                );
                Response::builder()
                    .status(StatusCode::BAD_GATEWAY)
                    .header("Content-Type", "application/json")
                    .body(body)
                    .expect("Fail to construct response")
            }
        }
    }

    fn payment_required_response(&self, status: StatusCode, error: Option<String>) -> Response {
        let payment_required = PaymentRequired {
            x402_version: X402Version1,
            error,
            descriptor: self.issue_descriptor(),
        };
        let bytes = serde_json::to_vec(&payment_required).expect("serialization failed");
        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(bytes))
            .expect("Fail to construct response")
    }
}
