//! Middleware for handling HTTP 402 Payment Required responses.
//!
//! This module provides the [`TollboothPayments`] struct which implements
//! `reqwest_middleware::Middleware`, allowing a single automatic retry of a
//! request with a signed `X-Payment` header.
//!
//! It includes:
//! - Descriptor parsing from the 402 response body
//! - Per-asset spend caps
//! - Payment signing via a [`PaymentSigner`]
//! - Base64 encoding into a payment header

use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use tollbooth::proto::{PAYMENT_HEADER, PaymentDescriptor, PaymentRequired, ProtocolError, TokenAmount};
use tollbooth::signer::{PaymentSigner, SigningError};

/// Errors that can occur while satisfying a 402 challenge.
///
/// Each of these is terminal for the call that triggered it; the caller sees
/// exactly one outcome per logical request.
#[derive(Debug, thiserror::Error)]
pub enum TollboothPaymentsError {
    /// The 402 body did not decode into a payment descriptor. Surfaced
    /// instead of retrying blindly.
    #[error("could not parse payment descriptor: {0}")]
    DescriptorParse(#[from] ProtocolError),
    /// The descriptor asks for more than the configured cap for its asset.
    /// This prevents accidental or malicious overspending.
    #[error("payment amount {requested} exceeds maximum allowed {allowed} for asset {asset}")]
    PaymentAmountTooLarge {
        requested: TokenAmount,
        allowed: TokenAmount,
        asset: String,
    },
    /// Indicates that the original request could not be cloned for retrying
    /// with a payment header. This typically happens when the request body is
    /// a stream or otherwise non-reusable.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    /// The signer could not produce a proof for the descriptor.
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// Raised when the base64-encoded JSON payload cannot be inserted into a
    /// [`HeaderValue`].
    #[error("Failed to encode payment proof to HTTP header")]
    HeaderValueEncodeError(#[source] http::header::InvalidHeaderValue),
}

impl From<TollboothPaymentsError> for rqm::Error {
    fn from(error: TollboothPaymentsError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Middleware that satisfies a 402 challenge by attaching a signed payment
/// proof to a single retransmission of the original request.
#[derive(Clone)]
pub struct TollboothPayments {
    signer: Arc<dyn PaymentSigner>,
    max_amount: HashMap<String, TokenAmount>,
}

impl TollboothPayments {
    /// Create a new middleware instance with the given payment signer.
    pub fn with_signer<S: PaymentSigner + 'static>(signer: S) -> Self {
        Self {
            signer: Arc::new(signer),
            max_amount: HashMap::new(),
        }
    }

    /// Set a max amount allowed for a given asset (by contract address).
    pub fn max<A: Into<String>>(&self, asset: A, amount: TokenAmount) -> Self {
        let mut this = self.clone();
        this.max_amount.insert(asset.into(), amount);
        this
    }

    /// Ensures the descriptor does not exceed the configured cap for its asset.
    pub fn assert_max_amount(
        &self,
        descriptor: &PaymentDescriptor,
    ) -> Result<(), TollboothPaymentsError> {
        if let Some(max) = self.max_amount.get(&descriptor.asset)
            && &descriptor.amount > max
        {
            return Err(TollboothPaymentsError::PaymentAmountTooLarge {
                requested: descriptor.amount,
                allowed: *max,
                asset: descriptor.asset.clone(),
            });
        }
        Ok(())
    }

    /// Builds the payment header: enforce the spend cap, sign the proof, and
    /// base64-encode it.
    #[instrument(name = "tollbooth.build_payment_header", skip_all, fields(
        network = %descriptor.network,
        asset = %descriptor.asset,
        amount = %descriptor.amount,
    ))]
    pub async fn build_payment_header(
        &self,
        descriptor: &PaymentDescriptor,
    ) -> Result<HeaderValue, TollboothPaymentsError> {
        self.assert_max_amount(descriptor)?;
        let proof = self.signer.sign(descriptor).await?;
        let b64 = proof.encode_header()?;
        HeaderValue::from_bytes(b64.as_ref())
            .map_err(TollboothPaymentsError::HeaderValueEncodeError)
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for TollboothPayments {
    /// Intercepts the response. If it's a 402, it constructs a payment and
    /// retries the request exactly once.
    #[instrument(name = "tollbooth.handle", skip(self, req, extensions, next), fields(method = %req.method(), url = %req.url()))]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone(); // For retrying with payment later

        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res); // No 402: passthrough, zero retries
        }

        tracing::debug!("received 402 Payment Required");

        let body = res.bytes().await?;
        let payment_required = PaymentRequired::from_json_bytes(&body)
            .map_err(TollboothPaymentsError::DescriptorParse)
            .map_err(Into::<rqm::Error>::into)?;

        let retry_req = async {
            let payment_header = self
                .build_payment_header(&payment_required.descriptor)
                .await?;
            let mut req = retry_req.ok_or(TollboothPaymentsError::RequestNotCloneable)?;
            req.headers_mut().insert(PAYMENT_HEADER, payment_header);
            Ok::<Request, TollboothPaymentsError>(req)
        }
        .await
        .map_err(Into::<rqm::Error>::into)?;

        // Whatever the second response says is final. At most one retry per
        // logical call; a server replying 402 forever gets its 402 returned,
        // not another payment.
        next.run(retry_req, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;
    use reqwest::Client;
    use serde_json::json;
    use tollbooth::network::Network;
    use tollbooth::proto::{Nonce, X402Version1};
    use tollbooth::signer::Eip155Signer;
    use tollbooth::timestamp::UnixTimestamp;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAY_TO: &str = "0xBAc675C310721717Cd4A37F6cbeA1F081b1C2a07";
    const ASSET: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

    fn descriptor(resource: String) -> PaymentDescriptor {
        PaymentDescriptor {
            resource,
            description: "Access to premium API".to_string(),
            mime_type: "application/json".to_string(),
            amount: TokenAmount(10000),
            asset: ASSET.to_string(),
            network: Network::BaseSepolia,
            pay_to: PAY_TO.to_string(),
            expires_at: UnixTimestamp::now() + 300,
            nonce: Nonce::random(),
        }
    }

    fn payment_required_body(resource: String) -> serde_json::Value {
        serde_json::to_value(PaymentRequired {
            x402_version: X402Version1,
            error: None,
            descriptor: descriptor(resource),
        })
        .unwrap()
    }

    fn paying_client() -> rqm::ClientWithMiddleware {
        let payments =
            TollboothPayments::with_signer(Eip155Signer::new(PrivateKeySigner::random()));
        rqm::ClientBuilder::new(Client::new()).with(payments).build()
    }

    #[tokio::test]
    async fn test_non_402_passes_through_with_single_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/free"))
            .respond_with(ResponseTemplate::new(200).set_body_string("gratis"))
            .mount(&server)
            .await;

        let client = paying_client();
        let res = client
            .get(format!("{}/free", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "gratis");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_402_then_paid_retry_succeeds() {
        let server = MockServer::start().await;
        let resource = format!("{}/weather", server.uri());

        // First attempt: 402 with a descriptor. Second attempt: paid content.
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(payment_required_body(resource.clone())),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "temp": 72 })))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = paying_client();
        let res = client.get(&resource).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        // The retransmission carries the proof header; the first leg did not.
        assert!(!requests[0].headers.contains_key(PAYMENT_HEADER));
        assert!(requests[1].headers.contains_key(PAYMENT_HEADER));
    }

    #[tokio::test]
    async fn test_misbehaving_server_gets_at_most_two_attempts() {
        let server = MockServer::start().await;
        let resource = format!("{}/greedy", server.uri());
        // The server ignores payments and asks again, forever.
        Mock::given(method("GET"))
            .and(path("/greedy"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(payment_required_body(resource.clone())),
            )
            .mount(&server)
            .await;

        let client = paying_client();
        let res = client.get(&resource).send().await.unwrap();
        // The second 402 is returned to the caller as final.
        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_402_body_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(402).set_body_string("pay me"))
            .mount(&server)
            .await;

        let client = paying_client();
        let err = client
            .get(format!("{}/broken", server.uri()))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, rqm::Error::Middleware(_)));
        // No blind retry on an unreadable challenge.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spend_cap_blocks_payment() {
        let server = MockServer::start().await;
        let resource = format!("{}/pricey", server.uri());
        Mock::given(method("GET"))
            .and(path("/pricey"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(payment_required_body(resource.clone())),
            )
            .mount(&server)
            .await;

        let payments =
            TollboothPayments::with_signer(Eip155Signer::new(PrivateKeySigner::random()))
                .max(ASSET, TokenAmount(5000));
        let client = rqm::ClientBuilder::new(Client::new()).with(payments).build();

        let err = client.get(&resource).send().await.unwrap_err();
        assert!(matches!(err, rqm::Error::Middleware(_)));
        // The cap fails before any payment is signed or sent.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
