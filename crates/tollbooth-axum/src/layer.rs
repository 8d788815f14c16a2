//! Axum layer plumbing for the payment gate.
//!
//! [`TollboothMiddleware`] is created once per application around the shared
//! nonce store, then specialized per route with a price tag:
//!
//! - **[`TollboothMiddleware::with_price_tag`]** sets the payment terms of a route.
//! - **[`TollboothMiddleware::with_base_url`]** sets the base URL used to compute
//!   resource URLs from request paths. If not set, defaults to
//!   `http://localhost/` (avoid in production).
//! - **[`TollboothLayerBuilder::with_description`]** tells the payer what they
//!   are paying for.
//! - **[`TollboothLayerBuilder::with_mime_type`]** sets the MIME type of the
//!   protected resource (default: `application/json`).
//! - **[`TollboothLayerBuilder::with_resource`]** explicitly sets the full URI
//!   of the protected resource.
//! - **[`TollboothLayerBuilder::with_ttl`]** overrides the descriptor expiry
//!   window (default 300 seconds).

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use tollbooth::nonce::InMemoryNonceStore;
use tollbooth::verifier::{Eip155Ledger, Ledger, ProofVerifier};

use crate::gate::{DEFAULT_DESCRIPTOR_TTL_SECONDS, Gate, ResourceInfoBuilder, RoutePrice};

/// The main middleware instance for enforcing payments on routes.
///
/// Create a single instance per application around the shared nonce store and
/// use it to build payment layers for protected routes.
#[derive(Clone, Debug)]
pub struct TollboothMiddleware<L = Eip155Ledger> {
    store: Arc<InMemoryNonceStore>,
    ledger: L,
    base_url: Option<Url>,
    descriptor_ttl_seconds: u64,
}

impl TollboothMiddleware<Eip155Ledger> {
    /// Creates a middleware that checks proofs with the in-process
    /// [`Eip155Ledger`].
    pub fn new(store: Arc<InMemoryNonceStore>) -> Self {
        Self::with_ledger(store, Eip155Ledger::new())
    }
}

impl<L> TollboothMiddleware<L> {
    /// Creates a middleware with a custom [`Ledger`] collaborator.
    pub fn with_ledger(store: Arc<InMemoryNonceStore>, ledger: L) -> Self {
        Self {
            store,
            ledger,
            base_url: None,
            descriptor_ttl_seconds: DEFAULT_DESCRIPTOR_TTL_SECONDS,
        }
    }

    /// The shared outstanding-nonce store.
    pub fn store(&self) -> &Arc<InMemoryNonceStore> {
        &self.store
    }
}

impl<L> TollboothMiddleware<L>
where
    L: Clone,
{
    /// Sets the base URL used to construct resource URLs dynamically.
    ///
    /// If [`TollboothLayerBuilder::with_resource`] is not called, this base
    /// URL is combined with each request's path/query to compute the
    /// resource. In production, prefer calling `with_resource` or setting a
    /// precise `base_url`.
    pub fn with_base_url(&self, base_url: Url) -> Self {
        let mut this = self.clone();
        this.base_url = Some(base_url);
        this
    }

    /// Overrides the default descriptor expiry window for layers built from
    /// this instance.
    pub fn with_descriptor_ttl(&self, seconds: u64) -> Self {
        let mut this = self.clone();
        this.descriptor_ttl_seconds = seconds;
        this
    }

    /// Sets the price tag for a protected route.
    ///
    /// Creates a layer builder that can be further configured with resource
    /// information before being applied to the route.
    pub fn with_price_tag(&self, price: RoutePrice) -> TollboothLayerBuilder<L> {
        TollboothLayerBuilder {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            price: Arc::new(price),
            base_url: self.base_url.clone().map(Arc::new),
            resource: Arc::new(ResourceInfoBuilder::default()),
            descriptor_ttl_seconds: self.descriptor_ttl_seconds,
        }
    }
}

/// Builder for configuring the payment layer of one route.
#[derive(Clone)]
pub struct TollboothLayerBuilder<L> {
    store: Arc<InMemoryNonceStore>,
    ledger: L,
    price: Arc<RoutePrice>,
    base_url: Option<Arc<Url>>,
    resource: Arc<ResourceInfoBuilder>,
    descriptor_ttl_seconds: u64,
}

impl<L> TollboothLayerBuilder<L> {
    /// Sets a description of what the payment grants access to.
    ///
    /// Included in 402 responses to inform payers what they're paying for.
    pub fn with_description(mut self, description: String) -> Self {
        let mut new_resource = (*self.resource).clone();
        new_resource.description = description;
        self.resource = Arc::new(new_resource);
        self
    }

    /// Sets the MIME type of the protected resource.
    ///
    /// Defaults to `application/json` if not specified.
    pub fn with_mime_type(mut self, mime: String) -> Self {
        let mut new_resource = (*self.resource).clone();
        new_resource.mime_type = mime;
        self.resource = Arc::new(new_resource);
        self
    }

    /// Sets the full URL of the protected resource.
    ///
    /// When set, this URL is used directly instead of constructing it from
    /// the base URL and request URI.
    pub fn with_resource(mut self, resource: Url) -> Self {
        let mut new_resource = (*self.resource).clone();
        new_resource.url = Some(resource.to_string());
        self.resource = Arc::new(new_resource);
        self
    }

    /// Overrides the descriptor expiry window for this route.
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.descriptor_ttl_seconds = seconds;
        self
    }
}

impl<S, L> Layer<S> for TollboothLayerBuilder<L>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    L: Ledger + Clone,
{
    type Service = TollboothService<L>;

    fn layer(&self, inner: S) -> Self::Service {
        TollboothService {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            price: self.price.clone(),
            base_url: self.base_url.clone(),
            resource: self.resource.clone(),
            descriptor_ttl_seconds: self.descriptor_ttl_seconds,
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces payment on incoming requests.
#[derive(Clone)]
pub struct TollboothService<L> {
    /// Shared outstanding-nonce store
    store: Arc<InMemoryNonceStore>,
    /// Proof validity collaborator
    ledger: L,
    /// Payment terms of this route
    price: Arc<RoutePrice>,
    /// Base URL for constructing resource URLs
    base_url: Option<Arc<Url>>,
    /// Resource information
    resource: Arc<ResourceInfoBuilder>,
    /// Descriptor expiry window
    descriptor_ttl_seconds: u64,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<L> Service<Request> for TollboothService<L>
where
    L: Ledger + Clone + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Intercepts the request, injects payment enforcement, and forwards to
    /// the wrapped service.
    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Gate {
            verifier: ProofVerifier::new(self.store.clone(), self.ledger.clone()),
            price: self.price.clone(),
            resource: self
                .resource
                .as_resource_info(self.base_url.as_deref(), req.uri()),
            descriptor_ttl_seconds: self.descriptor_ttl_seconds,
        };
        Box::pin(gate.handle_request(self.inner.clone(), req))
    }
}
