//! Middleware composition.
//!
//! A [`Chain`] hands each request to its layers in order. A layer either
//! answers it or passes it on with [`Next::run`]; whatever falls through the
//! last layer reaches the endpoint service.

use hyper::StatusCode;

use crate::http::{status_response, Request, Response};
use crate::server::{ConnectionInfo, Service};

/// One step of a [`Chain`].
pub trait Layer: Send + Sync + 'static {
    fn handle(&self, request: Request, next: Next<'_>) -> Response;
}

/// The rest of the chain, as seen from inside a layer.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [Box<dyn Layer>],
    endpoint: &'a dyn Service,
    info: ConnectionInfo,
}

impl<'a> Next<'a> {
    /// Passes `request` to the following layer, or the endpoint after the last.
    pub fn run(self, request: Request) -> Response {
        match self.layers.split_first() {
            Some((layer, layers)) => layer.handle(request, Next { layers, ..self }),
            None => self.endpoint.call(request, self.info),
        }
    }
}

/// Ordered layers in front of an endpoint service.
///
/// ```
/// use quay::{Chain, Layer, Next, Request, Response};
///
/// struct Teapot;
///
/// impl Layer for Teapot {
///     fn handle(&self, request: Request, next: Next<'_>) -> Response {
///         if request.uri().path() == "/tea" {
///             let mut response = Response::default();
///             *response.status_mut() = quay::hyper::StatusCode::IM_A_TEAPOT;
///             return response;
///         }
///         next.run(request)
///     }
/// }
///
/// let chain = Chain::new().layer(Teapot);
/// ```
pub struct Chain {
    layers: Vec<Box<dyn Layer>>,
    endpoint: Box<dyn Service>,
}

impl Chain {
    /// An empty chain whose endpoint answers `404 Not Found`.
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            endpoint: Box::new(|_: Request, _: ConnectionInfo| {
                status_response(StatusCode::NOT_FOUND)
            }),
        }
    }

    /// Appends a layer after the existing ones.
    pub fn layer(mut self, layer: impl Layer) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Replaces the endpoint requests reach when no layer answers.
    pub fn endpoint(mut self, endpoint: impl Service) -> Self {
        self.endpoint = Box::new(endpoint);
        self
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for Chain {
    fn call(&self, request: Request, info: ConnectionInfo) -> Response {
        let next = Next {
            layers: &self.layers,
            endpoint: self.endpoint.as_ref(),
            info,
        };
        next.run(request)
    }
}
