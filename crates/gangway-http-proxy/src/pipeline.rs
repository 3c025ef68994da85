//! Pipeline stage contract.
//!
//! The routing layer is one stage in a request pipeline: a stage either
//! produces a full response or hands the request on to whatever comes next.
//! Requests travel between stages as `Request<ProxyBody>` so a stage that
//! declines can return the request intact, body included.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Request, Response};
use std::convert::Infallible;

/// Body type flowing through the pipeline, for both requests and responses.
///
/// Inbound `hyper::body::Incoming` is boxed into this type once at the
/// server edge; upstream response bodies are boxed the same way, so bodies
/// stream through without buffering.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Outcome of running one pipeline stage.
pub enum StageOutcome {
    /// The stage produced a response; the pipeline is done.
    Responded(Response<ProxyBody>),
    /// The stage declined; the next stage gets the request.
    Continue(Request<ProxyBody>),
}

/// An empty pipeline body.
pub fn empty_body() -> ProxyBody {
    BoxBody::new(Empty::new().map_err(|never: Infallible| match never {}))
}

/// A pipeline body holding the given bytes.
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    BoxBody::new(Full::new(bytes.into()).map_err(|never: Infallible| match never {}))
}

/// Extension trait for `Response<Full<Bytes>>` providing common
/// transformations.
pub trait ResponseExt {
    /// Convert the response body into the pipeline body type.
    fn into_boxed(self) -> Response<ProxyBody>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed(self) -> Response<ProxyBody> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}
