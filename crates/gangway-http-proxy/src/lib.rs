//! Gangway: a reverse-proxy routing layer.
//!
//! Incoming requests are matched against registered proxy routes; matching
//! requests are forwarded to an upstream origin and the upstream's response
//! is relayed back, with qualifying redirects rewritten into the proxy's
//! public path space. Requests no route claims continue along the pipeline.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod proxy;
pub mod route;
pub mod router;

pub use error::ProxyError;
pub use route::{HttpMethod, PathMode, RedirectPolicy, Route, RouteOptions, ALL_METHODS};
pub use router::{Router, RouterHandler};
