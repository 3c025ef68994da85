//! Proxy routes: matching, forwarding, and redirect resolution.
//!
//! A [`Route`] binds a set of HTTP methods and a local path pattern to an
//! upstream origin. Offered a request, it either forwards it and produces a
//! response outcome, or declines so the request can continue along the
//! pipeline.
//!
//! # Module Structure
//!
//! - `method` - the closed HTTP method set routes are registered for
//! - `exclude` - literal/pattern exclusion matchers
//! - `redirect` - redirect policy and `Location` rewriting

mod exclude;
mod method;
mod redirect;

pub use exclude::ExcludeMatcher;
pub use method::{HttpMethod, ALL_METHODS};
pub use redirect::{rewrite_location, RedirectPolicy};

use crate::error::ProxyError;
use crate::pipeline::{empty_body, ProxyBody};
use crate::proxy::client::HttpClient;
use crate::proxy::forwarding::send_upstream;
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// How a route's local path is matched against request paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathMode {
    /// Exact, case-insensitive match against one local path.
    #[default]
    Single,
    /// Case-insensitive prefix match; the rest of the path is forwarded.
    Root,
}

/// Behavioral options for a route.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub path_mode: PathMode,
    pub exclude_paths: Vec<ExcludeMatcher>,
    pub redirect: RedirectPolicy,
}

/// Outcome of offering a request to a single route.
pub enum RouteOutcome {
    /// The route forwarded the request; relay this response to the client.
    Handled(Response<ProxyBody>),
    /// Method, path, or an exclusion declined before contacting the
    /// upstream; the request is handed back intact for the next route.
    NotMatched(Request<ProxyBody>),
    /// The upstream answered 404 after the body already streamed out.
    /// Remaining routes are skipped; the next pipeline stage owns
    /// not-found presentation.
    Fallthrough(Request<ProxyBody>),
}

/// One proxy binding: methods + local path pattern -> upstream target.
///
/// Immutable once constructed; shared freely across request tasks.
pub struct Route {
    methods: Vec<HttpMethod>,
    local_path: String,
    // Case-fold computed once at construction, used for every match.
    local_path_lower: String,
    target: Url,
    options: RouteOptions,
}

impl Route {
    /// Build a route for the given methods, local path, and upstream target.
    ///
    /// The target must be an absolute URL (scheme + host + path) with no
    /// query or fragment; anything else fails with
    /// [`ProxyError::InvalidTarget`].
    pub fn new(
        methods: Vec<HttpMethod>,
        local_path: impl Into<String>,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        let target_url =
            Url::parse(target).map_err(|e| ProxyError::invalid_target(target, e))?;
        if !target_url.has_host() {
            return Err(ProxyError::invalid_target(target, "missing host"));
        }
        if target_url.query().is_some() || target_url.fragment().is_some() {
            return Err(ProxyError::invalid_target(
                target,
                "target must not carry a query or fragment",
            ));
        }
        let local_path = local_path.into();
        Ok(Self {
            methods,
            local_path_lower: local_path.to_lowercase(),
            local_path,
            target: target_url,
            options,
        })
    }

    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn methods(&self) -> &[HttpMethod] {
        &self.methods
    }

    /// Match a decoded request path, returning the path remainder to append
    /// to the upstream target.
    ///
    /// Case-folding is for the comparison only; the remainder keeps the
    /// request's own casing.
    pub fn match_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        match self.options.path_mode {
            PathMode::Single => {
                if path.to_lowercase() == self.local_path_lower {
                    Some("")
                } else {
                    None
                }
            }
            PathMode::Root => {
                let prefix_len = self.local_path.len();
                if path.len() < prefix_len || !path.is_char_boundary(prefix_len) {
                    return None;
                }
                if path[..prefix_len].to_lowercase() == self.local_path_lower {
                    Some(&path[prefix_len..])
                } else {
                    None
                }
            }
        }
    }

    /// Offer a request to this route.
    ///
    /// Transport failures contacting the upstream propagate as
    /// [`ProxyError::UpstreamUnavailable`]; they are not retried here.
    pub async fn handle(
        &self,
        client: &HttpClient,
        req: Request<ProxyBody>,
    ) -> Result<RouteOutcome, ProxyError> {
        if !self.methods.iter().any(|m| m.matches(req.method())) {
            return Ok(RouteOutcome::NotMatched(req));
        }

        let decoded = match urlencoding::decode(req.uri().path()) {
            Ok(path) => path.into_owned(),
            // An undecodable path cannot match any configured local path.
            Err(_) => return Ok(RouteOutcome::NotMatched(req)),
        };

        let remainder = match self.match_path(&decoded) {
            Some(rest) => rest.to_owned(),
            None => return Ok(RouteOutcome::NotMatched(req)),
        };

        if let Some(excluded) = self
            .options
            .exclude_paths
            .iter()
            .find(|m| m.is_match(&decoded))
        {
            debug!("path {} hit exclusion {:?}, declining", decoded, excluded);
            return Ok(RouteOutcome::NotMatched(req));
        }

        // Byte-level concatenation: duplicate slashes are the upstream's to
        // interpret, not ours to normalize.
        let outbound_str = format!("{}{}", self.target.as_str(), remainder);
        let outbound = Url::parse(&outbound_str)
            .map_err(|e| ProxyError::invalid_target(outbound_str.as_str(), e))?;

        let method = req.method().clone();
        let inbound_uri = req.uri().clone();
        let inbound_headers = req.headers().clone();

        debug!("forwarding {} {} -> {}", method, inbound_uri, outbound);
        let response = send_upstream(
            client,
            method.clone(),
            &outbound,
            &inbound_headers,
            req.into_body(),
            self.options.redirect.auto_follow(),
        )
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("upstream 404 for {} {}, falling through", method, inbound_uri);
            return Ok(RouteOutcome::Fallthrough(fallthrough_request(
                method,
                inbound_uri,
                inbound_headers,
            )));
        }

        if response.status() == StatusCode::MOVED_PERMANENTLY
            && self.options.redirect == RedirectPolicy::Rewrite
        {
            return Ok(self.resolve_rewrite(response, method, inbound_uri, inbound_headers));
        }

        // Everything else relays verbatim: status, headers, and body stream.
        Ok(RouteOutcome::Handled(response.map(BoxBody::new)))
    }

    /// Apply the `rewrite` policy to a raw upstream 301.
    fn resolve_rewrite(
        &self,
        response: Response<Incoming>,
        method: Method,
        inbound_uri: Uri,
        inbound_headers: HeaderMap,
    ) -> RouteOutcome {
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|value| value.to_str().map(str::to_owned));
        let location = match location {
            // A 301 without a location has nothing to translate; the next
            // stage owns it.
            None => {
                debug!("301 without Location for {} {}, falling through", method, inbound_uri);
                return RouteOutcome::Fallthrough(fallthrough_request(
                    method,
                    inbound_uri,
                    inbound_headers,
                ));
            }
            // Undecodable header bytes cannot be rewritten; relay as-is.
            Some(Err(_)) => return RouteOutcome::Handled(response.map(BoxBody::new)),
            Some(Ok(location)) => location,
        };

        match rewrite_location(&location, &self.target, &self.local_path, &inbound_uri) {
            Some(rewritten) => match HeaderValue::from_str(&rewritten) {
                Ok(value) => {
                    debug!("rewriting redirect {} -> {}", location, rewritten);
                    let (mut parts, body) = response.into_parts();
                    parts.headers.insert(header::LOCATION, value);
                    RouteOutcome::Handled(Response::from_parts(parts, BoxBody::new(body)))
                }
                Err(_) => RouteOutcome::Handled(response.map(BoxBody::new)),
            },
            None => {
                debug!("redirect {} not rewritable, relaying as-is", location);
                RouteOutcome::Handled(response.map(BoxBody::new))
            }
        }
    }
}

/// Rebuild a request for the next pipeline stage after the original body
/// already streamed to an upstream.
fn fallthrough_request(method: Method, uri: Uri, headers: HeaderMap) -> Request<ProxyBody> {
    let mut req = Request::new(empty_body());
    *req.method_mut() = method;
    *req.uri_mut() = uri;
    *req.headers_mut() = headers;
    req
}
