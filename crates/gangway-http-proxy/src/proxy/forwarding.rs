//! Outbound calls to upstream origins.
//!
//! This module owns the wire side of a route: building the outbound request
//! (inbound headers copied, `Host` overwritten per hop) and, when a route's
//! redirect policy asks for it, resolving redirects before the response is
//! handed back for inspection.

use super::client::HttpClient;
use crate::error::ProxyError;
use crate::pipeline::{empty_body, ProxyBody};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::{HeaderMap, Method, Request, Response, Uri};
use tracing::debug;
use url::Url;

/// Upper bound on redirect hops resolved under the `follow` policy.
const MAX_FOLLOW_HOPS: usize = 10;

/// Helper function to create an error response.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    let body = format!(r#"{{"error": "{message}"}}"#);
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Issue the outbound call for a route.
///
/// With `follow_redirects` the call resolves intermediate redirects itself
/// (bounded by [`MAX_FOLLOW_HOPS`]); otherwise the raw redirect response is
/// returned for the caller to inspect. Transport failures surface as
/// [`ProxyError::UpstreamUnavailable`] and are not retried.
pub async fn send_upstream(
    client: &HttpClient,
    method: Method,
    url: &Url,
    headers: &HeaderMap,
    body: ProxyBody,
    follow_redirects: bool,
) -> Result<Response<Incoming>, ProxyError> {
    let mut url = url.clone();
    let mut method = method;
    let mut body = Some(body);
    let mut hops = 0;

    loop {
        let request = outbound_request(
            &method,
            &url,
            headers,
            body.take().unwrap_or_else(empty_body),
        )?;
        let response = client
            .request(request)
            .await
            .map_err(ProxyError::UpstreamUnavailable)?;

        if !follow_redirects {
            return Ok(response);
        }

        let status = response.status();
        let is_redirect = matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308);
        if !is_redirect || hops >= MAX_FOLLOW_HOPS {
            return Ok(response);
        }

        let next = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| url.join(location).ok());
        let Some(next) = next else {
            return Ok(response);
        };

        // The request body has already streamed out; hops other than
        // 307/308 degrade to GET.
        if !matches!(status.as_u16(), 307 | 308) {
            method = Method::GET;
        }
        hops += 1;
        debug!("following redirect ({}) to {}", status, next);
        url = next;
    }
}

/// Build the outbound request: inbound headers copied, `Host` overwritten
/// with the target's host.
fn outbound_request(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    body: ProxyBody,
) -> Result<Request<ProxyBody>, ProxyError> {
    let uri: Uri = url
        .as_str()
        .parse()
        .map_err(|e| ProxyError::invalid_target(url.as_str(), e))?;

    let mut request = Request::new(body);
    *request.method_mut() = method.clone();
    *request.uri_mut() = uri;

    let outbound_headers = request.headers_mut();
    for (name, value) in headers {
        if name != &header::HOST {
            outbound_headers.append(name, value.clone());
        }
    }
    outbound_headers.insert(header::HOST, host_header(url)?);

    Ok(request)
}

fn host_header(url: &Url) -> Result<HeaderValue, ProxyError> {
    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::invalid_target(url.as_str(), "missing host"))?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    HeaderValue::from_str(&value).map_err(|e| ProxyError::invalid_target(url.as_str(), e))
}
