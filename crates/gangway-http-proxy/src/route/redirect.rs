//! Redirect handling policy and `Location` rewriting.

use serde::{Deserialize, Serialize};
use url::Url;

/// What a route does with redirect responses from its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedirectPolicy {
    /// Relay the upstream redirect to the client untouched.
    Forward,
    /// Translate a same-upstream 301 back into the local path space;
    /// falls back to `Forward` behavior when translation is not possible.
    Rewrite,
    /// Follow redirects on the outbound call; the client never sees a
    /// redirect from this hop.
    #[default]
    Follow,
}

impl RedirectPolicy {
    /// Whether the outbound call should resolve redirects itself.
    pub fn auto_follow(&self) -> bool {
        matches!(self, RedirectPolicy::Follow)
    }
}

/// Translate an upstream redirect `Location` back into the proxy's public
/// path space.
///
/// Succeeds only when the redirect is an absolute URL on the upstream
/// target's origin whose path extends the target's base path; the result
/// is `local_path` plus the leftover path, carrying the redirect's own
/// query through, prefixed with the inbound request's origin when the
/// inbound URI carries one. Returns `None` when the location cannot be
/// rewritten; the caller relays the upstream response verbatim instead.
pub fn rewrite_location(
    location: &str,
    target: &Url,
    local_path: &str,
    inbound: &hyper::Uri,
) -> Option<String> {
    // A relative or malformed location fails to parse and is not rewritten.
    let redirect = Url::parse(location).ok()?;
    if redirect.origin() != target.origin() {
        return None;
    }
    let remainder = redirect.path().strip_prefix(target.path())?;

    let mut rewritten = String::new();
    if let (Some(scheme), Some(authority)) = (inbound.scheme_str(), inbound.authority()) {
        rewritten.push_str(scheme);
        rewritten.push_str("://");
        rewritten.push_str(authority.as_str());
    }
    rewritten.push_str(local_path);
    rewritten.push_str(remainder);
    if let Some(query) = redirect.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    Some(rewritten)
}
