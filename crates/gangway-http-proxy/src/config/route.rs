//! Route configuration entries.
//!
//! File form of a proxy route; compiled into registration calls on the
//! router at startup.

use crate::route::{ExcludeMatcher, HttpMethod, PathMode, RedirectPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Local path pattern on the proxy's public surface.
    pub path: String,
    /// Absolute upstream URL (scheme + host + path).
    pub target: String,
    /// Methods the route accepts; omitted means all seven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<HttpMethod>>,
    #[serde(default)]
    pub path_mode: PathMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_paths: Vec<ExcludePattern>,
    #[serde(default)]
    pub redirect: RedirectPolicy,
}

/// Exclusion entry: a bare string is a literal path, `{pattern: "..."}` is
/// a regular expression.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExcludePattern {
    Literal(String),
    Pattern { pattern: String },
}

impl ExcludePattern {
    /// Compile this entry into its runtime matcher.
    pub fn compile(&self) -> Result<ExcludeMatcher, regex::Error> {
        match self {
            ExcludePattern::Literal(path) => Ok(ExcludeMatcher::literal(path.clone())),
            ExcludePattern::Pattern { pattern } => ExcludeMatcher::pattern(pattern),
        }
    }
}
