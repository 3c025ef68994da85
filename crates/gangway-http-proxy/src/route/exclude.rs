//! Exclusion matchers for carving paths out of a route.
//!
//! Exclusions are consulted only after a request has already matched the
//! route's method set and path; a hit makes the route decline so a later
//! stage can serve the path locally.

use regex::Regex;

/// A single exclusion entry: either a literal path or a pattern.
#[derive(Debug, Clone)]
pub enum ExcludeMatcher {
    /// Matches when the decoded request path equals this string exactly.
    Literal(String),
    /// Matches when the pattern tests positively anywhere in the path.
    Pattern(Regex),
}

impl ExcludeMatcher {
    pub fn literal(path: impl Into<String>) -> Self {
        ExcludeMatcher::Literal(path.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(ExcludeMatcher::Pattern(Regex::new(pattern)?))
    }

    /// Test a decoded request path against this entry.
    pub fn is_match(&self, path: &str) -> bool {
        match self {
            ExcludeMatcher::Literal(literal) => path == literal,
            ExcludeMatcher::Pattern(regex) => regex.is_match(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_requires_exact_equality() {
        let matcher = ExcludeMatcher::literal("/api/admin");
        assert!(matcher.is_match("/api/admin"));
        assert!(!matcher.is_match("/api/admin/users"));
        assert!(!matcher.is_match("/api"));
    }

    #[test]
    fn test_pattern_matches_anywhere() {
        let matcher = ExcludeMatcher::pattern(r"\.map$").unwrap();
        assert!(matcher.is_match("/assets/app.js.map"));
        assert!(!matcher.is_match("/assets/app.js"));

        let matcher = ExcludeMatcher::pattern("internal").unwrap();
        assert!(matcher.is_match("/api/internal/metrics"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(ExcludeMatcher::pattern("(unclosed").is_err());
    }
}
