//! Route matching logic.
//!
//! # Responsibilities
//! - Compile a route path into an anchored regular expression
//! - Test a raw request target (path plus query) against it
//!
//! # Design Decisions
//! - Patterns are anchored at the start only: `/api` accepts `/api/v1?x=1`
//! - Patterns compile once at startup; a bad pattern fails the boot
//! - Path matching is case-sensitive

use regex::Regex;

/// Trait for matching request targets against a compiled condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request target matches this condition.
    fn matches(&self, target: &str) -> bool;
}

/// Matches a prefix of the request target against a regex pattern.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    regex: Regex,
}

impl PathMatcher {
    /// Compile `pattern` as `^pattern`.
    pub fn new(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let regex = Regex::new(&format!("^{}", pattern))?;
        Ok(Self { pattern, regex })
    }

    /// The pattern as configured, without the anchor.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, target: &str) -> bool {
        self.regex.is_match(target)
    }
}
