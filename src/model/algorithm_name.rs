//! Algorithm names: a `(plugin, algorithm)` pair with partial specification.
//!
//! Declarations may name an algorithm fully (`"plugin:algorithm"`), by bare
//! algorithm (`"algorithm"`), or not at all; matching treats every
//! unspecified field as a wildcard.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a registered algorithm, possibly only partially specified.
///
/// Only fields that are `Some` participate in [`AlgorithmName::matches`];
/// equality and ordering compare the full `(plugin, algorithm)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlgorithmName {
    plugin: Option<String>,
    algorithm: Option<String>,
}

impl AlgorithmName {
    /// A name with neither field specified; matches anything.
    pub fn unspecified() -> Self {
        Self {
            plugin: None,
            algorithm: None,
        }
    }

    /// Parse a name spec.
    ///
    /// The spec is split on its last `:`; `"plugin:algorithm"` specifies
    /// both fields, a bare `"algorithm"` leaves the plugin open, and an
    /// empty string specifies nothing.
    pub fn parse(spec: &str) -> Self {
        if spec.is_empty() {
            return Self::unspecified();
        }
        match spec.rsplit_once(':') {
            Some((plugin, algorithm)) => Self {
                plugin: Some(plugin.to_string()),
                algorithm: Some(algorithm.to_string()),
            },
            None => Self {
                plugin: None,
                algorithm: Some(spec.to_string()),
            },
        }
    }

    /// A fully specified name.
    pub fn qualified(plugin: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            plugin: Some(plugin.into()),
            algorithm: Some(algorithm.into()),
        }
    }

    /// The plugin field, if specified.
    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// The algorithm field, if specified.
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// Whether both fields are specified.
    pub fn is_fully_specified(&self) -> bool {
        self.plugin.is_some() && self.algorithm.is_some()
    }

    /// Fill any unspecified field from `defaults`.
    pub fn with_defaults(mut self, defaults: &AlgorithmName) -> Self {
        if self.plugin.is_none() {
            self.plugin = defaults.plugin.clone();
        }
        if self.algorithm.is_none() {
            self.algorithm = defaults.algorithm.clone();
        }
        self
    }

    /// Two names match when every field specified on both sides agrees.
    pub fn matches(&self, other: &AlgorithmName) -> bool {
        let fields_agree = |a: &Option<String>, b: &Option<String>| match (a, b) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        fields_agree(&self.plugin, &other.plugin)
            && fields_agree(&self.algorithm, &other.algorithm)
    }

    /// Full rendering: `plugin:algorithm`, omitting unspecified fields.
    pub fn full(&self) -> String {
        match (&self.plugin, &self.algorithm) {
            (Some(p), Some(a)) => format!("{p}:{a}"),
            (Some(p), None) => format!("{p}:"),
            (None, Some(a)) => a.clone(),
            (None, None) => String::new(),
        }
    }
}

impl fmt::Display for AlgorithmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full())
    }
}

impl From<&str> for AlgorithmName {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<String> for AlgorithmName {
    fn from(spec: String) -> Self {
        Self::parse(&spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_last_colon() {
        let name = AlgorithmName::parse("my_plugin:double");
        assert_eq!(name.plugin(), Some("my_plugin"));
        assert_eq!(name.algorithm(), Some("double"));
        assert_eq!(name.full(), "my_plugin:double");
    }

    #[test]
    fn test_parse_bare_algorithm() {
        let name = AlgorithmName::parse("double");
        assert_eq!(name.plugin(), None);
        assert_eq!(name.algorithm(), Some("double"));
        assert_eq!(name.full(), "double");
    }

    #[test]
    fn test_unspecified_matches_anything() {
        let any = AlgorithmName::unspecified();
        assert!(any.matches(&AlgorithmName::qualified("p", "a")));
        assert!(AlgorithmName::qualified("p", "a").matches(&any));
    }

    #[test]
    fn test_partial_match_ignores_open_fields() {
        let bare = AlgorithmName::parse("double");
        let full = AlgorithmName::qualified("my_plugin", "double");
        assert!(bare.matches(&full));
        assert!(!bare.matches(&AlgorithmName::qualified("my_plugin", "triple")));
    }

    #[test]
    fn test_fully_specified_equality() {
        let a = AlgorithmName::qualified("p", "a");
        let b = AlgorithmName::parse("p:a");
        assert_eq!(a, b);
        assert_ne!(a, AlgorithmName::qualified("p", "b"));
    }

    #[test]
    fn test_with_defaults_fills_plugin() {
        let defaults = AlgorithmName::qualified("resolved_plugin", "ignored");
        let name = AlgorithmName::parse("double").with_defaults(&defaults);
        assert_eq!(name.full(), "resolved_plugin:double");
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut names = vec![
            AlgorithmName::qualified("b", "x"),
            AlgorithmName::qualified("a", "y"),
            AlgorithmName::qualified("a", "x"),
        ];
        names.sort();
        assert_eq!(names[0].full(), "a:x");
        assert_eq!(names[1].full(), "a:y");
        assert_eq!(names[2].full(), "b:x");
    }
}
