//! Qualified product names and declaration-time labels.
//!
//! A [`QualifiedName`] identifies a product by its producer qualifier plus
//! the bare product name; a [`SpecifiedLabel`] is the declaration-time
//! selector that gets resolved against the catalog before execution.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::algorithm_name::AlgorithmName;

/// A product identified by `(qualifier, name)`.
///
/// Equality and ordering are lexicographic over the pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    qualifier: AlgorithmName,
    name: String,
}

impl QualifiedName {
    /// A product name with an explicit qualifier.
    pub fn new(qualifier: AlgorithmName, name: impl Into<String>) -> Self {
        Self {
            qualifier,
            name: name.into(),
        }
    }

    /// Parse `"name"`, `"algorithm:name"`, or `"plugin:algorithm:name"`.
    pub fn parse(spec: &str) -> Self {
        match spec.rsplit_once(':') {
            Some((qualifier, name)) => Self {
                qualifier: AlgorithmName::parse(qualifier),
                name: name.to_string(),
            },
            None => Self {
                qualifier: AlgorithmName::unspecified(),
                name: spec.to_string(),
            },
        }
    }

    /// The producer qualifier.
    pub fn qualifier(&self) -> &AlgorithmName {
        &self.qualifier
    }

    /// The bare product name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full rendering with every specified qualifier segment.
    pub fn full(&self) -> String {
        let qualifier = self.qualifier.full();
        if qualifier.is_empty() {
            self.name.clone()
        } else {
            format!("{qualifier}:{}", self.name)
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full())
    }
}

/// Turn a producer's output product names into qualified names.
pub fn to_qualified_names(qualifier: &AlgorithmName, names: &[String]) -> Vec<QualifiedName> {
    names
        .iter()
        .map(|n| QualifiedName::new(qualifier.clone(), n.clone()))
        .collect()
}

/// Declaration-time product selector: a name plus an optional producer
/// qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecifiedLabel {
    name: String,
    qualifier: Option<AlgorithmName>,
}

impl SpecifiedLabel {
    /// A bare label matching any producer.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }

    /// Parse `"product"` or `"algorithm:product"`.
    pub fn parse(spec: &str) -> Self {
        match spec.rsplit_once(':') {
            Some((qualifier, name)) => Self {
                name: name.to_string(),
                qualifier: Some(AlgorithmName::parse(qualifier)),
            },
            None => Self::bare(spec),
        }
    }

    /// The product name the label selects.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The producer qualifier, if the label specified one.
    pub fn qualifier(&self) -> Option<&AlgorithmName> {
        self.qualifier.as_ref()
    }

    /// Whether `producer` satisfies this label's qualifier.
    pub fn accepts_producer(&self, producer: &AlgorithmName) -> bool {
        match &self.qualifier {
            Some(qualifier) => qualifier.matches(producer),
            None => true,
        }
    }
}

impl fmt::Display for SpecifiedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}:{}", q.full(), self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<&str> for SpecifiedLabel {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<String> for SpecifiedLabel {
    fn from(spec: String) -> Self {
        Self::parse(&spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_parse_and_render() {
        let qn = QualifiedName::parse("my_plugin:double:y");
        assert_eq!(qn.name(), "y");
        assert_eq!(qn.qualifier().plugin(), Some("my_plugin"));
        assert_eq!(qn.qualifier().algorithm(), Some("double"));
        assert_eq!(qn.full(), "my_plugin:double:y");
    }

    #[test]
    fn test_qualified_name_ordering() {
        let a = QualifiedName::parse("alg:x");
        let b = QualifiedName::parse("alg:y");
        assert!(a < b);
    }

    #[test]
    fn test_bare_label_accepts_any_producer() {
        let label = SpecifiedLabel::parse("x");
        assert_eq!(label.name(), "x");
        assert!(label.accepts_producer(&AlgorithmName::qualified("p", "a")));
    }

    #[test]
    fn test_qualified_label_filters_producers() {
        let label = SpecifiedLabel::parse("double:y");
        assert_eq!(label.name(), "y");
        assert!(label.accepts_producer(&AlgorithmName::qualified("p", "double")));
        assert!(!label.accepts_producer(&AlgorithmName::qualified("p", "triple")));
    }

    #[test]
    fn test_to_qualified_names_carries_qualifier() {
        let producer = AlgorithmName::qualified("p", "a");
        let names = to_qualified_names(&producer, &["x".into(), "y".into()]);
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].full(), "p:a:x");
        assert_eq!(names[1].full(), "p:a:y");
    }
}
