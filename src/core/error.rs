//! Unified error handling for the phlex runtime
//!
//! This module provides the central error type that covers every failure mode
//! of pipeline composition and execution, together with the crate-wide
//! `Result` alias and a small context-attachment helper.

use std::fmt;

use crate::model::products::StoreError;
use crate::persistence::PersistenceError;

/// Main error type for the phlex runtime
#[derive(Debug)]
pub enum PhlexError {
    /// Composition problems accumulated while building the graph.
    ///
    /// Carries every recorded message so a full batch of registration
    /// mistakes is reported at once; execution is refused while any are
    /// present.
    Configuration {
        /// Accumulated human-readable messages
        messages: Vec<String>,
    },

    /// A single registration statement was malformed
    Registration {
        /// Error message
        message: String,
    },

    /// Product store errors (missing product, type mismatch, duplicate key)
    Store(StoreError),

    /// A node invocation failed during execution
    Execution {
        /// Full name of the failing node
        node: String,
        /// Error message
        message: String,
    },

    /// The source failed while producing stores
    Source {
        /// Error message
        message: String,
    },

    /// Persistence backend errors surfaced through output nodes
    Persistence(PersistenceError),
}

impl fmt::Display for PhlexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhlexError::Configuration { messages } => {
                write!(
                    f,
                    "Configuration error: {} problem(s) recorded during graph composition: {}",
                    messages.len(),
                    messages.join("; ")
                )
            },
            PhlexError::Registration { message } => {
                write!(f, "Registration error: {message}")
            },
            PhlexError::Store(err) => {
                write!(f, "Product store error: {err}")
            },
            PhlexError::Execution { node, message } => {
                write!(f, "Execution error in '{node}': {message}")
            },
            PhlexError::Source { message } => {
                write!(f, "Source error: {message}")
            },
            PhlexError::Persistence(err) => {
                write!(f, "Persistence error: {err}")
            },
        }
    }
}

impl std::error::Error for PhlexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PhlexError::Store(err) => Some(err),
            PhlexError::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for PhlexError {
    fn from(err: StoreError) -> Self {
        PhlexError::Store(err)
    }
}

impl From<PersistenceError> for PhlexError {
    fn from(err: PersistenceError) -> Self {
        PhlexError::Persistence(err)
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, PhlexError>;

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Warning - something unexpected but recoverable
    Warning,
    /// Error - operation failed but the run can continue
    Error,
    /// Critical - the run cannot proceed
    Critical,
}

impl PhlexError {
    /// Get the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PhlexError::Configuration { .. } => ErrorSeverity::Critical,
            PhlexError::Registration { .. } => ErrorSeverity::Critical,
            PhlexError::Store(_) => ErrorSeverity::Error,
            // Per-id failures are skipped downstream while the run continues.
            PhlexError::Execution { .. } => ErrorSeverity::Warning,
            PhlexError::Source { .. } => ErrorSeverity::Error,
            PhlexError::Persistence(_) => ErrorSeverity::Error,
        }
    }

    /// Check if the run may continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self.severity() {
            ErrorSeverity::Warning => true,
            ErrorSeverity::Error => true,
            ErrorSeverity::Critical => false,
        }
    }

    /// Get error category for metrics/monitoring
    pub fn category(&self) -> &'static str {
        match self {
            PhlexError::Configuration { .. } => "configuration",
            PhlexError::Registration { .. } => "registration",
            PhlexError::Store(_) => "store",
            PhlexError::Execution { .. } => "execution",
            PhlexError::Source { .. } => "source",
            PhlexError::Persistence(_) => "persistence",
        }
    }
}

/// Trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context(self, context: &str) -> Result<T>;

    /// Add context using a closure
    fn with_context_lazy<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<PhlexError>,
{
    fn with_context(self, context: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            PhlexError::Registration { message } => PhlexError::Registration {
                message: format!("{context}: {message}"),
            },
            PhlexError::Execution { node, message } => PhlexError::Execution {
                node,
                message: format!("{context}: {message}"),
            },
            PhlexError::Source { message } => PhlexError::Source {
                message: format!("{context}: {message}"),
            },
            other => other,
        })
    }

    fn with_context_lazy<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        match self {
            Ok(value) => Ok(value),
            Err(e) => {
                let context = f();
                Err(e).with_context(&context)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display_joins_messages() {
        let error = PhlexError::Configuration {
            messages: vec!["duplicate node 'a'".into(), "unknown predicate 'p'".into()],
        };
        let rendered = format!("{error}");
        assert!(rendered.contains("2 problem(s)"));
        assert!(rendered.contains("duplicate node 'a'"));
        assert!(rendered.contains("unknown predicate 'p'"));
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), PhlexError> = Err(PhlexError::Source {
            message: "ran dry".into(),
        });
        let error = result.with_context("pulling next store").unwrap_err();
        assert_eq!(
            format!("{error}"),
            "Source error: pulling next store: ran dry"
        );
    }

    #[test]
    fn test_error_severity() {
        let config = PhlexError::Configuration { messages: vec![] };
        assert_eq!(config.severity(), ErrorSeverity::Critical);
        assert!(!config.is_recoverable());

        let execution = PhlexError::Execution {
            node: "double".into(),
            message: "boom".into(),
        };
        assert_eq!(execution.severity(), ErrorSeverity::Warning);
        assert!(execution.is_recoverable());
        assert_eq!(execution.category(), "execution");
    }
}
