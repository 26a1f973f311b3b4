use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "budget.monthly_limit")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the offending value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "upstream", "file_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the search-cost optimization layer.
///
/// Only internal seams return these; the caller-facing `search` and
/// `search_category` entry points convert every variant into fallback data.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Upstream search error: {message}{}", format_context(.context))]
    Upstream {
        message: String,
        context: ErrorContext,
    },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("circuit breaker open for {operation}")]
    CircuitOpen { operation: String },

    #[error("monthly budget exhausted: spent {spent} of {limit}")]
    BudgetExhausted { limit: String, spent: String },

    #[error("Storage error: {message}{}", format_context(.context))]
    Storage {
        message: String,
        context: ErrorContext,
    },

    #[error("coalesced request for '{query}' was cancelled before completion")]
    Cancelled { query: String },

    #[error("coalesced request for '{query}' failed: {cause}")]
    Coalesced { query: String, cause: Arc<Error> },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>, field_path: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new().with_field_path(field_path),
        }
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::Upstream {
            message: msg.into(),
            context: ErrorContext::new().with_source("upstream"),
        }
    }

    pub fn storage_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Storage {
            message: msg.into(),
            context,
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Upstream { context, .. }
            | Error::Storage { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Whether this failure came from (or stood in for) the metered upstream,
    /// as opposed to a local policy or storage problem.
    pub fn is_upstream_failure(&self) -> bool {
        match self {
            Error::Upstream { .. } | Error::Timeout { .. } | Error::CircuitOpen { .. } => true,
            Error::Coalesced { cause, .. } => cause.is_upstream_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::configuration("capacity must be positive", "result_cache.max_entries");
        let text = err.to_string();
        assert!(text.contains("capacity must be positive"));
        assert!(text.contains("field: result_cache.max_entries"));
    }

    #[test]
    fn coalesced_error_reports_upstream_cause() {
        let shared = Arc::new(Error::upstream("503 from provider"));
        let err = Error::Coalesced {
            query: "gift".into(),
            cause: shared,
        };
        assert!(err.is_upstream_failure());
        assert!(err.to_string().contains("503 from provider"));
        assert!(err.context().is_none());
    }
}
