//! Error types for the contentgraph-core crate.
//!
//! One unified error type across parsing, loading and propagation, with
//! optional file context and source chaining. Store failures additionally
//! classify as transient or permanent so the loader can decide what to retry.

use std::fmt;

/// Error kind categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// One artifact file is malformed
    Parse,
    /// A pack failed as a whole (wraps artifact errors)
    Pack,
    /// A record violated a schema constraint at commit time
    Schema,
    /// Backing store rejected an operation
    Store,
    /// Backing store temporarily unavailable (lock contention, connectivity)
    Unavailable,
    /// Configuration errors
    Config,
    /// IO errors
    Io,
    /// Internal errors (bugs)
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Pack => "pack",
            ErrorKind::Schema => "schema",
            ErrorKind::Store => "store",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retry classification for store-facing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retry with backoff (lock contention, transient connectivity)
    Transient,
    /// Don't retry (malformed input, constraint violation, bug)
    Permanent,
}

/// Unified error type
#[derive(Debug)]
pub struct GraphError {
    pub kind: ErrorKind,
    pub message: String,
    pub file_path: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GraphError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_path: None,
            source: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn pack(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Pack, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Retry classification of this error.
    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            ErrorKind::Unavailable => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let Some(ref file) = self.file_path {
            write!(f, " in {}", file)?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for GraphError {
    fn from(err: std::io::Error) -> Self {
        GraphError::new(ErrorKind::Io, format!("IO error: {}", err)).with_source(err)
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::parse(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<serde_yaml::Error> for GraphError {
    fn from(err: serde_yaml::Error) -> Self {
        GraphError::parse(format!("YAML error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GraphError>;

/// Aggregate of the artifact errors collected while parsing one pack.
///
/// The build driver decides policy: in strict mode the first `PackError`
/// aborts the build; in lenient mode it is surfaced in the build report and
/// the remaining packs (and artifacts) proceed.
#[derive(Debug, thiserror::Error)]
#[error("pack {pack_id}: {} artifact error(s)", .errors.len())]
pub struct PackError {
    pub pack_id: String,
    pub errors: Vec<GraphError>,
}

impl PackError {
    pub fn new(pack_id: impl Into<String>, errors: Vec<GraphError>) -> Self {
        Self {
            pack_id: pack_id.into(),
            errors,
        }
    }

    pub fn single(pack_id: impl Into<String>, error: GraphError) -> Self {
        Self::new(pack_id, vec![error])
    }

    /// Collapse into a `GraphError` of kind `Pack`, keeping the first
    /// underlying cause as the source.
    pub fn into_graph_error(mut self) -> GraphError {
        let detail = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let mut err = GraphError::pack(format!("pack {} failed: {}", self.pack_id, detail));
        if let Some(first) = self.errors.drain(..).next() {
            err = err.with_source(first);
        }
        err
    }
}
