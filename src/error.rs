//! Error types for the Folio core
//!
//! One taxonomy for every component. `ConsistencyWarning` lives here too but
//! is deliberately not a variant: it is logged and corrected, never returned.

use std::fmt;

use thiserror::Error;

/// Core-wide result type
pub type Result<T> = std::result::Result<T, CoreError>;

/// Entity kinds referenced by [`CoreError::NotFound`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Document,
    DocumentType,
    DocumentTypeFilename,
    Version,
    Page,
    Transformation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Document => "document",
            Entity::DocumentType => "document type",
            Entity::DocumentTypeFilename => "document type filename",
            Entity::Version => "document version",
            Entity::Page => "document page",
            Entity::Transformation => "transformation",
        };
        f.write_str(name)
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity is absent
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// Content could not be decomposed into pages
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Unrecognised transformation kind
    #[error("Invalid transformation kind: {0}")]
    InvalidKind(String),

    /// The render pipeline cannot apply this operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Authorization failed
    #[error("Permission denied: {permission} on {resource}")]
    PermissionDenied { permission: String, resource: String },

    /// Document type still referenced by documents
    #[error("Document type {id} is used by {documents} document(s)")]
    DocumentTypeInUse { id: String, documents: usize },

    /// Rendering exceeded its bound
    #[error("Render timed out after {0} seconds")]
    RenderTimeout(u64),

    /// Cache storage unwritable
    #[error("Cache write failure: {0}")]
    CacheWriteFailure(String),

    /// Image decode/encode failure inside the pipeline
    #[error("Render error: {0}")]
    Render(String),

    /// Bundle archive failure
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors retried once with a fresh fingerprint before surfacing
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::RenderTimeout(_) | CoreError::CacheWriteFailure(_)
        )
    }
}

impl From<image::ImageError> for CoreError {
    fn from(err: image::ImageError) -> Self {
        CoreError::Render(err.to_string())
    }
}

impl From<zip::result::ZipError> for CoreError {
    fn from(err: zip::result::ZipError) -> Self {
        CoreError::Archive(err.to_string())
    }
}

/// Recoverable internal mismatch, corrected in place and logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyWarning {
    pub subject: String,
    pub stored: usize,
    pub actual: usize,
}

impl ConsistencyWarning {
    /// Emit the warning through tracing
    pub fn log(&self) {
        tracing::warn!(
            subject = %self.subject,
            stored = self.stored,
            actual = self.actual,
            "Consistency warning: {}",
            self
        );
    }
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} recorded {} but has {}; corrected",
            self.subject, self.stored, self.actual
        )
    }
}
