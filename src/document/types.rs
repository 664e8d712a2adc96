//! Core document types
//!
//! Documents own versions, versions own pages. Identifiers are typed UUIDs so
//! a page id can never be passed where a version id is expected.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Document identifier
    DocumentId
);
entity_id!(
    /// Document type identifier
    DocumentTypeId
);
entity_id!(
    /// Document type filename template identifier
    FilenameId
);
entity_id!(
    /// Document version identifier
    VersionId
);
entity_id!(
    /// Document page identifier
    PageId
);
entity_id!(
    /// Page transformation identifier
    TransformationId
);

/// A versioned, paginated document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub label: String,
    pub description: String,
    pub document_type_id: DocumentTypeId,
    pub created_at: DateTime<Utc>,
    /// The single authoritative version for display and download
    pub current_version_id: VersionId,
}

/// Named document classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentType {
    pub id: DocumentTypeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Suggested filename owned by a document type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeFilename {
    pub id: FilenameId,
    pub document_type_id: DocumentTypeId,
    pub filename: String,
    pub enabled: bool,
}

/// What happens to documents when their type is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeletePolicy {
    /// Refuse while any document references the type
    Block,
    /// Move referencing documents to another type first
    Reassign(DocumentTypeId),
}

/// Immutable snapshot of a document's content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub id: VersionId,
    pub document_id: DocumentId,
    /// Monotonically increasing per document, starting at 1
    pub version_number: u32,
    pub mime_type: String,
    pub page_count: usize,
    /// SHA-256 of the raw content
    pub checksum: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub id: PageId,
    pub version_id: VersionId,
    /// 1-based, unique within the version
    pub page_number: usize,
    /// Extracted text, if any
    pub content: Option<String>,
    /// Content address of the untransformed page raster
    pub source_hash: String,
}

/// Page navigation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    First,
    Previous,
    Next,
    Last,
}

impl PageDirection {
    /// Target page number within `1..=page_count`, clamped at the ends
    pub fn target(&self, current: usize, page_count: usize) -> usize {
        let last = page_count.max(1);
        match self {
            PageDirection::First => 1,
            PageDirection::Previous => current.saturating_sub(1).max(1),
            PageDirection::Next => (current + 1).min(last),
            PageDirection::Last => last,
        }
    }
}
