//! Search index accessors
//!
//! The core does not index anything. It exposes the indexable fields of a
//! document so an external indexer can pull them.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::document::{Catalog, DocumentId};
use crate::error::Result;

/// Fields offered to the indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    DocumentType,
    MimeType,
    Label,
    Description,
    /// Extracted page text across all versions
    Content,
}

impl SearchField {
    pub const ALL: [SearchField; 5] = [
        SearchField::DocumentType,
        SearchField::MimeType,
        SearchField::Label,
        SearchField::Description,
        SearchField::Content,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SearchField::DocumentType => "document_type",
            SearchField::MimeType => "mime_type",
            SearchField::Label => "label",
            SearchField::Description => "description",
            SearchField::Content => "content",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SearchField::DocumentType => "Document type",
            SearchField::MimeType => "MIME type",
            SearchField::Label => "Label",
            SearchField::Description => "Description",
            SearchField::Content => "Content",
        }
    }
}

/// Indexable values of one document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub document_id: DocumentId,
    pub fields: Vec<(SearchField, String)>,
}

impl SearchRecord {
    pub(crate) fn build(catalog: &Catalog, document_id: DocumentId) -> Result<Self> {
        let document = catalog.document(document_id)?;
        let mut fields = Vec::new();

        if let Ok(document_type) = catalog.document_type(document.document_type_id) {
            fields.push((SearchField::DocumentType, document_type.name.clone()));
        }

        let versions = catalog.versions_of(document_id);
        let mut mime_types: Vec<&str> = versions.iter().map(|v| v.mime_type.as_str()).collect();
        mime_types.sort_unstable();
        mime_types.dedup();
        fields.extend(
            mime_types
                .into_iter()
                .map(|mime| (SearchField::MimeType, mime.to_string())),
        );

        fields.push((SearchField::Label, document.label.clone()));
        if !document.description.is_empty() {
            fields.push((SearchField::Description, document.description.clone()));
        }

        for version in &versions {
            for page in catalog.pages_of(version.id) {
                if let Some(text) = page.content.as_deref().filter(|t| !t.trim().is_empty()) {
                    fields.push((SearchField::Content, text.to_string()));
                }
            }
        }

        Ok(Self { document_id, fields })
    }

    pub fn values(&self, field: SearchField) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(f, _)| *f == field)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// `{ "id": ..., "<field>": [values...] }` with every field present
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.document_id.to_string()));
        for field in SearchField::ALL {
            let values = self
                .values(field)
                .into_iter()
                .map(|v| Value::String(v.to_string()))
                .collect();
            object.insert(field.key().to_string(), Value::Array(values));
        }
        Value::Object(object)
    }
}
