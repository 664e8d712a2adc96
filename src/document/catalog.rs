//! In-memory catalog of every domain entity
//!
//! Page rasters are stored once per content hash and shared between versions
//! that decompose to identical pages. Unreferenced rasters are collected
//! explicitly after deletions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use super::decompose::{DecomposedContent, PageSource};
use super::types::*;
use crate::error::{ConsistencyWarning, CoreError, Entity, Result};
use crate::render::{content_hash, RenderCache, RenderTarget};
use crate::transform::Transformation;

#[derive(Default)]
pub(crate) struct Catalog {
    pub types: HashMap<DocumentTypeId, DocumentType>,
    pub filenames: HashMap<FilenameId, DocumentTypeFilename>,
    pub documents: HashMap<DocumentId, Document>,
    pub versions: HashMap<VersionId, DocumentVersion>,
    pub pages: HashMap<PageId, DocumentPage>,
    pub transformations: HashMap<TransformationId, Transformation>,
    /// Raw content per version
    contents: HashMap<VersionId, Arc<Vec<u8>>>,
    /// Untransformed page rasters by content hash
    sources: HashMap<String, Arc<Vec<u8>>>,
}

impl Catalog {
    pub fn document(&self, id: DocumentId) -> Result<&Document> {
        self.documents
            .get(&id)
            .ok_or_else(|| CoreError::not_found(Entity::Document, id))
    }

    pub fn document_mut(&mut self, id: DocumentId) -> Result<&mut Document> {
        self.documents
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(Entity::Document, id))
    }

    pub fn document_type(&self, id: DocumentTypeId) -> Result<&DocumentType> {
        self.types
            .get(&id)
            .ok_or_else(|| CoreError::not_found(Entity::DocumentType, id))
    }

    pub fn version(&self, id: VersionId) -> Result<&DocumentVersion> {
        self.versions
            .get(&id)
            .ok_or_else(|| CoreError::not_found(Entity::Version, id))
    }

    pub fn page(&self, id: PageId) -> Result<&DocumentPage> {
        self.pages
            .get(&id)
            .ok_or_else(|| CoreError::not_found(Entity::Page, id))
    }

    pub fn transformation(&self, id: TransformationId) -> Result<&Transformation> {
        self.transformations
            .get(&id)
            .ok_or_else(|| CoreError::not_found(Entity::Transformation, id))
    }

    pub fn content(&self, version_id: VersionId) -> Result<Arc<Vec<u8>>> {
        self.contents
            .get(&version_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(Entity::Version, version_id))
    }

    pub fn source(&self, hash: &str) -> Option<Arc<Vec<u8>>> {
        self.sources.get(hash).cloned()
    }

    /// Versions of a document, oldest first
    pub fn versions_of(&self, document_id: DocumentId) -> Vec<&DocumentVersion> {
        let mut versions: Vec<&DocumentVersion> = self
            .versions
            .values()
            .filter(|v| v.document_id == document_id)
            .collect();
        versions.sort_by_key(|v| v.version_number);
        versions
    }

    /// Pages of a version in page order
    pub fn pages_of(&self, version_id: VersionId) -> Vec<&DocumentPage> {
        let mut pages: Vec<&DocumentPage> = self
            .pages
            .values()
            .filter(|p| p.version_id == version_id)
            .collect();
        pages.sort_by_key(|p| p.page_number);
        pages
    }

    pub fn page_by_number(
        &self,
        version_id: VersionId,
        page_number: usize,
    ) -> Result<&DocumentPage> {
        self.pages
            .values()
            .find(|p| p.version_id == version_id && p.page_number == page_number)
            .ok_or_else(|| {
                CoreError::not_found(Entity::Page, format!("{} #{}", version_id, page_number))
            })
    }

    /// Pages of every version of a document
    pub fn page_ids_of_document(&self, document_id: DocumentId) -> Vec<PageId> {
        let versions: HashSet<VersionId> = self
            .versions
            .values()
            .filter(|v| v.document_id == document_id)
            .map(|v| v.id)
            .collect();
        self.pages
            .values()
            .filter(|p| versions.contains(&p.version_id))
            .map(|p| p.id)
            .collect()
    }

    pub fn document_of_page(&self, page_id: PageId) -> Result<DocumentId> {
        let page = self.page(page_id)?;
        Ok(self.version(page.version_id)?.document_id)
    }

    pub fn documents_of_type(&self, type_id: DocumentTypeId) -> Vec<DocumentId> {
        self.documents
            .values()
            .filter(|d| d.document_type_id == type_id)
            .map(|d| d.id)
            .collect()
    }

    /// Transformation stack of a page in application order
    pub fn stack(&self, page_id: PageId) -> Vec<&Transformation> {
        let mut stack: Vec<&Transformation> = self
            .transformations
            .values()
            .filter(|t| t.page_id == page_id)
            .collect();
        stack.sort_by_key(|t| t.order);
        stack
    }

    /// One past the highest order on the page
    pub fn next_order(&self, page_id: PageId) -> u32 {
        self.transformations
            .values()
            .filter(|t| t.page_id == page_id)
            .map(|t| t.order + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn remove_transformations(&mut self, page_id: PageId) -> usize {
        let before = self.transformations.len();
        self.transformations.retain(|_, t| t.page_id != page_id);
        before - self.transformations.len()
    }

    /// Record a decomposed version with all of its pages
    pub fn insert_version(
        &mut self,
        id: VersionId,
        document_id: DocumentId,
        version_number: u32,
        content: Arc<Vec<u8>>,
        decomposed: DecomposedContent,
        comment: String,
    ) -> DocumentVersion {
        let version = DocumentVersion {
            id,
            document_id,
            version_number,
            mime_type: decomposed.mime_type,
            page_count: decomposed.pages.len(),
            checksum: content_hash(&content),
            comment,
            created_at: Utc::now(),
        };

        self.contents.insert(id, content);
        self.versions.insert(id, version.clone());
        for (index, source) in decomposed.pages.into_iter().enumerate() {
            self.insert_page(id, index + 1, source);
        }

        version
    }

    pub fn insert_page(
        &mut self,
        version_id: VersionId,
        page_number: usize,
        source: PageSource,
    ) -> PageId {
        let source_hash = self.intern_source(source.image);
        let page = DocumentPage {
            id: PageId::new(),
            version_id,
            page_number,
            content: source.text,
            source_hash,
        };
        let id = page.id;
        self.pages.insert(id, page);
        id
    }

    /// Store a raster once, returning its content address
    pub fn intern_source(&mut self, image: Vec<u8>) -> String {
        let hash = content_hash(&image);
        self.sources
            .entry(hash.clone())
            .or_insert_with(|| Arc::new(image));
        hash
    }

    /// Remove a page and its transformations
    pub fn remove_page(&mut self, page_id: PageId) -> Option<DocumentPage> {
        let page = self.pages.remove(&page_id)?;
        self.remove_transformations(page_id);
        Some(page)
    }

    /// Remove a document with its versions, pages and transformations
    ///
    /// Returns the removed page ids so the caller can invalidate them.
    pub fn remove_document(&mut self, document_id: DocumentId) -> Result<(Document, Vec<PageId>)> {
        let document = self
            .documents
            .remove(&document_id)
            .ok_or_else(|| CoreError::not_found(Entity::Document, document_id))?;

        let page_ids = self.page_ids_of_document(document_id);
        for page_id in &page_ids {
            self.remove_page(*page_id);
        }

        let version_ids: Vec<VersionId> = self
            .versions_of(document_id)
            .iter()
            .map(|v| v.id)
            .collect();
        for version_id in version_ids {
            self.versions.remove(&version_id);
            self.contents.remove(&version_id);
        }

        self.collect_sources();
        Ok((document, page_ids))
    }

    /// Drop rasters no page references
    pub fn collect_sources(&mut self) -> usize {
        let referenced: HashSet<&str> =
            self.pages.values().map(|p| p.source_hash.as_str()).collect();
        let before = self.sources.len();
        self.sources.retain(|hash, _| referenced.contains(hash.as_str()));
        before - self.sources.len()
    }

    /// Set a version's stored page count from its actual page rows
    pub fn recount(&mut self, version_id: VersionId) -> Result<usize> {
        let actual = self.pages.values().filter(|p| p.version_id == version_id).count();
        let version = self
            .versions
            .get_mut(&version_id)
            .ok_or_else(|| CoreError::not_found(Entity::Version, version_id))?;

        if version.page_count != actual {
            ConsistencyWarning {
                subject: format!("version {}", version_id),
                stored: version.page_count,
                actual,
            }
            .log();
            version.page_count = actual;
        }
        Ok(actual)
    }

    /// Snapshot everything needed to render a page
    ///
    /// Must be called under the catalog lock so the generation and the stack
    /// belong to the same state.
    pub fn render_target(&self, page_id: PageId, cache: &RenderCache) -> Result<RenderTarget> {
        let page = self.page(page_id)?;
        let version = self.version(page.version_id)?;
        let source = self.source(&page.source_hash).ok_or_else(|| {
            CoreError::Render(format!("page source missing for page {}", page_id))
        })?;

        Ok(RenderTarget {
            document_id: version.document_id,
            version_id: version.id,
            page_id,
            source,
            stack: self.stack(page_id).iter().map(|t| t.kind).collect(),
            generation: cache.generation(page_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformationKind;

    fn decomposed(images: &[&[u8]]) -> DecomposedContent {
        DecomposedContent {
            mime_type: "image/png".to_string(),
            pages: images
                .iter()
                .map(|image| PageSource {
                    text: None,
                    image: image.to_vec(),
                })
                .collect(),
        }
    }

    fn catalog_with_version(images: &[&[u8]]) -> (Catalog, DocumentId, VersionId) {
        let mut catalog = Catalog::default();
        let document_id = DocumentId::new();
        let version_id = VersionId::new();
        catalog.documents.insert(
            document_id,
            Document {
                id: document_id,
                label: "scan".to_string(),
                description: String::new(),
                document_type_id: DocumentTypeId::new(),
                created_at: Utc::now(),
                current_version_id: version_id,
            },
        );
        catalog.insert_version(
            version_id,
            document_id,
            1,
            Arc::new(b"raw".to_vec()),
            decomposed(images),
            String::new(),
        );
        (catalog, document_id, version_id)
    }

    #[test]
    fn test_insert_version_creates_ordered_pages() {
        let (catalog, _, version_id) = catalog_with_version(&[b"one", b"two", b"one"]);

        let pages = catalog.pages_of(version_id);
        assert_eq!(pages.iter().map(|p| p.page_number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(catalog.version(version_id).unwrap().page_count, 3);
        // Identical rasters are stored once
        assert_eq!(catalog.sources.len(), 2);
        assert_eq!(pages[0].source_hash, pages[2].source_hash);
    }

    #[test]
    fn test_stack_order_and_next_order() {
        let (mut catalog, _, version_id) = catalog_with_version(&[b"one"]);
        let page_id = catalog.pages_of(version_id)[0].id;
        assert_eq!(catalog.next_order(page_id), 0);

        let entries = [(1, TransformationKind::ZoomIn), (0, TransformationKind::RotateLeft)];
        for (order, kind) in entries {
            let t = Transformation {
                id: TransformationId::new(),
                page_id,
                kind,
                order,
            };
            catalog.transformations.insert(t.id, t);
        }

        let kinds: Vec<_> = catalog.stack(page_id).iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TransformationKind::RotateLeft, TransformationKind::ZoomIn]);
        assert_eq!(catalog.next_order(page_id), 2);
    }

    #[test]
    fn test_remove_document_cascades() {
        let (mut catalog, document_id, version_id) = catalog_with_version(&[b"one", b"two"]);
        let page_id = catalog.pages_of(version_id)[0].id;
        let t = Transformation {
            id: TransformationId::new(),
            page_id,
            kind: TransformationKind::RotateRight,
            order: 0,
        };
        catalog.transformations.insert(t.id, t);

        let (_, removed) = catalog.remove_document(document_id).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(catalog.pages.is_empty());
        assert!(catalog.versions.is_empty());
        assert!(catalog.transformations.is_empty());
        assert!(catalog.sources.is_empty());
        assert!(catalog.content(version_id).is_err());

        assert!(matches!(
            catalog.remove_document(document_id),
            Err(CoreError::NotFound { entity: Entity::Document, .. })
        ));
    }

    #[test]
    fn test_recount_corrects_stored_count() {
        let (mut catalog, _, version_id) = catalog_with_version(&[b"one", b"two"]);
        catalog.versions.get_mut(&version_id).unwrap().page_count = 7;

        assert_eq!(catalog.recount(version_id).unwrap(), 2);
        assert_eq!(catalog.version(version_id).unwrap().page_count, 2);
    }

    #[test]
    fn test_page_by_number() {
        let (catalog, _, version_id) = catalog_with_version(&[b"one", b"two"]);
        assert_eq!(catalog.page_by_number(version_id, 2).unwrap().page_number, 2);
        assert!(catalog.page_by_number(version_id, 3).is_err());
    }
}
