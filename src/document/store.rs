//! Document and document type lifecycle

use std::sync::Arc;

use chrono::Utc;

use super::types::*;
use crate::access::{Actor, Permission, ResourceRef};
use crate::context::CoreContext;
use crate::error::{CoreError, Entity, Result};
use crate::history::HistoryEventKind;
use crate::search::SearchRecord;

#[derive(Clone)]
pub struct DocumentStore {
    ctx: Arc<CoreContext>,
}

impl DocumentStore {
    pub(crate) fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    // ==================== Document types ====================

    pub async fn create_document_type(&self, actor: &Actor, name: &str) -> Result<DocumentType> {
        self.ctx
            .authorize(actor, Permission::DocumentTypeCreate, ResourceRef::system())
            .await?;

        let document_type = DocumentType {
            id: DocumentTypeId::new(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        };
        self.ctx
            .catalog
            .write()
            .await
            .types
            .insert(document_type.id, document_type.clone());

        tracing::info!(
            type_id = %document_type.id,
            name = %document_type.name,
            "Created document type"
        );
        Ok(document_type)
    }

    pub async fn rename_document_type(
        &self,
        actor: &Actor,
        id: DocumentTypeId,
        name: &str,
    ) -> Result<DocumentType> {
        self.ctx
            .authorize(actor, Permission::DocumentTypeEdit, ResourceRef::of::<DocumentType>(id))
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        let document_type = catalog
            .types
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(Entity::DocumentType, id))?;
        document_type.name = name.trim().to_string();
        Ok(document_type.clone())
    }

    /// Delete a document type
    ///
    /// Returns the number of documents moved to another type.
    pub async fn delete_document_type(
        &self,
        actor: &Actor,
        id: DocumentTypeId,
        policy: TypeDeletePolicy,
    ) -> Result<usize> {
        self.ctx
            .authorize(actor, Permission::DocumentTypeDelete, ResourceRef::of::<DocumentType>(id))
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        catalog.document_type(id)?;
        let users = catalog.documents_of_type(id);

        let reassigned = match policy {
            TypeDeletePolicy::Block if !users.is_empty() => {
                return Err(CoreError::DocumentTypeInUse {
                    id: id.to_string(),
                    documents: users.len(),
                });
            }
            TypeDeletePolicy::Block => 0,
            TypeDeletePolicy::Reassign(target) => {
                if target == id {
                    return Err(CoreError::DocumentTypeInUse {
                        id: id.to_string(),
                        documents: users.len(),
                    });
                }
                catalog.document_type(target)?;
                for document_id in &users {
                    catalog.document_mut(*document_id)?.document_type_id = target;
                }
                users.len()
            }
        };

        catalog.types.remove(&id);
        catalog.filenames.retain(|_, f| f.document_type_id != id);
        drop(catalog);

        tracing::info!(type_id = %id, reassigned = reassigned, "Deleted document type");
        Ok(reassigned)
    }

    pub async fn document_type(&self, id: DocumentTypeId) -> Result<DocumentType> {
        self.ctx.catalog.read().await.document_type(id).cloned()
    }

    /// Every document type, sorted by name
    pub async fn list_document_types(&self) -> Vec<DocumentType> {
        let catalog = self.ctx.catalog.read().await;
        let mut types: Vec<DocumentType> = catalog.types.values().cloned().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    pub async fn add_filename(
        &self,
        actor: &Actor,
        type_id: DocumentTypeId,
        filename: &str,
        enabled: bool,
    ) -> Result<DocumentTypeFilename> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTypeEdit,
                ResourceRef::of::<DocumentType>(type_id),
            )
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        catalog.document_type(type_id)?;
        let entry = DocumentTypeFilename {
            id: FilenameId::new(),
            document_type_id: type_id,
            filename: filename.trim().to_string(),
            enabled,
        };
        catalog.filenames.insert(entry.id, entry.clone());
        Ok(entry)
    }

    pub async fn edit_filename(
        &self,
        actor: &Actor,
        id: FilenameId,
        filename: &str,
        enabled: bool,
    ) -> Result<DocumentTypeFilename> {
        let type_id = self.filename_owner(id).await?;
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTypeEdit,
                ResourceRef::of::<DocumentType>(type_id),
            )
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        let entry = catalog
            .filenames
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(Entity::DocumentTypeFilename, id))?;
        entry.filename = filename.trim().to_string();
        entry.enabled = enabled;
        Ok(entry.clone())
    }

    pub async fn remove_filename(&self, actor: &Actor, id: FilenameId) -> Result<()> {
        let type_id = self.filename_owner(id).await?;
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTypeEdit,
                ResourceRef::of::<DocumentType>(type_id),
            )
            .await?;

        self.ctx
            .catalog
            .write()
            .await
            .filenames
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found(Entity::DocumentTypeFilename, id))
    }

    /// Filename templates of a type, sorted by filename
    pub async fn list_filenames(
        &self,
        type_id: DocumentTypeId,
    ) -> Result<Vec<DocumentTypeFilename>> {
        let catalog = self.ctx.catalog.read().await;
        catalog.document_type(type_id)?;
        let mut filenames: Vec<DocumentTypeFilename> = catalog
            .filenames
            .values()
            .filter(|f| f.document_type_id == type_id)
            .cloned()
            .collect();
        filenames.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(filenames)
    }

    /// Enabled filenames offered when creating a document of this type
    pub async fn suggested_filenames(&self, type_id: DocumentTypeId) -> Result<Vec<String>> {
        Ok(self
            .list_filenames(type_id)
            .await?
            .into_iter()
            .filter(|f| f.enabled)
            .map(|f| f.filename)
            .collect())
    }

    async fn filename_owner(&self, id: FilenameId) -> Result<DocumentTypeId> {
        self.ctx
            .catalog
            .read()
            .await
            .filenames
            .get(&id)
            .map(|f| f.document_type_id)
            .ok_or_else(|| CoreError::not_found(Entity::DocumentTypeFilename, id))
    }

    // ==================== Documents ====================

    /// Create a document with its first version
    pub async fn create_document(
        &self,
        actor: &Actor,
        type_id: DocumentTypeId,
        label: &str,
        description: &str,
        content: Vec<u8>,
    ) -> Result<Document> {
        self.ctx
            .authorize(actor, Permission::DocumentCreate, ResourceRef::of::<DocumentType>(type_id))
            .await?;
        self.ctx.catalog.read().await.document_type(type_id)?;

        let content = Arc::new(content);
        let decomposed = self.ctx.decompose(content.clone()).await?;

        let mut catalog = self.ctx.catalog.write().await;
        catalog.document_type(type_id)?;

        let version_id = VersionId::new();
        let document = Document {
            id: DocumentId::new(),
            label: label.trim().to_string(),
            description: description.to_string(),
            document_type_id: type_id,
            created_at: Utc::now(),
            current_version_id: version_id,
        };
        let version = catalog.insert_version(
            version_id,
            document.id,
            1,
            content,
            decomposed,
            String::new(),
        );
        catalog.documents.insert(document.id, document.clone());
        drop(catalog);

        tracing::info!(
            document_id = %document.id,
            version_id = %version.id,
            pages = version.page_count,
            "Created document"
        );
        self.ctx.emit(HistoryEventKind::DocumentCreated, document.id, actor);
        Ok(document)
    }

    pub async fn edit_document(
        &self,
        actor: &Actor,
        id: DocumentId,
        label: &str,
        description: &str,
    ) -> Result<Document> {
        self.ctx
            .authorize(actor, Permission::DocumentPropertiesEdit, ResourceRef::of::<Document>(id))
            .await?;

        let document = {
            let mut catalog = self.ctx.catalog.write().await;
            let document = catalog.document_mut(id)?;
            document.label = label.trim().to_string();
            document.description = description.to_string();
            document.clone()
        };

        self.ctx.emit(HistoryEventKind::DocumentEdited, id, actor);
        Ok(document)
    }

    pub async fn set_document_type(
        &self,
        actor: &Actor,
        id: DocumentId,
        type_id: DocumentTypeId,
    ) -> Result<Document> {
        self.ctx
            .authorize(actor, Permission::DocumentEdit, ResourceRef::of::<Document>(id))
            .await?;

        let document = {
            let mut catalog = self.ctx.catalog.write().await;
            catalog.document_type(type_id)?;
            let document = catalog.document_mut(id)?;
            document.document_type_id = type_id;
            document.clone()
        };

        self.ctx.emit(HistoryEventKind::DocumentEdited, id, actor);
        Ok(document)
    }

    /// Delete a document and everything it owns
    ///
    /// Catalog removal and cache invalidation happen under one write lock, so
    /// no reader can observe the document without its entries or the reverse.
    pub async fn delete_document(&self, actor: &Actor, id: DocumentId) -> Result<()> {
        self.ctx
            .authorize(actor, Permission::DocumentDelete, ResourceRef::of::<Document>(id))
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        let (document, page_ids) = catalog.remove_document(id)?;
        let invalidated = self.ctx.cache.invalidate_pages(&page_ids).await;
        drop(catalog);

        tracing::info!(
            document_id = %id,
            label = %document.label,
            pages = page_ids.len(),
            cache_entries = invalidated,
            "Deleted document"
        );
        self.ctx.emit(HistoryEventKind::DocumentDeleted, id, actor);
        Ok(())
    }

    /// Correct a version's stored page count from its page rows
    ///
    /// Authorized as a document tool on the owning document.
    pub async fn recompute_page_count(
        &self,
        actor: &Actor,
        version_id: VersionId,
    ) -> Result<usize> {
        let document_id = self.ctx.catalog.read().await.version(version_id)?.document_id;
        self.ctx
            .authorize(actor, Permission::DocumentTools, ResourceRef::of::<Document>(document_id))
            .await?;

        self.ctx.catalog.write().await.recount(version_id)
    }

    /// Re-decompose the current version and reconcile its pages
    ///
    /// Missing pages are added, pages past the new end are removed with
    /// their transformations, pages whose source changed are updated. Every
    /// touched page is invalidated.
    pub async fn update_page_count(&self, actor: &Actor, document_id: DocumentId) -> Result<usize> {
        self.ctx
            .authorize(actor, Permission::DocumentTools, ResourceRef::of::<Document>(document_id))
            .await?;

        let (version_id, content) = {
            let catalog = self.ctx.catalog.read().await;
            let version_id = catalog.document(document_id)?.current_version_id;
            (version_id, catalog.content(version_id)?)
        };
        let decomposed = self.ctx.decompose(content).await?;

        let mut catalog = self.ctx.catalog.write().await;
        catalog.version(version_id)?;

        let existing: Vec<(PageId, usize, String)> = catalog
            .pages_of(version_id)
            .iter()
            .map(|p| (p.id, p.page_number, p.source_hash.clone()))
            .collect();
        let mut touched = Vec::new();

        let extra = existing
            .iter()
            .filter(|(_, n, _)| *n > decomposed.page_count());
        for (page_id, page_number, _) in extra {
            tracing::debug!(page_id = %page_id, page_number = page_number, "Removing page");
            catalog.remove_page(*page_id);
            touched.push(*page_id);
        }

        for (index, source) in decomposed.pages.into_iter().enumerate() {
            let page_number = index + 1;
            match existing.iter().find(|(_, n, _)| *n == page_number) {
                None => {
                    catalog.insert_page(version_id, page_number, source);
                }
                Some((page_id, _, hash)) => {
                    let new_hash = catalog.intern_source(source.image);
                    let changed = &new_hash != hash;
                    if let Some(page) = catalog.pages.get_mut(page_id) {
                        page.content = source.text;
                        if changed {
                            page.source_hash = new_hash;
                        }
                    }
                    if changed {
                        touched.push(*page_id);
                    }
                }
            }
        }

        catalog.collect_sources();
        self.ctx.cache.invalidate_pages(&touched).await;
        let count = catalog.recount(version_id)?;
        drop(catalog);

        tracing::info!(
            document_id = %document_id,
            version_id = %version_id,
            pages = count,
            "Updated page count"
        );
        Ok(count)
    }

    // ==================== Reads ====================

    pub async fn document(&self, id: DocumentId) -> Result<Document> {
        self.ctx.catalog.read().await.document(id).cloned()
    }

    /// Every document, newest first
    pub async fn list_documents(&self) -> Vec<Document> {
        let catalog = self.ctx.catalog.read().await;
        let mut documents: Vec<Document> = catalog.documents.values().cloned().collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        documents
    }

    pub async fn version(&self, id: VersionId) -> Result<DocumentVersion> {
        self.ctx.catalog.read().await.version(id).cloned()
    }

    /// Version history of a document, oldest first
    pub async fn versions(&self, document_id: DocumentId) -> Result<Vec<DocumentVersion>> {
        let catalog = self.ctx.catalog.read().await;
        catalog.document(document_id)?;
        Ok(catalog.versions_of(document_id).into_iter().cloned().collect())
    }

    pub async fn page(&self, id: PageId) -> Result<DocumentPage> {
        self.ctx.catalog.read().await.page(id).cloned()
    }

    pub async fn pages(&self, version_id: VersionId) -> Result<Vec<DocumentPage>> {
        let catalog = self.ctx.catalog.read().await;
        catalog.version(version_id)?;
        Ok(catalog.pages_of(version_id).into_iter().cloned().collect())
    }

    pub async fn page_by_number(
        &self,
        version_id: VersionId,
        page_number: usize,
    ) -> Result<DocumentPage> {
        self.ctx
            .catalog
            .read()
            .await
            .page_by_number(version_id, page_number)
            .cloned()
    }

    /// Sibling page in the same version
    pub async fn navigate(
        &self,
        actor: &Actor,
        page_id: PageId,
        direction: PageDirection,
    ) -> Result<DocumentPage> {
        self.ctx
            .authorize(actor, Permission::DocumentView, ResourceRef::of::<DocumentPage>(page_id))
            .await?;

        let catalog = self.ctx.catalog.read().await;
        let page = catalog.page(page_id)?;
        let page_count = catalog.version(page.version_id)?.page_count;
        let target = direction.target(page.page_number, page_count);
        catalog.page_by_number(page.version_id, target).cloned()
    }

    /// Extracted text of a page; empty when none was extracted
    pub async fn page_text(&self, page_id: PageId) -> Result<String> {
        let catalog = self.ctx.catalog.read().await;
        Ok(catalog.page(page_id)?.content.clone().unwrap_or_default())
    }

    /// Indexable fields of a document
    pub async fn search_record(&self, document_id: DocumentId) -> Result<SearchRecord> {
        SearchRecord::build(&*self.ctx.catalog.read().await, document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessControlList, Permission};
    use crate::context::fixtures::{pages, png, Fixture};
    use crate::history::HistoryEventKind;
    use crate::document::{ContentDecomposer, DecomposedContent, RasterDecomposer};
    use crate::render::RenderTarget;

    async fn setup(fixture: &Fixture) -> (DocumentStore, DocumentType) {
        let store = DocumentStore::new(fixture.ctx.clone());
        let document_type = store
            .create_document_type(&Actor::system(), "Invoice")
            .await
            .unwrap();
        (store, document_type)
    }

    async fn target(fixture: &Fixture, page_id: PageId) -> RenderTarget {
        fixture
            .ctx
            .catalog
            .read()
            .await
            .render_target(page_id, &fixture.ctx.cache)
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_document() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::new("alice");

        let document = store
            .create_document(&actor, doc_type.id, " scan ", "first", pages(3, 10))
            .await
            .unwrap();
        assert_eq!(document.label, "scan");

        let versions = store.versions(document.id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[0].page_count, 3);
        assert_eq!(versions[0].id, document.current_version_id);
        assert_eq!(store.pages(versions[0].id).await.unwrap().len(), 3);

        let events = fixture.history.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, HistoryEventKind::DocumentCreated);
        assert_eq!(events[0].actor, "alice");
    }

    #[tokio::test]
    async fn test_create_document_rejects_invalid_content() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;

        let result = store
            .create_document(&Actor::system(), doc_type.id, "bad", "", b"not an image".to_vec())
            .await;
        assert!(matches!(result, Err(CoreError::InvalidContent(_))));
        assert!(store.list_documents().await.is_empty());
        assert!(fixture.history.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_document_requires_type() {
        let fixture = Fixture::new();
        let store = DocumentStore::new(fixture.ctx.clone());

        let result = store
            .create_document(&Actor::system(), DocumentTypeId::new(), "doc", "", png(2, 2, 0))
            .await;
        assert!(matches!(result, Err(CoreError::NotFound { entity: Entity::DocumentType, .. })));
    }

    #[tokio::test]
    async fn test_delete_document_cascades_to_cache() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::system();
        let document = store
            .create_document(&actor, doc_type.id, "doc", "", pages(2, 10))
            .await
            .unwrap();

        let page = store.page_by_number(document.current_version_id, 1).await.unwrap();
        fixture.ctx.cache.get(&target(&fixture, page.id).await).await.unwrap();
        assert_eq!(fixture.ctx.cache.entries_for_document(document.id).len(), 1);

        store.delete_document(&actor, document.id).await.unwrap();

        assert!(fixture.ctx.cache.entries_for_document(document.id).is_empty());
        assert!(matches!(
            store.document(document.id).await,
            Err(CoreError::NotFound { entity: Entity::Document, .. })
        ));
        assert!(store.page(page.id).await.is_err());
        assert!(matches!(
            store.delete_document(&actor, document.id).await,
            Err(CoreError::NotFound { .. })
        ));
        assert_eq!(
            fixture.history.kinds(),
            vec![HistoryEventKind::DocumentCreated, HistoryEventKind::DocumentDeleted]
        );
    }

    #[tokio::test]
    async fn test_denied_delete_mutates_nothing() {
        let acl = Arc::new(AccessControlList::new());
        let admin = Actor::new("admin");
        acl.add_superuser(&admin);
        let fixture = Fixture::with_gate(acl.clone());
        let store = DocumentStore::new(fixture.ctx.clone());

        let doc_type = store.create_document_type(&admin, "Memo").await.unwrap();
        let document = store
            .create_document(&admin, doc_type.id, "doc", "", png(2, 2, 1))
            .await
            .unwrap();

        let guest = Actor::new("guest");
        acl.grant(&guest, Permission::DocumentView);
        let result = store.delete_document(&guest, document.id).await;

        assert!(matches!(result, Err(CoreError::PermissionDenied { .. })));
        assert!(store.document(document.id).await.is_ok());
        assert_eq!(fixture.history.kinds(), vec![HistoryEventKind::DocumentCreated]);
    }

    #[tokio::test]
    async fn test_recompute_page_count_corrects_drift() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let document = store
            .create_document(&Actor::system(), doc_type.id, "doc", "", pages(3, 10))
            .await
            .unwrap();
        let version_id = document.current_version_id;

        fixture
            .ctx
            .catalog
            .write()
            .await
            .versions
            .get_mut(&version_id)
            .unwrap()
            .page_count = 9;

        let actor = Actor::system();
        assert_eq!(store.recompute_page_count(&actor, version_id).await.unwrap(), 3);
        assert_eq!(store.version(version_id).await.unwrap().page_count, 3);
        assert!(matches!(
            store.recompute_page_count(&actor, VersionId::new()).await,
            Err(CoreError::NotFound { entity: Entity::Version, .. })
        ));
    }

    #[tokio::test]
    async fn test_recompute_page_count_requires_tools_permission() {
        let acl = Arc::new(AccessControlList::new());
        let fixture = Fixture::with_gate(acl.clone());
        let store = DocumentStore::new(fixture.ctx.clone());
        let admin = Actor::new("admin");
        acl.add_superuser(&admin);

        let doc_type = store.create_document_type(&admin, "Scan").await.unwrap();
        let document = store
            .create_document(&admin, doc_type.id, "doc", "", pages(2, 10))
            .await
            .unwrap();
        let version_id = document.current_version_id;
        fixture
            .ctx
            .catalog
            .write()
            .await
            .versions
            .get_mut(&version_id)
            .unwrap()
            .page_count = 5;

        let clerk = Actor::new("clerk");
        acl.grant(&clerk, Permission::DocumentView);
        let denied = store.recompute_page_count(&clerk, version_id).await;
        assert!(matches!(denied, Err(CoreError::PermissionDenied { .. })));
        assert_eq!(store.version(version_id).await.unwrap().page_count, 5);

        acl.grant(&clerk, Permission::DocumentTools);
        assert_eq!(store.recompute_page_count(&clerk, version_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_page_count_restores_missing_pages() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::system();
        let document = store
            .create_document(&actor, doc_type.id, "doc", "", pages(3, 10))
            .await
            .unwrap();
        let version_id = document.current_version_id;

        let third = store.page_by_number(version_id, 3).await.unwrap();
        fixture.ctx.catalog.write().await.remove_page(third.id);

        assert_eq!(store.update_page_count(&actor, document.id).await.unwrap(), 3);
        let numbers: Vec<usize> = store
            .pages(version_id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.page_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.version(version_id).await.unwrap().page_count, 3);
    }

    /// Raster pages with a caption that changes between calls
    struct CaptionedDecomposer {
        caption: parking_lot::Mutex<String>,
    }

    impl ContentDecomposer for CaptionedDecomposer {
        fn decompose(&self, content: &[u8]) -> Result<DecomposedContent> {
            let mut decomposed = RasterDecomposer.decompose(content)?;
            let caption = self.caption.lock().clone();
            for page in &mut decomposed.pages {
                page.text = Some(caption.clone());
            }
            Ok(decomposed)
        }
    }

    #[tokio::test]
    async fn test_update_page_count_refreshes_unchanged_page_text() {
        let decomposer = Arc::new(CaptionedDecomposer {
            caption: parking_lot::Mutex::new("draft".to_string()),
        });
        let fixture = Fixture::with_decomposer(decomposer.clone());
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::system();
        let document = store
            .create_document(&actor, doc_type.id, "doc", "", pages(2, 10))
            .await
            .unwrap();
        let first = store.page_by_number(document.current_version_id, 1).await.unwrap();
        assert_eq!(store.page_text(first.id).await.unwrap(), "draft");

        let registry = crate::transform::TransformationRegistry::new(fixture.ctx.clone());
        registry.create(&actor, first.id, "zoom-in").await.unwrap();
        let target = fixture
            .ctx
            .catalog
            .read()
            .await
            .render_target(first.id, &fixture.ctx.cache)
            .unwrap();
        fixture.ctx.cache.get(&target).await.unwrap();

        *decomposer.caption.lock() = "final".to_string();
        assert_eq!(store.update_page_count(&actor, document.id).await.unwrap(), 2);

        let refreshed = store.page(first.id).await.unwrap();
        assert_eq!(refreshed.source_hash, first.source_hash);
        assert_eq!(store.page_text(first.id).await.unwrap(), "final");
        // Same raster, so the cached render stays valid
        assert!(fixture.ctx.cache.contains(&target.fingerprint()));
    }

    #[tokio::test]
    async fn test_navigate_clamps() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::system();
        let document = store
            .create_document(&actor, doc_type.id, "doc", "", pages(3, 10))
            .await
            .unwrap();
        let first = store.page_by_number(document.current_version_id, 1).await.unwrap();

        let previous = store.navigate(&actor, first.id, PageDirection::Previous).await.unwrap();
        assert_eq!(previous.page_number, 1);
        let next = store.navigate(&actor, first.id, PageDirection::Next).await.unwrap();
        assert_eq!(next.page_number, 2);
        let last = store.navigate(&actor, next.id, PageDirection::Last).await.unwrap();
        assert_eq!(last.page_number, 3);
        let beyond = store.navigate(&actor, last.id, PageDirection::Next).await.unwrap();
        assert_eq!(beyond.id, last.id);
    }

    #[tokio::test]
    async fn test_edit_and_retype_document() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::system();
        let document = store
            .create_document(&actor, doc_type.id, "doc", "", png(2, 2, 0))
            .await
            .unwrap();

        let edited = store
            .edit_document(&actor, document.id, "renamed", "notes")
            .await
            .unwrap();
        assert_eq!((edited.label.as_str(), edited.description.as_str()), ("renamed", "notes"));

        let other = store.create_document_type(&actor, "Receipt").await.unwrap();
        let retyped = store.set_document_type(&actor, document.id, other.id).await.unwrap();
        assert_eq!(retyped.document_type_id, other.id);

        assert_eq!(
            fixture.history.kinds(),
            vec![
                HistoryEventKind::DocumentCreated,
                HistoryEventKind::DocumentEdited,
                HistoryEventKind::DocumentEdited
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_document_type_policies() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::system();
        let document = store
            .create_document(&actor, doc_type.id, "doc", "", png(2, 2, 0))
            .await
            .unwrap();
        store.add_filename(&actor, doc_type.id, "invoice.png", true).await.unwrap();

        let blocked = store
            .delete_document_type(&actor, doc_type.id, TypeDeletePolicy::Block)
            .await;
        assert!(matches!(blocked, Err(CoreError::DocumentTypeInUse { documents: 1, .. })));

        let other = store.create_document_type(&actor, "Archive").await.unwrap();
        let moved = store
            .delete_document_type(&actor, doc_type.id, TypeDeletePolicy::Reassign(other.id))
            .await
            .unwrap();
        assert_eq!(moved, 1);
        assert_eq!(store.document(document.id).await.unwrap().document_type_id, other.id);
        assert!(store.document_type(doc_type.id).await.is_err());
        assert!(fixture.ctx.catalog.read().await.filenames.is_empty());
    }

    #[tokio::test]
    async fn test_suggested_filenames_only_enabled() {
        let fixture = Fixture::new();
        let (store, doc_type) = setup(&fixture).await;
        let actor = Actor::system();

        store.add_filename(&actor, doc_type.id, "b.png", true).await.unwrap();
        let disabled = store.add_filename(&actor, doc_type.id, "a.png", true).await.unwrap();
        store.edit_filename(&actor, disabled.id, "a.png", false).await.unwrap();

        assert_eq!(store.list_filenames(doc_type.id).await.unwrap().len(), 2);
        assert_eq!(store.suggested_filenames(doc_type.id).await.unwrap(), vec!["b.png"]);

        store.remove_filename(&actor, disabled.id).await.unwrap();
        assert!(store.remove_filename(&actor, disabled.id).await.is_err());
    }
}
