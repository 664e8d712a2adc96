//! Application state management

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;

use crate::access::{Actor, AllowAll, Permission, PermissionGate, ResourceRef};
use crate::actions::{Action, ActionOutcome, ActionTable};
use crate::config::ResolvedConfig;
use crate::context::CoreContext;
use crate::document::{
    Catalog, ContentDecomposer, DocumentStore, RasterDecomposer, VersionManager,
};
use crate::error::Result;
use crate::history::{HistoryLog, TracingHistoryLog};
use crate::render::{ImagePipeline, RenderCache, RenderPipeline};
use crate::transform::TransformationRegistry;
use crate::viewer::PageViewer;

/// External collaborators plugged into the core
pub struct Collaborators {
    pub gate: Arc<dyn PermissionGate>,
    pub history: Arc<dyn HistoryLog>,
    pub decomposer: Arc<dyn ContentDecomposer>,
    /// `None` uses the raster pipeline configured from the render settings
    pub pipeline: Option<Arc<dyn RenderPipeline>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            gate: Arc::new(AllowAll),
            history: Arc::new(TracingHistoryLog),
            decomposer: Arc::new(RasterDecomposer),
            pipeline: None,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ResolvedConfig,
    ctx: Arc<CoreContext>,
    documents: DocumentStore,
    versions: VersionManager,
    transformations: TransformationRegistry,
    viewer: PageViewer,
    actions: ActionTable,
}

impl AppState {
    /// Create state with the default collaborators
    pub fn new(config: ResolvedConfig) -> Self {
        Self::with_collaborators(config, Collaborators::default())
    }

    pub fn with_collaborators(config: ResolvedConfig, collaborators: Collaborators) -> Self {
        let pipeline = collaborators
            .pipeline
            .unwrap_or_else(|| Arc::new(ImagePipeline::new(config.render)));

        let cache = RenderCache::new(
            config.cache_path.clone(),
            pipeline,
            config.cache_max_entries,
            config.render.timeout(),
        );

        let ctx = Arc::new(CoreContext {
            catalog: RwLock::new(Catalog::default()),
            cache,
            gate: collaborators.gate,
            history: collaborators.history,
            decomposer: collaborators.decomposer,
        });

        tracing::info!(
            cache_path = %config.cache_path.display(),
            cache_fallback = config.cache_fallback,
            max_entries = config.cache_max_entries,
            "Application state initialized"
        );

        Self {
            inner: Arc::new(AppStateInner {
                documents: DocumentStore::new(ctx.clone()),
                versions: VersionManager::new(ctx.clone()),
                transformations: TransformationRegistry::new(ctx.clone()),
                viewer: PageViewer::new(ctx.clone()),
                actions: ActionTable::build(),
                config,
                ctx,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ResolvedConfig {
        &self.inner.config
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.inner.documents
    }

    pub fn versions(&self) -> &VersionManager {
        &self.inner.versions
    }

    pub fn transformations(&self) -> &TransformationRegistry {
        &self.inner.transformations
    }

    pub fn viewer(&self) -> &PageViewer {
        &self.inner.viewer
    }

    /// Get the render cache
    pub fn cache(&self) -> &RenderCache {
        &self.inner.ctx.cache
    }

    /// Get the action routing table
    pub fn actions(&self) -> &ActionTable {
        &self.inner.actions
    }

    /// Drop every rendered page
    pub async fn clear_image_cache(&self, actor: &Actor) -> Result<usize> {
        self.inner
            .ctx
            .authorize(actor, Permission::DocumentTools, ResourceRef::system())
            .await?;
        Ok(self.inner.ctx.cache.clear().await)
    }

    /// Interpret one action
    pub async fn dispatch(&self, actor: &Actor, action: Action) -> Result<ActionOutcome> {
        tracing::debug!(actor = %actor.id, action = ?action, "Dispatching action");

        let documents = self.documents();
        let versions = self.versions();
        let transformations = self.transformations();

        let outcome = match action {
            Action::Transform { page_id, kind } => {
                ActionOutcome::Transformation(transformations.append(actor, page_id, kind).await?)
            }
            Action::Navigate { page_id, direction } => {
                ActionOutcome::Page(documents.navigate(actor, page_id, direction).await?)
            }
            Action::ClearPageTransformations { page_id } => {
                ActionOutcome::Cleared(transformations.clear(actor, page_id).await?)
            }
            Action::ClearDocumentTransformations { document_id } => {
                ActionOutcome::Cleared(transformations.clear_document(actor, document_id).await?)
            }
            Action::UpdatePageCount { document_id } => {
                ActionOutcome::PageCount(documents.update_page_count(actor, document_id).await?)
            }
            Action::EditDocument {
                document_id,
                label,
                description,
            } => ActionOutcome::Document(
                documents
                    .edit_document(actor, document_id, &label, &description)
                    .await?,
            ),
            Action::SetDocumentType {
                document_id,
                document_type_id,
            } => ActionOutcome::Document(
                documents
                    .set_document_type(actor, document_id, document_type_id)
                    .await?,
            ),
            Action::DeleteDocument { document_id } => {
                documents.delete_document(actor, document_id).await?;
                ActionOutcome::Deleted(document_id)
            }
            Action::RevertVersion {
                document_id,
                version_id,
            } => ActionOutcome::Reverted(versions.revert(actor, document_id, version_id).await?),
            Action::DownloadVersion { version_id } => {
                ActionOutcome::Download(versions.download(actor, version_id).await?)
            }
            Action::DownloadBundle { version_ids } => {
                ActionOutcome::Bundle(versions.download_bundle(actor, &version_ids).await?)
            }
            Action::ClearImageCache => {
                ActionOutcome::CacheCleared(self.clear_image_cache(actor).await?)
            }
        };

        Ok(outcome)
    }

    /// Interpret a multi-item selection; each action succeeds or fails alone
    pub async fn dispatch_many(
        &self,
        actor: &Actor,
        actions: Vec<Action>,
    ) -> Vec<Result<ActionOutcome>> {
        join_all(actions.into_iter().map(|action| self.dispatch(actor, action))).await
    }

    /// Remove cache files no index entry references
    pub async fn purge_orphaned_files(&self) -> usize {
        self.inner.ctx.cache.purge_orphaned_files().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessControlList, ResourceKind};
    use crate::actions::{ActionInput, ActionKind, ActionTarget, MenuContext};
    use crate::context::fixtures::pages;
    use crate::document::{Document, PageId, DOWNLOAD_CHUNK_SIZE};
    use crate::error::{CoreError, Entity};
    use crate::history::{HistoryEventKind, MemoryHistoryLog};
    use crate::render::Fingerprint;
    use crate::transform::TransformationKind;
    use futures::StreamExt;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> AppState {
        AppState::new(ResolvedConfig::with_cache_path(dir.path()))
    }

    async fn document(state: &AppState, count: u8) -> Document {
        let actor = Actor::system();
        let doc_type = state
            .documents()
            .create_document_type(&actor, "Scan")
            .await
            .unwrap();
        state
            .documents()
            .create_document(&actor, doc_type.id, "scan", "", pages(count, 10))
            .await
            .unwrap()
    }

    async fn page(state: &AppState, document: &Document, number: usize) -> PageId {
        let version_id = state
            .versions()
            .current_version(document.id)
            .await
            .unwrap()
            .id;
        state.documents().page_by_number(version_id, number).await.unwrap().id
    }

    #[tokio::test]
    async fn test_version_transform_and_clear_scenario() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let actor = Actor::system();

        // V1 has three pages, V2 five
        let document = document(&state, 3).await;
        let v1 = document.current_version_id;
        let v2 = state
            .versions()
            .create_version(&actor, document.id, pages(5, 40), "")
            .await
            .unwrap();
        assert!(!state.viewer().view(&actor, document.id, 5).await.unwrap().cache_hit);

        // Back to V1: page 5 no longer exists
        state.versions().revert(&actor, document.id, v1).await.unwrap();
        assert!(matches!(
            state.viewer().view(&actor, document.id, 5).await,
            Err(CoreError::NotFound { entity: Entity::Page, .. })
        ));

        // Rotate right then zoom in on page 2
        let page_id = page(&state, &document, 2).await;
        for kind in [TransformationKind::RotateRight, TransformationKind::ZoomIn] {
            state
                .dispatch(&actor, Action::Transform { page_id, kind })
                .await
                .unwrap();
        }
        let rendered = state.viewer().view(&actor, document.id, 2).await.unwrap();
        assert_eq!((rendered.width, rendered.height), (3, 6));
        assert_eq!(
            rendered.fingerprint,
            Fingerprint::compute(
                v1,
                page_id,
                &[TransformationKind::RotateRight, TransformationKind::ZoomIn]
            )
        );
        assert!(state.viewer().view(&actor, document.id, 2).await.unwrap().cache_hit);

        // Clearing transformations makes the next view a miss of the plain page
        state
            .dispatch(&actor, Action::ClearPageTransformations { page_id })
            .await
            .unwrap();
        assert!(!state.cache().contains(&rendered.fingerprint));
        let plain = state.viewer().view(&actor, document.id, 2).await.unwrap();
        assert!(!plain.cache_hit);
        assert_eq!((plain.width, plain.height), (4, 2));

        // V2's history is untouched
        assert_eq!(state.documents().version(v2.id).await.unwrap().page_count, 5);
    }

    #[tokio::test]
    async fn test_dispatch_delete_removes_cache_entries() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let actor = Actor::system();
        let document = document(&state, 2).await;

        state.viewer().view(&actor, document.id, 1).await.unwrap();
        state.viewer().view(&actor, document.id, 2).await.unwrap();
        assert_eq!(state.cache().entries_for_document(document.id).len(), 2);

        let outcome = state
            .dispatch(&actor, Action::DeleteDocument { document_id: document.id })
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Deleted(id) if id == document.id));
        assert!(state.cache().is_empty());
        assert!(matches!(
            state.viewer().view(&actor, document.id, 1).await,
            Err(CoreError::NotFound { entity: Entity::Document, .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_bound_toolbar_actions() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let actor = Actor::system();
        let document = document(&state, 3).await;
        let first = page(&state, &document, 1).await;

        let toolbar = state.actions().actions(ResourceKind::DocumentPage, MenuContext::PageView);
        let next = toolbar
            .iter()
            .find(|d| d.kind == ActionKind::NextPage)
            .and_then(|d| d.kind.bind(ActionTarget::Page(first)))
            .unwrap();

        match state.dispatch(&actor, next).await.unwrap() {
            ActionOutcome::Page(page) => assert_eq!(page.page_number, 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_many_reports_each_result() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let actor = Actor::system();
        let a = document(&state, 1).await;
        let b = document(&state, 2).await;

        let results = state
            .dispatch_many(
                &actor,
                vec![
                    Action::UpdatePageCount { document_id: a.id },
                    Action::UpdatePageCount { document_id: b.id },
                    Action::UpdatePageCount {
                        document_id: crate::document::DocumentId::new(),
                    },
                ],
            )
            .await;

        assert!(matches!(results[0], Ok(ActionOutcome::PageCount(1))));
        assert!(matches!(results[1], Ok(ActionOutcome::PageCount(2))));
        assert!(matches!(results[2], Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_dispatch_edit_and_retype_from_menus() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let actor = Actor::system();
        let a = document(&state, 1).await;
        let b = document(&state, 1).await;
        let invoices = state
            .documents()
            .create_document_type(&actor, "Invoice")
            .await
            .unwrap();

        let edit = state
            .actions()
            .find(ResourceKind::Document, MenuContext::Object, ActionKind::EditProperties)
            .and_then(|d| {
                d.kind.bind_with(
                    ActionTarget::Document(a.id),
                    ActionInput::Properties {
                        label: "March invoice".to_string(),
                        description: "Paid".to_string(),
                    },
                )
            })
            .unwrap();
        match state.dispatch(&actor, edit).await.unwrap() {
            ActionOutcome::Document(document) => {
                assert_eq!(document.label, "March invoice");
                assert_eq!(document.description, "Paid");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let retype = state
            .actions()
            .find(ResourceKind::Document, MenuContext::MultiItem, ActionKind::ChangeDocumentType)
            .unwrap();
        let selection: Vec<Action> = [a.id, b.id]
            .into_iter()
            .filter_map(|id| {
                retype
                    .kind
                    .bind_with(ActionTarget::Document(id), ActionInput::DocumentType(invoices.id))
            })
            .collect();
        let results = state.dispatch_many(&actor, selection).await;
        assert!(results.iter().all(|r| matches!(r, Ok(ActionOutcome::Document(_)))));

        for id in [a.id, b.id] {
            let document = state.documents().document(id).await.unwrap();
            assert_eq!(document.document_type_id, invoices.id);
        }
    }

    #[tokio::test]
    async fn test_dispatch_set_unknown_type_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let document = document(&state, 1).await;

        let result = state
            .dispatch(
                &Actor::system(),
                Action::SetDocumentType {
                    document_id: document.id,
                    document_type_id: crate::document::DocumentTypeId::new(),
                },
            )
            .await;
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
        let unchanged = state.documents().document(document.id).await.unwrap();
        assert_eq!(unchanged.document_type_id, document.document_type_id);
    }

    #[tokio::test]
    async fn test_dispatch_multi_version_download_bundles() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let actor = Actor::system();
        let document = document(&state, 2).await;
        let v2 = state
            .versions()
            .create_version(&actor, document.id, pages(1, 90), "")
            .await
            .unwrap();

        let targets = [document.current_version_id, v2.id].map(|version_id| {
            ActionTarget::Version {
                document_id: document.id,
                version_id,
            }
        });
        let download = state
            .actions()
            .find(ResourceKind::DocumentVersion, MenuContext::MultiItem, ActionKind::DownloadBundle)
            .and_then(|d| d.kind.bind_selection(&targets))
            .unwrap();

        let ActionOutcome::Bundle(bundle) = state.dispatch(&actor, download).await.unwrap() else {
            panic!("expected a bundle");
        };
        let mut archive = zip::ZipArchive::new(Cursor::new(bundle)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut data = Vec::new();
        archive
            .by_name("scan-v2.gif")
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, pages(1, 90));
    }

    #[tokio::test]
    async fn test_download_action_streams_content() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let actor = Actor::system();
        let document = document(&state, 2).await;

        let outcome = state
            .dispatch(
                &actor,
                Action::DownloadVersion {
                    version_id: document.current_version_id,
                },
            )
            .await
            .unwrap();
        let ActionOutcome::Download(download) = outcome else {
            panic!("expected a download");
        };
        assert_eq!(download.mime_type, "image/gif");
        assert_eq!(download.filename, "scan.gif");

        let expected = pages(2, 10);
        let chunks: Vec<Vec<u8>> = download
            .into_stream(DOWNLOAD_CHUNK_SIZE)
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), expected);
    }

    #[tokio::test]
    async fn test_clear_image_cache_requires_tools_permission() {
        let dir = TempDir::new().unwrap();
        let acl = Arc::new(AccessControlList::new());
        let history = Arc::new(MemoryHistoryLog::new());
        let state = AppState::with_collaborators(
            ResolvedConfig::with_cache_path(dir.path()),
            Collaborators {
                gate: acl.clone(),
                history: history.clone(),
                ..Collaborators::default()
            },
        );
        let admin = Actor::new("admin");
        acl.add_superuser(&admin);

        let doc_type = state.documents().create_document_type(&admin, "Scan").await.unwrap();
        let document = state
            .documents()
            .create_document(&admin, doc_type.id, "scan", "", pages(1, 0))
            .await
            .unwrap();
        state.viewer().view(&admin, document.id, 1).await.unwrap();

        let clerk = Actor::new("clerk");
        let denied = state.dispatch(&clerk, Action::ClearImageCache).await;
        assert!(matches!(denied, Err(CoreError::PermissionDenied { .. })));
        assert_eq!(state.cache().len(), 1);

        acl.grant(&clerk, Permission::DocumentTools);
        let outcome = state.dispatch(&clerk, Action::ClearImageCache).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::CacheCleared(1)));
        assert!(state.cache().is_empty());
        assert_eq!(history.kinds(), vec![HistoryEventKind::DocumentCreated]);
    }
}
