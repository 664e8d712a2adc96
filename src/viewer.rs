//! Page view control flow
//!
//! current version → page by number → active stack → fingerprint → cache hit
//! or single-flight render → store → return.

use std::sync::Arc;

use crate::access::{Actor, Permission, ResourceRef};
use crate::context::CoreContext;
use crate::document::{Document, DocumentId, DocumentPage, PageId};
use crate::error::Result;
use crate::render::RenderedPage;

#[derive(Clone)]
pub struct PageViewer {
    ctx: Arc<CoreContext>,
}

impl PageViewer {
    pub(crate) fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    /// Render page `page_number` of the document's current version
    pub async fn view(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        page_number: usize,
    ) -> Result<RenderedPage> {
        self.ctx
            .authorize(actor, Permission::DocumentView, ResourceRef::of::<Document>(document_id))
            .await?;

        let page_id = {
            let catalog = self.ctx.catalog.read().await;
            let version_id = catalog.document(document_id)?.current_version_id;
            catalog.page_by_number(version_id, page_number)?.id
        };
        self.render_with_retry(page_id).await
    }

    /// Render a page by id under its current stack
    pub async fn view_page(&self, actor: &Actor, page_id: PageId) -> Result<RenderedPage> {
        self.ctx
            .authorize(actor, Permission::DocumentView, ResourceRef::of::<DocumentPage>(page_id))
            .await?;
        self.render_with_retry(page_id).await
    }

    /// Transient failures get one retry with a fresh snapshot
    async fn render_with_retry(&self, page_id: PageId) -> Result<RenderedPage> {
        match self.render(page_id).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(page_id = %page_id, error = %e, "Page render failed; retrying");
                self.render(page_id).await
            }
            result => result,
        }
    }

    async fn render(&self, page_id: PageId) -> Result<RenderedPage> {
        let target = {
            let catalog = self.ctx.catalog.read().await;
            let target = catalog.render_target(page_id, &self.ctx.cache)?;
            // A hit read under the lock cannot be stale
            if let Some(hit) = self.ctx.cache.lookup(&target.fingerprint()).await {
                return Ok(hit);
            }
            target
        };

        // Misses render without holding the catalog; the generation captured
        // in the target keeps a stale result out of the index
        self.ctx.cache.get(&target).await
    }
}
