//! Per-page transformation stacks
//!
//! Every mutation invalidates the page's cache entries before releasing the
//! catalog write lock.

use std::sync::Arc;

use super::types::{Transformation, TransformationKind};
use crate::access::{Actor, Permission, ResourceRef};
use crate::context::CoreContext;
use crate::document::{Document, DocumentId, DocumentPage, PageId, TransformationId};
use crate::error::{CoreError, Entity, Result};

#[derive(Clone)]
pub struct TransformationRegistry {
    ctx: Arc<CoreContext>,
}

impl TransformationRegistry {
    pub(crate) fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    /// Stack of a page in application order
    pub async fn list(&self, page_id: PageId) -> Result<Vec<Transformation>> {
        let catalog = self.ctx.catalog.read().await;
        catalog.page(page_id)?;
        Ok(catalog.stack(page_id).into_iter().cloned().collect())
    }

    /// Parse `kind` and append it to the page's stack
    pub async fn create(
        &self,
        actor: &Actor,
        page_id: PageId,
        kind: &str,
    ) -> Result<Transformation> {
        let kind: TransformationKind = kind.parse()?;
        self.append(actor, page_id, kind).await
    }

    /// Append after the highest order index; `reset` drops prior entries
    pub async fn append(
        &self,
        actor: &Actor,
        page_id: PageId,
        kind: TransformationKind,
    ) -> Result<Transformation> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTransform,
                ResourceRef::of::<DocumentPage>(page_id),
            )
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        catalog.page(page_id)?;

        let order = catalog.next_order(page_id);
        if kind == TransformationKind::Reset {
            let removed = catalog.remove_transformations(page_id);
            tracing::debug!(page_id = %page_id, removed = removed, "Reset transformation stack");
        }

        let transformation = Transformation {
            id: TransformationId::new(),
            page_id,
            kind,
            order,
        };
        catalog.transformations.insert(transformation.id, transformation.clone());
        self.ctx.cache.invalidate_page(page_id).await;
        drop(catalog);

        tracing::debug!(page_id = %page_id, kind = %kind, order = order, "Added transformation");
        Ok(transformation)
    }

    /// Change an entry's kind in place; its order is kept
    ///
    /// Turning an entry into `reset` drops the entries ordered before it.
    pub async fn update(
        &self,
        actor: &Actor,
        transformation_id: TransformationId,
        kind: &str,
    ) -> Result<Transformation> {
        let kind: TransformationKind = kind.parse()?;
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTransform,
                ResourceRef::of::<Transformation>(transformation_id),
            )
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        let transformation = catalog
            .transformations
            .get_mut(&transformation_id)
            .ok_or_else(|| CoreError::not_found(Entity::Transformation, transformation_id))?;
        transformation.kind = kind;
        let transformation = transformation.clone();

        if kind == TransformationKind::Reset {
            let before = catalog.transformations.len();
            catalog.transformations.retain(|_, t| {
                t.page_id != transformation.page_id || t.order >= transformation.order
            });
            tracing::debug!(
                page_id = %transformation.page_id,
                removed = before - catalog.transformations.len(),
                "Reset transformation stack"
            );
        }

        self.ctx.cache.invalidate_page(transformation.page_id).await;
        drop(catalog);

        tracing::debug!(
            transformation_id = %transformation_id,
            kind = %kind,
            "Updated transformation"
        );
        Ok(transformation)
    }

    /// Remove one entry; the others keep their order
    pub async fn delete(&self, actor: &Actor, transformation_id: TransformationId) -> Result<()> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTransform,
                ResourceRef::of::<Transformation>(transformation_id),
            )
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        let page_id = catalog.transformation(transformation_id)?.page_id;
        catalog.transformations.remove(&transformation_id);
        self.ctx.cache.invalidate_page(page_id).await;
        Ok(())
    }

    /// Remove every entry of a page
    pub async fn clear(&self, actor: &Actor, page_id: PageId) -> Result<usize> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTransform,
                ResourceRef::of::<DocumentPage>(page_id),
            )
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        catalog.page(page_id)?;
        let removed = catalog.remove_transformations(page_id);
        self.ctx.cache.invalidate_page(page_id).await;
        drop(catalog);

        tracing::debug!(page_id = %page_id, removed = removed, "Cleared transformations");
        Ok(removed)
    }

    /// Remove every entry of every page of the current version
    pub async fn clear_document(&self, actor: &Actor, document_id: DocumentId) -> Result<usize> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentTransform,
                ResourceRef::of::<Document>(document_id),
            )
            .await?;

        let mut catalog = self.ctx.catalog.write().await;
        let version_id = catalog.document(document_id)?.current_version_id;
        let page_ids: Vec<PageId> = catalog.pages_of(version_id).iter().map(|p| p.id).collect();

        let removed: usize = page_ids
            .iter()
            .map(|page_id| catalog.remove_transformations(*page_id))
            .sum();
        self.ctx.cache.invalidate_pages(&page_ids).await;
        drop(catalog);

        tracing::info!(
            document_id = %document_id,
            removed = removed,
            "Cleared document transformations"
        );
        Ok(removed)
    }
}
