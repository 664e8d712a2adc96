//! Shared state behind every component
//!
//! One catalog lock covers all domain entities. Mutations take it for writing
//! and invalidate the render cache before releasing it, so a reader holding
//! the read lock never sees a changed stack next to a still-valid entry.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::access::{authorize, Actor, Permission, PermissionGate, ResourceRef};
use crate::document::{Catalog, ContentDecomposer, DecomposedContent, DocumentId};
use crate::error::{CoreError, Result};
use crate::history::{HistoryEvent, HistoryEventKind, HistoryLog};
use crate::render::RenderCache;

pub(crate) struct CoreContext {
    pub catalog: RwLock<Catalog>,
    pub cache: RenderCache,
    pub gate: Arc<dyn PermissionGate>,
    pub history: Arc<dyn HistoryLog>,
    pub decomposer: Arc<dyn ContentDecomposer>,
}

impl CoreContext {
    pub async fn authorize(
        &self,
        actor: &Actor,
        permission: Permission,
        resource: ResourceRef,
    ) -> Result<()> {
        authorize(self.gate.as_ref(), actor, permission, resource).await
    }

    /// Decompose content off the async runtime
    pub async fn decompose(&self, content: Arc<Vec<u8>>) -> Result<DecomposedContent> {
        let decomposer = self.decomposer.clone();
        tokio::task::spawn_blocking(move || decomposer.decompose(&content))
            .await
            .map_err(|e| CoreError::InvalidContent(format!("Task join error: {}", e)))?
    }

    pub fn emit(&self, kind: HistoryEventKind, document_id: DocumentId, actor: &Actor) {
        self.history.record(HistoryEvent::new(kind, document_id, actor));
    }
}
