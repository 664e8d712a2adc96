//! Permission gate interface
//!
//! The core never decides authorization itself. It asks a [`PermissionGate`]
//! before every mutation (and before views and downloads) and aborts with
//! `PermissionDenied` on a deny. Each entity kind declares the permissions it
//! supports as static data through [`Capabilities`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentPage, DocumentType, DocumentVersion};
use crate::error::{CoreError, Result};
use crate::transform::Transformation;

/// Permissions understood by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    DocumentCreate,
    DocumentView,
    DocumentEdit,
    DocumentPropertiesEdit,
    DocumentDelete,
    DocumentDownload,
    DocumentNewVersion,
    DocumentVersionRevert,
    DocumentTransform,
    DocumentTools,
    DocumentTypeCreate,
    DocumentTypeEdit,
    DocumentTypeDelete,
    DocumentTypeView,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Resource kinds the gate is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Document,
    DocumentType,
    DocumentVersion,
    DocumentPage,
    Transformation,
    /// Process-wide maintenance target (e.g. the image cache)
    System,
}

impl ResourceKind {
    /// Static capability set of the resource kind
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            ResourceKind::Document => Document::PERMISSIONS,
            ResourceKind::DocumentType => DocumentType::PERMISSIONS,
            ResourceKind::DocumentVersion => DocumentVersion::PERMISSIONS,
            ResourceKind::DocumentPage => DocumentPage::PERMISSIONS,
            ResourceKind::Transformation => Transformation::PERMISSIONS,
            ResourceKind::System => &[Permission::DocumentTools, Permission::DocumentTypeCreate],
        }
    }

    pub fn supports(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

/// Static per-entity capability declaration
pub trait Capabilities {
    const RESOURCE: ResourceKind;
    const PERMISSIONS: &'static [Permission];
}

impl Capabilities for Document {
    const RESOURCE: ResourceKind = ResourceKind::Document;
    const PERMISSIONS: &'static [Permission] = &[
        Permission::DocumentView,
        Permission::DocumentEdit,
        Permission::DocumentPropertiesEdit,
        Permission::DocumentDelete,
        Permission::DocumentDownload,
        Permission::DocumentNewVersion,
        Permission::DocumentVersionRevert,
        Permission::DocumentTransform,
        Permission::DocumentTools,
    ];
}

impl Capabilities for DocumentType {
    const RESOURCE: ResourceKind = ResourceKind::DocumentType;
    const PERMISSIONS: &'static [Permission] = &[
        Permission::DocumentCreate,
        Permission::DocumentTypeView,
        Permission::DocumentTypeEdit,
        Permission::DocumentTypeDelete,
    ];
}

impl Capabilities for DocumentVersion {
    const RESOURCE: ResourceKind = ResourceKind::DocumentVersion;
    const PERMISSIONS: &'static [Permission] = &[
        Permission::DocumentView,
        Permission::DocumentDownload,
        Permission::DocumentVersionRevert,
    ];
}

impl Capabilities for DocumentPage {
    const RESOURCE: ResourceKind = ResourceKind::DocumentPage;
    const PERMISSIONS: &'static [Permission] =
        &[Permission::DocumentView, Permission::DocumentTransform];
}

impl Capabilities for Transformation {
    const RESOURCE: ResourceKind = ResourceKind::Transformation;
    const PERMISSIONS: &'static [Permission] = &[Permission::DocumentTransform];
}

/// Reference to the resource being acted upon
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl fmt::Display) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }

    pub fn of<T: Capabilities>(id: impl fmt::Display) -> Self {
        Self::new(T::RESOURCE, id)
    }

    pub fn system() -> Self {
        Self::new(ResourceKind::System, "*")
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.id)
    }
}

/// Who is performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Internal maintenance actor
    pub fn system() -> Self {
        Self::new("system")
    }
}

/// Gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// External authorization collaborator
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check(&self, actor: &Actor, permission: Permission, resource: &ResourceRef) -> Access;
}

/// Ask the gate and turn a deny into `PermissionDenied`
pub async fn authorize(
    gate: &dyn PermissionGate,
    actor: &Actor,
    permission: Permission,
    resource: ResourceRef,
) -> Result<()> {
    match gate.check(actor, permission, &resource).await {
        Access::Allow => Ok(()),
        Access::Deny => {
            tracing::info!(
                actor = %actor.id,
                permission = %permission,
                resource = %resource,
                "Permission denied"
            );
            Err(CoreError::PermissionDenied {
                permission: permission.to_string(),
                resource: resource.to_string(),
            })
        }
    }
}

/// Gate that allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionGate for AllowAll {
    async fn check(
        &self,
        _actor: &Actor,
        _permission: Permission,
        _resource: &ResourceRef,
    ) -> Access {
        Access::Allow
    }
}

/// Grant table keyed by actor
///
/// A grant only takes effect on resource kinds whose capability set contains
/// the permission.
#[derive(Debug, Default)]
pub struct AccessControlList {
    grants: RwLock<HashMap<String, HashSet<Permission>>>,
    superusers: RwLock<HashSet<String>>,
}

impl AccessControlList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, actor: &Actor, permission: Permission) {
        self.grants
            .write()
            .entry(actor.id.clone())
            .or_default()
            .insert(permission);
    }

    pub fn revoke(&self, actor: &Actor, permission: Permission) {
        if let Some(granted) = self.grants.write().get_mut(&actor.id) {
            granted.remove(&permission);
        }
    }

    pub fn add_superuser(&self, actor: &Actor) {
        self.superusers.write().insert(actor.id.clone());
    }
}

#[async_trait]
impl PermissionGate for AccessControlList {
    async fn check(&self, actor: &Actor, permission: Permission, resource: &ResourceRef) -> Access {
        if !resource.kind.supports(permission) {
            return Access::Deny;
        }
        if self.superusers.read().contains(&actor.id) {
            return Access::Allow;
        }
        let allowed = self
            .grants
            .read()
            .get(&actor.id)
            .is_some_and(|granted| granted.contains(&permission));
        if allowed {
            Access::Allow
        } else {
            Access::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acl_grant_and_revoke() {
        let acl = AccessControlList::new();
        let alice = Actor::new("alice");
        let resource = ResourceRef::new(ResourceKind::Document, "doc-1");

        assert_eq!(acl.check(&alice, Permission::DocumentDelete, &resource).await, Access::Deny);

        acl.grant(&alice, Permission::DocumentDelete);
        assert_eq!(acl.check(&alice, Permission::DocumentDelete, &resource).await, Access::Allow);

        acl.revoke(&alice, Permission::DocumentDelete);
        assert_eq!(acl.check(&alice, Permission::DocumentDelete, &resource).await, Access::Deny);
    }

    #[tokio::test]
    async fn test_acl_respects_capabilities() {
        let acl = AccessControlList::new();
        let root = Actor::new("root");
        acl.add_superuser(&root);

        // Pages cannot be deleted individually, even by a superuser
        let page = ResourceRef::new(ResourceKind::DocumentPage, "page-1");
        assert_eq!(acl.check(&root, Permission::DocumentDelete, &page).await, Access::Deny);
        assert_eq!(acl.check(&root, Permission::DocumentTransform, &page).await, Access::Allow);
    }

    #[tokio::test]
    async fn test_authorize_maps_deny() {
        let acl = AccessControlList::new();
        let err = authorize(
            &acl,
            &Actor::new("bob"),
            Permission::DocumentView,
            ResourceRef::new(ResourceKind::Document, "doc-2"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));
    }
}
