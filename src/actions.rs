//! Action routing
//!
//! [`ActionTable`] is built once at startup and never mutated. It maps a
//! resource kind and a menu context to the ordered actions offered there.
//! Offered actions are bound to concrete targets as [`Action`] values, which
//! `AppState::dispatch` interprets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::access::{Permission, ResourceKind};
use crate::document::{
    Document, DocumentId, DocumentPage, DocumentTypeId, DocumentVersion, PageDirection, PageId,
    VersionDownload, VersionId,
};
use crate::transform::{Transformation, TransformationKind};

/// Where actions are offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuContext {
    /// Actions on a single object
    Object,
    /// Actions applied to a selection of objects
    MultiItem,
    /// Page viewer toolbar
    PageView,
    /// Administrative tools
    Maintenance,
}

/// Unbound action identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RotateLeft,
    RotateRight,
    ZoomIn,
    ZoomOut,
    ResetView,
    FirstPage,
    PreviousPage,
    NextPage,
    LastPage,
    ClearPageTransformations,
    ClearTransformations,
    UpdatePageCount,
    EditProperties,
    ChangeDocumentType,
    Delete,
    Download,
    DownloadBundle,
    RevertVersion,
    ClearImageCache,
}

/// What a bound action acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTarget {
    Document(DocumentId),
    Version {
        document_id: DocumentId,
        version_id: VersionId,
    },
    Page(PageId),
    System,
}

/// Caller-supplied values for actions that need more than a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionInput {
    Properties { label: String, description: String },
    DocumentType(DocumentTypeId),
}

/// A dispatchable action bound to its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Action {
    Transform {
        page_id: PageId,
        kind: TransformationKind,
    },
    Navigate {
        page_id: PageId,
        direction: PageDirection,
    },
    ClearPageTransformations {
        page_id: PageId,
    },
    ClearDocumentTransformations {
        document_id: DocumentId,
    },
    UpdatePageCount {
        document_id: DocumentId,
    },
    EditDocument {
        document_id: DocumentId,
        label: String,
        description: String,
    },
    SetDocumentType {
        document_id: DocumentId,
        document_type_id: DocumentTypeId,
    },
    DeleteDocument {
        document_id: DocumentId,
    },
    RevertVersion {
        document_id: DocumentId,
        version_id: VersionId,
    },
    DownloadVersion {
        version_id: VersionId,
    },
    /// One zip archive holding every listed version
    DownloadBundle {
        version_ids: Vec<VersionId>,
    },
    ClearImageCache,
}

/// Result of a dispatched action
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Transformation(Transformation),
    Page(DocumentPage),
    /// Number of removed transformations
    Cleared(usize),
    PageCount(usize),
    Document(Document),
    Deleted(DocumentId),
    Reverted(DocumentVersion),
    Download(VersionDownload),
    /// Zip archive bytes
    Bundle(Vec<u8>),
    /// Number of removed cache entries
    CacheCleared(usize),
}

impl ActionKind {
    /// Whether binding needs an [`ActionInput`]
    pub fn takes_input(&self) -> bool {
        matches!(self, ActionKind::EditProperties | ActionKind::ChangeDocumentType)
    }

    /// Bind to a target; `None` when the action does not apply to it or
    /// needs input
    pub fn bind(&self, target: ActionTarget) -> Option<Action> {
        use self::ActionTarget::{Page, System, Version};

        let transform = |page_id, kind| Some(Action::Transform { page_id, kind });
        let navigate = |page_id, direction| Some(Action::Navigate { page_id, direction });

        match (self, target) {
            (ActionKind::RotateLeft, Page(id)) => transform(id, TransformationKind::RotateLeft),
            (ActionKind::RotateRight, Page(id)) => transform(id, TransformationKind::RotateRight),
            (ActionKind::ZoomIn, Page(id)) => transform(id, TransformationKind::ZoomIn),
            (ActionKind::ZoomOut, Page(id)) => transform(id, TransformationKind::ZoomOut),
            (ActionKind::ResetView, Page(id)) => transform(id, TransformationKind::Reset),
            (ActionKind::FirstPage, Page(id)) => navigate(id, PageDirection::First),
            (ActionKind::PreviousPage, Page(id)) => navigate(id, PageDirection::Previous),
            (ActionKind::NextPage, Page(id)) => navigate(id, PageDirection::Next),
            (ActionKind::LastPage, Page(id)) => navigate(id, PageDirection::Last),
            (ActionKind::ClearPageTransformations, Page(page_id)) => {
                Some(Action::ClearPageTransformations { page_id })
            }
            (ActionKind::ClearTransformations, ActionTarget::Document(document_id)) => {
                Some(Action::ClearDocumentTransformations { document_id })
            }
            (ActionKind::UpdatePageCount, ActionTarget::Document(document_id)) => {
                Some(Action::UpdatePageCount { document_id })
            }
            (ActionKind::Delete, ActionTarget::Document(document_id)) => {
                Some(Action::DeleteDocument { document_id })
            }
            (ActionKind::Download, Version { version_id, .. }) => {
                Some(Action::DownloadVersion { version_id })
            }
            (ActionKind::DownloadBundle, Version { version_id, .. }) => {
                Some(Action::DownloadBundle {
                    version_ids: vec![version_id],
                })
            }
            (ActionKind::RevertVersion, Version { document_id, version_id }) => {
                Some(Action::RevertVersion { document_id, version_id })
            }
            (ActionKind::ClearImageCache, System) => Some(Action::ClearImageCache),
            _ => None,
        }
    }

    /// Bind an action that needs input to a target
    pub fn bind_with(&self, target: ActionTarget, input: ActionInput) -> Option<Action> {
        match (self, target, input) {
            (
                ActionKind::EditProperties,
                ActionTarget::Document(document_id),
                ActionInput::Properties { label, description },
            ) => Some(Action::EditDocument {
                document_id,
                label,
                description,
            }),
            (
                ActionKind::ChangeDocumentType,
                ActionTarget::Document(document_id),
                ActionInput::DocumentType(document_type_id),
            ) => Some(Action::SetDocumentType {
                document_id,
                document_type_id,
            }),
            _ => None,
        }
    }

    /// Bind one action to a whole selection
    ///
    /// `None` for actions that are bound per item, or when a target does
    /// not fit.
    pub fn bind_selection(&self, targets: &[ActionTarget]) -> Option<Action> {
        match self {
            ActionKind::DownloadBundle if !targets.is_empty() => {
                let version_ids = targets
                    .iter()
                    .map(|target| match target {
                        ActionTarget::Version { version_id, .. } => Some(*version_id),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(Action::DownloadBundle { version_ids })
            }
            _ => None,
        }
    }
}

/// One offered action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub label: &'static str,
    /// Permission the gate is asked for before the action runs
    pub permission: Permission,
}

const fn action(
    kind: ActionKind,
    label: &'static str,
    permission: Permission,
) -> ActionDescriptor {
    ActionDescriptor {
        kind,
        label,
        permission,
    }
}

const PAGE_VIEW_ACTIONS: &[ActionDescriptor] = &[
    action(ActionKind::FirstPage, "First page", Permission::DocumentView),
    action(ActionKind::PreviousPage, "Previous page", Permission::DocumentView),
    action(ActionKind::NextPage, "Next page", Permission::DocumentView),
    action(ActionKind::LastPage, "Last page", Permission::DocumentView),
    action(ActionKind::ZoomIn, "Zoom in", Permission::DocumentTransform),
    action(ActionKind::ZoomOut, "Zoom out", Permission::DocumentTransform),
    action(ActionKind::RotateLeft, "Rotate left", Permission::DocumentTransform),
    action(ActionKind::RotateRight, "Rotate right", Permission::DocumentTransform),
    action(ActionKind::ResetView, "Reset view", Permission::DocumentTransform),
];

const PAGE_OBJECT_ACTIONS: &[ActionDescriptor] = &[action(
    ActionKind::ClearPageTransformations,
    "Clear transformations",
    Permission::DocumentTransform,
)];

const DOCUMENT_OBJECT_ACTIONS: &[ActionDescriptor] = &[
    action(
        ActionKind::EditProperties,
        "Edit properties",
        Permission::DocumentPropertiesEdit,
    ),
    action(ActionKind::ChangeDocumentType, "Change type", Permission::DocumentEdit),
    action(
        ActionKind::ClearTransformations,
        "Clear transformations",
        Permission::DocumentTransform,
    ),
    action(ActionKind::UpdatePageCount, "Recalculate page count", Permission::DocumentTools),
    action(ActionKind::Delete, "Delete", Permission::DocumentDelete),
];

const DOCUMENT_MULTI_ACTIONS: &[ActionDescriptor] = &[
    action(ActionKind::ChangeDocumentType, "Change type", Permission::DocumentEdit),
    action(
        ActionKind::ClearTransformations,
        "Clear transformations",
        Permission::DocumentTransform,
    ),
    action(ActionKind::UpdatePageCount, "Recalculate page count", Permission::DocumentTools),
    action(ActionKind::Delete, "Delete", Permission::DocumentDelete),
];

const VERSION_OBJECT_ACTIONS: &[ActionDescriptor] = &[
    action(ActionKind::Download, "Download", Permission::DocumentDownload),
    action(ActionKind::RevertVersion, "Revert", Permission::DocumentVersionRevert),
];

const VERSION_MULTI_ACTIONS: &[ActionDescriptor] =
    &[action(ActionKind::DownloadBundle, "Download", Permission::DocumentDownload)];

const MAINTENANCE_ACTIONS: &[ActionDescriptor] = &[action(
    ActionKind::ClearImageCache,
    "Clear the document image cache",
    Permission::DocumentTools,
)];

/// Immutable `(resource kind, menu context)` → actions routing table
#[derive(Debug, Clone)]
pub struct ActionTable {
    routes: HashMap<(ResourceKind, MenuContext), &'static [ActionDescriptor]>,
}

impl ActionTable {
    pub fn build() -> Self {
        let routes = HashMap::from([
            ((ResourceKind::DocumentPage, MenuContext::PageView), PAGE_VIEW_ACTIONS),
            ((ResourceKind::DocumentPage, MenuContext::Object), PAGE_OBJECT_ACTIONS),
            ((ResourceKind::Document, MenuContext::Object), DOCUMENT_OBJECT_ACTIONS),
            ((ResourceKind::Document, MenuContext::MultiItem), DOCUMENT_MULTI_ACTIONS),
            ((ResourceKind::DocumentVersion, MenuContext::Object), VERSION_OBJECT_ACTIONS),
            ((ResourceKind::DocumentVersion, MenuContext::MultiItem), VERSION_MULTI_ACTIONS),
            ((ResourceKind::System, MenuContext::Maintenance), MAINTENANCE_ACTIONS),
        ]);
        Self { routes }
    }

    /// Actions offered for a resource kind in a context, in display order
    pub fn actions(
        &self,
        resource: ResourceKind,
        context: MenuContext,
    ) -> &'static [ActionDescriptor] {
        self.routes.get(&(resource, context)).copied().unwrap_or(&[])
    }

    /// Look up a single offered action
    pub fn find(
        &self,
        resource: ResourceKind,
        context: MenuContext,
        kind: ActionKind,
    ) -> Option<&'static ActionDescriptor> {
        self.actions(resource, context).iter().find(|d| d.kind == kind)
    }
}
