//! History events emitted after successful mutations
//!
//! Storage of history belongs to an external collaborator; the core only
//! hands events to a [`HistoryLog`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::access::Actor;
use crate::document::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventKind {
    DocumentCreated,
    DocumentEdited,
    DocumentDeleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub kind: HistoryEventKind,
    pub document_id: DocumentId,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn new(kind: HistoryEventKind, document_id: DocumentId, actor: &Actor) -> Self {
        Self {
            kind,
            document_id,
            actor: actor.id.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// External history collaborator
pub trait HistoryLog: Send + Sync {
    fn record(&self, event: HistoryEvent);
}

/// Emits each event as a structured tracing record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHistoryLog;

impl HistoryLog for TracingHistoryLog {
    fn record(&self, event: HistoryEvent) {
        tracing::info!(
            target: "folio::history",
            kind = ?event.kind,
            document_id = %event.document_id,
            actor = %event.actor,
            timestamp = %event.timestamp.to_rfc3339(),
            "History event"
        );
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryHistoryLog {
    events: Mutex<Vec<HistoryEvent>>,
}

impl MemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HistoryEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<HistoryEventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

impl HistoryLog for MemoryHistoryLog {
    fn record(&self, event: HistoryEvent) {
        self.events.lock().push(event);
    }
}
