//! Append-only evidence log.
//!
//! Every state transition in the control plane lands here. Events are never
//! edited or deleted; the provenance graph and audit packs are derived views.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::types::Timestamp;

pub mod audit;
pub mod provenance;

pub use audit::{AuditExtras, AuditPackRecord, EvidenceItem};
pub use provenance::{ProvenanceEdge, ProvenanceGraph, ProvenanceNode};

/// Closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MissionCreated,
    CheckpointApproved,
    CheckpointRejected,
    BatchExecuted,
    RollbackApplied,
    BudgetBreached,
    AuditPackGenerated,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MissionCreated" => Some(Self::MissionCreated),
            "CheckpointApproved" => Some(Self::CheckpointApproved),
            "CheckpointRejected" => Some(Self::CheckpointRejected),
            "BatchExecuted" => Some(Self::BatchExecuted),
            "RollbackApplied" => Some(Self::RollbackApplied),
            "BudgetBreached" => Some(Self::BudgetBreached),
            "AuditPackGenerated" => Some(Self::AuditPackGenerated),
            _ => None,
        }
    }
}

/// One immutable log entry.
///
/// `sequence` breaks timestamp ties so per-mission order stays total even
/// under same-millisecond appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: Timestamp,
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<Uuid>,
    pub data: Value,
}

struct LogInner {
    events: Vec<Event>,
    by_id: HashMap<Uuid, usize>,
    next_sequence: u64,
}

/// Append-only store of events, optionally mirrored to JSON files.
pub struct EvidenceLog {
    inner: Mutex<LogInner>,
    packs: Mutex<HashMap<Uuid, AuditPackRecord>>,
    store_path: Option<PathBuf>,
}

impl EvidenceLog {
    /// In-memory log with no file mirror. Tests use this.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                events: Vec::new(),
                by_id: HashMap::new(),
                next_sequence: 0,
            }),
            packs: Mutex::new(HashMap::new()),
            store_path: None,
        }
    }

    /// Log mirrored to `<store>/{eventId}.json` and `<store>/pack_{id}.json`.
    pub fn with_store(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            inner: Mutex::new(LogInner {
                events: Vec::new(),
                by_id: HashMap::new(),
                next_sequence: 0,
            }),
            packs: Mutex::new(HashMap::new()),
            store_path: Some(path),
        })
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// Append an event. The in-memory append happens under the lock; the
    /// file mirror is written after the lock is released.
    pub fn append(&self, kind: EventKind, mission_id: Option<Uuid>, data: Value) -> Event {
        let event = {
            let mut inner = self.inner.lock();
            let event = Event {
                id: Uuid::new_v4(),
                kind,
                timestamp: crate::types::now(),
                sequence: inner.next_sequence,
                mission_id,
                data,
            };
            inner.next_sequence += 1;
            let idx = inner.events.len();
            inner.by_id.insert(event.id, idx);
            inner.events.push(event.clone());
            event
        };

        if let Some(store) = &self.store_path {
            let path = store.join(format!("{}.json", event.id));
            match serde_json::to_string_pretty(&event) {
                Ok(json) => {
                    if let Err(e) = std::fs::write(&path, json) {
                        tracing::warn!("failed to mirror event {} to disk: {}", event.id, e);
                    }
                }
                Err(e) => tracing::warn!("failed to serialize event {}: {}", event.id, e),
            }
        }

        tracing::debug!(kind = ?event.kind, mission = ?mission_id, "event appended");
        event
    }

    pub fn get(&self, id: Uuid) -> Option<Event> {
        let inner = self.inner.lock();
        inner.by_id.get(&id).map(|&idx| inner.events[idx].clone())
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Events for one mission, ordered by timestamp with the append
    /// sequence as tiebreaker.
    pub fn mission_events(&self, mission_id: Uuid) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .inner
            .lock()
            .events
            .iter()
            .filter(|e| e.mission_id == Some(mission_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.sequence.cmp(&b.sequence)));
        events
    }

    /// Derive the provenance chain for a mission.
    pub fn provenance(&self, mission_id: Uuid) -> ProvenanceGraph {
        ProvenanceGraph::from_events(mission_id, self.mission_events(mission_id))
    }
}

impl Default for EvidenceLog {
    fn default() -> Self {
        Self::new()
    }
}
