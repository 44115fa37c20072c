//! Audit event infrastructure
//!
//! Events are an append-only trail of mutations, recorded per project.
//! The core never updates or deletes an event once recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::domain::keys::ProjectId;
use crate::error::{Error, Result};

/// An event waiting to be recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub project_id: ProjectId,
    /// Kind of object the event is about (e.g. `"key"`)
    pub object_type: Option<String>,
    pub object_id: Option<i64>,
    pub description: String,
}

impl NewEvent {
    /// Create an event about a project-level object
    pub fn new(project_id: ProjectId, description: impl Into<String>) -> Self {
        Self {
            project_id,
            object_type: None,
            object_id: None,
            description: description.into(),
        }
    }

    /// Attach the object the event is about
    pub fn about(mut self, object_type: impl Into<String>, object_id: i64) -> Self {
        self.object_type = Some(object_type.into());
        self.object_id = Some(object_id);
        self
    }
}

/// A recorded audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub project_id: ProjectId,
    pub object_type: Option<String>,
    pub object_id: Option<i64>,
    pub description: String,
    pub created: DateTime<Utc>,
}

/// Durable audit trail
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Append an event
    async fn record(&self, event: NewEvent) -> Result<Event>;

    /// Most recent events of a project, newest first
    async fn list(&self, project_id: ProjectId, limit: Option<u32>) -> Result<Vec<Event>>;
}

/// A simple in-memory event store for recording events
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventStore {
    /// Create a new in-memory event store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get events about a specific object
    pub fn events_for(&self, object_type: &str, object_id: i64) -> Vec<Event> {
        self.read()
            .iter()
            .filter(|e| e.object_type.as_deref() == Some(object_type) && e.object_id == Some(object_id))
            .cloned()
            .collect()
    }

    /// Get all events in recording order
    pub fn all_events(&self) -> Vec<Event> {
        self.read().clone()
    }

    /// Clear all events
    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Event>> {
        self.events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventRecorder for InMemoryEventStore {
    async fn record(&self, event: NewEvent) -> Result<Event> {
        let mut events = self
            .events
            .write()
            .map_err(|_| Error::AuditWriteFailed("event store lock poisoned".to_string()))?;

        let recorded = Event {
            id: events.len() as i64 + 1,
            project_id: event.project_id,
            object_type: event.object_type,
            object_id: event.object_id,
            description: event.description,
            created: Utc::now(),
        };
        events.push(recorded.clone());
        Ok(recorded)
    }

    async fn list(&self, project_id: ProjectId, limit: Option<u32>) -> Result<Vec<Event>> {
        let events = self.read();
        let matching = events.iter().rev().filter(|e| e.project_id == project_id).cloned();

        Ok(match limit {
            Some(limit) => matching.take(limit as usize).collect(),
            None => matching.collect(),
        })
    }
}
