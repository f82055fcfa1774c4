// THEORY:
// The document store is an external collaborator; the engine only needs a
// narrow, append-oriented view of it. `EventStore` is that view: append events,
// read a session's log back in timestamp order, keep one derived metrics
// document per session, and know each session's bounds.
//
// `InMemoryStore` is the reference implementation used by tests and by hosts
// that have no persistence. Event appends are idempotent on the event id, so a
// retried flush that had partially succeeded never duplicates a fact.

use crate::error::{FocusError, Result};
use crate::events::{AttentionEvent, MetricsDocument, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, event: &AttentionEvent) -> Result<()>;
    /// All events of a session, ordered by timestamp.
    async fn get_events_by_session(&self, session_id: &str) -> Result<Vec<AttentionEvent>>;
    async fn get_metrics_by_session(&self, session_id: &str) -> Result<Option<MetricsDocument>>;
    async fn create_metrics(&self, metrics: &MetricsDocument) -> Result<()>;
    async fn update_metrics(&self, metrics: &MetricsDocument) -> Result<()>;
    async fn create_session(&self, session: &SessionRecord) -> Result<()>;
    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()>;
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;
}

#[derive(Default)]
struct Tables {
    events: Vec<AttentionEvent>,
    event_ids: HashSet<Uuid>,
    metrics: HashMap<String, MetricsDocument>,
    sessions: HashMap<String, SessionRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn create_event(&self, event: &AttentionEvent) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.event_ids.insert(event.id) {
            debug!("Event {} already stored, ignoring duplicate", event.id);
            return Ok(());
        }
        tables.events.push(event.clone());
        Ok(())
    }

    async fn get_events_by_session(&self, session_id: &str) -> Result<Vec<AttentionEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<AttentionEvent> =
            tables.events.iter().filter(|e| e.session_id == session_id).cloned().collect();
        // Stable sort keeps insertion order for equal timestamps.
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn get_metrics_by_session(&self, session_id: &str) -> Result<Option<MetricsDocument>> {
        Ok(self.tables.read().await.metrics.get(session_id).cloned())
    }

    async fn create_metrics(&self, metrics: &MetricsDocument) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.metrics.contains_key(&metrics.session_id) {
            return Err(FocusError::Store(format!(
                "metrics for session {} already exist",
                metrics.session_id
            )));
        }
        tables.metrics.insert(metrics.session_id.clone(), metrics.clone());
        Ok(())
    }

    async fn update_metrics(&self, metrics: &MetricsDocument) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.metrics.get_mut(&metrics.session_id) {
            Some(existing) => {
                *existing = metrics.clone();
                Ok(())
            }
            None => Err(FocusError::SessionNotFound(metrics.session_id.clone())),
        }
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(session_id) {
            Some(session) => {
                session.ended_at = Some(ended_at);
                Ok(())
            }
            None => Err(FocusError::SessionNotFound(session_id.to_string())),
        }
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.tables.read().await.sessions.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventData, EventType};
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn event(session: &str, event_type: EventType, at: i64) -> AttentionEvent {
        AttentionEvent::new(session, "user-1", event_type, t(at), EventData::default())
    }

    #[tokio::test]
    async fn events_come_back_ordered_and_scoped_to_the_session() {
        let store = InMemoryStore::new();
        store.create_event(&event("s1", EventType::AttentionLost, 20)).await.unwrap();
        store.create_event(&event("s2", EventType::AttentionLost, 5)).await.unwrap();
        store.create_event(&event("s1", EventType::AttentionPresent, 10)).await.unwrap();

        let events = store.get_events_by_session("s1").await.unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(types, vec![EventType::AttentionPresent, EventType::AttentionLost]);
    }

    #[tokio::test]
    async fn duplicate_event_ids_are_stored_once() {
        let store = InMemoryStore::new();
        let e = event("s1", EventType::AttentionLost, 1);
        store.create_event(&e).await.unwrap();
        store.create_event(&e).await.unwrap();
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn session_bounds_can_be_closed() {
        let store = InMemoryStore::new();
        let record = SessionRecord {
            session_id: "s1".into(),
            user_id: "user-1".into(),
            course_id: None,
            subject: "Algebra".into(),
            started_at: t(0),
            ended_at: None,
        };
        store.create_session(&record).await.unwrap();
        store.end_session("s1", t(60)).await.unwrap();
        let stored = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(stored.ended_at, Some(t(60)));
        assert!(matches!(
            store.end_session("missing", t(1)).await,
            Err(FocusError::SessionNotFound(_))
        ));
    }
}
