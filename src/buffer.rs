// THEORY:
// The `EventLogger` sits between the real-time layers and the store. Detection
// runs at frame rate and must never wait on persistence, so every fact is first
// appended to an in-memory buffer in generation order and written out in
// batches.
//
// Flush policy:
// 1.  **Size**: the buffer reaching `max_buffer_size` flushes immediately.
// 2.  **Time**: the first buffered event arms a one-shot timer; when it fires
//     whatever is buffered is written.
// 3.  **Forced**: page hide / unload calls `force_flush`, which waits for a
//     running flush and then writes the rest.
//
// Delivery is at-least-once. Events whose write failed go back to the *front*
// of the buffer in their original order, ahead of anything logged meanwhile.
// The store is idempotent on event id, so a retry never duplicates a fact.
// Only one flush runs at a time; a second request while one is in progress is
// a no-op.

use crate::clock::Clock;
use crate::config::BufferConfig;
use crate::coordinator::TabCoordinator;
use crate::core_modules::activity::ActivityTransition;
use crate::core_modules::hysteresis::GazeTransition;
use crate::core_modules::nudge::Activation;
use crate::error::Result;
use crate::events::{AttentionEvent, EventData, EventReason, EventType};
use crate::store::EventStore;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity stamped onto every event of the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStatus {
    pub event_count: usize,
    pub last_flush: Option<DateTime<Utc>>,
    pub is_flushing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KoalaInteraction {
    Dragged,
    Clicked,
}

#[derive(Default)]
struct BufferState {
    session: Option<SessionContext>,
    events: VecDeque<AttentionEvent>,
    last_flush: Option<DateTime<Utc>>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn EventStore>,
    config: BufferConfig,
    clock: Clock,
    coordinator: Option<Arc<TabCoordinator>>,
    state: Mutex<BufferState>,
    /// Held for the duration of a flush.
    flush_lock: Mutex<()>,
}

/// Cheap to clone; all clones share one buffer.
#[derive(Clone)]
pub struct EventLogger {
    inner: Arc<Inner>,
}

impl EventLogger {
    pub fn new(store: Arc<dyn EventStore>, config: BufferConfig, clock: Clock) -> Self {
        Self::build(store, config, clock, None)
    }

    /// A logger that also announces each event on the coordination channel
    /// while its participant is leader.
    pub fn with_coordinator(
        store: Arc<dyn EventStore>,
        config: BufferConfig,
        clock: Clock,
        coordinator: Arc<TabCoordinator>,
    ) -> Self {
        Self::build(store, config, clock, Some(coordinator))
    }

    fn build(
        store: Arc<dyn EventStore>,
        config: BufferConfig,
        clock: Clock,
        coordinator: Option<Arc<TabCoordinator>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                clock,
                coordinator,
                state: Mutex::new(BufferState::default()),
                flush_lock: Mutex::new(()),
            }),
        }
    }

    pub async fn set_session(&self, session: SessionContext) {
        info!("Event logger bound to session {}", session.session_id);
        self.inner.state.lock().await.session = Some(session);
    }

    pub async fn clear_session(&self) {
        self.inner.state.lock().await.session = None;
    }

    pub async fn session(&self) -> Option<SessionContext> {
        self.inner.state.lock().await.session.clone()
    }

    /// Buffers an event stamped with the current time. Returns its id, or
    /// `None` when no session is active and the event was dropped.
    pub async fn log_event(&self, event_type: EventType, data: EventData) -> Option<Uuid> {
        let now = self.inner.clock.now();
        self.log_event_at(event_type, data, now).await
    }

    /// Buffers an event with an explicit timestamp.
    pub async fn log_event_at(&self, event_type: EventType, data: EventData, timestamp: DateTime<Utc>) -> Option<Uuid> {
        let (id, session_id, should_flush) = {
            let mut state = self.inner.state.lock().await;
            let Some(session) = state.session.clone() else {
                warn!("No active session, dropping {} event", event_type);
                return None;
            };
            let event = AttentionEvent::new(&session.session_id, &session.user_id, event_type.clone(), timestamp, data)
                .with_course(session.course_id.clone());
            let id = event.id;
            state.events.push_back(event);
            debug!("Buffered {} ({} pending)", event_type, state.events.len());

            let should_flush = state.events.len() >= self.inner.config.max_buffer_size;
            if state.timer.is_none() {
                state.timer = Some(self.spawn_flush_timer());
            }
            (id, session.session_id, should_flush)
        };

        if let Some(coordinator) = &self.inner.coordinator {
            coordinator.notify_event_log(&session_id, &event_type);
        }
        if should_flush {
            self.flush().await;
        }
        Some(id)
    }

    fn spawn_flush_timer(&self) -> JoinHandle<()> {
        let logger = self.clone();
        let delay = self.inner.config.flush_interval();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Release our own slot first so the flush does not abort us.
            logger.inner.state.lock().await.timer = None;
            logger.flush().await;
        })
    }

    /// Writes the buffer out. Returns the number of events written; zero if
    /// another flush is already running.
    pub async fn flush(&self) -> usize {
        match self.inner.flush_lock.try_lock() {
            Ok(_guard) => self.flush_locked().await,
            Err(_) => {
                debug!("Flush already in progress, skipping");
                0
            }
        }
    }

    /// Flush for page hide / unload: waits out a running flush, then writes
    /// everything still buffered.
    pub async fn force_flush(&self) -> usize {
        let _guard = self.inner.flush_lock.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> usize {
        let batch: Vec<AttentionEvent> = {
            let mut state = self.inner.state.lock().await;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.events.drain(..).collect()
        };
        if batch.is_empty() {
            return 0;
        }

        let store = &self.inner.store;
        let results: Vec<Result<()>> = join_all(batch.iter().map(|event| store.create_event(event))).await;

        let attempted = batch.len();
        let mut failed = Vec::new();
        for (event, result) in batch.into_iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to store {} event {}: {}", event.event_type, event.id, e);
                failed.push(event);
            }
        }
        let failed_count = failed.len();

        let mut state = self.inner.state.lock().await;
        for event in failed.into_iter().rev() {
            state.events.push_front(event);
        }
        state.last_flush = Some(self.inner.clock.now());
        if !state.events.is_empty() && state.timer.is_none() {
            state.timer = Some(self.spawn_flush_timer());
        }
        drop(state);

        if failed_count > 0 {
            warn!("{} of {} events re-queued for retry", failed_count, attempted);
        } else {
            debug!("Flushed {} events", attempted);
        }
        attempted - failed_count
    }

    pub async fn buffer_status(&self) -> BufferStatus {
        let state = self.inner.state.lock().await;
        BufferStatus {
            event_count: state.events.len(),
            last_flush: state.last_flush,
            is_flushing: self.inner.flush_lock.try_lock().is_err(),
        }
    }

    /// Drops everything buffered without writing it.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let dropped = state.events.len();
        state.events.clear();
        if dropped > 0 {
            info!("Cleared {} buffered events", dropped);
        }
    }

    pub async fn log_attention_present(&self, reason: EventReason) -> Option<Uuid> {
        self.log_event(EventType::AttentionPresent, EventData::with_reason(reason)).await
    }

    pub async fn log_attention_lost(&self, reason: EventReason) -> Option<Uuid> {
        self.log_event(EventType::AttentionLost, EventData::with_reason(reason)).await
    }

    pub async fn log_activity_transition(&self, transition: &ActivityTransition) -> Option<Uuid> {
        self.log_event_at(transition.event_type(), transition.event_data(), transition.at).await
    }

    pub async fn log_gaze_transition(&self, transition: &GazeTransition) -> Option<Uuid> {
        self.log_event_at(transition.event_type(), transition.event_data(), transition.at()).await
    }

    /// Logs a nudge activation, followed by the sound event when one played.
    /// Happy activations are not nudges and are not logged.
    pub async fn log_nudge_shown(&self, activation: &Activation) -> Option<Uuid> {
        let (event_type, kind) = (activation.event_type()?, activation.nudge_kind()?);
        let data = EventData {
            nudge_type: Some(kind),
            sound_played: Some(activation.sound),
            ..EventData::default()
        };
        let id = self.log_event_at(event_type, data, activation.started_at).await;
        if activation.sound {
            let sound = EventData {
                nudge_type: Some(kind),
                ..EventData::default()
            };
            self.log_event_at(EventType::NudgeSoundPlayed, sound, activation.started_at).await;
        }
        id
    }

    pub async fn log_focus_regained(&self, response_time_secs: f64) -> Option<Uuid> {
        let data = EventData {
            response_time: Some(response_time_secs),
            ..EventData::default()
        };
        self.log_event(EventType::FocusRegained, data).await
    }

    pub async fn log_session_start(&self, subject: &str) -> Option<Uuid> {
        let data = EventData {
            subject: Some(subject.to_string()),
            ..EventData::default()
        };
        self.log_event(EventType::SessionStart, data).await
    }

    pub async fn log_session_end(&self, subject: &str, duration_secs: u64) -> Option<Uuid> {
        let data = EventData {
            subject: Some(subject.to_string()),
            duration: Some(duration_secs),
            ..EventData::default()
        };
        self.log_event(EventType::SessionEnd, data).await
    }

    pub async fn log_settings_changed(&self, setting_name: &str, setting_value: serde_json::Value) -> Option<Uuid> {
        let data = EventData {
            setting_name: Some(setting_name.to_string()),
            setting_value: Some(setting_value),
            ..EventData::default()
        };
        self.log_event(EventType::SettingsChanged, data).await
    }

    pub async fn log_koala_interaction(
        &self,
        interaction: KoalaInteraction,
        metadata: Option<serde_json::Value>,
    ) -> Option<Uuid> {
        let event_type = match interaction {
            KoalaInteraction::Dragged => EventType::KoalaDragged,
            KoalaInteraction::Clicked => EventType::KoalaClicked,
        };
        let data = EventData {
            metadata,
            ..EventData::default()
        };
        self.log_event(event_type, data).await
    }
}
