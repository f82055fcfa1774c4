// THEORY:
// The `SessionService` is the composition root of one participant. It owns no
// algorithm of its own; it wires the layers together explicitly for the
// lifetime of a study session:
//
//   detection transitions ─┐
//   activity signals ──────┼─> AttentionTracker ─> nudges ─> EventLogger ─> EventStore
//   session ticker ────────┘                                                   │
//                                                    MetricsAggregator <───────┘
//
// Key architectural principles:
// 1.  **One presence, one log**: The learner counts as present only while the
//     activity layer and the gaze layer agree. `attention:*` is written when
//     that combined presence flips, with the reason of the source that flipped
//     it (a camera flip reads `no_face`, `yaw` or `pitch`). Camera transitions
//     are additionally logged as `gaze:*`. The aggregator only has to
//     understand `attention:*`.
// 2.  **The session keeps its own time**: While a session runs, a ticker task
//     evaluates the nudge triggers every second and checks for idleness on
//     the slower idle cadence. Ending the session aborts it.
// 3.  **Leader-only background work**: With a coordinator attached, periodic
//     metric refresh runs only while this participant holds leadership.

use crate::buffer::{EventLogger, SessionContext};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::coordinator::{Role, TabCoordinator};
use crate::core_modules::activity::{ActivityMonitor, ActivitySignal};
use crate::core_modules::nudge::{Activation, NudgeMachine, NudgeState, NudgeTrigger, TriggerScheduler};
use crate::error::Result;
use crate::events::{EventData, EventReason, EventType, MetricsDocument, SessionRecord};
use crate::metrics::{MetricsAggregator, session_duration_secs};
use crate::pipeline::{GazeDirection, GazeTransition, TransitionData};
use crate::store::EventStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now.timestamp_millis(), &suffix[..9])
}

/// The `attention:*` mirror of a camera transition.
fn attention_event_for(data: &TransitionData) -> (EventType, EventData) {
    match data.transition {
        GazeTransition::LookingAway { confidence, .. } => {
            let reason = match data.judgment.gaze_direction {
                GazeDirection::NoFaceDetected => EventReason::NoFace,
                GazeDirection::EyesClosed => EventReason::Pitch,
                _ => EventReason::Yaw,
            };
            let event_data = EventData {
                confidence: Some(confidence),
                ..EventData::with_reason(reason)
            };
            (EventType::AttentionLost, event_data)
        }
        GazeTransition::BackToScreen { confidence, .. } => {
            let event_data = EventData {
                attention_level: Some(confidence),
                confidence: Some(confidence),
                ..EventData::default()
            };
            (EventType::AttentionPresent, event_data)
        }
    }
}

struct Monitors {
    activity: ActivityMonitor,
    scheduler: TriggerScheduler,
    nudges: NudgeMachine,
    gaze_present: bool,
}

impl Monitors {
    fn new(config: &EngineConfig) -> Self {
        Self {
            activity: ActivityMonitor::new(&config.activity),
            scheduler: TriggerScheduler::new(&config.nudge),
            nudges: NudgeMachine::new(config.nudge.clone()),
            gaze_present: true,
        }
    }

    /// Forgets per-session state. Mute and cooldown carry over.
    fn reset(&mut self, config: &EngineConfig) {
        self.activity = ActivityMonitor::new(&config.activity);
        self.scheduler = TriggerScheduler::new(&config.nudge);
        self.gaze_present = true;
    }

    /// Combined presence; `None` outside a course.
    fn presence(&self) -> Option<bool> {
        self.activity.is_present().map(|active| active && self.gaze_present)
    }

    fn present(&self) -> bool {
        self.presence().unwrap_or(false)
    }

    fn evaluate(&mut self, now: DateTime<Utc>) -> Vec<Activation> {
        self.nudges.tick(now);
        let Some(present) = self.presence() else {
            return Vec::new();
        };
        let triggers: Vec<NudgeTrigger> = self.scheduler.observe(present, now);
        triggers
            .into_iter()
            .filter_map(|trigger| self.nudges.handle(trigger, now))
            .collect()
    }
}

/// The live attention state of a participant. Clones share the monitors, so
/// the session's ticker task and the host-facing calls see the same state.
#[derive(Clone)]
struct AttentionTracker {
    config: EngineConfig,
    clock: Clock,
    logger: EventLogger,
    monitors: Arc<Mutex<Monitors>>,
}

impl AttentionTracker {
    fn new(config: EngineConfig, clock: Clock, logger: EventLogger) -> Self {
        let monitors = Arc::new(Mutex::new(Monitors::new(&config)));
        Self {
            config,
            clock,
            logger,
            monitors,
        }
    }

    async fn reset(&self) {
        self.monitors.lock().await.reset(&self.config);
    }

    /// Applies a host signal. `attention:*` is written only when the combined
    /// presence flips, attributed to this signal.
    async fn handle_activity(&self, signal: ActivitySignal) -> Vec<Activation> {
        let now = self.clock.now();
        let (flip, activations) = {
            let mut monitors = self.monitors.lock().await;
            let before = monitors.present();
            let transition = monitors.activity.handle(signal, now);
            let flip = transition.filter(|_| monitors.present() != before);
            (flip, monitors.evaluate(now))
        };
        if let Some(transition) = flip {
            self.logger.log_activity_transition(&transition).await;
        }
        self.log_activations(&activations).await;
        activations
    }

    /// Applies a committed camera transition. `gaze:*` is always written;
    /// `attention:*` only when the combined presence flips.
    async fn handle_gaze(&self, data: &TransitionData) -> Vec<Activation> {
        let at = data.transition.at();
        let (flipped, activations) = {
            let mut monitors = self.monitors.lock().await;
            let before = monitors.present();
            monitors.gaze_present = matches!(data.transition, GazeTransition::BackToScreen { .. });
            (monitors.present() != before, monitors.evaluate(at))
        };
        self.logger.log_gaze_transition(&data.transition).await;
        if flipped {
            let (event_type, event_data) = attention_event_for(data);
            self.logger.log_event_at(event_type, event_data, at).await;
        }
        self.log_activations(&activations).await;
        activations
    }

    /// Runs the time-based nudge triggers and expires finished animations.
    async fn evaluate(&self) -> Vec<Activation> {
        let now = self.clock.now();
        let activations = self.monitors.lock().await.evaluate(now);
        self.log_activations(&activations).await;
        activations
    }

    async fn log_activations(&self, activations: &[Activation]) {
        for activation in activations {
            self.logger.log_nudge_shown(activation).await;
        }
    }

    /// Re-evaluates the triggers every `trigger_check_interval` and checks
    /// for idleness every `idle_check_interval`, until aborted.
    fn spawn_ticker(&self) -> JoinHandle<()> {
        let tracker = self.clone();
        let trigger_period = self.config.nudge.trigger_check_interval();
        let idle_period = self.config.activity.idle_check_interval();
        debug!("Session ticker every {:?}, idle check every {:?}", trigger_period, idle_period);
        tokio::spawn(async move {
            let origin = Instant::now();
            let mut triggers = tokio::time::interval_at(origin + trigger_period, trigger_period);
            let mut idle_checks = tokio::time::interval_at(origin + idle_period, idle_period);
            loop {
                tokio::select! {
                    _ = triggers.tick() => {
                        tracker.evaluate().await;
                    }
                    _ = idle_checks.tick() => {
                        tracker.handle_activity(ActivitySignal::Tick).await;
                    }
                }
            }
        })
    }
}

struct ActiveSession {
    record: SessionRecord,
    /// Drives idle checks and nudge triggers while the session runs.
    ticker: JoinHandle<()>,
    /// Follows leadership and starts/stops periodic metrics accordingly.
    leadership_watch: Option<JoinHandle<()>>,
}

pub struct SessionService {
    store: Arc<dyn EventStore>,
    clock: Clock,
    coordinator: Option<Arc<TabCoordinator>>,
    logger: EventLogger,
    metrics: MetricsAggregator,
    tracker: AttentionTracker,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionService {
    /// A standalone participant: it always does the background work itself.
    pub fn new(config: EngineConfig, store: Arc<dyn EventStore>, clock: Clock) -> Self {
        let logger = EventLogger::new(Arc::clone(&store), config.buffer.clone(), clock);
        Self::build(config, store, clock, None, logger)
    }

    pub fn with_coordinator(
        config: EngineConfig,
        store: Arc<dyn EventStore>,
        clock: Clock,
        coordinator: Arc<TabCoordinator>,
    ) -> Self {
        let logger = EventLogger::with_coordinator(
            Arc::clone(&store),
            config.buffer.clone(),
            clock,
            Arc::clone(&coordinator),
        );
        Self::build(config, store, clock, Some(coordinator), logger)
    }

    fn build(
        config: EngineConfig,
        store: Arc<dyn EventStore>,
        clock: Clock,
        coordinator: Option<Arc<TabCoordinator>>,
        logger: EventLogger,
    ) -> Self {
        let metrics = MetricsAggregator::new(Arc::clone(&store), config.metrics.clone(), clock);
        let tracker = AttentionTracker::new(config, clock, logger.clone());
        Self {
            store,
            clock,
            coordinator,
            logger,
            metrics,
            tracker,
            active: Mutex::new(None),
        }
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn coordinator(&self) -> Option<&Arc<TabCoordinator>> {
        self.coordinator.as_ref()
    }

    pub async fn active_session(&self) -> Option<SessionRecord> {
        self.active.lock().await.as_ref().map(|a| a.record.clone())
    }

    /// What the companion is showing right now.
    pub async fn nudge_state(&self) -> NudgeState {
        let now = self.clock.now();
        self.tracker.monitors.lock().await.nudges.state_at(now)
    }

    /// Opens a session, ending any session still active first.
    pub async fn start_session(
        &self,
        user_id: &str,
        course_id: Option<String>,
        subject: &str,
    ) -> Result<SessionRecord> {
        let already_active = self.active.lock().await.is_some();
        if already_active {
            self.end_session().await?;
        }

        let now = self.clock.now();
        let record = SessionRecord {
            session_id: generate_session_id(now),
            user_id: user_id.to_string(),
            course_id: course_id.clone(),
            subject: subject.to_string(),
            started_at: now,
            ended_at: None,
        };
        self.store.create_session(&record).await?;
        self.logger
            .set_session(SessionContext {
                session_id: record.session_id.clone(),
                user_id: record.user_id.clone(),
                course_id,
            })
            .await;
        self.logger.log_session_start(subject).await;
        if let Some(coordinator) = &self.coordinator {
            coordinator.notify_session_start(&record.session_id, subject);
        }

        self.tracker.reset().await;
        self.tracker.handle_activity(ActivitySignal::CourseEntered).await;
        let ticker = self.tracker.spawn_ticker();

        let leadership_watch = self.schedule_metrics(&record.session_id).await;
        *self.active.lock().await = Some(ActiveSession {
            record: record.clone(),
            ticker,
            leadership_watch,
        });
        info!("Session {} started ({})", record.session_id, subject);
        Ok(record)
    }

    async fn schedule_metrics(&self, session_id: &str) -> Option<JoinHandle<()>> {
        let Some(coordinator) = &self.coordinator else {
            self.metrics.start_periodic_updates(session_id).await;
            return None;
        };
        let mut leadership = coordinator.leadership();
        let metrics = self.metrics.clone();
        let session_id = session_id.to_string();
        Some(tokio::spawn(async move {
            loop {
                let leading = leadership.borrow_and_update().role == Role::Leader;
                let updating = metrics.is_updating().await;
                if leading && !updating {
                    metrics.start_periodic_updates(&session_id).await;
                } else if !leading && updating {
                    metrics.stop_periodic_updates().await;
                }
                if leadership.changed().await.is_err() {
                    break;
                }
            }
        }))
    }

    /// Closes the active session, flushes its log and writes its final
    /// metrics. Returns `None` when no session was active or the metrics
    /// could not be written.
    pub async fn end_session(&self) -> Result<Option<MetricsDocument>> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(None);
        };
        active.ticker.abort();
        if let Some(watch) = active.leadership_watch {
            watch.abort();
        }
        self.metrics.stop_periodic_updates().await;

        let record = active.record;
        let now = self.clock.now();
        let duration = session_duration_secs(&record, now);

        self.tracker.handle_activity(ActivitySignal::CourseExited).await;
        self.tracker.reset().await;
        self.logger.log_session_end(&record.subject, duration).await;
        self.logger.force_flush().await;
        self.logger.clear_session().await;
        if let Some(coordinator) = &self.coordinator {
            coordinator.notify_session_end(&record.session_id, &record.subject, duration);
        }

        self.store.end_session(&record.session_id, now).await?;
        let metrics = self.metrics.update_session_metrics(&record.session_id).await;
        info!("Session {} ended after {}s", record.session_id, duration);
        Ok(metrics)
    }

    /// Routes a host activity signal. Returns any nudge it set off.
    pub async fn handle_activity(&self, signal: ActivitySignal) -> Vec<Activation> {
        self.tracker.handle_activity(signal).await
    }

    /// Routes a committed camera transition.
    pub async fn handle_gaze(&self, data: &TransitionData) -> Vec<Activation> {
        self.tracker.handle_gaze(data).await
    }

    /// An immediate idle check and trigger evaluation, on top of what the
    /// session's own ticker does.
    pub async fn tick(&self) -> Vec<Activation> {
        self.tracker.handle_activity(ActivitySignal::Tick).await
    }

    /// Page visibility change. Hiding also forces the buffer out.
    pub async fn set_visibility(&self, hidden: bool) -> Vec<Activation> {
        if let Some(coordinator) = &self.coordinator {
            coordinator.notify_visibility(hidden);
        }
        let signal = if hidden {
            ActivitySignal::TabHidden
        } else {
            ActivitySignal::TabVisible
        };
        let activations = self.handle_activity(signal).await;
        if hidden {
            self.logger.force_flush().await;
        }
        activations
    }

    /// Flips the sound setting and records the change.
    pub async fn toggle_mute(&self) -> bool {
        let muted = self.tracker.monitors.lock().await.nudges.toggle_mute();
        self.logger
            .log_settings_changed("soundMuted", serde_json::Value::Bool(muted))
            .await;
        muted
    }

    /// Feeds detection output into the session until the sender side closes.
    pub async fn consume_transitions(&self, mut transitions: mpsc::UnboundedReceiver<TransitionData>) {
        while let Some(data) = transitions.recv().await {
            self.handle_gaze(&data).await;
        }
        debug!("Transition channel closed");
    }

    /// Ends the session and leaves the coordination channel.
    pub async fn shutdown(&self) -> Result<()> {
        self.end_session().await?;
        if let Some(coordinator) = &self.coordinator {
            coordinator.destroy();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::BroadcastBus;
    use crate::events::AttentionEvent;
    use crate::pipeline::GazeJudgment;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap()
    }

    fn service() -> (SessionService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let service = SessionService::new(EngineConfig::default(), store.clone(), Clock::starting_at(t0()));
        (service, store)
    }

    fn judgment(direction: GazeDirection, looking: bool) -> GazeJudgment {
        GazeJudgment {
            looking_at_screen: looking,
            confidence: if looking { 0.95 } else { 0.0 },
            gaze_direction: direction,
            ear_value: 0.3,
            gaze_ratio: None,
        }
    }

    fn away(at: DateTime<Utc>) -> TransitionData {
        TransitionData {
            transition: GazeTransition::LookingAway { at, gaze_duration_ms: 900, confidence: 0.0 },
            judgment: judgment(GazeDirection::NoFaceDetected, false),
        }
    }

    fn back(at: DateTime<Utc>) -> TransitionData {
        TransitionData {
            transition: GazeTransition::BackToScreen { at, lost_duration_ms: 10_000, confidence: 0.95 },
            judgment: judgment(GazeDirection::LookingStraight, true),
        }
    }

    fn of_type<'a>(events: &'a [AttentionEvent], event_type: EventType) -> Vec<&'a AttentionEvent> {
        events.iter().filter(|e| e.event_type == event_type).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn session_lifecycle_is_logged_and_measured() {
        let (service, store) = service();
        let record = service.start_session("user-1", Some("course-9".into()), "Chemistry").await.unwrap();
        assert!(record.session_id.starts_with("session_"));
        assert!(service.metrics().is_updating().await);

        tokio::time::sleep(Duration::from_secs(20)).await;
        let metrics = service.end_session().await.unwrap().unwrap();
        assert_eq!(metrics.total_session_time, 20);
        assert_eq!(metrics.focused_time, 20);
        assert!(!service.metrics().is_updating().await);
        assert!(service.logger().session().await.is_none());
        assert!(service.active_session().await.is_none());

        let events = store.get_events_by_session(&record.session_id).await.unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(
            types,
            vec![
                EventType::SessionStart,
                EventType::AttentionPresent,
                EventType::AttentionLost,
                EventType::SessionEnd,
            ]
        );
        assert_eq!(events[0].course_id.as_deref(), Some("course-9"));
        assert_eq!(events[3].data.duration, Some(20));
        let stored = store.get_session(&record.session_id).await.unwrap().unwrap();
        assert_eq!(stored.ended_at, Some(t0() + chrono::Duration::seconds(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn looking_away_nudges_and_coming_back_cheers() {
        let (service, store) = service();
        let record = service.start_session("user-1", None, "Math").await.unwrap();

        assert!(service.handle_gaze(&away(t0())).await.is_empty());
        // No manual ticks: the session's own ticker fires the triggers.
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(service.nudge_state().await, NudgeState::Nudge1);

        // The 10s trigger lands inside the cooldown of the first nudge.
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        service.handle_gaze(&back(t0() + chrono::Duration::seconds(10))).await;
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(service.nudge_state().await, NudgeState::Happy);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let metrics = service.end_session().await.unwrap().unwrap();
        let events = store.get_events_by_session(&record.session_id).await.unwrap();
        assert_eq!(of_type(&events, EventType::GazeLookingAway).len(), 1);
        assert_eq!(of_type(&events, EventType::GazeBackToScreen).len(), 1);
        assert_eq!(of_type(&events, EventType::Nudge1Shown).len(), 1);
        assert_eq!(of_type(&events, EventType::NudgeSoundPlayed).len(), 1);
        assert!(of_type(&events, EventType::Nudge2Shown).is_empty());
        let lost = of_type(&events, EventType::AttentionLost);
        assert_eq!(lost[0].data.reason, Some(EventReason::NoFace));
        assert_eq!(lost[0].timestamp, t0());

        assert_eq!(metrics.total_session_time, 13);
        assert_eq!(metrics.distracted_time, 10);
        assert_eq!(metrics.focused_time, 3);
        assert_eq!(metrics.nudge1_count, 1);
        assert_eq!(metrics.average_response_time, 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn presence_flips_once_across_blur_gaze_loss_and_refocus() {
        let (service, store) = service();
        let record = service.start_session("user-1", None, "History").await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        service.handle_activity(ActivitySignal::WindowBlur).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        // The face never comes back, so refocusing the window is not a recovery.
        service.handle_gaze(&away(t0() + chrono::Duration::seconds(6))).await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        service.handle_activity(ActivitySignal::WindowFocus).await;
        tokio::time::sleep(Duration::from_secs(20)).await;

        let metrics = service.end_session().await.unwrap().unwrap();
        let events = store.get_events_by_session(&record.session_id).await.unwrap();
        let lost = of_type(&events, EventType::AttentionLost);
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].data.reason, Some(EventReason::WindowBlur));
        assert_eq!(lost[0].timestamp, t0() + chrono::Duration::seconds(5));
        assert_eq!(of_type(&events, EventType::AttentionPresent).len(), 1);
        assert_eq!(of_type(&events, EventType::GazeLookingAway).len(), 1);

        assert_eq!(metrics.total_session_time, 30);
        assert_eq!(metrics.focused_time, 5);
        assert_eq!(metrics.distracted_time, 25);
        assert_eq!(metrics.attention_events.lost, 1);
        assert_eq!(metrics.attention_events.regained, 0);
        assert_eq!(metrics.nudge1_count, 1);
        assert_eq!(metrics.nudge2_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn an_idle_learner_is_lost_on_the_idle_check_cadence() {
        let (service, store) = service();
        let record = service.start_session("user-1", None, "Physics").await.unwrap();

        // Checks run at 30s, 60s and 90s; only the last is past the threshold.
        tokio::time::sleep(Duration::from_secs(89)).await;
        service.logger().force_flush().await;
        assert!(of_type(&store.get_events_by_session(&record.session_id).await.unwrap(), EventType::AttentionLost).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        service.end_session().await.unwrap();
        let events = store.get_events_by_session(&record.session_id).await.unwrap();
        let lost = of_type(&events, EventType::AttentionLost);
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].data.reason, Some(EventReason::TabNavigation));
        assert_eq!(lost[0].timestamp, t0() + chrono::Duration::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn muting_is_recorded_and_silences_nudges() {
        let (service, store) = service();
        let record = service.start_session("user-1", None, "Art").await.unwrap();
        assert!(service.toggle_mute().await);

        service.handle_activity(ActivitySignal::WindowBlur).await;
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(service.nudge_state().await, NudgeState::Nudge1);

        service.end_session().await.unwrap();
        let events = store.get_events_by_session(&record.session_id).await.unwrap();
        let settings = of_type(&events, EventType::SettingsChanged);
        assert_eq!(settings[0].data.setting_value, Some(serde_json::Value::Bool(true)));
        let shown = of_type(&events, EventType::Nudge1Shown);
        assert_eq!(shown[0].data.sound_played, Some(false));
        assert!(of_type(&events, EventType::NudgeSoundPlayed).is_empty());
        let lost = of_type(&events, EventType::AttentionLost);
        assert_eq!(lost[0].data.reason, Some(EventReason::WindowBlur));
    }

    #[tokio::test(start_paused = true)]
    async fn hiding_the_page_flushes_immediately() {
        let (service, store) = service();
        service.start_session("user-1", None, "Music").await.unwrap();
        assert_eq!(store.event_count().await, 0);

        service.set_visibility(true).await;
        assert_eq!(store.event_count().await, 3);
        assert_eq!(service.logger().buffer_status().await.event_count, 0);
        service.end_session().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_metrics_follow_leadership() {
        let config = EngineConfig::default();
        let bus = Arc::new(BroadcastBus::new("focus-test", 64));
        let clock = Clock::starting_at(t0());
        let coordinator = Arc::new(TabCoordinator::start_with_id("tab_1", &config.coordinator, bus, clock));
        let store = Arc::new(InMemoryStore::new());
        let service = SessionService::with_coordinator(config, store, clock, Arc::clone(&coordinator));

        service.start_session("user-1", None, "Biology").await.unwrap();
        assert!(!service.metrics().is_updating().await);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(coordinator.is_leader());
        assert!(service.metrics().is_updating().await);

        service.shutdown().await.unwrap();
        assert!(!service.metrics().is_updating().await);
        coordinator.join().await;
    }
}
