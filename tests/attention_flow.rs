use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use focus_engine::clock::Clock;
use focus_engine::config::EngineConfig;
use focus_engine::coordinator::{BroadcastBus, MessageBus, Role, TabCoordinator, TabMessage};
use focus_engine::core_modules::landmark::LandmarkFrame;
use focus_engine::core_modules::synthetic::{attentive_face, distracted_face};
use focus_engine::detection::{Camera, DetectionLoop, DetectionStatus, LandmarkModel, VideoFrame, VideoStream};
use focus_engine::events::EventType;
use focus_engine::session::SessionService;
use focus_engine::store::{EventStore, InMemoryStore};
use focus_engine::Result;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap()
}

struct Webcam;

struct WebcamStream;

#[async_trait]
impl VideoStream for WebcamStream {
    async fn next_frame(&self) -> Result<VideoFrame> {
        Ok(VideoFrame { width: 2, height: 2, data: Arc::from(vec![0u8; 12]) })
    }

    fn stop(&self) {}
}

#[async_trait]
impl Camera for Webcam {
    async fn acquire(&self) -> Result<Box<dyn VideoStream>> {
        Ok(Box::new(WebcamStream))
    }
}

struct Learner {
    face: Mutex<LandmarkFrame>,
}

impl Learner {
    fn look(&self, face: LandmarkFrame) {
        *self.face.lock().unwrap() = face;
    }
}

#[async_trait]
impl LandmarkModel for Learner {
    async fn detect(&self, _frame: &VideoFrame, _timestamp_ms: i64) -> Result<Vec<LandmarkFrame>> {
        Ok(vec![self.face.lock().unwrap().clone()])
    }
}

#[tokio::test(start_paused = true)]
async fn camera_distraction_ends_up_in_session_metrics() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = EngineConfig::default();
    let clock = Clock::starting_at(t0());
    let store = Arc::new(InMemoryStore::new());
    let service = Arc::new(SessionService::new(config.clone(), store.clone(), clock));
    let record = service.start_session("learner-7", Some("course-3".into()), "Geometry").await.unwrap();

    let learner = Arc::new(Learner { face: Mutex::new(attentive_face()) });
    let (tx, rx) = mpsc::unbounded_channel();
    let mut detection = DetectionLoop::start(&config, &Webcam, learner.clone(), clock, tx).await;
    assert_eq!(detection.status(), &DetectionStatus::Running);
    let consumer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.consume_transitions(rx).await })
    };

    // Attentive for 10s, looking away for 30s, attentive again for 20s. The
    // session's own ticker fires the nudges.
    for second in 1..=60 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match second {
            10 => learner.look(distracted_face()),
            40 => learner.look(attentive_face()),
            _ => {}
        }
    }

    detection.stop();
    detection.join().await;
    consumer.await.unwrap();
    let metrics = service.end_session().await.unwrap().unwrap();

    assert_eq!(metrics.total_session_time, 60);
    assert_eq!(metrics.focused_time + metrics.distracted_time, 60);
    // The loss commits after the grace period, the recovery immediately.
    assert!((28..=30).contains(&metrics.distracted_time), "{:?}", metrics);
    assert_eq!(metrics.nudge1_count, 1);
    assert_eq!(metrics.nudge2_count, 0);
    assert_eq!(metrics.attention_events.regained, 1);
    assert!(metrics.focus_percentage > 45.0 && metrics.focus_percentage < 55.0);

    let events = store.get_events_by_session(&record.session_id).await.unwrap();
    let count = |t: EventType| events.iter().filter(|e| e.event_type == t).count();
    assert_eq!(count(EventType::GazeLookingAway), 1);
    assert_eq!(count(EventType::GazeBackToScreen), 1);
    assert_eq!(count(EventType::SessionStart), 1);
    assert_eq!(count(EventType::SessionEnd), 1);
    assert!(events.iter().all(|e| e.course_id.as_deref() == Some("course-3")));

    // The cached document is exactly what a fresh replay yields.
    assert_eq!(store.get_metrics_by_session(&record.session_id).await.unwrap(), Some(metrics.clone()));
    assert_eq!(service.metrics().compute_metrics(&record.session_id).await.unwrap(), metrics);
}

#[tokio::test(start_paused = true)]
async fn racing_participants_settle_on_one_leader() {
    let config = EngineConfig::default();
    let clock = Clock::starting_at(t0());
    let bus = Arc::new(BroadcastBus::from_config(&config.coordinator));
    let shared: Arc<dyn MessageBus> = bus.clone();

    let b = TabCoordinator::start_with_id("tab_200_bbbbbbbbb", &config.coordinator, Arc::clone(&shared), clock);
    let a = TabCoordinator::start_with_id("tab_100_aaaaaaaaa", &config.coordinator, Arc::clone(&shared), clock);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(a.is_leader());
    assert!(!b.is_leader());
    assert_eq!(b.leadership().borrow().leader_id.as_deref(), Some("tab_100_aaaaaaaaa"));

    // Steady state: only the leader heartbeats.
    let mut inbox = bus.subscribe();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    let mut heartbeats = Vec::new();
    while let Ok(Some(message)) = tokio::time::timeout_at(deadline, inbox.next()).await {
        if let TabMessage::LeaderHeartbeat { tab_id, .. } = message {
            heartbeats.push(tab_id);
        }
    }
    assert!(heartbeats.len() >= 2);
    assert!(heartbeats.iter().all(|id| id == "tab_100_aaaaaaaaa"));

    // The follower takes over once the leader leaves.
    a.destroy();
    a.join().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(b.leadership().borrow().role, Role::Leader);

    b.destroy();
    b.join().await;
}
