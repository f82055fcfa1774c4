// THEORY:
// Several participants (browser tabs, windows, processes) can share one logical
// study session. Only one of them may own the timers, the heartbeats and the
// periodic metric refresh; the others observe. The coordinator elects that
// leader over a shared broadcast bus.
//
// Key architectural principles:
// 1.  **Sans-IO election**: `Election` is a plain state machine that consumes
//     received messages and returns the messages to publish. It never sleeps
//     and never touches the bus, which keeps the protocol testable without a
//     runtime.
// 2.  **Deterministic winner**: During the settle window every participant
//     collects the ids it hears. At the end the lowest id claims leadership.
//     Any leader that later hears a claim or heartbeat from a lower id steps
//     down, so two racing participants always converge on one leader.
// 3.  **Soft failure**: Publish errors are logged, never propagated. Losing the
//     leader (timeout or `tab_closing`) schedules a fresh election after a
//     short delay. Nothing about leadership is persisted.
//
// `TabCoordinator` is the async driver: one tokio task per participant that
// owns the `Election`, the bus subscription and all timers, and exposes the
// current leadership through a watch channel.

use crate::clock::Clock;
use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::events::EventType;
use futures::stream::{self, BoxStream, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const BUS_CAPACITY: usize = 256;
const TAB_ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Every message exchanged between participants of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TabMessage {
    LeaderElection { tab_id: String, timestamp: i64 },
    LeaderClaim { tab_id: String },
    LeaderHeartbeat { tab_id: String, timestamp: i64 },
    TabClosing { tab_id: String },
    SessionStart { tab_id: String, session_id: String, subject: String },
    SessionEnd { tab_id: String, session_id: String, subject: String, duration: u64 },
    EventLog { tab_id: String, session_id: String, event_type: EventType },
    TabHidden { tab_id: String },
    TabVisible { tab_id: String },
}

impl TabMessage {
    pub fn tab_id(&self) -> &str {
        match self {
            TabMessage::LeaderElection { tab_id, .. }
            | TabMessage::LeaderClaim { tab_id }
            | TabMessage::LeaderHeartbeat { tab_id, .. }
            | TabMessage::TabClosing { tab_id }
            | TabMessage::SessionStart { tab_id, .. }
            | TabMessage::SessionEnd { tab_id, .. }
            | TabMessage::EventLog { tab_id, .. }
            | TabMessage::TabHidden { tab_id }
            | TabMessage::TabVisible { tab_id } => tab_id,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A shared channel between participants. Publishers also receive their own
/// messages; receivers filter by `tab_id`.
pub trait MessageBus: Send + Sync {
    fn publish(&self, message: TabMessage) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, TabMessage>;
}

/// In-process bus over `tokio::sync::broadcast`.
#[derive(Clone)]
pub struct BroadcastBus {
    channel_name: String,
    tx: broadcast::Sender<TabMessage>,
}

impl BroadcastBus {
    pub fn new(channel_name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            channel_name: channel_name.into(),
            tx,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.channel_name.clone(), BUS_CAPACITY)
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }
}

impl MessageBus for BroadcastBus {
    fn publish(&self, message: TabMessage) -> Result<()> {
        if self.tx.send(message).is_err() {
            debug!("No subscribers on channel {}", self.channel_name);
        }
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, TabMessage> {
        let rx = self.tx.subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Coordination subscriber lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

/// `tab_<unix-millis>_<9 base36 chars>`; ids sort roughly by creation time.
pub fn generate_tab_id(now_ms: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TAB_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("tab_{}_{}", now_ms, suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Electing,
    Leader,
    Follower,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leadership {
    pub role: Role,
    pub leader_id: Option<String>,
}

/// Side effects requested by the election state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Publish(TabMessage),
    /// The current leader showed a sign of life.
    LeaderAlive,
    /// The current leader announced it is closing.
    LeaderGone,
    SteppedDown,
}

pub struct Election {
    tab_id: String,
    role: Role,
    candidates: BTreeSet<String>,
    leader_id: Option<String>,
}

impl Election {
    pub fn new(tab_id: impl Into<String>) -> Self {
        Self {
            tab_id: tab_id.into(),
            role: Role::Electing,
            candidates: BTreeSet::new(),
            leader_id: None,
        }
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn leader_id(&self) -> Option<&str> {
        self.leader_id.as_deref()
    }

    pub fn leadership(&self) -> Leadership {
        Leadership {
            role: self.role,
            leader_id: self.leader_id.clone(),
        }
    }

    /// Starts (or restarts) an election and returns the announcement.
    pub fn begin(&mut self, now_ms: i64) -> TabMessage {
        self.role = Role::Electing;
        self.leader_id = None;
        self.candidates.clear();
        self.candidates.insert(self.tab_id.clone());
        self.election_message(now_ms)
    }

    /// Ends the settle window. Returns the claim to publish if this
    /// participant won.
    pub fn settle(&mut self) -> Option<TabMessage> {
        if self.role != Role::Electing {
            return None;
        }
        let lowest = self.candidates.iter().next().cloned().unwrap_or_else(|| self.tab_id.clone());
        if lowest == self.tab_id {
            info!("Tab {} won the election among {} candidates", self.tab_id, self.candidates.len());
            self.role = Role::Leader;
            self.leader_id = Some(self.tab_id.clone());
            Some(TabMessage::LeaderClaim {
                tab_id: self.tab_id.clone(),
            })
        } else {
            info!("Tab {} follows {}", self.tab_id, lowest);
            self.role = Role::Follower;
            self.leader_id = Some(lowest);
            None
        }
    }

    pub fn heartbeat(&self, now_ms: i64) -> TabMessage {
        TabMessage::LeaderHeartbeat {
            tab_id: self.tab_id.clone(),
            timestamp: now_ms,
        }
    }

    pub fn observe(&mut self, message: &TabMessage, now_ms: i64) -> Vec<Action> {
        let from = message.tab_id();
        if from == self.tab_id {
            return Vec::new();
        }

        match (self.role, message) {
            (Role::Electing, TabMessage::LeaderElection { .. }) => {
                // Answer each newly heard participant once so it learns of us.
                if self.candidates.insert(from.to_string()) {
                    vec![Action::Publish(self.election_message(now_ms))]
                } else {
                    Vec::new()
                }
            }
            (Role::Electing, TabMessage::LeaderClaim { .. } | TabMessage::LeaderHeartbeat { .. }) => {
                self.candidates.insert(from.to_string());
                Vec::new()
            }
            (Role::Electing, TabMessage::TabClosing { .. }) => {
                self.candidates.remove(from);
                Vec::new()
            }
            (Role::Leader, TabMessage::LeaderElection { .. }) => vec![Action::Publish(self.heartbeat(now_ms))],
            (Role::Leader, TabMessage::LeaderClaim { .. } | TabMessage::LeaderHeartbeat { .. }) => {
                if from < self.tab_id.as_str() {
                    info!("Tab {} steps down in favour of {}", self.tab_id, from);
                    self.role = Role::Follower;
                    self.leader_id = Some(from.to_string());
                    vec![Action::SteppedDown, Action::LeaderAlive]
                } else {
                    vec![Action::Publish(self.heartbeat(now_ms))]
                }
            }
            (Role::Follower, TabMessage::LeaderClaim { .. } | TabMessage::LeaderHeartbeat { .. }) => {
                match self.leader_id.as_deref() {
                    Some(current) if from > current => Vec::new(),
                    _ => {
                        self.leader_id = Some(from.to_string());
                        vec![Action::LeaderAlive]
                    }
                }
            }
            (Role::Follower, TabMessage::TabClosing { .. }) if self.leader_id.as_deref() == Some(from) => {
                info!("Leader {} is closing", from);
                self.leader_id = None;
                vec![Action::LeaderGone]
            }
            (_, TabMessage::SessionStart { session_id, subject, .. }) => {
                debug!("Tab {} started session {} ({})", from, session_id, subject);
                Vec::new()
            }
            (_, TabMessage::SessionEnd { session_id, duration, .. }) => {
                debug!("Tab {} ended session {} after {}s", from, session_id, duration);
                Vec::new()
            }
            (_, TabMessage::EventLog { session_id, event_type, .. }) => {
                debug!("Tab {} logged {} for session {}", from, event_type, session_id);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn election_message(&self, now_ms: i64) -> TabMessage {
        TabMessage::LeaderElection {
            tab_id: self.tab_id.clone(),
            timestamp: now_ms,
        }
    }
}

pub struct TabCoordinator {
    tab_id: String,
    bus: Arc<dyn MessageBus>,
    leadership: watch::Receiver<Leadership>,
    cancel: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl TabCoordinator {
    /// Joins the channel under a freshly generated id. Must be called from
    /// within a tokio runtime.
    pub fn start(config: &CoordinatorConfig, bus: Arc<dyn MessageBus>, clock: Clock) -> Self {
        let tab_id = generate_tab_id(clock.now().timestamp_millis());
        Self::start_with_id(tab_id, config, bus, clock)
    }

    pub fn start_with_id(
        tab_id: impl Into<String>,
        config: &CoordinatorConfig,
        bus: Arc<dyn MessageBus>,
        clock: Clock,
    ) -> Self {
        let tab_id = tab_id.into();
        let election = Election::new(tab_id.clone());
        let (leadership_tx, leadership) = watch::channel(election.leadership());
        let (cancel, cancel_rx) = watch::channel(false);
        // Subscribe before announcing so no reply can be missed.
        let inbox = bus.subscribe();
        let driver = Driver {
            election,
            bus: Arc::clone(&bus),
            clock,
            settle_delay: config.settle_delay(),
            heartbeat_interval: config.heartbeat_interval(),
            leader_timeout: config.leader_timeout(),
            reelection_delay: config.reelection_delay(),
            leadership_tx,
        };
        let handle = tokio::spawn(driver.run(inbox, cancel_rx));
        info!("Tab {} joined channel", tab_id);

        Self {
            tab_id,
            bus,
            leadership,
            cancel,
            handle: Mutex::new(Some(handle)),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn is_leader(&self) -> bool {
        !self.destroyed.load(Ordering::SeqCst) && self.leadership.borrow().role == Role::Leader
    }

    pub fn leadership(&self) -> watch::Receiver<Leadership> {
        self.leadership.clone()
    }

    pub fn notify_session_start(&self, session_id: &str, subject: &str) {
        self.publish_as_leader(TabMessage::SessionStart {
            tab_id: self.tab_id.clone(),
            session_id: session_id.to_string(),
            subject: subject.to_string(),
        });
    }

    pub fn notify_session_end(&self, session_id: &str, subject: &str, duration_secs: u64) {
        self.publish_as_leader(TabMessage::SessionEnd {
            tab_id: self.tab_id.clone(),
            session_id: session_id.to_string(),
            subject: subject.to_string(),
            duration: duration_secs,
        });
    }

    pub fn notify_event_log(&self, session_id: &str, event_type: &EventType) {
        self.publish_as_leader(TabMessage::EventLog {
            tab_id: self.tab_id.clone(),
            session_id: session_id.to_string(),
            event_type: event_type.clone(),
        });
    }

    /// Visibility notices are informational and sent by every participant.
    pub fn notify_visibility(&self, hidden: bool) {
        let tab_id = self.tab_id.clone();
        let message = if hidden {
            TabMessage::TabHidden { tab_id }
        } else {
            TabMessage::TabVisible { tab_id }
        };
        publish(self.bus.as_ref(), message);
    }

    /// Announces departure and stops all timers. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        publish(
            self.bus.as_ref(),
            TabMessage::TabClosing {
                tab_id: self.tab_id.clone(),
            },
        );
        let _ = self.cancel.send(true);
        info!("Tab {} left channel", self.tab_id);
    }

    /// Waits for the coordinator task to finish after `destroy`.
    pub async fn join(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Coordinator task ended abnormally: {}", e);
            }
        }
    }

    fn publish_as_leader(&self, message: TabMessage) {
        if self.is_leader() {
            publish(self.bus.as_ref(), message);
        } else {
            debug!("Tab {} is not leader, not broadcasting {:?}", self.tab_id, message);
        }
    }
}

impl Drop for TabCoordinator {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

fn publish(bus: &dyn MessageBus, message: TabMessage) {
    if let Err(e) = bus.publish(message) {
        warn!("Failed to publish coordination message: {}", e);
    }
}

struct Driver {
    election: Election,
    bus: Arc<dyn MessageBus>,
    clock: Clock,
    settle_delay: Duration,
    heartbeat_interval: Duration,
    leader_timeout: Duration,
    reelection_delay: Duration,
    leadership_tx: watch::Sender<Leadership>,
}

impl Driver {
    async fn run(mut self, mut inbox: BoxStream<'static, TabMessage>, mut cancel: watch::Receiver<bool>) {
        let idle = Duration::from_secs(24 * 60 * 60);

        let now_ms = self.now_ms();
        publish(self.bus.as_ref(), self.election.begin(now_ms));
        let mut settle_at = Some(Instant::now() + self.settle_delay);
        let mut next_heartbeat: Option<Instant> = None;
        let mut last_leader_seen = Instant::now();
        let mut reelect_at: Option<Instant> = None;

        loop {
            let role = self.election.role();
            let far = Instant::now() + idle;
            tokio::select! {
                _ = cancel.changed() => break,
                message = inbox.next() => {
                    let Some(message) = message else {
                        warn!("Coordination channel closed");
                        break;
                    };
                    let now_ms = self.now_ms();
                    for action in self.election.observe(&message, now_ms) {
                        match action {
                            Action::Publish(reply) => publish(self.bus.as_ref(), reply),
                            Action::LeaderAlive => last_leader_seen = Instant::now(),
                            Action::LeaderGone => reelect_at = Some(Instant::now() + self.reelection_delay),
                            Action::SteppedDown => next_heartbeat = None,
                        }
                    }
                }
                _ = tokio::time::sleep_until(settle_at.unwrap_or(far)), if settle_at.is_some() => {
                    settle_at = None;
                    match self.election.settle() {
                        Some(claim) => {
                            publish(self.bus.as_ref(), claim);
                            next_heartbeat = Some(Instant::now() + self.heartbeat_interval);
                        }
                        None => last_leader_seen = Instant::now(),
                    }
                }
                _ = tokio::time::sleep_until(next_heartbeat.unwrap_or(far)), if role == Role::Leader && next_heartbeat.is_some() => {
                    publish(self.bus.as_ref(), self.election.heartbeat(self.now_ms()));
                    next_heartbeat = Some(Instant::now() + self.heartbeat_interval);
                }
                _ = tokio::time::sleep_until(last_leader_seen + self.leader_timeout), if role == Role::Follower && reelect_at.is_none() => {
                    warn!("No heartbeat from leader for {:?}, re-electing", self.leader_timeout);
                    reelect_at = Some(Instant::now() + self.reelection_delay);
                }
                _ = tokio::time::sleep_until(reelect_at.unwrap_or(far)), if reelect_at.is_some() => {
                    reelect_at = None;
                    next_heartbeat = None;
                    let now_ms = self.now_ms();
                    publish(self.bus.as_ref(), self.election.begin(now_ms));
                    settle_at = Some(Instant::now() + self.settle_delay);
                }
            }

            let current = self.election.leadership();
            self.leadership_tx.send_if_modified(|view| {
                if *view != current {
                    *view = current;
                    true
                } else {
                    false
                }
            });
        }
        debug!("Coordinator task for {} finished", self.election.tab_id());
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    const A: &str = "tab_1000_aaaaaaaaa";
    const B: &str = "tab_2000_bbbbbbbbb";

    fn drain(inbox: &mut BoxStream<'static, TabMessage>) -> Vec<TabMessage> {
        let mut out = Vec::new();
        while let Some(Some(message)) = inbox.next().now_or_never() {
            out.push(message);
        }
        out
    }

    #[test]
    fn messages_serialize_with_a_snake_case_type_tag() {
        let json = TabMessage::LeaderHeartbeat { tab_id: A.into(), timestamp: 5 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"leader_heartbeat","tabId":"tab_1000_aaaaaaaaa","timestamp":5}"#);

        let parsed = TabMessage::from_json(
            r#"{"type":"event_log","tabId":"t","sessionId":"s","eventType":"nudge1:shown"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            TabMessage::EventLog { tab_id: "t".into(), session_id: "s".into(), event_type: EventType::Nudge1Shown }
        );
    }

    #[test]
    fn tab_ids_carry_time_and_a_random_suffix() {
        let id = generate_tab_id(1_700_000_000_000);
        let suffix = id.strip_prefix("tab_1700000000000_").expect("prefix");
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn lowest_candidate_wins_the_settle() {
        let mut a = Election::new(A);
        let mut b = Election::new(B);
        let from_a = a.begin(0);
        let from_b = b.begin(0);

        assert_eq!(a.observe(&from_b, 1).len(), 1);
        assert_eq!(b.observe(&from_a, 1).len(), 1);
        // Hearing a known candidate again does not trigger another reply.
        assert!(a.observe(&from_b, 2).is_empty());

        assert!(matches!(a.settle(), Some(TabMessage::LeaderClaim { .. })));
        assert!(b.settle().is_none());
        assert_eq!(a.role(), Role::Leader);
        assert_eq!(b.role(), Role::Follower);
        assert_eq!(b.leader_id(), Some(A));
    }

    #[test]
    fn a_leader_steps_down_for_a_lower_id_and_reasserts_against_a_higher_one() {
        let mut b = Election::new(B);
        b.begin(0);
        b.settle();
        assert_eq!(b.role(), Role::Leader);

        let higher = TabMessage::LeaderHeartbeat { tab_id: "tab_3000_ccccccccc".into(), timestamp: 0 };
        assert!(matches!(b.observe(&higher, 1).as_slice(), [Action::Publish(TabMessage::LeaderHeartbeat { .. })]));

        let lower = TabMessage::LeaderClaim { tab_id: A.into() };
        assert_eq!(b.observe(&lower, 2), vec![Action::SteppedDown, Action::LeaderAlive]);
        assert_eq!(b.leadership(), Leadership { role: Role::Follower, leader_id: Some(A.into()) });
    }

    #[test]
    fn followers_notice_the_leader_closing() {
        let mut b = Election::new(B);
        b.begin(0);
        b.observe(&TabMessage::LeaderClaim { tab_id: A.into() }, 0);
        b.settle();
        assert_eq!(b.observe(&TabMessage::TabClosing { tab_id: "tab_9_x".into() }, 1), vec![]);
        assert_eq!(b.observe(&TabMessage::TabClosing { tab_id: A.into() }, 1), vec![Action::LeaderGone]);
        assert_eq!(b.leader_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn two_racing_participants_converge_on_one_heartbeat_source() {
        let config = CoordinatorConfig::default();
        let bus: Arc<dyn MessageBus> = Arc::new(BroadcastBus::from_config(&config));
        let mut spy = bus.subscribe();

        let b = TabCoordinator::start_with_id(B, &config, Arc::clone(&bus), Clock::new());
        let a = TabCoordinator::start_with_id(A, &config, Arc::clone(&bus), Clock::new());

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(a.is_leader());
        assert!(!b.is_leader());
        drain(&mut spy);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let heartbeats: Vec<_> = drain(&mut spy)
            .into_iter()
            .filter(|m| matches!(m, TabMessage::LeaderHeartbeat { .. }))
            .collect();
        assert!(heartbeats.len() >= 5);
        assert!(heartbeats.iter().all(|m| m.tab_id() == A));

        a.destroy();
        b.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn follower_takes_over_when_the_leader_closes() {
        let config = CoordinatorConfig::default();
        let bus: Arc<dyn MessageBus> = Arc::new(BroadcastBus::from_config(&config));
        let a = TabCoordinator::start_with_id(A, &config, Arc::clone(&bus), Clock::new());
        let b = TabCoordinator::start_with_id(B, &config, Arc::clone(&bus), Clock::new());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(a.is_leader());

        a.destroy();
        assert!(!a.is_leader());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(b.is_leader());
        b.destroy();
        a.join().await;
        b.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_leader_is_replaced_after_the_timeout() {
        let config = CoordinatorConfig::default();
        let bus: Arc<dyn MessageBus> = Arc::new(BroadcastBus::from_config(&config));
        let b = TabCoordinator::start_with_id(B, &config, Arc::clone(&bus), Clock::new());
        // A phantom leader that heartbeats once and then goes silent.
        bus.publish(TabMessage::LeaderHeartbeat { tab_id: A.into(), timestamp: 0 }).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(b.leadership().borrow().leader_id.as_deref(), Some(A));
        assert!(!b.is_leader());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(b.is_leader());
        b.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_leader_broadcasts_session_notices() {
        let config = CoordinatorConfig::default();
        let bus: Arc<dyn MessageBus> = Arc::new(BroadcastBus::from_config(&config));
        let mut spy = bus.subscribe();
        let a = TabCoordinator::start_with_id(A, &config, Arc::clone(&bus), Clock::new());
        let b = TabCoordinator::start_with_id(B, &config, Arc::clone(&bus), Clock::new());
        tokio::time::sleep(Duration::from_secs(2)).await;
        drain(&mut spy);

        b.notify_session_start("s1", "Biology");
        a.notify_session_start("s1", "Biology");
        a.notify_event_log("s1", &EventType::AttentionLost);
        b.notify_visibility(true);

        let notices: Vec<_> = drain(&mut spy)
            .into_iter()
            .filter(|m| !matches!(m, TabMessage::LeaderHeartbeat { .. }))
            .collect();
        assert_eq!(notices.len(), 3);
        assert!(matches!(&notices[0], TabMessage::SessionStart { tab_id, .. } if tab_id == A));
        assert!(matches!(&notices[1], TabMessage::EventLog { .. }));
        assert!(matches!(&notices[2], TabMessage::TabHidden { tab_id } if tab_id == B));
        a.destroy();
        b.destroy();
    }
}
