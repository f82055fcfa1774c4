// THEORY:
// The `MetricsAggregator` is the analytical end of the engine. The event log is
// the source of truth; a `MetricsDocument` is only a cache that can be thrown
// away and recomputed at any time by replaying the log.
//
// Replay model:
// 1.  **Two-state timeline**: the learner is assumed focused at session start.
//     Every interval between consecutive events (and from the last event to the
//     session end) is credited to the state that held during it, so focused and
//     distracted time always add up to the session length.
// 2.  **Discrete counters**: nudges, attention transitions and response times
//     are counted as the events are walked.
// 3.  **Lenient input**: unknown event types, events outside the session window
//     and repeated event ids are skipped rather than failing the replay.
//
// Replay is a pure function of (session bounds, events, now). The async
// aggregator around it only fetches, upserts and schedules.

use crate::clock::Clock;
use crate::config::MetricsConfig;
use crate::error::{FocusError, Result};
use crate::events::{
    AttentionCounts, AttentionEvent, EventType, FocusPoint, HourlyBucket, MetricsDocument, SessionRecord,
};
use crate::store::EventStore;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The wall-clock hour an instant falls in, distinct across days.
fn hour_slot(at: DateTime<Utc>) -> (NaiveDate, u32) {
    (at.date_naive(), at.hour())
}

fn percentage(part_ms: i64, whole_ms: i64) -> f64 {
    if whole_ms <= 0 {
        return 0.0;
    }
    (part_ms as f64 / whole_ms as f64 * 100.0).clamp(0.0, 100.0)
}

/// Replays one session's log into a metrics document (recommendations
/// included). `now` closes an open session.
pub fn replay(
    session: &SessionRecord,
    events: &[AttentionEvent],
    now: DateTime<Utc>,
    config: &MetricsConfig,
) -> MetricsDocument {
    let start = session.started_at;
    let end = session.ended_at.unwrap_or(now).max(start);
    let total_ms = (end - start).num_milliseconds();

    // Stage 1: Keep well-formed, in-window, first-seen events in time order.
    let mut seen = HashSet::new();
    let mut timeline: Vec<&AttentionEvent> = events
        .iter()
        .filter(|e| e.event_type.is_known())
        .filter(|e| e.timestamp >= start && e.timestamp <= end)
        .filter(|e| seen.insert(e.id))
        .collect();
    timeline.sort_by_key(|e| e.timestamp);
    let skipped = events.len() - timeline.len();
    if skipped > 0 {
        debug!("Replay of {} skipped {} events", session.session_id, skipped);
    }

    // Stage 2: Walk the timeline.
    let mut focused_ms: i64 = 0;
    let mut distracted_ms: i64 = 0;
    let mut is_focused = true;
    let mut last_at = start;
    let mut last_nudge_at: Option<DateTime<Utc>> = None;
    let mut current_slot = hour_slot(start);
    let mut counts = AttentionCounts::default();
    let (mut nudge1_count, mut nudge2_count) = (0u32, 0u32);
    let mut response_times: Vec<f64> = Vec::new();
    let mut focus_history: Vec<FocusPoint> = Vec::new();
    let mut hourly_breakdown: Vec<HourlyBucket> = Vec::new();

    for event in timeline {
        let elapsed = (event.timestamp - last_at).num_milliseconds();
        if is_focused {
            focused_ms += elapsed;
        } else {
            distracted_ms += elapsed;
        }

        let slot = hour_slot(event.timestamp);
        if slot != current_slot {
            hourly_breakdown.push(HourlyBucket {
                hour: current_slot.1,
                focus_percentage: round2(percentage(focused_ms, (event.timestamp - start).num_milliseconds())),
                nudge_count: nudge1_count + nudge2_count,
            });
            current_slot = slot;
        }

        match event.event_type {
            EventType::AttentionPresent => {
                counts.present += 1;
                if !is_focused {
                    if let Some(nudged_at) = last_nudge_at {
                        let response = (event.timestamp - nudged_at).num_seconds();
                        if response > 0 {
                            response_times.push(response as f64);
                        }
                    }
                    counts.regained += 1;
                }
                is_focused = true;
                focus_history.push(FocusPoint {
                    timestamp: event.timestamp,
                    focus_level: event.data.attention_level.unwrap_or(1.0),
                });
            }
            EventType::AttentionLost => {
                counts.lost += 1;
                is_focused = false;
                focus_history.push(FocusPoint {
                    timestamp: event.timestamp,
                    focus_level: 0.0,
                });
            }
            EventType::Nudge1Shown => {
                nudge1_count += 1;
                last_nudge_at = Some(event.timestamp);
            }
            EventType::Nudge2Shown => {
                nudge2_count += 1;
                last_nudge_at = Some(event.timestamp);
            }
            EventType::FocusRegained => {
                if let Some(response) = event.data.response_time {
                    response_times.push(response);
                }
            }
            _ => {}
        }
        last_at = event.timestamp;
    }

    // Stage 3: Credit the tail and close the last hour.
    let tail = (end - last_at).num_milliseconds();
    if is_focused {
        focused_ms += tail;
    } else {
        distracted_ms += tail;
    }
    debug_assert_eq!(focused_ms + distracted_ms, total_ms);
    hourly_breakdown.push(HourlyBucket {
        hour: current_slot.1,
        focus_percentage: round2(percentage(focused_ms, total_ms)),
        nudge_count: nudge1_count + nudge2_count,
    });

    // Stage 4: Whole seconds. Distracted time absorbs the rounding so the
    // two parts always sum to the total.
    let total_session_time = total_ms / 1000;
    let focused_time = (focused_ms / 1000).min(total_session_time);
    let distracted_time = total_session_time - focused_time;
    let focus_percentage = if total_session_time > 0 {
        (focused_time as f64 / total_session_time as f64 * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let average_response_time = if response_times.is_empty() {
        0.0
    } else {
        response_times.iter().sum::<f64>() / response_times.len() as f64
    };

    let history_start = focus_history.len().saturating_sub(config.focus_history_limit);
    let focus_history = focus_history.split_off(history_start);

    let mut metrics = MetricsDocument {
        session_id: session.session_id.clone(),
        user_id: session.user_id.clone(),
        course_id: session.course_id.clone(),
        session_start_time: start,
        session_end_time: session.ended_at,
        focus_percentage: round2(focus_percentage),
        total_nudges: nudge1_count + nudge2_count,
        nudge1_count,
        nudge2_count,
        average_response_time: round2(average_response_time),
        total_session_time,
        focused_time,
        distracted_time,
        attention_events: counts,
        focus_history,
        hourly_breakdown,
        recommendations: Vec::new(),
    };
    metrics.recommendations = recommendations(&metrics, config);
    metrics
}

/// Like `replay`, over raw stored documents. Documents that do not parse as
/// events (missing timestamp, wrong shape) are skipped.
pub fn replay_documents(
    session: &SessionRecord,
    documents: &[serde_json::Value],
    now: DateTime<Utc>,
    config: &MetricsConfig,
) -> MetricsDocument {
    let events: Vec<AttentionEvent> = documents
        .iter()
        .filter_map(|doc| match serde_json::from_value::<AttentionEvent>(doc.clone()) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Skipping malformed event document: {}", e);
                None
            }
        })
        .collect();
    replay(session, &events, now, config)
}

/// Advisory, human-readable suggestions derived from one session's metrics.
pub fn recommendations(metrics: &MetricsDocument, config: &MetricsConfig) -> Vec<String> {
    let mut out = Vec::new();

    if metrics.focus_percentage < config.low_focus_percentage {
        out.push("Focus was low this session; consider more frequent breaks or a quieter study environment.".to_string());
    }
    if metrics.total_nudges > config.high_nudge_count {
        out.push("Many reminders were needed; check the study environment for distractions.".to_string());
    }
    if metrics.average_response_time > config.slow_response_secs {
        out.push("Reminders took a long time to take effect; consider adjusting reminder sensitivity.".to_string());
    }
    if metrics.nudge2_count > metrics.nudge1_count {
        out.push("Strong reminders outnumbered gentle ones; consider adjusting task difficulty.".to_string());
    }

    let low_hours: Vec<String> = metrics
        .hourly_breakdown
        .iter()
        .filter(|h| h.focus_percentage < config.low_focus_hour_percentage)
        .map(|h| format!("{:02}:00", h.hour))
        .collect();
    if !low_hours.is_empty() {
        out.push(format!(
            "Focus dipped around {} (UTC); consider studying at a different time.",
            low_hours.join(", ")
        ));
    }
    out
}

/// Summary over many sessions, e.g. for a dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_sessions: usize,
    pub average_focus_percentage: f64,
    pub total_nudges: u32,
    /// Minutes, rounded.
    pub average_session_duration: i64,
    /// Empty when there were no sessions.
    pub most_distracted_subject: String,
    /// Mean focus of the later half minus the earlier half, in points.
    pub improvement_trend: f64,
}

/// Summarises `(session, metrics)` pairs, optionally restricted to sessions
/// that started within `range`.
pub fn overall_stats(
    sessions: &[(SessionRecord, MetricsDocument)],
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> OverallStats {
    let mut selected: Vec<&(SessionRecord, MetricsDocument)> = sessions
        .iter()
        .filter(|(s, _)| match range {
            Some((from, to)) => s.started_at >= from && s.started_at <= to,
            None => true,
        })
        .collect();
    if selected.is_empty() {
        return OverallStats::default();
    }
    selected.sort_by_key(|(s, _)| s.started_at);

    let total_sessions = selected.len();
    let total_focus: f64 = selected.iter().map(|(_, m)| m.focus_percentage).sum();
    let total_nudges: u32 = selected.iter().map(|(_, m)| m.total_nudges).sum();
    let total_duration: i64 = selected.iter().map(|(_, m)| m.total_session_time).sum();

    let mut by_subject: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for (session, metrics) in &selected {
        let entry = by_subject.entry(session.subject.as_str()).or_default();
        entry.0 += 1;
        entry.1 += metrics.total_nudges;
    }
    let mut most_distracted_subject = String::new();
    let mut worst_rate = f64::MIN;
    for (subject, (count, nudges)) in &by_subject {
        let rate = *nudges as f64 / *count as f64;
        if rate > worst_rate {
            worst_rate = rate;
            most_distracted_subject = subject.to_string();
        }
    }

    let half = total_sessions / 2;
    let mean = |slice: &[&(SessionRecord, MetricsDocument)]| {
        slice.iter().map(|(_, m)| m.focus_percentage).sum::<f64>() / slice.len() as f64
    };
    let improvement_trend = if half > 0 && total_sessions - half > 0 {
        round2(mean(&selected[half..]) - mean(&selected[..half]))
    } else {
        0.0
    };

    OverallStats {
        total_sessions,
        average_focus_percentage: round2(total_focus / total_sessions as f64),
        total_nudges,
        average_session_duration: (total_duration as f64 / total_sessions as f64 / 60.0).round() as i64,
        most_distracted_subject,
        improvement_trend,
    }
}

/// Store-backed aggregator. Clones share the periodic-update task.
#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn EventStore>,
    config: MetricsConfig,
    clock: Clock,
    periodic: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn EventStore>, config: MetricsConfig, clock: Clock) -> Self {
        Self {
            store,
            config,
            clock,
            periodic: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn compute_metrics(&self, session_id: &str) -> Result<MetricsDocument> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| FocusError::SessionNotFound(session_id.to_string()))?;
        let events = self.store.get_events_by_session(session_id).await?;
        Ok(replay(&session, &events, self.clock.now(), &self.config))
    }

    /// Recomputes and upserts the session's metrics document.
    pub async fn try_update_session_metrics(&self, session_id: &str) -> Result<MetricsDocument> {
        let metrics = self.compute_metrics(session_id).await?;
        match self.store.get_metrics_by_session(session_id).await? {
            Some(_) => self.store.update_metrics(&metrics).await?,
            None => self.store.create_metrics(&metrics).await?,
        }
        debug!("Updated metrics for session {}: {}% focused", session_id, metrics.focus_percentage);
        Ok(metrics)
    }

    /// Like `try_update_session_metrics`, but failures are only logged.
    pub async fn update_session_metrics(&self, session_id: &str) -> Option<MetricsDocument> {
        match self.try_update_session_metrics(session_id).await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                error!("Failed to update metrics for session {}: {}", session_id, e);
                None
            }
        }
    }

    /// Recomputes every `update_interval` until stopped. Replaces any
    /// previously running schedule.
    pub async fn start_periodic_updates(&self, session_id: &str) {
        let mut slot = self.periodic.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let aggregator = self.clone();
        let session_id = session_id.to_string();
        let period = self.config.update_interval();
        info!("Periodic metrics every {:?} for session {}", period, session_id);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                aggregator.update_session_metrics(&session_id).await;
            }
        }));
    }

    pub async fn stop_periodic_updates(&self) {
        if let Some(handle) = self.periodic.lock().await.take() {
            handle.abort();
            debug!("Periodic metrics stopped");
        }
    }

    pub async fn is_updating(&self) -> bool {
        self.periodic.lock().await.is_some()
    }

    /// Loads the bounds and cached metrics of the given sessions and
    /// summarises them. Sessions without metrics are left out.
    pub async fn overall_stats_for(
        &self,
        session_ids: &[String],
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<OverallStats> {
        let mut pairs = Vec::with_capacity(session_ids.len());
        for id in session_ids {
            if let (Some(session), Some(metrics)) =
                (self.store.get_session(id).await?, self.store.get_metrics_by_session(id).await?)
            {
                pairs.push((session, metrics));
            }
        }
        Ok(overall_stats(&pairs, range))
    }
}

/// Length of a session up to `now`, in whole seconds.
pub fn session_duration_secs(session: &SessionRecord, now: DateTime<Utc>) -> u64 {
    let end = session.ended_at.unwrap_or(now);
    (end - session.started_at).max(Duration::zero()).num_seconds() as u64
}
