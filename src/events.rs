// THEORY:
// The `events` module defines the persisted vocabulary of the engine: the
// immutable `AttentionEvent` log, the `SessionRecord` that bounds it, and the
// derived `MetricsDocument` cache.
//
// Key architectural principles:
// 1.  **Append-only facts**: An `AttentionEvent` is created once, buffered,
//     flushed, and never mutated. Everything else (metrics, trends) is
//     recomputed from the log.
// 2.  **Idempotency key**: Each event receives a UUID at creation time. Retried
//     flushes may write an event twice; the id lets the store and the
//     aggregator collapse such duplicates.
// 3.  **Forward compatibility**: Event types are open-ended strings on the wire.
//     Unrecognised types survive deserialization as `EventType::Unknown` and are
//     skipped by the aggregator instead of failing the whole log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

/// Every kind of fact the engine (or its host UI) records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    AttentionPresent,
    AttentionLost,
    GazeLookingAway,
    GazeBackToScreen,
    Nudge1Shown,
    Nudge2Shown,
    NudgeSoundPlayed,
    FocusRegained,
    SessionStart,
    SessionEnd,
    KoalaDragged,
    KoalaClicked,
    SettingsChanged,
    /// A type written by a newer producer; kept verbatim.
    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::AttentionPresent => "attention:present",
            EventType::AttentionLost => "attention:lost",
            EventType::GazeLookingAway => "gaze:looking_away",
            EventType::GazeBackToScreen => "gaze:back_to_screen",
            EventType::Nudge1Shown => "nudge1:shown",
            EventType::Nudge2Shown => "nudge2:shown",
            EventType::NudgeSoundPlayed => "nudge:sound_played",
            EventType::FocusRegained => "focus:regained",
            EventType::SessionStart => "session:start",
            EventType::SessionEnd => "session:end",
            EventType::KoalaDragged => "koala:dragged",
            EventType::KoalaClicked => "koala:clicked",
            EventType::SettingsChanged => "settings:changed",
            EventType::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "attention:present" => EventType::AttentionPresent,
            "attention:lost" => EventType::AttentionLost,
            "gaze:looking_away" => EventType::GazeLookingAway,
            "gaze:back_to_screen" => EventType::GazeBackToScreen,
            "nudge1:shown" => EventType::Nudge1Shown,
            "nudge2:shown" => EventType::Nudge2Shown,
            "nudge:sound_played" => EventType::NudgeSoundPlayed,
            "focus:regained" => EventType::FocusRegained,
            "session:start" => EventType::SessionStart,
            "session:end" => EventType::SessionEnd,
            "koala:dragged" => EventType::KoalaDragged,
            "koala:clicked" => EventType::KoalaClicked,
            "settings:changed" => EventType::SettingsChanged,
            other => EventType::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Unknown(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventType::parse(&raw))
    }
}

/// Why an attention transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventReason {
    NoFace,
    Yaw,
    Pitch,
    TabHidden,
    TabVisible,
    WindowBlur,
    WindowFocus,
    CourseFocus,
    CourseExit,
    TabNavigation,
    /// A reason this version does not know, e.g. from an older producer.
    /// Read-only; never written by the engine.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeKind {
    Nudge1,
    Nudge2,
}

/// Optional payload attached to an event. Absent fields are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EventReason>,
    /// Attention level in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_level: Option<f64>,
    /// Gaze confidence in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Dwell time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_type: Option<NudgeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_played: Option<bool>,
    /// Response time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Session duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl EventData {
    pub fn with_reason(reason: EventReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::default()
        }
    }
}

/// One immutable entry of a session's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionEvent {
    pub id: Uuid,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub session_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: EventData,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl AttentionEvent {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        data: EventData,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            session_id: session_id.into(),
            user_id: user_id.into(),
            course_id: None,
            event_type,
            timestamp,
            data,
        }
    }

    pub fn with_course(mut self, course_id: Option<String>) -> Self {
        self.course_id = course_id;
        self
    }
}

/// The bounds of one study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub subject: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionCounts {
    pub present: u32,
    pub lost: u32,
    pub regained: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusPoint {
    pub timestamp: DateTime<Utc>,
    pub focus_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    /// Wall-clock hour (0-23, UTC) the bucket covers.
    pub hour: u32,
    pub focus_percentage: f64,
    /// Cumulative nudge count at the end of the bucket.
    pub nudge_count: u32,
}

/// Materialized statistics for one session; always recomputable from its log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDocument {
    pub session_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub session_start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_end_time: Option<DateTime<Utc>>,
    /// 0-100, rounded to two decimals.
    pub focus_percentage: f64,
    pub total_nudges: u32,
    pub nudge1_count: u32,
    pub nudge2_count: u32,
    /// Seconds, rounded to two decimals.
    pub average_response_time: f64,
    /// Seconds.
    pub total_session_time: i64,
    pub focused_time: i64,
    pub distracted_time: i64,
    pub attention_events: AttentionCounts,
    pub focus_history: Vec<FocusPoint>,
    pub hourly_breakdown: Vec<HourlyBucket>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_types_use_colon_wire_names() {
        let json = serde_json::to_string(&EventType::GazeLookingAway).unwrap();
        assert_eq!(json, "\"gaze:looking_away\"");
        let parsed: EventType = serde_json::from_str("\"nudge2:shown\"").unwrap();
        assert_eq!(parsed, EventType::Nudge2Shown);
    }

    #[test]
    fn unfamiliar_reasons_and_retired_types_still_parse() {
        let reason: EventReason = serde_json::from_str("\"input_idle\"").unwrap();
        assert_eq!(reason, EventReason::Other);
        assert_eq!(EventType::parse("gaze:distracted"), EventType::Unknown("gaze:distracted".to_string()));
    }

    #[test]
    fn unknown_event_types_are_preserved() {
        let parsed: EventType = serde_json::from_str("\"pet:fed\"").unwrap();
        assert_eq!(parsed, EventType::Unknown("pet:fed".to_string()));
        assert!(!parsed.is_known());
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"pet:fed\"");
    }

    #[test]
    fn event_document_serializes_camel_case_and_skips_empty_data() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let event = AttentionEvent::new(
            "s-1",
            "u-1",
            EventType::AttentionLost,
            at,
            EventData::with_reason(EventReason::TabHidden),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["sessionId"], "s-1");
        assert_eq!(value["eventType"], "attention:lost");
        assert_eq!(value["data"]["reason"], "tab_hidden");
        assert!(value["data"].get("confidence").is_none());
        assert!(value.get("courseId").is_none());
    }

    #[test]
    fn fresh_events_get_distinct_ids() {
        let at = Utc::now();
        let a = AttentionEvent::new("s", "u", EventType::SessionStart, at, EventData::default());
        let b = AttentionEvent::new("s", "u", EventType::SessionStart, at, EventData::default());
        assert_ne!(a.id, b.id);
    }
}
