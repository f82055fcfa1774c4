// THEORY:
// All tunable behavior of the engine lives in `EngineConfig`. The thresholds
// below (grace period, confidence cut-off, nudge timings, flush policy, election
// timings) came out of experimentation rather than physiology, so each one is a
// plain public field that a host can override from a JSON file. Every section
// carries `#[serde(default)]`, which means a file only needs to mention the
// values it wants to change.
//
// Durations are stored as whole milliseconds so the file format stays trivial;
// each section exposes `Duration` accessors for the runtime code.

use crate::error::{FocusError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Thresholds for the per-frame gaze geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Average eye-aspect-ratio at or below which the eyes count as closed.
    pub eyes_closed_ear: f64,
    /// Gaze ratio below which the learner is looking left.
    pub left_threshold: f64,
    /// Gaze ratio above which the learner is looking right.
    pub right_threshold: f64,
    /// Minimum confidence for a frame to count as "looking at the screen".
    pub looking_confidence: f64,
    /// Minimum number of landmark points a well-formed frame must carry.
    pub min_landmarks: usize,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            eyes_closed_ear: 0.20,
            left_threshold: 0.4,
            right_threshold: 0.6,
            looking_confidence: 0.90,
            min_landmarks: 478,
        }
    }
}

/// Anti-flicker settings for the camera-driven attention machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    /// How long raw "not looking" must persist before Lost is committed.
    pub grace_period_ms: u64,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self { grace_period_ms: 900 }
    }
}

impl HysteresisConfig {
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.grace_period_ms as i64)
    }
}

/// Settings for the camera-independent visibility/focus/idle monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Input inactivity after which a present learner is considered lost.
    pub idle_threshold_ms: u64,
    /// Cadence of the idle check.
    pub idle_check_interval_ms: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 60_000,
            idle_check_interval_ms: 30_000,
        }
    }
}

impl ActivityConfig {
    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.idle_threshold_ms as i64)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }
}

/// Timings for the UX-facing nudge machine and its trigger scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Minimum spacing between two nudges.
    pub cooldown_ms: u64,
    pub nudge1_animation_ms: u64,
    pub nudge2_animation_ms: u64,
    pub happy_animation_ms: u64,
    /// Continuous Lost time before the first nudge trigger.
    pub inattentive_short_ms: u64,
    /// Continuous Lost time before the second nudge trigger.
    pub inattentive_long_ms: u64,
    /// Continuous Present time (after a Lost spell) before the happy trigger.
    pub focused_ms: u64,
    /// Cadence at which a running session re-evaluates the triggers and
    /// expires finished animations.
    pub trigger_check_interval_ms: u64,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 10_000,
            nudge1_animation_ms: 1_000,
            nudge2_animation_ms: 1_500,
            happy_animation_ms: 2_000,
            inattentive_short_ms: 5_000,
            inattentive_long_ms: 10_000,
            focused_ms: 2_000,
            trigger_check_interval_ms: 1_000,
        }
    }
}

impl NudgeConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.cooldown_ms as i64)
    }

    pub fn trigger_check_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_check_interval_ms)
    }
}

/// Flush policy for the event buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Buffer length that triggers an immediate flush.
    pub max_buffer_size: usize,
    /// Delay after the first buffered event before a timed flush.
    pub flush_interval_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 50,
            flush_interval_ms: 5_000,
        }
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Timings for leader election between participants of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Name of the shared channel; participants only talk within one channel.
    pub channel_name: String,
    /// How long election announcements are collected before deciding.
    pub settle_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Heartbeat silence after which followers re-run the election.
    pub leader_timeout_ms: u64,
    /// Pause before re-running an election after the leader went away.
    pub reelection_delay_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            channel_name: "focus-tab-coordination".to_string(),
            settle_delay_ms: 1_000,
            heartbeat_interval_ms: 5_000,
            leader_timeout_ms: 10_000,
            reelection_delay_ms: 1_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn leader_timeout(&self) -> Duration {
        Duration::from_millis(self.leader_timeout_ms)
    }

    pub fn reelection_delay(&self) -> Duration {
        Duration::from_millis(self.reelection_delay_ms)
    }
}

/// Settings for metric recomputation and the advisory recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Cadence of the periodic recomputation while a session is active.
    pub update_interval_ms: u64,
    /// Number of most recent focus-history points kept in a metrics document.
    pub focus_history_limit: usize,
    pub low_focus_percentage: f64,
    pub high_nudge_count: u32,
    pub slow_response_secs: f64,
    pub low_focus_hour_percentage: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 30_000,
            focus_history_limit: 100,
            low_focus_percentage: 50.0,
            high_nudge_count: 10,
            slow_response_secs: 30.0,
            low_focus_hour_percentage: 30.0,
        }
    }
}

impl MetricsConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Settings for the frame-driven detection task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Interval between two frame judgments (~30 Hz by default).
    pub frame_interval_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { frame_interval_ms: 33 }
    }
}

impl DetectionConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Top-level configuration handed to every service at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gaze: GazeConfig,
    pub hysteresis: HysteresisConfig,
    pub activity: ActivityConfig,
    pub nudge: NudgeConfig,
    pub buffer: BufferConfig,
    pub coordinator: CoordinatorConfig,
    pub metrics: MetricsConfig,
    pub detection: DetectionConfig,
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Rejects combinations that would make the state machines meaningless.
    pub fn validate(&self) -> Result<()> {
        let gaze = &self.gaze;
        if !(0.0..=1.0).contains(&gaze.looking_confidence) {
            return Err(FocusError::Config(format!(
                "gaze.looking_confidence must be within [0, 1], got {}",
                gaze.looking_confidence
            )));
        }
        if gaze.left_threshold > gaze.right_threshold {
            return Err(FocusError::Config(format!(
                "gaze.left_threshold ({}) exceeds gaze.right_threshold ({})",
                gaze.left_threshold, gaze.right_threshold
            )));
        }
        if self.buffer.max_buffer_size == 0 {
            return Err(FocusError::Config("buffer.max_buffer_size must be positive".into()));
        }
        if self.detection.frame_interval_ms == 0
            || self.coordinator.heartbeat_interval_ms == 0
            || self.nudge.trigger_check_interval_ms == 0
            || self.activity.idle_check_interval_ms == 0
            || self.metrics.update_interval_ms == 0
        {
            return Err(FocusError::Config("intervals must be positive".into()));
        }
        if self.coordinator.leader_timeout_ms <= self.coordinator.heartbeat_interval_ms {
            return Err(FocusError::Config(
                "coordinator.leader_timeout_ms must exceed coordinator.heartbeat_interval_ms".into(),
            ));
        }
        Ok(())
    }
}
