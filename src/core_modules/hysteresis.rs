// THEORY:
// The `hysteresis` module adds memory to the raw per-frame judgments. The gaze
// processor answers "is the learner looking right now?"; this module answers
// "has the learner *stopped* looking?", which is a different question. Blinks,
// glances at the keyboard and landmark jitter all produce short bursts of
// "not looking" that must not count as distraction.
//
// Key architectural principles:
// 1.  **Asymmetric debounce**: Losing attention needs a continuous run of raw
//     "not looking" frames lasting the grace period. Regaining attention needs a
//     single raw "looking" frame. The learner is never penalised for the
//     system's own latency.
// 2.  **Explicit state**: `AttentionState` is a plain value owned by the
//     detection loop. `step` takes it by value and hands back the next one, so
//     there is no hidden mutable state shared across frame callbacks.
// 3.  **Discrete output**: Only committed transitions produce a
//     `GazeTransition`. A cancelled pending loss leaves no trace.

use crate::config::HysteresisConfig;
use crate::core_modules::gaze_judge::GazeJudgment;
use crate::events::{EventData, EventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommittedAttention {
    Present,
    Lost,
}

/// The debounced attention state of one monitoring session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionState {
    pub current: CommittedAttention,
    pub last_transition_at: DateTime<Utc>,
    /// Start of the current unbroken run of raw "not looking" frames, while
    /// the committed state is still Present.
    pub pending_loss_since: Option<DateTime<Utc>>,
}

impl AttentionState {
    /// A fresh session starts out assuming the learner is present.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current: CommittedAttention::Present,
            last_transition_at: now,
            pending_loss_since: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.current == CommittedAttention::Present
    }
}

/// A committed change of the debounced state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GazeTransition {
    /// Present → Lost after the grace period; `gaze_duration_ms` is the dwell
    /// time of the "not looking" run that caused it.
    LookingAway {
        at: DateTime<Utc>,
        gaze_duration_ms: u64,
        confidence: f64,
    },
    /// Lost → Present; `lost_duration_ms` is how long the Lost state lasted.
    BackToScreen {
        at: DateTime<Utc>,
        lost_duration_ms: u64,
        confidence: f64,
    },
}

impl GazeTransition {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            GazeTransition::LookingAway { at, .. } | GazeTransition::BackToScreen { at, .. } => *at,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            GazeTransition::LookingAway { .. } => EventType::GazeLookingAway,
            GazeTransition::BackToScreen { .. } => EventType::GazeBackToScreen,
        }
    }

    pub fn event_data(&self) -> EventData {
        let (duration, confidence) = match self {
            GazeTransition::LookingAway { gaze_duration_ms, confidence, .. } => (*gaze_duration_ms, *confidence),
            GazeTransition::BackToScreen { lost_duration_ms, confidence, .. } => (*lost_duration_ms, *confidence),
        };
        EventData {
            confidence: Some(confidence),
            gaze_duration: Some(duration),
            ..EventData::default()
        }
    }
}

/// Applies the grace-period rule to a stream of raw judgments.
#[derive(Debug, Clone)]
pub struct AttentionStateMachine {
    grace_period: chrono::Duration,
}

impl AttentionStateMachine {
    pub fn new(config: &HysteresisConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
        }
    }

    /// Consumes one judgment taken at `now` and returns the next state, plus a
    /// transition if one was committed on this frame.
    pub fn step(
        &self,
        state: AttentionState,
        judgment: &GazeJudgment,
        now: DateTime<Utc>,
    ) -> (AttentionState, Option<GazeTransition>) {
        match (state.current, judgment.looking_at_screen) {
            (CommittedAttention::Present, true) => {
                if state.pending_loss_since.is_some() {
                    debug!("Pending attention loss cancelled by a looking frame");
                }
                (
                    AttentionState {
                        pending_loss_since: None,
                        ..state
                    },
                    None,
                )
            }
            (CommittedAttention::Present, false) => {
                let since = state.pending_loss_since.unwrap_or(now);
                let dwell = now - since;
                if dwell >= self.grace_period {
                    let gaze_duration_ms = dwell.num_milliseconds().max(0) as u64;
                    info!("Attention lost after {}ms of looking away", gaze_duration_ms);
                    (
                        AttentionState {
                            current: CommittedAttention::Lost,
                            last_transition_at: now,
                            pending_loss_since: None,
                        },
                        Some(GazeTransition::LookingAway {
                            at: now,
                            gaze_duration_ms,
                            confidence: judgment.confidence,
                        }),
                    )
                } else {
                    (
                        AttentionState {
                            pending_loss_since: Some(since),
                            ..state
                        },
                        None,
                    )
                }
            }
            (CommittedAttention::Lost, true) => {
                let lost_duration_ms = (now - state.last_transition_at).num_milliseconds().max(0) as u64;
                info!("Attention regained after {}ms away", lost_duration_ms);
                (
                    AttentionState {
                        current: CommittedAttention::Present,
                        last_transition_at: now,
                        pending_loss_since: None,
                    },
                    Some(GazeTransition::BackToScreen {
                        at: now,
                        lost_duration_ms,
                        confidence: judgment.confidence,
                    }),
                )
            }
            (CommittedAttention::Lost, false) => (state, None),
        }
    }
}
