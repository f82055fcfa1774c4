// THEORY:
// The `nudge` module is the UX-facing end of the engine: the little animated
// companion that reacts when the learner drifts away and celebrates when they
// come back. It is coarser than the attention layers and has two parts.
//
// 1.  **TriggerScheduler**: watches the committed attention state over time and
//     emits the three UX triggers (`Inattentive5s`, `Inattentive10s`,
//     `Focused2s`), each at most once per spell of absence/presence.
// 2.  **NudgeMachine**: a four-state animation machine (Idle, Nudge1, Nudge2,
//     Happy). Every non-Idle state reverts to Idle after its animation. While an
//     animation plays, new activations are refused outright (no queueing, no
//     interruption). Nudges additionally respect a global cooldown; the happy
//     reaction is exempt from it.
//
// Time is always passed in explicitly so that both parts are deterministic.

use crate::config::NudgeConfig;
use crate::events::{EventType, NudgeKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NudgeState {
    Idle,
    Nudge1,
    Nudge2,
    Happy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeTrigger {
    Inattentive5s,
    Inattentive10s,
    Focused2s,
}

/// Reported when the machine leaves Idle, so the host can animate and log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    pub state: NudgeState,
    pub started_at: DateTime<Utc>,
    pub until: DateTime<Utc>,
    /// Whether a sound should accompany the animation.
    pub sound: bool,
}

impl Activation {
    pub fn nudge_kind(&self) -> Option<NudgeKind> {
        match self.state {
            NudgeState::Nudge1 => Some(NudgeKind::Nudge1),
            NudgeState::Nudge2 => Some(NudgeKind::Nudge2),
            _ => None,
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        match self.state {
            NudgeState::Nudge1 => Some(EventType::Nudge1Shown),
            NudgeState::Nudge2 => Some(EventType::Nudge2Shown),
            _ => None,
        }
    }
}

pub struct NudgeMachine {
    config: NudgeConfig,
    state: NudgeState,
    animating_until: Option<DateTime<Utc>>,
    last_nudge_at: Option<DateTime<Utc>>,
    muted: bool,
}

impl NudgeMachine {
    pub fn new(config: NudgeConfig) -> Self {
        Self {
            config,
            state: NudgeState::Idle,
            animating_until: None,
            last_nudge_at: None,
            muted: false,
        }
    }

    /// Current state after applying any elapsed auto-revert.
    pub fn state_at(&mut self, now: DateTime<Utc>) -> NudgeState {
        self.tick(now);
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Forgets the last nudge so the next one may fire immediately.
    pub fn reset_cooldown(&mut self) {
        self.last_nudge_at = None;
    }

    pub fn can_trigger_nudge(&self, now: DateTime<Utc>) -> bool {
        match self.last_nudge_at {
            Some(last) => now - last >= self.config.cooldown(),
            None => true,
        }
    }

    /// Reverts to Idle once the running animation is over. Returns true if a
    /// revert happened.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        match self.animating_until {
            Some(until) if now >= until => {
                debug!("Nudge animation {:?} finished", self.state);
                self.state = NudgeState::Idle;
                self.animating_until = None;
                true
            }
            _ => false,
        }
    }

    pub fn handle(&mut self, trigger: NudgeTrigger, now: DateTime<Utc>) -> Option<Activation> {
        self.tick(now);
        match trigger {
            NudgeTrigger::Inattentive5s if self.can_trigger_nudge(now) => {
                self.activate(NudgeState::Nudge1, self.config.nudge1_animation_ms, now)
            }
            NudgeTrigger::Inattentive10s if self.can_trigger_nudge(now) => {
                self.activate(NudgeState::Nudge2, self.config.nudge2_animation_ms, now)
            }
            NudgeTrigger::Focused2s => self.activate(NudgeState::Happy, self.config.happy_animation_ms, now),
            _ => {
                debug!("Nudge {:?} suppressed by cooldown", trigger);
                None
            }
        }
    }

    fn activate(&mut self, state: NudgeState, duration_ms: u64, now: DateTime<Utc>) -> Option<Activation> {
        if self.animating_until.is_some() {
            debug!("Refusing {:?} while {:?} is animating", state, self.state);
            return None;
        }
        let until = now + Duration::milliseconds(duration_ms as i64);
        self.state = state;
        self.animating_until = Some(until);
        if state != NudgeState::Happy {
            self.last_nudge_at = Some(now);
        }
        info!("Companion state -> {:?}", state);
        Some(Activation {
            state,
            started_at: now,
            until,
            sound: state != NudgeState::Happy && !self.muted,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Spell {
    present: bool,
    since: DateTime<Utc>,
    fired_short: bool,
    fired_long: bool,
    fired_focused: bool,
    /// A present spell only earns the happy trigger if it ended an absence.
    follows_absence: bool,
}

/// Turns a committed present/lost signal into UX triggers.
pub struct TriggerScheduler {
    short: Duration,
    long: Duration,
    focused: Duration,
    spell: Option<Spell>,
}

impl TriggerScheduler {
    pub fn new(config: &NudgeConfig) -> Self {
        Self {
            short: Duration::milliseconds(config.inattentive_short_ms as i64),
            long: Duration::milliseconds(config.inattentive_long_ms as i64),
            focused: Duration::milliseconds(config.focused_ms as i64),
            spell: None,
        }
    }

    /// Records the committed state at `now` and returns any trigger that came
    /// due. Call it on every state change and periodically in between.
    pub fn observe(&mut self, present: bool, now: DateTime<Utc>) -> Vec<NudgeTrigger> {
        let spell = match self.spell {
            Some(s) if s.present == present => s,
            previous => Spell {
                present,
                since: now,
                fired_short: false,
                fired_long: false,
                fired_focused: false,
                follows_absence: matches!(previous, Some(p) if !p.present),
            },
        };
        let mut spell = spell;
        let elapsed = now - spell.since;
        let mut triggers = Vec::new();

        if present {
            if spell.follows_absence && !spell.fired_focused && elapsed >= self.focused {
                spell.fired_focused = true;
                triggers.push(NudgeTrigger::Focused2s);
            }
        } else {
            if !spell.fired_short && elapsed >= self.short {
                spell.fired_short = true;
                triggers.push(NudgeTrigger::Inattentive5s);
            }
            if !spell.fired_long && elapsed >= self.long {
                spell.fired_long = true;
                triggers.push(NudgeTrigger::Inattentive10s);
            }
        }

        self.spell = Some(spell);
        triggers
    }
}
