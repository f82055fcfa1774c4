// THEORY:
// The `ActivityMonitor` is the coarse, camera-independent attention layer. It
// watches what the host environment reports (tab visibility, window focus,
// pointer/keyboard input) and keeps a two-valued present/lost state that works
// even when the camera is off or denied.
//
// It speaks the same present/lost vocabulary as the gaze layer but with
// different triggers, recorded as the event `reason`. Duplicate signals are
// absorbed: only an actual state change produces an output, so a burst of blur
// events logs a single `attention:lost`.

use crate::config::ActivityConfig;
use crate::events::{EventData, EventReason, EventType};
use chrono::{DateTime, Utc};
use tracing::debug;

/// What the host environment observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    /// The learner opened the course view; monitoring starts.
    CourseEntered,
    /// The learner left the course view; monitoring ends.
    CourseExited,
    TabHidden,
    TabVisible,
    WindowBlur,
    WindowFocus,
    /// Pointer, keyboard, scroll or touch activity.
    Input,
    /// Periodic idle check.
    Tick,
}

/// A committed change of the coarse attention state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityTransition {
    pub present: bool,
    pub reason: EventReason,
    pub at: DateTime<Utc>,
}

impl ActivityTransition {
    pub fn event_type(&self) -> EventType {
        if self.present {
            EventType::AttentionPresent
        } else {
            EventType::AttentionLost
        }
    }

    pub fn event_data(&self) -> EventData {
        EventData::with_reason(self.reason)
    }
}

pub struct ActivityMonitor {
    idle_threshold: chrono::Duration,
    /// `None` until the course is entered and after it is exited.
    present: Option<bool>,
    lost_reason: Option<EventReason>,
    last_transition_at: Option<DateTime<Utc>>,
    last_input_at: Option<DateTime<Utc>>,
}

impl ActivityMonitor {
    pub fn new(config: &ActivityConfig) -> Self {
        Self {
            idle_threshold: config.idle_threshold(),
            present: None,
            lost_reason: None,
            last_transition_at: None,
            last_input_at: None,
        }
    }

    pub fn is_present(&self) -> Option<bool> {
        self.present
    }

    pub fn handle(&mut self, signal: ActivitySignal, now: DateTime<Utc>) -> Option<ActivityTransition> {
        match signal {
            ActivitySignal::CourseEntered => {
                self.last_input_at = Some(now);
                self.switch(true, EventReason::CourseFocus, now)
            }
            ActivitySignal::CourseExited => {
                let transition = if self.present == Some(true) {
                    self.switch(false, EventReason::CourseExit, now)
                } else {
                    None
                };
                self.present = None;
                self.lost_reason = None;
                transition
            }
            _ if self.present.is_none() => None,
            ActivitySignal::TabHidden => self.switch(false, EventReason::TabHidden, now),
            ActivitySignal::TabVisible => {
                self.last_input_at = Some(now);
                self.switch(true, EventReason::TabVisible, now)
            }
            ActivitySignal::WindowBlur => self.switch(false, EventReason::WindowBlur, now),
            ActivitySignal::WindowFocus => {
                self.last_input_at = Some(now);
                self.switch(true, EventReason::WindowFocus, now)
            }
            ActivitySignal::Input => {
                self.last_input_at = Some(now);
                if self.lost_reason == Some(EventReason::TabNavigation) {
                    self.switch(true, EventReason::WindowFocus, now)
                } else {
                    None
                }
            }
            ActivitySignal::Tick => {
                if self.present != Some(true) {
                    return None;
                }
                let last_activity = match (self.last_input_at, self.last_transition_at) {
                    (Some(a), Some(b)) => a.max(b),
                    (Some(a), None) | (None, Some(a)) => a,
                    (None, None) => return None,
                };
                if now - last_activity > self.idle_threshold {
                    self.switch(false, EventReason::TabNavigation, now)
                } else {
                    None
                }
            }
        }
    }

    fn switch(&mut self, present: bool, reason: EventReason, now: DateTime<Utc>) -> Option<ActivityTransition> {
        if self.present == Some(present) {
            return None;
        }
        debug!("Activity state -> {} ({:?})", if present { "present" } else { "lost" }, reason);
        self.present = Some(present);
        self.lost_reason = if present { None } else { Some(reason) };
        self.last_transition_at = Some(now);
        Some(ActivityTransition { present, reason, at: now })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn monitor() -> ActivityMonitor {
        ActivityMonitor::new(&ActivityConfig::default())
    }

    #[test]
    fn signals_before_entering_a_course_are_ignored() {
        let mut m = monitor();
        assert!(m.handle(ActivitySignal::TabHidden, t(0)).is_none());
        assert_eq!(m.is_present(), None);
    }

    #[test]
    fn visibility_and_focus_drive_present_and_lost() {
        let mut m = monitor();
        let entered = m.handle(ActivitySignal::CourseEntered, t(0)).unwrap();
        assert!(entered.present);
        assert_eq!(entered.reason, EventReason::CourseFocus);
        assert_eq!(entered.event_type(), EventType::AttentionPresent);

        let hidden = m.handle(ActivitySignal::TabHidden, t(5)).unwrap();
        assert!(!hidden.present);
        assert_eq!(hidden.reason, EventReason::TabHidden);

        // Already lost: a blur is absorbed.
        assert!(m.handle(ActivitySignal::WindowBlur, t(6)).is_none());

        let visible = m.handle(ActivitySignal::TabVisible, t(9)).unwrap();
        assert_eq!(visible.reason, EventReason::TabVisible);
        assert_eq!(visible.event_data().reason, Some(EventReason::TabVisible));
    }

    #[test]
    fn sixty_seconds_without_input_counts_as_lost() {
        let mut m = monitor();
        m.handle(ActivitySignal::CourseEntered, t(0));
        m.handle(ActivitySignal::Input, t(10));
        assert!(m.handle(ActivitySignal::Tick, t(60)).is_none());
        assert!(m.handle(ActivitySignal::Tick, t(70)).is_none());
        let idle = m.handle(ActivitySignal::Tick, t(71)).unwrap();
        assert!(!idle.present);
        assert_eq!(idle.reason, EventReason::TabNavigation);

        let back = m.handle(ActivitySignal::Input, t(80)).unwrap();
        assert!(back.present);
    }

    #[test]
    fn input_does_not_override_a_hidden_tab() {
        let mut m = monitor();
        m.handle(ActivitySignal::CourseEntered, t(0));
        m.handle(ActivitySignal::TabHidden, t(1));
        assert!(m.handle(ActivitySignal::Input, t(2)).is_none());
        assert_eq!(m.is_present(), Some(false));
    }

    #[test]
    fn exiting_logs_a_final_loss_only_when_present() {
        let mut m = monitor();
        m.handle(ActivitySignal::CourseEntered, t(0));
        let exit = m.handle(ActivitySignal::CourseExited, t(30)).unwrap();
        assert_eq!(exit.reason, EventReason::CourseExit);
        assert_eq!(m.is_present(), None);

        let mut m = monitor();
        m.handle(ActivitySignal::CourseEntered, t(0));
        m.handle(ActivitySignal::WindowBlur, t(1));
        assert!(m.handle(ActivitySignal::CourseExited, t(2)).is_none());
    }
}
