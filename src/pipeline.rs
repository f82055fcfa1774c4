// THEORY:
// The `pipeline` module is the top-level, synchronous API of the attention
// engine. It stacks the per-frame signal layer (`GazeSignalProcessor`) and the
// temporal layer (`AttentionStateMachine`) behind one call, so a host that
// already has landmark output only needs `generate_report` per frame.
//
// The pipeline owns its `AttentionState`. It is not shared; the detection loop
// (or any other driver) holds the pipeline by value and is the only writer.

use crate::config::EngineConfig;
use crate::core_modules::gaze_judge::GazeSignalProcessor;
use crate::core_modules::hysteresis::{AttentionState, AttentionStateMachine};
use crate::core_modules::landmark::LandmarkFrame;
use crate::error::Result;
use chrono::{DateTime, Utc};

// Re-export key data structures for the public API.
pub use crate::core_modules::gaze_judge::{GazeDirection, GazeJudgment};
pub use crate::core_modules::hysteresis::{CommittedAttention, GazeTransition};

/// The detailed data package for a committed attention change.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionData {
    pub transition: GazeTransition,
    /// The raw judgment of the frame that committed the transition.
    pub judgment: GazeJudgment,
}

/// The primary output of the pipeline for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    NoTransition,
    Transition(TransitionData),
}

pub struct FocusPipeline {
    processor: GazeSignalProcessor,
    machine: AttentionStateMachine,
    state: AttentionState,
    last_judgment: Option<GazeJudgment>,
}

impl FocusPipeline {
    /// Starts a pipeline whose session begins at `now` in the Present state.
    pub fn new(config: &EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            processor: GazeSignalProcessor::new(config.gaze.clone()),
            machine: AttentionStateMachine::new(&config.hysteresis),
            state: AttentionState::new(now),
            last_judgment: None,
        }
    }

    pub fn state(&self) -> &AttentionState {
        &self.state
    }

    pub fn last_judgment(&self) -> Option<&GazeJudgment> {
        self.last_judgment.as_ref()
    }

    pub fn attention_changed(&mut self, detection: Result<Vec<LandmarkFrame>>, now: DateTime<Utc>) -> bool {
        matches!(self.generate_report(detection, now), Report::Transition(_))
    }

    pub fn generate_report(&mut self, detection: Result<Vec<LandmarkFrame>>, now: DateTime<Utc>) -> Report {
        // Stage 1: Per-frame judgment
        let judgment = self.processor.judge_detection(detection);
        self.last_judgment = Some(judgment);

        // Stage 2: Temporal smoothing
        let (next, transition) = self.machine.step(self.state, &judgment, now);
        self.state = next;

        // Stage 3: Report
        match transition {
            Some(transition) => Report::Transition(TransitionData { transition, judgment }),
            None => Report::NoTransition,
        }
    }
}
