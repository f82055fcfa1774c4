// THEORY:
// The `GazeSignalProcessor` is the engine of the per-frame signal layer. It turns
// one frame of landmark geometry into a raw "is the learner looking at the
// screen?" judgment with a confidence. It is deliberately stateless: the same
// frame always yields the same judgment, and it has no memory of prior frames.
//
// Algorithm:
// 1.  **Eye-openness gate**: average the two eyes' EAR. At or below the closed
//     threshold the frame is `EyesClosed` with zero confidence, whatever the
//     irises are doing.
// 2.  **Gaze ratio**: average the two clamped iris positions.
// 3.  **Direction**: left / straight / right by two fixed ratio thresholds.
// 4.  **Confidence**: triangular in the ratio, peaking at 0.5.
// 5.  **Decision**: looking iff confidence clears a strict threshold. A
//     "looking_straight" label can still fail the decision.
//
// Failure semantics: the landmark model is an external black box. Errors and
// malformed output are absorbed here and reported as `NoFaceDetected` so the
// detection loop never has to special-case them.

use crate::config::GazeConfig;
use crate::core_modules::eye_geometry::eye_geometry::{confidence_from_ratio, eye_aspect_ratio, gaze_ratio_at};
use crate::core_modules::landmark::*;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    LookingLeft,
    LookingStraight,
    LookingRight,
    EyesClosed,
    NoFaceDetected,
}

/// The raw, unsmoothed verdict for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeJudgment {
    pub looking_at_screen: bool,
    /// In [0, 1].
    pub confidence: f64,
    pub gaze_direction: GazeDirection,
    /// Average eye-aspect-ratio of both eyes; zero when no face was seen.
    pub ear_value: f64,
    /// Average gaze ratio, absent when the geometry short-circuited.
    pub gaze_ratio: Option<f64>,
}

impl GazeJudgment {
    pub fn no_face() -> Self {
        Self {
            looking_at_screen: false,
            confidence: 0.0,
            gaze_direction: GazeDirection::NoFaceDetected,
            ear_value: 0.0,
            gaze_ratio: None,
        }
    }

    fn eyes_closed(ear_value: f64) -> Self {
        Self {
            looking_at_screen: false,
            confidence: 0.0,
            gaze_direction: GazeDirection::EyesClosed,
            ear_value,
            gaze_ratio: None,
        }
    }
}

/// Stateless per-frame gaze classifier.
#[derive(Debug, Clone, Default)]
pub struct GazeSignalProcessor {
    config: GazeConfig,
}

impl GazeSignalProcessor {
    pub fn new(config: GazeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    /// Judges the raw output of one landmark-model call: an error, zero faces,
    /// or the faces it found (only the first one is considered).
    pub fn judge_detection(&self, detection: Result<Vec<LandmarkFrame>>) -> GazeJudgment {
        match detection {
            Ok(faces) => match faces.first() {
                Some(face) => self.judge(face),
                None => GazeJudgment::no_face(),
            },
            Err(e) => {
                debug!("Landmark model failed for this frame, treating as no face: {}", e);
                GazeJudgment::no_face()
            }
        }
    }

    /// Judges a single face.
    pub fn judge(&self, frame: &LandmarkFrame) -> GazeJudgment {
        if let Err(e) = frame.validate(self.config.min_landmarks) {
            debug!("Discarding malformed landmark frame: {}", e);
            return GazeJudgment::no_face();
        }

        // Stage 1: Eye-openness gate
        let (left_eye, right_eye) = match (frame.select(&LEFT_EYE_CONTOUR), frame.select(&RIGHT_EYE_CONTOUR)) {
            (Some(l), Some(r)) => (l, r),
            _ => return GazeJudgment::no_face(),
        };
        let average_ear = (eye_aspect_ratio(&left_eye) + eye_aspect_ratio(&right_eye)) / 2.0;
        if average_ear <= self.config.eyes_closed_ear {
            return GazeJudgment::eyes_closed(average_ear);
        }

        // Stage 2: Horizontal gaze ratio
        let left_ratio = gaze_ratio_at(frame, LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_IRIS_CENTER);
        let right_ratio = gaze_ratio_at(frame, RIGHT_EYE_INNER, RIGHT_EYE_OUTER, RIGHT_IRIS_CENTER);
        let ratio = match (left_ratio, right_ratio) {
            (Some(l), Some(r)) => (l + r) / 2.0,
            _ => return GazeJudgment::no_face(),
        };

        // Stage 3: Direction
        let gaze_direction = self.classify_direction(ratio);

        // Stage 4 & 5: Confidence and decision
        let confidence = confidence_from_ratio(ratio);

        GazeJudgment {
            looking_at_screen: confidence >= self.config.looking_confidence,
            confidence,
            gaze_direction,
            ear_value: average_ear,
            gaze_ratio: Some(ratio),
        }
    }

    pub fn classify_direction(&self, ratio: f64) -> GazeDirection {
        if ratio < self.config.left_threshold {
            GazeDirection::LookingLeft
        } else if ratio > self.config.right_threshold {
            GazeDirection::LookingRight
        } else {
            GazeDirection::LookingStraight
        }
    }
}
