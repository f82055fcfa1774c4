// THEORY:
// The `landmark` module is the most fundamental unit of the attention engine.
// It is a "dumb" data container for the output of the external face-landmark
// model: one ordered list of normalized points per detected face. It knows how
// to validate itself and how to look up a point by index, nothing more. All
// geometric interpretation lives in `eye_geometry` and `gaze_judge`.
//
// The index tables below follow the 478-point face mesh layout (468 mesh points
// plus 10 iris points). They are fixed by the model, not tunable.

use crate::error::{FocusError, Result};
use serde::{Deserialize, Serialize};

/// Number of points in a complete face mesh including the iris refinement.
pub const FACE_MESH_POINTS: usize = 478;

/// Contour of the left eye. Positions 0 and 3 are the corners, 1 and 2 the
/// upper lid, 4 and 5 the lower lid.
pub const LEFT_EYE_CONTOUR: [usize; 16] = [
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
];
/// Contour of the right eye, same positional convention as the left.
pub const RIGHT_EYE_CONTOUR: [usize; 16] = [
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
];

pub const LEFT_IRIS_CENTER: usize = 468;
pub const RIGHT_IRIS_CENTER: usize = 473;
pub const LEFT_EYE_INNER: usize = 133;
pub const LEFT_EYE_OUTER: usize = 33;
pub const RIGHT_EYE_INNER: usize = 362;
pub const RIGHT_EYE_OUTER: usize = 263;

/// A single normalized landmark. `x` and `y` are in [0, 1] of the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// Planar Euclidean distance; depth is ignored.
    pub fn distance(&self, other: &LandmarkPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// All landmarks of one detected face in one video frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub points: Vec<LandmarkPoint>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<&LandmarkPoint> {
        self.points.get(index)
    }

    /// Checks that the frame carries at least `min_points` finite points.
    pub fn validate(&self, min_points: usize) -> Result<()> {
        if self.points.len() < min_points {
            return Err(FocusError::MalformedLandmarks {
                expected: min_points,
                actual: self.points.len(),
            });
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(FocusError::MalformedLandmarks {
                expected: min_points,
                actual: self.points.iter().filter(|p| p.x.is_finite() && p.y.is_finite()).count(),
            });
        }
        Ok(())
    }

    /// Gathers the points of an index table, e.g. one eye contour.
    pub fn select<const N: usize>(&self, indices: &[usize; N]) -> Option<[LandmarkPoint; N]> {
        let mut out = [LandmarkPoint::default(); N];
        for (slot, &index) in out.iter_mut().zip(indices.iter()) {
            *slot = *self.points.get(index)?;
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frames_are_malformed() {
        let frame = LandmarkFrame::new(vec![LandmarkPoint::new(0.5, 0.5); 10]);
        let err = frame.validate(FACE_MESH_POINTS).unwrap_err();
        assert!(matches!(
            err,
            FocusError::MalformedLandmarks { expected: 478, actual: 10 }
        ));
    }

    #[test]
    fn non_finite_points_are_malformed() {
        let mut points = vec![LandmarkPoint::new(0.5, 0.5); FACE_MESH_POINTS];
        points[42].x = f64::NAN;
        assert!(LandmarkFrame::new(points).validate(FACE_MESH_POINTS).is_err());
    }

    #[test]
    fn select_gathers_points_in_table_order() {
        let points = (0..FACE_MESH_POINTS)
            .map(|i| LandmarkPoint::new(i as f64 / 1000.0, 0.0))
            .collect();
        let frame = LandmarkFrame::new(points);
        let eye = frame.select(&LEFT_EYE_CONTOUR).expect("indices are in range");
        assert_eq!(eye[0].x, 0.033);
        assert_eq!(eye[8].x, 0.133);
    }
}
