// THEORY:
// Deterministic face meshes for simulation and tests. A recorded landmark
// stream is bulky and model-specific; the gaze logic only looks at a handful of
// eye points, so a builder that places exactly those points is enough to drive
// the whole engine through any (EAR, gaze ratio) combination.

use crate::core_modules::landmark::*;

const EYE_WIDTH: f64 = 0.06;
const EYE_Y: f64 = 0.45;
const LEFT_EYE_X: f64 = 0.40;
const RIGHT_EYE_X: f64 = 0.60;

/// Builds a full 478-point frame whose eyes have the given aspect ratio and
/// whose irises sit at `gaze_ratio` between the corners. Ratios outside [0, 1]
/// place the iris outside the eye, which exercises clamping.
pub fn synthetic_face(eye_aspect_ratio: f64, gaze_ratio: f64) -> LandmarkFrame {
    let mut points = vec![LandmarkPoint::new(0.5, 0.5); FACE_MESH_POINTS];
    place_eye(&mut points, &LEFT_EYE_CONTOUR, LEFT_EYE_X, LEFT_IRIS_CENTER, LEFT_EYE_INNER, eye_aspect_ratio, gaze_ratio);
    place_eye(&mut points, &RIGHT_EYE_CONTOUR, RIGHT_EYE_X, RIGHT_IRIS_CENTER, RIGHT_EYE_OUTER, eye_aspect_ratio, gaze_ratio);
    LandmarkFrame::new(points)
}

/// An open-eyed face looking dead center.
pub fn attentive_face() -> LandmarkFrame {
    synthetic_face(0.3, 0.5)
}

/// An open-eyed face looking far to the side.
pub fn distracted_face() -> LandmarkFrame {
    synthetic_face(0.3, 0.9)
}

fn place_eye(
    points: &mut [LandmarkPoint],
    contour: &[usize; 16],
    center_x: f64,
    iris: usize,
    far_corner: usize,
    eye_aspect_ratio: f64,
    gaze_ratio: f64,
) {
    let left_x = center_x - EYE_WIDTH / 2.0;
    let right_x = center_x + EYE_WIDTH / 2.0;
    let lid_offset = eye_aspect_ratio * EYE_WIDTH / 2.0;

    // Contour positions 0 and 3 span the eye for the aspect ratio.
    points[contour[0]] = LandmarkPoint::new(left_x, EYE_Y);
    points[contour[3]] = LandmarkPoint::new(right_x, EYE_Y);
    points[contour[1]] = LandmarkPoint::new(center_x, EYE_Y - lid_offset);
    points[contour[2]] = LandmarkPoint::new(center_x, EYE_Y - lid_offset);
    points[contour[4]] = LandmarkPoint::new(center_x, EYE_Y + lid_offset);
    points[contour[5]] = LandmarkPoint::new(center_x, EYE_Y + lid_offset);

    // The gaze corners are contour[0] and the opposite corner of the mesh.
    points[far_corner] = LandmarkPoint::new(right_x, EYE_Y);
    points[iris] = LandmarkPoint::new(left_x + gaze_ratio * EYE_WIDTH, EYE_Y);
}
