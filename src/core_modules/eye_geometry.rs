// THEORY:
// The `eye_geometry` module provides the analytical lenses for a single
// `LandmarkFrame`. It follows the same separation as the rest of the engine: the
// frame is a dumb container, and these stateless functions quantify it.
//
// Two measurements matter for attention:
// 1.  **Eye-aspect-ratio (EAR)**: vertical lid separation over horizontal eye
//     width. Open eyes sit around 0.25-0.35; a closed or nearly closed eye drops
//     towards zero. It is the first gate: closed eyes short-circuit everything.
// 2.  **Horizontal gaze ratio**: where the iris center sits between the two
//     corners of the eye, as a fraction in [0, 1]. 0.5 is dead center. The value
//     is clamped because the iris estimate can land slightly outside the corners.
//
// Neither function has memory. Temporal smoothing is the job of `hysteresis`.

pub mod eye_geometry {
    use crate::core_modules::landmark::{LandmarkFrame, LandmarkPoint};

    /// EAR returned for a degenerate eye with zero width: comfortably "open"
    /// so that a glitch in the corners never registers as a blink.
    pub const NEUTRAL_EAR: f64 = 0.3;
    /// Gaze ratio returned for a degenerate eye with zero width.
    pub const CENTERED_RATIO: f64 = 0.5;

    const UPPER_LID: [usize; 2] = [1, 2];
    const LOWER_LID: [usize; 2] = [4, 5];
    const CORNERS: [usize; 2] = [0, 3];

    /// Computes the eye-aspect-ratio of one eye contour.
    ///
    /// The vertical term is the mean of all upper-lid x lower-lid distances; the
    /// horizontal term is the distance between the two corner positions.
    pub fn eye_aspect_ratio(contour: &[LandmarkPoint]) -> f64 {
        let mut vertical_sum = 0.0;
        let mut vertical_count = 0usize;
        for &top in &UPPER_LID {
            for &bottom in &LOWER_LID {
                if let (Some(t), Some(b)) = (contour.get(top), contour.get(bottom)) {
                    vertical_sum += t.distance(b);
                    vertical_count += 1;
                }
            }
        }

        let horizontal = match (contour.get(CORNERS[0]), contour.get(CORNERS[1])) {
            (Some(a), Some(b)) => a.distance(b),
            _ => 0.0,
        };
        if horizontal == 0.0 {
            return NEUTRAL_EAR;
        }

        let average_vertical = if vertical_count > 0 {
            vertical_sum / vertical_count as f64
        } else {
            0.0
        };
        average_vertical / horizontal
    }

    /// Computes the clamped horizontal position of the iris between two corners.
    ///
    /// The corners may be given in either order; the one with the smaller `x`
    /// is treated as the left edge.
    pub fn gaze_ratio(corner_a: &LandmarkPoint, corner_b: &LandmarkPoint, iris: &LandmarkPoint) -> f64 {
        let (left, right) = if corner_a.x < corner_b.x {
            (corner_a, corner_b)
        } else {
            (corner_b, corner_a)
        };

        let eye_width = right.x - left.x;
        if eye_width == 0.0 {
            return CENTERED_RATIO;
        }

        ((iris.x - left.x) / eye_width).clamp(0.0, 1.0)
    }

    /// Convenience wrapper resolving the three indices against a frame.
    pub fn gaze_ratio_at(frame: &LandmarkFrame, corner_a: usize, corner_b: usize, iris: usize) -> Option<f64> {
        Some(gaze_ratio(frame.point(corner_a)?, frame.point(corner_b)?, frame.point(iris)?))
    }

    /// Triangular confidence: 1.0 at a centered ratio, falling linearly to 0.0
    /// at either extreme.
    pub fn confidence_from_ratio(ratio: f64) -> f64 {
        (1.0 - (ratio - 0.5).abs() * 2.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::eye_geometry::*;
    use crate::core_modules::landmark::LandmarkPoint;

    fn contour(width: f64, height: f64) -> Vec<LandmarkPoint> {
        let mut points = vec![LandmarkPoint::new(0.5, 0.5); 16];
        points[0] = LandmarkPoint::new(0.5 - width / 2.0, 0.5);
        points[3] = LandmarkPoint::new(0.5 + width / 2.0, 0.5);
        points[1] = LandmarkPoint::new(0.5, 0.5 - height / 2.0);
        points[2] = LandmarkPoint::new(0.5, 0.5 - height / 2.0);
        points[4] = LandmarkPoint::new(0.5, 0.5 + height / 2.0);
        points[5] = LandmarkPoint::new(0.5, 0.5 + height / 2.0);
        points
    }

    #[test]
    fn ear_is_height_over_width() {
        let ear = eye_aspect_ratio(&contour(0.1, 0.03));
        assert!((ear - 0.3).abs() < 1e-9, "ear was {ear}");
    }

    #[test]
    fn zero_width_eye_is_neutral() {
        assert_eq!(eye_aspect_ratio(&contour(0.0, 0.03)), NEUTRAL_EAR);
    }

    #[test]
    fn gaze_ratio_is_clamped_and_order_independent() {
        let left = LandmarkPoint::new(0.4, 0.5);
        let right = LandmarkPoint::new(0.5, 0.5);
        let iris = LandmarkPoint::new(0.475, 0.5);
        assert!((gaze_ratio(&left, &right, &iris) - 0.75).abs() < 1e-9);
        assert!((gaze_ratio(&right, &left, &iris) - 0.75).abs() < 1e-9);

        let outside = LandmarkPoint::new(0.55, 0.5);
        assert_eq!(gaze_ratio(&left, &right, &outside), 1.0);
        let before = LandmarkPoint::new(0.3, 0.5);
        assert_eq!(gaze_ratio(&left, &right, &before), 0.0);
    }

    #[test]
    fn zero_width_gaze_is_centered() {
        let p = LandmarkPoint::new(0.4, 0.5);
        assert_eq!(gaze_ratio(&p, &p, &LandmarkPoint::new(0.9, 0.5)), CENTERED_RATIO);
    }

    #[test]
    fn confidence_is_triangular() {
        assert_eq!(confidence_from_ratio(0.5), 1.0);
        assert_eq!(confidence_from_ratio(0.0), 0.0);
        assert_eq!(confidence_from_ratio(1.0), 0.0);
        assert!((confidence_from_ratio(0.45) - 0.9).abs() < 1e-9);
        assert!((confidence_from_ratio(0.75) - 0.5).abs() < 1e-9);
        for step in 0..=100 {
            let r = step as f64 / 100.0;
            let c = confidence_from_ratio(r);
            assert!((0.0..=1.0).contains(&c));
            assert!((c - (1.0 - 2.0 * (r - 0.5).abs()).max(0.0)).abs() < 1e-12);
        }
    }
}
