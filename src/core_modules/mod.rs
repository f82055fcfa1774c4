pub mod activity;
pub mod eye_geometry;
pub mod gaze_judge;
pub mod hysteresis;
pub mod landmark;
pub mod nudge;
pub mod synthetic;
