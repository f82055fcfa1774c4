// THEORY:
// This file is the main entry point for the `focus_engine` library crate. It
// defines the public API a host application embeds to monitor a learner's
// attention during a study session.
//
// The layers, leaves first:
// 1.  **Signal** (`core_modules::gaze_judge`): one landmark frame in, one raw
//     looking/not-looking judgment out.
// 2.  **Temporal** (`core_modules::hysteresis`, `core_modules::activity`):
//     debounced present/lost state from the camera and from host activity.
// 3.  **Runtime** (`pipeline`, `detection`): the per-frame API and the async
//     frame loop that drives it.
// 4.  **Bookkeeping** (`buffer`, `store`, `metrics`): buffered event logging
//     and replayable focus metrics.
// 5.  **Coordination** (`coordinator`, `session`): leader election between
//     participants and the per-session wiring of everything above.

pub mod buffer;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod core_modules;
pub mod detection;
pub mod error;
pub mod events;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod store;

pub use config::EngineConfig;
pub use error::{FocusError, Result};
pub use pipeline::{FocusPipeline, Report};
pub use session::SessionService;
