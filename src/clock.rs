// THEORY:
// Every timestamp the engine writes is wall-clock (`DateTime<Utc>`), but every
// timer it runs is tokio's monotonic clock. `Clock` ties the two together: it
// records one wall-clock origin and measures elapsed time with
// `tokio::time::Instant`. Under a paused test runtime the wall clock therefore
// advances exactly as far as the virtual timers do.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin_wall: DateTime<Utc>,
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// A clock that reads `wall` right now and advances from there.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            origin_wall: wall,
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_wall + elapsed
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
