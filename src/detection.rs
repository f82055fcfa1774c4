// THEORY:
// The `detection` module is the asynchronous shell around `FocusPipeline`. It
// owns the two external capabilities the engine cannot provide itself, a camera
// and a face-landmark model, and drives the pipeline from a fixed-rate tokio
// task.
//
// Key architectural principles:
// 1.  **Degrade, never fail**: A denied or missing camera leaves the loop
//     `Disabled` (the camera-independent activity layer keeps working). A model
//     that cannot be initialised is replaced by `StubLandmarkModel`. A model
//     error on a single frame is judged as "no face" and the loop carries on.
// 2.  **Single owner**: The task owns the pipeline and therefore the
//     `AttentionState`. The outside world only sees committed transitions (an
//     mpsc channel) and the latest committed state (a watch channel).
// 3.  **Prompt cancellation**: `stop()` is synchronous. It stops the video
//     stream and flips a watch flag; the task checks the flag after every
//     await, so a judgment that was in flight when stop was requested is
//     discarded instead of being reported.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::core_modules::landmark::LandmarkFrame;
use crate::error::{FocusError, Result};
use crate::pipeline::{CommittedAttention, FocusPipeline, Report, TransitionData};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One raw frame as delivered by the camera.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

#[async_trait]
pub trait VideoStream: Send + Sync {
    async fn next_frame(&self) -> Result<VideoFrame>;
    /// Releases the device. Must be idempotent.
    fn stop(&self);
}

#[async_trait]
pub trait Camera: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn VideoStream>>;
}

#[async_trait]
pub trait LandmarkModel: Send + Sync {
    /// Returns zero or one face for the frame.
    async fn detect(&self, frame: &VideoFrame, timestamp_ms: i64) -> Result<Vec<LandmarkFrame>>;
}

/// Stand-in used when the real model could not be loaded: never sees a face.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubLandmarkModel;

#[async_trait]
impl LandmarkModel for StubLandmarkModel {
    async fn detect(&self, _frame: &VideoFrame, _timestamp_ms: i64) -> Result<Vec<LandmarkFrame>> {
        Ok(Vec::new())
    }
}

/// Resolves the outcome of model initialisation, falling back to the stub.
pub fn model_or_stub(init: Result<Arc<dyn LandmarkModel>>) -> Arc<dyn LandmarkModel> {
    match init {
        Ok(model) => model,
        Err(e) => {
            warn!("Landmark model failed to initialise, using stub model: {}", e);
            Arc::new(StubLandmarkModel)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionStatus {
    Running,
    /// The camera could not be acquired; camera-driven attention is off.
    Disabled(String),
    Stopped,
}

pub struct DetectionLoop {
    status: DetectionStatus,
    stop_tx: watch::Sender<bool>,
    attention_rx: watch::Receiver<CommittedAttention>,
    stream: Option<Arc<dyn VideoStream>>,
    handle: Option<JoinHandle<()>>,
}

impl DetectionLoop {
    /// Acquires the camera and spawns the frame task. Committed transitions
    /// are sent to `transitions`; the task ends when that receiver is dropped.
    pub async fn start(
        config: &EngineConfig,
        camera: &dyn Camera,
        model: Arc<dyn LandmarkModel>,
        clock: Clock,
        transitions: mpsc::UnboundedSender<TransitionData>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (attention_tx, attention_rx) = watch::channel(CommittedAttention::Present);

        let stream: Arc<dyn VideoStream> = match camera.acquire().await {
            Ok(stream) => Arc::from(stream),
            Err(e) => {
                match e {
                    FocusError::CameraDenied | FocusError::CameraUnavailable => {
                        info!("Camera not available, gaze detection disabled: {}", e)
                    }
                    _ => warn!("Camera acquisition failed, gaze detection disabled: {}", e),
                }
                return Self {
                    status: DetectionStatus::Disabled(e.to_string()),
                    stop_tx,
                    attention_rx,
                    stream: None,
                    handle: None,
                };
            }
        };

        let pipeline = FocusPipeline::new(config, clock.now());
        let handle = tokio::spawn(run_frames(
            pipeline,
            config.detection.frame_interval(),
            Arc::clone(&stream),
            model,
            clock,
            stop_rx,
            attention_tx,
            transitions,
        ));
        info!("Gaze detection started");

        Self {
            status: DetectionStatus::Running,
            stop_tx,
            attention_rx,
            stream: Some(stream),
            handle: Some(handle),
        }
    }

    pub fn status(&self) -> &DetectionStatus {
        &self.status
    }

    /// Latest committed attention state; Present until the first loss.
    pub fn attention(&self) -> watch::Receiver<CommittedAttention> {
        self.attention_rx.clone()
    }

    pub fn stop(&mut self) {
        if self.status != DetectionStatus::Running {
            return;
        }
        if let Some(stream) = &self.stream {
            stream.stop();
        }
        // The task may already be gone; nothing to signal then.
        let _ = self.stop_tx.send(true);
        self.status = DetectionStatus::Stopped;
        info!("Gaze detection stopped");
    }

    /// Waits for the frame task to finish after `stop`.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Detection task ended abnormally: {}", e);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_frames(
    mut pipeline: FocusPipeline,
    frame_interval: std::time::Duration,
    stream: Arc<dyn VideoStream>,
    model: Arc<dyn LandmarkModel>,
    clock: Clock,
    mut stop_rx: watch::Receiver<bool>,
    attention_tx: watch::Sender<CommittedAttention>,
    transitions: mpsc::UnboundedSender<TransitionData>,
) {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        let now = clock.now();
        let frame_and_faces = async {
            match stream.next_frame().await {
                Ok(frame) => model.detect(&frame, now.timestamp_millis()).await,
                Err(e) => Err(e),
            }
        };
        // A stream or model that never answers must not outlive stop().
        let detection = tokio::select! {
            _ = stop_rx.changed() => {
                debug!("Abandoning frame that was in flight during stop");
                break;
            }
            detection = frame_and_faces => detection,
        };
        if *stop_rx.borrow() {
            debug!("Discarding judgment that was in flight during stop");
            break;
        }

        if let Report::Transition(data) = pipeline.generate_report(detection, now) {
            attention_tx.send_replace(pipeline.state().current);
            if transitions.send(data).is_err() {
                debug!("Transition receiver dropped, ending detection task");
                break;
            }
        }
    }
}
