//! Detector session: model loading, the sampling loop and feedback.
//!
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    time::Duration,
};

use anyhow::Result;
use common::protocol::StatusReport;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    feedback::FeedbackSink,
    meter::METER,
    nn::{CurrencyModel, InferModel},
    sensors::FrameSource,
    session::{SampleOutcome, SessionState, Toggle},
};

/// Cadence of the frame sampler.
pub const TICK_INTERVAL: Duration = Duration::from_millis(1000);

pub struct Detector {
    session: Mutex<SessionState>,
    model: OnceLock<Arc<dyn InferModel>>,
    frames: Arc<dyn FrameSource>,
    feedback: FeedbackSink,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl Detector {
    pub fn new(frames: Arc<dyn FrameSource>, feedback: FeedbackSink, muted: bool) -> Self {
        Self {
            session: Mutex::new(SessionState::new(muted)),
            model: OnceLock::new(),
            frames,
            feedback,
            sampler: Mutex::new(None),
        }
    }

    /// Load the classifier on the blocking pool and apply the result.
    pub async fn load_model<F>(&self, load: F)
    where
        F: FnOnce() -> Result<Arc<dyn InferModel>> + Send + 'static,
    {
        let result = match tokio::task::spawn_blocking(load).await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        self.model_loaded(result);
    }

    /// Load the ONNX classifier at `path`.
    pub async fn load_model_from_path(&self, path: PathBuf) {
        log::info!("Loading model from {}", path.display());
        self.load_model(move || {
            let model: Arc<dyn InferModel> = Arc::new(CurrencyModel::from_path(path)?);
            Ok(model)
        })
        .await
    }

    /// Apply the outcome of the model load. Only the first outcome counts.
    pub fn model_loaded(&self, result: Result<Arc<dyn InferModel>>) {
        let result = result.and_then(|model| {
            self.model
                .set(model)
                .map_err(|_| anyhow::anyhow!("model already loaded"))
        });
        self.session().load_complete(result);
    }

    pub fn status(&self) -> StatusReport {
        self.session().report()
    }

    /// Arm or disarm detection.
    pub fn toggle_detect(self: &Arc<Self>) -> StatusReport {
        // The sampler handle is swapped under the session lock, so the stored
        // handle always belongs to the latest toggle.
        let mut session = self.session();
        match session.toggle_detect() {
            Toggle::Armed(generation) => {
                log::info!("Detection started");
                let detector = Arc::clone(self);
                let handle = tokio::spawn(async move { detector.run_sampler(generation).await });
                if let Some(previous) = self.sampler().replace(handle) {
                    previous.abort();
                }
            }
            Toggle::Disarmed => {
                log::info!("Detection stopped");
                self.stop_sampler();
            }
            Toggle::Inert => log::warn!("Model not ready, ignoring detection toggle"),
        }

        session.report()
    }

    pub fn toggle_mute(&self) -> StatusReport {
        let muted = self.session().toggle_mute();
        log::info!("Speech {}", if muted { "muted" } else { "unmuted" });

        self.status()
    }

    /// Whether a sampler timer is pending.
    pub fn is_sampler_running(&self) -> bool {
        self.sampler()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stop detecting and cancel the sampler timer.
    pub fn shutdown(&self) {
        let mut session = self.session();
        session.disarm();
        self.stop_sampler();
    }

    async fn run_sampler(self: Arc<Self>, generation: u64) {
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.sample(generation).await {
                break;
            }
        }
        log::debug!("Sampler of generation {generation} done");
    }

    /// Classify the current frame. Returns whether sampling continues.
    async fn sample(&self, generation: u64) -> bool {
        let Some(model) = self.model.get().cloned() else {
            return false;
        };
        if !self.session().begin_sample(generation) {
            return false;
        }
        METER.tick_sampled();

        let frames = Arc::clone(&self.frames);
        let result = tokio::task::spawn_blocking(move || {
            let frame = frames.current_frame()?;
            model.classify(&frame)
        })
        .await
        .unwrap_or_else(|e| Err(e.into()));

        let (outcome, muted) = {
            let mut session = self.session();
            (session.complete_sample(generation, result), session.is_muted())
        };

        match outcome {
            SampleOutcome::Detected(label) => {
                self.feedback.announce(label, muted);
                false
            }
            SampleOutcome::Unchanged(label) => {
                log::debug!("Still seeing {label}");
                true
            }
            SampleOutcome::Failed => true,
            SampleOutcome::Stale => false,
        }
    }

    fn stop_sampler(&self) {
        if let Some(handle) = self.sampler().take() {
            handle.abort();
        }
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sampler(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sampler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
