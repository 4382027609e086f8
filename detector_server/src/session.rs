//! Detection session state machine.
//!
//! The session moves between `Idle`, `Armed` and `Sampling`. Every arm cycle gets a new
//! generation number, and results of a sample are only applied if they belong to the current
//! generation. This discards inference that completes after the user disarmed or re-armed.
//!
use anyhow::Result;
use common::{
    labels::Label,
    protocol::{ModelStatus, Phase, StatusReport},
};

/// Message shown when the classifier artifact could not be loaded.
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load detection model. Please check the model path.";

/// Message shown when a single tick failed.
pub const DETECTION_FAILED_MESSAGE: &str = "Detection error occurred. Please try again.";

/// Status text before the first detection.
pub const NO_DETECTION_TEXT: &str = "No Indian currency detected yet";

/// Result of toggling detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Detection started with the given generation.
    Armed(u64),
    Disarmed,
    /// Model not ready, nothing happened.
    Inert,
}

/// Result of applying a finished sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// New label, detection stopped.
    Detected(Label),
    /// Same label as last announced, detection continues.
    Unchanged(Label),
    /// Inference failed, detection continues.
    Failed,
    /// Sample belongs to an older arm cycle and was discarded.
    Stale,
}

#[derive(Debug)]
pub struct SessionState {
    model: ModelStatus,
    phase: Phase,
    muted: bool,
    last_detection: Option<Label>,
    detection_error: Option<String>,
    generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl SessionState {
    pub fn new(muted: bool) -> Self {
        Self {
            model: ModelStatus::Loading,
            phase: Phase::Idle,
            muted,
            last_detection: None,
            detection_error: None,
            generation: 0,
        }
    }

    /// Apply the outcome of the one model load of this session.
    pub fn load_complete(&mut self, result: Result<()>) {
        if self.model != ModelStatus::Loading {
            log::warn!("Ignoring repeated model load result");
            return;
        }

        self.model = match result {
            Ok(()) => ModelStatus::Ready,
            Err(e) => {
                log::error!("Error loading model: {e:#}");
                ModelStatus::Failed(LOAD_FAILED_MESSAGE.into())
            }
        };
    }

    pub fn toggle_detect(&mut self) -> Toggle {
        match self.phase {
            Phase::Idle if self.model == ModelStatus::Ready => {
                self.generation += 1;
                self.phase = Phase::Armed;
                self.detection_error = None;
                Toggle::Armed(self.generation)
            }
            Phase::Idle => Toggle::Inert,
            Phase::Armed | Phase::Sampling => {
                self.disarm();
                Toggle::Disarmed
            }
        }
    }

    /// Stop detecting. Returns whether the session was detecting.
    pub fn disarm(&mut self) -> bool {
        if self.phase == Phase::Idle {
            return false;
        }

        self.phase = Phase::Idle;
        self.generation += 1;
        true
    }

    /// Flip the mute flag and return the new value.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Enter `Sampling` for a tick of the given arm cycle.
    pub fn begin_sample(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != Phase::Armed {
            return false;
        }

        self.phase = Phase::Sampling;
        true
    }

    /// Apply the result of a sample started with [`SessionState::begin_sample`].
    pub fn complete_sample(&mut self, generation: u64, result: Result<Label>) -> SampleOutcome {
        if generation != self.generation || self.phase != Phase::Sampling {
            log::debug!("Discarding sample of generation {generation}");
            return SampleOutcome::Stale;
        }

        match result {
            Ok(label) if self.last_detection == Some(label) => {
                self.detection_error = None;
                self.phase = Phase::Armed;
                SampleOutcome::Unchanged(label)
            }
            Ok(label) => {
                self.detection_error = None;
                self.last_detection = Some(label);
                // Single shot: stop until re-armed
                self.phase = Phase::Idle;
                self.generation += 1;
                SampleOutcome::Detected(label)
            }
            Err(e) => {
                log::error!("Error during detection: {e:#}");
                self.detection_error = Some(DETECTION_FAILED_MESSAGE.into());
                self.phase = Phase::Armed;
                SampleOutcome::Failed
            }
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn last_detection(&self) -> Option<Label> {
        self.last_detection
    }

    pub fn status_text(&self) -> String {
        match self.last_detection {
            Some(label) => label.to_string(),
            None => NO_DETECTION_TEXT.into(),
        }
    }

    pub fn report(&self) -> StatusReport {
        let error = match &self.model {
            ModelStatus::Failed(message) => Some(message.clone()),
            _ => self.detection_error.clone(),
        };

        StatusReport {
            model: self.model.clone(),
            phase: self.phase,
            muted: self.muted,
            last_detection: self.last_detection,
            status_text: self.status_text(),
            error,
        }
    }
}
