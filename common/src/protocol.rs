//! Status protocol between the detector server and its clients.
//!
use serde::{Deserialize, Serialize};

use crate::labels::Label;

/// State of the classifier artifact. Exactly one of these holds at any time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Phase of the detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not detecting.
    Idle,
    /// Detecting, waiting for the next tick.
    Armed,
    /// Inference of a frame in flight.
    Sampling,
}

/// Snapshot of a detection session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusReport {
    pub model: ModelStatus,
    pub phase: Phase,
    pub muted: bool,
    pub last_detection: Option<Label>,
    pub status_text: String,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn is_detecting(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.model == ModelStatus::Loading
    }
}
