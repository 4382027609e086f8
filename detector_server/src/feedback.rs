//! Announcement of detected labels.
//!
use common::labels::Label;

use crate::speech::SpeechContext;

pub struct FeedbackSink {
    speech: SpeechContext,
}

impl FeedbackSink {
    pub fn new(speech: SpeechContext) -> Self {
        Self { speech }
    }

    /// Announce a newly detected label. Returns whether speech was queued.
    ///
    /// The status text is owned by the session and already shows the label, muting only
    /// suppresses speech.
    pub fn announce(&self, label: Label, muted: bool) -> bool {
        log::info!("Detected {label}");
        if muted {
            log::debug!("Muted, not speaking");
            return false;
        }

        match self.speech.say(&utterance_for(label)) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Speech failed: {e:#}");
                false
            }
        }
    }
}

pub fn utterance_for(label: Label) -> String {
    format!("Detected {label}")
}
