//! Speech synthesis.
//!
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

/// Locale matched against the available voices.
pub const PREFERRED_LANGUAGE: &str = "en-IN";

/// Speech rate relative to the normal rate of the engine.
pub const SPEECH_RATE: f32 = 0.9;

/// Words per minute of espeak at rate 1.0.
const ESPEAK_WORDS_PER_MINUTE: f32 = 175.0;

/// Voice offered by a speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub language: String,
}

/// Text to speak with its voice and rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance<'a> {
    pub text: &'a str,
    pub voice: Option<&'a Voice>,
    pub rate: f32,
}

pub trait SpeechEngine: Send + Sync {
    /// Voices available on this system.
    fn voices(&self) -> Result<Vec<Voice>>;

    /// Queue an utterance. Does not wait for it to be spoken.
    fn speak(&self, utterance: &Utterance) -> Result<()>;
}

/// Engine driving the `espeak-ng` command line program.
pub struct EspeakEngine {
    program: String,
}

impl EspeakEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SpeechEngine for EspeakEngine {
    fn voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .output()
            .with_context(|| format!("failed to run {}", self.program))?;
        if !output.status.success() {
            bail!("{} --voices exited with {}", self.program, output.status);
        }

        Ok(parse_espeak_voices(&String::from_utf8_lossy(&output.stdout)))
    }

    fn speak(&self, utterance: &Utterance) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.program);
        if let Some(voice) = utterance.voice {
            command.arg("-v").arg(&voice.language);
        }
        command
            .arg("-s")
            .arg(words_per_minute(utterance.rate).to_string())
            .arg(utterance.text)
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // The runtime reaps the child once it exits
        command
            .spawn()
            .with_context(|| format!("failed to run {}", self.program))?;

        Ok(())
    }
}

/// Parse the table printed by `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-gb           --/M      English_(Great_Britain) gmw/en
/// ```
fn parse_espeak_voices(table: &str) -> Vec<Voice> {
    table
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let columns: Vec<_> = line.split_whitespace().collect();
            match columns.as_slice() {
                [_priority, language, _age_gender, name, ..] => Some(Voice {
                    name: name.replace('_', " "),
                    language: language.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

fn words_per_minute(rate: f32) -> u32 {
    (ESPEAK_WORDS_PER_MINUTE * rate).round() as u32
}

/// Voice of the preferred language, otherwise the first voice.
pub fn select_voice<'a>(voices: &'a [Voice], preferred_language: &str) -> Option<&'a Voice> {
    let preferred = preferred_language.to_ascii_lowercase();
    voices
        .iter()
        .find(|voice| voice.language.to_ascii_lowercase().contains(&preferred))
        .or_else(|| voices.first())
}

/// Speech engine with its voice, populated once when the session starts.
pub struct SpeechContext {
    engine: Box<dyn SpeechEngine>,
    voice: Option<Voice>,
    rate: f32,
}

impl SpeechContext {
    /// Query the engine for its voices and pick one. Listing the voices may
    /// run a child process, so this blocks. Use [`SpeechContext::load`] on a
    /// runtime.
    pub fn init(engine: Box<dyn SpeechEngine>, preferred_language: &str) -> Self {
        let voices = engine.voices().unwrap_or_else(|e| {
            log::warn!("Could not list voices, using engine default: {e:#}");
            Vec::new()
        });
        let voice = select_voice(&voices, preferred_language).cloned();
        match &voice {
            Some(voice) => log::info!("Speaking with voice {} ({})", voice.name, voice.language),
            None => log::info!("No voices found"),
        }

        Self {
            engine,
            voice,
            rate: SPEECH_RATE,
        }
    }

    /// Run [`SpeechContext::init`] on the blocking pool.
    pub async fn load(engine: Box<dyn SpeechEngine>, preferred_language: &str) -> Result<Self> {
        let preferred_language = preferred_language.to_owned();
        let context =
            tokio::task::spawn_blocking(move || Self::init(engine, &preferred_language)).await?;

        Ok(context)
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    pub fn say(&self, text: &str) -> Result<()> {
        self.engine.speak(&Utterance {
            text,
            voice: self.voice.as_ref(),
            rate: self.rate,
        })
    }
}

#[cfg(test)]
mod test {

    use super::*;

    const VOICES_TABLE: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en               (en 2)
 5  en-in           --/M      English_(India)    gmw/en-IN
 5  hi              --/M      Hindi              inc/hi
";

    fn voice(name: &str, language: &str) -> Voice {
        Voice {
            name: name.into(),
            language: language.into(),
        }
    }

    #[test]
    fn test_parse_voices() {
        let voices = parse_espeak_voices(VOICES_TABLE);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[1], voice("English (Great Britain)", "en-gb"));
        assert_eq!(voices[2], voice("English (India)", "en-in"));
    }

    #[test]
    fn test_prefers_locale_case_insensitively() {
        let voices = parse_espeak_voices(VOICES_TABLE);
        let selected = select_voice(&voices, PREFERRED_LANGUAGE);
        assert_eq!(selected.map(|v| v.language.as_str()), Some("en-in"));
    }

    #[test]
    fn test_falls_back_to_first_voice() {
        let voices = vec![voice("Afrikaans", "af"), voice("Hindi", "hi")];
        assert_eq!(select_voice(&voices, PREFERRED_LANGUAGE), Some(&voices[0]));
        assert_eq!(select_voice(&[], PREFERRED_LANGUAGE), None);
    }

    #[test]
    fn test_rate_in_words_per_minute() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert!((157..=158).contains(&words_per_minute(SPEECH_RATE)));
    }

    #[test]
    fn test_missing_program_has_no_voices() {
        let context = SpeechContext::init(
            Box::new(EspeakEngine::new("no-such-speech-program")),
            PREFERRED_LANGUAGE,
        );
        assert_eq!(context.voice(), None);
    }

    /// Engine whose voice listing waits for a task of the runtime.
    struct WaitingEngine {
        ready: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SpeechEngine for WaitingEngine {
        fn voices(&self) -> Result<Vec<Voice>> {
            let ready = self.ready.lock().unwrap();
            ready.recv_timeout(std::time::Duration::from_secs(5))?;
            Ok(vec![voice("English (India)", "en-in")])
        }

        fn speak(&self, _utterance: &Utterance) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_load_keeps_runtime_responsive() -> Result<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        tokio::spawn(async move { tx.send(()).ok() });

        let engine = WaitingEngine {
            ready: std::sync::Mutex::new(rx),
        };
        let context = SpeechContext::load(Box::new(engine), PREFERRED_LANGUAGE).await?;
        assert_eq!(context.voice().map(|v| v.language.as_str()), Some("en-in"));

        Ok(())
    }
}
