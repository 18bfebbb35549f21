//! Error types for the synth engine.
//!
//! Kept dependency-free (no `thiserror`) in line with the rest of this
//! crate: a hand-rolled `Display`/`Error` impl is a handful of lines and
//! keeps `synth-core` buildable with nothing but `log`.

use std::fmt;

/// Errors the engine can report. None of these originate on the audio
/// thread — `Engine::render_buffer` is infallible by construction (see
/// [`crate::engine`]).
#[derive(Debug, Clone, PartialEq)]
pub enum SynthError {
    /// A preset line used a key the parser didn't recognize. Non-fatal;
    /// the caller logs and skips the line.
    UnknownPresetKey(String),
    /// A preset value failed to parse as the type its key expects.
    InvalidPresetValue { key: String, value: String },
    /// A voice index passed to the router or schedulers was out of range.
    VoiceIndexOutOfRange(usize),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::UnknownPresetKey(key) => write!(f, "unknown preset key: {key}"),
            SynthError::InvalidPresetValue { key, value } => {
                write!(f, "invalid value {value:?} for preset key {key}")
            }
            SynthError::VoiceIndexOutOfRange(idx) => write!(f, "voice index {idx} out of range"),
        }
    }
}

impl std::error::Error for SynthError {}

pub type SynthResult<T> = Result<T, SynthError>;
