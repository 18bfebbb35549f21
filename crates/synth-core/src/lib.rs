//! # synth-core
//!
//! The real-time engine of a polyphonic subtractive software synthesizer:
//! wavetable/oscillator synthesis with ADSR envelopes, per-voice unison,
//! a biquad filter, a flanger/delay/reverb/compressor/master-bus effects
//! chain, MIDI decoding and voice-stealing allocation, an arpeggiator and
//! a scheduled melody player, lock-free visualization taps, and a plain
//! text preset format.
//!
//! Deliberately dependency-light (`log` only) — the pure-DSP layer has no
//! business pulling in an audio backend, a MIDI transport, or a UI
//! toolkit; those live in `synth-app`. Nothing here is `Sync`: `Engine`
//! is a plain value type, and the caller supplies whatever mutual
//! exclusion its threading model needs.
//!
//! ## Main types
//!
//! - [`Engine`] — owns the voice table, global parameters, effects chain,
//!   arpeggiator, melody player, and visualization taps, and drives them
//!   all from [`Engine::render_buffer`].
//! - [`Voice`] / [`Oscillator`] / [`Biquad`] — the per-note synthesis and
//!   filtering primitives `Engine` composes.
//! - [`MidiEvent`] / [`midi::decode`] — raw MIDI byte decoding.
//! - [`Preset`] — the flat key/value save format.
//! - [`SynthError`] / [`SynthResult`] — the crate's error type.

pub mod arpeggiator;
pub mod effects;
pub mod engine;
pub mod error;
pub mod filter;
pub mod melody;
pub mod midi;
pub mod oscillator;
pub mod preset;
pub mod router;
pub mod smoothing;
pub mod viz;
pub mod voice;
pub mod wavetable;

pub use arpeggiator::{ArpAction, Arpeggiator, Direction as ArpDirection};
pub use effects::EffectsChain;
pub use engine::{Engine, NUM_VOICES};
pub use error::{SynthError, SynthResult};
pub use filter::{Biquad, Oversampling};
pub use melody::{MelodyAction, MelodyEvent, MelodyPlayer, DEFAULT_MELODY};
pub use midi::{decode as decode_midi, MidiEvent};
pub use oscillator::{EnvelopeStage, Oscillator, Waveform};
pub use preset::Preset;
pub use smoothing::{Smoother, SmoothingStyle};
pub use viz::{VizTap, Visualizer};
pub use voice::Voice;
pub use wavetable::{midi_to_hz, sin_lookup, SAMPLE_RATE};
