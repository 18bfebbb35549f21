//! A voice: three detunable/panned oscillators (VCOs) sharing one note.

use crate::oscillator::{Oscillator, Waveform};
use crate::wavetable::midi_to_hz;

/// Per-VCO settings layered on top of the oscillator's own waveform/ADSR.
#[derive(Debug, Clone, Copy, Default)]
struct VcoState {
    mix: f32,
    detune_cents: f32,
    phase_ms: f32,
    pan: f32,
}

/// Three oscillators that sound together as one polyphonic voice.
///
/// A voice lives for the lifetime of the engine. `note_on` reinitializes it
/// for a new MIDI note; after `note_off` the voice keeps rendering until its
/// oscillators' envelopes finish releasing, at which point it becomes
/// eligible for allocation again (see [`crate::router`]).
#[derive(Debug, Clone)]
pub struct Voice {
    oscs: [Oscillator; 3],
    midi_note: i32,
    last_used: u64,
    mix_level: f32,
    /// 0 means "use the engine's global unison count".
    unison_count: u8,
    /// -1 means "use the engine's global unison spread index".
    unison_spread_index: i8,
    base_frequency: f32,
    vcos: [VcoState; 3],
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            oscs: [Oscillator::new(), Oscillator::new(), Oscillator::new()],
            midi_note: -1,
            last_used: 0,
            mix_level: 1.0,
            unison_count: 0,
            unison_spread_index: -1,
            base_frequency: 440.0,
            vcos: [
                VcoState { mix: 1.0 / 3.0, detune_cents: 0.0, phase_ms: 0.0, pan: 0.0 },
                VcoState { mix: 1.0 / 3.0, detune_cents: 0.0, phase_ms: 0.0, pan: 0.0 },
                VcoState { mix: 1.0 / 3.0, detune_cents: 0.0, phase_ms: 0.0, pan: 0.0 },
            ],
        }
    }
}

impl Voice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_on(&mut self, note: i32, velocity: f32, now: f64, sequence: u64) {
        self.midi_note = note;
        self.base_frequency = midi_to_hz(note as f32);
        for osc in &mut self.oscs {
            osc.set_frequency(self.base_frequency);
            osc.set_amplitude(velocity);
            osc.note_on(velocity, now);
        }
        self.last_used = sequence;
    }

    /// Releases all three envelopes and frees the note mapping; the voice
    /// keeps rendering audible sound until the release stage completes.
    pub fn note_off(&mut self, now: f64) {
        for osc in &mut self.oscs {
            osc.note_off(now);
        }
        self.midi_note = -1;
    }

    pub fn generate_mono(&mut self, now: f64) -> f32 {
        let mut sum = 0.0;
        for (osc, vco) in self.oscs.iter_mut().zip(self.vcos.iter()) {
            sum += osc.generate(now) * vco.mix;
        }
        sum
    }

    fn generate_mono_detuned(&self, extra_cents: f32, extra_phase_sec: f32) -> f32 {
        let mut sum = 0.0;
        for (osc, vco) in self.oscs.iter().zip(self.vcos.iter()) {
            let phase_sec = extra_phase_sec + vco.phase_ms * 0.001;
            sum += osc.generate_detuned(extra_cents + vco.detune_cents, phase_sec) * vco.mix;
        }
        sum
    }

    /// Advances state (phase/envelope) and returns an equal-power-approximate
    /// stereo pair using each VCO's own pan.
    pub fn generate_stereo(&mut self, now: f64) -> (f32, f32) {
        let mut left = 0.0;
        let mut right = 0.0;
        for (osc, vco) in self.oscs.iter_mut().zip(self.vcos.iter()) {
            let sample = osc.generate(now) * vco.mix;
            let pan_left = 1.0 - vco.pan.max(0.0);
            let pan_right = 1.0 + vco.pan.min(0.0);
            left += sample * pan_left;
            right += sample * pan_right;
        }
        (left, right)
    }

    /// Non-mutating detuned stereo generation for unison copies, panned at
    /// the voice (not per-VCO) level.
    pub fn generate_stereo_detuned(
        &self,
        extra_cents: f32,
        extra_phase_sec: f32,
        voice_pan: f32,
    ) -> (f32, f32) {
        let sample = self.generate_mono_detuned(extra_cents, extra_phase_sec);
        let pan_left = 1.0 - voice_pan.max(0.0);
        let pan_right = 1.0 + voice_pan.min(0.0);
        (sample * pan_left, sample * pan_right)
    }

    // -- global (per-voice, applied to all three oscillators) setters ------

    pub fn set_waveform(&mut self, waveform: Waveform) {
        for osc in &mut self.oscs {
            osc.set_waveform(waveform);
        }
    }
    pub fn set_attack_time(&mut self, t: f32) {
        for osc in &mut self.oscs {
            osc.set_attack_time(t);
        }
    }
    pub fn set_decay_time(&mut self, t: f32) {
        for osc in &mut self.oscs {
            osc.set_decay_time(t);
        }
    }
    pub fn set_sustain_level(&mut self, l: f32) {
        for osc in &mut self.oscs {
            osc.set_sustain_level(l);
        }
    }
    pub fn set_release_time(&mut self, t: f32) {
        for osc in &mut self.oscs {
            osc.set_release_time(t);
        }
    }
    pub fn set_mix_level(&mut self, m: f32) {
        self.mix_level = m;
    }
    pub fn set_pitch_bend(&mut self, bend_semitones: f32) {
        for osc in &mut self.oscs {
            osc.set_pitch_bend(bend_semitones);
        }
    }
    pub fn set_lfo_mod(&mut self, mod_semitones: f32) {
        for osc in &mut self.oscs {
            osc.set_lfo_mod(mod_semitones);
        }
    }
    pub fn set_unison_count(&mut self, count: u8) {
        self.unison_count = count;
    }
    pub fn set_unison_spread_index(&mut self, idx: i8) {
        self.unison_spread_index = idx;
    }

    // -- per-VCO setters -----------------------------------------------------

    pub fn set_vco_waveform(&mut self, idx: usize, waveform: Waveform) {
        self.oscs[idx].set_waveform(waveform);
    }
    pub fn set_vco_mix(&mut self, idx: usize, mix: f32) {
        self.vcos[idx].mix = mix;
    }
    pub fn set_vco_detune(&mut self, idx: usize, cents: f32) {
        self.vcos[idx].detune_cents = cents;
        self.oscs[idx].set_detune_cents(cents);
    }
    pub fn set_vco_phase_ms(&mut self, idx: usize, ms: f32) {
        self.vcos[idx].phase_ms = ms;
        self.oscs[idx].set_phase_offset_sec(ms * 0.001);
    }
    pub fn set_vco_pulse_width(&mut self, idx: usize, pw: f32) {
        self.oscs[idx].set_pulse_width(pw);
    }
    pub fn set_vco_pitch_shift(&mut self, idx: usize, semitones: f32) {
        self.oscs[idx].set_pitch_shift_semitones(semitones);
    }
    pub fn set_vco_pan(&mut self, idx: usize, pan: f32) {
        self.vcos[idx].pan = pan;
    }

    // -- getters -------------------------------------------------------------

    pub fn frequency(&self) -> f32 {
        self.base_frequency
    }
    pub fn mix_level(&self) -> f32 {
        self.mix_level
    }
    pub fn unison_count(&self) -> u8 {
        self.unison_count
    }
    pub fn unison_spread_index(&self) -> i8 {
        self.unison_spread_index
    }
    pub fn midi_note(&self) -> i32 {
        self.midi_note
    }
    pub fn last_used(&self) -> u64 {
        self.last_used
    }
    pub fn phase(&self) -> f32 {
        self.oscs[0].phase()
    }
    pub fn envelope_level(&self) -> f32 {
        self.oscs[0].envelope_level()
    }
    pub fn envelope_stage(&self) -> crate::oscillator::EnvelopeStage {
        self.oscs[0].envelope_stage()
    }
    pub fn oscillator(&self, idx: usize) -> &Oscillator {
        &self.oscs[idx]
    }
    pub fn oscillator_mut(&mut self, idx: usize) -> &mut Oscillator {
        &mut self.oscs[idx]
    }

    /// A voice is eligible for stealing/reallocation once it has no note
    /// assigned and every oscillator's envelope has reached `Off`.
    pub fn is_free(&self) -> bool {
        self.midi_note == -1
            && self
                .oscs
                .iter()
                .all(|o| o.envelope_stage() == crate::oscillator::EnvelopeStage::Off)
    }

    pub fn is_releasing(&self) -> bool {
        self.midi_note == -1 && !self.is_free()
    }
}
