//! Single-oscillator synthesis: waveform generation plus its own ADSR envelope.
//!
//! Every [`Voice`](crate::voice::Voice) owns three of these. Each oscillator
//! tracks its own phase accumulator and envelope state machine; the voice
//! only supplies frequency/amplitude and mixes the three outputs together.

use crate::wavetable::{sin_lookup, SAMPLE_RATE};
use std::cell::Cell;

/// Semitone-to-ratio conversion factor: `ln(2) / 12`.
const SEMITONE_TO_RATIO: f32 = 0.057_762_265_046_662_1;
/// Cents-to-ratio conversion factor: `ln(2) / 1200`.
const CENTS_TO_RATIO: f32 = 0.000_578_078_077_011_74;

/// Envelope completion threshold — below this level a released envelope is
/// considered silent and snaps to [`EnvelopeStage::Off`] even if the
/// release timer hasn't quite elapsed.
const ENVELOPE_SILENCE_THRESHOLD: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Triangle,
    SawUp,
    SawDown,
    /// Pulse wave. Implemented identically to [`Waveform::Square`] — both
    /// read the same pulse-width threshold — so this is a naming alias
    /// rather than a distinct algorithm. See DESIGN.md for the rationale.
    Pulse,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// A single voltage-controlled oscillator with its own ADSR envelope.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    waveform: Waveform,

    stage: EnvelopeStage,
    attack_time: f32,
    decay_time: f32,
    sustain_level: f32,
    release_time: f32,
    envelope_level: f32,
    stage_start: f32,
    release_start_level: f32,
    note_on_time: f64,

    phase_offset_sec: f32,
    pulse_width: f32,
    pitch_shift_semitones: f32,
    detune_cents: f32,
    pitch_bend_semitones: f32,
    lfo_mod_semitones: f32,
    rand_state: Cell<u32>,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.0,
            phase: 0.0,
            waveform: Waveform::Sine,
            stage: EnvelopeStage::Off,
            attack_time: 0.01,
            decay_time: 0.1,
            sustain_level: 0.5,
            release_time: 0.2,
            envelope_level: 0.0,
            stage_start: 0.0,
            release_start_level: 0.0,
            note_on_time: 0.0,
            phase_offset_sec: 0.0,
            pulse_width: 0.5,
            pitch_shift_semitones: 0.0,
            detune_cents: 0.0,
            pitch_bend_semitones: 0.0,
            lfo_mod_semitones: 0.0,
            rand_state: Cell::new(22_222),
        }
    }
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    // -- setters -----------------------------------------------------------

    pub fn set_frequency(&mut self, freq: f32) {
        self.frequency = freq;
    }
    pub fn set_amplitude(&mut self, amp: f32) {
        self.amplitude = amp;
    }
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }
    pub fn set_phase_offset_sec(&mut self, s: f32) {
        self.phase_offset_sec = s;
    }
    pub fn set_pulse_width(&mut self, pw: f32) {
        self.pulse_width = pw.clamp(0.01, 0.99);
    }
    pub fn set_pitch_shift_semitones(&mut self, s: f32) {
        self.pitch_shift_semitones = s;
    }
    pub fn set_detune_cents(&mut self, c: f32) {
        self.detune_cents = c;
    }
    pub fn set_pitch_bend(&mut self, bend_semitones: f32) {
        self.pitch_bend_semitones = bend_semitones;
    }
    pub fn set_lfo_mod(&mut self, mod_semitones: f32) {
        self.lfo_mod_semitones = mod_semitones;
    }
    pub fn set_attack_time(&mut self, t: f32) {
        self.attack_time = t;
    }
    pub fn set_decay_time(&mut self, t: f32) {
        self.decay_time = t;
    }
    pub fn set_sustain_level(&mut self, l: f32) {
        self.sustain_level = l;
    }
    pub fn set_release_time(&mut self, t: f32) {
        self.release_time = t;
    }

    // -- getters used by unison rendering and state write-back --------------

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }
    pub fn attack_time(&self) -> f32 {
        self.attack_time
    }
    pub fn decay_time(&self) -> f32 {
        self.decay_time
    }
    pub fn sustain_level(&self) -> f32 {
        self.sustain_level
    }
    pub fn release_time(&self) -> f32 {
        self.release_time
    }
    pub fn phase_offset_sec(&self) -> f32 {
        self.phase_offset_sec
    }
    pub fn pulse_width(&self) -> f32 {
        self.pulse_width
    }
    pub fn pitch_shift_semitones(&self) -> f32 {
        self.pitch_shift_semitones
    }
    pub fn detune_cents(&self) -> f32 {
        self.detune_cents
    }
    pub fn phase(&self) -> f32 {
        self.phase
    }
    pub fn envelope_level(&self) -> f32 {
        self.envelope_level
    }
    pub fn envelope_stage(&self) -> EnvelopeStage {
        self.stage
    }
    pub fn note_on_time(&self) -> f64 {
        self.note_on_time
    }

    /// Begin the attack stage. `now` is the engine clock in seconds.
    ///
    /// Retriggering a voice mid-attack restarts the attack ramp from the
    /// envelope's *current* level rather than from zero elapsed time — this
    /// is the click-free "soft retrigger" variant (see DESIGN.md).
    pub fn note_on(&mut self, initial_amplitude: f32, now: f64) {
        self.stage = EnvelopeStage::Attack;
        self.stage_start = now as f32 - self.envelope_level * self.attack_time;
        self.amplitude = initial_amplitude;
        self.note_on_time = now;
    }

    pub fn note_off(&mut self, now: f64) {
        if self.stage != EnvelopeStage::Off {
            self.stage = EnvelopeStage::Release;
            self.stage_start = now as f32;
            self.release_start_level = self.envelope_level;
        }
    }

    fn effective_frequency(&self, extra_cents: f32) -> f32 {
        let pitch_mod =
            self.pitch_shift_semitones + self.pitch_bend_semitones + self.lfo_mod_semitones;
        let combined_cents = self.detune_cents + extra_cents;
        self.frequency
            * (pitch_mod * SEMITONE_TO_RATIO).exp()
            * (combined_cents * CENTS_TO_RATIO).exp()
    }

    /// The frequency actually sounding right now, after pitch shift, pitch
    /// bend, LFO modulation, and detune are folded in — as opposed to
    /// [`Self::set_frequency`]'s raw `frequency` field, which stays at the
    /// note's base pitch. Used by callers (and tests) that need to observe
    /// the bent/detuned pitch rather than the unbent base.
    pub fn effective_frequency_hz(&self) -> f32 {
        self.effective_frequency(0.0)
    }

    fn waveform_sample(waveform: Waveform, eff_freq: f32, t: f32, pulse_width: f32) -> f32 {
        match waveform {
            Waveform::Sine => sin_lookup(std::f32::consts::TAU * eff_freq * t),
            Waveform::Square | Waveform::Pulse => {
                let pos = eff_freq * t - (eff_freq * t).floor();
                if pos < pulse_width {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * (t * eff_freq - (t * eff_freq + 0.5).floor()),
            Waveform::SawUp => 2.0 * (t * eff_freq - (t * eff_freq).floor()) - 1.0,
            Waveform::SawDown => 1.0 - 2.0 * (t * eff_freq - (t * eff_freq).floor()),
            Waveform::Triangle => {
                2.0 * (2.0 * (2.0 * t * eff_freq - (2.0 * t * eff_freq + 0.5).floor())).abs() - 1.0
            }
            Waveform::Random => 0.0, // handled by caller (needs mutable rand state)
        }
    }

    fn lcg_sample(state: &Cell<u32>) -> f32 {
        let next = state.get().wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        state.set(next);
        Self::lcg_output(next)
    }

    /// Run one LCG step on `seed` and derive an output sample from it,
    /// without reading or mutating any stored state. Used by
    /// [`Self::generate_detuned`] so a unison copy's `Random` branch is a
    /// pure function of its local phase rather than the shared generator.
    fn lcg_sample_from_seed(seed: u32) -> f32 {
        let next = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Self::lcg_output(next)
    }

    fn lcg_output(state: u32) -> f32 {
        let v = (state >> 9) & 0x7F_FFFF;
        (v as f32 / 4_194_303.5) * 2.0 - 1.0
    }

    fn advance_envelope(&mut self, now: f64) {
        let now = now as f32;
        match self.stage {
            EnvelopeStage::Off => self.envelope_level = 0.0,
            EnvelopeStage::Attack => {
                let elapsed = now - self.stage_start;
                self.envelope_level = if self.attack_time <= 0.0 {
                    1.0
                } else {
                    (elapsed / self.attack_time).min(1.0)
                };
                if elapsed >= self.attack_time {
                    self.stage = EnvelopeStage::Decay;
                    self.stage_start = now;
                }
            }
            EnvelopeStage::Decay => {
                let elapsed = now - self.stage_start;
                self.envelope_level = if self.decay_time <= 0.0 {
                    self.sustain_level
                } else {
                    (1.0 - (elapsed / self.decay_time) * (1.0 - self.sustain_level))
                        .max(self.sustain_level)
                };
                if elapsed >= self.decay_time {
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => self.envelope_level = self.sustain_level,
            EnvelopeStage::Release => {
                let elapsed = now - self.stage_start;
                self.envelope_level = if self.release_time <= 0.0 {
                    0.0
                } else {
                    (self.release_start_level
                        - (elapsed / self.release_time) * self.release_start_level)
                        .max(0.0)
                };
                if elapsed >= self.release_time || self.envelope_level <= ENVELOPE_SILENCE_THRESHOLD
                {
                    self.stage = EnvelopeStage::Off;
                    self.envelope_level = 0.0;
                }
            }
        }
    }

    /// Generate the next sample, advancing phase and the envelope.
    /// `now` is the engine clock in seconds.
    pub fn generate(&mut self, now: f64) -> f32 {
        let t = self.phase / SAMPLE_RATE + self.phase_offset_sec;
        let eff_freq = self.effective_frequency(0.0);

        let sample = if self.waveform == Waveform::Random {
            Self::lcg_sample(&self.rand_state)
        } else {
            Self::waveform_sample(self.waveform, eff_freq, t, self.pulse_width)
        };

        self.advance_envelope(now);

        self.phase += 1.0;
        if self.phase >= SAMPLE_RATE {
            self.phase -= SAMPLE_RATE;
        }

        sample * self.amplitude * self.envelope_level
    }

    /// Generate a sample for a detuned unison copy without mutating any
    /// stored state (phase, envelope, or the noise generator). `Random`
    /// needs a distinct value per unison voice, so its branch here derives
    /// pseudo-randomness from the local phase instead of stepping the
    /// shared LCG — the same `local_phase` always yields the same sample.
    pub fn generate_detuned(&self, extra_cents: f32, extra_phase_sec: f32) -> f32 {
        let local_phase = self.phase / SAMPLE_RATE + self.phase_offset_sec + extra_phase_sec;
        let eff_freq = self.effective_frequency(extra_cents);

        let sample = if self.waveform == Waveform::Random {
            Self::lcg_sample_from_seed(local_phase.to_bits())
        } else {
            Self::waveform_sample(self.waveform, eff_freq, local_phase, self.pulse_width)
        };

        sample * self.amplitude * self.envelope_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_oscillator_is_silent() {
        let mut osc = Oscillator::new();
        for i in 0..1000 {
            assert_eq!(osc.generate(i as f64 / SAMPLE_RATE as f64), 0.0);
        }
    }

    #[test]
    fn note_on_then_full_release_returns_to_off() {
        let mut osc = Oscillator::new();
        osc.set_attack_time(0.01);
        osc.set_decay_time(0.01);
        osc.set_sustain_level(0.5);
        osc.set_release_time(0.01);
        osc.note_on(1.0, 0.0);

        let mut now = 0.0f64;
        let step = 1.0 / SAMPLE_RATE as f64;
        for _ in 0..(SAMPLE_RATE as usize) {
            osc.generate(now);
            now += step;
        }
        assert_eq!(osc.envelope_stage(), EnvelopeStage::Sustain);

        osc.note_off(now);
        for _ in 0..(SAMPLE_RATE as usize) {
            osc.generate(now);
            now += step;
        }
        assert_eq!(osc.envelope_stage(), EnvelopeStage::Off);
        assert_eq!(osc.envelope_level(), 0.0);
    }

    #[test]
    fn attack_reaches_full_level() {
        let mut osc = Oscillator::new();
        osc.set_attack_time(0.1);
        osc.note_on(1.0, 0.0);
        let step = 1.0 / SAMPLE_RATE as f64;
        let mut now = 0.0;
        for _ in 0..(SAMPLE_RATE as usize / 10 + 10) {
            osc.generate(now);
            now += step;
        }
        assert!(osc.envelope_level() >= 0.99);
    }

    #[test]
    fn pulse_and_square_produce_identical_output() {
        let mut square = Oscillator::new();
        square.set_waveform(Waveform::Square);
        square.set_amplitude(1.0);
        square.note_on(1.0, 0.0);
        square.set_frequency(220.0);

        let mut pulse = Oscillator::new();
        pulse.set_waveform(Waveform::Pulse);
        pulse.set_amplitude(1.0);
        pulse.note_on(1.0, 0.0);
        pulse.set_frequency(220.0);

        let mut now = 0.0;
        let step = 1.0 / SAMPLE_RATE as f64;
        for _ in 0..200 {
            assert_eq!(square.generate(now), pulse.generate(now));
            now += step;
        }
    }

    #[test]
    fn random_waveform_varies_sample_to_sample() {
        let mut osc = Oscillator::new();
        osc.set_waveform(Waveform::Random);
        osc.set_amplitude(1.0);
        osc.note_on(1.0, 0.0);
        let a = osc.generate(0.0);
        let b = osc.generate(1.0 / SAMPLE_RATE as f64);
        assert_ne!(a, b);
    }

    #[test]
    fn detuned_random_waveform_is_a_deterministic_function_of_local_phase() {
        let mut osc = Oscillator::new();
        osc.set_waveform(Waveform::Random);
        osc.set_amplitude(1.0);
        osc.note_on(1.0, 0.0);

        let a = osc.generate_detuned(7.0, 0.001);
        let b = osc.generate_detuned(7.0, 0.001);
        assert_eq!(a, b, "same inputs must reproduce the same sample");

        let c = osc.generate_detuned(7.0, 0.002);
        assert_ne!(a, c, "a different local phase must change the sample");
    }
}
