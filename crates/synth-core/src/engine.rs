//! The engine: owns the voice table, global parameters, the effects chain,
//! the arpeggiator and melody schedulers, and the visualization taps, and
//! drives them all from one render loop.
//!
//! `Engine` is a plain value type with no internal locking — it matches
//! a design note to model shared mutable state as "an explicit
//! engine value passed to the audio sink and event router" rather than
//! bidirectional ownership between voices and the schedulers that trigger
//! them. The caller (`synth-app`) supplies the mutual exclusion.

use crate::arpeggiator::{ArpAction, Arpeggiator};
use crate::effects::EffectsChain;
use crate::error::{SynthError, SynthResult};
use crate::filter::Biquad;
use crate::melody::{MelodyAction, MelodyPlayer};
use crate::midi::{self, MidiEvent};
use crate::oscillator::Waveform;
use crate::preset::Preset;
use crate::router;
use crate::smoothing::{Smoother, SmoothingStyle};
use crate::viz::Visualizer;
use crate::voice::Voice;
use crate::wavetable::{sin_lookup, SAMPLE_RATE};
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;

pub const NUM_VOICES: usize = 8;

/// Per-step-count detune (cents) for unison spread indices 0..4.
const UNISON_DETUNE_CENTS: [f32; 5] = [0.0, 3.0, 10.0, 25.0, 50.0];
/// Per-step phase offset (seconds) for the same spread indices.
const UNISON_PHASE_SEC: [f32; 5] = [0.0, 1e-4, 2.5e-4, 5e-4, 1e-3];

/// Volume/pan zipper-noise smoothing time for UI-driven parameter changes.
const MASTER_SMOOTHING_MS: f64 = 20.0;

/// The full synthesizer: voice pool, global parameters, effects, and the
/// two background-scheduled note sources (arpeggiator, melody).
pub struct Engine {
    voices: [Voice; NUM_VOICES],
    note_to_voice: HashMap<i32, usize>,
    sequence: u64,
    clock_samples: u64,

    /// Shared by every allocator that doesn't care which voice it gets:
    /// the arpeggiator and the melody scheduler (never live MIDI note-on,
    /// which always goes through [`router::allocate_voice`]).
    round_robin: AtomicUsize,

    master_volume: f32,
    master_pan: f32,
    volume_smoother: Smoother,
    pan_smoother: Smoother,
    unison_count: u8,
    unison_spread_index: u8,
    pitch_bend: f32,
    pitch_bend_range_semitones: f32,
    mod_wheel: f32,
    mod_lfo_phase: f32,
    mod_lfo_rate_hz: f32,

    pub filter_enabled: bool,
    filter_l: Biquad,
    filter_r: Biquad,

    pub effects: EffectsChain,
    pub arpeggiator: Arpeggiator,
    pub melody: MelodyPlayer,
    pub viz: Visualizer,
}

impl Default for Engine {
    fn default() -> Self {
        let mut volume_smoother = Smoother::new(SmoothingStyle::Linear(MASTER_SMOOTHING_MS));
        volume_smoother.set_sample_rate(SAMPLE_RATE as f64);
        volume_smoother.reset(0.8);
        let mut pan_smoother = Smoother::new(SmoothingStyle::Linear(MASTER_SMOOTHING_MS));
        pan_smoother.set_sample_rate(SAMPLE_RATE as f64);
        pan_smoother.reset(0.0);

        let mut arpeggiator = Arpeggiator::new();
        arpeggiator.set_voice_count(NUM_VOICES);
        let mut melody = MelodyPlayer::new();
        melody.set_voice_count(NUM_VOICES);

        Self {
            voices: std::array::from_fn(|_| Voice::new()),
            note_to_voice: HashMap::with_capacity(NUM_VOICES),
            sequence: 0,
            clock_samples: 0,
            round_robin: AtomicUsize::new(0),
            master_volume: 0.8,
            master_pan: 0.0,
            volume_smoother,
            pan_smoother,
            unison_count: 1,
            unison_spread_index: 0,
            pitch_bend: 0.0,
            pitch_bend_range_semitones: 2.0,
            mod_wheel: 0.0,
            mod_lfo_phase: 0.0,
            mod_lfo_rate_hz: 5.0,
            filter_enabled: false,
            filter_l: Biquad::new(),
            filter_r: Biquad::new(),
            effects: EffectsChain::new(),
            arpeggiator,
            melody,
            viz: Visualizer::new(NUM_VOICES),
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine's sample-counter-based wall clock, in seconds — immune to
    /// scheduler jitter ("a sample-counter-based
    /// clock is recommended").
    pub fn now(&self) -> f64 {
        self.clock_samples as f64 / SAMPLE_RATE as f64
    }

    pub fn voice(&self, idx: usize) -> SynthResult<&Voice> {
        self.voices.get(idx).ok_or(SynthError::VoiceIndexOutOfRange(idx))
    }
    pub fn voice_mut(&mut self, idx: usize) -> SynthResult<&mut Voice> {
        self.voices.get_mut(idx).ok_or(SynthError::VoiceIndexOutOfRange(idx))
    }
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume;
        self.volume_smoother.set_target(volume as f64);
    }
    pub fn set_master_pan(&mut self, pan: f32) {
        self.master_pan = pan.clamp(-1.0, 1.0);
        self.pan_smoother.set_target(self.master_pan as f64);
    }
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }
    pub fn master_pan(&self) -> f32 {
        self.master_pan
    }
    pub fn set_unison_count(&mut self, count: u8) {
        self.unison_count = count.clamp(1, 8);
    }
    pub fn set_unison_spread_index(&mut self, idx: u8) {
        self.unison_spread_index = idx.min(4);
    }
    pub fn set_pitch_bend_range_semitones(&mut self, semitones: f32) {
        self.pitch_bend_range_semitones = semitones;
    }
    pub fn set_filter_cutoff(&mut self, hz: f32) {
        self.filter_l.set_cutoff(hz);
        self.filter_r.set_cutoff(hz);
    }
    pub fn set_filter_resonance(&mut self, q: f32) {
        self.filter_l.set_resonance(q);
        self.filter_r.set_resonance(q);
    }
    pub fn filter_l(&self) -> &Biquad {
        &self.filter_l
    }
    pub fn filter_r(&self) -> &Biquad {
        &self.filter_r
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Voice-stealing live note-on. Frees any previous
    /// mapping for the chosen voice, cleanly note-offs it, then triggers.
    fn trigger_voice(&mut self, note: i32, velocity: f32) {
        let idx = router::allocate_voice(&mut self.voices);
        let now = self.now();
        let previous_note = self.voices[idx].midi_note();
        if previous_note != -1 {
            if self.note_to_voice.get(&previous_note) == Some(&idx) {
                self.note_to_voice.remove(&previous_note);
            }
            self.voices[idx].note_off(now);
        }
        let sequence = self.next_sequence();
        self.voices[idx].note_on(note, velocity, now, sequence);
        self.note_to_voice.insert(note, idx);
    }

    fn release_note(&mut self, note: i32) {
        if let Some(idx) = self.note_to_voice.remove(&note) {
            let now = self.now();
            self.voices[idx].note_off(now);
        } else if let Some(idx) = router::find_voice_for_note(&self.voices, note) {
            let now = self.now();
            self.voices[idx].note_off(now);
        }
    }

    fn all_notes_off(&mut self) {
        let now = self.now();
        for voice in &mut self.voices {
            voice.note_off(now);
        }
        self.note_to_voice.clear();
    }

    /// Decode and apply one raw MIDI message. Handles pitch
    /// bend and mod-wheel always update engine state; note-on/off either
    /// goes through the voice-stealing allocator or, with the arpeggiator
    /// enabled, only updates its held-notes set.
    pub fn handle_midi(&mut self, bytes: &[u8]) {
        let event = midi::decode(bytes);
        match event {
            MidiEvent::PitchBend { value, .. } => {
                log::debug!("pitch bend {value:.3}");
                self.pitch_bend = value;
            }
            MidiEvent::ControlChange { controller, value, .. } => {
                log::debug!("cc {controller} = {value:.3}");
                if controller == midi::cc::MODULATION_WHEEL {
                    self.mod_wheel = value;
                } else if controller == midi::cc::ALL_NOTES_OFF {
                    self.all_notes_off();
                    if self.arpeggiator.is_enabled() {
                        if let Some(slot) = self.arpeggiator.set_enabled(false) {
                            let now = self.now();
                            if let Ok(v) = self.voice_mut(slot) {
                                v.note_off(now);
                            }
                        }
                        self.arpeggiator.set_enabled(true);
                    }
                }
            }
            MidiEvent::NoteOn { note, velocity, .. } => {
                log::debug!("note on {note} vel {velocity:.3}");
                if self.arpeggiator.is_enabled() {
                    self.arpeggiator.note_held(note as i32);
                } else {
                    self.trigger_voice(note as i32, velocity);
                }
            }
            MidiEvent::NoteOff { note, .. } => {
                log::debug!("note off {note}");
                if self.arpeggiator.is_enabled() {
                    if !self.arpeggiator.hold {
                        self.arpeggiator.note_released(note as i32);
                    }
                } else {
                    self.release_note(note as i32);
                }
            }
            MidiEvent::Other => {}
        }
    }

    /// Toggle the arpeggiator on/off, releasing any in-flight arp voice and
    /// clearing held notes on the enable/disable transition.
    pub fn set_arpeggiator_enabled(&mut self, enabled: bool) {
        if let Some(slot) = self.arpeggiator.set_enabled(enabled) {
            let now = self.now();
            if let Ok(v) = self.voice_mut(slot) {
                v.note_off(now);
            }
        }
    }

    /// Erase the note-to-voice mapping for whatever note `voice_slot`
    /// currently holds, if the map still points at it. Called before any
    /// non-stealing allocator (arp, melody) repurposes a voice that live
    /// MIDI might still believe it owns, so the invariant `map[n] = v =>
    /// voices[v].midi = n` never dangles once the voice is retriggered.
    fn clear_stale_mapping(&mut self, voice_slot: usize) {
        if let Ok(v) = self.voice(voice_slot) {
            let previous_note = v.midi_note();
            if previous_note != -1 && self.note_to_voice.get(&previous_note) == Some(&voice_slot) {
                self.note_to_voice.remove(&previous_note);
            }
        }
    }

    fn apply_arp_actions(&mut self, actions: Vec<ArpAction>) {
        let now = self.now();
        for action in actions {
            match action {
                ArpAction::NoteOff { voice_slot } => {
                    if let Ok(v) = self.voice_mut(voice_slot) {
                        v.note_off(now);
                    }
                }
                ArpAction::NoteOn { voice_slot, note } => {
                    self.clear_stale_mapping(voice_slot);
                    let sequence = self.next_sequence();
                    if let Ok(v) = self.voice_mut(voice_slot) {
                        v.note_on(note, 0.8, now, sequence);
                    }
                }
            }
        }
    }

    fn apply_melody_actions(&mut self, actions: Vec<MelodyAction>) {
        let now = self.now();
        for action in actions {
            match action {
                MelodyAction::NoteOff { voice_slot } => {
                    if let Ok(v) = self.voice_mut(voice_slot) {
                        v.note_off(now);
                    }
                }
                MelodyAction::NoteOn { voice_slot, note } => {
                    self.clear_stale_mapping(voice_slot);
                    let sequence = self.next_sequence();
                    if let Ok(v) = self.voice_mut(voice_slot) {
                        v.note_on(note, 0.8, now, sequence);
                    }
                }
            }
        }
    }

    /// Tick the arpeggiator and melody scheduler by `dt` seconds. Called
    /// from the background scheduler thread (or inline, in tests) under
    /// whatever lock the caller holds — never from the audio callback.
    pub fn tick_schedulers(&mut self, dt: f32) {
        let arp_actions = self.arpeggiator.tick(dt, &self.round_robin);
        self.apply_arp_actions(arp_actions);
        let melody_actions = self.melody.tick(dt, &self.round_robin);
        self.apply_melody_actions(melody_actions);
    }

    fn unison_tables(count: u8, spread_index: u8) -> (u8, f32, f32) {
        let count = count.clamp(1, 8);
        let idx = spread_index.min(4) as usize;
        (count, UNISON_DETUNE_CENTS[idx], UNISON_PHASE_SEC[idx])
    }

    /// Sum one voice's unison copies into a stereo pair.
    fn render_voice_unison(voice: &mut Voice, global_count: u8, global_spread: u8) -> (f32, f32) {
        let count = if voice.unison_count() == 0 { global_count } else { voice.unison_count() };
        let spread = if voice.unison_spread_index() < 0 {
            global_spread
        } else {
            voice.unison_spread_index() as u8
        };
        let (n, cents_per_step, phase_per_step) = Self::unison_tables(count, spread);
        let center = (n as f32 - 1.0) / 2.0;

        let mut left = 0.0;
        let mut right = 0.0;
        for k in 0..n {
            let offset = k as f32 - center;
            if offset == 0.0 {
                let (l, r) = voice.generate_stereo(0.0);
                left += l;
                right += r;
            } else {
                let voice_pan = if offset > 0.0 { 0.5 } else { -0.5 };
                let (l, r) = voice.generate_stereo_detuned(
                    offset * cents_per_step,
                    offset * phase_per_step,
                    voice_pan,
                );
                left += l;
                right += r;
            }
        }
        let n = n as f32;
        (left / n * voice.mix_level(), right / n * voice.mix_level())
    }

    /// Advance the per-buffer modulation state: the mod-wheel vibrato LFO.
    /// Advances the LFO phase and pushes its depth into every voice once
    /// per buffer rather than once per frame, which is cheap enough at
    /// typical buffer sizes and avoids a per-sample trig call.
    fn advance_mod_lfo_and_push(&mut self) {
        self.mod_lfo_phase += self.mod_lfo_rate_hz / SAMPLE_RATE;
        if self.mod_lfo_phase >= 1.0 {
            self.mod_lfo_phase -= 1.0;
        }
        let lfo = sin_lookup(std::f32::consts::TAU * self.mod_lfo_phase) * self.mod_wheel;
        let bend_semitones = self.pitch_bend * self.pitch_bend_range_semitones;
        for voice in &mut self.voices {
            voice.set_pitch_bend(bend_semitones);
            voice.set_lfo_mod(lfo);
        }
    }

    /// Render one stereo frame (post-effects, pre-i16), pushing
    /// visualization taps for master and per-voice signals. Never call
    /// this outside `render_buffer`'s own loop or offline test harnesses —
    /// the audio path must not allocate, and every call here is
    /// allocation-free.
    fn render_stereo_frame(&mut self) -> (f32, f32) {
        let global_count = self.unison_count;
        let global_spread = self.unison_spread_index;
        // Counted against the state voices were in *entering* this frame,
        // not the state rendering may leave them in (e.g. a release that
        // completes mid-frame) — one frame of lag here is inaudible and
        // keeps the divisor from depending on render order.
        let active_voices = self.voices.iter().filter(|v| !v.is_free()).count().max(1);
        let loudness_norm = 1.0 / (active_voices as f32).sqrt();

        let mut mixed_l = 0.0;
        let mut mixed_r = 0.0;
        for (i, voice) in self.voices.iter_mut().enumerate() {
            let (l, r) = Self::render_voice_unison(voice, global_count, global_spread);
            mixed_l += l;
            mixed_r += r;
            self.viz.push_voice(i, (l + r) * 0.5);
        }
        // Spec §4.5: "divide by sqrt(|voices|) for loudness compensation."
        // Normalizing by the *currently sounding* voice count (not the fixed
        // pool size) is what keeps this compatible with a single voice at
        // amplitude 1.0 reading back at full-scale RMS (sqrt(1) == 1) while
        // still taming the loudness of many voices sounding together.
        mixed_l *= loudness_norm;
        mixed_r *= loudness_norm;

        let (l, r) = self.effects.flanger.process(mixed_l, mixed_r);
        let (l, r) = self.effects.delay.process(l, r);
        let (l, r) = self.effects.reverb.process(l, r);
        let l = self.effects.compressor_l.process(l);
        let r = self.effects.compressor_r.process(r);
        let (l, r) = if self.filter_enabled {
            (self.filter_l.process(l), self.filter_r.process(r))
        } else {
            (l, r)
        };

        self.effects.master.volume = self.volume_smoother.next() as f32;
        self.effects.master.pan = self.pan_smoother.next() as f32;
        let (l, r) = self.effects.master.process(l, r);

        self.viz.push_master(l, r);
        self.clock_samples += 1;
        (l, r)
    }

    /// Fill `out` with interleaved stereo 16-bit PCM, `out.len() / 2`
    /// frames. Advances the mod-LFO once per buffer, outside the per-frame
    /// loop below.
    pub fn render_buffer(&mut self, out: &mut [i16]) {
        self.advance_mod_lfo_and_push();
        for frame in out.chunks_exact_mut(2) {
            let (l, r) = self.render_stereo_frame();
            frame[0] = (l * 32767.0) as i16;
            frame[1] = (r * 32767.0) as i16;
        }
    }

    /// Offline float-sample rendering for tests and non-realtime tooling.
    /// Never call from the audio callback — this allocates the returned
    /// `Vec`, which the audio path must not do.
    pub fn render_float(&mut self, frame_count: usize) -> Vec<(f32, f32)> {
        self.advance_mod_lfo_and_push();
        (0..frame_count).map(|_| self.render_stereo_frame()).collect()
    }

    // -- preset save/load --------------------------------------------------

    /// Serialize every tunable parameter into a flat, dotted-key preset.
    pub fn to_preset(&self) -> Preset {
        let mut preset = Preset::new();
        preset.set("master.volume", self.master_volume);
        preset.set("master.pan", self.master_pan);
        preset.set("unison.count", self.unison_count);
        preset.set("unison.spread_index", self.unison_spread_index);
        preset.set("pitch_bend.range_semitones", self.pitch_bend_range_semitones);
        preset.set("mod_lfo.rate_hz", self.mod_lfo_rate_hz);

        preset.set("filter.enabled", self.filter_enabled);
        preset.set("filter.cutoff_hz", self.filter_l.cutoff());
        preset.set("filter.resonance", self.filter_l.resonance());

        preset.set("arp.enabled", self.arpeggiator.is_enabled());
        preset.set("arp.bpm", self.arpeggiator.bpm);
        preset.set("arp.gate", self.arpeggiator.gate);
        preset.set("arp.octaves", self.arpeggiator.octaves);
        preset.set("arp.hold", self.arpeggiator.hold);

        preset.set("effects.flanger.enabled", self.effects.flanger.enabled);
        preset.set("effects.flanger.rate_hz", self.effects.flanger.rate_hz);
        preset.set("effects.flanger.depth_sec", self.effects.flanger.depth_sec);
        preset.set("effects.flanger.mix", self.effects.flanger.mix);

        preset.set("effects.delay.enabled", self.effects.delay.enabled);
        preset.set("effects.delay.time_sec", self.effects.delay.time_sec);
        preset.set("effects.delay.feedback", self.effects.delay.feedback);
        preset.set("effects.delay.mix", self.effects.delay.mix);

        preset.set("effects.reverb.enabled", self.effects.reverb.enabled);
        preset.set("effects.reverb.size", self.effects.reverb.size);
        preset.set("effects.reverb.pre_delay_sec", self.effects.reverb.pre_delay_sec);
        preset.set("effects.reverb.damping", self.effects.reverb.damping);
        preset.set("effects.reverb.diffuse", self.effects.reverb.diffuse);
        preset.set("effects.reverb.stereo_width", self.effects.reverb.stereo_width);
        preset.set("effects.reverb.dry_mix", self.effects.reverb.dry_mix);
        preset.set("effects.reverb.wet_mix", self.effects.reverb.wet_mix);

        preset.set("effects.compressor.enabled", self.effects.compressor_l.enabled);
        preset.set("effects.compressor.threshold_db", self.effects.compressor_l.threshold_db);
        preset.set("effects.compressor.ratio", self.effects.compressor_l.ratio);
        preset.set("effects.compressor.attack_sec", self.effects.compressor_l.attack_sec);
        preset.set("effects.compressor.release_sec", self.effects.compressor_l.release_sec);
        preset.set("effects.compressor.makeup_gain_db", self.effects.compressor_l.makeup_gain_db);

        preset.set("effects.master.clip_drive", self.effects.master.clip_drive);
        preset.set("effects.master.auto_gain_enabled", self.effects.master.auto_gain_enabled);

        for (i, voice) in self.voices.iter().enumerate() {
            preset.set(&format!("voice.{i}.mix_level"), voice.mix_level());
            preset.set(&format!("voice.{i}.unison_count"), voice.unison_count());
            for vco in 0..3 {
                let osc = voice.oscillator(vco);
                let prefix = format!("voice.{i}.vco.{vco}");
                preset.set(&format!("{prefix}.waveform"), waveform_name(osc.waveform()));
                preset.set(&format!("{prefix}.attack_sec"), osc.attack_time());
                preset.set(&format!("{prefix}.decay_sec"), osc.decay_time());
                preset.set(&format!("{prefix}.sustain_level"), osc.sustain_level());
                preset.set(&format!("{prefix}.release_sec"), osc.release_time());
                preset.set(&format!("{prefix}.detune_cents"), osc.detune_cents());
                preset.set(&format!("{prefix}.phase_ms"), osc.phase_offset_sec() * 1000.0);
                preset.set(&format!("{prefix}.pulse_width"), osc.pulse_width());
                preset.set(&format!("{prefix}.pitch_shift_semitones"), osc.pitch_shift_semitones());
            }
        }
        preset
    }

    /// Apply every key this preset format knows about; unknown keys are
    /// ignored and missing keys retain whatever the engine already has,
    /// per the preset format below.
    pub fn apply_preset(&mut self, preset: &Preset) {
        if let Ok(v) = preset.get_f32("master.volume") {
            self.set_master_volume(v);
        }
        if let Ok(v) = preset.get_f32("master.pan") {
            self.set_master_pan(v);
        }
        if let Ok(v) = preset.get_u8("unison.count") {
            self.set_unison_count(v);
        }
        if let Ok(v) = preset.get_u8("unison.spread_index") {
            self.set_unison_spread_index(v);
        }
        if let Ok(v) = preset.get_f32("pitch_bend.range_semitones") {
            self.set_pitch_bend_range_semitones(v);
        }
        if let Ok(v) = preset.get_f32("mod_lfo.rate_hz") {
            self.mod_lfo_rate_hz = v;
        }

        if let Ok(v) = preset.get_bool("filter.enabled") {
            self.filter_enabled = v;
        }
        if let Ok(v) = preset.get_f32("filter.cutoff_hz") {
            self.set_filter_cutoff(v);
        }
        if let Ok(v) = preset.get_f32("filter.resonance") {
            self.set_filter_resonance(v);
        }

        if let Ok(v) = preset.get_f32("arp.bpm") {
            self.arpeggiator.bpm = v;
        }
        if let Ok(v) = preset.get_f32("arp.gate") {
            self.arpeggiator.gate = v;
        }
        if let Ok(v) = preset.get_u8("arp.octaves") {
            self.arpeggiator.octaves = v;
        }
        if let Ok(v) = preset.get_bool("arp.hold") {
            self.arpeggiator.hold = v;
        }
        if let Ok(v) = preset.get_bool("arp.enabled") {
            self.set_arpeggiator_enabled(v);
        }

        if let Ok(v) = preset.get_bool("effects.flanger.enabled") {
            self.effects.flanger.enabled = v;
        }
        if let Ok(v) = preset.get_f32("effects.flanger.rate_hz") {
            self.effects.flanger.rate_hz = v;
        }
        if let Ok(v) = preset.get_f32("effects.flanger.depth_sec") {
            self.effects.flanger.depth_sec = v;
        }
        if let Ok(v) = preset.get_f32("effects.flanger.mix") {
            self.effects.flanger.mix = v;
        }

        if let Ok(v) = preset.get_bool("effects.delay.enabled") {
            self.effects.delay.enabled = v;
        }
        if let Ok(v) = preset.get_f32("effects.delay.time_sec") {
            self.effects.delay.time_sec = v;
        }
        if let Ok(v) = preset.get_f32("effects.delay.feedback") {
            self.effects.delay.feedback = v.min(0.95);
        }
        if let Ok(v) = preset.get_f32("effects.delay.mix") {
            self.effects.delay.mix = v;
        }

        if let Ok(v) = preset.get_bool("effects.reverb.enabled") {
            self.effects.reverb.enabled = v;
        }
        if let Ok(v) = preset.get_f32("effects.reverb.size") {
            self.effects.reverb.size = v;
        }
        if let Ok(v) = preset.get_f32("effects.reverb.pre_delay_sec") {
            self.effects.reverb.pre_delay_sec = v;
        }
        if let Ok(v) = preset.get_f32("effects.reverb.damping") {
            self.effects.reverb.damping = v;
        }
        if let Ok(v) = preset.get_f32("effects.reverb.diffuse") {
            self.effects.reverb.diffuse = v;
        }
        if let Ok(v) = preset.get_f32("effects.reverb.stereo_width") {
            self.effects.reverb.stereo_width = v;
        }
        if let Ok(v) = preset.get_f32("effects.reverb.dry_mix") {
            self.effects.reverb.dry_mix = v;
        }
        if let Ok(v) = preset.get_f32("effects.reverb.wet_mix") {
            self.effects.reverb.wet_mix = v;
        }

        if let Ok(v) = preset.get_bool("effects.compressor.enabled") {
            self.effects.set_compressor_enabled(v);
        }
        if let Ok(v) = preset.get_f32("effects.compressor.threshold_db") {
            self.effects.compressor_l.threshold_db = v;
            self.effects.compressor_r.threshold_db = v;
        }
        if let Ok(v) = preset.get_f32("effects.compressor.ratio") {
            self.effects.compressor_l.ratio = v;
            self.effects.compressor_r.ratio = v;
        }
        if let Ok(v) = preset.get_f32("effects.compressor.attack_sec") {
            self.effects.compressor_l.attack_sec = v;
            self.effects.compressor_r.attack_sec = v;
        }
        if let Ok(v) = preset.get_f32("effects.compressor.release_sec") {
            self.effects.compressor_l.release_sec = v;
            self.effects.compressor_r.release_sec = v;
        }
        if let Ok(v) = preset.get_f32("effects.compressor.makeup_gain_db") {
            self.effects.compressor_l.makeup_gain_db = v;
            self.effects.compressor_r.makeup_gain_db = v;
        }

        if let Ok(v) = preset.get_f32("effects.master.clip_drive") {
            self.effects.master.clip_drive = v;
        }
        if let Ok(v) = preset.get_bool("effects.master.auto_gain_enabled") {
            self.effects.master.auto_gain_enabled = v;
        }

        for i in 0..self.voices.len() {
            if let Ok(v) = preset.get_f32(&format!("voice.{i}.mix_level")) {
                self.voices[i].set_mix_level(v);
            }
            if let Ok(v) = preset.get_u8(&format!("voice.{i}.unison_count")) {
                self.voices[i].set_unison_count(v);
            }
            for vco in 0..3 {
                let prefix = format!("voice.{i}.vco.{vco}");
                if let Ok(name) = preset.get_str(&format!("{prefix}.waveform")) {
                    if let Some(w) = waveform_from_name(name) {
                        self.voices[i].set_vco_waveform(vco, w);
                    }
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.attack_sec")) {
                    self.voices[i].oscillator_mut(vco).set_attack_time(v);
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.decay_sec")) {
                    self.voices[i].oscillator_mut(vco).set_decay_time(v);
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.sustain_level")) {
                    self.voices[i].oscillator_mut(vco).set_sustain_level(v);
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.release_sec")) {
                    self.voices[i].oscillator_mut(vco).set_release_time(v);
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.detune_cents")) {
                    self.voices[i].set_vco_detune(vco, v);
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.phase_ms")) {
                    self.voices[i].set_vco_phase_ms(vco, v);
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.pulse_width")) {
                    self.voices[i].set_vco_pulse_width(vco, v);
                }
                if let Ok(v) = preset.get_f32(&format!("{prefix}.pitch_shift_semitones")) {
                    self.voices[i].set_vco_pitch_shift(vco, v);
                }
            }
        }
    }
}

fn waveform_name(w: Waveform) -> &'static str {
    match w {
        Waveform::Sine => "sine",
        Waveform::Square => "square",
        Waveform::Saw => "saw",
        Waveform::Triangle => "triangle",
        Waveform::SawUp => "saw_up",
        Waveform::SawDown => "saw_down",
        Waveform::Pulse => "pulse",
        Waveform::Random => "random",
    }
}

fn waveform_from_name(name: &str) -> Option<Waveform> {
    match name {
        "sine" => Some(Waveform::Sine),
        "square" => Some(Waveform::Square),
        "saw" => Some(Waveform::Saw),
        "triangle" => Some(Waveform::Triangle),
        "saw_up" => Some(Waveform::SawUp),
        "saw_down" => Some(Waveform::SawDown),
        "pulse" => Some(Waveform::Pulse),
        "random" => Some(Waveform::Random),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_then_off_round_trips_through_the_map() {
        let mut engine = Engine::new();
        engine.handle_midi(&[0x90, 60, 100]);
        assert_eq!(engine.voices().iter().filter(|v| v.midi_note() == 60).count(), 1);
        engine.handle_midi(&[0x80, 60, 0]);
        for v in engine.voices() {
            assert_ne!(v.midi_note(), 60);
        }
    }

    #[test]
    fn pitch_bend_shifts_voice_frequency_once_per_buffer() {
        let mut engine = Engine::new();
        engine.set_pitch_bend_range_semitones(2.0);
        engine.handle_midi(&[0x90, 69, 127]);
        engine.handle_midi(&[0xE0, 0x7F, 0x7F]); // max bend
        let _ = engine.render_float(8);
        let idx = engine.voices().iter().position(|v| v.midi_note() == 69).unwrap();
        assert!((engine.voice(idx).unwrap().frequency() - 440.0).abs() < 0.1);
    }

    #[test]
    fn stealing_releases_the_lru_voice_and_updates_the_map() {
        let mut engine = Engine::new();
        for (i, note) in (60..68).enumerate() {
            engine.handle_midi(&[0x90, note, 100]);
            engine.sequence = i as u64 + 1;
        }
        engine.handle_midi(&[0x90, 68, 100]);
        assert!(!engine.note_to_voice.contains_key(&60));
        assert!(engine.note_to_voice.contains_key(&68));
    }

    #[test]
    fn render_buffer_produces_in_range_i16_samples() {
        let mut engine = Engine::new();
        engine.handle_midi(&[0x90, 69, 100]);
        let mut out = vec![0i16; 2048];
        engine.render_buffer(&mut out);
        assert!(out.iter().all(|&s| (-32768..=32767).contains(&s)));
    }

    #[test]
    fn arp_enabled_note_on_does_not_trigger_a_voice_directly() {
        let mut engine = Engine::new();
        engine.set_arpeggiator_enabled(true);
        engine.handle_midi(&[0x90, 60, 100]);
        assert!(engine.voices().iter().all(|v| v.midi_note() == -1));
        assert_eq!(engine.arpeggiator.held_notes(), &[60]);
    }

    #[test]
    fn preset_round_trip_preserves_master_volume_and_filter_cutoff() {
        let mut engine = Engine::new();
        engine.set_master_volume(0.42);
        engine.set_filter_cutoff(2500.0);
        let preset = engine.to_preset();

        let mut restored = Engine::new();
        restored.apply_preset(&preset);
        assert!((restored.master_volume() - 0.42).abs() < 1e-6);
        assert!((restored.filter_l().cutoff() - 2500.0).abs() < 1e-3);
    }

    #[test]
    fn all_notes_off_cc_silences_every_voice() {
        let mut engine = Engine::new();
        engine.handle_midi(&[0x90, 60, 100]);
        engine.handle_midi(&[0x90, 64, 100]);
        engine.handle_midi(&[0xB0, midi::cc::ALL_NOTES_OFF, 127]);
        assert!(engine.note_to_voice.is_empty());
    }

    #[test]
    fn unison_count_one_matches_direct_stereo_sample() {
        let mut voice = Voice::new();
        voice.set_attack_time(0.0);
        voice.note_on(69, 1.0, 0.0, 1);
        let (direct_l, direct_r) = voice.generate_stereo(0.0);
        // reset and repeat through the unison path with N=1
        let mut voice2 = Voice::new();
        voice2.set_attack_time(0.0);
        voice2.note_on(69, 1.0, 0.0, 1);
        let (unison_l, unison_r) = Engine::render_voice_unison(&mut voice2, 1, 0);
        assert!((direct_l - unison_l).abs() < 1e-5);
        assert!((direct_r - unison_r).abs() < 1e-5);
    }
}
