//! Arpeggiator: turns a held chord into a stepped sequence across one or
//! more octaves, voice-allocated by plain round-robin (not the stealing
//! policy in [`crate::router`] — a fixed, predictable slot per step keeps
//! the pattern from audibly reshuffling as notes come and go).
//!
//! Round-robin allocation draws from the engine's single shared counter
//! (see [`crate::engine::Engine`]) rather than a counter local to this
//! struct, so arpeggiator steps and melody chord notes never claim the
//! same voice slot in the same tick.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    UpDown,
    Random,
}

const MAX_HELD_NOTES: usize = 16;
const MAX_OCTAVES: u8 = 4;

#[derive(Debug, Clone)]
pub struct Arpeggiator {
    enabled: bool,
    pub bpm: f32,
    /// Fraction of one step's duration the triggered note stays held, 0..1.
    pub gate: f32,
    pub direction: Direction,
    /// Octave range the held chord is repeated across, 1..4.
    pub octaves: u8,
    /// When set, releasing a MIDI key does not remove it from `held_notes`.
    pub hold: bool,
    held_notes: Vec<i32>,
    pattern: Vec<i32>,
    step_index: usize,
    elapsed_sec: f32,
    last_step_time: f32,
    active_voice: Option<usize>,
    off_deadline: Option<f32>,
    rand_state: u32,
    voice_count: usize,
}

impl Default for Arpeggiator {
    fn default() -> Self {
        Self {
            enabled: false,
            bpm: 120.0,
            gate: 0.5,
            direction: Direction::Up,
            octaves: 1,
            hold: false,
            held_notes: Vec::with_capacity(MAX_HELD_NOTES),
            pattern: Vec::new(),
            step_index: 0,
            elapsed_sec: 0.0,
            last_step_time: 0.0,
            active_voice: None,
            off_deadline: None,
            rand_state: 0x9E37_79B9,
            voice_count: 1,
        }
    }
}

/// What the engine should do with the voice pool this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArpAction {
    NoteOff { voice_slot: usize },
    NoteOn { voice_slot: usize, note: i32 },
}

impl Arpeggiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle enable state. On a real transition, clears held notes and the
    /// step clock and — if a note was mid-flight — returns the voice slot
    /// that needs releasing.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<usize> {
        if self.enabled == enabled {
            return None;
        }
        self.enabled = enabled;
        self.held_notes.clear();
        self.pattern.clear();
        self.step_index = 0;
        self.off_deadline = None;
        self.elapsed_sec = 0.0;
        self.last_step_time = 0.0;
        self.active_voice.take()
    }

    pub fn set_voice_count(&mut self, count: usize) {
        self.voice_count = count.max(1);
    }

    pub fn held_notes(&self) -> &[i32] {
        &self.held_notes
    }

    pub fn note_held(&mut self, note: i32) {
        if !self.held_notes.contains(&note) && self.held_notes.len() < MAX_HELD_NOTES {
            self.held_notes.push(note);
        }
    }

    pub fn note_released(&mut self, note: i32) {
        self.held_notes.retain(|&n| n != note);
    }

    fn rebuild_pattern(&mut self) {
        let mut notes = self.held_notes.clone();
        notes.sort_unstable();
        let octaves = self.octaves.clamp(1, MAX_OCTAVES);
        let mut pattern = Vec::with_capacity(notes.len() * octaves as usize);
        for octave in 0..octaves {
            for &note in &notes {
                pattern.push(note + 12 * octave as i32);
            }
        }
        self.pattern = pattern;
    }

    fn next_lcg(&mut self) -> u32 {
        self.rand_state = self.rand_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.rand_state
    }

    /// Pick the next pattern index per `self.direction`, advancing whatever
    /// counter that direction needs. `UpDown` uses the closed-form
    /// `pattern[s]` / `pattern[2N-2-s]` split on a period-`2N-2` cycle
    /// rather than a stateful ping-pong bounce, which avoids double-playing
    /// the two end notes that a naive bounce index produces.
    fn advance_index(&mut self) -> Option<usize> {
        if self.pattern.is_empty() {
            return None;
        }
        let len = self.pattern.len();
        let idx = match self.direction {
            Direction::Up => {
                let idx = self.step_index % len;
                self.step_index += 1;
                idx
            }
            Direction::Down => {
                let idx = len - 1 - (self.step_index % len);
                self.step_index += 1;
                idx
            }
            Direction::UpDown => {
                let cycle = if len <= 1 { 1 } else { 2 * len - 2 };
                let s = self.step_index % cycle;
                self.step_index += 1;
                if s < len {
                    s
                } else {
                    2 * len - 2 - s
                }
            }
            Direction::Random => (self.next_lcg() as usize) % len,
        };
        Some(idx)
    }

    /// Advance the arpeggiator clock by `dt` seconds. `round_robin` is the
    /// engine-wide allocation counter shared with [`crate::melody`].
    ///
    /// Each tick, in order: release a note whose gate has elapsed; if no
    /// notes are held, release whatever's still sounding and reset the
    /// step; otherwise, once a sixteenth-note boundary is crossed, rebuild
    /// the pattern from the currently-held notes and trigger the next step.
    pub fn tick(&mut self, dt: f32, round_robin: &AtomicUsize) -> Vec<ArpAction> {
        let mut actions = Vec::new();
        if !self.enabled {
            return actions;
        }
        self.elapsed_sec += dt;

        if let Some(deadline) = self.off_deadline {
            if self.elapsed_sec >= deadline {
                if let Some(slot) = self.active_voice.take() {
                    actions.push(ArpAction::NoteOff { voice_slot: slot });
                }
                self.off_deadline = None;
            }
        }

        if self.held_notes.is_empty() {
            if let Some(slot) = self.active_voice.take() {
                actions.push(ArpAction::NoteOff { voice_slot: slot });
                self.off_deadline = None;
            }
            self.step_index = 0;
            return actions;
        }

        let step_seconds = 60.0 / self.bpm.max(1.0) / 4.0;
        if self.elapsed_sec - self.last_step_time >= step_seconds {
            self.last_step_time = self.elapsed_sec;
            self.rebuild_pattern();
            if let Some(idx) = self.advance_index() {
                let note = self.pattern[idx];
                let slot = round_robin.fetch_add(1, Ordering::Relaxed) % self.voice_count;
                actions.push(ArpAction::NoteOn { voice_slot: slot, note });
                self.active_voice = Some(slot);
                self.off_deadline = Some(self.elapsed_sec + self.gate.clamp(0.0, 1.0) * step_seconds);
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes_on(actions: &[ArpAction]) -> Vec<i32> {
        actions
            .iter()
            .filter_map(|a| match a {
                ArpAction::NoteOn { note, .. } => Some(*note),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn up_direction_cycles_held_notes_in_order() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.set_voice_count(4);
        arp.bpm = 120.0; // step = 0.125s
        arp.note_held(60);
        arp.note_held(64);
        arp.note_held(67);

        let rr = AtomicUsize::new(0);
        let first = notes_on(&arp.tick(0.125, &rr));
        let second = notes_on(&arp.tick(0.125, &rr));
        let third = notes_on(&arp.tick(0.125, &rr));
        assert_eq!(first, vec![60]);
        assert_eq!(second, vec![64]);
        assert_eq!(third, vec![67]);
    }

    #[test]
    fn down_direction_starts_from_the_top() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.direction = Direction::Down;
        arp.bpm = 120.0;
        arp.note_held(60);
        arp.note_held(64);
        let rr = AtomicUsize::new(0);
        assert_eq!(notes_on(&arp.tick(0.125, &rr)), vec![64]);
    }

    #[test]
    fn no_held_notes_produces_no_events() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        let rr = AtomicUsize::new(0);
        assert!(arp.tick(10.0, &rr).is_empty());
    }

    #[test]
    fn disabled_arpeggiator_never_triggers() {
        let mut arp = Arpeggiator::new();
        arp.note_held(60);
        let rr = AtomicUsize::new(0);
        assert!(arp.tick(10.0, &rr).is_empty());
    }

    #[test]
    fn octave_range_extends_the_pattern() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.octaves = 2;
        arp.bpm = 120.0;
        arp.note_held(60);
        let rr = AtomicUsize::new(0);
        let first = notes_on(&arp.tick(0.125, &rr));
        let second = notes_on(&arp.tick(0.125, &rr));
        assert_eq!(first, vec![60]);
        assert_eq!(second, vec![72]);
    }

    #[test]
    fn up_direction_produces_eight_sixteenths_within_one_second() {
        // Held {60,64,67}, Up, range 1,
        // gate 0.5, bpm 120 -> 60,64,67,60,64,67,60,64 over one second.
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.set_voice_count(8);
        arp.bpm = 120.0;
        arp.gate = 0.5;
        arp.direction = Direction::Up;
        arp.octaves = 1;
        for n in [60, 64, 67] {
            arp.note_held(n);
        }

        let rr = AtomicUsize::new(0);
        let mut all_notes = Vec::new();
        let mut elapsed = 0.0f32;
        let dt = 0.001f32;
        while elapsed < 1.0 {
            all_notes.extend(notes_on(&arp.tick(dt, &rr)));
            elapsed += dt;
        }
        assert_eq!(all_notes, vec![60, 64, 67, 60, 64, 67, 60, 64]);
    }

    #[test]
    fn updown_period_ten_sequence() {
        // held {60,64,67}, UpDown, range 2, bpm 240, gate 1.0 ->
        // period-10 cycle 60,64,67,72,76,79,76,72,67,64,60,64,...
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.set_voice_count(8);
        arp.bpm = 240.0; // step = 0.0625s
        arp.gate = 1.0;
        arp.direction = Direction::UpDown;
        arp.octaves = 2;
        for n in [60, 64, 67] {
            arp.note_held(n);
        }

        let rr = AtomicUsize::new(0);
        let mut all_notes = Vec::new();
        let step = 60.0 / 240.0 / 4.0;
        for _ in 0..12 {
            all_notes.extend(notes_on(&arp.tick(step, &rr)));
        }
        assert_eq!(
            all_notes,
            vec![60, 64, 67, 72, 76, 79, 76, 72, 67, 64, 60, 64]
        );
    }

    #[test]
    fn gate_releases_the_voice_before_the_next_step() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.set_voice_count(4);
        arp.bpm = 120.0; // step = 0.125s
        arp.gate = 0.5; // note off at 0.0625s into the step
        arp.note_held(60);

        let rr = AtomicUsize::new(0);
        let first = arp.tick(0.125, &rr);
        assert!(matches!(first.as_slice(), [ArpAction::NoteOn { voice_slot: 0, note: 60 }]));

        let mid = arp.tick(0.05, &rr);
        assert!(mid.is_empty());

        let after_gate = arp.tick(0.02, &rr);
        assert_eq!(after_gate, vec![ArpAction::NoteOff { voice_slot: 0 }]);
    }

    #[test]
    fn emptying_held_notes_releases_the_active_voice() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.set_voice_count(4);
        arp.bpm = 120.0;
        arp.gate = 1.0;
        arp.note_held(60);

        let rr = AtomicUsize::new(0);
        let first = arp.tick(0.125, &rr);
        assert!(matches!(first.as_slice(), [ArpAction::NoteOn { voice_slot: 0, .. }]));

        arp.note_released(60);
        let released = arp.tick(0.001, &rr);
        assert_eq!(released, vec![ArpAction::NoteOff { voice_slot: 0 }]);
    }

    #[test]
    fn disabling_mid_note_releases_the_active_voice_and_clears_state() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.set_voice_count(4);
        arp.bpm = 120.0;
        arp.gate = 1.0;
        arp.note_held(60);
        let rr = AtomicUsize::new(0);
        arp.tick(0.125, &rr);

        let released = arp.set_enabled(false);
        assert_eq!(released, Some(0));
        assert!(arp.held_notes().is_empty());
    }

    #[test]
    fn shares_round_robin_counter_across_calls_like_the_engine_does() {
        let mut arp = Arpeggiator::new();
        arp.set_enabled(true);
        arp.set_voice_count(8);
        arp.bpm = 120.0;
        arp.note_held(60);
        let rr = AtomicUsize::new(5);
        let actions = arp.tick(0.125, &rr);
        assert!(matches!(actions.as_slice(), [ArpAction::NoteOn { voice_slot: 5, .. }]));
        assert_eq!(rr.load(Ordering::Relaxed), 6);
    }
}
