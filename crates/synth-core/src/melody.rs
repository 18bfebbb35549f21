//! A short built-in melody the engine can play on startup or on demand,
//! scheduled against the same sample clock as everything else.
//!
//! Each event is a chord (a set of simultaneous MIDI notes) rather than a
//! single pitch, scheduled by relative delay rather than an absolute
//! timestamp — matching the engine's own `nextEventTime = now + (duration
//! + delay)` recurrence rather than a pre-baked timeline.
//!
//! Pending note-offs are held in a fixed-size slot array rather than an
//! unbounded queue — the melody's own notes never overlap deeply enough
//! to need more than a handful in flight at once, and a fixed bound keeps
//! the scheduler allocation-free.

use std::sync::atomic::{AtomicUsize, Ordering};

const MAX_PENDING_NOTE_OFFS: usize = 8;
const MAX_CHORD_NOTES: usize = 4;

/// One event of the built-in melody: a chord of up to four simultaneous
/// MIDI notes, how long it holds, and how long to wait after it before
/// the next event starts.
#[derive(Debug, Clone, Copy)]
pub struct MelodyEvent {
    pub notes: [i32; MAX_CHORD_NOTES],
    pub note_count: usize,
    pub duration_sec: f32,
    pub delay_after_sec: f32,
}

impl MelodyEvent {
    const fn single(note: i32, duration_sec: f32, delay_after_sec: f32) -> Self {
        Self { notes: [note, 0, 0, 0], note_count: 1, duration_sec, delay_after_sec }
    }

    pub fn notes(&self) -> &[i32] {
        &self.notes[..self.note_count]
    }
}

/// A short, public-domain-inspired eight-bar phrase in C major, used as
/// the engine's demonstration melody. The final two notes are voiced as
/// a chord to exercise the multi-note path.
pub const DEFAULT_MELODY: &[MelodyEvent] = &[
    MelodyEvent::single(72, 0.35, 0.05),
    MelodyEvent::single(71, 0.35, 0.05),
    MelodyEvent::single(69, 0.35, 0.05),
    MelodyEvent::single(67, 0.70, 0.10),
    MelodyEvent::single(69, 0.35, 0.05),
    MelodyEvent::single(67, 0.35, 0.05),
    MelodyEvent::single(65, 0.35, 0.05),
    MelodyEvent { notes: [64, 67, 72, 0], note_count: 3, duration_sec: 0.70, delay_after_sec: 0.30 },
];

#[derive(Debug, Clone, Copy)]
struct PendingOff {
    voice_slot: usize,
    at_sec: f32,
}

#[derive(Debug, Clone)]
pub struct MelodyPlayer {
    pub enabled: bool,
    pub max_loops: u32,
    events: &'static [MelodyEvent],
    elapsed_sec: f32,
    next_event_time: f32,
    index: usize,
    loop_count: u32,
    playing: bool,
    voice_count: usize,
    pending_offs: [Option<PendingOff>; MAX_PENDING_NOTE_OFFS],
}

impl Default for MelodyPlayer {
    fn default() -> Self {
        Self {
            enabled: false,
            max_loops: u32::MAX,
            events: DEFAULT_MELODY,
            elapsed_sec: 0.0,
            next_event_time: 0.0,
            index: 0,
            loop_count: 0,
            playing: false,
            voice_count: 1,
            pending_offs: [None; MAX_PENDING_NOTE_OFFS],
        }
    }
}

/// What the engine should do with the voice pool this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MelodyAction {
    NoteOn { voice_slot: usize, note: i32 },
    NoteOff { voice_slot: usize },
}

impl MelodyPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_voice_count(&mut self, count: usize) {
        self.voice_count = count.max(1);
    }

    pub fn set_melody(&mut self, events: &'static [MelodyEvent]) {
        self.events = events;
        self.restart();
    }

    pub fn restart(&mut self) {
        self.elapsed_sec = 0.0;
        self.next_event_time = 0.0;
        self.index = 0;
        self.loop_count = 0;
        self.playing = true;
        self.pending_offs = [None; MAX_PENDING_NOTE_OFFS];
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn schedule_off(&mut self, voice_slot: usize, at_sec: f32) {
        if let Some(slot) = self.pending_offs.iter_mut().find(|s| s.is_none()) {
            *slot = Some(PendingOff { voice_slot, at_sec });
        }
        // If every slot is full the note simply rings until the next
        // allocation steals it — acceptable for an 8-event demo phrase.
    }

    fn release_all_pending(&mut self, actions: &mut Vec<MelodyAction>) {
        for pending in self.pending_offs.iter_mut() {
            if let Some(p) = pending.take() {
                actions.push(MelodyAction::NoteOff { voice_slot: p.voice_slot });
            }
        }
    }

    /// Advance by `dt` seconds, returning every action due this tick.
    /// `round_robin` is the engine-wide allocation counter shared with
    /// [`crate::arpeggiator`] — a chord's notes each draw the next slot
    /// from it, same as an arp step would.
    pub fn tick(&mut self, dt: f32, round_robin: &AtomicUsize) -> Vec<MelodyAction> {
        let mut actions = Vec::new();
        if !self.enabled {
            return actions;
        }
        if !self.playing {
            self.restart();
        }
        self.elapsed_sec += dt;

        for pending in self.pending_offs.iter_mut() {
            if let Some(p) = pending {
                if p.at_sec <= self.elapsed_sec {
                    actions.push(MelodyAction::NoteOff { voice_slot: p.voice_slot });
                    *pending = None;
                }
            }
        }

        if self.index < self.events.len() && self.elapsed_sec >= self.next_event_time {
            let event = self.events[self.index];
            for &note in event.notes() {
                let slot = round_robin.fetch_add(1, Ordering::Relaxed) % self.voice_count;
                actions.push(MelodyAction::NoteOn { voice_slot: slot, note });
                self.schedule_off(slot, self.elapsed_sec + event.duration_sec);
            }
            self.next_event_time = self.elapsed_sec + event.duration_sec + event.delay_after_sec;
            self.index += 1;

            if self.index >= self.events.len() {
                self.loop_count += 1;
                if self.loop_count < self.max_loops {
                    self.index = 0;
                    self.next_event_time = self.elapsed_sec;
                } else {
                    self.release_all_pending(&mut actions);
                    self.playing = false;
                    self.index = 0;
                    self.loop_count = 0;
                    self.next_event_time = 0.0;
                    self.elapsed_sec = 0.0;
                }
            }
        }

        actions
    }
}
