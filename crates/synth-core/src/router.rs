//! Applies decoded MIDI events to the voice pool: allocation, release, and
//! the continuous controllers (pitch bend, mod wheel).
//!
//! Arpeggiator and melody playback allocate voices too, but by simple
//! round-robin over a fixed slot rather than this policy — see
//! [`crate::arpeggiator`] and [`crate::melody`]. This policy exists for
//! live MIDI input, where stealing the "least disruptive" voice matters
//! more than predictable ordering.

use crate::voice::Voice;

/// Voice-stealing order: an idle voice first, then the voice that has been
/// releasing longest, then — only if every voice is actively held — the
/// least-recently-triggered voice overall.
pub fn allocate_voice(voices: &mut [Voice]) -> usize {
    if let Some(idx) = voices.iter().position(|v| v.is_free()) {
        return idx;
    }
    if let Some(idx) = voices
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_releasing())
        .min_by_key(|(_, v)| v.last_used())
        .map(|(idx, _)| idx)
    {
        return idx;
    }
    voices
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| v.last_used())
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Find the voice currently holding `note`, if any (used to route note-off
/// without disturbing any other voice).
pub fn find_voice_for_note(voices: &[Voice], note: i32) -> Option<usize> {
    voices.iter().position(|v| v.midi_note() == note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_a_free_voice_over_stealing() {
        let mut voices = vec![Voice::new(), Voice::new()];
        voices[0].note_on(60, 1.0, 0.0, 5);
        let idx = allocate_voice(&mut voices);
        assert_eq!(idx, 1);
    }

    #[test]
    fn steals_the_releasing_voice_before_an_active_one() {
        let mut voices = vec![Voice::new(), Voice::new()];
        voices[0].set_release_time(10.0);
        voices[0].note_on(60, 1.0, 0.0, 1);
        voices[0].note_off(0.0);
        voices[1].note_on(64, 1.0, 0.0, 2);

        let idx = allocate_voice(&mut voices);
        assert_eq!(idx, 0);
    }

    #[test]
    fn steals_least_recently_used_when_all_active() {
        let mut voices = vec![Voice::new(), Voice::new()];
        voices[0].note_on(60, 1.0, 0.0, 10);
        voices[1].note_on(64, 1.0, 0.0, 20);
        let idx = allocate_voice(&mut voices);
        assert_eq!(idx, 0);
    }

    #[test]
    fn finds_the_voice_holding_a_given_note() {
        let mut voices = vec![Voice::new(), Voice::new()];
        voices[1].note_on(67, 1.0, 0.0, 1);
        assert_eq!(find_voice_for_note(&voices, 67), Some(1));
        assert_eq!(find_voice_for_note(&voices, 68), None);
    }
}
