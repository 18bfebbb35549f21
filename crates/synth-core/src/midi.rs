//! Raw-byte MIDI decoding: note on/off, 14-bit pitch bend, and control
//! change, the handful of messages the engine actually reacts to.

/// MIDI channel (0-15).
pub type MidiChannel = u8;
/// MIDI note number (0-127, where 60 = middle C).
pub type MidiNote = u8;

/// Control-change controller numbers the engine understands by name.
pub mod cc {
    pub const MODULATION_WHEEL: u8 = 1;
    pub const ALL_NOTES_OFF: u8 = 123;
}

/// A decoded MIDI channel-voice message. Anything not listed here (system
/// messages, aftertouch, program change, sysex) falls through to `Other`
/// and is ignored by the router.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEvent {
    NoteOn { channel: MidiChannel, note: MidiNote, velocity: f32 },
    NoteOff { channel: MidiChannel, note: MidiNote, velocity: f32 },
    /// Normalized to `[-1.0, 1.0]`, center at `0.0`.
    PitchBend { channel: MidiChannel, value: f32 },
    ControlChange { channel: MidiChannel, controller: u8, value: f32 },
    Other,
}

/// Decode a single raw MIDI message (status byte plus 0-2 data bytes).
///
/// A note-on with velocity `0` is treated as a note-off, per the MIDI spec's
/// running-status convention.
pub fn decode(bytes: &[u8]) -> MidiEvent {
    if bytes.is_empty() {
        return MidiEvent::Other;
    }
    let status = bytes[0];
    let kind = status & 0xF0;
    let channel = status & 0x0F;

    match kind {
        0x90 if bytes.len() >= 3 => {
            let note = bytes[1];
            let velocity = bytes[2] as f32 / 127.0;
            if bytes[2] == 0 {
                MidiEvent::NoteOff { channel, note, velocity: 0.0 }
            } else {
                MidiEvent::NoteOn { channel, note, velocity }
            }
        }
        0x80 if bytes.len() >= 3 => {
            MidiEvent::NoteOff { channel, note: bytes[1], velocity: bytes[2] as f32 / 127.0 }
        }
        0xE0 if bytes.len() >= 3 => {
            let raw = (bytes[2] as u16) << 7 | bytes[1] as u16;
            let value = (raw as f32 - 8192.0) / 8192.0;
            MidiEvent::PitchBend { channel, value: value.clamp(-1.0, 1.0) }
        }
        0xB0 if bytes.len() >= 3 => MidiEvent::ControlChange {
            channel,
            controller: bytes[1],
            value: bytes[2] as f32 / 127.0,
        },
        _ => MidiEvent::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_note_on() {
        let ev = decode(&[0x90, 69, 100]);
        assert_eq!(ev, MidiEvent::NoteOn { channel: 0, note: 69, velocity: 100.0 / 127.0 });
    }

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        let ev = decode(&[0x91, 60, 0]);
        assert_eq!(ev, MidiEvent::NoteOff { channel: 1, note: 60, velocity: 0.0 });
    }

    #[test]
    fn decodes_note_off() {
        let ev = decode(&[0x80, 60, 64]);
        assert_eq!(ev, MidiEvent::NoteOff { channel: 0, note: 60, velocity: 64.0 / 127.0 });
    }

    #[test]
    fn pitch_bend_center_is_zero() {
        let ev = decode(&[0xE0, 0x00, 0x40]);
        match ev {
            MidiEvent::PitchBend { value, .. } => assert!(value.abs() < 0.001),
            other => panic!("expected PitchBend, got {other:?}"),
        }
    }

    #[test]
    fn pitch_bend_extremes_clamp_to_unit_range() {
        let low = decode(&[0xE0, 0x00, 0x00]);
        let high = decode(&[0xE0, 0x7F, 0x7F]);
        match (low, high) {
            (MidiEvent::PitchBend { value: lo, .. }, MidiEvent::PitchBend { value: hi, .. }) => {
                assert!(lo < -0.99);
                assert!(hi > 0.99);
            }
            _ => panic!("expected PitchBend events"),
        }
    }

    #[test]
    fn decodes_modulation_wheel_cc() {
        let ev = decode(&[0xB2, cc::MODULATION_WHEEL, 127]);
        assert_eq!(ev, MidiEvent::ControlChange { channel: 2, controller: 1, value: 1.0 });
    }

    #[test]
    fn unrecognized_status_is_other() {
        assert_eq!(decode(&[0xF0, 1, 2, 3]), MidiEvent::Other);
    }

    #[test]
    fn empty_bytes_is_other() {
        assert_eq!(decode(&[]), MidiEvent::Other);
    }
}
