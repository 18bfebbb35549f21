//! Stereo flanger: a sine-modulated short delay mixed back with the dry
//! signal, independent ring buffers per channel.

use super::ring_buffer::RingBuffer;
use crate::wavetable::{sin_lookup, SAMPLE_RATE};

const MAX_DELAY_SECONDS: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct Flanger {
    pub enabled: bool,
    pub rate_hz: f32,
    pub depth_sec: f32,
    pub mix: f32,
    phase: f32,
    left: RingBuffer,
    right: RingBuffer,
}

impl Default for Flanger {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_hz: 0.5,
            depth_sec: 0.003,
            mix: 0.5,
            phase: 0.0,
            left: RingBuffer::new((MAX_DELAY_SECONDS * SAMPLE_RATE) as usize),
            right: RingBuffer::new((MAX_DELAY_SECONDS * SAMPLE_RATE) as usize),
        }
    }
}

impl Flanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, input_l: f32, input_r: f32) -> (f32, f32) {
        if !self.enabled || self.left.is_empty() {
            return (input_l, input_r);
        }

        let lfo = sin_lookup(std::f32::consts::TAU * self.phase);
        self.phase += self.rate_hz / SAMPLE_RATE;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let mod_delay_sec = self.depth_sec * (0.5 * (lfo + 1.0));
        let mod_delay_samples = (mod_delay_sec * SAMPLE_RATE) as usize;

        let delayed_l = self.left.read(mod_delay_samples);
        let out_l = (1.0 - self.mix) * input_l + self.mix * delayed_l;
        self.left.write_at_cursor(input_l);
        self.left.advance();

        let delayed_r = self.right.read(mod_delay_samples);
        let out_r = (1.0 - self.mix) * input_r + self.mix * delayed_r;
        self.right.write_at_cursor(input_r);
        self.right.advance();

        (out_l, out_r)
    }
}
