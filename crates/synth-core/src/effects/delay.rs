//! Stereo feedback delay line.

use super::ring_buffer::RingBuffer;
use crate::wavetable::SAMPLE_RATE;

const MAX_DELAY_SECONDS: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct Delay {
    pub enabled: bool,
    pub time_sec: f32,
    pub feedback: f32,
    pub mix: f32,
    left: RingBuffer,
    right: RingBuffer,
}

impl Default for Delay {
    fn default() -> Self {
        Self {
            enabled: false,
            time_sec: 0.3,
            feedback: 0.35,
            mix: 0.3,
            left: RingBuffer::new((MAX_DELAY_SECONDS * SAMPLE_RATE) as usize),
            right: RingBuffer::new((MAX_DELAY_SECONDS * SAMPLE_RATE) as usize),
        }
    }
}

impl Delay {
    pub fn new() -> Self {
        Self::default()
    }

    fn delay_samples(&self) -> usize {
        let max = self.left.len().saturating_sub(1);
        ((self.time_sec * SAMPLE_RATE) as usize).min(max)
    }

    fn process_channel(buf: &mut RingBuffer, input: f32, delay_samples: usize, feedback: f32, mix: f32) -> f32 {
        let delayed = buf.read(delay_samples);
        buf.write_at_cursor(input + feedback * delayed);
        buf.advance();
        (1.0 - mix) * input + mix * delayed
    }

    pub fn process(&mut self, input_l: f32, input_r: f32) -> (f32, f32) {
        if !self.enabled || self.left.is_empty() {
            return (input_l, input_r);
        }
        let delay_samples = self.delay_samples();
        let out_l = Self::process_channel(&mut self.left, input_l, delay_samples, self.feedback, self.mix);
        let out_r = Self::process_channel(&mut self.right, input_r, delay_samples, self.feedback, self.mix);
        (out_l, out_r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_delay_is_transparent() {
        let mut d = Delay::new();
        d.enabled = false;
        let (l, r) = d.process(0.6, -0.4);
        assert_eq!(l, 0.6);
        assert_eq!(r, -0.4);
    }

    #[test]
    fn echo_appears_after_delay_time() {
        let mut d = Delay::new();
        d.enabled = true;
        d.time_sec = 4.0 / SAMPLE_RATE;
        d.feedback = 0.0;
        d.mix = 1.0;
        let (first, _) = d.process(1.0, 1.0);
        assert!(first.abs() < 1e-6);
        for _ in 0..3 {
            d.process(0.0, 0.0);
        }
        let (echo, _) = d.process(0.0, 0.0);
        assert!((echo - 1.0).abs() < 1e-4);
    }

    #[test]
    fn feedback_keeps_output_bounded() {
        let mut d = Delay::new();
        d.enabled = true;
        d.feedback = 0.9;
        d.mix = 1.0;
        for _ in 0..1000 {
            let (l, r) = d.process(1.0, -1.0);
            assert!(l.is_finite());
            assert!(r.is_finite());
        }
    }
}
