//! A feed-forward peak compressor: instantaneous per-sample level detection
//! in the dB domain, a ratio above threshold, and gain smoothed toward that
//! target with independent attack/release time constants — no separate
//! envelope-follower stage on the level itself.

#[derive(Debug, Clone)]
pub struct Compressor {
    pub enabled: bool,
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_sec: f32,
    pub release_sec: f32,
    pub makeup_gain_db: f32,
    sample_rate: f32,
    gain: f32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_db: -18.0,
            ratio: 4.0,
            attack_sec: 0.005,
            release_sec: 0.12,
            makeup_gain_db: 0.0,
            sample_rate: crate::wavetable::SAMPLE_RATE,
            gain: 1.0,
        }
    }
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

impl Compressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn process(&mut self, input: f32) -> f32 {
        if !self.enabled {
            return input;
        }

        let attack_coeff = (-1.0 / (self.attack_sec.max(1e-4) * self.sample_rate)).exp();
        let release_coeff = (-1.0 / (self.release_sec.max(1e-4) * self.sample_rate)).exp();
        let makeup = db_to_linear(self.makeup_gain_db);

        let input_db = 20.0 * (input.abs() + 1e-20).log10();
        let desired_gain = if input_db > self.threshold_db {
            let output_db = self.threshold_db + (input_db - self.threshold_db) / self.ratio;
            db_to_linear(output_db - input_db)
        } else {
            1.0
        };
        let coeff = if desired_gain < self.gain { attack_coeff } else { release_coeff };
        self.gain = coeff * self.gain + (1.0 - coeff) * desired_gain;

        input * self.gain * makeup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_compressor_is_transparent() {
        let mut c = Compressor::new();
        c.enabled = false;
        assert_eq!(c.process(0.9), 0.9);
    }

    #[test]
    fn signal_above_threshold_gets_attenuated_once_settled() {
        let mut c = Compressor::new();
        c.enabled = true;
        c.threshold_db = -12.0;
        c.ratio = 4.0;
        c.attack_sec = 0.001;
        c.release_sec = 0.05;
        let mut last = 0.0;
        for _ in 0..10_000 {
            last = c.process(1.0);
        }
        assert!(last < 1.0);
        assert!(last > 0.0);
    }

    #[test]
    fn silence_keeps_gain_near_unity() {
        let mut c = Compressor::new();
        c.enabled = true;
        for _ in 0..1000 {
            let out = c.process(0.0);
            assert!(out.is_finite());
        }
    }
}
