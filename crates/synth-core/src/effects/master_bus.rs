//! The final stereo stage: DC-blocking, soft clipping, RMS-tracked
//! auto-gain, then master volume/pan and a hard clamp to the output range.

const AUTO_GAIN_TARGET_RMS: f32 = 0.2;
/// Exponential smoothing coefficient shared by both the RMS follower and
/// the gain it drives; close to 1 so either one moves over hundreds of
/// milliseconds rather than per-sample.
const AUTO_GAIN_ALPHA: f32 = 0.999;

#[derive(Debug, Clone)]
struct DcBlocker {
    alpha: f32,
    prev_input: f32,
    prev_output: f32,
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self { alpha: 0.995, prev_input: 0.0, prev_output: 0.0 }
    }
}

impl DcBlocker {
    fn process(&mut self, input: f32) -> f32 {
        let output = self.alpha * (self.prev_output + input - self.prev_input);
        self.prev_input = input;
        self.prev_output = output;
        output
    }
}

fn soft_clip(x: f32, drive: f32) -> f32 {
    (x * drive).tanh() / drive
}

#[derive(Debug, Clone)]
struct AutoGain {
    enabled: bool,
    gain: f32,
    rms: f32,
}

impl Default for AutoGain {
    fn default() -> Self {
        Self { enabled: false, gain: 1.0, rms: 0.0 }
    }
}

impl AutoGain {
    /// Per-sample RMS follower (`sqrt(x*x) == |x|`) feeding a per-sample
    /// gain follower, both smoothed with the same coefficient.
    fn process(&mut self, input: f32) -> f32 {
        if !self.enabled {
            return input;
        }
        self.rms = AUTO_GAIN_ALPHA * self.rms + (1.0 - AUTO_GAIN_ALPHA) * input.abs();
        let target_gain = if self.rms > 0.0 { AUTO_GAIN_TARGET_RMS / self.rms } else { 1.0 };
        self.gain = AUTO_GAIN_ALPHA * self.gain + (1.0 - AUTO_GAIN_ALPHA) * target_gain;
        input * self.gain
    }
}

/// Applied once per channel, after the effects chain, before the final
/// volume/pan/clamp that happens on the already-combined stereo pair.
#[derive(Debug, Clone, Default)]
struct ChannelBus {
    dc_blocker: DcBlocker,
    auto_gain: AutoGain,
}

impl ChannelBus {
    fn process(&mut self, input: f32, clip_drive: f32) -> f32 {
        let blocked = self.dc_blocker.process(input);
        let clipped = soft_clip(blocked, clip_drive.max(0.01));
        self.auto_gain.process(clipped)
    }
}

#[derive(Debug, Clone)]
pub struct MasterBus {
    pub volume: f32,
    pub pan: f32,
    pub clip_drive: f32,
    pub auto_gain_enabled: bool,
    left: ChannelBus,
    right: ChannelBus,
}

impl Default for MasterBus {
    fn default() -> Self {
        Self {
            volume: 0.8,
            pan: 0.0,
            clip_drive: 1.2,
            auto_gain_enabled: false,
            left: ChannelBus::default(),
            right: ChannelBus::default(),
        }
    }
}

impl MasterBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// DC-block, soft-clip, auto-gain each channel, then apply master
    /// volume/pan and clamp to `[-1, 1]`.
    pub fn process(&mut self, input_l: f32, input_r: f32) -> (f32, f32) {
        self.left.auto_gain.enabled = self.auto_gain_enabled;
        self.right.auto_gain.enabled = self.auto_gain_enabled;

        let l = self.left.process(input_l, self.clip_drive);
        let r = self.right.process(input_r, self.clip_drive);

        let pan_left = 1.0 - self.pan.max(0.0);
        let pan_right = 1.0 + self.pan.min(0.0);

        let out_l = (l * pan_left * self.volume).clamp(-1.0, 1.0);
        let out_r = (r * pan_right * self.volume).clamp(-1.0, 1.0);
        (out_l, out_r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_offset_is_removed_over_time() {
        let mut blocker = DcBlocker::default();
        let mut last = 0.0;
        for _ in 0..5000 {
            last = blocker.process(0.5);
        }
        assert!(last.abs() < 0.01);
    }

    #[test]
    fn soft_clip_bounds_large_input() {
        let out = soft_clip(100.0, 1.0);
        assert!(out <= 1.0);
        assert!(out > 0.0);
    }

    #[test]
    fn master_output_never_exceeds_unity() {
        let mut bus = MasterBus::new();
        bus.volume = 1.0;
        for _ in 0..1000 {
            let (l, r) = bus.process(5.0, -5.0);
            assert!(l <= 1.0 && l >= -1.0);
            assert!(r <= 1.0 && r >= -1.0);
        }
    }

    #[test]
    fn hard_pan_left_silences_right_channel() {
        let mut bus = MasterBus::new();
        bus.pan = -1.0;
        bus.clip_drive = 4.0;
        let (_, r) = bus.process(0.1, 0.1);
        assert!(r.abs() < 1e-4);
    }
}
