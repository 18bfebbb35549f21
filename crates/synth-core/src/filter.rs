//! A 2-pole state-variable-style lowpass filter (bilinear transform),
//! with inertial parameter smoothing, drive/soft-clip, and optional
//! oversampling.

/// Lowest allowed Q — guards against division by zero in coefficient math.
const MIN_RESONANCE: f32 = 0.1;
/// Coefficients are only recomputed once the smoothed cutoff/Q have moved
/// past these thresholds, to avoid recomputing every single sample.
const CUTOFF_RECOMPUTE_THRESHOLD_HZ: f32 = 1.0;
const RESONANCE_RECOMPUTE_THRESHOLD: f32 = 0.01;

/// How many times to oversample the filter's internal processing.
/// `X1`/`X2`/`X4`/`X8` zero-stuff the input and average the output back
/// down, trading CPU for reduced aliasing of the drive stage's distortion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    #[default]
    None,
    X2,
    X4,
    X8,
}

impl Oversampling {
    fn factor(self) -> usize {
        match self {
            Oversampling::None => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }
}

/// A per-instance biquad lowpass. Earlier revisions of this filter cached
/// the last-recomputed cutoff/resonance in function-local `static`s, which
/// meant every instance shared one coefficient cache — harmless with a
/// single filter in the signal path, but wrong the moment two filters run
/// side by side. State now lives on `self`.
#[derive(Debug, Clone)]
pub struct Biquad {
    cutoff_hz: f32,
    resonance: f32,
    drive: f32,
    inertial: f32,
    oversampling: Oversampling,
    sample_rate: f32,

    smoothed_cutoff: f32,
    smoothed_resonance: f32,
    last_recomputed_cutoff: f32,
    last_recomputed_resonance: f32,

    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,

    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        let mut f = Self {
            cutoff_hz: 1000.0,
            resonance: 0.707,
            drive: 1.0,
            inertial: 0.0,
            oversampling: Oversampling::None,
            sample_rate: 44_100.0,
            smoothed_cutoff: 1000.0,
            smoothed_resonance: 0.707,
            last_recomputed_cutoff: -1.0,
            last_recomputed_resonance: -1.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        f.recompute_coefficients();
        f
    }
}

impl Biquad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff_hz = cutoff_hz;
    }
    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = resonance;
    }
    pub fn set_drive(&mut self, drive: f32) {
        self.drive = drive;
    }
    pub fn set_inertial(&mut self, inertial: f32) {
        self.inertial = inertial;
    }
    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        self.oversampling = oversampling;
    }
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recompute_coefficients();
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff_hz
    }
    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    fn recompute_coefficients(&mut self) {
        let cutoff_hz = self.cutoff_hz;
        let resonance = self.resonance;
        self.recompute_coefficients_for(cutoff_hz, resonance);
    }

    /// Recompute the biquad coefficients for the given (already smoothed)
    /// cutoff/resonance pair, without touching the stored setpoints.
    fn recompute_coefficients_for(&mut self, cutoff_hz: f32, resonance: f32) {
        let resonance = resonance.max(MIN_RESONANCE);
        let omega = std::f32::consts::TAU * cutoff_hz / self.sample_rate;
        let k = (omega / 2.0).tan();
        let norm = 1.0 / (1.0 + k / resonance + k * k);
        self.b0 = k * k * norm;
        self.b1 = 2.0 * self.b0;
        self.b2 = self.b0;
        self.a1 = 2.0 * (k * k - 1.0) * norm;
        self.a2 = (1.0 - k / resonance + k * k) * norm;
    }

    fn direct_form_1(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    /// Process one sample: smooth parameters, drive/soft-clip, filter
    /// (optionally oversampled), return the filtered output.
    pub fn process(&mut self, input: f32) -> f32 {
        let alpha = self.inertial;
        self.smoothed_cutoff = alpha * self.smoothed_cutoff + (1.0 - alpha) * self.cutoff_hz;
        self.smoothed_resonance =
            alpha * self.smoothed_resonance + (1.0 - alpha) * self.resonance;

        if (self.smoothed_cutoff - self.last_recomputed_cutoff).abs() > CUTOFF_RECOMPUTE_THRESHOLD_HZ
            || (self.smoothed_resonance - self.last_recomputed_resonance).abs()
                > RESONANCE_RECOMPUTE_THRESHOLD
        {
            self.last_recomputed_cutoff = self.smoothed_cutoff;
            self.last_recomputed_resonance = self.smoothed_resonance;
            let (smoothed_cutoff, smoothed_resonance) = (self.smoothed_cutoff, self.smoothed_resonance);
            self.recompute_coefficients_for(smoothed_cutoff, smoothed_resonance);
        }

        let driven = (input * self.drive).tanh();

        let factor = self.oversampling.factor();
        if factor == 1 {
            return self.direct_form_1(driven);
        }

        let mut sum = 0.0;
        for i in 0..factor {
            // Zero-stuff: only the first of each oversampled group carries
            // the actual input, the rest are silence fed through the filter
            // at the higher internal rate.
            let stuffed = if i == 0 { driven } else { 0.0 };
            sum += self.direct_form_1(stuffed);
        }
        sum / factor as f32
    }
}
