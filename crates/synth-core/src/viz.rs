//! Lock-free visualization taps. The render loop writes into these every
//! sample; a UI thread reads them at its own pace without blocking audio.

use std::sync::atomic::{AtomicUsize, Ordering};

const MASTER_TAP_LEN: usize = 2048;
const VOICE_TAP_LEN: usize = 512;
const MAX_VIZ_VOICES: usize = 16;

/// A single-producer, many-reader ring buffer of `f32` samples. The writer
/// increments `write_index` after each write; readers snapshot it and copy
/// out whatever range they want, tolerating the rare torn read a
/// visualization doesn't need to be sample-accurate.
pub struct VizTap {
    samples: Box<[std::sync::atomic::AtomicU32]>,
    write_index: AtomicUsize,
}

impl VizTap {
    fn new(len: usize) -> Self {
        let samples = (0..len)
            .map(|_| std::sync::atomic::AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { samples, write_index: AtomicUsize::new(0) }
    }

    pub fn push(&self, value: f32) {
        let idx = self.write_index.load(Ordering::Relaxed) % self.samples.len();
        self.samples[idx].store(value.to_bits(), Ordering::Relaxed);
        self.write_index.store(idx + 1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Snapshot the whole buffer in chronological order (oldest first).
    pub fn snapshot(&self) -> Vec<f32> {
        let write_idx = self.write_index.load(Ordering::Relaxed) % self.samples.len();
        let len = self.samples.len();
        (0..len)
            .map(|i| {
                let idx = (write_idx + i) % len;
                f32::from_bits(self.samples[idx].load(Ordering::Relaxed))
            })
            .collect()
    }
}

/// The engine's full set of visualization taps: one stereo pair of the
/// post-effects master signal, plus a per-voice tap for up to 16 voices.
pub struct Visualizer {
    pub master_left: VizTap,
    pub master_right: VizTap,
    voice_taps: Vec<VizTap>,
}

impl Visualizer {
    pub fn new(voice_count: usize) -> Self {
        let voice_count = voice_count.min(MAX_VIZ_VOICES);
        Self {
            master_left: VizTap::new(MASTER_TAP_LEN),
            master_right: VizTap::new(MASTER_TAP_LEN),
            voice_taps: (0..voice_count).map(|_| VizTap::new(VOICE_TAP_LEN)).collect(),
        }
    }

    pub fn push_master(&self, left: f32, right: f32) {
        self.master_left.push(left);
        self.master_right.push(right);
    }

    pub fn push_voice(&self, voice_index: usize, sample: f32) {
        if let Some(tap) = self.voice_taps.get(voice_index) {
            tap.push(sample);
        }
    }

    pub fn voice_tap(&self, voice_index: usize) -> Option<&VizTap> {
        self.voice_taps.get(voice_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_write_order() {
        let tap = VizTap::new(4);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            tap.push(v);
        }
        // 5 writes into a 4-slot buffer: oldest surviving is 2.0.
        assert_eq!(tap.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn voice_tap_out_of_range_is_ignored_not_panicking() {
        let viz = Visualizer::new(2);
        viz.push_voice(50, 1.0);
        assert!(viz.voice_tap(50).is_none());
    }

    #[test]
    fn voice_count_is_capped_at_sixteen() {
        let viz = Visualizer::new(64);
        assert!(viz.voice_tap(15).is_some());
        assert!(viz.voice_tap(16).is_none());
    }
}
