//! Filtered white noise for running water

use super::{samples_to_ms, SPKR_OUTPUT_RATE};
use crate::stream::AudioStream;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const FILTER_STAGES: usize = 3;

/// White noise through three cascaded one-pole low-pass stages
///
/// Does not use the speaker oscillator. Each stage computes
/// `y += alpha * (x - y)` with `alpha = dt / (tau + dt)` and
/// `tau = 1 / (2 * pi * cutoff)`.
pub struct WaterNoiseStream {
    rng: SmallRng,
    alpha: f32,
    stages: [f32; FILTER_STAGES],
    gain: f32,
    duration: u32,
    total_samples_played: u32,
    finished: bool,
}

impl WaterNoiseStream {
    /// Noise low-passed at `cutoff_hz`, `duration` samples long, scaled by `gain`
    pub fn new(cutoff_hz: f32, duration: u32, gain: f32) -> Self {
        Self::with_rng(cutoff_hz, duration, gain, SmallRng::from_os_rng())
    }

    /// Deterministic variant for reproducible output
    pub fn with_seed(cutoff_hz: f32, duration: u32, gain: f32, seed: u64) -> Self {
        Self::with_rng(cutoff_hz, duration, gain, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(cutoff_hz: f32, duration: u32, gain: f32, rng: SmallRng) -> Self {
        WaterNoiseStream {
            rng,
            alpha: lowpass_alpha(cutoff_hz, SPKR_OUTPUT_RATE),
            stages: [0.0; FILTER_STAGES],
            gain,
            duration,
            total_samples_played: 0,
            finished: false,
        }
    }

    /// Smoothing coefficient shared by all stages
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    #[inline]
    fn next_sample(&mut self) -> i16 {
        let mut x: f32 = self.rng.random_range(-1.0..1.0);
        for y in self.stages.iter_mut() {
            *y += self.alpha * (x - *y);
            x = *y;
        }
        (x * self.gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }
}

/// One-pole low-pass coefficient for `cutoff_hz` at `rate`
pub(crate) fn lowpass_alpha(cutoff_hz: f32, rate: u32) -> f32 {
    let dt = 1.0 / rate as f32;
    let tau = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz.max(1.0));
    dt / (tau + dt)
}

impl AudioStream for WaterNoiseStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.total_samples_played >= self.duration {
            self.finished = true;
            return 0;
        }
        let n = (buffer.len() as u32).min(self.duration - self.total_samples_played) as usize;
        for sample in buffer[..n].iter_mut() {
            *sample = self.next_sample();
        }
        self.total_samples_played += n as u32;
        if self.total_samples_played >= self.duration {
            self.finished = true;
        }
        n
    }

    fn is_stereo(&self) -> bool {
        false
    }

    fn rate(&self) -> u32 {
        SPKR_OUTPUT_RATE
    }

    fn end_of_data(&self) -> bool {
        self.finished
    }

    /// Filter state is kept so loop boundaries stay continuous
    fn rewind(&mut self) -> bool {
        self.total_samples_played = 0;
        self.finished = false;
        true
    }

    fn length_ms(&self) -> Option<u32> {
        Some(samples_to_ms(self.duration as f64, SPKR_OUTPUT_RATE))
    }
}
