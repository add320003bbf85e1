//! Sparse fire crackle

use super::{game_period_samples, samples_to_ms, SharedSpeaker, DELAY_UNIT_SAMPLES, SPKR_OUTPUT_RATE};
use crate::stream::AudioStream;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Steps in one burst window
pub const BURST_STEPS: usize = 5;
/// Delay units per step
const STEP_UNITS: u32 = 8;
/// One in this many burst steps crackles
const CRACKLE_ODDS: u32 = 8;
const CRACKLE_MIN_HZ: u32 = 2000;
const CRACKLE_MAX_HZ: u32 = 15_000;
/// Crackles are mixed well below full speaker volume
const CRACKLE_GAIN: f32 = 0.12;

/// Layout of one crackle cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePlan {
    /// First step of the burst window
    pub burst_start: usize,
    /// Tone for each burst step, `None` for silence
    pub tones: [Option<u32>; BURST_STEPS],
}

impl CyclePlan {
    /// Whether any step in the burst makes a sound
    pub fn is_audible(&self) -> bool {
        self.tones.iter().any(Option::is_some)
    }

    /// Tone for `step`, if it is an audible burst step
    pub fn tone_at(&self, step: usize) -> Option<u32> {
        step.checked_sub(self.burst_start)
            .and_then(|offset| self.tones.get(offset).copied().flatten())
    }
}

/// Pick the burst position and crackle tones for one cycle
pub fn plan_cycle<R: Rng>(rng: &mut R, steps_per_cycle: usize) -> CyclePlan {
    let last_start = steps_per_cycle.saturating_sub(BURST_STEPS);
    let burst_start = rng.random_range(0..=last_start);
    let mut tones = [None; BURST_STEPS];
    for tone in tones.iter_mut() {
        if rng.random_ratio(1, CRACKLE_ODDS) {
            *tone = Some(rng.random_range(CRACKLE_MIN_HZ..CRACKLE_MAX_HZ));
        }
    }
    CyclePlan { burst_start, tones }
}

/// Fire crackle: one short random burst per game period
///
/// The period is divided into steps of eight delay units. Every step drives
/// the speaker on or off, silent steps included, so a speaker shared with
/// other streams always sees a consistent on/off sequence.
pub struct FireStream {
    speaker: SharedSpeaker,
    rng: SmallRng,
    step_samples: u32,
    steps_per_cycle: usize,
    plan: CyclePlan,
    step: usize,
    step_pos: u32,
    finished: bool,
}

impl FireStream {
    /// Crackle with an entropy-seeded generator
    pub fn new(speaker: SharedSpeaker) -> Self {
        Self::with_rng(speaker, SmallRng::from_os_rng())
    }

    /// Deterministic crackle for reproducible output
    pub fn with_seed(speaker: SharedSpeaker, seed: u64) -> Self {
        Self::with_rng(speaker, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(speaker: SharedSpeaker, mut rng: SmallRng) -> Self {
        let step_samples = STEP_UNITS * DELAY_UNIT_SAMPLES;
        let steps_per_cycle = (game_period_samples() / step_samples) as usize;
        let plan = plan_cycle(&mut rng, steps_per_cycle);
        FireStream {
            speaker,
            rng,
            step_samples,
            steps_per_cycle,
            plan,
            step: 0,
            step_pos: 0,
            finished: false,
        }
    }

    /// Samples in one cycle
    pub fn cycle_samples(&self) -> u32 {
        self.steps_per_cycle as u32 * self.step_samples
    }

    /// Steps in one cycle
    pub fn steps_per_cycle(&self) -> usize {
        self.steps_per_cycle
    }

    /// Plan of the cycle currently playing
    pub fn plan(&self) -> &CyclePlan {
        &self.plan
    }

    fn begin_step(&mut self) {
        let mut spk = self.speaker.lock();
        match self.plan.tone_at(self.step) {
            Some(hz) => {
                spk.set_on();
                spk.set_frequency(hz);
            }
            None => spk.set_off(),
        }
    }
}

impl AudioStream for FireStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.finished {
            return 0;
        }
        let mut i = 0usize;
        while i < buffer.len() && self.step < self.steps_per_cycle {
            if self.step_pos == 0 {
                self.begin_step();
            }
            let n = ((self.step_samples - self.step_pos) as usize).min(buffer.len() - i);
            let out = &mut buffer[i..i + n];
            self.speaker.lock().render(out);
            if self.plan.tone_at(self.step).is_some() {
                for sample in out.iter_mut() {
                    *sample = (*sample as f32 * CRACKLE_GAIN) as i16;
                }
            }
            self.step_pos += n as u32;
            i += n;
            if self.step_pos >= self.step_samples {
                self.step_pos = 0;
                self.step += 1;
            }
        }
        if self.step >= self.steps_per_cycle {
            self.finished = true;
            self.speaker.lock().set_off();
        }
        i
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

    /// Starts a fresh cycle with a newly placed burst
    fn rewind(&mut self) -> bool {
        self.plan = plan_cycle(&mut self.rng, self.steps_per_cycle);
        self.step = 0;
        self.step_pos = 0;
        self.finished = false;
        true
    }

    fn length_ms(&self) -> Option<u32> {
        Some(samples_to_ms(self.cycle_samples() as f64, SPKR_OUTPUT_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcspeaker::PcSpeaker;
    use crate::stream::drain;

    #[test]
    fn test_cycle_geometry() {
        let s = FireStream::with_seed(PcSpeaker::shared(), 1);
        assert_eq!(s.steps_per_cycle(), 142);
        assert_eq!(s.cycle_samples(), 142 * 136);
    }

    #[test]
    fn test_plan_stays_inside_cycle() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..1000 {
            let plan = plan_cycle(&mut rng, 142);
            assert!(plan.burst_start + BURST_STEPS <= 142);
            for hz in plan.tones.iter().flatten() {
                assert!((CRACKLE_MIN_HZ..CRACKLE_MAX_HZ).contains(hz));
            }
        }
    }

    #[test]
    fn test_crackle_statistics_over_1000_cycles() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let audible = (0..1000)
            .filter(|_| plan_cycle(&mut rng, 142).is_audible())
            .count();
        // 1 - (7/8)^5 ~= 0.487
        let fraction = audible as f64 / 1000.0;
        assert!((0.40..=0.58).contains(&fraction), "audible fraction {fraction}");
    }

    #[test]
    fn test_silent_outside_burst() {
        let mut s = FireStream::with_seed(PcSpeaker::shared(), 11);
        let plan = *s.plan();
        let out = drain(&mut s, 1000, usize::MAX);
        assert_eq!(out.len() as u32, 142 * 136);
        let step = 136usize;
        for k in 0..142 {
            let chunk = &out[k * step..(k + 1) * step];
            if plan.tone_at(k).is_none() {
                assert!(chunk.iter().all(|&v| v == 0), "step {k} should be silent");
            } else {
                assert!(chunk.iter().all(|&v| v.abs() <= 601));
            }
        }
    }

    #[test]
    fn test_rewind_replans() {
        let mut s = FireStream::with_seed(PcSpeaker::shared(), 99);
        let len = drain(&mut s, 4096, usize::MAX).len();
        assert!(s.rewind());
        assert_eq!(drain(&mut s, 4096, usize::MAX).len(), len);
    }
}
