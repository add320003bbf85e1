//! The game's pseudo-random noise generator

use super::{samples_to_ms, SharedSpeaker, PIT_TICK_RATE, SPKR_OUTPUT_RATE};
use crate::stream::AudioStream;

/// Initial generator state
pub const RANDOM_SEED: u16 = 0x7664;

/// Fast noise mode: frequency changes per stream
const NOISE_STEPS: u32 = 500;
/// Fast noise mode: samples between frequency changes
const NOISE_SAMPLES_PER_STEP: u32 = 2;
/// Lowest PIT counter the generator may program
const MIN_PIT_COUNTER: u32 = 19;
/// Base values below this select the water gurgle range
const WATER_BASE_LIMIT: u32 = 100;
const WATER_MIN_HZ: u32 = 200;
const WATER_MAX_HZ: u32 = 2000;

/// Advance the generator by one step
///
/// Add `0x9248`, rotate right by three bits, xor `0x9248`, add `0x11`, all in
/// 16-bit arithmetic. Output must match the original driver bit for bit.
pub fn next_rand_value(value: u16) -> u16 {
    let v = value.wrapping_add(0x9248);
    let bits = v & 0x7;
    let v = (v >> 3) + (bits << 13);
    let v = v ^ 0x9248;
    v.wrapping_add(0x11)
}

/// How a generated value programs the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomTone {
    /// Raw PIT counter, as the original driver programs it
    Divisor(u32),
    /// Audible frequency in Hz (water mode)
    Hz(u32),
}

impl RandomTone {
    /// Approximate frequency in Hz
    pub fn hz(self) -> u32 {
        match self {
            RandomTone::Divisor(d) => PIT_TICK_RATE / d.max(1),
            RandomTone::Hz(hz) => hz,
        }
    }
}

/// One generator step: new state and the tone it selects for `base`
///
/// For `base >= 100` the PIT counter is `rand % (base - 99) + 100` with the
/// original's 16-bit range arithmetic. Smaller bases wrap that range into
/// near-ultrasonic counters, so they select a 200-2000 Hz tone instead.
pub fn random_step(state: u16, base: u32) -> (u16, RandomTone) {
    let value = next_rand_value(state);
    if base < WATER_BASE_LIMIT {
        let span = WATER_MAX_HZ - WATER_MIN_HZ + 1;
        let hz = WATER_MIN_HZ + value as u32 % span;
        return (value, RandomTone::Hz(hz));
    }

    let mut range = base.wrapping_sub(WATER_BASE_LIMIT - 1) & 0xffff;
    if range == 0 {
        range = 1;
    }
    let pit_counter = (value as u32 % range + WATER_BASE_LIMIT).max(MIN_PIT_COUNTER);
    (value, RandomTone::Divisor(pit_counter))
}

/// Noise built from a rapid series of random tones
pub struct RandomStream {
    speaker: SharedSpeaker,
    rand_value: u16,
    base_val: u32,
    num_steps: u32,
    samples_per_step: u32,
    cur_step: u32,
    sample_pos: u32,
    total_samples_played: u32,
    started: bool,
    finished: bool,
}

impl RandomStream {
    /// Noise around `base` lasting `d` delay units, retuned every `s` units
    ///
    /// When `s >= d` the stream runs in fast noise mode, retuning every
    /// couple of samples so no tone can form.
    pub fn new(speaker: SharedSpeaker, base: u32, d: u16, s: u16) -> Self {
        let (num_steps, samples_per_step) = if s >= d {
            (NOISE_STEPS, NOISE_SAMPLES_PER_STEP)
        } else if s == 0 {
            (1, 20)
        } else {
            let steps = (d / s).max(1) as u32;
            let per_step = (s as u32 * SPKR_OUTPUT_RATE / 10_000).max(1);
            (steps, per_step)
        };
        log::debug!(
            "random stream: base={base} d={d} s={s} num_steps={num_steps} samples_per_step={samples_per_step}"
        );
        RandomStream {
            speaker,
            rand_value: RANDOM_SEED,
            base_val: base,
            num_steps,
            samples_per_step,
            cur_step: 0,
            sample_pos: 0,
            total_samples_played: 0,
            started: false,
            finished: false,
        }
    }

    /// Current generator state
    pub fn rand_value(&self) -> u16 {
        self.rand_value
    }

    /// Advance the generator and return the next tone
    pub fn next_tone(&mut self) -> RandomTone {
        let (state, tone) = random_step(self.rand_value, self.base_val);
        self.rand_value = state;
        tone
    }

    /// Program length in samples
    pub fn duration_samples(&self) -> u32 {
        self.num_steps * self.samples_per_step
    }

    fn apply_next_tone(&mut self) {
        let tone = self.next_tone();
        let mut spk = self.speaker.lock();
        match tone {
            RandomTone::Divisor(d) => spk.set_pit_divisor(d),
            RandomTone::Hz(hz) => spk.set_frequency(hz),
        }
    }

    fn start(&mut self) {
        self.started = true;
        self.speaker.lock().set_on();
        self.apply_next_tone();
    }
}

impl AudioStream for RandomStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.finished {
            return 0;
        }
        if !self.started {
            self.start();
        }

        let samples = buffer.len();
        let mut i = 0usize;
        while i < samples && self.cur_step < self.num_steps {
            let n = ((self.samples_per_step - self.sample_pos) as usize).min(samples - i);
            self.speaker.lock().render(&mut buffer[i..i + n]);
            self.sample_pos += n as u32;
            i += n;

            if self.sample_pos >= self.samples_per_step {
                self.apply_next_tone();
                self.sample_pos = 0;
                self.cur_step += 1;
            }
        }
        self.total_samples_played += i as u32;

        if self.cur_step >= self.num_steps {
            log::trace!("random stream finished after {} samples", self.total_samples_played);
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

    /// Restart without reseeding so loops do not repeat audibly
    fn rewind(&mut self) -> bool {
        self.cur_step = 0;
        self.sample_pos = 0;
        self.total_samples_played = 0;
        self.finished = false;
        self.start();
        true
    }

    fn length_ms(&self) -> Option<u32> {
        Some(samples_to_ms(self.duration_samples() as f64, SPKR_OUTPUT_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcspeaker::PcSpeaker;
    use crate::stream::drain;

    /// Literal transcription of the driver arithmetic on wide integers
    fn reference_step(v: u32) -> u32 {
        let mut v = v + 0x9248;
        v &= 0xffff;
        let bits = v & 7;
        v = (v >> 3) + (bits << 13);
        v ^= 0x9248;
        v += 0x11;
        v & 0xffff
    }

    #[test]
    fn test_prng_matches_reference_recipe() {
        let mut a = RANDOM_SEED;
        let mut b = RANDOM_SEED as u32;
        for _ in 0..10_000 {
            a = next_rand_value(a);
            b = reference_step(b);
            assert_eq!(a as u32, b);
        }
    }

    #[test]
    fn test_prng_first_value_from_seed() {
        // 0x7664 + 0x9248 = 0x08ac; ror 3 = 0x8115; ^ 0x9248 = 0x135d; + 0x11
        assert_eq!(next_rand_value(RANDOM_SEED), 0x136e);
    }

    #[test]
    fn test_independent_streams_produce_identical_sequences() {
        let mut a = RandomStream::new(PcSpeaker::shared(), 0x2710, 0x320, 1);
        let mut b = RandomStream::new(PcSpeaker::shared(), 0x2710, 0x320, 1);
        for _ in 0..256 {
            assert_eq!(a.next_tone(), b.next_tone());
        }
    }

    #[test]
    fn test_pit_counter_range() {
        let mut state = RANDOM_SEED;
        for _ in 0..2000 {
            let (next, tone) = random_step(state, 0x2bc);
            state = next;
            match tone {
                RandomTone::Divisor(d) => assert!((100..0x2bc + 1).contains(&d), "{d}"),
                RandomTone::Hz(_) => panic!("unexpected water tone"),
            }
        }
    }

    #[test]
    fn test_water_mode_range() {
        let mut state = RANDOM_SEED;
        for _ in 0..2000 {
            let (next, tone) = random_step(state, 10);
            state = next;
            let RandomTone::Hz(hz) = tone else {
                panic!("expected water tone");
            };
            assert!((200..=2000).contains(&hz));
        }
    }

    #[test]
    fn test_fast_noise_mode_length() {
        let mut s = RandomStream::new(PcSpeaker::shared(), 10, 30, 25_000);
        let out = drain(&mut s, 333, usize::MAX);
        assert_eq!(out.len(), (NOISE_STEPS * NOISE_SAMPLES_PER_STEP) as usize);
        assert!(s.end_of_data());
    }

    #[test]
    fn test_multi_step_mode_length() {
        let mut s = RandomStream::new(PcSpeaker::shared(), 0x2bc, 0x2000, 0x320);
        // 10 steps of 1764 samples
        assert_eq!(s.duration_samples(), 10 * 1764);
        let out = drain(&mut s, 1000, usize::MAX);
        assert_eq!(out.len(), 17_640);
    }

    #[test]
    fn test_rewind_keeps_generator_running() {
        let mut s = RandomStream::new(PcSpeaker::shared(), 0x258, 0x15e, 1);
        let first = drain(&mut s, 64, usize::MAX).len();
        let state = s.rand_value();
        assert!(s.rewind());
        // rewind draws the opening tone from the running generator
        assert_eq!(s.rand_value(), next_rand_value(state));
        let second = drain(&mut s, 64, usize::MAX).len();
        assert_eq!(first, second);
        assert!(s.end_of_data());
    }
}
