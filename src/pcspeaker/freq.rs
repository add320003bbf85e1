//! Fixed tones and frequency sweeps

use super::{samples_to_ms, SharedSpeaker, DELAY_UNIT_SAMPLES, SPKR_OUTPUT_RATE};
use crate::stream::AudioStream;

/// Sweep step length in output samples per delay unit of stepping
const SWEEP_SAMPLES_PER_UNIT: f32 = SPKR_OUTPUT_RATE as f32 * 0.000_879_533;

/// A single square-wave tone held for a number of delay units
///
/// A frequency of `0` produces silence of the same length.
pub struct FreqStream {
    speaker: SharedSpeaker,
    frequency: u32,
    duration: u32,
    total_samples_played: u32,
    started: bool,
    finished: bool,
}

impl FreqStream {
    /// Tone of `freq` Hz lasting `d` delay units
    pub fn new(speaker: SharedSpeaker, freq: u32, d: u16) -> Self {
        FreqStream {
            speaker,
            frequency: freq,
            duration: d as u32 * DELAY_UNIT_SAMPLES,
            total_samples_played: 0,
            started: false,
            finished: false,
        }
    }

    /// Program length in samples
    pub fn duration_samples(&self) -> u32 {
        self.duration
    }

    /// Samples produced since construction or the last rewind
    pub fn samples_played(&self) -> u32 {
        self.total_samples_played
    }

    fn start(&mut self) {
        self.started = true;
        if self.frequency != 0 {
            let mut spk = self.speaker.lock();
            spk.set_on();
            spk.set_frequency(self.frequency);
        }
    }
}

impl AudioStream for FreqStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.total_samples_played >= self.duration {
            return 0;
        }
        if !self.started {
            self.start();
        }

        let samples = (buffer.len() as u32).min(self.duration - self.total_samples_played) as usize;
        if self.frequency != 0 {
            self.speaker.lock().render(&mut buffer[..samples]);
        } else {
            buffer[..samples].fill(0);
        }
        self.total_samples_played += samples as u32;

        if self.total_samples_played >= self.duration {
            self.finished = true;
            self.speaker.lock().set_off();
        }
        samples
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

    fn rewind(&mut self) -> bool {
        self.total_samples_played = 0;
        self.finished = false;
        self.start();
        true
    }

    fn length_ms(&self) -> Option<u32> {
        Some(samples_to_ms(self.duration as f64, SPKR_OUTPUT_RATE))
    }
}

/// A tone gliding linearly from one frequency to another
///
/// The frequency is reprogrammed every `samples_per_step` samples. Step
/// boundaries fall between samples, so the fractional part of each step is
/// carried into the next one instead of being rounded away.
pub struct SweepFreqStream {
    speaker: SharedSpeaker,
    start_freq: i64,
    cur_freq: i64,
    freq_step: i64,
    num_steps: u32,
    samples_per_step: f32,
    sample_pos: f32,
    cur_step: u32,
    total_samples_played: u32,
    /// A boundary sample could not fit into the previous buffer
    owe_sample: bool,
    started: bool,
    finished: bool,
}

impl SweepFreqStream {
    /// Sweep from `start` to `end` Hz over `d` delay units in steps of `s` units
    pub fn new(speaker: SharedSpeaker, start: u32, end: u32, d: u16, s: u16) -> Self {
        let d = d.max(1) as i64;
        let s = s.max(1) as i64;
        let num_steps = (d / s) as u32;
        let freq_step = ((end as i64 - start as i64) * s) / d;
        let samples_per_step = s as f32 * SWEEP_SAMPLES_PER_UNIT;
        log::debug!(
            "sweep {start}->{end} Hz: num_steps = {num_steps} freq_step = {freq_step} samples_per_step = {samples_per_step}"
        );
        SweepFreqStream {
            speaker,
            start_freq: start as i64,
            cur_freq: start as i64,
            freq_step,
            num_steps,
            samples_per_step,
            sample_pos: 0.0,
            cur_step: 0,
            total_samples_played: 0,
            owe_sample: false,
            started: false,
            finished: false,
        }
    }

    /// Frequency currently programmed, in Hz
    pub fn current_frequency(&self) -> i64 {
        self.cur_freq
    }

    /// Samples produced since construction or the last rewind
    pub fn samples_played(&self) -> u32 {
        self.total_samples_played
    }

    fn start(&mut self) {
        self.started = true;
        let mut spk = self.speaker.lock();
        spk.set_on();
        spk.set_frequency(self.start_freq.max(0) as u32);
    }
}

impl AudioStream for SweepFreqStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.finished || buffer.is_empty() {
            return 0;
        }
        if !self.started {
            self.start();
        }

        let samples = buffer.len();
        let mut spk = self.speaker.lock();
        let mut i = 0usize;

        if self.owe_sample {
            spk.render(&mut buffer[..1]);
            self.owe_sample = false;
            i = 1;
        }

        while i < samples && self.cur_step < self.num_steps {
            let mut n = self.samples_per_step - self.sample_pos;
            if i as f32 + n > samples as f32 {
                n = (samples - i) as f32;
            }
            let remainder = n - n.floor();
            let whole = n.floor() as usize;

            spk.render(&mut buffer[i..i + whole]);
            self.sample_pos += whole as f32;
            i += whole;

            // a zero-width slice can only mean the step boundary is inside this sample
            if whole == 0 || self.sample_pos + remainder + 1e-4 >= self.samples_per_step {
                self.cur_freq += self.freq_step;
                spk.set_frequency(self.cur_freq.max(0) as u32);

                if remainder != 0.0 {
                    self.sample_pos = 1.0 - remainder;
                    if i < samples {
                        spk.render(&mut buffer[i..i + 1]);
                        i += 1;
                    } else {
                        self.owe_sample = true;
                    }
                } else {
                    self.sample_pos = 0.0;
                }
                self.cur_step += 1;
            }
        }

        self.total_samples_played += i as u32;

        if self.cur_step >= self.num_steps && !self.owe_sample {
            log::debug!(
                "sweep done: total_samples_played = {} cur_freq = {}",
                self.total_samples_played,
                self.cur_freq
            );
            self.finished = true;
            spk.set_off();
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

    fn rewind(&mut self) -> bool {
        self.cur_freq = self.start_freq;
        self.cur_step = 0;
        self.sample_pos = 0.0;
        self.total_samples_played = 0;
        self.owe_sample = false;
        self.finished = false;
        self.start();
        true
    }

    fn length_ms(&self) -> Option<u32> {
        Some(samples_to_ms(
            self.num_steps as f64 * self.samples_per_step as f64,
            SPKR_OUTPUT_RATE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcspeaker::PcSpeaker;
    use crate::stream::drain;

    #[test]
    fn test_freq_stream_total_matches_duration() {
        for &(freq, d, chunk) in &[(311u32, 0x0a_u16, 64usize), (2000, 0x0a, 7), (440, 300, 1000)] {
            let mut s = FreqStream::new(PcSpeaker::shared(), freq, d);
            let expected = d as u32 * DELAY_UNIT_SAMPLES;
            let mut buf = vec![0i16; chunk];
            let mut total = 0u32;
            loop {
                let n = s.read_buffer(&mut buf);
                assert!(n <= chunk);
                if n == 0 {
                    break;
                }
                total += n as u32;
            }
            assert_eq!(total, expected);
            assert!(s.end_of_data());
        }
    }

    #[test]
    fn test_freq_stream_zero_frequency_is_silent() {
        let mut s = FreqStream::new(PcSpeaker::shared(), 0, 8);
        let out = drain(&mut s, 32, usize::MAX);
        assert_eq!(out.len(), 8 * DELAY_UNIT_SAMPLES as usize);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_freq_stream_rewind_replays_same_length() {
        let mut s = FreqStream::new(PcSpeaker::shared(), 500, 20);
        let first = drain(&mut s, 100, usize::MAX).len();
        assert!(s.rewind());
        assert!(!s.end_of_data());
        let second = drain(&mut s, 33, usize::MAX).len();
        assert_eq!(first, second);
        assert!(s.end_of_data());
    }

    #[test]
    fn test_freq_stream_length_ms() {
        let s = FreqStream::new(PcSpeaker::shared(), 311, 0x0a);
        // 170 samples at 22050 Hz
        assert_eq!(s.length_ms(), Some(7));
    }

    #[test]
    fn test_sweep_reaches_end_frequency() {
        let mut s = SweepFreqStream::new(PcSpeaker::shared(), 800, 2000, 50, 1);
        let out = drain(&mut s, 128, usize::MAX);
        assert!(s.end_of_data());
        assert_eq!(s.current_frequency(), 800 + 50 * 24);
        let expected = 50.0 * SWEEP_SAMPLES_PER_UNIT;
        assert!((out.len() as f32 - expected).abs() <= 2.0, "{} vs {}", out.len(), expected);
    }

    #[test]
    fn test_sweep_length_independent_of_chunking() {
        let mut a = SweepFreqStream::new(PcSpeaker::shared(), 400, 750, 150, 5);
        let mut b = SweepFreqStream::new(PcSpeaker::shared(), 400, 750, 150, 5);
        let la = drain(&mut a, 1, usize::MAX).len();
        let lb = drain(&mut b, 4096, usize::MAX).len();
        assert_eq!(la, lb);
    }

    #[test]
    fn test_descending_sweep() {
        let mut s = SweepFreqStream::new(PcSpeaker::shared(), 2000, 1000, 10, 1);
        drain(&mut s, 256, usize::MAX);
        assert_eq!(s.current_frequency(), 1000);
    }

    #[test]
    fn test_sweep_rewind_idempotent() {
        let mut s = SweepFreqStream::new(PcSpeaker::shared(), 1200, 2000, 40, 1);
        let first = drain(&mut s, 50, usize::MAX).len();
        assert!(s.rewind());
        let second = drain(&mut s, 50, usize::MAX).len();
        assert_eq!(first, second);
        assert!(s.end_of_data());
    }
}
