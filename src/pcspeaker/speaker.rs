//! PC speaker oscillator
//!
//! Emulates the 8253 PIT channel 2 in mode 3 (square wave) gated onto the
//! speaker, DOSBox style: level changes are recorded as time-stamped delay
//! entries and each output sample is the area-weighted average of the levels
//! active during that sample. This keeps high PIT frequencies from aliasing
//! into harsh noise.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Output rate of every speaker stream, in Hz
pub const SPKR_OUTPUT_RATE: u32 = 22_050;
/// Input clock of the PIT, in Hz
pub const PIT_TICK_RATE: u32 = 1_193_182;
/// Peak amplitude of the square wave
pub const SPKR_VOLUME: f32 = 5000.0;

const SPKR_DELAY_ENTRIES: usize = 1024;
/// Sample index at which queued timestamps are rebased
const DELAY_COMPACT_THRESHOLD: f64 = 100_000.0;

/// Speaker shared by the primitives of one composite effect
pub type SharedSpeaker = Arc<Mutex<PcSpeaker>>;

#[derive(Debug, Clone, Copy)]
struct DelayEntry {
    /// Position in output samples
    index: f64,
    level: f32,
}

/// Square-wave PC speaker emulation
pub struct PcSpeaker {
    rate: u32,
    pit_divisor: u32,
    pit_index: f64,
    pit_max: f64,
    pit_half: f64,
    pit_output: bool,
    pit_level: f32,
    enabled: bool,
    delay_queue: VecDeque<DelayEntry>,
    last_queued_level: Option<f32>,
    delay_base: f64,
    /// Level in effect at the start of the next output sample
    carry_level: f32,
}

impl PcSpeaker {
    /// Create a speaker rendering at `rate` Hz
    pub fn new(rate: u32) -> Self {
        PcSpeaker {
            rate,
            pit_divisor: 0,
            pit_index: 0.0,
            pit_max: 0.0,
            pit_half: 0.0,
            pit_output: true,
            pit_level: SPKR_VOLUME,
            enabled: false,
            delay_queue: VecDeque::with_capacity(SPKR_DELAY_ENTRIES),
            last_queued_level: None,
            delay_base: 0.0,
            carry_level: 0.0,
        }
    }

    /// Create a speaker at [`SPKR_OUTPUT_RATE`] wrapped for sharing
    pub fn shared() -> SharedSpeaker {
        Arc::new(Mutex::new(PcSpeaker::new(SPKR_OUTPUT_RATE)))
    }

    /// Open the gate: restart the PIT cycle with the output high
    pub fn set_on(&mut self) {
        self.enabled = true;
        self.pit_index = 0.0;
        self.pit_output = true;
        self.pit_level = SPKR_VOLUME;
        self.add_delay_entry(self.delay_base, self.pit_level);
    }

    /// Close the gate and silence the output
    pub fn set_off(&mut self) {
        self.enabled = false;
        self.pit_level = 0.0;
        self.add_delay_entry(self.delay_base, 0.0);
    }

    /// Program a tone in Hz; `0` stops the oscillator without closing the gate
    pub fn set_frequency(&mut self, freq: u32) {
        if freq == 0 {
            self.pit_divisor = 0;
            self.pit_max = 0.0;
            self.pit_half = 0.0;
            return;
        }
        let divisor = (PIT_TICK_RATE / freq).max(2);
        self.set_pit_divisor(divisor);
    }

    /// Program the PIT counter directly
    ///
    /// The current phase is kept so reprogramming mid-cycle does not click.
    pub fn set_pit_divisor(&mut self, divisor: u32) {
        if divisor == self.pit_divisor {
            return;
        }
        self.pit_divisor = divisor;
        if divisor > 0 {
            self.pit_max = divisor as f64 * self.rate as f64 / PIT_TICK_RATE as f64;
            self.pit_half = self.pit_max / 2.0;
            if self.pit_index > self.pit_max {
                self.pit_index %= self.pit_max;
            }
        } else {
            self.pit_max = 0.0;
            self.pit_half = 0.0;
        }
    }

    /// Whether the speaker gate is open
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Currently programmed PIT counter
    pub fn pit_divisor(&self) -> u32 {
        self.pit_divisor
    }

    /// Output rate in Hz
    pub fn rate(&self) -> u32 {
        self.rate
    }

    fn add_delay_entry(&mut self, index: f64, level: f32) {
        if self.last_queued_level == Some(level) {
            return;
        }
        if self.delay_queue.len() >= SPKR_DELAY_ENTRIES {
            self.delay_queue.pop_front();
        }
        self.delay_queue.push_back(DelayEntry { index, level });
        self.last_queued_level = Some(level);
    }

    fn toggle_output(&mut self, at: f64) {
        self.pit_output = !self.pit_output;
        self.pit_level = if self.pit_output {
            SPKR_VOLUME
        } else {
            -SPKR_VOLUME
        };
        self.add_delay_entry(at, self.pit_level);
        if self.pit_output {
            self.pit_index = 0.0;
        }
    }

    /// Advance the PIT by `amount` output samples, queueing every edge
    fn forward_pit(&mut self, amount: f64) {
        if !self.enabled || self.pit_max <= 0.0 || self.pit_half <= 0.0 {
            return;
        }

        let start = self.delay_base;
        let mut done = 0.0;
        while done < amount {
            let remaining = amount - done;
            let time_to_toggle = if self.pit_output {
                self.pit_half - self.pit_index
            } else {
                self.pit_max - self.pit_index
            };

            if time_to_toggle <= 0.0 {
                self.toggle_output(start + done);
            } else if time_to_toggle <= remaining {
                done += time_to_toggle;
                self.pit_index += time_to_toggle;
                self.toggle_output(start + done);
            } else {
                self.pit_index += remaining;
                done = amount;
            }
        }
    }

    /// Render `out.len()` mono samples
    pub fn render(&mut self, out: &mut [i16]) {
        for sample in out.iter_mut() {
            let sample_start = self.delay_base;
            let sample_end = sample_start + 1.0;

            if self.enabled && self.pit_max > 0.0 {
                self.forward_pit(1.0);
            }

            let mut total = 0.0f64;
            let mut last_index = sample_start;
            let mut level = self.carry_level;
            while let Some(entry) = self.delay_queue.front().copied() {
                if entry.index >= sample_end {
                    break;
                }
                if entry.index > last_index {
                    total += level as f64 * (entry.index - last_index);
                    last_index = entry.index;
                }
                level = entry.level;
                self.delay_queue.pop_front();
            }
            if sample_end > last_index {
                total += level as f64 * (sample_end - last_index);
            }

            self.carry_level = level;
            *sample = total.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            self.delay_base = sample_end;
        }

        if self.delay_base > DELAY_COMPACT_THRESHOLD {
            let adjust = self.delay_base - 1000.0;
            self.delay_base -= adjust;
            for entry in self.delay_queue.iter_mut() {
                entry.index -= adjust;
            }
        }
    }
}

impl Default for PcSpeaker {
    fn default() -> Self {
        Self::new(SPKR_OUTPUT_RATE)
    }
}

impl std::fmt::Debug for PcSpeaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcSpeaker")
            .field("rate", &self.rate)
            .field("enabled", &self.enabled)
            .field("pit_divisor", &self.pit_divisor)
            .field("queued", &self.delay_queue.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_crossings(samples: &[i16]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] >= 0) != (w[1] >= 0))
            .count()
    }

    #[test]
    fn test_silent_until_switched_on() {
        let mut spk = PcSpeaker::default();
        spk.set_frequency(440);
        let mut buf = [1i16; 64];
        spk.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_square_wave_frequency() {
        let mut spk = PcSpeaker::default();
        spk.set_on();
        spk.set_frequency(441);
        let mut buf = vec![0i16; SPKR_OUTPUT_RATE as usize];
        spk.render(&mut buf);
        // two sign changes per cycle
        let cycles = zero_crossings(&buf) as f32 / 2.0;
        assert!((cycles - 441.0).abs() < 3.0, "got {cycles} cycles");
        assert!(buf.iter().any(|&s| s >= 4900));
        assert!(buf.iter().any(|&s| s <= -4900));
    }

    #[test]
    fn test_set_off_silences() {
        let mut spk = PcSpeaker::default();
        spk.set_on();
        spk.set_frequency(1000);
        let mut buf = [0i16; 100];
        spk.render(&mut buf);
        spk.set_off();
        spk.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
        assert!(!spk.is_enabled());
    }

    #[test]
    fn test_divisor_clamped_to_minimum() {
        let mut spk = PcSpeaker::default();
        spk.set_frequency(2_000_000);
        assert_eq!(spk.pit_divisor(), 2);
        spk.set_frequency(0);
        assert_eq!(spk.pit_divisor(), 0);
    }

    #[test]
    fn test_ultrasonic_tone_averages_out() {
        let mut spk = PcSpeaker::default();
        spk.set_on();
        spk.set_pit_divisor(19);
        let mut buf = vec![0i16; 2048];
        spk.render(&mut buf);
        let mean = buf.iter().map(|&s| s as f64).sum::<f64>() / buf.len() as f64;
        assert!(mean.abs() < 500.0, "mean {mean}");
        assert!(buf.iter().all(|&s| s.abs() <= 5000));
    }

    #[test]
    fn test_long_render_rebases_timestamps() {
        let mut spk = PcSpeaker::default();
        spk.set_on();
        spk.set_frequency(300);
        let mut buf = vec![0i16; 150_000];
        spk.render(&mut buf);
        assert!(spk.delay_base <= DELAY_COMPACT_THRESHOLD);
        spk.render(&mut buf[..1000]);
        assert!(buf[..1000].iter().any(|&s| s != 0));
    }
}
