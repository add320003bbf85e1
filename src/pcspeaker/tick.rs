//! Clock tick/tock

use super::{game_period_samples, samples_to_ms, SharedSpeaker, SPKR_OUTPUT_RATE};
use crate::stream::AudioStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Tick,
    Silence,
    Tock,
    Tail,
}

/// One clock period: a short tick, silence, a short tock, silence
///
/// The tock starts at half the period. Loops through [`AudioStream::rewind`].
pub struct TickStream {
    speaker: SharedSpeaker,
    tick_hz: u32,
    tock_hz: u32,
    tick_len: u32,
    period_len: u32,
    pos: u32,
    phase: Option<Phase>,
    finished: bool,
}

impl TickStream {
    /// Default tick length in samples
    pub const DEFAULT_TICK_LEN: u32 = 200;

    /// Clock with the given tone pair, click length and period, all in samples
    pub fn new(speaker: SharedSpeaker, tick_hz: u32, tock_hz: u32, tick_len: u32, period_len: u32) -> Self {
        let period_len = period_len.max(2);
        TickStream {
            speaker,
            tick_hz,
            tock_hz,
            tick_len: tick_len.min(period_len / 2),
            period_len,
            pos: 0,
            phase: None,
            finished: false,
        }
    }

    /// Clock with a period of sixteen game ticks
    pub fn with_game_period(speaker: SharedSpeaker, tick_hz: u32, tock_hz: u32) -> Self {
        Self::new(speaker, tick_hz, tock_hz, Self::DEFAULT_TICK_LEN, game_period_samples())
    }

    /// Period in samples
    pub fn period_samples(&self) -> u32 {
        self.period_len
    }

    fn phase_at(&self, pos: u32) -> (Phase, u32) {
        let half = self.period_len / 2;
        if pos < self.tick_len {
            (Phase::Tick, self.tick_len)
        } else if pos < half {
            (Phase::Silence, half)
        } else if pos < half + self.tick_len {
            (Phase::Tock, half + self.tick_len)
        } else {
            (Phase::Tail, self.period_len)
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase == Some(phase) {
            return;
        }
        self.phase = Some(phase);
        let mut spk = self.speaker.lock();
        match phase {
            Phase::Tick => {
                spk.set_on();
                spk.set_frequency(self.tick_hz);
            }
            Phase::Tock => {
                spk.set_on();
                spk.set_frequency(self.tock_hz);
            }
            Phase::Silence | Phase::Tail => spk.set_off(),
        }
    }
}

impl AudioStream for TickStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.finished {
            return 0;
        }
        let mut i = 0usize;
        while i < buffer.len() && self.pos < self.period_len {
            let (phase, end) = self.phase_at(self.pos);
            self.enter(phase);
            let n = ((end - self.pos) as usize).min(buffer.len() - i);
            self.speaker.lock().render(&mut buffer[i..i + n]);
            self.pos += n as u32;
            i += n;
        }
        if self.pos >= self.period_len {
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

    fn rewind(&mut self) -> bool {
        self.pos = 0;
        self.phase = None;
        self.finished = false;
        true
    }

    fn length_ms(&self) -> Option<u32> {
        Some(samples_to_ms(self.period_len as f64, SPKR_OUTPUT_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcspeaker::PcSpeaker;
    use crate::stream::drain;

    #[test]
    fn test_game_period_length() {
        let s = TickStream::with_game_period(PcSpeaker::shared(), 398, 341);
        assert_eq!(s.period_samples(), 19_377);
        assert_eq!(s.length_ms(), Some(878));
    }

    #[test]
    fn test_four_phases() {
        let mut s = TickStream::new(PcSpeaker::shared(), 1000, 800, 100, 1000);
        let out = drain(&mut s, 64, usize::MAX);
        assert_eq!(out.len(), 1000);
        assert!(out[..100].iter().any(|&v| v != 0));
        assert!(out[100..500].iter().all(|&v| v == 0));
        assert!(out[500..600].iter().any(|&v| v != 0));
        assert!(out[600..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_loops_via_rewind() {
        let mut s = TickStream::new(PcSpeaker::shared(), 1000, 800, 50, 400);
        let a = drain(&mut s, 128, usize::MAX).len();
        assert!(s.end_of_data());
        assert!(s.rewind());
        let b = drain(&mut s, 128, usize::MAX).len();
        assert_eq!(a, b);
    }
}
