//! Gate-modulated "stutter" tones

use super::{samples_to_ms, SharedSpeaker, SPKR_OUTPUT_RATE};
use crate::stream::AudioStream;

/// PIT carrier programmed by the driver before modulating the gate
const STUTTER_CARRIER_HZ: u32 = 22_096;

/// Tone produced by switching the speaker gate from a phase accumulator
///
/// Each of `a4` iterations adds `a8` to a 16-bit accumulator, opens the gate
/// when the accumulator exceeds the threshold `a2`, then moves the threshold
/// by `a0` and holds the state for `a6` samples. The carrier sits above the
/// output rate, so only the gated level is audible and the effective pitch is
/// `rate * a8 / 65536`.
pub struct StutterStream {
    speaker: SharedSpeaker,
    arg_0: i16,
    arg_2_initial: u16,
    arg_2: u16,
    arg_4: u16,
    arg_8: u16,
    cx: u32,
    dx: u16,
    delay: f32,
    delay_remaining: f32,
    started: bool,
    finished: bool,
}

impl StutterStream {
    /// Parameters in the driver's argument order
    pub fn new(speaker: SharedSpeaker, a0: i16, a2: u16, a4: u16, a6: u16, a8: u16) -> Self {
        let delay = ((SPKR_OUTPUT_RATE / 22_050) as f32 * a6 as f32).max(1.0);
        StutterStream {
            speaker,
            arg_0: a0,
            arg_2_initial: a2,
            arg_2: a2,
            arg_4: a4,
            arg_8: a8,
            cx: a4 as u32,
            dx: 0,
            delay,
            delay_remaining: 0.0,
            started: false,
            finished: false,
        }
    }

    /// Iterations left to run
    pub fn remaining_iterations(&self) -> u32 {
        self.cx
    }

    /// Program length in samples
    pub fn duration_samples(&self) -> u32 {
        (self.arg_4 as f32 * self.delay) as u32
    }

    fn start(&mut self) {
        self.started = true;
        let mut spk = self.speaker.lock();
        spk.set_on();
        spk.set_frequency(STUTTER_CARRIER_HZ);
        // the carrier cannot be represented at the output rate; model the gate level
        spk.set_frequency(0);
    }
}

impl AudioStream for StutterStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.finished {
            return 0;
        }
        if !self.started {
            self.start();
        }

        let num = buffer.len();
        let mut spk = self.speaker.lock();
        let mut s = 0usize;

        while self.cx > 0 && s < num {
            let pending = self.delay_remaining.floor() as usize;
            if pending > 0 {
                let n = pending.min(num - s);
                spk.render(&mut buffer[s..s + n]);
                self.delay_remaining -= n as f32;
                s += n;
                if n < pending {
                    break;
                }
            }

            self.dx = self.dx.wrapping_add(self.arg_8);
            if self.dx > self.arg_2 {
                spk.set_on();
            } else {
                spk.set_off();
            }
            self.arg_2 = self.arg_2.wrapping_add(self.arg_0 as u16);

            let n = (self.delay.floor() as usize).min(num - s);
            spk.render(&mut buffer[s..s + n]);
            self.delay_remaining = self.delay - n as f32;
            s += n;
            self.cx -= 1;
        }

        // flush the hold time of the final iteration before finishing
        if self.cx == 0 && s < num {
            let pending = (self.delay_remaining.floor() as usize).min(num - s);
            if pending > 0 {
                spk.render(&mut buffer[s..s + pending]);
                self.delay_remaining -= pending as f32;
                s += pending;
            }
        }

        if self.cx == 0 && self.delay_remaining < 1.0 {
            self.finished = true;
            spk.set_off();
        }
        s
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
        self.arg_2 = self.arg_2_initial;
        self.cx = self.arg_4 as u32;
        self.dx = 0;
        self.delay_remaining = 0.0;
        self.finished = false;
        self.start();
        true
    }

    fn length_ms(&self) -> Option<u32> {
        Some(samples_to_ms(
            self.arg_4 as f64 * self.delay as f64,
            SPKR_OUTPUT_RATE,
        ))
    }
}
