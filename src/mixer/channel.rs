//! One playing stream with its rate converter

use super::{SoundHandle, SoundType};
use crate::stream::AudioStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Samples pulled from the stream per refill
const READ_CHUNK: usize = 1024;

type Frame = [i32; 2];

/// A stream playing on the mixer
///
/// Frames are pulled at the stream's native rate and resampled to the
/// mixer's rate by linear interpolation between the two newest frames.
pub(super) struct Channel {
    pub handle: SoundHandle,
    pub kind: SoundType,
    pub volume: u8,
    stream: Box<dyn AudioStream>,
    notify: Option<Arc<AtomicBool>>,
    step: f64,
    frac: f64,
    cur: Frame,
    next: Option<Frame>,
    primed: bool,
    exhausted: bool,
    done: bool,
    buf: Vec<i16>,
    buf_pos: usize,
    buf_len: usize,
}

impl Channel {
    pub fn new(
        handle: SoundHandle,
        kind: SoundType,
        stream: Box<dyn AudioStream>,
        volume: u8,
        notify: Option<Arc<AtomicBool>>,
        output_rate: u32,
    ) -> Self {
        let step = stream.rate().max(1) as f64 / output_rate.max(1) as f64;
        Channel {
            handle,
            kind,
            volume,
            stream,
            notify,
            step,
            frac: 0.0,
            cur: [0; 2],
            next: None,
            primed: false,
            exhausted: false,
            done: false,
            buf: vec![0; READ_CHUNK],
            buf_pos: 0,
            buf_len: 0,
        }
    }

    /// True once every frame of the stream has been mixed
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Raise the completion flag, if any
    pub fn notify_finished(&self) {
        if let Some(flag) = &self.notify {
            flag.store(true, Ordering::Release);
        }
    }

    fn read_sample(&mut self) -> Option<i16> {
        if self.buf_pos >= self.buf_len {
            if self.exhausted {
                return None;
            }
            let n = self.stream.read_buffer(&mut self.buf);
            if n == 0 {
                self.exhausted = true;
                return None;
            }
            self.buf_pos = 0;
            self.buf_len = n;
        }
        let s = self.buf[self.buf_pos];
        self.buf_pos += 1;
        Some(s)
    }

    fn read_frame(&mut self) -> Option<Frame> {
        let left = self.read_sample()? as i32;
        if self.stream.is_stereo() {
            let right = self.read_sample().unwrap_or(0) as i32;
            Some([left, right])
        } else {
            Some([left, left])
        }
    }

    /// Add this channel into `acc` (interleaved stereo)
    ///
    /// The channel volume and the volume of its sound type both scale the
    /// output, each on a 0-255 scale.
    pub fn mix_into(&mut self, acc: &mut [i32], type_volume: u8) {
        if self.done {
            return;
        }
        if !self.primed {
            self.primed = true;
            match self.read_frame() {
                Some(frame) => {
                    self.cur = frame;
                    self.next = self.read_frame();
                }
                None => {
                    self.done = true;
                    return;
                }
            }
        }

        let gain = self.volume as i32 * type_volume as i32;
        for out in acc.chunks_exact_mut(2) {
            while self.frac >= 1.0 {
                match self.next {
                    Some(frame) => {
                        self.cur = frame;
                        self.next = self.read_frame();
                        self.frac -= 1.0;
                    }
                    None => {
                        self.done = true;
                        return;
                    }
                }
            }
            let next = self.next.unwrap_or(self.cur);
            for (ch, sample) in out.iter_mut().enumerate() {
                let a = self.cur[ch] as f64;
                let b = next[ch] as f64;
                let v = (a + (b - a) * self.frac) as i32;
                *sample += v * gain / (255 * 255);
            }
            self.frac += self.step;
        }
    }
}
