//! Pull-based audio streams
//!
//! Every generator and decoder in the crate is an [`AudioStream`]: the mixer
//! asks for a block of signed 16-bit samples and the stream fills as much of
//! it as it can. A `0` return for a non-empty buffer marks exhaustion; looping
//! containers react to it by calling [`AudioStream::rewind`].

mod looping;
mod queuing;

pub use looping::LoopingAudioStream;
pub use queuing::QueuingAudioStream;

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// A source of signed 16-bit PCM samples
///
/// Stereo streams produce interleaved left/right pairs; callers should request
/// an even number of samples from them.
pub trait AudioStream: Send {
    /// Fill `buffer` with up to `buffer.len()` samples
    ///
    /// Returns the number of samples written. `0` with a non-empty buffer
    /// means the stream is exhausted.
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize;

    /// Whether samples are interleaved stereo pairs
    fn is_stereo(&self) -> bool;

    /// Native sample rate in Hz
    fn rate(&self) -> u32;

    /// True once the stream has nothing more to produce
    fn end_of_data(&self) -> bool;

    /// Restart from position zero
    ///
    /// Returns `false` for streams that cannot restart (they cannot loop).
    fn rewind(&mut self) -> bool {
        false
    }

    /// Total length in milliseconds, if known up front
    fn length_ms(&self) -> Option<u32> {
        None
    }
}

impl<S: AudioStream + ?Sized> AudioStream for Box<S> {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        (**self).read_buffer(buffer)
    }

    fn is_stereo(&self) -> bool {
        (**self).is_stereo()
    }

    fn rate(&self) -> u32 {
        (**self).rate()
    }

    fn end_of_data(&self) -> bool {
        (**self).end_of_data()
    }

    fn rewind(&mut self) -> bool {
        (**self).rewind()
    }

    fn length_ms(&self) -> Option<u32> {
        (**self).length_ms()
    }
}

/// A stream shared between the mixer and the code that created it
///
/// The mixer plays one clone while the creator keeps another to adjust the
/// stream (volume, rewind) during playback. The stream itself is dropped when
/// the last clone goes away.
pub struct SharedStream<S: AudioStream> {
    inner: Arc<Mutex<S>>,
}

impl<S: AudioStream> SharedStream<S> {
    /// Wrap a stream for shared ownership
    pub fn new(stream: S) -> Self {
        SharedStream {
            inner: Arc::new(Mutex::new(stream)),
        }
    }

    /// Lock the stream for direct access
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock()
    }

    /// Number of live handles to this stream
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<S: AudioStream> Clone for SharedStream<S> {
    fn clone(&self) -> Self {
        SharedStream {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AudioStream> AudioStream for SharedStream<S> {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        self.inner.lock().read_buffer(buffer)
    }

    fn is_stereo(&self) -> bool {
        self.inner.lock().is_stereo()
    }

    fn rate(&self) -> u32 {
        self.inner.lock().rate()
    }

    fn end_of_data(&self) -> bool {
        self.inner.lock().end_of_data()
    }

    fn rewind(&mut self) -> bool {
        self.inner.lock().rewind()
    }

    fn length_ms(&self) -> Option<u32> {
        self.inner.lock().length_ms()
    }
}

/// Drain a stream into a vector, reading `chunk` samples at a time
///
/// Stops at the first `0` return or after `limit` samples, whichever comes
/// first.
pub fn drain(stream: &mut dyn AudioStream, chunk: usize, limit: usize) -> Vec<i16> {
    let mut out = Vec::new();
    let mut buf = vec![0i16; chunk.max(1)];
    while out.len() < limit {
        let want = buf.len().min(limit - out.len());
        let n = stream.read_buffer(&mut buf[..want]);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::AudioStream;

    /// Finite mono stream counting up from `start`
    pub struct CountingStream {
        pub start: i16,
        pub len: usize,
        pub pos: usize,
        pub rate: u32,
        pub rewindable: bool,
    }

    impl CountingStream {
        pub fn new(start: i16, len: usize) -> Self {
            CountingStream {
                start,
                len,
                pos: 0,
                rate: 22_050,
                rewindable: true,
            }
        }
    }

    impl AudioStream for CountingStream {
        fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
            let n = buffer.len().min(self.len - self.pos);
            for (i, s) in buffer[..n].iter_mut().enumerate() {
                *s = self.start + (self.pos + i) as i16;
            }
            self.pos += n;
            n
        }

        fn is_stereo(&self) -> bool {
            false
        }

        fn rate(&self) -> u32 {
            self.rate
        }

        fn end_of_data(&self) -> bool {
            self.pos >= self.len
        }

        fn rewind(&mut self) -> bool {
            if self.rewindable {
                self.pos = 0;
            }
            self.rewindable
        }

        fn length_ms(&self) -> Option<u32> {
            Some((self.len as u64 * 1000 / self.rate as u64) as u32)
        }
    }
}
