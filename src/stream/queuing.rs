//! Sequential playback of queued streams

use super::AudioStream;
use std::collections::VecDeque;

/// Plays queued streams back to back at a fixed rate
///
/// The queue owns every stream handed to it and drops each one as soon as it
/// is exhausted. Once [`finish`](Self::finish) has been called and the queue
/// drains, the stream reports end of data.
pub struct QueuingAudioStream {
    rate: u32,
    stereo: bool,
    queue: VecDeque<Box<dyn AudioStream>>,
    finished: bool,
}

impl QueuingAudioStream {
    /// Create an empty queue producing samples at `rate`
    pub fn new(rate: u32, stereo: bool) -> Self {
        QueuingAudioStream {
            rate,
            stereo,
            queue: VecDeque::new(),
            finished: false,
        }
    }

    /// Append a stream to the queue
    ///
    /// Streams whose rate or channel layout differ from the queue are still
    /// accepted but logged, since the queue reports its own rate.
    pub fn queue_stream(&mut self, stream: Box<dyn AudioStream>) {
        if stream.rate() != self.rate || stream.is_stereo() != self.stereo {
            log::warn!(
                "queued stream format {} Hz stereo={} differs from queue {} Hz stereo={}",
                stream.rate(),
                stream.is_stereo(),
                self.rate,
                self.stereo
            );
        }
        self.queue.push_back(stream);
    }

    /// Mark that no further streams will be queued
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Number of streams still waiting or playing
    pub fn num_queued(&self) -> usize {
        self.queue.len()
    }
}

impl AudioStream for QueuingAudioStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        let mut total = 0;
        while total < buffer.len() {
            let Some(front) = self.queue.front_mut() else {
                break;
            };
            let n = front.read_buffer(&mut buffer[total..]);
            total += n;
            if n == 0 || front.end_of_data() {
                self.queue.pop_front();
            }
        }
        total
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn end_of_data(&self) -> bool {
        self.finished && self.queue.is_empty()
    }

    fn length_ms(&self) -> Option<u32> {
        self.queue
            .iter()
            .try_fold(0u32, |acc, s| s.length_ms().map(|ms| acc + ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::test_util::CountingStream;

    #[test]
    fn test_queue_plays_streams_in_order() {
        let mut q = QueuingAudioStream::new(22_050, false);
        q.queue_stream(Box::new(CountingStream::new(0, 3)));
        q.queue_stream(Box::new(CountingStream::new(100, 2)));
        q.finish();

        let mut buf = [0i16; 8];
        let n = q.read_buffer(&mut buf);
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], &[0, 1, 2, 100, 101]);
        assert!(q.end_of_data());
        assert_eq!(q.read_buffer(&mut buf), 0);
    }

    #[test]
    fn test_queue_not_ended_until_finished() {
        let mut q = QueuingAudioStream::new(22_050, false);
        q.queue_stream(Box::new(CountingStream::new(0, 1)));
        let mut buf = [0i16; 4];
        q.read_buffer(&mut buf);
        assert_eq!(q.num_queued(), 0);
        assert!(!q.end_of_data());
        q.finish();
        assert!(q.end_of_data());
    }

    #[test]
    fn test_queue_length_sums_parts() {
        let mut q = QueuingAudioStream::new(22_050, false);
        q.queue_stream(Box::new(CountingStream::new(0, 22_050)));
        q.queue_stream(Box::new(CountingStream::new(0, 11_025)));
        assert_eq!(q.length_ms(), Some(1500));
    }

    #[test]
    fn test_queue_cannot_rewind() {
        let mut q = QueuingAudioStream::new(22_050, false);
        assert!(!q.rewind());
    }
}
