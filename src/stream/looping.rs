//! Looping adapter

use super::AudioStream;

/// Replays a rewindable stream a fixed number of times, or forever
pub struct LoopingAudioStream {
    inner: Box<dyn AudioStream>,
    /// Number of passes to play, `0` for endless
    loops: u32,
    completed: u32,
    done: bool,
}

impl LoopingAudioStream {
    /// Wrap `inner`; `loops == 0` loops until stopped
    pub fn new(inner: Box<dyn AudioStream>, loops: u32) -> Self {
        LoopingAudioStream {
            inner,
            loops,
            completed: 0,
            done: false,
        }
    }

    /// Passes completed so far
    pub fn completed_loops(&self) -> u32 {
        self.completed
    }
}

impl AudioStream for LoopingAudioStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        let mut total = 0;
        let mut just_rewound = false;
        while total < buffer.len() && !self.done {
            // stereo sources only produce whole frames
            if self.inner.is_stereo() && buffer.len() - total < 2 {
                break;
            }
            let n = self.inner.read_buffer(&mut buffer[total..]);
            total += n;
            if n > 0 {
                just_rewound = false;
                if !self.inner.end_of_data() {
                    continue;
                }
            } else if just_rewound {
                // a freshly rewound stream that yields nothing would spin forever
                self.done = true;
                break;
            }

            self.completed += 1;
            if self.loops != 0 && self.completed >= self.loops {
                self.done = true;
                break;
            }
            if !self.inner.rewind() {
                log::debug!("looping stream could not rewind, stopping");
                self.done = true;
                break;
            }
            just_rewound = true;
        }
        total
    }

    fn is_stereo(&self) -> bool {
        self.inner.is_stereo()
    }

    fn rate(&self) -> u32 {
        self.inner.rate()
    }

    fn end_of_data(&self) -> bool {
        self.done
    }

    fn rewind(&mut self) -> bool {
        if !self.inner.rewind() {
            return false;
        }
        self.completed = 0;
        self.done = false;
        true
    }

    fn length_ms(&self) -> Option<u32> {
        if self.loops == 0 {
            return None;
        }
        self.inner.length_ms().map(|ms| ms * self.loops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::test_util::CountingStream;

    #[test]
    fn test_loops_requested_number_of_times() {
        let mut s = LoopingAudioStream::new(Box::new(CountingStream::new(0, 3)), 2);
        let mut buf = [0i16; 10];
        let n = s.read_buffer(&mut buf);
        assert_eq!(n, 6);
        assert_eq!(&buf[..6], &[0, 1, 2, 0, 1, 2]);
        assert!(s.end_of_data());
        assert_eq!(s.completed_loops(), 2);
    }

    #[test]
    fn test_endless_loop_fills_buffer() {
        let mut s = LoopingAudioStream::new(Box::new(CountingStream::new(0, 4)), 0);
        let mut buf = [0i16; 1000];
        assert_eq!(s.read_buffer(&mut buf), 1000);
        assert!(!s.end_of_data());
        assert_eq!(s.length_ms(), None);
    }

    #[test]
    fn test_stops_when_inner_cannot_rewind() {
        let mut inner = CountingStream::new(0, 4);
        inner.rewindable = false;
        let mut s = LoopingAudioStream::new(Box::new(inner), 0);
        let mut buf = [0i16; 16];
        assert_eq!(s.read_buffer(&mut buf), 4);
        assert!(s.end_of_data());
        assert_eq!(s.read_buffer(&mut buf), 0);
    }

    #[test]
    fn test_empty_inner_does_not_spin() {
        let mut s = LoopingAudioStream::new(Box::new(CountingStream::new(0, 0)), 0);
        let mut buf = [0i16; 16];
        assert_eq!(s.read_buffer(&mut buf), 0);
        assert!(s.end_of_data());
    }
}
