//! Fully decoded music streams
//!
//! Music files are decoded once, up front, into interleaved 16-bit PCM. The
//! resulting [`Mp3AudioStream`] serves samples from memory, so reading never
//! touches the filesystem and rewinding is just a cursor reset.

mod formats;

pub use formats::{decode_file, decode_mp3, decode_ogg, decode_wav, AudioFormat, DecodedAudio};

use crate::stream::AudioStream;
use crate::Result;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_RATE: u32 = 22_050;
const DEFAULT_CHANNELS: u16 = 2;

/// In-memory MP3, Ogg Vorbis or WAV stream
///
/// Clones share the decoded samples but keep their own read position and
/// volume.
#[derive(Clone)]
pub struct Mp3AudioStream {
    data: Arc<[i16]>,
    position: usize,
    sample_rate: u32,
    channels: u16,
    end_of_data: bool,
    volume: u8,
}

impl Mp3AudioStream {
    /// Empty stream; [`load`](Self::load) fills it
    pub fn new() -> Self {
        Mp3AudioStream {
            data: Arc::from(Vec::<i16>::new()),
            position: 0,
            sample_rate: DEFAULT_RATE,
            channels: DEFAULT_CHANNELS,
            end_of_data: false,
            volume: 255,
        }
    }

    /// Decode `path` into a new stream
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut stream = Self::new();
        stream.load(path)?;
        Ok(stream)
    }

    /// Decode `path`, replacing any previously loaded audio
    ///
    /// The decoder is picked from the lowercase extension: `.mp3`, `.ogg`
    /// or `.wav`; anything else is tried as MP3.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::info!("Mp3AudioStream: loading {}", path.display());
        let decoded = decode_file(path).map_err(|e| {
            log::warn!("Mp3AudioStream: failed to load {}: {}", path.display(), e);
            e
        })?;
        log::info!(
            "Mp3AudioStream: loaded {} ({} Hz, {} ch, {} samples)",
            path.display(),
            decoded.sample_rate,
            decoded.channels,
            decoded.samples.len()
        );
        self.data = Arc::from(decoded.samples);
        self.sample_rate = decoded.sample_rate;
        self.channels = decoded.channels;
        self.position = 0;
        self.end_of_data = false;
        Ok(())
    }

    /// Playback volume, 0-255
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
    }

    /// Current playback volume
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Channel count of the decoded audio
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total decoded samples across all channels
    pub fn len_samples(&self) -> usize {
        self.data.len()
    }

    /// Read cursor, in samples
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether any audio has been loaded
    pub fn is_loaded(&self) -> bool {
        !self.data.is_empty()
    }
}

impl Default for Mp3AudioStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mp3AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mp3AudioStream")
            .field("samples", &self.data.len())
            .field("position", &self.position)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

impl AudioStream for Mp3AudioStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if self.data.is_empty() || self.end_of_data {
            return 0;
        }
        let remaining = self.data.len() - self.position;
        let n = buffer.len().min(remaining);
        let src = &self.data[self.position..self.position + n];
        if self.volume == 255 {
            buffer[..n].copy_from_slice(src);
        } else {
            let volume = self.volume as i32;
            for (dst, &s) in buffer[..n].iter_mut().zip(src) {
                *dst = (s as i32 * volume / 255) as i16;
            }
        }
        self.position += n;
        if self.position >= self.data.len() {
            self.end_of_data = true;
        }
        n
    }

    fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    fn rate(&self) -> u32 {
        self.sample_rate
    }

    fn end_of_data(&self) -> bool {
        self.end_of_data
    }

    fn rewind(&mut self) -> bool {
        self.position = 0;
        self.end_of_data = false;
        true
    }

    fn length_ms(&self) -> Option<u32> {
        if self.data.is_empty() {
            return None;
        }
        let frames = self.data.len() as u64 / self.channels.max(1) as u64;
        Some((frames * 1000 / self.sample_rate.max(1) as u64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::drain;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn test_unloaded_stream_defaults() {
        let mut s = Mp3AudioStream::new();
        assert_eq!(s.rate(), 22_050);
        assert!(s.is_stereo());
        assert!(!s.is_loaded());
        let mut buf = [0i16; 16];
        assert_eq!(s.read_buffer(&mut buf), 0);
    }

    #[test]
    fn test_volume_scaling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.wav");
        write_wav(&path, 1, &[255, -255, 1000, 32_767]);
        let mut s = Mp3AudioStream::open(&path).unwrap();
        s.set_volume(128);
        let mut buf = [0i16; 4];
        assert_eq!(s.read_buffer(&mut buf), 4);
        assert_eq!(buf, [128, -128, 501, 16_447]);
    }

    #[test]
    fn test_end_of_data_and_rewind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let pattern: Vec<i16> = (0..200).collect();
        write_wav(&path, 2, &pattern);
        let mut s = Mp3AudioStream::open(&path).unwrap();
        assert!(s.is_stereo());
        assert_eq!(s.length_ms(), Some(100 * 1000 / 22_050));
        assert_eq!(drain(&mut s, 64, usize::MAX), pattern);
        assert!(s.end_of_data());
        assert!(s.rewind());
        assert_eq!(s.position(), 0);
        assert_eq!(drain(&mut s, 50, usize::MAX), pattern);
    }

    #[test]
    fn test_clones_share_data_not_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.wav");
        write_wav(&path, 1, &[1, 2, 3, 4]);
        let mut a = Mp3AudioStream::open(&path).unwrap();
        let mut b = a.clone();
        let mut buf = [0i16; 3];
        a.read_buffer(&mut buf);
        assert_eq!(b.read_buffer(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_failed_load_reports_error() {
        let mut s = Mp3AudioStream::new();
        assert!(s.load("/nonexistent/song.wav").is_err());
        assert!(!s.is_loaded());
    }
}
