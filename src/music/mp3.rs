//! Pre-rendered music files

use super::{MusicOutput, Song};
use crate::decoder::Mp3AudioStream;
use crate::mixer::{SoundHandle, MAX_VOLUME};
use crate::stream::{AudioStream, LoopingAudioStream};
use crate::Result;
use std::path::Path;

/// MP3, Ogg Vorbis or WAV background music
///
/// Background music always loops; the `looping` argument to
/// [`play`](Song::play) is ignored. Volume is applied on the mixer
/// channel only.
pub struct SongMp3 {
    output: MusicOutput,
    stream: Option<Mp3AudioStream>,
    handle: Option<SoundHandle>,
    volume: u8,
    name: String,
    filename: String,
}

impl SongMp3 {
    /// Song that will play on `output` once loaded
    pub fn new(output: MusicOutput) -> Self {
        SongMp3 {
            output,
            stream: None,
            handle: None,
            volume: MAX_VOLUME,
            name: String::new(),
            filename: String::new(),
        }
    }

    /// Whether the song's channel is currently playing
    pub fn is_playing(&self) -> bool {
        self.handle
            .is_some_and(|h| self.output.mixer().is_sound_handle_active(h))
    }

    /// Mixer handle of the current playback
    pub fn handle(&self) -> Option<SoundHandle> {
        self.handle
    }
}

impl Song for SongMp3 {
    fn init(&mut self, path: &Path, _song_num: u16) -> Result<()> {
        self.filename = path.display().to_string();
        let stream = Mp3AudioStream::open(path)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn play(&mut self, _looping: bool) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        if let Some(old) = self.handle.take() {
            self.output.stop(old);
        }
        let mut playback = stream.clone();
        playback.rewind();
        let looped = LoopingAudioStream::new(Box::new(playback), 0);
        self.handle = Some(self.output.start(Box::new(looped), self.volume));
        true
    }

    fn stop(&mut self) -> bool {
        if let Some(handle) = self.handle.take() {
            self.output.stop(handle);
        }
        true
    }

    fn set_volume(&mut self, volume: u8) -> bool {
        self.volume = volume;
        if let Some(handle) = self.handle {
            self.output.set_volume(handle, volume);
        }
        true
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn filename(&self) -> &str {
        &self.filename
    }
}

impl Drop for SongMp3 {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.output.stop(handle);
        }
    }
}

impl std::fmt::Debug for SongMp3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongMp3")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("loaded", &self.stream.is_some())
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::Mixer;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn write_wav(path: &Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            w.write_sample((i as i16 % 100) * 50 + 1000).unwrap();
        }
        w.finalize().unwrap();
    }

    fn output() -> (MusicOutput, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (MusicOutput::new(Mixer::new(22_050), flag.clone()), flag)
    }

    #[test]
    fn test_play_without_load_fails() {
        let (out, _) = output();
        let mut song = SongMp3::new(out);
        assert!(!song.play(true));
        assert!(song.stop());
    }

    #[test]
    fn test_missing_file() {
        let (out, _) = output();
        let mut song = SongMp3::new(out);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brit.mp3");
        assert!(song.init(&path, 0).is_err());
        assert_eq!(song.filename(), path.display().to_string());
    }

    #[test]
    fn test_short_song_loops_forever() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forest.wav");
        write_wav(&path, 300);

        let (out, flag) = output();
        let mixer = out.mixer().clone();
        let mut song = SongMp3::new(out);
        song.init(&path, 0).unwrap();
        song.set_name("Wanderer (Forest)");
        assert!(song.play(false));
        assert!(song.is_playing());

        let mut buf = vec![0i16; 2 * 2048];
        for _ in 0..4 {
            mixer.mix(&mut buf);
        }
        assert!(song.is_playing());
        assert!(!flag.load(Ordering::Acquire));
        assert!(buf.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_volume_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stones.wav");
        write_wav(&path, 300);

        let (out, flag) = output();
        let mixer = out.mixer().clone();
        let mut song = SongMp3::new(out);
        song.init(&path, 0).unwrap();
        song.play(true);
        song.set_volume(40);
        let handle = song.handle().unwrap();
        assert_eq!(mixer.channel_volume(handle), Some(40));

        song.stop();
        assert!(!mixer.is_sound_handle_active(handle));
        assert!(!flag.load(Ordering::Acquire), "stop is not a natural end");
    }

    #[test]
    fn test_replay_replaces_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ultima.wav");
        write_wav(&path, 100);

        let (out, _) = output();
        let mixer = out.mixer().clone();
        let mut song = SongMp3::new(out);
        song.init(&path, 0).unwrap();
        song.play(true);
        song.play(true);
        assert_eq!(mixer.active_count(), 1);
        drop(song);
        assert_eq!(mixer.active_count(), 0);
    }
}
