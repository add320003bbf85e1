//! Native `.m` music through an external player

use super::{MusicOutput, Song};
use crate::mixer::{SoundHandle, MAX_VOLUME};
use crate::stream::{AudioStream, LoopingAudioStream, SharedStream};
use crate::{Result, SoundError};
use std::path::Path;
use std::sync::Arc;

/// Player for the game's own music format
///
/// The FM player lives outside this crate; implementations open a song
/// file and hand back a rewindable stream of its rendered output.
pub trait NativeMusicBackend: Send + Sync {
    /// Open sub-song `song_num` of the file at `path`
    fn open(&self, path: &Path, song_num: u16) -> Result<Box<dyn AudioStream>>;
}

/// A native song, rendered by a [`NativeMusicBackend`]
pub struct SongNative {
    output: MusicOutput,
    backend: Option<Arc<dyn NativeMusicBackend>>,
    stream: Option<SharedStream<Box<dyn AudioStream>>>,
    handle: Option<SoundHandle>,
    volume: u8,
    name: String,
    filename: String,
}

impl SongNative {
    /// Song played on `output`; without a backend nothing will load
    pub fn new(output: MusicOutput, backend: Option<Arc<dyn NativeMusicBackend>>) -> Self {
        SongNative {
            output,
            backend,
            stream: None,
            handle: None,
            volume: MAX_VOLUME,
            name: String::new(),
            filename: String::new(),
        }
    }

    /// Mixer handle of the current playback
    pub fn handle(&self) -> Option<SoundHandle> {
        self.handle
    }
}

impl Song for SongNative {
    fn init(&mut self, path: &Path, song_num: u16) -> Result<()> {
        self.filename = path.display().to_string();
        let Some(backend) = &self.backend else {
            log::warn!(
                "native music: no player available for {}",
                path.display()
            );
            return Err(SoundError::ResourceMissing(
                "native music player".to_string(),
            ));
        };
        let stream = backend.open(path, song_num)?;
        self.stream = Some(SharedStream::new(stream));
        Ok(())
    }

    fn play(&mut self, looping: bool) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        if let Some(old) = self.handle.take() {
            self.output.stop(old);
        }
        stream.lock().rewind();
        let playback: Box<dyn AudioStream> = if looping {
            Box::new(LoopingAudioStream::new(Box::new(stream.clone()), 0))
        } else {
            Box::new(stream.clone())
        };
        self.handle = Some(self.output.start(playback, self.volume));
        true
    }

    fn stop(&mut self) -> bool {
        if let Some(handle) = self.handle.take() {
            self.output.stop(handle);
        }
        if let Some(stream) = &self.stream {
            stream.lock().rewind();
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

impl Drop for SongNative {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.output.stop(handle);
        }
    }
}

impl std::fmt::Debug for SongNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongNative")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("has_backend", &self.backend.is_some())
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::Mixer;
    use crate::stream::test_util::CountingStream;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakePlayer;

    impl NativeMusicBackend for FakePlayer {
        fn open(&self, _path: &Path, _song_num: u16) -> Result<Box<dyn AudioStream>> {
            Ok(Box::new(CountingStream::new(1, 64)))
        }
    }

    fn output() -> (MusicOutput, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (MusicOutput::new(Mixer::new(22_050), flag.clone()), flag)
    }

    #[test]
    fn test_no_backend_fails_to_load() {
        let (out, _) = output();
        let mut song = SongNative::new(out, None);
        assert!(matches!(
            song.init(Path::new("brit.m"), 0),
            Err(SoundError::ResourceMissing(_))
        ));
        assert!(!song.play(true));
    }

    #[test]
    fn test_one_shot_raises_finished() {
        let (out, flag) = output();
        let mixer = out.mixer().clone();
        let mut song = SongNative::new(out, Some(Arc::new(FakePlayer)));
        song.init(Path::new("engage.m"), 0).unwrap();
        assert!(song.play(false));

        let mut buf = vec![0i16; 2 * 512];
        mixer.mix(&mut buf);
        mixer.mix(&mut buf);
        assert!(flag.load(Ordering::Acquire));
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_looping_play_never_finishes() {
        let (out, flag) = output();
        let mixer = out.mixer().clone();
        let mut song = SongNative::new(out, Some(Arc::new(FakePlayer)));
        song.init(Path::new("ultima.m"), 0).unwrap();
        song.play(true);

        let mut buf = vec![0i16; 2 * 512];
        for _ in 0..4 {
            mixer.mix(&mut buf);
        }
        assert!(!flag.load(Ordering::Acquire));
        assert!(song.stop());
        assert_eq!(mixer.active_count(), 0);
    }
}
