use super::decoder::Mt32DecoderStream;
use crate::mixer::{SoundHandle, MAX_VOLUME};
use crate::music::{MusicOutput, Song};
use crate::stream::{AudioStream, SharedStream};
use crate::Result;
use std::path::{Path, PathBuf};

/// A MIDI song rendered through the MT-32 synth
///
/// Songs play once; the music-finished flag is raised when the decoder
/// runs out, so the manager can move on to the next song of the group.
pub struct SongMt32 {
    output: MusicOutput,
    rom_path: PathBuf,
    stream: Option<SharedStream<Mt32DecoderStream>>,
    handle: Option<SoundHandle>,
    volume: u8,
    name: String,
    filename: String,
}

impl SongMt32 {
    /// Song playing on `output` with ROMs taken from `rom_path`
    pub fn new(output: MusicOutput, rom_path: impl Into<PathBuf>) -> Self {
        SongMt32 {
            output,
            rom_path: rom_path.into(),
            stream: None,
            handle: None,
            volume: MAX_VOLUME,
            name: String::new(),
            filename: String::new(),
        }
    }

    /// Shared view of the decoder, once loaded
    pub fn stream(&self) -> Option<&SharedStream<Mt32DecoderStream>> {
        self.stream.as_ref()
    }

    /// Mixer handle of the current playback
    pub fn handle(&self) -> Option<SoundHandle> {
        self.handle
    }
}

impl Song for SongMt32 {
    fn init(&mut self, path: &Path, _song_num: u16) -> Result<()> {
        self.filename = path.display().to_string();
        let mut decoder = Mt32DecoderStream::new();
        decoder.init(&self.rom_path).map_err(|e| {
            log::error!("MT-32: failed to initialize emulator: {e}");
            e
        })?;
        decoder.load_midi(path).map_err(|e| {
            log::error!("MT-32: failed to load MIDI file {}: {e}", path.display());
            e
        })?;
        self.stream = Some(SharedStream::new(decoder));
        Ok(())
    }

    fn play(&mut self, _looping: bool) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        if let Some(old) = self.handle.take() {
            self.output.stop(old);
        }
        {
            let mut decoder = stream.lock();
            if decoder.end_of_data() {
                decoder.rewind();
            }
        }
        self.handle = Some(self.output.start(Box::new(stream.clone()), self.volume));
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

impl Drop for SongMt32 {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.output.stop(handle);
        }
    }
}

impl std::fmt::Debug for SongMt32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongMt32")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("rom_path", &self.rom_path)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
