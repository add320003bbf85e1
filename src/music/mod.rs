//! Song backends
//!
//! A [`Song`] owns one piece of music and knows how to start it on the
//! mixer's music channel. Finished songs raise the shared flag held by
//! [`MusicOutput`], which the sound manager polls to pick the next song.

mod mp3;
mod native;

pub use mp3::SongMp3;
pub use native::{NativeMusicBackend, SongNative};

use crate::mixer::{Mixer, SoundHandle, SoundType};
use crate::stream::AudioStream;
use crate::{Result, SoundError};
use rand::Rng;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A playable piece of music
pub trait Song: Send {
    /// Load the song from `path`; `song_num` selects a sub-song where the
    /// format has them
    fn init(&mut self, path: &Path, song_num: u16) -> Result<()>;

    /// Start playback from the beginning
    ///
    /// Returns `false` when nothing is loaded.
    fn play(&mut self, looping: bool) -> bool;

    /// Stop playback and rewind
    fn stop(&mut self) -> bool;

    /// Set playback volume, 0-255
    fn set_volume(&mut self, volume: u8) -> bool;

    /// Display title
    fn name(&self) -> &str;

    /// Replace the display title
    fn set_name(&mut self, name: &str);

    /// Path the song was loaded from
    fn filename(&self) -> &str;
}

/// The music channel of a mixer plus the flag raised when a song ends
#[derive(Clone)]
pub struct MusicOutput {
    mixer: Mixer,
    finished: Arc<AtomicBool>,
}

impl MusicOutput {
    /// Play music on `mixer`, raising `finished` at the end of each song
    pub fn new(mixer: Mixer, finished: Arc<AtomicBool>) -> Self {
        MusicOutput { mixer, finished }
    }

    /// Underlying mixer
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Start `stream` as music
    pub fn start(&self, stream: Box<dyn AudioStream>, volume: u8) -> SoundHandle {
        self.mixer
            .play_stream_with_notify(SoundType::Music, stream, volume, self.finished.clone())
    }

    /// Stop the channel behind `handle`
    pub fn stop(&self, handle: SoundHandle) {
        self.mixer.stop_handle(handle);
    }

    /// Change the channel volume behind `handle`
    pub fn set_volume(&self, handle: SoundHandle, volume: u8) {
        self.mixer.set_channel_volume(handle, volume);
    }
}

impl std::fmt::Debug for MusicOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicOutput").finish_non_exhaustive()
    }
}

/// Items sharing a tag, one of which is picked at random on request
#[derive(Debug, Clone)]
pub struct SoundCollection<T> {
    items: Vec<T>,
}

impl<T> SoundCollection<T> {
    /// Empty collection
    pub fn new() -> Self {
        SoundCollection { items: Vec::new() }
    }

    /// Add an item
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Uniformly random item, `None` when empty
    pub fn select(&self) -> Option<&T> {
        self.select_with(&mut rand::rng())
    }

    /// Like [`select`](Self::select) with a caller-supplied generator
    pub fn select_with<R: Rng>(&self, rng: &mut R) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        self.items.get(rng.random_range(0..self.items.len()))
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate the items in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for SoundCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Which backend plays the background music
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MusicStyle {
    /// The game's own `.m` files through the native player
    #[default]
    Native,
    /// MIDI files through the MT-32 synth
    Mt32,
    /// Pre-rendered MP3/OGG/WAV files
    Mp3,
    /// User mapping from `music.cfg`
    Custom,
}

impl MusicStyle {
    /// Config string for this style
    pub fn as_str(self) -> &'static str {
        match self {
            MusicStyle::Native => "native",
            MusicStyle::Mt32 => "mt32",
            MusicStyle::Mp3 => "mp3",
            MusicStyle::Custom => "custom",
        }
    }
}

impl FromStr for MusicStyle {
    type Err = SoundError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(MusicStyle::Native),
            "mt32" => Ok(MusicStyle::Mt32),
            "mp3" => Ok(MusicStyle::Mp3),
            "custom" => Ok(MusicStyle::Custom),
            other => Err(SoundError::Config(format!("unknown music style '{other}'"))),
        }
    }
}

impl std::fmt::Display for MusicStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_music_style_parse() {
        assert_eq!("native".parse::<MusicStyle>().unwrap(), MusicStyle::Native);
        assert_eq!("MT32".parse::<MusicStyle>().unwrap(), MusicStyle::Mt32);
        assert_eq!(" mp3 ".parse::<MusicStyle>().unwrap(), MusicStyle::Mp3);
        assert_eq!("custom".parse::<MusicStyle>().unwrap(), MusicStyle::Custom);
        assert!(matches!(
            "opl3".parse::<MusicStyle>(),
            Err(SoundError::Config(_))
        ));
        assert_eq!(MusicStyle::Mt32.to_string(), "mt32");
    }

    #[test]
    fn test_empty_collection_selects_nothing() {
        let c: SoundCollection<u32> = SoundCollection::new();
        assert!(c.select().is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn test_collection_select_covers_all_items() {
        let mut c = SoundCollection::new();
        for i in 0..4 {
            c.push(i);
        }
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[*c.select_with(&mut rng).unwrap()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
