//! Ultima VI sound core
//!
//! Procedural PC-speaker synthesis, music backends and sound orchestration
//! for an Ultima VI engine reimplementation.
//!
//! # Features
//! - DOSBox-style 8253 PIT emulation driving square-wave speaker streams
//! - Frequency sweeps, the original game's pseudo-random noise and the
//!   "stutter" modulation routine used by spell and death effects
//! - Composite sound effects assembled from queued primitive streams
//! - Fully decoded MP3/OGG/WAV music playback
//! - Standard MIDI File sequencing into an MT-32 style synth core
//! - A sound manager handling mood groups, volumes and ambient object sfx
//!
//! # Crate feature flags
//! - `mt32` (default): MIDI sequencing through the built-in synth core (`mt32`)
//! - `streaming` (opt-in): Real-time audio output (enables optional `rodio` dep)
//!
//! # Quick start
//! ## Render a sound effect
//! ```no_run
//! use nuvie_sound::pcspeaker::effects;
//! use nuvie_sound::AudioStream;
//! let mut stream = effects::avatar_death();
//! let mut buf = [0i16; 1024];
//! while stream.read_buffer(&mut buf) > 0 {
//!     // hand samples to an output device
//! }
//! ```
//!
//! ## Drive the sound manager
//! ```no_run
//! use nuvie_sound::{Configuration, Mixer, SoundManager};
//! let config = Configuration::load("nuvie.json").unwrap();
//! let mixer = Mixer::new(44_100);
//! let mut sound = SoundManager::new(mixer.clone());
//! sound.nuvie_startup(&config);
//! sound.music_play_from("random");
//! sound.update();
//! ```

#![warn(missing_docs)]

// Domain modules
pub mod config; // Key/value configuration store
pub mod decoder; // Fully decoded MP3/OGG/WAV streams
pub mod export; // WAV rendering
pub mod manager; // Sound orchestration
pub mod midi; // Standard MIDI File parsing
pub mod mixer; // Channel mixer
#[cfg(feature = "mt32")]
pub mod mt32; // MT-32 synth core and MIDI decoder stream
pub mod music; // Song backends
pub mod pcspeaker; // PC speaker emulation and synthesis streams
pub mod sfx; // Sound effect ids and managers
pub mod stream; // Pull-based audio stream abstraction
#[cfg(feature = "streaming")]
pub mod streaming; // Audio Output

/// Error types for sound operations
#[derive(thiserror::Error, Debug)]
pub enum SoundError {
    /// A required file (ROM, music file, config) is absent
    #[error("Resource missing: {0}")]
    ResourceMissing(String),

    /// Audio data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Standard MIDI File structure is invalid
    #[error("Malformed MIDI: {0}")]
    MalformedMidi(String),

    /// MT-32 ROM set is missing or invalid
    #[error("ROM error: {0}")]
    Rom(String),

    /// File format not supported by any decoder
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SoundError {
    /// Converts a String into `SoundError::Other`.
    ///
    /// Prefer the specific variants (`Decode`, `MalformedMidi`, `Rom`, ...) where
    /// callers need to tell failures apart.
    fn from(msg: String) -> Self {
        SoundError::Other(msg)
    }
}

impl From<&str> for SoundError {
    /// Converts a string slice into `SoundError::Other`.
    fn from(msg: &str) -> Self {
        SoundError::Other(msg.to_string())
    }
}

/// Result type for sound operations
pub type Result<T> = std::result::Result<T, SoundError>;

// Public API exports
pub use config::{Configuration, GameType};
pub use decoder::Mp3AudioStream;
pub use export::{render_to_wav, ExportConfig};
pub use manager::{AudioFlags, SoundManager, VisibleObject};
pub use midi::{MidiEvent, MidiFile, MidiTrack};
pub use mixer::{Mixer, SoundHandle, SoundType};
#[cfg(feature = "mt32")]
pub use mt32::{Mt32DecoderStream, SongMt32};
pub use music::{
    MusicOutput, MusicStyle, NativeMusicBackend, Song, SongMp3, SongNative, SoundCollection,
};
pub use pcspeaker::{PcSpeaker, SharedSpeaker, SPKR_OUTPUT_RATE};
pub use sfx::{ObjectSfxTable, PcSpeakerSfxManager, SfxId, SfxManager};
pub use stream::{AudioStream, LoopingAudioStream, QueuingAudioStream, SharedStream};
#[cfg(feature = "streaming")]
pub use streaming::AudioDevice;
