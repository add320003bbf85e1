//! MT-32 music backend
//!
//! [`Mt32DecoderStream`] sequences a parsed MIDI file into a [`SynthCore`]
//! and renders the result as a stereo [`AudioStream`](crate::AudioStream).
//! The synth core is a seam: the built-in [`SoftSynth`] is used unless a
//! caller supplies another implementation.

mod decoder;
mod rom;
mod softsynth;
mod song;

pub use decoder::{DecoderState, Mt32DecoderStream};
pub use rom::{
    check_roms_exist, RomKind, RomModel, RomSet, CM32L_PCM_ROM_SIZE, CONTROL_ROM_SIZE,
    MT32_PCM_ROM_SIZE,
};
pub use softsynth::{SoftSynth, MAX_VOICES, MT32_SAMPLE_RATE};
pub use song::SongMt32;

use crate::Result;

/// A MIDI sound module
///
/// The contract follows the usual emulator service API: ROMs are added,
/// the synth is opened, then MIDI is fed in and interleaved stereo pulled
/// out at [`sample_rate`](Self::sample_rate).
pub trait SynthCore: Send {
    /// Add a ROM image, reporting which kind it was recognised as
    fn add_rom(&mut self, data: &[u8]) -> Result<RomKind>;

    /// Start the synth once both ROMs are present
    fn open(&mut self) -> Result<()>;

    /// Stereo output rate in Hz
    fn sample_rate(&self) -> u32;

    /// Play a short channel message, status in the low byte
    fn play_msg(&mut self, msg: u32);

    /// Play a System Exclusive message including its `0xF0` prefix
    fn play_sysex(&mut self, data: &[u8]);

    /// Render `out.len() / 2` interleaved stereo frames
    fn render(&mut self, out: &mut [i16]);

    /// Whether any voice or effect tail is still sounding
    fn is_active(&self) -> bool;

    /// Dry output gain, 1.0 is unity
    fn set_output_gain(&mut self, gain: f32);

    /// Reverb output gain, 1.0 is unity
    fn set_reverb_output_gain(&mut self, gain: f32);
}
