//! Standard MIDI File parsing
//!
//! Files are parsed completely up front into per-track event lists with
//! absolute tick times. Channel messages and SysEx are kept as raw bytes for
//! the synth; tempo meta events are folded into a single file-wide value.

mod parser;

pub use parser::{parse_midi, read_var_len};

use crate::Result;
use std::path::Path;

/// Tempo assumed until a tempo event is seen (120 BPM)
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Resolution used when the file declares SMPTE timing
pub const FALLBACK_TICKS_PER_QUARTER: u16 = 120;

/// One timed MIDI message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    /// Ticks since the previous event in the same track
    pub delta_time: u32,
    /// Ticks since the start of the track
    pub abs_time: u32,
    /// Status byte and data bytes; SysEx bodies are prefixed with `0xF0`
    pub data: Vec<u8>,
}

impl MidiEvent {
    /// Whether this is a System Exclusive message
    pub fn is_sysex(&self) -> bool {
        self.data.first() == Some(&0xf0)
    }

    /// Channel message packed little-endian into a `u32` (status in the low byte)
    pub fn packed_message(&self) -> Option<u32> {
        if self.is_sysex() || self.data.len() < 2 {
            return None;
        }
        Some(
            self.data
                .iter()
                .take(3)
                .enumerate()
                .fold(0u32, |msg, (i, &b)| msg | (b as u32) << (8 * i)),
        )
    }
}

/// A time-ordered list of events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiTrack {
    /// Events, non-decreasing in `abs_time`
    pub events: Vec<MidiEvent>,
}

impl MidiTrack {
    /// Tick of the last event, 0 for an empty track
    pub fn end_tick(&self) -> u32 {
        self.events.last().map_or(0, |e| e.abs_time)
    }
}

/// A parsed Standard MIDI File
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiFile {
    /// SMF format (0, 1 or 2)
    pub format: u16,
    /// Tick resolution
    pub ticks_per_quarter: u16,
    /// Tempo from the last tempo event in the file
    pub microseconds_per_quarter: u32,
    /// Division declared SMPTE timing (played at the fallback resolution)
    pub smpte: bool,
    /// Tracks in file order
    pub tracks: Vec<MidiTrack>,
}

impl MidiFile {
    /// Read and parse the file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            log::error!("midi: cannot open {}: {}", path.display(), e);
            e
        })?;
        parse_midi(&data).map_err(|e| {
            log::error!("midi: {}: {}", path.display(), e);
            e
        })
    }

    /// Output samples per tick at `sample_rate`
    pub fn samples_per_tick(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 * self.microseconds_per_quarter as f64
            / (self.ticks_per_quarter as f64 * 1_000_000.0)
    }

    /// Tick of the last event in any track
    pub fn end_tick(&self) -> u32 {
        self.tracks.iter().map(MidiTrack::end_tick).max().unwrap_or(0)
    }

    /// Total event count over all tracks
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    /// Assemble an SMF image from a division and raw track bodies
    pub fn smf(division: u16, tracks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&(if tracks.len() > 1 { 1u16 } else { 0 }).to_be_bytes());
        out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        for body in tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }
}
