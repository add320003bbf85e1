//! Composite sound effects
//!
//! Each factory builds a fresh speaker, programs a score of primitive
//! streams against it and returns the result ready for the mixer. Queued
//! scores report the queue's rate and end once every part has played.

use super::{
    FireStream, FreqStream, PcSpeaker, RandomStream, StutterStream, TickStream, WaterNoiseStream,
    SPKR_OUTPUT_RATE,
};
use crate::stream::{AudioStream, QueuingAudioStream};
use num_derive::FromPrimitive;
use rand::Rng;

/// Highest magic circle with its own casting sound
pub const MAX_MAGIC_CIRCLE: u8 = 8;

/// PIT counters for the ten playable notes
pub const INSTRUMENT_NOTE_COUNTERS: [u16; 10] = [
    0x1EAB, 0x0C2C, 0x0DA9, 0x0F56, 0x103F, 0x123C, 0x1478, 0x16FA, 0x1857, 0x1B53,
];

/// Clock used by the driver when converting counters to Hz
const DRIVER_PIT_HZ: u32 = 1_193_180;

// Stutter parameters for the second casting phase, indexed by circle
const CASTING_P2_RATE: [i16; 9] = [3, 2, 2, 2, 1, 1, 1, 1, 1];
const CASTING_P2_RISE_THRESHOLD: [u16; 9] =
    [0xA8C, 0xBB8, 0x3E8, 0x64, 0x1388, 0xFA0, 0x9C4, 0x3E8, 1];
const CASTING_P2_FALL_THRESHOLD: [u16; 9] = [
    0x7FBC, 0x7918, 0x9088, 0xAFC8, 0x7918, 0x84D0, 0x8E94, 0x9858, 0xA410,
];
const CASTING_P2_CADENCE: [u16; 9] = [
    0x226A, 0x1E96, 0x1B94, 0x1996, 0x173E, 0x15C2, 0x143C, 0x12D4, 0x1180,
];

const AVATAR_DEATH_TUNE: [u16; 8] = [0x12C, 0x119, 0x12C, 0xFA, 0x119, 0xDE, 0xFA, 0xFA];

const FOUNTAIN_CUTOFF_HZ: f32 = 900.0;
const FOUNTAIN_GAIN: f32 = 24_000.0;
/// Half a second of water per loop
const FOUNTAIN_SAMPLES: u32 = SPKR_OUTPUT_RATE / 2;

const CLOCK_TICK_HZ: u32 = DRIVER_PIT_HZ / 3000;
const CLOCK_TOCK_HZ: u32 = DRIVER_PIT_HZ / 3500;

/// Musical instruments the avatar can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum Instrument {
    /// Harp
    Harp = 0,
    /// Harpsichord
    Harpsichord = 1,
    /// Lute
    Lute = 2,
    /// Panpipes
    Panpipes = 3,
    /// Xylophone
    Xylophone = 4,
}

fn queue() -> QueuingAudioStream {
    QueuingAudioStream::new(SPKR_OUTPUT_RATE, false)
}

fn finish(mut q: QueuingAudioStream) -> Box<dyn AudioStream> {
    q.finish();
    Box::new(q)
}

/// Slug dissolving in acid: twenty short noise bursts
pub fn slug_dissolve() -> Box<dyn AudioStream> {
    let speaker = PcSpeaker::shared();
    let mut rng = rand::rng();
    let mut q = queue();
    for _ in 0..20 {
        let base = rng.random_range(0..0x1068) + 0x258;
        q.queue_stream(Box::new(RandomStream::new(speaker.clone(), base, 0x15e, 1)));
    }
    finish(q)
}

/// Breaking glass: noise rising through eighteen bands
pub fn glass() -> Box<dyn AudioStream> {
    let speaker = PcSpeaker::shared();
    let mut q = queue();
    for base in (0x7d0u32..0x4e20).step_by(0x3e8) {
        q.queue_stream(Box::new(RandomStream::new(speaker.clone(), base, 0x78, 0x28)));
    }
    finish(q)
}

/// First casting phase; longer for higher circles
pub fn magic_casting_p1(magic_circle: u8) -> Box<dyn AudioStream> {
    let circle = magic_circle.min(MAX_MAGIC_CIRCLE) as u16;
    Box::new(RandomStream::new(
        PcSpeaker::shared(),
        0x2bc,
        0x640 * circle + 0x1f40,
        0x320,
    ))
}

/// Second casting phase: a rising then a falling stutter
pub fn magic_casting_p2(magic_circle: u8) -> Box<dyn AudioStream> {
    let c = magic_circle.min(MAX_MAGIC_CIRCLE) as usize;
    let iterations = c as u16 * 0xfa0 + 0x2710;
    let speaker = PcSpeaker::shared();
    let mut q = queue();
    q.queue_stream(Box::new(StutterStream::new(
        speaker.clone(),
        CASTING_P2_RATE[c],
        CASTING_P2_RISE_THRESHOLD[c],
        iterations,
        1,
        CASTING_P2_CADENCE[c],
    )));
    q.queue_stream(Box::new(StutterStream::new(
        speaker,
        -CASTING_P2_RATE[c],
        CASTING_P2_FALL_THRESHOLD[c],
        iterations,
        1,
        CASTING_P2_CADENCE[c],
    )));
    finish(q)
}

/// Eight-note lament played when the avatar dies
pub fn avatar_death() -> Box<dyn AudioStream> {
    let speaker = PcSpeaker::shared();
    let mut q = queue();
    for &note in AVATAR_DEATH_TUNE.iter() {
        q.queue_stream(Box::new(StutterStream::new(speaker.clone(), 3, 1, 0x4e20, 1, note)));
    }
    finish(q)
}

/// Kal Lor chant: fifty rising stutters and a closing tone
pub fn kal_lor() -> Box<dyn AudioStream> {
    let speaker = PcSpeaker::shared();
    let mut q = queue();
    for i in 0..0x32u16 {
        q.queue_stream(Box::new(StutterStream::new(
            speaker.clone(),
            ((0x32 - i) << 2) as i16,
            0x2710 - (i << 6),
            0x3e8,
            1,
            (i << 4) + 0x320,
        )));
    }
    q.queue_stream(Box::new(StutterStream::new(speaker, 8, 0, 0x1f40, 1, 0x640)));
    finish(q)
}

/// Hailstorm: forty low clicks
pub fn hail_stones() -> Box<dyn AudioStream> {
    let speaker = PcSpeaker::shared();
    let mut rng = rand::rng();
    let mut q = queue();
    for _ in 0..0x28 {
        let freq = rng.random_range(0..0x28) + 0x20;
        q.queue_stream(Box::new(FreqStream::new(speaker.clone(), freq, 8)));
    }
    finish(q)
}

/// Earthquake: forty low rumbling tones
pub fn earthquake() -> Box<dyn AudioStream> {
    let speaker = PcSpeaker::shared();
    let mut rng = rand::rng();
    let mut q = queue();
    for _ in 0..0x28 {
        let freq = rng.random_range(0..0xb5) + 0x13;
        q.queue_stream(Box::new(FreqStream::new(speaker.clone(), freq, 8)));
    }
    finish(q)
}

/// Fountain: half a second of low-passed noise, meant to loop
pub fn fountain() -> Box<dyn AudioStream> {
    Box::new(WaterNoiseStream::new(
        FOUNTAIN_CUTOFF_HZ,
        FOUNTAIN_SAMPLES,
        FOUNTAIN_GAIN,
    ))
}

/// Water wheel: fast gurgling noise, meant to loop
pub fn water_wheel() -> Box<dyn AudioStream> {
    Box::new(RandomStream::new(PcSpeaker::shared(), 20, 60, 10_000))
}

/// Fireplace crackle, meant to loop
pub fn fire() -> Box<dyn AudioStream> {
    Box::new(FireStream::new(PcSpeaker::shared()))
}

/// Clock tick and tock, meant to loop
pub fn clock() -> Box<dyn AudioStream> {
    Box::new(TickStream::with_game_period(
        PcSpeaker::shared(),
        CLOCK_TICK_HZ,
        CLOCK_TOCK_HZ,
    ))
}

/// Protection field buzz at a random pitch
pub fn protection_field() -> Box<dyn AudioStream> {
    let pit_counter = rand::rng().random_range(0..1301u32) + 200;
    Box::new(FreqStream::new(
        PcSpeaker::shared(),
        DRIVER_PIT_HZ / pit_counter,
        8,
    ))
}

/// Frequency in Hz of `note` (0-9) before any instrument transposition
pub fn note_hz(note: u8) -> Option<u32> {
    INSTRUMENT_NOTE_COUNTERS
        .get(note as usize)
        .map(|&counter| DRIVER_PIT_HZ / counter as u32)
}

/// One note on an instrument; `None` for notes outside 0-9
pub fn instrument_note(instrument: Instrument, note: u8) -> Option<Box<dyn AudioStream>> {
    let hz = note_hz(note)?;
    let (freq, d) = match instrument {
        Instrument::Harp => (hz / 2, 300),
        Instrument::Harpsichord => (hz, 200),
        Instrument::Lute => (hz / 2, 250),
        Instrument::Panpipes => (hz / 4, 200),
        Instrument::Xylophone => (hz, 80),
    };
    log::debug!("instrument {instrument:?} note {note}: {freq} Hz for {d} units");
    Some(Box::new(FreqStream::new(PcSpeaker::shared(), freq, d)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcspeaker::DELAY_UNIT_SAMPLES;
    use crate::stream::drain;
    use num_traits::FromPrimitive;

    fn total_len(mut s: Box<dyn AudioStream>) -> usize {
        let len = drain(s.as_mut(), 512, 10_000_000).len();
        assert!(s.end_of_data(), "composite should report end of data");
        len
    }

    #[test]
    fn test_avatar_death_length() {
        assert_eq!(total_len(avatar_death()), 8 * 0x4e20);
    }

    #[test]
    fn test_kal_lor_length() {
        assert_eq!(total_len(kal_lor()), 0x32 * 0x3e8 + 0x1f40);
    }

    #[test]
    fn test_hail_stones_length() {
        assert_eq!(total_len(hail_stones()), 0x28 * 8 * DELAY_UNIT_SAMPLES as usize);
    }

    #[test]
    fn test_glass_queue_rate_and_length() {
        let s = glass();
        assert_eq!(s.rate(), SPKR_OUTPUT_RATE);
        assert!(!s.is_stereo());
        // 18 bands of 3 steps of 88 samples
        assert_eq!(total_len(s), 18 * 3 * 88);
    }

    #[test]
    fn test_magic_casting_p2_every_circle() {
        for circle in 0..=MAX_MAGIC_CIRCLE {
            let expected = 2 * (circle as usize * 0xfa0 + 0x2710);
            assert_eq!(total_len(magic_casting_p2(circle)), expected);
        }
    }

    #[test]
    fn test_magic_circle_clamped() {
        let a = magic_casting_p1(200).length_ms();
        let b = magic_casting_p1(MAX_MAGIC_CIRCLE).length_ms();
        assert_eq!(a, b);
    }

    #[test]
    fn test_instrument_notes() {
        assert_eq!(note_hz(0), Some(1_193_180 / 0x1EAB));
        assert!(instrument_note(Instrument::Harp, 10).is_none());
        let s = instrument_note(Instrument::Xylophone, 3).expect("valid note");
        assert_eq!(total_len(s), 80 * DELAY_UNIT_SAMPLES as usize);
        assert_eq!(Instrument::from_u8(3), Some(Instrument::Panpipes));
        assert_eq!(Instrument::from_u8(9), None);
    }

    #[test]
    fn test_ambient_effects_rewind() {
        for mut s in [fountain(), water_wheel(), fire(), clock(), protection_field()] {
            let first = drain(s.as_mut(), 1024, 1_000_000).len();
            assert!(first > 0);
            assert!(s.rewind());
            assert_eq!(drain(s.as_mut(), 1024, 1_000_000).len(), first);
        }
    }
}
