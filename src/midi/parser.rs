//! nom combinators for the SMF chunk layout

use super::{MidiEvent, MidiFile, MidiTrack, DEFAULT_TEMPO, FALLBACK_TICKS_PER_QUARTER};
use crate::{Result, SoundError};
use nom::bytes::complete::{tag, take};
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u32, u8 as byte};
use nom::IResult;

/// Longest variable-length quantity allowed by the file format
const MAX_VLQ_BYTES: usize = 4;

/// Decode a variable-length quantity of one to four bytes
///
/// Each byte carries seven bits, most significant group first; the high bit
/// marks that another byte follows.
pub fn read_var_len(input: &[u8]) -> IResult<&[u8], u32> {
    let mut value = 0u32;
    let mut rest = input;
    for _ in 0..MAX_VLQ_BYTES {
        let (r, b) = byte(rest)?;
        rest = r;
        value = (value << 7) | (b & 0x7f) as u32;
        if b & 0x80 == 0 {
            return Ok((rest, value));
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::TooLarge)))
}

struct Header {
    format: u16,
    num_tracks: u16,
    division: u16,
}

fn header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, _) = tag(&b"MThd"[..])(input)?;
    let (input, len) = be_u32(input)?;
    let (input, format) = be_u16(input)?;
    let (input, num_tracks) = be_u16(input)?;
    let (input, division) = be_u16(input)?;
    // longer headers carry fields this reader does not use
    let (input, _) = take(len.saturating_sub(6))(input)?;
    Ok((
        input,
        Header {
            format,
            num_tracks,
            division,
        },
    ))
}

fn track_chunk(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = tag(&b"MTrk"[..])(input)?;
    let (input, len) = be_u32(input)?;
    take(len)(input)
}

/// Data bytes following a channel status byte
fn channel_data_len(status: u8) -> usize {
    match status & 0xf0 {
        0xc0 | 0xd0 => 1,
        _ => 2,
    }
}

/// Parse the events of one track body
///
/// Tempo meta events update `tempo`; other meta events are dropped.
fn track_events<'a>(mut input: &'a [u8], tempo: &mut u32) -> IResult<&'a [u8], MidiTrack> {
    let mut events = Vec::new();
    let mut abs_time = 0u32;
    let mut running_status = 0u8;

    while !input.is_empty() {
        let (rest, delta_time) = read_var_len(input)?;
        abs_time = abs_time.wrapping_add(delta_time);
        let (after_status, first) = byte(rest)?;

        let (rest, status) = if first < 0x80 {
            if running_status == 0 {
                return Err(nom::Err::Failure(Error::new(rest, ErrorKind::Verify)));
            }
            (rest, running_status)
        } else {
            if first < 0xf0 {
                running_status = first;
            }
            (after_status, first)
        };

        match status {
            0x80..=0xef => {
                let (rest, body) = take(channel_data_len(status))(rest)?;
                let mut data = Vec::with_capacity(3);
                data.push(status);
                data.extend_from_slice(body);
                events.push(MidiEvent {
                    delta_time,
                    abs_time,
                    data,
                });
                input = rest;
            }
            0xf0 | 0xf7 => {
                let (rest, len) = read_var_len(rest)?;
                let (rest, body) = take(len)(rest)?;
                let mut data = Vec::with_capacity(body.len() + 1);
                data.push(0xf0);
                data.extend_from_slice(body);
                events.push(MidiEvent {
                    delta_time,
                    abs_time,
                    data,
                });
                input = rest;
            }
            0xff => {
                let (rest, meta_type) = byte(rest)?;
                let (rest, len) = read_var_len(rest)?;
                let (rest, body) = take(len)(rest)?;
                if meta_type == 0x51 && body.len() == 3 {
                    let value = (body[0] as u32) << 16 | (body[1] as u32) << 8 | body[2] as u32;
                    if value == 0 {
                        return Err(nom::Err::Failure(Error::new(input, ErrorKind::Satisfy)));
                    }
                    *tempo = value;
                    log::debug!("midi: tempo {} us/quarter at tick {}", *tempo, abs_time);
                }
                input = rest;
            }
            other => {
                // system common bytes have no place in a file; skip the byte
                log::debug!("midi: ignoring status {other:#04x} at tick {abs_time}");
                input = rest;
            }
        }
    }

    Ok((input, MidiTrack { events }))
}

fn malformed(what: &str, err: nom::Err<Error<&[u8]>>) -> SoundError {
    let reason = match err {
        nom::Err::Incomplete(_) => "truncated data".to_string(),
        nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
            ErrorKind::Tag => "bad chunk magic".to_string(),
            ErrorKind::TooLarge => "variable-length quantity longer than 4 bytes".to_string(),
            ErrorKind::Verify => "data byte without a running status".to_string(),
            ErrorKind::Satisfy => "tempo of zero microseconds per quarter".to_string(),
            ErrorKind::Eof => "truncated data".to_string(),
            code => code.description().to_string(),
        },
    };
    SoundError::MalformedMidi(format!("{what}: {reason}"))
}

/// Parse a complete Standard MIDI File image
pub fn parse_midi(data: &[u8]) -> Result<MidiFile> {
    let (mut input, hdr) = header(data).map_err(|e| malformed("header", e))?;

    let (ticks_per_quarter, smpte) = if hdr.division & 0x8000 != 0 {
        log::warn!(
            "midi: SMPTE division {:#06x} not supported, using {} ticks per quarter",
            hdr.division,
            FALLBACK_TICKS_PER_QUARTER
        );
        (FALLBACK_TICKS_PER_QUARTER, true)
    } else {
        (hdr.division.max(1), false)
    };

    let mut tempo = DEFAULT_TEMPO;
    let mut tracks = Vec::with_capacity(hdr.num_tracks as usize);
    for t in 0..hdr.num_tracks {
        let what = format!("track {t}");
        let (rest, body) = track_chunk(input).map_err(|e| malformed(&what, e))?;
        let (_, track) = track_events(body, &mut tempo).map_err(|e| malformed(&what, e))?;
        tracks.push(track);
        input = rest;
    }

    log::info!(
        "midi: format {} with {} tracks, {} ticks/quarter",
        hdr.format,
        tracks.len(),
        ticks_per_quarter
    );
    Ok(MidiFile {
        format: hdr.format,
        ticks_per_quarter,
        microseconds_per_quarter: tempo,
        smpte,
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(bytes: &[u8]) -> u32 {
        let (rest, v) = read_var_len(bytes).unwrap();
        assert!(rest.is_empty(), "unconsumed bytes for {bytes:02x?}");
        v
    }

    #[test]
    fn test_vlq_reference_values() {
        assert_eq!(vlq(&[0x00]), 0);
        assert_eq!(vlq(&[0x40]), 0x40);
        assert_eq!(vlq(&[0x7f]), 127);
        assert_eq!(vlq(&[0x81, 0x00]), 128);
        assert_eq!(vlq(&[0xc0, 0x00]), 0x2000);
        assert_eq!(vlq(&[0xff, 0x7f]), 16_383);
        assert_eq!(vlq(&[0x81, 0x80, 0x00]), 16_384);
        assert_eq!(vlq(&[0xff, 0xff, 0x7f]), 2_097_151);
        assert_eq!(vlq(&[0x81, 0x80, 0x80, 0x00]), 2_097_152);
        assert_eq!(vlq(&[0xff, 0xff, 0xff, 0x7f]), 0x0fff_ffff);
    }

    #[test]
    fn test_vlq_leaves_following_bytes() {
        let (rest, v) = read_var_len(&[0x83, 0x60, 0x90, 0x3c]).unwrap();
        assert_eq!(v, 480);
        assert_eq!(rest, &[0x90, 0x3c]);
    }

    #[test]
    fn test_vlq_rejects_five_bytes_and_truncation() {
        assert!(read_var_len(&[0x80, 0x80, 0x80, 0x80, 0x00]).is_err());
        assert!(read_var_len(&[0x81]).is_err());
        assert!(read_var_len(&[]).is_err());
    }

    #[test]
    fn test_running_status_and_sysex() {
        let body = [
            0x00, 0x90, 0x3c, 0x64, // note on
            0x10, 0x3e, 0x64, // running status note on
            0x00, 0xc1, 0x05, // program change, one data byte
            0x05, 0xf0, 0x03, 0x41, 0x10, 0xf7, // sysex
            0x00, 0x40, // running status survives the sysex
            0x00, 0xff, 0x2f, 0x00,
        ];
        let mut tempo = DEFAULT_TEMPO;
        let (_, track) = track_events(&body, &mut tempo).unwrap();
        let data: Vec<&[u8]> = track.events.iter().map(|e| e.data.as_slice()).collect();
        assert_eq!(
            data,
            vec![
                &[0x90, 0x3c, 0x64][..],
                &[0x90, 0x3e, 0x64][..],
                &[0xc1, 0x05][..],
                &[0xf0, 0x41, 0x10, 0xf7][..],
                &[0xc1, 0x40][..],
            ]
        );
        let times: Vec<u32> = track.events.iter().map(|e| e.abs_time).collect();
        assert_eq!(times, vec![0, 0x10, 0x10, 0x15, 0x15]);
    }

    #[test]
    fn test_tempo_meta_updates_file_tempo() {
        let body = [0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20, 0x00, 0xff, 0x2f, 0x00];
        let mut tempo = DEFAULT_TEMPO;
        let (_, track) = track_events(&body, &mut tempo).unwrap();
        assert!(track.events.is_empty());
        assert_eq!(tempo, 500_000);

        let body = [0x00, 0xff, 0x51, 0x03, 0x0f, 0x42, 0x40];
        track_events(&body, &mut tempo).unwrap();
        assert_eq!(tempo, 1_000_000);
    }

    #[test]
    fn test_zero_tempo_is_rejected() {
        let body = [0x00, 0xff, 0x51, 0x03, 0x00, 0x00, 0x00, 0x00, 0xff, 0x2f, 0x00];
        let mut tempo = DEFAULT_TEMPO;
        assert!(track_events(&body, &mut tempo).is_err());
        assert_eq!(tempo, DEFAULT_TEMPO);

        let mut file = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x60MTrk".to_vec();
        file.extend_from_slice(&(body.len() as u32).to_be_bytes());
        file.extend_from_slice(&body);
        match parse_midi(&file) {
            Err(SoundError::MalformedMidi(msg)) => assert!(msg.contains("tempo"), "{msg}"),
            other => panic!("expected MalformedMidi, got {other:?}"),
        }
    }

    #[test]
    fn test_data_byte_without_status_is_error() {
        let mut tempo = DEFAULT_TEMPO;
        assert!(track_events(&[0x00, 0x3c, 0x40], &mut tempo).is_err());
    }
}
