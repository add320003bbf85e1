//! Whole-file decoders for the supported music formats

use crate::{Result, SoundError};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Interleaved 16-bit PCM for a complete file
#[derive(Debug, Clone, Default)]
pub struct DecodedAudio {
    /// Interleaved samples
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

/// Container format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MPEG layer III
    Mp3,
    /// Ogg Vorbis
    Ogg,
    /// RIFF WAVE, 16-bit PCM only
    Wav,
}

impl AudioFormat {
    /// Format for `path`; unknown extensions are treated as MP3
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("ogg") => AudioFormat::Ogg,
            Some("wav") => AudioFormat::Wav,
            _ => AudioFormat::Mp3,
        }
    }
}

/// Decode the whole file at `path`
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    match AudioFormat::from_path(path) {
        AudioFormat::Mp3 => decode_mp3(path),
        AudioFormat::Ogg => decode_ogg(path),
        AudioFormat::Wav => decode_wav(path),
    }
}

/// Decode an MP3 file with symphonia
pub fn decode_mp3(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SoundError::Decode(format!("{}: {}", path.display(), e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SoundError::Decode(format!("{}: no audio track", path.display())))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| SoundError::Decode(format!("{}: {}", path.display(), e)))?;

    let mut out = DecodedAudio {
        samples: Vec::new(),
        sample_rate: params.sample_rate.unwrap_or(0),
        channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
    };

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(SoundError::Decode(format!("{}: {}", path.display(), e))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                out.samples.extend_from_slice(buf.samples());
                out.sample_rate = spec.rate;
                out.channels = spec.channels.count() as u16;
            }
            // a corrupt frame is skipped, the rest of the file still plays
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("{}: skipping bad frame: {}", path.display(), e);
            }
            Err(e) => return Err(SoundError::Decode(format!("{}: {}", path.display(), e))),
        }
    }

    if out.samples.is_empty() || out.channels == 0 {
        return Err(SoundError::Decode(format!(
            "{}: no audio decoded",
            path.display()
        )));
    }
    Ok(out)
}

/// Decode an Ogg Vorbis file with lewton
pub fn decode_ogg(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path)?;
    let mut reader = lewton::inside_ogg::OggStreamReader::new(BufReader::new(file))
        .map_err(|e| SoundError::Decode(format!("{}: {}", path.display(), e)))?;

    let mut out = DecodedAudio {
        samples: Vec::new(),
        sample_rate: reader.ident_hdr.audio_sample_rate,
        channels: reader.ident_hdr.audio_channels as u16,
    };
    while let Some(packet) = reader
        .read_dec_packet_itl()
        .map_err(|e| SoundError::Decode(format!("{}: {}", path.display(), e)))?
    {
        out.samples.extend_from_slice(&packet);
    }

    if out.samples.is_empty() {
        return Err(SoundError::Decode(format!(
            "{}: no audio decoded",
            path.display()
        )));
    }
    Ok(out)
}

/// Read a 16-bit PCM WAV file with hound
///
/// Other sample formats are rejected rather than converted.
pub fn decode_wav(path: &Path) -> Result<DecodedAudio> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| SoundError::Decode(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(SoundError::UnsupportedFormat(format!(
            "{}: {}-bit {:?} WAV, only 16-bit PCM is supported",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        )));
    }
    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SoundError::Decode(format!("{}: {}", path.display(), e)))?;
    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(AudioFormat::from_path(Path::new("a/brit.OGG")), AudioFormat::Ogg);
        assert_eq!(AudioFormat::from_path(Path::new("x.Wav")), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_path(Path::new("x.mp3")), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_path(Path::new("noext")), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_path(Path::new("x.flac")), AudioFormat::Mp3);
    }

    #[test]
    fn test_eight_bit_wav_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u8.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 11_025,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..64i8 {
            w.write_sample(i).unwrap();
        }
        w.finalize().unwrap();

        assert!(matches!(
            decode_wav(&path),
            Err(SoundError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_garbage_mp3_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mp3");
        std::fs::write(&path, b"definitely not an mpeg stream").unwrap();
        assert!(decode_file(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            decode_file(Path::new("/nonexistent/dir/song.ogg")),
            Err(SoundError::Io(_))
        ));
    }
}
