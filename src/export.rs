//! WAV file export
//!
//! Renders any [`AudioStream`] into a 16-bit PCM WAV file at the stream's
//! own rate and channel count.

use crate::stream::AudioStream;
use crate::Result;
use std::path::Path;

/// Export settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportConfig {
    /// Upper bound on rendered length, for endless streams
    pub max_seconds: f32,
    /// Scale the result so the loudest sample reaches full scale
    pub normalize: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            max_seconds: 60.0,
            normalize: false,
        }
    }
}

impl ExportConfig {
    /// Limit the rendered length
    pub fn max_seconds(mut self, seconds: f32) -> Self {
        self.max_seconds = seconds.max(0.0);
        self
    }

    /// Enable or disable peak normalisation
    pub fn normalize(mut self, enabled: bool) -> Self {
        self.normalize = enabled;
        self
    }
}

/// Render `stream` to `output_path` with default settings
///
/// Returns the number of samples written.
pub fn render_to_wav<P: AsRef<Path>>(stream: &mut dyn AudioStream, output_path: P) -> Result<usize> {
    render_to_wav_with_config(stream, output_path, ExportConfig::default())
}

/// Render `stream` to `output_path`
pub fn render_to_wav_with_config<P: AsRef<Path>>(
    stream: &mut dyn AudioStream,
    output_path: P,
    config: ExportConfig,
) -> Result<usize> {
    let channels: u16 = if stream.is_stereo() { 2 } else { 1 };
    let rate = stream.rate();
    let limit = (config.max_seconds * rate as f32) as usize * channels as usize;

    let mut samples = crate::stream::drain(stream, 4096, limit);
    if config.normalize {
        normalize_samples(&mut samples);
    }
    log::info!(
        "export: {} samples at {} Hz, {} ch to {}",
        samples.len(),
        rate,
        channels,
        output_path.as_ref().display()
    );
    write_wav_file(output_path.as_ref(), &samples, rate, channels)?;
    Ok(samples.len())
}

/// Scale so the peak sits at full scale; silence is left alone
fn normalize_samples(samples: &mut [i16]) {
    let peak = samples
        .iter()
        .map(|&s| (s as i32).abs())
        .max()
        .unwrap_or(0);
    if peak == 0 {
        return;
    }
    let gain = i16::MAX as f32 / peak as f32;
    for s in samples.iter_mut() {
        *s = (*s as f32 * gain).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}

/// Write samples to WAV file
pub fn write_wav_file(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("Failed to create WAV file: {}", e))?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| format!("Failed to write sample: {}", e))?;
    }

    writer
        .finalize()
        .map_err(|e| format!("Failed to finalize WAV file: {}", e))?;

    Ok(())
}
