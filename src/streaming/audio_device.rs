//! Audio device integration using rodio

use super::MIX_BATCH_SAMPLES;
use crate::mixer::Mixer;
use crate::{Result, SoundError};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Audio source that mixes on demand
struct MixerSource {
    mixer: Mixer,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    /// Mixed batch, refilled when consumed
    mixed: Vec<i16>,
    buffer: Vec<f32>,
    buffer_pos: usize,
}

impl MixerSource {
    fn new(mixer: Mixer, finished: Arc<AtomicBool>) -> Self {
        MixerSource {
            sample_rate: mixer.output_rate(),
            mixer,
            finished,
            mixed: vec![0; MIX_BATCH_SAMPLES],
            buffer: vec![0.0; MIX_BATCH_SAMPLES],
            buffer_pos: MIX_BATCH_SAMPLES,
        }
    }

    fn refill(&mut self) {
        self.mixer.mix(&mut self.mixed);
        for (out, &s) in self.buffer.iter_mut().zip(self.mixed.iter()) {
            *out = s as f32 / 32768.0;
        }
        self.buffer_pos = 0;
    }
}

impl Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        let left = self.buffer.len().saturating_sub(self.buffer_pos);
        Some(if left > 0 { left } else { MIX_BATCH_SAMPLES })
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }
        if self.buffer_pos >= self.buffer.len() {
            self.refill();
        }
        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// System audio output playing a [`Mixer`]
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start pulling from `mixer`
    pub fn new(mixer: Mixer) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| SoundError::AudioDevice(format!("Failed to create audio stream: {}", e)))?;

        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| SoundError::AudioDevice(format!("Failed to create audio sink: {}", e)))?;

        let finished = Arc::new(AtomicBool::new(false));
        log::info!("audio device: mixing at {} Hz", mixer.output_rate());
        sink.append(MixerSource::new(mixer, Arc::clone(&finished)));

        Ok(AudioDevice {
            _stream: stream,
            sink,
            finished,
        })
    }

    /// Pause playback
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume playback
    pub fn play(&self) {
        self.sink.play();
    }

    /// Whether the device is still pulling from the mixer
    pub fn is_running(&self) -> bool {
        !self.finished.load(Ordering::Relaxed)
    }

    /// Stop pulling from the mixer; the device falls silent
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.pause();
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{SoundType, MAX_VOLUME};
    use crate::pcspeaker::effects;

    #[test]
    fn test_source_pulls_stereo_from_mixer() {
        let mixer = Mixer::new(22_050);
        mixer.play_stream(SoundType::Sfx, effects::glass(), MAX_VOLUME);
        let mut source = MixerSource::new(mixer, Arc::new(AtomicBool::new(false)));
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 22_050);
        let samples: Vec<f32> = source.by_ref().take(MIX_BATCH_SAMPLES * 2).collect();
        assert_eq!(samples.len(), MIX_BATCH_SAMPLES * 2);
        assert!(samples.iter().all(|s| (-1.0..1.0).contains(s)));
        assert!(samples.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_finished_source_ends() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut source = MixerSource::new(Mixer::new(22_050), finished.clone());
        assert_eq!(source.next(), Some(0.0));
        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_device_creation() {
        let device = match AudioDevice::new(Mixer::new(44_100)) {
            Ok(device) => device,
            Err(err) => {
                eprintln!("Skipping audio device test (audio backend unavailable): {}", err);
                return;
            }
        };
        assert!(device.is_running());
        device.pause();
        device.play();
        device.finish();
        assert!(!device.is_running());
    }
}
