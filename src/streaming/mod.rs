//! Audio Output
//!
//! Plays a [`Mixer`](crate::Mixer) on the system audio device. The device
//! pulls interleaved stereo straight from the mixer, so whatever is started
//! on the mixer is heard without further plumbing.

mod audio_device;

pub use audio_device::AudioDevice;

/// Samples pulled from the mixer per lock
pub const MIX_BATCH_SAMPLES: usize = 4096;
