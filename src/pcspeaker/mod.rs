//! PC speaker synthesis
//!
//! A [`PcSpeaker`] oscillator plus the stateful streams that program it the
//! way the original game's sound driver did. Durations given to the streams
//! are in the driver's delay units; one unit is [`DELAY_UNIT_SAMPLES`] output
//! samples.
//!
//! Streams never touch a global speaker: each composite effect in
//! [`effects`] creates its own [`SharedSpeaker`] and hands it to every
//! primitive it queues. Primitives program the speaker when they start
//! playing, so queued streams sharing one speaker do not disturb each other.

pub mod effects;
mod fire;
mod freq;
mod random;
mod speaker;
mod stutter;
mod tick;
mod water;

pub use fire::{plan_cycle, CyclePlan, FireStream, BURST_STEPS};
pub use freq::{FreqStream, SweepFreqStream};
pub use random::{next_rand_value, random_step, RandomStream, RandomTone, RANDOM_SEED};
pub use speaker::{PcSpeaker, SharedSpeaker, PIT_TICK_RATE, SPKR_OUTPUT_RATE, SPKR_VOLUME};
pub use stutter::StutterStream;
pub use tick::TickStream;
pub use water::WaterNoiseStream;

/// Output samples per driver delay unit
pub const DELAY_UNIT_SAMPLES: u32 = SPKR_OUTPUT_RATE / 1255;

/// Original game timer rate in Hz
pub const GAME_TICK_HZ: f64 = 18.2065;

/// One game "period": sixteen timer ticks, in output samples
pub fn game_period_samples() -> u32 {
    (SPKR_OUTPUT_RATE as f64 * 16.0 / GAME_TICK_HZ) as u32
}

/// Convert a sample count at `rate` into milliseconds
pub(crate) fn samples_to_ms(samples: f64, rate: u32) -> u32 {
    (samples / (rate as f64 / 1000.0)) as u32
}
