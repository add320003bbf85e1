//! Channel mixer
//!
//! A cloneable handle over the set of playing streams. Every stream plays at
//! its own rate; [`Mixer::mix`] converts each to the output rate, applies the
//! channel and sound-type volumes and sums them into interleaved stereo.

mod channel;

use crate::stream::AudioStream;
use channel::Channel;
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Full channel volume
pub const MAX_VOLUME: u8 = 255;

/// Identifies one playing stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundHandle(u64);

impl SoundHandle {
    /// Raw handle id
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Category a stream is mixed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundType {
    /// Background music
    Music,
    /// Sound effects
    Sfx,
    /// Spoken dialogue
    Speech,
    /// Anything else
    Plain,
}

impl SoundType {
    fn index(self) -> usize {
        match self {
            SoundType::Music => 0,
            SoundType::Sfx => 1,
            SoundType::Speech => 2,
            SoundType::Plain => 3,
        }
    }
}

struct MixerState {
    output_rate: u32,
    next_handle: u64,
    channels: Vec<Channel>,
    type_volume: [u8; 4],
    scratch: Vec<i32>,
}

/// Shared handle to the channel mixer
#[derive(Clone)]
pub struct Mixer {
    state: Arc<Mutex<MixerState>>,
}

impl Mixer {
    /// Mixer producing interleaved stereo at `output_rate` Hz
    pub fn new(output_rate: u32) -> Self {
        Mixer {
            state: Arc::new(Mutex::new(MixerState {
                output_rate: output_rate.max(1),
                next_handle: 1,
                channels: Vec::new(),
                type_volume: [MAX_VOLUME; 4],
                scratch: Vec::new(),
            })),
        }
    }

    /// Output rate in Hz
    pub fn output_rate(&self) -> u32 {
        self.state.lock().output_rate
    }

    /// Start playing `stream` at `volume` (0-255)
    pub fn play_stream(&self, kind: SoundType, stream: Box<dyn AudioStream>, volume: u8) -> SoundHandle {
        self.start(kind, stream, volume, None)
    }

    /// Like [`play_stream`](Self::play_stream), raising `finished` once the
    /// stream has played out
    ///
    /// The flag is not raised when the channel is stopped explicitly.
    pub fn play_stream_with_notify(
        &self,
        kind: SoundType,
        stream: Box<dyn AudioStream>,
        volume: u8,
        finished: Arc<AtomicBool>,
    ) -> SoundHandle {
        self.start(kind, stream, volume, Some(finished))
    }

    fn start(
        &self,
        kind: SoundType,
        stream: Box<dyn AudioStream>,
        volume: u8,
        notify: Option<Arc<AtomicBool>>,
    ) -> SoundHandle {
        let mut state = self.state.lock();
        let handle = SoundHandle(state.next_handle);
        state.next_handle += 1;
        log::debug!(
            "mixer: start {:?} handle {} at {} Hz stereo={} volume {}",
            kind,
            handle.0,
            stream.rate(),
            stream.is_stereo(),
            volume
        );
        let rate = state.output_rate;
        state
            .channels
            .push(Channel::new(handle, kind, stream, volume, notify, rate));
        handle
    }

    /// Stop and drop the stream behind `handle`
    pub fn stop_handle(&self, handle: SoundHandle) {
        self.state.lock().channels.retain(|c| c.handle != handle);
    }

    /// Stop every channel
    pub fn stop_all(&self) {
        self.state.lock().channels.clear();
    }

    /// Change the volume of one channel
    pub fn set_channel_volume(&self, handle: SoundHandle, volume: u8) {
        let mut state = self.state.lock();
        if let Some(c) = state.channels.iter_mut().find(|c| c.handle == handle) {
            c.volume = volume;
        }
    }

    /// Current volume of one channel
    pub fn channel_volume(&self, handle: SoundHandle) -> Option<u8> {
        let state = self.state.lock();
        state
            .channels
            .iter()
            .find(|c| c.handle == handle)
            .map(|c| c.volume)
    }

    /// Volume applied to every channel of `kind`
    pub fn set_volume_for_type(&self, kind: SoundType, volume: u8) {
        self.state.lock().type_volume[kind.index()] = volume;
    }

    /// Whether `handle` is still playing
    pub fn is_sound_handle_active(&self, handle: SoundHandle) -> bool {
        self.state
            .lock()
            .channels
            .iter()
            .any(|c| c.handle == handle && !c.is_done())
    }

    /// Number of playing channels
    pub fn active_count(&self) -> usize {
        self.state
            .lock()
            .channels
            .iter()
            .filter(|c| !c.is_done())
            .count()
    }

    /// Mix every channel into `out` (interleaved stereo)
    ///
    /// Channels that have played out are removed and their completion flags
    /// raised.
    pub fn mix(&self, out: &mut [i16]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let len = out.len() & !1;
        state.scratch.clear();
        state.scratch.resize(len, 0);

        let type_volume = state.type_volume;
        for c in state.channels.iter_mut() {
            c.mix_into(&mut state.scratch, type_volume[c.kind.index()]);
        }

        for (o, &acc) in out[..len].iter_mut().zip(state.scratch.iter()) {
            *o = acc.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
        if len < out.len() {
            out[len] = 0;
        }

        state.channels.retain(|c| {
            if c.is_done() {
                log::trace!("mixer: handle {} finished", c.handle.0);
                c.notify_finished();
                false
            } else {
                true
            }
        });
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(44_100)
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Mixer")
            .field("output_rate", &state.output_rate)
            .field("channels", &state.channels.len())
            .finish_non_exhaustive()
    }
}
