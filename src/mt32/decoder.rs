//! MIDI sequencer rendering through a synth core

use super::rom::RomSet;
use super::{SoftSynth, SynthCore};
use crate::midi::{MidiFile, DEFAULT_TEMPO};
use crate::stream::AudioStream;
use crate::Result;
use std::path::Path;

const MIDI_CHANNELS: u32 = 16;
const CC_RESET_ALL_CONTROLLERS: u32 = 121;
const CC_ALL_NOTES_OFF: u32 = 123;

/// Lifecycle of a decoder stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No synth yet
    Uninitialized,
    /// ROMs loaded and synth open
    Ready,
    /// MIDI loaded, nothing rendered yet
    Loaded,
    /// Rendering
    Playing,
    /// Every event played and the synth has gone quiet
    Finished,
}

/// Tick-driven MIDI playback into a [`SynthCore`]
///
/// Events are dispatched when the tick counter reaches their time; between
/// ticks the core renders audio. The stream ends once every track is
/// exhausted and the core reports no sounding voices, so release and
/// reverb tails are not cut off.
pub struct Mt32DecoderStream {
    core: Box<dyn SynthCore>,
    initialized: bool,
    midi: Option<MidiFile>,
    cursors: Vec<usize>,
    sample_rate: u32,
    current_tick: u32,
    samples_per_tick: f64,
    sample_counter: u64,
    started: bool,
    end_of_data: bool,
    gain: f32,
}

impl Mt32DecoderStream {
    /// Decoder using the built-in synth core
    pub fn new() -> Self {
        Self::with_core(Box::new(SoftSynth::new()))
    }

    /// Decoder driving a caller-supplied core
    pub fn with_core(core: Box<dyn SynthCore>) -> Self {
        Mt32DecoderStream {
            sample_rate: core.sample_rate(),
            core,
            initialized: false,
            midi: None,
            cursors: Vec::new(),
            current_tick: 0,
            samples_per_tick: 0.0,
            sample_counter: 0,
            started: false,
            end_of_data: false,
            gain: 1.0,
        }
    }

    /// Create, initialise from `rom_dir` and load `midi_path` in one step
    pub fn open(rom_dir: impl AsRef<Path>, midi_path: impl AsRef<Path>) -> Result<Self> {
        let mut stream = Self::new();
        stream.init(rom_dir)?;
        stream.load_midi(midi_path)?;
        Ok(stream)
    }

    /// Load the ROM pair from `rom_dir` and open the synth
    ///
    /// Calling again after a successful init does nothing.
    pub fn init(&mut self, rom_dir: impl AsRef<Path>) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let roms = RomSet::load(rom_dir.as_ref())?;
        self.init_with_roms(&roms)
    }

    /// Open the synth with an already loaded ROM pair
    pub fn init_with_roms(&mut self, roms: &RomSet) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        for (what, data) in [("control", &roms.control), ("PCM", &roms.pcm)] {
            self.core.add_rom(data).map_err(|e| {
                log::error!("MT-32: failed to add {what} ROM: {e}");
                e
            })?;
        }
        self.core.open().map_err(|e| {
            log::error!("MT-32: failed to open synth: {e}");
            e
        })?;
        self.sample_rate = self.core.sample_rate();
        self.core.set_output_gain(self.gain);
        self.core.set_reverb_output_gain(self.gain);
        self.initialized = true;
        log::info!("MT-32 emulator initialized at {} Hz", self.sample_rate);
        Ok(())
    }

    /// Parse the MIDI file at `path` and reset playback to its start
    pub fn load_midi(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let midi = MidiFile::load(path)?;
        self.set_midi(midi);
        Ok(())
    }

    /// Use an already parsed MIDI file
    pub fn set_midi(&mut self, midi: MidiFile) {
        self.samples_per_tick = midi.samples_per_tick(self.sample_rate);
        if !(self.samples_per_tick > 0.0 && self.samples_per_tick.is_finite()) {
            log::warn!(
                "MT-32: unusable timing ({} us/quarter at {} Hz), using the default tempo",
                midi.microseconds_per_quarter,
                self.sample_rate
            );
            self.samples_per_tick = self.sample_rate as f64 * DEFAULT_TEMPO as f64
                / (midi.ticks_per_quarter.max(1) as f64 * 1_000_000.0);
        }
        log::info!(
            "MT-32: loaded MIDI with {} tracks, {} ticks/quarter, {:.2} samples/tick",
            midi.tracks.len(),
            midi.ticks_per_quarter,
            self.samples_per_tick
        );
        self.cursors = vec![0; midi.tracks.len()];
        self.midi = Some(midi);
        self.current_tick = 0;
        self.sample_counter = 0;
        self.started = false;
        self.end_of_data = false;
    }

    /// Where the stream is in its lifecycle
    pub fn state(&self) -> DecoderState {
        match (self.initialized, &self.midi) {
            (false, _) => DecoderState::Uninitialized,
            (true, None) => DecoderState::Ready,
            (true, Some(_)) if self.end_of_data => DecoderState::Finished,
            (true, Some(_)) if self.started => DecoderState::Playing,
            (true, Some(_)) => DecoderState::Loaded,
        }
    }

    /// Current MIDI tick
    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    /// Stereo frames rendered since the start
    pub fn frames_rendered(&self) -> u64 {
        self.sample_counter
    }

    /// Output samples per MIDI tick
    pub fn samples_per_tick(&self) -> f64 {
        self.samples_per_tick
    }

    /// Set playback volume, 0-255, as synth output gain
    pub fn set_volume(&mut self, volume: u8) {
        self.gain = volume as f32 / 255.0;
        if self.initialized {
            self.core.set_output_gain(self.gain);
            self.core.set_reverb_output_gain(self.gain);
        }
    }

    fn tracks_exhausted(&self) -> bool {
        match &self.midi {
            Some(midi) => midi
                .tracks
                .iter()
                .zip(&self.cursors)
                .all(|(track, &cursor)| cursor >= track.events.len()),
            None => true,
        }
    }

    fn process_due_events(&mut self) {
        let Some(midi) = &self.midi else {
            return;
        };
        for (track, cursor) in midi.tracks.iter().zip(self.cursors.iter_mut()) {
            while let Some(event) = track.events.get(*cursor) {
                if event.abs_time > self.current_tick {
                    break;
                }
                if event.is_sysex() {
                    self.core.play_sysex(&event.data);
                } else if let Some(msg) = event.packed_message() {
                    self.core.play_msg(msg);
                }
                *cursor += 1;
            }
        }
    }
}

impl Default for Mt32DecoderStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mt32DecoderStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mt32DecoderStream")
            .field("state", &self.state())
            .field("sample_rate", &self.sample_rate)
            .field("current_tick", &self.current_tick)
            .field("samples_per_tick", &self.samples_per_tick)
            .finish_non_exhaustive()
    }
}

impl AudioStream for Mt32DecoderStream {
    /// Render whole stereo frames; a trailing odd sample is left untouched
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        if !self.initialized || self.midi.is_none() || self.end_of_data {
            return 0;
        }
        if self.samples_per_tick <= 0.0 {
            return 0;
        }
        let frames = buffer.len() / 2;
        if frames == 0 {
            return 0;
        }
        self.started = true;

        let mut generated = 0usize;
        while generated < frames {
            self.process_due_events();

            let next_tick_sample = (self.current_tick as f64 + 1.0) * self.samples_per_tick;
            let until_tick = (next_tick_sample - self.sample_counter as f64) as i64;
            let n = (until_tick.max(1) as usize).min(frames - generated);

            self.core
                .render(&mut buffer[generated * 2..(generated + n) * 2]);
            generated += n;
            self.sample_counter += n as u64;

            while self.sample_counter as f64 >= (self.current_tick as f64 + 1.0) * self.samples_per_tick {
                self.current_tick += 1;
            }

            if self.tracks_exhausted() && !self.core.is_active() {
                log::debug!("MT-32: finished at tick {}", self.current_tick);
                self.end_of_data = true;
                break;
            }
        }
        generated * 2
    }

    fn is_stereo(&self) -> bool {
        true
    }

    fn rate(&self) -> u32 {
        self.sample_rate
    }

    fn end_of_data(&self) -> bool {
        self.end_of_data
    }

    /// Restart from tick zero, silencing every channel first
    fn rewind(&mut self) -> bool {
        self.current_tick = 0;
        self.sample_counter = 0;
        self.started = false;
        self.end_of_data = false;
        self.cursors.iter_mut().for_each(|c| *c = 0);
        if self.initialized {
            for ch in 0..MIDI_CHANNELS {
                self.core.play_msg(0xb0 | ch | CC_ALL_NOTES_OFF << 8);
                self.core.play_msg(0xb0 | ch | CC_RESET_ALL_CONTROLLERS << 8);
            }
        }
        true
    }

    /// Length of the event timeline, excluding release tails
    fn length_ms(&self) -> Option<u32> {
        let midi = self.midi.as_ref()?;
        if self.samples_per_tick <= 0.0 {
            return None;
        }
        let samples = midi.end_tick() as f64 * self.samples_per_tick;
        Some((samples * 1000.0 / self.sample_rate.max(1) as f64) as u32)
    }
}
