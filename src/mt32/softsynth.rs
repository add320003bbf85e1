//! Built-in MIDI synth core
//!
//! Not an emulation of the Roland hardware: it validates the ROM pair like
//! the real module would, then plays General MIDI style channel messages on
//! a bank of saw/pulse voices through a resonant low-pass filter, with a
//! short stereo feedback delay standing in for the module's reverb.

use super::rom::RomKind;
use super::SynthCore;
use crate::{Result, SoundError};
use std::f32::consts::PI;

/// Output rate of the module
pub const MT32_SAMPLE_RATE: u32 = 32_000;
/// Partials available to play notes
pub const MAX_VOICES: usize = 32;
const MIDI_CHANNELS: usize = 16;

const OUTPUT_SCALE: f32 = 8_000.0;
const REVERB_DELAY_FRAMES: usize = 1_600;
const REVERB_FEEDBACK: f32 = 0.35;
const REVERB_SEND: f32 = 0.25;
/// Levels below this count as silence
const SILENCE: f32 = 1.0e-4;
const PITCH_BEND_RANGE: f32 = 2.0;

#[derive(Clone, Copy)]
struct BiquadLP {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl BiquadLP {
    fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn set_lowpass(&mut self, cutoff: f32, q: f32) {
        let w0 = 2.0 * PI * (cutoff / MT32_SAMPLE_RATE as f32);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q.max(0.1));
        let a0 = 1.0 + alpha;
        self.b0 = (1.0 - cos_w0) * 0.5 / a0;
        self.b1 = (1.0 - cos_w0) / a0;
        self.b2 = (1.0 - cos_w0) * 0.5 / a0;
        self.a1 = -2.0 * cos_w0 / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    // transposed direct form II
    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Voicing derived from a program number
#[derive(Debug, Clone, Copy, PartialEq)]
struct Timbre {
    saw_mix: f32,
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    cutoff: f32,
}

impl Timbre {
    /// Eight families of sixteen programs, each with its own envelope
    fn for_program(program: u8) -> Self {
        let family = (program / 16) as usize;
        const TABLE: [(f32, f32, f32, f32, f32, f32); 8] = [
            // saw, attack s, decay s, sustain, release s, cutoff Hz
            (0.3, 0.002, 0.8, 0.2, 0.30, 4000.0), // pianos
            (0.5, 0.001, 0.3, 0.1, 0.20, 6000.0), // chromatic percussion
            (0.6, 0.010, 0.1, 0.9, 0.08, 3000.0), // organs
            (0.7, 0.002, 0.6, 0.3, 0.25, 5000.0), // guitars
            (0.8, 0.020, 0.2, 0.8, 0.20, 2500.0), // strings and basses
            (0.9, 0.060, 0.3, 0.8, 0.40, 3500.0), // ensembles
            (0.4, 0.030, 0.2, 0.9, 0.15, 3000.0), // brass and reeds
            (0.2, 0.040, 0.2, 0.8, 0.30, 2000.0), // pipes and synths
        ];
        let (saw_mix, attack, decay, sustain, release, cutoff) = TABLE[family.min(7)];
        Timbre {
            saw_mix,
            attack,
            decay,
            sustain,
            release,
            cutoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Off,
}

#[derive(Clone, Copy)]
struct Voice {
    channel: u8,
    note: u8,
    velocity: f32,
    phase: f32,
    base_hz: f32,
    timbre: Timbre,
    stage: EnvStage,
    level: f32,
    held_by_pedal: bool,
    age: u64,
    filter: BiquadLP,
}

impl Voice {
    fn idle() -> Self {
        Voice {
            channel: 0,
            note: 0,
            velocity: 0.0,
            phase: 0.0,
            base_hz: 0.0,
            timbre: Timbre::for_program(0),
            stage: EnvStage::Off,
            level: 0.0,
            held_by_pedal: false,
            age: 0,
            filter: BiquadLP::new(),
        }
    }

    fn is_free(&self) -> bool {
        self.stage == EnvStage::Off
    }

    fn release(&mut self) {
        if self.stage != EnvStage::Off {
            self.stage = EnvStage::Release;
        }
    }

    fn next_level(&mut self) -> f32 {
        let dt = 1.0 / MT32_SAMPLE_RATE as f32;
        let t = &self.timbre;
        match self.stage {
            EnvStage::Attack => {
                self.level += dt / t.attack.max(dt);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvStage::Decay;
                }
            }
            EnvStage::Decay => {
                self.level -= dt / t.decay.max(dt) * (1.0 - t.sustain);
                if self.level <= t.sustain {
                    self.level = t.sustain;
                    self.stage = EnvStage::Sustain;
                }
            }
            EnvStage::Sustain => {}
            EnvStage::Release => {
                self.level -= dt / t.release.max(dt);
                if self.level <= SILENCE {
                    self.level = 0.0;
                    self.stage = EnvStage::Off;
                }
            }
            EnvStage::Off => self.level = 0.0,
        }
        self.level
    }

    fn render(&mut self, bend_semitones: f32) -> f32 {
        let env = self.next_level();
        if self.stage == EnvStage::Off {
            return 0.0;
        }
        let hz = self.base_hz * 2f32.powf(bend_semitones / 12.0);
        self.phase += hz / MT32_SAMPLE_RATE as f32;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        let saw = 2.0 * self.phase - 1.0;
        let pulse = if self.phase < 0.5 { 1.0 } else { -1.0 };
        let osc = self.timbre.saw_mix * saw + (1.0 - self.timbre.saw_mix) * pulse;
        self.filter.process(osc) * env * self.velocity
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    program: u8,
    volume: u8,
    expression: u8,
    pan: u8,
    sustain: bool,
    bend: i16,
}

impl ChannelState {
    fn new() -> Self {
        ChannelState {
            program: 0,
            volume: 100,
            expression: 127,
            pan: 64,
            sustain: false,
            bend: 0,
        }
    }

    fn reset_controllers(&mut self) {
        let program = self.program;
        let volume = self.volume;
        let pan = self.pan;
        *self = ChannelState::new();
        // program, volume and pan survive a controller reset
        self.program = program;
        self.volume = volume;
        self.pan = pan;
    }

    fn gain(&self) -> f32 {
        (self.volume as f32 / 127.0) * (self.expression as f32 / 127.0)
    }

    fn pan_gains(&self) -> (f32, f32) {
        let p = self.pan as f32 / 127.0;
        ((1.0 - p).sqrt(), p.sqrt())
    }

    fn bend_semitones(&self) -> f32 {
        self.bend as f32 / 8192.0 * PITCH_BEND_RANGE
    }
}

/// Polyphonic fallback synth implementing [`SynthCore`]
pub struct SoftSynth {
    control_rom: bool,
    pcm_rom: bool,
    open: bool,
    voices: Vec<Voice>,
    channels: [ChannelState; MIDI_CHANNELS],
    output_gain: f32,
    reverb_gain: f32,
    reverb: Vec<[f32; 2]>,
    reverb_pos: usize,
    reverb_energy: f32,
    note_counter: u64,
    sysex_count: usize,
}

impl SoftSynth {
    /// Closed synth with no ROMs
    pub fn new() -> Self {
        SoftSynth {
            control_rom: false,
            pcm_rom: false,
            open: false,
            voices: vec![Voice::idle(); MAX_VOICES],
            channels: [ChannelState::new(); MIDI_CHANNELS],
            output_gain: 1.0,
            reverb_gain: 1.0,
            reverb: vec![[0.0; 2]; REVERB_DELAY_FRAMES],
            reverb_pos: 0,
            reverb_energy: 0.0,
            note_counter: 0,
            sysex_count: 0,
        }
    }

    /// Voices currently sounding
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_free()).count()
    }

    /// SysEx messages received since opening
    pub fn sysex_count(&self) -> usize {
        self.sysex_count
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }
        self.note_counter += 1;
        let state = self.channels[channel as usize];
        let timbre = Timbre::for_program(state.program);

        // reuse a free voice, else steal the oldest
        let idx = self
            .voices
            .iter()
            .position(Voice::is_free)
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.age)
                    .map(|(i, _)| i)
            })
            .unwrap_or(0);

        let mut filter = BiquadLP::new();
        filter.set_lowpass(timbre.cutoff, 0.9);
        self.voices[idx] = Voice {
            channel,
            note,
            velocity: velocity as f32 / 127.0,
            phase: 0.0,
            base_hz: 440.0 * 2f32.powf((note as f32 - 69.0) / 12.0),
            timbre,
            stage: EnvStage::Attack,
            level: 0.0,
            held_by_pedal: false,
            age: self.note_counter,
            filter,
        };
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        let pedal = self.channels[channel as usize].sustain;
        for v in self
            .voices
            .iter_mut()
            .filter(|v| !v.is_free() && v.channel == channel && v.note == note)
        {
            if pedal {
                v.held_by_pedal = true;
            } else {
                v.release();
            }
        }
    }

    fn all_notes_off(&mut self, channel: u8) {
        for v in self.voices.iter_mut().filter(|v| v.channel == channel) {
            v.release();
        }
    }

    fn all_sound_off(&mut self, channel: u8) {
        for v in self.voices.iter_mut().filter(|v| v.channel == channel) {
            *v = Voice::idle();
        }
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        let ch = channel as usize;
        match controller {
            7 => self.channels[ch].volume = value,
            10 => self.channels[ch].pan = value,
            11 => self.channels[ch].expression = value,
            64 => {
                let on = value >= 64;
                self.channels[ch].sustain = on;
                if !on {
                    for v in self
                        .voices
                        .iter_mut()
                        .filter(|v| v.channel == channel && v.held_by_pedal)
                    {
                        v.held_by_pedal = false;
                        v.release();
                    }
                }
            }
            120 => self.all_sound_off(channel),
            121 => self.channels[ch].reset_controllers(),
            123 => self.all_notes_off(channel),
            _ => log::trace!("softsynth: ignoring controller {controller} on channel {channel}"),
        }
    }

    fn reset(&mut self) {
        for v in self.voices.iter_mut() {
            *v = Voice::idle();
        }
        self.channels = [ChannelState::new(); MIDI_CHANNELS];
    }

    fn render_frame(&mut self) -> [f32; 2] {
        let mut dry = [0.0f32; 2];
        for v in self.voices.iter_mut() {
            if v.is_free() {
                continue;
            }
            let state = &self.channels[v.channel as usize];
            let s = v.render(state.bend_semitones()) * state.gain();
            let (l, r) = state.pan_gains();
            dry[0] += s * l;
            dry[1] += s * r;
        }

        let tap = self.reverb[self.reverb_pos];
        let mut out = [0.0f32; 2];
        for ch in 0..2 {
            self.reverb[self.reverb_pos][ch] = dry[ch] * REVERB_SEND + tap[1 - ch] * REVERB_FEEDBACK;
            out[ch] = dry[ch] * self.output_gain + tap[ch] * self.reverb_gain;
        }
        self.reverb_pos = (self.reverb_pos + 1) % self.reverb.len();
        // smoothed tail level, used to decide when the synth has gone quiet
        let wet = tap[0].abs().max(tap[1].abs());
        self.reverb_energy = self.reverb_energy * 0.999 + wet * 0.001;
        if wet > self.reverb_energy {
            self.reverb_energy = wet;
        }
        out
    }
}

impl Default for SoftSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthCore for SoftSynth {
    fn add_rom(&mut self, data: &[u8]) -> Result<RomKind> {
        let kind = RomKind::identify(data)?;
        match kind {
            RomKind::Control => self.control_rom = true,
            RomKind::Pcm => self.pcm_rom = true,
        }
        Ok(kind)
    }

    fn open(&mut self) -> Result<()> {
        if !self.control_rom {
            return Err(SoundError::Rom("control ROM not added".into()));
        }
        if !self.pcm_rom {
            return Err(SoundError::Rom("PCM ROM not added".into()));
        }
        self.reset();
        self.open = true;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        MT32_SAMPLE_RATE
    }

    fn play_msg(&mut self, msg: u32) {
        if !self.open {
            return;
        }
        let status = (msg & 0xff) as u8;
        let d1 = ((msg >> 8) & 0x7f) as u8;
        let d2 = ((msg >> 16) & 0x7f) as u8;
        let channel = status & 0x0f;
        match status & 0xf0 {
            0x80 => self.note_off(channel, d1),
            0x90 => self.note_on(channel, d1, d2),
            0xb0 => self.control_change(channel, d1, d2),
            0xc0 => self.channels[channel as usize].program = d1,
            0xe0 => self.channels[channel as usize].bend = ((d2 as i16) << 7 | d1 as i16) - 8192,
            _ => {}
        }
    }

    fn play_sysex(&mut self, data: &[u8]) {
        if !self.open {
            return;
        }
        self.sysex_count += 1;
        // Roland DT1: F0 41 dev 16 12 addr(3) ...; address 7F xx xx resets the module
        let body = data.strip_prefix(&[0xf0u8][..]).unwrap_or(data);
        if body.len() >= 7 && body[0] == 0x41 && body[2] == 0x16 && body[3] == 0x12 && body[4] == 0x7f {
            log::debug!("softsynth: reset by SysEx");
            self.reset();
        }
    }

    fn render(&mut self, out: &mut [i16]) {
        for frame in out.chunks_exact_mut(2) {
            let [l, r] = if self.open { self.render_frame() } else { [0.0; 2] };
            frame[0] = (l * OUTPUT_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            frame[1] = (r * OUTPUT_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
    }

    fn is_active(&self) -> bool {
        self.active_voices() > 0 || self.reverb_energy > SILENCE
    }

    fn set_output_gain(&mut self, gain: f32) {
        self.output_gain = gain.max(0.0);
    }

    fn set_reverb_output_gain(&mut self, gain: f32) {
        self.reverb_gain = gain.max(0.0);
    }
}
