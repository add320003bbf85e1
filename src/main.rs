use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use nuvie_sound::export::{render_to_wav_with_config, ExportConfig};
use nuvie_sound::{AudioStream, MidiFile, PcSpeakerSfxManager, SfxId};

const USAGE: &str = "Usage:
  nuvie-sound sfx <id> [out.wav] [--seconds <n>]
  nuvie-sound midi <file.mid>
  nuvie-sound play <file>

Commands:
  sfx      Render a PC speaker sound effect (WAV output, or stats if no file)
  midi     Print the track summary of a Standard MIDI File
  play     Decode and play an MP3/OGG/WAV file (needs the streaming feature)

Flags:
  --seconds <n>    Cap rendered length for looping effects (default 10)
  -h, --help       Show this help

Set RUST_LOG=debug for synthesis details.";

enum Command {
    Sfx {
        id: u16,
        output: Option<PathBuf>,
        seconds: f32,
    },
    Midi(PathBuf),
    Play(PathBuf),
    Help,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Command> {
    let mut positional = Vec::new();
    let mut seconds = 10.0f32;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--seconds" => {
                let value = args.next().context("--seconds requires an argument")?;
                seconds = value
                    .parse()
                    .with_context(|| format!("invalid --seconds value '{}'", value))?;
            }
            _ if arg.starts_with("--seconds=") => {
                let value = &arg["--seconds=".len()..];
                seconds = value
                    .parse()
                    .with_context(|| format!("invalid --seconds value '{}'", value))?;
            }
            _ if arg.starts_with('-') => bail!("unknown flag: {}", arg),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(command) = positional.next() else {
        return Ok(Command::Help);
    };
    match command.as_str() {
        "sfx" => {
            let id = positional.next().context("sfx requires an effect id")?;
            let id = id
                .parse()
                .with_context(|| format!("invalid effect id '{}'", id))?;
            Ok(Command::Sfx {
                id,
                output: positional.next().map(PathBuf::from),
                seconds,
            })
        }
        "midi" => Ok(Command::Midi(
            positional.next().context("midi requires a file")?.into(),
        )),
        "play" => Ok(Command::Play(
            positional.next().context("play requires a file")?.into(),
        )),
        other => bail!("unknown command: {}", other),
    }
}

fn render_sfx(id: u16, output: Option<PathBuf>, seconds: f32) -> anyhow::Result<()> {
    let id = SfxId(id);
    let Some(mut stream) = PcSpeakerSfxManager::stream_for(id) else {
        bail!("{} has no PC speaker sound", id);
    };
    let length = stream.length_ms();

    match output {
        Some(path) => {
            let config = ExportConfig::default().max_seconds(seconds);
            let written = render_to_wav_with_config(&mut stream, &path, config)?;
            println!(
                "{}: wrote {} samples ({:.2} s) to {}",
                id,
                written,
                written as f32 / stream.rate() as f32,
                path.display()
            );
        }
        None => {
            let limit = (seconds * stream.rate() as f32) as usize;
            let samples = nuvie_sound::stream::drain(&mut stream, 4096, limit);
            let peak = samples.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0);
            println!("Effect:      {}", id);
            println!("Rate:        {} Hz", stream.rate());
            match length {
                Some(ms) => println!("Length:      {} ms", ms),
                None => println!("Length:      endless"),
            }
            println!("Rendered:    {} samples", samples.len());
            println!("Peak:        {}", peak);
        }
    }
    Ok(())
}

fn dump_midi(path: PathBuf) -> anyhow::Result<()> {
    let midi = MidiFile::load(&path)
        .with_context(|| format!("failed to load '{}'", path.display()))?;
    println!("File:        {}", path.display());
    println!("Format:      {}", midi.format);
    println!(
        "Division:    {} ticks/quarter{}",
        midi.ticks_per_quarter,
        if midi.smpte { " (SMPTE fallback)" } else { "" }
    );
    println!(
        "Tempo:       {} us/quarter ({:.1} bpm)",
        midi.microseconds_per_quarter,
        60_000_000.0 / midi.microseconds_per_quarter.max(1) as f64
    );
    println!("Events:      {}", midi.event_count());
    println!("End tick:    {}", midi.end_tick());
    for (i, track) in midi.tracks.iter().enumerate() {
        let sysex = track.events.iter().filter(|e| e.is_sysex()).count();
        println!(
            "  track {:2}: {:5} events, {:3} sysex, ends at tick {}",
            i,
            track.events.len(),
            sysex,
            track.end_tick()
        );
    }
    Ok(())
}

#[cfg(feature = "streaming")]
fn play(path: PathBuf) -> anyhow::Result<()> {
    use nuvie_sound::mixer::MAX_VOLUME;
    use nuvie_sound::{AudioDevice, Mixer, Mp3AudioStream, SharedStream, SoundType};
    use std::io::Write;
    use std::time::Duration;

    let stream = Mp3AudioStream::open(&path)
        .with_context(|| format!("failed to decode '{}'", path.display()))?;
    let shared = SharedStream::new(stream);
    let mixer = Mixer::new(44_100);
    let handle = mixer.play_stream(SoundType::Music, Box::new(shared.clone()), MAX_VOLUME);
    let device = AudioDevice::new(mixer.clone())?;

    println!("Playing {} - Ctrl+C to quit", path.display());
    while mixer.is_sound_handle_active(handle) {
        std::thread::sleep(Duration::from_millis(100));
        let s = shared.lock();
        let secs = s.position() as f32 / (s.rate() as f32 * s.channels() as f32);
        print!("\r  {:6.1} s", secs);
        let _ = std::io::stdout().flush();
    }
    println!("\nPlayback complete!");
    device.finish();
    Ok(())
}

#[cfg(not(feature = "streaming"))]
fn play(_path: PathBuf) -> anyhow::Result<()> {
    bail!("playback requires the \"streaming\" feature; rebuild with `--features streaming`")
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    match parse_args(env::args().skip(1))? {
        Command::Help => {
            eprintln!("{}", USAGE);
            Ok(())
        }
        Command::Sfx {
            id,
            output,
            seconds,
        } => render_sfx(id, output, seconds),
        Command::Midi(path) => dump_midi(path),
        Command::Play(path) => play(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_sfx() {
        match parse_args(args(&["sfx", "35", "death.wav", "--seconds", "2"])).unwrap() {
            Command::Sfx {
                id,
                output,
                seconds,
            } => {
                assert_eq!(id, 35);
                assert_eq!(output, Some(PathBuf::from("death.wav")));
                assert_eq!(seconds, 2.0);
            }
            _ => panic!("expected sfx"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_args(args(&[])).unwrap(), Command::Help));
        assert!(matches!(parse_args(args(&["-h", "sfx"])).unwrap(), Command::Help));
        assert!(parse_args(args(&["sfx"])).is_err());
        assert!(parse_args(args(&["sfx", "x"])).is_err());
        assert!(parse_args(args(&["dance"])).is_err());
        assert!(parse_args(args(&["--loud", "midi", "a.mid"])).is_err());
    }
}
