//! Integration tests rendering PC speaker effects through the mixer and to
//! WAV files

use nuvie_sound::export::{render_to_wav_with_config, ExportConfig};
use nuvie_sound::mixer::MAX_VOLUME;
use nuvie_sound::{
    render_to_wav, AudioStream, LoopingAudioStream, Mixer, PcSpeakerSfxManager, SfxId, SfxManager,
    SoundType, SPKR_OUTPUT_RATE,
};

fn samples_to_ms(samples: usize) -> f64 {
    samples as f64 * 1000.0 / SPKR_OUTPUT_RATE as f64
}

#[test]
fn test_one_shot_effects_match_their_reported_length() {
    let dir = tempfile::tempdir().unwrap();
    for id in [
        SfxId::AVATAR_DEATH,
        SfxId::KAL_LOR,
        SfxId::SLUG_DISSOLVE,
        SfxId::BROKEN_GLASS,
        SfxId::magic_casting_p1(5),
        SfxId::magic_casting_p2(8),
    ] {
        let mut stream = PcSpeakerSfxManager::stream_for(id).unwrap();
        let reported = stream.length_ms().expect("one-shot effects know their length");
        let path = dir.path().join(format!("{}.wav", id.0));
        let written = render_to_wav(&mut stream, &path).unwrap();

        assert!(stream.end_of_data(), "{id} should finish");
        // parts report whole milliseconds, rounded down
        let rendered = samples_to_ms(written);
        assert!(
            rendered >= reported as f64 && rendered - (reported as f64) < 60.0,
            "{id}: rendered {rendered:.1} ms, reported {reported} ms"
        );

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, SPKR_OUTPUT_RATE);
        assert_eq!(reader.len() as usize, written);
    }
}

#[test]
fn test_ambient_loop_export_is_capped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clock.wav");
    let mut clock = LoopingAudioStream::new(
        PcSpeakerSfxManager::stream_for(SfxId::CLOCK).unwrap(),
        0,
    );
    let config = ExportConfig::default().max_seconds(2.0).normalize(true);
    let written = render_to_wav_with_config(&mut clock, &path, config).unwrap();
    assert_eq!(written, 2 * SPKR_OUTPUT_RATE as usize);

    let peak = hound::WavReader::open(&path)
        .unwrap()
        .samples::<i16>()
        .map(|s| (s.unwrap() as i32).abs())
        .max()
        .unwrap();
    assert_eq!(peak, i16::MAX as i32);
}

#[test]
fn test_mono_effect_is_centred_in_the_mix() {
    let mixer = Mixer::new(SPKR_OUTPUT_RATE);
    let mut sfx = PcSpeakerSfxManager::new(mixer.clone());
    assert!(sfx.play_sfx(SfxId::BLOCKED, MAX_VOLUME));

    let mut out = vec![0i16; 2 * 1024];
    mixer.mix(&mut out);
    assert!(out.iter().any(|&s| s != 0));
    for frame in out.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_type_volume_scales_effects() {
    let mixer = Mixer::new(SPKR_OUTPUT_RATE);
    mixer.set_volume_for_type(SoundType::Sfx, 0);
    let mut sfx = PcSpeakerSfxManager::new(mixer.clone());
    assert!(sfx.play_sfx(SfxId::HIT, MAX_VOLUME));

    let mut out = vec![0i16; 2 * 1024];
    mixer.mix(&mut out);
    assert!(out.iter().all(|&s| s == 0));
}
