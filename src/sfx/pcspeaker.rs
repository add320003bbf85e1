use super::{SfxId, SfxManager};
use crate::mixer::{Mixer, SoundHandle, SoundType};
use crate::pcspeaker::effects;
use crate::pcspeaker::{FreqStream, PcSpeaker, RandomStream, StutterStream, SweepFreqStream};
use crate::stream::{AudioStream, LoopingAudioStream};

/// Sound effects synthesised on an emulated PC speaker
pub struct PcSpeakerSfxManager {
    mixer: Mixer,
    last_duration_ms: u32,
}

impl PcSpeakerSfxManager {
    /// Manager playing on `mixer`
    pub fn new(mixer: Mixer) -> Self {
        PcSpeakerSfxManager {
            mixer,
            last_duration_ms: 0,
        }
    }

    /// Build the stream for `id`, `None` if the speaker has no sound for it
    pub fn stream_for(id: SfxId) -> Option<Box<dyn AudioStream>> {
        let spk = PcSpeaker::shared;
        let stream: Box<dyn AudioStream> = match id {
            SfxId::BLOCKED => Box::new(FreqStream::new(spk(), 311, 0xa)),
            SfxId::SUCCESS => Box::new(FreqStream::new(spk(), 2000, 0xa)),
            SfxId::FAILURE => Box::new(SweepFreqStream::new(spk(), 800, 2000, 50, 1)),
            SfxId::ATTACK_SWING => Box::new(SweepFreqStream::new(spk(), 400, 750, 150, 5)),
            SfxId::RUBBER_DUCK => Box::new(SweepFreqStream::new(spk(), 5000, 8000, 50, 1)),
            SfxId::HIT => Box::new(RandomStream::new(spk(), 0x2710, 0x320, 1)),
            SfxId::BROKEN_GLASS => effects::glass(),
            SfxId::CORPSER_DRAGGED_UNDER => {
                Box::new(SweepFreqStream::new(spk(), 1200, 2000, 40, 1))
            }
            SfxId::CORPSER_REGURGITATE => Box::new(RandomStream::new(spk(), 0x258, 0x1b58, 1)),
            SfxId::BELL => Box::new(StutterStream::new(spk(), -1, 0x4e20, 0x3e80, 1, 0x7d0)),
            SfxId::AVATAR_DEATH => effects::avatar_death(),
            SfxId::KAL_LOR => effects::kal_lor(),
            SfxId::SLUG_DISSOLVE => effects::slug_dissolve(),
            SfxId::HAIL_STONE => effects::hail_stones(),
            SfxId::EARTH_QUAKE => effects::earthquake(),
            SfxId::FOUNTAIN => effects::fountain(),
            SfxId::FIRE => effects::fire(),
            SfxId::CLOCK => effects::clock(),
            SfxId::PROTECTION_FIELD => effects::protection_field(),
            SfxId::WATER_WHEEL => effects::water_wheel(),
            other => {
                if let Some(circle) = other.magic_circle_p1() {
                    effects::magic_casting_p1(circle)
                } else if let Some(circle) = other.magic_circle_p2() {
                    effects::magic_casting_p2(circle)
                } else if let Some((instrument, note)) = other.instrument() {
                    effects::instrument_note(instrument, note)?
                } else {
                    return None;
                }
            }
        };
        Some(stream)
    }

    fn start(&mut self, id: SfxId, volume: u8, looping: bool) -> Option<SoundHandle> {
        let Some(stream) = Self::stream_for(id) else {
            log::debug!("pcspeaker: no sound for {id}");
            return None;
        };
        self.last_duration_ms = stream.length_ms().unwrap_or(0);
        log::debug!(
            "pcspeaker: {id} for {} ms{}",
            self.last_duration_ms,
            if looping { ", looping" } else { "" }
        );
        let stream: Box<dyn AudioStream> = if looping {
            Box::new(LoopingAudioStream::new(stream, 0))
        } else {
            stream
        };
        Some(self.mixer.play_stream(SoundType::Sfx, stream, volume))
    }
}

impl SfxManager for PcSpeakerSfxManager {
    fn play_sfx(&mut self, id: SfxId, volume: u8) -> bool {
        self.start(id, volume, false).is_some()
    }

    fn play_sfx_looping(&mut self, id: SfxId, volume: u8) -> Option<SoundHandle> {
        self.start(id, volume, true)
    }

    fn last_sfx_duration_ms(&self) -> u32 {
        self.last_duration_ms
    }
}

impl std::fmt::Debug for PcSpeakerSfxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcSpeakerSfxManager")
            .field("last_duration_ms", &self.last_duration_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcspeaker::effects::Instrument;
    use crate::pcspeaker::SPKR_OUTPUT_RATE;

    #[test]
    fn test_every_named_effect_has_a_stream() {
        let ids = [
            SfxId::BLOCKED,
            SfxId::HIT,
            SfxId::FOUNTAIN,
            SfxId::RUBBER_DUCK,
            SfxId::BROKEN_GLASS,
            SfxId::BELL,
            SfxId::FIRE,
            SfxId::CLOCK,
            SfxId::PROTECTION_FIELD,
            SfxId::WATER_WHEEL,
            SfxId::ATTACK_SWING,
            SfxId::SUCCESS,
            SfxId::FAILURE,
            SfxId::CORPSER_DRAGGED_UNDER,
            SfxId::CORPSER_REGURGITATE,
            SfxId::AVATAR_DEATH,
            SfxId::KAL_LOR,
            SfxId::SLUG_DISSOLVE,
            SfxId::HAIL_STONE,
            SfxId::EARTH_QUAKE,
        ];
        for id in ids {
            let s = PcSpeakerSfxManager::stream_for(id).unwrap_or_else(|| panic!("{id}"));
            assert_eq!(s.rate(), SPKR_OUTPUT_RATE, "{id}");
            assert!(!s.is_stereo());
        }
        for circle in 1..=8 {
            assert!(PcSpeakerSfxManager::stream_for(SfxId::magic_casting_p1(circle)).is_some());
            assert!(PcSpeakerSfxManager::stream_for(SfxId::magic_casting_p2(circle)).is_some());
        }
    }

    #[test]
    fn test_unmapped_ids() {
        assert!(PcSpeakerSfxManager::stream_for(SfxId::NONE).is_none());
        assert!(PcSpeakerSfxManager::stream_for(SfxId::EXPLOSION).is_none());
        assert!(PcSpeakerSfxManager::stream_for(SfxId(999)).is_none());
        let mut m = PcSpeakerSfxManager::new(Mixer::new(22_050));
        assert!(!m.play_sfx(SfxId::MISSILE, 255));
    }

    #[test]
    fn test_one_shot_records_duration() {
        let mixer = Mixer::new(22_050);
        let mut m = PcSpeakerSfxManager::new(mixer.clone());
        assert!(m.play_sfx(SfxId::AVATAR_DEATH, 200));
        assert_eq!(mixer.active_count(), 1);
        let expected = (8 * 0x4e20) as f64 * 1000.0 / SPKR_OUTPUT_RATE as f64;
        assert!((m.last_sfx_duration_ms() as f64 - expected).abs() <= 8.0);
    }

    #[test]
    fn test_looping_keeps_playing() {
        let mixer = Mixer::new(22_050);
        let mut m = PcSpeakerSfxManager::new(mixer.clone());
        let handle = m.play_sfx_looping(SfxId::BLOCKED, 0).unwrap();
        let mut buf = vec![0i16; 2 * 4096];
        for _ in 0..10 {
            mixer.mix(&mut buf);
        }
        assert!(mixer.is_sound_handle_active(handle));
        assert_eq!(mixer.channel_volume(handle), Some(0));
    }

    #[test]
    fn test_instrument_note() {
        let id = SfxId::instrument_note(Instrument::Panpipes, 4).unwrap();
        let s = PcSpeakerSfxManager::stream_for(id).unwrap();
        assert!(s.length_ms().unwrap() > 0);
    }
}
