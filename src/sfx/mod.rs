//! Sound effect ids and players
//!
//! Game code names effects by [`SfxId`]; an [`SfxManager`] turns the id into
//! audio for whichever sound hardware style is configured.

mod pcspeaker;

pub use pcspeaker::PcSpeakerSfxManager;

use crate::mixer::SoundHandle;
use crate::pcspeaker::effects::{Instrument, MAX_MAGIC_CIRCLE};
use num_traits::FromPrimitive;
use std::collections::HashMap;

/// Identifies one sound effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SfxId(pub u16);

impl SfxId {
    /// No effect
    pub const NONE: SfxId = SfxId(0);
    /// Bumping into something
    pub const BLOCKED: SfxId = SfxId(1);
    /// A blow landing
    pub const HIT: SfxId = SfxId(2);
    /// Fountain burble (ambient)
    pub const FOUNTAIN: SfxId = SfxId(3);
    /// Party member death
    pub const DEATH: SfxId = SfxId(4);
    /// Squeezing the rubber duck
    pub const RUBBER_DUCK: SfxId = SfxId(5);
    /// Glass breaking
    pub const BROKEN_GLASS: SfxId = SfxId(6);
    /// Bell ringing
    pub const BELL: SfxId = SfxId(7);
    /// Fireplace crackle (ambient)
    pub const FIRE: SfxId = SfxId(8);
    /// Clock ticking (ambient)
    pub const CLOCK: SfxId = SfxId(9);
    /// Protection field buzz (ambient)
    pub const PROTECTION_FIELD: SfxId = SfxId(10);
    /// Water wheel (ambient)
    pub const WATER_WHEEL: SfxId = SfxId(11);
    /// Missile in flight
    pub const MISSILE: SfxId = SfxId(12);
    /// Explosion
    pub const EXPLOSION: SfxId = SfxId(13);
    /// Weapon swing
    pub const ATTACK_SWING: SfxId = SfxId(14);
    /// Action succeeded
    pub const SUCCESS: SfxId = SfxId(15);
    /// Action failed
    pub const FAILURE: SfxId = SfxId(16);
    /// Corpser pulling someone under
    pub const CORPSER_DRAGGED_UNDER: SfxId = SfxId(17);
    /// Corpser letting go
    pub const CORPSER_REGURGITATE: SfxId = SfxId(18);
    /// First casting phase, circle 1; circles 2-8 follow
    pub const CASTING_MAGIC_P1: SfxId = SfxId(19);
    /// First casting phase, circle 8
    pub const CASTING_MAGIC_P1_8: SfxId = SfxId(26);
    /// Second casting phase, circle 1; circles 2-8 follow
    pub const CASTING_MAGIC_P2: SfxId = SfxId(27);
    /// Second casting phase, circle 8
    pub const CASTING_MAGIC_P2_8: SfxId = SfxId(34);
    /// Avatar death lament
    pub const AVATAR_DEATH: SfxId = SfxId(35);
    /// Kal Lor spell
    pub const KAL_LOR: SfxId = SfxId(36);
    /// Slug dissolving
    pub const SLUG_DISSOLVE: SfxId = SfxId(37);
    /// Hailstorm
    pub const HAIL_STONE: SfxId = SfxId(38);
    /// Earthquake
    pub const EARTH_QUAKE: SfxId = SfxId(39);
    /// First instrument note id; see [`SfxId::instrument`]
    pub const INSTRUMENT_BASE: SfxId = SfxId(100);

    const NOTES_PER_INSTRUMENT: u16 = 10;
    const INSTRUMENT_COUNT: u16 = 5;

    /// First casting phase sound for `circle` (1-8, clamped)
    pub fn magic_casting_p1(circle: u8) -> SfxId {
        SfxId(Self::CASTING_MAGIC_P1.0 + circle.clamp(1, MAX_MAGIC_CIRCLE) as u16 - 1)
    }

    /// Second casting phase sound for `circle` (1-8, clamped)
    pub fn magic_casting_p2(circle: u8) -> SfxId {
        SfxId(Self::CASTING_MAGIC_P2.0 + circle.clamp(1, MAX_MAGIC_CIRCLE) as u16 - 1)
    }

    /// Magic circle of a first-phase casting id
    pub fn magic_circle_p1(self) -> Option<u8> {
        (Self::CASTING_MAGIC_P1..=Self::CASTING_MAGIC_P1_8)
            .contains(&self)
            .then(|| (self.0 - Self::CASTING_MAGIC_P1.0 + 1) as u8)
    }

    /// Magic circle of a second-phase casting id
    pub fn magic_circle_p2(self) -> Option<u8> {
        (Self::CASTING_MAGIC_P2..=Self::CASTING_MAGIC_P2_8)
            .contains(&self)
            .then(|| (self.0 - Self::CASTING_MAGIC_P2.0 + 1) as u8)
    }

    /// Id of `note` (0-9) played on `instrument`; `None` for bad notes
    pub fn instrument_note(instrument: Instrument, note: u8) -> Option<SfxId> {
        (u16::from(note) < Self::NOTES_PER_INSTRUMENT).then(|| {
            SfxId(
                Self::INSTRUMENT_BASE.0
                    + instrument as u16 * Self::NOTES_PER_INSTRUMENT
                    + u16::from(note),
            )
        })
    }

    /// Instrument and note encoded in an instrument id
    pub fn instrument(self) -> Option<(Instrument, u8)> {
        let offset = self.0.checked_sub(Self::INSTRUMENT_BASE.0)?;
        if offset >= Self::INSTRUMENT_COUNT * Self::NOTES_PER_INSTRUMENT {
            return None;
        }
        let instrument = Instrument::from_u16(offset / Self::NOTES_PER_INSTRUMENT)?;
        Some((instrument, (offset % Self::NOTES_PER_INSTRUMENT) as u8))
    }

    /// Whether this is [`SfxId::NONE`]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl std::fmt::Display for SfxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sfx#{}", self.0)
    }
}

/// Plays sound effects on a mixer
pub trait SfxManager: Send {
    /// Play `id` once at `volume`; `false` if the id has no sound
    fn play_sfx(&mut self, id: SfxId, volume: u8) -> bool;

    /// Play `id` until stopped through the returned handle
    fn play_sfx_looping(&mut self, id: SfxId, volume: u8) -> Option<SoundHandle>;

    /// Length of the last effect started, in milliseconds (one pass for
    /// looping effects)
    fn last_sfx_duration_ms(&self) -> u32;
}

/// Object number of the fountain
pub const OBJ_FOUNTAIN: u16 = 229;
/// Object number of the fireplace
pub const OBJ_FIREPLACE: u16 = 164;
/// Object number of the clock
pub const OBJ_CLOCK: u16 = 159;
/// Object number of the protection field
pub const OBJ_PROTECTION_FIELD: u16 = 173;
/// Object number of the water wheel
pub const OBJ_WATER_WHEEL: u16 = 209;

/// Which ambient effect a map object emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSfxTable {
    map: HashMap<u16, SfxId>,
}

impl ObjectSfxTable {
    /// Table with no entries
    pub fn empty() -> Self {
        ObjectSfxTable {
            map: HashMap::new(),
        }
    }

    /// Ultima VI ambient objects
    pub fn ultima6() -> Self {
        let mut table = Self::empty();
        table.insert(OBJ_FOUNTAIN, SfxId::FOUNTAIN);
        table.insert(OBJ_FIREPLACE, SfxId::FIRE);
        table.insert(OBJ_CLOCK, SfxId::CLOCK);
        table.insert(OBJ_PROTECTION_FIELD, SfxId::PROTECTION_FIELD);
        table.insert(OBJ_WATER_WHEEL, SfxId::WATER_WHEEL);
        table
    }

    /// Map `obj_n` to `sfx`
    pub fn insert(&mut self, obj_n: u16, sfx: SfxId) {
        self.map.insert(obj_n, sfx);
    }

    /// Effect for `obj_n`, if it has one
    pub fn lookup(&self, obj_n: u16) -> Option<SfxId> {
        self.map.get(&obj_n).copied().filter(|id| !id.is_none())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for ObjectSfxTable {
    fn default() -> Self {
        Self::ultima6()
    }
}
