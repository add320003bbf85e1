//! Sound orchestration
//!
//! [`SoundManager`] owns the loaded songs, grouped by mood, and the sound
//! effect player. Game code tells it which mood should play
//! ([`music_play_from`](SoundManager::music_play_from)) and what is visible
//! on the map ([`update_map_sfx`](SoundManager::update_map_sfx)), and calls
//! [`update`](SoundManager::update) once per frame.
//!
//! The music-finished flag is shared with the mixer: the mixer raises it
//! (release) when a song channel plays out, and `update` consumes it with an
//! acquire-release swap.

use crate::config::{Configuration, GameType};
use crate::mixer::{Mixer, SoundHandle, MAX_VOLUME};
use crate::music::{
    MusicOutput, MusicStyle, NativeMusicBackend, Song, SongMp3, SongNative, SoundCollection,
};
use crate::pcspeaker::effects::Instrument;
use crate::sfx::{ObjectSfxTable, PcSpeakerSfxManager, SfxId, SfxManager};
use bitflags::bitflags;
use num_traits::FromPrimitive;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hearing radius of ambient object sounds, in tiles
pub const MAP_SFX_RADIUS: f32 = 8.0;

const GROUP_RANDOM: &str = "random";

// (file, title, group)
const NATIVE_SONGS: [(&str, &str, &str); 8] = [
    ("brit.m", "Rule Britannia", GROUP_RANDOM),
    ("forest.m", "Wanderer (Forest)", GROUP_RANDOM),
    ("stones.m", "Stones", GROUP_RANDOM),
    ("ultima.m", "Ultima VI Theme", GROUP_RANDOM),
    ("engage.m", "Engagement and Melee", "combat"),
    ("hornpipe.m", "Captain Johne's Hornpipe", "boat"),
    ("gargoyle.m", "Audchar Gargl Zenmur", "gargoyle"),
    ("dungeon.m", "Dungeon", "dungeon"),
];

#[cfg(feature = "mt32")]
const MT32_SONGS: [(&str, &str, &str); 10] = [
    ("U6-BRIT.MID", "Rule Britannia", GROUP_RANDOM),
    ("U6-FORES.MID", "Wanderer (Forest)", GROUP_RANDOM),
    ("U6-STONE.MID", "Stones", GROUP_RANDOM),
    ("U6-THEME.MID", "Ultima VI Theme", GROUP_RANDOM),
    ("U6-MELEE.MID", "Engagement and Melee", "combat"),
    ("U6-HORNP.MID", "Captain Johne's Hornpipe", "boat"),
    ("U6-GARG.MID", "Audchar Gargl Zenmur", "gargoyle"),
    ("U6-DUNG.MID", "Dungeon", "dungeon"),
    ("U6-INTRO.MID", "Intro", "intro"),
    ("U6-END.MID", "End Credits", "endgame"),
];

// (group, title, candidate file names in order of preference)
const MP3_SONGS: [(&str, &str, &[&str]); 10] = [
    (
        GROUP_RANDOM,
        "Rule Britannia",
        &["brit.mp3", "rulebritannia.mp3", "rule_britannia.mp3", "u6_brit.mp3", "brit.ogg"],
    ),
    (
        GROUP_RANDOM,
        "Wanderer (Forest)",
        &["forest.mp3", "wanderer.mp3", "u6_forest.mp3", "forest.ogg"],
    ),
    (GROUP_RANDOM, "Stones", &["stones.mp3", "u6_stones.mp3", "stones.ogg"]),
    (
        GROUP_RANDOM,
        "Ultima VI Theme",
        &["ultima.mp3", "ultimatheme.mp3", "u6_theme.mp3", "ultima.ogg", "theme.mp3"],
    ),
    (
        "combat",
        "Engagement and Melee",
        &["engage.mp3", "engagement-melee.mp3", "u6_melee.mp3", "engage.ogg", "combat.mp3"],
    ),
    (
        "boat",
        "Captain Johne's Hornpipe",
        &["hornpipe.mp3", "capnjohnhornpipe.mp3", "u6_hornpipe.mp3", "hornpipe.ogg"],
    ),
    (
        "gargoyle",
        "Audchar Gargl Zenmur",
        &["gargoyle.mp3", "gargoyles.mp3", "u6_gargoyle.mp3", "gargoyle.ogg"],
    ),
    ("dungeon", "Dungeon", &["dungeon.mp3", "u6_dungeon.mp3", "dungeon.ogg"]),
    (
        "intro",
        "Intro",
        &["intro.mp3", "introduction.mp3", "u6_intro.mp3", "intro.ogg"],
    ),
    (
        "endgame",
        "End Credits",
        &["end.mp3", "unification.mp3", "u6_end.mp3", "end.ogg", "credits.mp3"],
    ),
];

// `.m` base name to pre-rendered candidates, used by `music_play_file`
const MP3_FOR_NATIVE: [(&str, &[&str]); 12] = [
    ("bootup", &["opening.mp3", "bootup.mp3"]),
    ("intro", &["introduction.mp3", "intro.mp3"]),
    ("create", &["createcharacter.mp3", "create.mp3"]),
    ("ultima", &["ultimatheme.mp3", "ultima.mp3"]),
    ("brit", &["rulebritannia.mp3", "brit.mp3"]),
    ("forest", &["wanderer.mp3", "forest.mp3"]),
    ("stones", &["stones.mp3"]),
    ("engage", &["engagement-melee.mp3", "engage.mp3"]),
    ("hornpipe", &["capnjohnhornpipe.mp3", "hornpipe.mp3"]),
    ("gargoyle", &["gargoyles.mp3", "gargoyle.mp3"]),
    ("dungeon", &["dungeon.mp3"]),
    ("end", &["unification.mp3", "end.mp3"]),
];

bitflags! {
    /// Switchable parts of the audio system
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AudioFlags: u8 {
        /// Master switch
        const AUDIO = 1 << 0;
        /// Background music
        const MUSIC = 1 << 1;
        /// Sound effects
        const SFX = 1 << 2;
        /// Character speech
        const SPEECH = 1 << 3;
        /// User-supplied sound effects
        const CUSTOM_SFX = 1 << 4;
    }
}

/// A map object the player can currently see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleObject {
    /// Object type number
    pub obj_n: u16,
    /// Map x
    pub x: u16,
    /// Map y
    pub y: u16,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSfx {
    id: SfxId,
    handle: SoundHandle,
}

#[derive(Debug)]
struct TimedEffect {
    id: SfxId,
    deadline: Instant,
}

enum CurrentSong {
    /// Index into the loaded song list
    Library(usize),
    /// Song started by file name, owned until replaced
    Adhoc(Box<dyn Song>),
}

/// Music and sound effect orchestration
pub struct SoundManager {
    mixer: Mixer,
    music_out: MusicOutput,
    music_finished: Arc<AtomicBool>,
    config: Configuration,
    game_type: GameType,
    flags: AudioFlags,
    music_volume: u8,
    sfx_volume: u8,
    stop_music_on_group_change: bool,
    music_style: MusicStyle,
    mt32_rom_path: PathBuf,

    songs: Vec<Box<dyn Song>>,
    groups: HashMap<String, SoundCollection<usize>>,
    current_group: String,
    current_song: Option<CurrentSong>,
    native_backend: Option<Arc<dyn NativeMusicBackend>>,

    sfx_manager: Option<Box<dyn SfxManager>>,
    object_sfx: ObjectSfxTable,
    active_sfx: Vec<ActiveSfx>,
    timed_effects: Vec<TimedEffect>,
    completed_sfx: Vec<SfxId>,
}

impl SoundManager {
    /// Manager playing on `mixer`; call [`nuvie_startup`](Self::nuvie_startup)
    /// before use
    pub fn new(mixer: Mixer) -> Self {
        let music_finished = Arc::new(AtomicBool::new(true));
        SoundManager {
            music_out: MusicOutput::new(mixer.clone(), music_finished.clone()),
            mixer,
            music_finished,
            config: Configuration::new(),
            game_type: GameType::Ultima6,
            flags: AudioFlags::empty(),
            music_volume: MAX_VOLUME,
            sfx_volume: MAX_VOLUME,
            stop_music_on_group_change: true,
            music_style: MusicStyle::Native,
            mt32_rom_path: PathBuf::new(),
            songs: Vec::new(),
            groups: HashMap::new(),
            current_group: String::new(),
            current_song: None,
            native_backend: None,
            sfx_manager: None,
            object_sfx: ObjectSfxTable::ultima6(),
            active_sfx: Vec::new(),
            timed_effects: Vec::new(),
            completed_sfx: Vec::new(),
        }
    }

    /// Player used for the game's own `.m` music
    pub fn set_native_backend(&mut self, backend: Arc<dyn NativeMusicBackend>) {
        self.native_backend = Some(backend);
    }

    /// Replace the object to ambient effect table
    pub fn set_object_sfx_table(&mut self, table: ObjectSfxTable) {
        self.object_sfx = table;
    }

    /// Read settings from `config`, load music and the sfx player
    pub fn nuvie_startup(&mut self, config: &Configuration) -> bool {
        self.config = config.clone();
        self.game_type = config.game_type();

        self.flags.set(
            AudioFlags::AUDIO,
            config.value_bool("config/audio/enabled", true),
        );
        self.flags.set(
            AudioFlags::MUSIC,
            config.value_bool("config/audio/enable_music", true),
        );
        self.flags.set(
            AudioFlags::SFX,
            config.value_bool("config/audio/enable_sfx", true),
        );
        self.stop_music_on_group_change =
            config.value_bool("config/audio/stop_music_on_group_change", true);
        self.music_volume =
            clamp_volume(config.value_int("config/audio/music_volume", MAX_VOLUME as i64));
        self.sfx_volume =
            clamp_volume(config.value_int("config/audio/sfx_volume", MAX_VOLUME as i64));

        let music_style = config.value_string(&config.game_key("music"), "native");
        let sfx_style = config.value_string(&config.game_key("sfx"), "native");
        let sound_dir = config.value_string(&config.game_key("sounddir"), "");
        self.mt32_rom_path =
            PathBuf::from(config.value_string(&config.game_key("mt32_rom_path"), &sound_dir));

        let speech = self.game_type == GameType::Ultima6
            && config.value_bool(&config.game_key("enable_speech"), true);
        self.flags.set(AudioFlags::SPEECH, speech);

        log::info!("SoundManager: music_style from config = '{music_style}'");
        self.load_music(&music_style, Path::new(&sound_dir));
        self.music_play_from(GROUP_RANDOM);

        self.load_sfx_manager(&sfx_style);
        true
    }

    fn load_music(&mut self, style: &str, sound_dir: &Path) {
        let u6 = self.game_type == GameType::Ultima6;
        match style.parse::<MusicStyle>() {
            Ok(MusicStyle::Native) => {
                log::info!("SoundManager: using native music");
                self.music_style = MusicStyle::Native;
                if u6 {
                    self.load_native_songs();
                }
            }
            Ok(MusicStyle::Mt32) => {
                self.music_style = MusicStyle::Mt32;
                if u6 && !self.load_mt32_songs() {
                    log::warn!("MT-32 initialization failed, falling back to native");
                    self.music_style = MusicStyle::Native;
                    self.load_native_songs();
                }
            }
            Ok(MusicStyle::Mp3) => {
                log::info!("SoundManager: using MP3 music");
                self.music_style = MusicStyle::Mp3;
                if u6 && !self.load_mp3_songs() {
                    log::warn!("MP3 music loading failed, falling back to native");
                    self.music_style = MusicStyle::Native;
                    self.load_native_songs();
                }
            }
            Ok(MusicStyle::Custom) => {
                self.music_style = MusicStyle::Custom;
                self.load_custom_songs(sound_dir);
            }
            Err(_) => log::warn!("Unknown music style '{style}'"),
        }
    }

    fn add_loaded_song(&mut self, mut song: Box<dyn Song>, path: &Path, title: &str) -> Option<usize> {
        match song.init(path, 0) {
            Ok(()) => {
                song.set_name(title);
                self.songs.push(song);
                Some(self.songs.len() - 1)
            }
            Err(e) => {
                log::error!("could not load {}: {}", path.display(), e);
                None
            }
        }
    }

    fn group_add_song(&mut self, group: &str, index: usize) {
        self.groups.entry(group.to_string()).or_default().push(index);
    }

    /// Load the eight native Ultima VI songs from the game directory
    ///
    /// Returns whether any song loaded.
    pub fn load_native_songs(&mut self) -> bool {
        let mut loaded = 0;
        for (file, title, group) in NATIVE_SONGS {
            let path = self.config.game_path(file);
            let song = SongNative::new(self.music_out.clone(), self.native_backend.clone());
            if let Some(index) = self.add_loaded_song(Box::new(song), &path, title) {
                self.group_add_song(group, index);
                loaded += 1;
            }
        }
        log::info!("native: loaded {loaded} songs");
        loaded > 0
    }

    /// Load the MIDI songs for the MT-32 synth
    ///
    /// Fails only when no ROM pair is found; individual songs that cannot
    /// load are skipped.
    #[cfg(feature = "mt32")]
    pub fn load_mt32_songs(&mut self) -> bool {
        use crate::mt32::{check_roms_exist, SongMt32};

        if !check_roms_exist(&self.mt32_rom_path) {
            log::error!("MT-32 ROMs not found in: {}", self.mt32_rom_path.display());
            log::error!("Please place MT32_CONTROL.ROM and MT32_PCM.ROM in the ROM directory.");
            return false;
        }
        for (file, title, group) in MT32_SONGS {
            let path = self.config.game_path(file);
            let song = SongMt32::new(self.music_out.clone(), self.mt32_rom_path.clone());
            match self.add_loaded_song(Box::new(song), &path, title) {
                Some(index) => self.group_add_song(group, index),
                None => log::warn!("MT-32: cannot load {}", path.display()),
            }
        }
        log::info!("MT-32: loaded Ultima VI songs");
        true
    }

    /// MT-32 support is compiled out
    #[cfg(not(feature = "mt32"))]
    pub fn load_mt32_songs(&mut self) -> bool {
        log::warn!("MT-32 support not built in");
        false
    }

    fn music_dir(&self) -> PathBuf {
        let dir = self.config.value_string(&self.config.game_key("music_dir"), "");
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
        let game_dir = self.config.value_string(&self.config.game_key("gamedir"), "");
        Path::new(&game_dir).join("music")
    }

    /// Load pre-rendered songs, first matching file name per title
    ///
    /// Returns `false` when no song at all was found.
    pub fn load_mp3_songs(&mut self) -> bool {
        let music_dir = self.music_dir();
        log::info!("MP3: looking for music in {}", music_dir.display());

        let mut loaded = 0;
        for (group, title, candidates) in MP3_SONGS {
            let found = candidates.iter().find_map(|name| {
                let path = music_dir.join(name);
                if !path.is_file() {
                    return None;
                }
                let song = SongMp3::new(self.music_out.clone());
                self.add_loaded_song(Box::new(song), &path, title)
            });
            match found {
                Some(index) => {
                    self.group_add_song(group, index);
                    loaded += 1;
                }
                None => log::debug!("MP3: could not find {title}"),
            }
        }

        if loaded == 0 {
            log::warn!("MP3: no music files found in {}", music_dir.display());
            return false;
        }
        log::info!("MP3: loaded {loaded} songs");
        true
    }

    /// Load `group;file` pairs from `music.cfg` in `sound_dir`
    ///
    /// Files are decoded with the MP3 backend; a file named by several
    /// groups is loaded once.
    pub fn load_custom_songs(&mut self, sound_dir: &Path) -> bool {
        let script = sound_dir.join("music.cfg");
        let text = match std::fs::read_to_string(&script) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("custom music: cannot read {}: {}", script.display(), e);
                return false;
            }
        };

        let mut tokens = text
            .split([';', '\r', '\n'])
            .filter(|t| !t.is_empty());
        while let (Some(group), Some(file)) = (tokens.next(), tokens.next()) {
            let path = sound_dir.join(file);
            let filename = path.display().to_string();
            let existing = self.songs.iter().position(|s| s.filename() == filename);
            let index = match existing {
                Some(index) => index,
                None => {
                    let song = SongMp3::new(self.music_out.clone());
                    match self.add_loaded_song(Box::new(song), &path, file) {
                        Some(index) => index,
                        None => continue,
                    }
                }
            };
            self.group_add_song(group, index);
            log::debug!("{group} : {file}");
        }
        true
    }

    /// Create the sound effect player for `style`
    ///
    /// Only the PC speaker is built in; other styles fall back to it.
    /// Returns `false` if a player already exists.
    pub fn load_sfx_manager(&mut self, style: &str) -> bool {
        if self.sfx_manager.is_some() {
            return false;
        }
        let style = match (style, self.game_type) {
            ("native", GameType::Ultima6) => "pcspeaker",
            ("native", _) => "adlib",
            (other, _) => other,
        };
        if style != "pcspeaker" {
            log::warn!("sfx style '{style}' is not available, using the PC speaker");
        }
        self.sfx_manager = Some(Box::new(PcSpeakerSfxManager::new(self.mixer.clone())));
        true
    }

    /// Install a custom sound effect player
    pub fn set_sfx_manager(&mut self, manager: Box<dyn SfxManager>) {
        self.sfx_manager = Some(manager);
    }

    fn request_song(&self, group: &str) -> Option<usize> {
        self.groups.get(group)?.select().copied()
    }

    fn current_song_mut(&mut self) -> Option<&mut (dyn Song + 'static)> {
        match self.current_song.as_mut()? {
            CurrentSong::Library(index) => self.songs.get_mut(*index).map(|s| s.as_mut()),
            CurrentSong::Adhoc(song) => Some(song.as_mut()),
        }
    }

    /// Switch the mood group music is chosen from
    ///
    /// Asking for the group already playing does nothing. With
    /// `stop_music_on_group_change` the current song is replaced on the
    /// next [`update`](Self::update); otherwise the new group takes over
    /// when the current song ends.
    pub fn music_play_from(&mut self, group: &str) {
        if self.current_group != group {
            if self.stop_music_on_group_change {
                self.music_finished.store(true, Ordering::Release);
            }
            log::debug!("music group '{}' -> '{}'", self.current_group, group);
            self.current_group = group.to_string();
        }
    }

    /// Stop the current song, keeping it selected
    pub fn music_pause(&mut self) {
        if let Some(song) = self.current_song_mut() {
            song.stop();
        }
    }

    /// Resume music, picking a song from the current group if none is
    /// selected
    pub fn music_play(&mut self) {
        if self.current_song.is_none() {
            self.current_song = self
                .request_song(&self.current_group)
                .map(CurrentSong::Library);
        }
        let volume = self.music_volume;
        if let Some(song) = self.current_song_mut() {
            song.play(true);
            song.set_volume(volume);
        }
    }

    /// Play one music file by name, outside the mood groups
    ///
    /// With pre-rendered music a matching MP3 is tried first; otherwise,
    /// or when none exists, the native file is played.
    pub fn music_play_file(&mut self, filename: &str, song_num: u16) {
        if !self.flags.contains(AudioFlags::AUDIO | AudioFlags::MUSIC) {
            return;
        }

        if self.music_style == MusicStyle::Mp3 {
            if let Some(song) = self.find_mp3_for(filename) {
                log::info!("Playing MP3: {}", song.filename());
                self.start_adhoc(song, true);
                return;
            }
            log::debug!("MP3 not found for {filename}, falling back to native");
        }

        let path = self.config.game_path(filename);
        let mut song = Box::new(SongNative::new(
            self.music_out.clone(),
            self.native_backend.clone(),
        ));
        if let Err(e) = song.init(&path, song_num) {
            log::warn!("could not load {}: {}", path.display(), e);
            return;
        }
        self.start_adhoc(song, true);
    }

    fn find_mp3_for(&self, filename: &str) -> Option<Box<dyn Song>> {
        let base = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let music_dir = self.music_dir();
        let fallback = format!("{base}.mp3");
        let mapped = MP3_FOR_NATIVE
            .iter()
            .find(|(m, _)| *m == base)
            .map(|(_, names)| *names)
            .unwrap_or(&[]);

        mapped
            .iter()
            .copied()
            .chain(std::iter::once(fallback.as_str()))
            .find_map(|name| {
                let path = music_dir.join(name);
                if !path.is_file() {
                    return None;
                }
                let mut song = SongMp3::new(self.music_out.clone());
                song.init(&path, 0).ok()?;
                Some(Box::new(song) as Box<dyn Song>)
            })
    }

    fn start_adhoc(&mut self, song: Box<dyn Song>, looping: bool) {
        self.music_stop();
        self.current_song = Some(CurrentSong::Adhoc(song));
        self.current_group.clear();
        let volume = self.music_volume;
        if let Some(song) = self.current_song_mut() {
            song.play(looping);
            song.set_volume(volume);
        }
    }

    /// Stop and deselect the current song
    pub fn music_stop(&mut self) {
        self.music_pause();
        self.current_song = None;
    }

    /// Per-frame housekeeping: start the next song when the last one
    /// finished and retire elapsed async effects
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    fn update_at(&mut self, now: Instant) {
        if self.flags.contains(AudioFlags::AUDIO | AudioFlags::MUSIC)
            && self.music_finished.swap(false, Ordering::AcqRel)
        {
            if let Some(song) = self.current_song_mut() {
                song.stop();
            }
            if !self.current_group.is_empty() {
                self.current_song = self
                    .request_song(&self.current_group)
                    .map(CurrentSong::Library);
            }
            let volume = self.music_volume;
            if let Some(song) = self.current_song_mut() {
                log::info!("assigning new song! '{}'", song.name());
                if !song.play(false) {
                    log::error!("play failed!");
                }
                song.set_volume(volume);
            }
        }

        let completed = &mut self.completed_sfx;
        self.timed_effects.retain(|t| {
            if t.deadline <= now {
                completed.push(t.id);
                false
            } else {
                true
            }
        });
    }

    /// Play a sound effect
    ///
    /// With `asynchronous` set, the effect is also timed; once its length
    /// has elapsed, [`update`](Self::update) reports it through
    /// [`take_completed_sfx`](Self::take_completed_sfx).
    pub fn play_sfx(&mut self, id: SfxId, asynchronous: bool) -> bool {
        if !self.flags.contains(AudioFlags::AUDIO | AudioFlags::SFX) {
            return false;
        }
        let volume = self.sfx_volume;
        let Some(manager) = self.sfx_manager.as_mut() else {
            return false;
        };
        if !manager.play_sfx(id, volume) {
            return false;
        }
        if asynchronous {
            let duration = Duration::from_millis(manager.last_sfx_duration_ms() as u64);
            self.timed_effects.push(TimedEffect {
                id,
                deadline: Instant::now() + duration,
            });
        }
        true
    }

    /// Async effects that have finished since the last call
    pub fn take_completed_sfx(&mut self) -> Vec<SfxId> {
        std::mem::take(&mut self.completed_sfx)
    }

    /// Play `note` (0-9) on instrument type `instrument` (0 harp, 1
    /// harpsichord, 2 lute, 3 panpipes, 4 xylophone)
    pub fn play_instrument_note(&mut self, instrument: u8, note: u8) -> bool {
        let Some(instrument) = Instrument::from_u8(instrument) else {
            log::warn!("unknown instrument type {instrument}");
            return false;
        };
        match SfxId::instrument_note(instrument, note) {
            Some(id) => self.play_sfx(id, false),
            None => {
                log::warn!("instrument note {note} out of range");
                false
            }
        }
    }

    /// Bring ambient object sounds in line with what the player can see
    ///
    /// Each effect plays once, at the volume of its nearest source
    /// (fading linearly to silence at [`MAP_SFX_RADIUS`] tiles). Effects
    /// whose sources have all gone out of view are stopped.
    pub fn update_map_sfx(&mut self, player: (u16, u16), visible: &[VisibleObject]) {
        if !self.flags.contains(AudioFlags::SFX) {
            return;
        }

        let mut levels: Vec<(SfxId, f32)> = Vec::new();
        for obj in visible {
            let Some(id) = self.object_sfx.lookup(obj.obj_n) else {
                continue;
            };
            let dx = player.0 as f32 - obj.x as f32;
            let dy = player.1 as f32 - obj.y as f32;
            let vol = ((MAP_SFX_RADIUS - (dx * dx + dy * dy).sqrt()) / MAP_SFX_RADIUS).max(0.0);
            match levels.iter_mut().find(|(i, _)| *i == id) {
                Some((_, level)) => *level = level.max(vol),
                None => levels.push((id, vol)),
            }
        }

        if let Some(manager) = self.sfx_manager.as_mut() {
            for &(id, _) in &levels {
                if self.active_sfx.iter().any(|a| a.id == id) {
                    continue;
                }
                if let Some(handle) = manager.play_sfx_looping(id, 0) {
                    log::debug!("map sfx: start {id}");
                    self.active_sfx.push(ActiveSfx { id, handle });
                }
            }
        }

        let mixer = &self.mixer;
        let sfx_volume = self.sfx_volume as f32;
        self.active_sfx
            .retain(|a| match levels.iter().find(|(id, _)| *id == a.id) {
                Some(&(_, level)) => {
                    let volume = (level * sfx_volume) as u8;
                    mixer.set_channel_volume(a.handle, volume);
                    true
                }
                None => {
                    log::debug!("map sfx: stop {}", a.id);
                    mixer.stop_handle(a.handle);
                    false
                }
            });
    }

    /// Ambient effects currently playing, with their mixer handles
    pub fn active_map_sfx(&self) -> Vec<(SfxId, SoundHandle)> {
        self.active_sfx.iter().map(|a| (a.id, a.handle)).collect()
    }

    /// Whether `handle` is still playing
    pub fn is_sound_playing(&self, handle: SoundHandle) -> bool {
        self.mixer.is_sound_handle_active(handle)
    }

    /// Mixer the manager plays on
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Music style in effect after startup fallbacks
    pub fn music_style(&self) -> MusicStyle {
        self.music_style
    }

    /// Mood group music is chosen from
    pub fn current_group(&self) -> &str {
        &self.current_group
    }

    /// Title of the selected song
    pub fn current_song_name(&self) -> Option<&str> {
        match self.current_song.as_ref()? {
            CurrentSong::Library(index) => self.songs.get(*index).map(|s| s.name()),
            CurrentSong::Adhoc(song) => Some(song.name()),
        }
    }

    /// File of the selected song
    pub fn current_song_filename(&self) -> Option<&str> {
        match self.current_song.as_ref()? {
            CurrentSong::Library(index) => self.songs.get(*index).map(|s| s.filename()),
            CurrentSong::Adhoc(song) => Some(song.filename()),
        }
    }

    /// Number of songs loaded
    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    /// Titles of the songs in `group`
    pub fn group_song_names(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(group)
            .map(|c| {
                c.iter()
                    .filter_map(|&i| self.songs.get(i).map(|s| s.name()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All enable switches
    pub fn flags(&self) -> AudioFlags {
        self.flags
    }

    /// Master audio switch
    pub fn is_audio_enabled(&self) -> bool {
        self.flags.contains(AudioFlags::AUDIO)
    }

    /// Switch all audio; music starts or stops accordingly
    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.flags.set(AudioFlags::AUDIO, enabled);
        self.sync_music();
    }

    /// Music switch
    pub fn is_music_enabled(&self) -> bool {
        self.flags.contains(AudioFlags::MUSIC)
    }

    /// Switch music; it starts or stops accordingly
    pub fn set_music_enabled(&mut self, enabled: bool) {
        self.flags.set(AudioFlags::MUSIC, enabled);
        self.sync_music();
    }

    fn sync_music(&mut self) {
        if self.flags.contains(AudioFlags::AUDIO | AudioFlags::MUSIC) {
            self.music_play();
        } else {
            self.music_stop();
        }
    }

    /// Speech switch
    pub fn is_speech_enabled(&self) -> bool {
        self.flags.contains(AudioFlags::SPEECH)
    }

    /// Switch speech
    pub fn set_speech_enabled(&mut self, enabled: bool) {
        self.flags.set(AudioFlags::SPEECH, enabled);
    }

    /// Sound effect switch
    pub fn is_sfx_enabled(&self) -> bool {
        self.flags.contains(AudioFlags::SFX)
    }

    /// Switch sound effects
    pub fn set_sfx_enabled(&mut self, enabled: bool) {
        self.flags.set(AudioFlags::SFX, enabled);
    }

    /// Custom sound effect switch
    pub fn is_custom_sfx_enabled(&self) -> bool {
        self.flags.contains(AudioFlags::CUSTOM_SFX)
    }

    /// Switch custom sound effects
    pub fn set_custom_sfx_enabled(&mut self, enabled: bool) {
        self.flags.set(AudioFlags::CUSTOM_SFX, enabled);
    }

    /// Sound effect volume, 0-255
    pub fn sfx_volume(&self) -> u8 {
        self.sfx_volume
    }

    /// Set the volume for effects started from now on
    pub fn set_sfx_volume(&mut self, volume: u8) {
        self.sfx_volume = volume;
    }

    /// Music volume, 0-255
    pub fn music_volume(&self) -> u8 {
        self.music_volume
    }

    /// Set the music volume, applying it to the current song
    pub fn set_music_volume(&mut self, volume: u8) {
        self.music_volume = volume;
        if let Some(song) = self.current_song_mut() {
            song.set_volume(volume);
        }
    }

    /// Whether group changes cut the current song short
    pub fn stop_music_on_group_change(&self) -> bool {
        self.stop_music_on_group_change
    }

    /// Choose whether group changes cut the current song short
    pub fn set_stop_music_on_group_change(&mut self, stop: bool) {
        self.stop_music_on_group_change = stop;
    }
}

fn clamp_volume(v: i64) -> u8 {
    v.clamp(0, MAX_VOLUME as i64) as u8
}

impl Drop for SoundManager {
    fn drop(&mut self) {
        self.music_stop();
        for a in self.active_sfx.drain(..) {
            self.mixer.stop_handle(a.handle);
        }
    }
}

impl std::fmt::Debug for SoundManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundManager")
            .field("flags", &self.flags)
            .field("music_style", &self.music_style)
            .field("current_group", &self.current_group)
            .field("current_song", &self.current_song_name())
            .field("songs", &self.songs.len())
            .field("active_sfx", &self.active_sfx.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::test_util::CountingStream;
    use crate::stream::AudioStream;

    struct FakePlayer;

    impl NativeMusicBackend for FakePlayer {
        fn open(&self, _path: &Path, _song_num: u16) -> crate::Result<Box<dyn AudioStream>> {
            Ok(Box::new(CountingStream::new(1, 22_050)))
        }
    }

    fn manager(json: &str) -> SoundManager {
        let mut sm = SoundManager::new(Mixer::new(22_050));
        sm.set_native_backend(Arc::new(FakePlayer));
        sm.nuvie_startup(&Configuration::from_json_str(json).unwrap());
        sm
    }

    #[test]
    fn test_startup_reads_config() {
        let sm = manager(
            r#"{"config": {"audio": {"music_volume": 400, "sfx_volume": -3, "enable_sfx": "no"}}}"#,
        );
        assert_eq!(sm.music_volume(), 255);
        assert_eq!(sm.sfx_volume(), 0);
        assert!(sm.is_audio_enabled());
        assert!(sm.is_music_enabled());
        assert!(!sm.is_sfx_enabled());
        assert!(sm.is_speech_enabled());
        assert_eq!(sm.music_style(), MusicStyle::Native);
        assert_eq!(sm.song_count(), 8);
        assert_eq!(sm.current_group(), "random");
        assert_eq!(sm.group_song_names("random").len(), 4);
        assert_eq!(sm.group_song_names("dungeon"), vec!["Dungeon"]);
    }

    #[test]
    fn test_first_update_starts_random_song() {
        let mut sm = manager("{}");
        assert!(sm.current_song_name().is_none());
        sm.update();
        let name = sm.current_song_name().unwrap();
        assert!(sm.group_song_names("random").contains(&name));
        assert_eq!(sm.mixer().active_count(), 1);
    }

    #[test]
    fn test_disabled_music_keeps_flag() {
        let mut sm = manager(r#"{"config": {"audio": {"enable_music": false}}}"#);
        sm.update();
        assert!(sm.current_song_name().is_none());
        sm.set_music_enabled(true);
        assert!(sm.current_song_name().is_some());
    }

    #[test]
    fn test_group_change_without_stop_waits_for_song_end() {
        let mut sm = manager(
            r#"{"config": {"audio": {"stop_music_on_group_change": false}}}"#,
        );
        sm.update();
        let first = sm.current_song_name().unwrap().to_string();
        sm.music_play_from("boat");
        sm.update();
        assert_eq!(sm.current_song_name(), Some(first.as_str()));

        // one second of song plays out, then the boat song takes over
        let mut buf = vec![0i16; 2 * 4096];
        for _ in 0..8 {
            sm.mixer().mix(&mut buf);
        }
        sm.update();
        assert_eq!(sm.current_song_name(), Some("Captain Johne's Hornpipe"));
    }

    #[test]
    fn test_music_stop_and_play() {
        let mut sm = manager("{}");
        sm.update();
        sm.music_stop();
        assert!(sm.current_song_name().is_none());
        assert_eq!(sm.mixer().active_count(), 0);
        sm.music_play();
        assert!(sm.current_song_name().is_some());
        assert_eq!(sm.mixer().active_count(), 1);
        sm.set_audio_enabled(false);
        assert_eq!(sm.mixer().active_count(), 0);
    }

    #[test]
    fn test_play_file_clears_group() {
        let mut sm = manager("{}");
        sm.music_play_file("bootup.m", 0);
        assert_eq!(sm.current_group(), "");
        assert!(sm.current_song_filename().unwrap().ends_with("bootup.m"));
        assert_eq!(sm.mixer().active_count(), 1);
    }

    struct BrokenPlayer;

    impl NativeMusicBackend for BrokenPlayer {
        fn open(&self, path: &Path, _song_num: u16) -> crate::Result<Box<dyn AudioStream>> {
            Err(crate::SoundError::Decode(format!("{}: bad data", path.display())))
        }
    }

    #[test]
    fn test_play_file_that_fails_to_load_keeps_current_song() {
        let mut sm = manager("{}");
        sm.update();
        let playing = sm.current_song_name().map(str::to_string);
        assert!(playing.is_some());

        sm.set_native_backend(Arc::new(BrokenPlayer));
        sm.music_play_file("bootup.m", 0);
        assert_eq!(sm.current_song_name().map(str::to_string), playing);
        assert_eq!(sm.mixer().active_count(), 1);
        assert!(!sm
            .current_song_filename()
            .is_some_and(|f| f.ends_with("bootup.m")));
    }

    #[test]
    fn test_async_sfx_reported_after_duration() {
        let mut sm = manager("{}");
        assert!(sm.play_sfx(SfxId::BLOCKED, true));
        sm.update_at(Instant::now());
        assert!(sm.take_completed_sfx().is_empty());
        sm.update_at(Instant::now() + Duration::from_secs(5));
        assert_eq!(sm.take_completed_sfx(), vec![SfxId::BLOCKED]);
        assert!(sm.take_completed_sfx().is_empty());
    }

    #[test]
    fn test_sfx_respects_switches() {
        let mut sm = manager("{}");
        sm.set_sfx_enabled(false);
        assert!(!sm.play_sfx(SfxId::HIT, false));
        sm.set_sfx_enabled(true);
        assert!(sm.play_sfx(SfxId::HIT, false));
        assert!(!sm.play_sfx(SfxId::EXPLOSION, false));
    }

    #[test]
    fn test_instrument_notes() {
        let mut sm = manager("{}");
        assert!(sm.play_instrument_note(0, 9));
        assert!(!sm.play_instrument_note(5, 0));
        assert!(!sm.play_instrument_note(1, 10));
    }

    #[test]
    fn test_map_sfx_volume_follows_nearest_source() {
        let mut sm = manager(r#"{"config": {"audio": {"sfx_volume": 128}}}"#);
        let objs = [
            VisibleObject { obj_n: crate::sfx::OBJ_FIREPLACE, x: 14, y: 10 },
            VisibleObject { obj_n: crate::sfx::OBJ_FIREPLACE, x: 12, y: 10 },
            VisibleObject { obj_n: 1, x: 10, y: 10 },
        ];
        sm.update_map_sfx((10, 10), &objs);
        let active = sm.active_map_sfx();
        assert_eq!(active.len(), 1);
        let (id, handle) = active[0];
        assert_eq!(id, SfxId::FIRE);
        // nearest at distance 2: 0.75 * 128
        assert_eq!(sm.mixer().channel_volume(handle), Some(96));
    }

    #[test]
    fn test_sfx_style_fallback() {
        let sm = manager(r#"{"config": {"ultima6": {"sfx": "towns"}}}"#);
        assert!(sm.sfx_manager.is_some());
    }
}
