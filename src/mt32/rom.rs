//! MT-32 / CM-32L ROM discovery

use crate::{Result, SoundError};
use std::path::{Path, PathBuf};

/// Control ROM size shared by MT-32 and CM-32L
pub const CONTROL_ROM_SIZE: usize = 64 * 1024;
/// PCM ROM size of the MT-32
pub const MT32_PCM_ROM_SIZE: usize = 512 * 1024;
/// PCM ROM size of the CM-32L
pub const CM32L_PCM_ROM_SIZE: usize = 1024 * 1024;

/// Which sound module a ROM pair belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomModel {
    /// Roland CM-32L (preferred when both are present)
    Cm32l,
    /// Roland MT-32
    Mt32,
}

impl RomModel {
    /// File names of the control and PCM ROMs
    pub fn file_names(self) -> (&'static str, &'static str) {
        match self {
            RomModel::Cm32l => ("CM32L_CONTROL.ROM", "CM32L_PCM.ROM"),
            RomModel::Mt32 => ("MT32_CONTROL.ROM", "MT32_PCM.ROM"),
        }
    }
}

/// Kind of ROM image, told apart by size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomKind {
    /// Control program ROM
    Control,
    /// Sample ROM
    Pcm,
}

impl RomKind {
    /// Classify a ROM image by its length
    pub fn identify(data: &[u8]) -> Result<Self> {
        match data.len() {
            CONTROL_ROM_SIZE => Ok(RomKind::Control),
            MT32_PCM_ROM_SIZE | CM32L_PCM_ROM_SIZE => Ok(RomKind::Pcm),
            n => Err(SoundError::Rom(format!("unrecognised ROM image of {n} bytes"))),
        }
    }
}

/// A located and loaded control/PCM ROM pair
#[derive(Clone)]
pub struct RomSet {
    /// Module the pair belongs to
    pub model: RomModel,
    /// Control ROM image
    pub control: Vec<u8>,
    /// PCM ROM image
    pub pcm: Vec<u8>,
}

impl RomSet {
    /// Find a complete ROM pair in `dir`, CM-32L first
    pub fn locate(dir: &Path) -> Option<(RomModel, PathBuf, PathBuf)> {
        [RomModel::Cm32l, RomModel::Mt32].into_iter().find_map(|model| {
            let (control, pcm) = model.file_names();
            let control = dir.join(control);
            let pcm = dir.join(pcm);
            (control.is_file() && pcm.is_file()).then_some((model, control, pcm))
        })
    }

    /// Locate and read a ROM pair from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let (model, control_path, pcm_path) = Self::locate(dir).ok_or_else(|| {
            log::error!(
                "MT-32: no ROMs in {}; place MT32_CONTROL.ROM and MT32_PCM.ROM (or the CM32L pair) there",
                dir.display()
            );
            SoundError::ResourceMissing(format!("MT-32 ROMs in {}", dir.display()))
        })?;
        let control = std::fs::read(&control_path)?;
        let pcm = std::fs::read(&pcm_path)?;
        log::info!("MT-32: loaded {:?} ROMs from {}", model, dir.display());
        Ok(RomSet {
            model,
            control,
            pcm,
        })
    }
}

impl std::fmt::Debug for RomSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RomSet")
            .field("model", &self.model)
            .field("control_len", &self.control.len())
            .field("pcm_len", &self.pcm.len())
            .finish()
    }
}

/// Whether `dir` holds a complete CM-32L or MT-32 ROM pair
pub fn check_roms_exist(dir: impl AsRef<Path>) -> bool {
    RomSet::locate(dir.as_ref()).is_some()
}


#[cfg(test)]
mod tests {
    use super::test_util::write_roms;
    use super::*;

    #[test]
    fn test_missing_roms() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!check_roms_exist(dir.path()));
        assert!(matches!(
            RomSet::load(dir.path()),
            Err(SoundError::ResourceMissing(_))
        ));
    }

    #[test]
    fn test_half_pair_is_not_enough() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CM32L_CONTROL.ROM"), [0u8; 16]).unwrap();
        assert!(!check_roms_exist(dir.path()));
    }

    #[test]
    fn test_cm32l_preferred_over_mt32() {
        let dir = tempfile::tempdir().unwrap();
        write_roms(dir.path(), RomModel::Mt32);
        assert_eq!(RomSet::load(dir.path()).unwrap().model, RomModel::Mt32);
        write_roms(dir.path(), RomModel::Cm32l);
        let roms = RomSet::load(dir.path()).unwrap();
        assert_eq!(roms.model, RomModel::Cm32l);
        assert_eq!(roms.pcm.len(), CM32L_PCM_ROM_SIZE);
    }

    #[test]
    fn test_identify_by_size() {
        assert_eq!(RomKind::identify(&[0; CONTROL_ROM_SIZE]).unwrap(), RomKind::Control);
        assert_eq!(RomKind::identify(&vec![0; MT32_PCM_ROM_SIZE]).unwrap(), RomKind::Pcm);
        assert!(RomKind::identify(&[0; 100]).is_err());
    }
}
