//! Saved analyses on disk.
//!
//! Each analysis lives in its own file in the analysis directory:
//!
//! ```text
//! magic "SSA\0" | version u8 | payload length u32 LE | MessagePack payload | CRC32 LE
//! ```
//!
//! The directory is held with an exclusive lock while the store is open.

use super::format::Analysis;
use crate::error::{Result, SheetError};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ANALYSIS_MAGIC: &[u8; 4] = b"SSA\0";

const FRAME_VERSION: u8 = 1;

const FILE_EXTENSION: &str = "analysis";

/// Sanity bound on a single payload.
const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;

pub struct AnalysisStore {
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    cache: Mutex<LruCache<String, Analysis>>,

    write_lock: Mutex<()>,
}

impl AnalysisStore {
    /// Open (creating if needed) the analysis directory at `path`.
    pub fn open(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        let lock_file = Self::acquire_lock(&path)?;
        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        info!(path = %path.display(), "opened analysis store");
        Ok(Self {
            path,
            _lock_file: lock_file,
            cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SheetError::invalid_arg(format!("{:?} is not a valid analysis name", name)));
        }
        Ok(self.path.join(format!("{}.{}", name, FILE_EXTENSION)))
    }

    pub fn save(&self, name: &str, analysis: &Analysis) -> Result<()> {
        let path = self.file_path(name)?;
        let payload = rmp_serde::to_vec_named(analysis)?;
        let _guard = self.write_lock.lock();

        // Written beside the target, then renamed into place.
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(ANALYSIS_MAGIC)?;
            file.write_all(&[FRAME_VERSION])?;
            file.write_all(&(payload.len() as u32).to_le_bytes())?;
            file.write_all(&payload)?;
            file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        self.cache.lock().put(name.to_string(), analysis.clone());
        debug!(name, steps = analysis.steps_data.len(), bytes = payload.len(), "saved analysis");
        Ok(())
    }

    /// Load a saved analysis. A missing one fails replay.
    pub fn load(&self, name: &str) -> Result<Analysis> {
        if let Some(cached) = self.cache.lock().get(name).cloned() {
            return Ok(cached);
        }
        let path = self.file_path(name)?;
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SheetError::ReplayFailed {
                step_index: 0,
                step_type: String::new(),
                message: format!("no saved analysis named {}", name),
            },
            _ => SheetError::Io(e),
        })?;
        let analysis = Self::read_frame(&mut file)?;
        self.cache.lock().put(name.to_string(), analysis.clone());
        Ok(analysis)
    }

    fn read_frame(file: &mut File) -> Result<Analysis> {
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ANALYSIS_MAGIC {
            return Err(SheetError::InvalidFormat("not an analysis file".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != FRAME_VERSION {
            return Err(SheetError::InvalidFormat(format!(
                "unsupported analysis frame version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_PAYLOAD_BYTES {
            return Err(SheetError::InvalidFormat("analysis payload too large".into()));
        }

        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let expected = u32::from_le_bytes(checksum_bytes);
        let got = crc32fast::hash(&payload);
        if expected != got {
            return Err(SheetError::ChecksumMismatch { expected, got });
        }

        Ok(rmp_serde::from_slice(&payload)?)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Names of saved analyses, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.file_path(name)?;
        let _guard = self.write_lock.lock();
        self.cache.lock().pop(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn export_json(&self, name: &str) -> Result<String> {
        self.load(name)?.to_json()
    }

    /// Save an analysis given as JSON, legacy layouts included.
    pub fn import_json(&self, name: &str, json: &str) -> Result<Analysis> {
        let analysis = Analysis::from_json(json)?;
        self.save(name, &analysis)?;
        Ok(analysis)
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file.try_lock_exclusive().map_err(|_| SheetError::Locked)?;
        Ok(lock_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::format::StepData;
    use crate::steps::Params;
    use crate::types::PublicInterfaceVersion;
    use std::io::{Seek, SeekFrom};
    use tempfile::TempDir;

    fn analysis() -> Analysis {
        let mut params = Params::new();
        params.insert("sheet_index".into(), serde_json::json!(0));
        params.insert("drop".into(), serde_json::json!(true));
        Analysis::new(
            PublicInterfaceVersion::V3,
            vec![StepData::new("reset_index", 1, params)],
        )
    }

    #[test]
    fn test_save_and_reload_from_disk() {
        let dir = TempDir::new().unwrap();
        {
            let store = AnalysisStore::open(dir.path(), 4).unwrap();
            store.save("id-abc", &analysis()).unwrap();
        }
        let store = AnalysisStore::open(dir.path(), 4).unwrap();
        assert_eq!(store.load("id-abc").unwrap(), analysis());
        assert_eq!(store.list().unwrap(), vec!["id-abc"]);
    }

    #[test]
    fn test_missing_analysis_fails_replay() {
        let dir = TempDir::new().unwrap();
        let store = AnalysisStore::open(dir.path(), 4).unwrap();
        assert!(matches!(store.load("nope"), Err(SheetError::ReplayFailed { .. })));
        assert!(store.load("../etc").is_err());
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let _store = AnalysisStore::open(dir.path(), 4).unwrap();
        assert!(matches!(AnalysisStore::open(dir.path(), 4), Err(SheetError::Locked)));
    }

    #[test]
    fn test_corrupted_payload_is_detected() {
        let dir = TempDir::new().unwrap();
        {
            let store = AnalysisStore::open(dir.path(), 4).unwrap();
            store.save("a", &analysis()).unwrap();
        }
        let path = dir.path().join("a.analysis");
        let mut file = fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(12)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let store = AnalysisStore::open(dir.path(), 4).unwrap();
        assert!(matches!(store.load("a"), Err(SheetError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_import_legacy_json() {
        let dir = TempDir::new().unwrap();
        let store = AnalysisStore::open(dir.path(), 4).unwrap();
        let json = r#"{"version": "0.1.0", "steps": {"1": {"step_type": "reset_index", "step_version": 1, "sheet_index": 0}}}"#;
        store.import_json("legacy", json).unwrap();
        let exported = store.export_json("legacy").unwrap();
        assert!(exported.contains("steps_data"));
        assert!(store.delete("legacy").unwrap());
        assert!(!store.exists("legacy"));
    }
}
