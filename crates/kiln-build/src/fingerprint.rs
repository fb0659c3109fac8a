//! Fingerprint store for incremental compilation
//!
//! Maps source paths to SHA-256 content digests. Loaded once at the start of
//! a run, mutated in memory by the compile coordinator, persisted once at the
//! end. Entries for deleted sources are kept; nothing prunes them.

use crate::error::{BuildError, BuildResult};
use crate::source::SourceUnit;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// SHA-256 content digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash a file's contents
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self::from_digest(&hasher.finalize()))
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_digest(&Sha256::digest(bytes))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Why a unit does or does not need compiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Incremental mode is off
    Forced,
    /// No object at the expected output path
    MissingObject,
    /// Never compiled successfully before
    Unrecorded,
    /// Object is at least as new as the source
    UpToDate,
    /// Source newer than object but content identical
    Unchanged,
    /// Content differs from the stored digest
    Changed,
}

impl Freshness {
    pub fn needs_rebuild(&self) -> bool {
        !matches!(self, Self::UpToDate | Self::Unchanged)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Forced => "incremental mode off",
            Self::MissingObject => "no object",
            Self::Unrecorded => "no fingerprint",
            Self::UpToDate => "up to date",
            Self::Unchanged => "content unchanged",
            Self::Changed => "content changed",
        }
    }
}

/// Persisted path -> digest mapping
#[derive(Debug, Clone, Default)]
pub struct FingerprintStore {
    path: PathBuf,
    root: PathBuf,
    entries: BTreeMap<String, Fingerprint>,
    dirty: bool,
}

impl FingerprintStore {
    /// Empty store that will persist to `path`, keying entries relative to `root`
    pub fn empty(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the store; a missing file is a cold start, not an error
    pub fn load(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> BuildResult<Self> {
        let mut store = Self::empty(path, root);
        let content = match fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(store),
            Err(e) => return Err(BuildError::cache_io(&store.path, e)),
        };

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&content).map_err(|e| BuildError::CacheFormat {
                path: store.path.clone(),
                reason: e.to_string(),
            })?;

        for (key, hex) in raw {
            let fingerprint = Fingerprint::from_hex(&hex).ok_or_else(|| BuildError::CacheFormat {
                path: store.path.clone(),
                reason: format!("malformed digest for '{}'", key),
            })?;
            store.entries.insert(key, fingerprint);
        }
        Ok(store)
    }

    /// Cache key for a source path
    pub fn key(&self, source: &Path) -> String {
        source
            .strip_prefix(&self.root)
            .unwrap_or(source)
            .to_string_lossy()
            .replace('\\', "/")
    }

    pub fn get(&self, source: &Path) -> Option<&Fingerprint> {
        self.entries.get(&self.key(source))
    }

    /// Decide whether `unit` must be compiled
    ///
    /// Checks run cheapest first: the content hash is computed only when the
    /// source is newer than its object.
    pub fn freshness(&self, unit: &SourceUnit, incremental: bool) -> Freshness {
        if !incremental {
            return Freshness::Forced;
        }
        let Some(object_mtime) = mtime(&unit.object) else {
            return Freshness::MissingObject;
        };
        let Some(stored) = self.get(&unit.path) else {
            return Freshness::Unrecorded;
        };
        match mtime(&unit.path) {
            Some(source_mtime) if source_mtime <= object_mtime => return Freshness::UpToDate,
            _ => {}
        }
        match Fingerprint::of_file(&unit.path) {
            Ok(current) if current == *stored => Freshness::Unchanged,
            _ => Freshness::Changed,
        }
    }

    pub fn should_rebuild(&self, unit: &SourceUnit, incremental: bool) -> bool {
        self.freshness(unit, incremental).needs_rebuild()
    }

    /// Record the digest of a successfully compiled source
    pub fn commit(&mut self, source: &Path, fingerprint: Fingerprint) {
        let key = self.key(source);
        if self.entries.get(&key) != Some(&fingerprint) {
            self.entries.insert(key, fingerprint);
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store if anything changed
    ///
    /// Writes a sibling temp file and renames it over the target so a crash
    /// never leaves a truncated store behind.
    pub fn persist(&mut self) -> BuildResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let raw: BTreeMap<&str, String> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_hex()))
            .collect();
        let json = serde_json::to_string_pretty(&raw).map_err(|e| BuildError::CacheFormat {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&self.path, json.as_bytes())?;
        self.dirty = false;
        Ok(())
    }
}

/// Write via a temp file in the same directory, then rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::cache_io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| BuildError::cache_io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| BuildError::cache_io(path, e))
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Language, SourceKind};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        unit: SourceUnit,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        fs::create_dir_all(root.join("obj")).unwrap();
        let unit = SourceUnit {
            path: root.join("a.c"),
            rel: PathBuf::from("a.c"),
            kind: SourceKind::Ordinary,
            language: Language::C,
            object: root.join("obj/a.c.o"),
        };
        fs::write(&unit.path, "int a;").unwrap();
        Fixture {
            _temp: temp,
            root,
            unit,
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    fn store(f: &Fixture) -> FingerprintStore {
        FingerprintStore::empty(f.root.join("fp.json"), &f.root)
    }

    #[test]
    fn test_incremental_off_always_rebuilds() {
        let f = fixture();
        assert_eq!(store(&f).freshness(&f.unit, false), Freshness::Forced);
    }

    #[test]
    fn test_missing_object() {
        let f = fixture();
        assert_eq!(store(&f).freshness(&f.unit, true), Freshness::MissingObject);
    }

    #[test]
    fn test_unrecorded_source() {
        let f = fixture();
        fs::write(&f.unit.object, "OBJ").unwrap();
        assert_eq!(store(&f).freshness(&f.unit, true), Freshness::Unrecorded);
    }

    #[test]
    fn test_object_newer_skips_hashing() {
        let f = fixture();
        fs::write(&f.unit.object, "OBJ").unwrap();
        let now = SystemTime::now();
        set_mtime(&f.unit.path, now - Duration::from_secs(60));
        set_mtime(&f.unit.object, now);

        let mut store = store(&f);
        // A digest that cannot match proves the content was never hashed
        store.commit(&f.unit.path, Fingerprint::of_bytes(b"something else"));
        assert_eq!(store.freshness(&f.unit, true), Freshness::UpToDate);
    }

    #[test]
    fn test_touched_source_with_same_content() {
        let f = fixture();
        fs::write(&f.unit.object, "OBJ").unwrap();
        let now = SystemTime::now();
        set_mtime(&f.unit.object, now - Duration::from_secs(60));
        set_mtime(&f.unit.path, now);

        let mut store = store(&f);
        store.commit(&f.unit.path, Fingerprint::of_file(&f.unit.path).unwrap());
        assert_eq!(store.freshness(&f.unit, true), Freshness::Unchanged);
        assert!(!store.should_rebuild(&f.unit, true));
    }

    #[test]
    fn test_edited_source() {
        let f = fixture();
        fs::write(&f.unit.object, "OBJ").unwrap();
        let mut store = store(&f);
        store.commit(&f.unit.path, Fingerprint::of_file(&f.unit.path).unwrap());

        fs::write(&f.unit.path, "int a = 1;").unwrap();
        let now = SystemTime::now();
        set_mtime(&f.unit.object, now - Duration::from_secs(60));
        set_mtime(&f.unit.path, now);
        assert_eq!(store.freshness(&f.unit, true), Freshness::Changed);
    }

    #[test]
    fn test_persist_and_reload() {
        let f = fixture();
        let mut store = store(&f);
        let fp = Fingerprint::of_file(&f.unit.path).unwrap();
        store.commit(&f.unit.path, fp);
        assert!(store.is_dirty());
        store.persist().unwrap();
        assert!(!store.is_dirty());

        let reloaded = FingerprintStore::load(f.root.join("fp.json"), &f.root).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&f.unit.path), Some(&fp));
        assert_eq!(reloaded.key(&f.unit.path), "a.c");
    }

    #[test]
    fn test_missing_file_is_cold_start() {
        let f = fixture();
        let store = FingerprintStore::load(f.root.join("none.json"), &f.root).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_format_error() {
        let f = fixture();
        fs::write(f.root.join("fp.json"), "{ not json").unwrap();
        let err = FingerprintStore::load(f.root.join("fp.json"), &f.root).unwrap_err();
        assert!(matches!(err, BuildError::CacheFormat { .. }));

        fs::write(f.root.join("fp.json"), r#"{"a.c": "zz"}"#).unwrap();
        let err = FingerprintStore::load(f.root.join("fp.json"), &f.root).unwrap_err();
        assert!(matches!(err, BuildError::CacheFormat { .. }));
    }

    #[test]
    fn test_hex_round_trip() {
        let fp = Fingerprint::of_bytes(b"kernel");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Some(fp));
        assert_eq!(fp.to_hex().len(), 64);
    }
}
