//! Local bundle cache.
//!
//! Finished bundles are stored one JSON file per (verse, audience) key under
//! the user's config directory:
//!
//! - `version` - format-version marker
//! - `{key_hash}.bundle.json` - one serialized [`CacheEntry`] each
//!
//! Entries are never evicted by size or age; the whole namespace is wiped
//! when the format version changes.

mod key;

pub use key::{cache_key, key_hash};

use crate::types::StudyBundle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bump when the bundle schema changes shape; mismatched stores are wiped on
/// open rather than silently reusing incompatible cached bundles.
const CACHE_VERSION: &str = "v1";

const VERSION_FILENAME: &str = "version";
const ENTRY_SUFFIX: &str = ".bundle.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One cached bundle with its save time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub saved_at: DateTime<Utc>,
    pub bundle: StudyBundle,
}

/// File-backed store mapping cache keys to assembled bundles.
pub struct BundleCache {
    cache_dir: PathBuf,
}

impl BundleCache {
    /// Open the cache in the default location
    /// (`~/.config/limmud/cache/` on Linux) and run the version migration.
    pub fn open() -> Result<Self, CacheError> {
        let cache_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("limmud")
            .join("cache");
        Self::open_at(cache_dir)
    }

    /// Open the cache in a custom directory (tests use a tempdir).
    pub fn open_at(cache_dir: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&cache_dir)?;
        let store = Self { cache_dir };
        store.migrate()?;
        Ok(store)
    }

    /// Compare the stored format-version marker against [`CACHE_VERSION`];
    /// on mismatch wipe every entry and write the new marker.
    fn migrate(&self) -> Result<(), CacheError> {
        let marker = self.cache_dir.join(VERSION_FILENAME);
        let stored = fs::read_to_string(&marker).unwrap_or_default();
        if stored.trim() == CACHE_VERSION {
            return Ok(());
        }

        let wiped = self.remove_entries()?;
        if wiped > 0 {
            tracing::info!(
                "[Cache] format version changed ({:?} -> {}), wiped {} entries",
                stored.trim(),
                CACHE_VERSION,
                wiped
            );
        }
        fs::write(&marker, CACHE_VERSION)?;
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}{}", key_hash(key), ENTRY_SUFFIX))
    }

    /// Look up a bundle. Entries that fail to parse or fail the completeness
    /// invariant are deleted and reported absent.
    pub fn get(&self, key: &str) -> Result<Option<StudyBundle>, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        let entry: CacheEntry = match serde_json::from_reader(BufReader::new(file)) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("[Cache] discarding unreadable entry for {}: {}", key, e);
                let _ = fs::remove_file(&path);
                return Ok(None);
            }
        };

        if !entry.bundle.is_complete() {
            tracing::warn!("[Cache] discarding incomplete entry for {}", key);
            let _ = fs::remove_file(&path);
            return Ok(None);
        }

        Ok(Some(entry.bundle))
    }

    /// Persist a bundle under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, bundle: &StudyBundle) -> Result<(), CacheError> {
        let entry = CacheEntry {
            saved_at: Utc::now(),
            bundle: bundle.clone(),
        };
        self.atomic_write(&self.entry_path(key), &entry)
    }

    /// Remove every entry in the namespace (the version marker stays).
    pub fn clear(&self) -> Result<(), CacheError> {
        let wiped = self.remove_entries()?;
        tracing::info!("[Cache] cleared {} entries", wiped);
        Ok(())
    }

    fn remove_entries(&self) -> Result<usize, CacheError> {
        let mut wiped = 0;
        for dir_entry in fs::read_dir(&self.cache_dir)? {
            let path = dir_entry?.path();
            if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(ENTRY_SUFFIX))
            {
                fs::remove_file(&path)?;
                wiped += 1;
            }
        }
        Ok(wiped)
    }

    /// Write-temp-then-rename so a crash mid-write never leaves a torn entry.
    fn atomic_write<T: Serialize>(&self, path: &Path, data: &T) -> Result<(), CacheError> {
        let temp_path = path.with_extension("tmp");

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, data)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StoryData, VerseRef};
    use tempfile::TempDir;

    fn complete_bundle() -> StudyBundle {
        StudyBundle {
            verse: Some(VerseRef {
                reference: "Devarim 6:4-5".to_string(),
                version: "Hebrew Bible".to_string(),
                text: "Hear, O Israel".to_string(),
                source: Some("Torah".to_string()),
            }),
            interpretation: Some("A d'var Torah.".to_string()),
            stories: vec![StoryData {
                title: "At the Shabbat Table".to_string(),
                text: "A story.".to_string(),
                image_prompt: None,
                img: None,
            }],
            ..Default::default()
        }
    }

    fn open_test_cache() -> (BundleCache, TempDir) {
        let dir = TempDir::new().unwrap();
        let cache = BundleCache::open_at(dir.path().to_path_buf()).unwrap();
        (cache, dir)
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let (cache, _dir) = open_test_cache();
        let bundle = complete_bundle();

        cache.set("devarim_6:4-5_adult", &bundle).unwrap();
        let loaded = cache.get("devarim_6:4-5_adult").unwrap().unwrap();
        assert_eq!(loaded, bundle);
    }

    #[test]
    fn test_missing_key_is_absent() {
        let (cache, _dir) = open_test_cache();
        assert!(cache.get("never_written").unwrap().is_none());
    }

    #[test]
    fn test_incomplete_entry_rejected_and_removed() {
        let (cache, dir) = open_test_cache();

        let mut incomplete = complete_bundle();
        incomplete.stories.clear();
        cache.set("partial", &incomplete).unwrap();

        assert!(cache.get("partial").unwrap().is_none());
        // The entry file itself is gone, not just masked
        let remaining = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(ENTRY_SUFFIX))
            .count();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_corrupt_entry_rejected_and_removed() {
        let (cache, dir) = open_test_cache();
        let path = dir
            .path()
            .join(format!("{}{}", key_hash("bad"), ENTRY_SUFFIX));
        std::fs::write(&path, "{ not json").unwrap();

        assert!(cache.get("bad").unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_removes_all_entries() {
        let (cache, _dir) = open_test_cache();
        cache.set("a", &complete_bundle()).unwrap();
        cache.set("b", &complete_bundle()).unwrap();

        cache.clear().unwrap();
        assert!(cache.get("a").unwrap().is_none());
        assert!(cache.get("b").unwrap().is_none());
    }

    #[test]
    fn test_version_mismatch_wipes_store() {
        let dir = TempDir::new().unwrap();
        {
            let cache = BundleCache::open_at(dir.path().to_path_buf()).unwrap();
            cache.set("keyed", &complete_bundle()).unwrap();
        }

        // Simulate a store written by an older build
        std::fs::write(dir.path().join(VERSION_FILENAME), "v0").unwrap();

        let cache = BundleCache::open_at(dir.path().to_path_buf()).unwrap();
        assert!(cache.get("keyed").unwrap().is_none());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(VERSION_FILENAME)).unwrap(),
            CACHE_VERSION
        );
    }

    #[test]
    fn test_matching_version_preserves_entries() {
        let dir = TempDir::new().unwrap();
        {
            let cache = BundleCache::open_at(dir.path().to_path_buf()).unwrap();
            cache.set("keyed", &complete_bundle()).unwrap();
        }

        let cache = BundleCache::open_at(dir.path().to_path_buf()).unwrap();
        assert!(cache.get("keyed").unwrap().is_some());
    }
}
