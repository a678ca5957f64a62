//! JSON state files.
//!
//! Every persisted concern (queue, sessions, durations, counters) is a single
//! file rewritten in full on each save. There is no append log and no
//! partial update. Saves go through a sibling temp file and a rename, so a
//! crash mid-write leaves the previous document intact.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// A JSON document stored at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    /// Create a handle for the file at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and parse the document.
    ///
    /// Returns `Ok(None)` when the file does not exist yet.
    pub fn load<T: DeserializeOwned>(&self) -> io::Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let value = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(value))
    }

    /// Load the document, falling back to `T::default()` on any failure.
    ///
    /// Corrupt or unreadable state is logged and treated as "no prior state".
    pub fn load_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match self.load() {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not load persisted state, starting empty"
                );
                T::default()
            }
        }
    }

    /// Serialize `value` and atomically replace the file.
    pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }

    /// Sibling path the next save is staged in.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Save, logging instead of returning the error.
    pub fn save_logged<T: Serialize + ?Sized>(&self, value: &T) {
        if let Err(e) = self.save(value) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Could not persist state"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
        names: Vec<String>,
    }

    #[test]
    fn test_missing_file_loads_none() {
        let tmp = TempDir::new().unwrap();
        let file = JsonFile::new(tmp.path().join("absent.json"));
        let loaded: Option<Sample> = file.load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_creates_parent_and_overwrites() {
        let tmp = TempDir::new().unwrap();
        let file = JsonFile::new(tmp.path().join("nested").join("state.json"));

        file.save(&Sample {
            count: 1,
            names: vec!["a".into()],
        })
        .unwrap();
        file.save(&Sample {
            count: 2,
            names: vec![],
        })
        .unwrap();

        let loaded: Sample = file.load().unwrap().unwrap();
        assert_eq!(loaded.count, 2);
        assert!(loaded.names.is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_file_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("signalcache.json");
        let file = JsonFile::new(&path);

        for count in 0..5 {
            file.save(&Sample {
                count,
                names: vec!["x".repeat(count as usize)],
            })
            .unwrap();
            let loaded: Sample = file.load().unwrap().unwrap();
            assert_eq!(loaded.count, count);
        }

        let entries: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["signalcache.json".to_string()]);
    }

    #[test]
    fn test_stale_temp_file_does_not_shadow_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let file = JsonFile::new(&path);
        file.save(&Sample {
            count: 7,
            names: vec![],
        })
        .unwrap();

        // A write interrupted before the rename leaves only a partial temp file.
        std::fs::write(tmp.path().join("state.json.tmp"), "{ \"count\": ").unwrap();

        let loaded: Sample = file.load().unwrap().unwrap();
        assert_eq!(loaded.count, 7);

        file.save(&Sample {
            count: 8,
            names: vec![],
        })
        .unwrap();
        assert!(!tmp.path().join("state.json.tmp").exists());
        assert_eq!(file.load::<Sample>().unwrap().unwrap().count, 8);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let file = JsonFile::new(path);
        assert!(file.load::<Sample>().is_err());
        assert_eq!(file.load_or_default::<Sample>(), Sample::default());
    }
}
