//! Versioned, checksummed build snapshots written atomically to disk.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process,
};

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::CheckpointError;

/// Schema version written by this build and the only one it reads.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// On-disk wrapper around a JSON-encoded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    /// Snapshot schema.
    pub schema_version: u32,
    /// Ensemble or module name the snapshot belongs to.
    pub identity: String,
    /// Digest of every setting that changes the built model.
    pub fingerprint: String,
    /// Build seed.
    pub seed: u64,
    /// Write time, Unix nanoseconds.
    pub created_at_ns: i64,
    /// CRC32 of `payload`.
    pub payload_crc32: u32,
    /// JSON-encoded snapshot.
    pub payload: String,
}

/// Outcome of looking for a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointLoad<T> {
    /// No snapshot on disk.
    Missing,
    /// A file exists but cannot be trusted; the build starts fresh.
    Discarded {
        /// Why the file was ignored.
        reason: String,
    },
    /// Snapshot restored.
    Restored(T),
}

impl<T> CheckpointLoad<T> {
    /// The restored snapshot, if any.
    pub fn into_restored(self) -> Option<T> {
        match self {
            Self::Restored(snapshot) => Some(snapshot),
            Self::Missing | Self::Discarded { .. } => None,
        }
    }
}

/// Stable digest of any serializable configuration, used as a fingerprint.
pub fn fingerprint_of<T: Serialize>(settings: &T) -> Result<String, CheckpointError> {
    let encoded = serde_json::to_vec(settings)?;
    Ok(format!("{:08x}-{}", crc32fast::hash(&encoded), encoded.len()))
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Directory of snapshots named `{identity}_{seed}.checkpoint.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store rooted at `dir`; the directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the snapshot of `identity` built with `seed`.
    #[must_use]
    pub fn path_for(&self, identity: &str, seed: u64) -> PathBuf {
        self.dir
            .join(format!("{}_{seed}.checkpoint.json", file_safe(identity)))
    }

    /// Subdirectory for a member's own snapshots.
    #[must_use]
    pub fn member_dir(&self, member: &str) -> PathBuf {
        self.dir.join(file_safe(member))
    }

    /// Writes `snapshot` through a temp file, fsync and rename, so a crash never
    /// leaves a truncated checkpoint behind.
    pub fn save<T: Serialize>(
        &self,
        identity: &str,
        seed: u64,
        fingerprint: &str,
        snapshot: &T,
    ) -> Result<PathBuf, CheckpointError> {
        let payload = serde_json::to_string(snapshot)?;
        let envelope = CheckpointEnvelope {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            identity: identity.to_string(),
            fingerprint: fingerprint.to_string(),
            seed,
            created_at_ns: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            payload_crc32: crc32fast::hash(payload.as_bytes()),
            payload,
        };
        let encoded = serde_json::to_vec(&envelope)?;

        fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(identity, seed);
        let temp = path.with_extension(format!("json.tmp-{}", process::id()));
        let written = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)
            .and_then(|mut file| {
                file.write_all(&encoded)?;
                file.sync_all()
            });
        if let Err(source) = written {
            let _ = fs::remove_file(&temp);
            return Err(CheckpointError::Io { path: temp, source });
        }
        if let Err(source) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(CheckpointError::Io { path, source });
        }
        Ok(path)
    }

    /// Reads the snapshot of `identity`/`seed`.
    ///
    /// A missing file is [`CheckpointLoad::Missing`]; unparseable JSON or a
    /// checksum mismatch is [`CheckpointLoad::Discarded`]. A readable file from
    /// another schema version or configuration is an error: resuming from it
    /// would silently build a different model.
    pub fn load<T: DeserializeOwned>(
        &self,
        identity: &str,
        seed: u64,
        fingerprint: &str,
    ) -> Result<CheckpointLoad<T>, CheckpointError> {
        let path = self.path_for(identity, seed);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(CheckpointLoad::Missing),
            Err(err) => {
                return Ok(CheckpointLoad::Discarded {
                    reason: format!("{} unreadable: {err}", path.display()),
                })
            }
        };
        let envelope: CheckpointEnvelope = match serde_json::from_slice(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                return Ok(CheckpointLoad::Discarded {
                    reason: format!("{} malformed: {err}", path.display()),
                })
            }
        };
        let incompatible = |message: String| CheckpointError::Incompatible {
            path: path.clone(),
            message,
        };
        if envelope.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(incompatible(format!(
                "schema version {} (expected {CHECKPOINT_SCHEMA_VERSION})",
                envelope.schema_version
            )));
        }
        if envelope.identity != identity || envelope.seed != seed {
            return Err(incompatible(format!(
                "written for {}/{} (expected {identity}/{seed})",
                envelope.identity, envelope.seed
            )));
        }
        if envelope.fingerprint != fingerprint {
            return Err(incompatible(format!(
                "configuration fingerprint {} (expected {fingerprint})",
                envelope.fingerprint
            )));
        }
        let observed = crc32fast::hash(envelope.payload.as_bytes());
        if observed != envelope.payload_crc32 {
            return Ok(CheckpointLoad::Discarded {
                reason: format!(
                    "{} payload crc32 mismatch: expected={:08x} observed={observed:08x}",
                    path.display(),
                    envelope.payload_crc32
                ),
            });
        }
        serde_json::from_str(&envelope.payload)
            .map(CheckpointLoad::Restored)
            .map_err(|err| incompatible(format!("payload does not match snapshot schema: {err}")))
    }

    /// Deletes the snapshot of `identity`/`seed`, if present.
    pub fn remove(&self, identity: &str, seed: u64) -> Result<(), CheckpointError> {
        let path = self.path_for(identity, seed);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Progress {
        built: usize,
        sums: Vec<f64>,
    }

    fn progress() -> Progress {
        Progress {
            built: 3,
            sums: vec![0.5, 1.25],
        }
    }

    #[test]
    fn save_then_load_restores_equal_snapshot() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let path = store.save("forest", 7, "fp", &progress()).unwrap();
        assert!(path.ends_with("forest_7.checkpoint.json"));
        let loaded: CheckpointLoad<Progress> = store.load("forest", 7, "fp").unwrap();
        assert_eq!(loaded, CheckpointLoad::Restored(progress()));
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_file_starts_fresh() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path().join("absent"));
        let loaded: CheckpointLoad<Progress> = store.load("forest", 1, "fp").unwrap();
        assert_eq!(loaded, CheckpointLoad::Missing);
    }

    #[test]
    fn malformed_file_is_discarded() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        fs::write(store.path_for("forest", 1), b"{ not json").unwrap();
        let loaded: CheckpointLoad<Progress> = store.load("forest", 1, "fp").unwrap();
        assert!(matches!(loaded, CheckpointLoad::Discarded { .. }));
    }

    #[test]
    fn tampered_payload_is_discarded() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let path = store.save("forest", 1, "fp", &progress()).unwrap();
        let mut envelope: CheckpointEnvelope =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        envelope.payload = envelope.payload.replace('3', "4");
        fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();
        let loaded: CheckpointLoad<Progress> = store.load("forest", 1, "fp").unwrap();
        assert!(matches!(loaded, CheckpointLoad::Discarded { .. }));
    }

    #[test]
    fn version_or_fingerprint_mismatch_fails_loudly() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let path = store.save("forest", 1, "fp", &progress()).unwrap();
        let err = store.load::<Progress>("forest", 1, "other").unwrap_err();
        assert!(matches!(err, CheckpointError::Incompatible { .. }));

        let mut envelope: CheckpointEnvelope =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        envelope.schema_version = CHECKPOINT_SCHEMA_VERSION + 1;
        fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();
        let err = store.load::<Progress>("forest", 1, "fp").unwrap_err();
        assert!(matches!(err, CheckpointError::Incompatible { .. }));
    }

    #[test]
    fn fingerprints_track_settings() {
        let a = fingerprint_of(&("forest", 200, true)).unwrap();
        let b = fingerprint_of(&("forest", 201, true)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, fingerprint_of(&("forest", 200, true)).unwrap());
    }

    #[test]
    fn remove_is_idempotent() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store.save("forest", 2, "fp", &progress()).unwrap();
        store.remove("forest", 2).unwrap();
        store.remove("forest", 2).unwrap();
        assert!(!store.path_for("forest", 2).exists());
    }
}
