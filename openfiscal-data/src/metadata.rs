//! Persistence of [`SyncMetadata`] between runs.

use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::detector::SyncMetadata;
use crate::error::MetadataError;

/// Storage for the change-detection state.
pub trait MetadataStore {
    /// Load the last persisted metadata, or `None` on a first run.
    ///
    /// # Errors
    /// Fails when stored metadata exists but cannot be read or decoded.
    fn load(&self) -> Result<Option<SyncMetadata>, MetadataError>;

    /// Persist `metadata`, replacing the previous value.
    ///
    /// # Errors
    /// Fails when the value cannot be written.
    fn save(&self, metadata: &SyncMetadata) -> Result<(), MetadataError>;
}

/// Pretty-printed JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonMetadataStore {
    path: Utf8PathBuf,
}

impl JsonMetadataStore {
    /// Store metadata at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the metadata file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> MetadataError {
        MetadataError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl MetadataStore for JsonMetadataStore {
    fn load(&self) -> Result<Option<SyncMetadata>, MetadataError> {
        let Some(contents) =
            openfiscal_fs::read_optional(&self.path).map_err(|err| self.io_error(err))?
        else {
            debug!("No sync metadata at {}", self.path);
            return Ok(None);
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| MetadataError::Decode {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, metadata: &SyncMetadata) -> Result<(), MetadataError> {
        let json = serde_json::to_vec_pretty(metadata).map_err(|source| MetadataError::Decode {
            path: self.path.clone(),
            source,
        })?;
        openfiscal_fs::write_atomically(&self.path, &json).map_err(|err| self.io_error(err))
    }
}

/// Process-local metadata holder, useful when persistence is not wanted.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    slot: Mutex<Option<SyncMetadata>>,
}

impl MemoryMetadataStore {
    /// Create an empty holder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a holder pre-seeded with `metadata`.
    #[must_use]
    pub const fn with(metadata: SyncMetadata) -> Self {
        Self {
            slot: Mutex::new(Some(metadata)),
        }
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self) -> Result<Option<SyncMetadata>, MetadataError> {
        Ok(self
            .slot
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |guard| guard.clone()))
    }

    fn save(&self, metadata: &SyncMetadata) -> Result<(), MetadataError> {
        let mut guard = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(metadata.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::RemoteMeta;
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn temp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn metadata_path(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("state/cest_metadata.json"))
            .expect("temp path should be UTF-8")
    }

    fn sample() -> SyncMetadata {
        let when = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        SyncMetadata::committed(
            RemoteMeta {
                etag: Some("\"5f-1\"".to_owned()),
                last_modified: Some("Sun, 01 Mar 2026 11:00:00 GMT".to_owned()),
            },
            when,
        )
    }

    #[rstest]
    fn missing_file_loads_as_none(temp: TempDir) {
        let store = JsonMetadataStore::new(metadata_path(&temp));
        assert_eq!(store.load().expect("load"), None);
    }

    #[rstest]
    fn saved_metadata_is_reloaded(temp: TempDir) {
        let store = JsonMetadataStore::new(metadata_path(&temp));
        store.save(&sample()).expect("save");
        assert_eq!(store.load().expect("load"), Some(sample()));

        let raw = std::fs::read_to_string(store.path()).expect("read raw");
        assert!(raw.contains("\"lastModified\""));
    }

    #[rstest]
    fn garbage_is_reported_as_decode_error(temp: TempDir) {
        let path = metadata_path(&temp);
        openfiscal_fs::write_atomically(&path, b"{not json").expect("seed file");
        let err = JsonMetadataStore::new(path)
            .load()
            .expect_err("garbage should fail");
        assert!(matches!(err, MetadataError::Decode { .. }));
    }

    #[rstest]
    fn memory_store_round_trips() {
        let store = MemoryMetadataStore::new();
        assert_eq!(store.load().expect("load"), None);
        store.save(&sample()).expect("save");
        assert_eq!(store.load().expect("load"), Some(sample()));
    }
}
