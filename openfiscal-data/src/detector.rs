//! Conditional-fetch decision for the regime document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Change indicators returned by a metadata-only probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMeta {
    /// `ETag` header, if the server sent one.
    pub etag: Option<String>,
    /// `Last-Modified` header, if the server sent one.
    pub last_modified: Option<String>,
}

impl RemoteMeta {
    /// Report whether the server supplied neither indicator.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// State persisted after each successful regime synchronisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// `ETag` observed when the stored table was fetched.
    #[serde(default)]
    pub etag: Option<String>,
    /// `Last-Modified` observed when the stored table was fetched.
    #[serde(default)]
    pub last_modified: Option<String>,
    /// When the stored table was committed.
    pub last_update: DateTime<Utc>,
}

impl SyncMetadata {
    /// Record `remote` as committed at `now`.
    #[must_use]
    pub fn committed(remote: RemoteMeta, now: DateTime<Utc>) -> Self {
        Self {
            etag: remote.etag,
            last_modified: remote.last_modified,
            last_update: now,
        }
    }
}

/// Decide whether the regime document must be downloaded.
///
/// The fetch is skipped only when at least one indicator is present remotely
/// and equal to the stored value. Missing metadata or a probe without either
/// header always syncs.
///
/// # Examples
/// ```
/// use openfiscal_data::{RemoteMeta, should_sync};
///
/// let remote = RemoteMeta { etag: Some("\"v1\"".into()), last_modified: None };
/// assert!(should_sync(None, &remote));
/// ```
#[must_use]
pub fn should_sync(stored: Option<&SyncMetadata>, remote: &RemoteMeta) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    let same = |remote_value: Option<&String>, stored_value: Option<&String>| {
        remote_value.is_some_and(|value| Some(value) == stored_value)
    };
    let unchanged = same(remote.etag.as_ref(), stored.etag.as_ref())
        || same(remote.last_modified.as_ref(), stored.last_modified.as_ref());
    !unchanged
}
