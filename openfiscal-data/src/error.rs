//! Error types produced while fetching, parsing and committing upstream data.

use std::io;

use camino::Utf8PathBuf;
use openfiscal_core::StoreError;
use thiserror::Error;

/// Transport-level failures encountered while issuing HTTP requests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The server answered with an error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Short description of the failure.
        message: String,
    },
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout {
        /// Fully qualified request URL.
        url: String,
    },
    /// The connection failed or the body could not be read.
    #[error("network error contacting {url}: {source}")]
    Network {
        /// Fully qualified request URL.
        url: String,
        /// I/O error reported by the transport.
        #[source]
        source: io::Error,
    },
    /// The response body exceeded the configured size cap.
    #[error("response from {url} exceeded {limit} bytes")]
    BodyTooLarge {
        /// Fully qualified request URL.
        url: String,
        /// Configured cap in bytes.
        limit: usize,
    },
    /// Building the HTTP client failed.
    #[error("failed to build HTTP client: {message}")]
    Client {
        /// Description reported by `reqwest`.
        message: String,
    },
}

impl TransportError {
    /// Report whether another attempt could plausibly succeed.
    ///
    /// Network failures, timeouts, server errors and `429 Too Many Requests`
    /// are transient; every other status and oversized bodies are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::BodyTooLarge { .. } | Self::Client { .. } => false,
        }
    }
}

/// A source document could not be interpreted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A configured source URL was invalid.
    #[error("source URL {url:?} is invalid: {source}")]
    BaseUrl {
        /// The rejected URL.
        url: String,
        /// URL parser failure.
        #[source]
        source: url::ParseError,
    },
    /// The regime document contained no annex headings at all.
    #[error("document at {url} contains no annex sections")]
    NoAnnexSections {
        /// Document URL.
        url: String,
    },
}

/// A source could not be constructed from its configuration.
#[derive(Debug, Error)]
pub enum SourceSetupError {
    /// The configured URL was rejected.
    #[error(transparent)]
    Url(#[from] ParseError),
    /// The HTTP client could not be built.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Reasons a source pipeline ends without committing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Fetching failed after every retry.
    #[error("upstream unavailable: {source}")]
    UpstreamUnavailable {
        /// Last transport failure observed.
        #[source]
        source: TransportError,
    },
    /// The source could not be parsed at all.
    #[error("malformed source: {source}")]
    MalformedSource {
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// Parsing finished but yielded nothing worth committing.
    #[error("source yielded no usable records: {reason}")]
    NothingParsed {
        /// Short explanation for operators.
        reason: &'static str,
    },
    /// The atomic replacement failed; the previous table stays visible.
    #[error("failed to commit records: {source}")]
    StoreCommit {
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

/// Failures reading or writing persisted change-detection metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The metadata file could not be read or written.
    #[error("failed to access sync metadata at {path}: {source}")]
    Io {
        /// Location of the metadata file.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The metadata file was not valid JSON.
    #[error("sync metadata at {path} is malformed: {source}")]
    Decode {
        /// Location of the metadata file.
        path: Utf8PathBuf,
        /// JSON failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Failures producing export artefacts.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Reading the merged view from the store failed.
    #[error("failed to read dataset for export: {source}")]
    Store {
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Serialising the JSON artefact failed.
    #[error("failed to serialise JSON export: {source}")]
    Json {
        /// JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// Serialising the CSV artefact failed.
    #[error("failed to serialise CSV export: {source}")]
    Csv {
        /// CSV failure.
        #[source]
        source: csv::Error,
    },
    /// Writing an artefact to disk failed.
    #[error("failed to write export to {path}: {source}")]
    Write {
        /// Destination path.
        path: Utf8PathBuf,
        /// I/O failure.
        #[source]
        source: io::Error,
    },
}
