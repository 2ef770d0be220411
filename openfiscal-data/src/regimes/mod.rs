//! Regime-table source: a single convention document with annex tables.

mod parse;

use async_trait::async_trait;
use url::Url;

use crate::detector::RemoteMeta;
use crate::error::{ParseError, SourceSetupError, TransportError};
use crate::http::{HttpSourceConfig, HttpTransport};

pub use parse::{ParsedRegimes, parse_regime_document};

/// Published location of the regime convention.
pub const DEFAULT_REGIME_DOCUMENT_URL: &str =
    "https://www.confaz.fazenda.gov.br/legislacao/convenios/2018/CV142_18";

/// Retrieval half of the regime-table fetcher.
#[async_trait(?Send)]
pub trait RegimeSource {
    /// Location of the document.
    fn document_url(&self) -> &Url;
    /// Fetch change indicators without downloading the body.
    async fn probe(&self) -> Result<RemoteMeta, TransportError>;
    /// Download the full document.
    async fn fetch_document(&self) -> Result<Vec<u8>, TransportError>;
}

/// HTTP implementation of [`RegimeSource`].
#[derive(Debug, Clone)]
pub struct HttpRegimeSource {
    transport: HttpTransport,
    document_url: Url,
}

impl HttpRegimeSource {
    /// Build a source for the document at `document_url`.
    ///
    /// # Errors
    /// Fails when the URL is invalid or the HTTP client cannot be built.
    pub fn new(document_url: &str, config: HttpSourceConfig) -> Result<Self, SourceSetupError> {
        let url = Url::parse(document_url).map_err(|source| ParseError::BaseUrl {
            url: document_url.to_owned(),
            source,
        })?;
        Ok(Self {
            transport: HttpTransport::new(config)?,
            document_url: url,
        })
    }
}

#[async_trait(?Send)]
impl RegimeSource for HttpRegimeSource {
    fn document_url(&self) -> &Url {
        &self.document_url
    }

    async fn probe(&self) -> Result<RemoteMeta, TransportError> {
        self.transport.head(self.document_url.as_str()).await
    }

    async fn fetch_document(&self) -> Result<Vec<u8>, TransportError> {
        self.transport.get_bytes(self.document_url.as_str()).await
    }
}
