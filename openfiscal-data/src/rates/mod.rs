//! Rate-table source: a directory of per-jurisdiction CSV files.

mod parse;

use async_trait::async_trait;
use url::Url;

use crate::error::{ParseError, SourceSetupError, TransportError};
use crate::http::{HttpSourceConfig, HttpTransport};

pub use parse::{
    ListedFile, ParsedRateFile, jurisdiction_from_file_name, parse_listing, parse_rate_file,
};

/// Directory published by the rate-table maintainers.
pub const DEFAULT_RATE_DIRECTORY_URL: &str =
    "http://svn.code.sf.net/p/acbr/code/trunk2/Exemplos/ACBrTCP/ACBrIBPTax/tabela/";

/// Retrieval half of the rate-table fetcher.
#[async_trait(?Send)]
pub trait RateTableSource {
    /// Location of the directory listing.
    fn directory_url(&self) -> &Url;
    /// Fetch the listing page and return the CSV files it advertises.
    async fn list_files(&self) -> Result<Vec<ListedFile>, TransportError>;
    /// Download the raw bytes of one listed file.
    async fn fetch_file(&self, file: &ListedFile) -> Result<Vec<u8>, TransportError>;
}

/// HTTP implementation of [`RateTableSource`].
#[derive(Debug, Clone)]
pub struct HttpRateTableSource {
    transport: HttpTransport,
    directory_url: Url,
}

impl HttpRateTableSource {
    /// Build a source for the directory at `directory_url`.
    ///
    /// A trailing slash is appended when missing so relative links resolve
    /// inside the directory.
    ///
    /// # Errors
    /// Fails when the URL is invalid or the HTTP client cannot be built.
    pub fn new(
        directory_url: &str,
        config: HttpSourceConfig,
    ) -> Result<Self, SourceSetupError> {
        let normalised = if directory_url.ends_with('/') {
            directory_url.to_owned()
        } else {
            format!("{directory_url}/")
        };
        let url = Url::parse(&normalised).map_err(|source| ParseError::BaseUrl {
            url: directory_url.to_owned(),
            source,
        })?;
        Ok(Self {
            transport: HttpTransport::new(config)?,
            directory_url: url,
        })
    }
}

#[async_trait(?Send)]
impl RateTableSource for HttpRateTableSource {
    fn directory_url(&self) -> &Url {
        &self.directory_url
    }

    async fn list_files(&self) -> Result<Vec<ListedFile>, TransportError> {
        let body = self.transport.get_bytes(self.directory_url.as_str()).await?;
        let html = String::from_utf8_lossy(&body);
        Ok(parse_listing(&html, &self.directory_url))
    }

    async fn fetch_file(&self, file: &ListedFile) -> Result<Vec<u8>, TransportError> {
        self.transport.get_bytes(&file.url).await
    }
}
