//! In-memory sources and document builders for ingestion tests.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io;

use async_trait::async_trait;
use url::Url;

use crate::detector::RemoteMeta;
use crate::error::TransportError;
use crate::rates::{ListedFile, RateTableSource};
use crate::regimes::RegimeSource;

const STUB_DIRECTORY: &str = "https://rates.example/tabela/";
const STUB_DOCUMENT: &str = "https://regimes.example/convenio";

/// Header line of a rate file.
pub const RATE_HEADER: &str = "codigo;ex;tipo;descricao;nacionalfederal;importadosfederal;estadual;municipal;vigenciainicio;vigenciafim;chave;versao;fonte";

/// Canned response for one stubbed download.
#[derive(Debug, Clone)]
pub enum StubBody {
    /// Serve these bytes.
    Bytes(Vec<u8>),
    /// Answer with `404 Not Found`.
    Missing,
    /// Fail as if the connection dropped.
    Unreachable,
}

impl StubBody {
    fn respond(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Missing => Err(TransportError::Http {
                url: url.to_owned(),
                status: 404,
                message: "not found".to_owned(),
            }),
            Self::Unreachable => Err(TransportError::Network {
                url: url.to_owned(),
                source: io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"),
            }),
        }
    }
}

/// Stub [`RateTableSource`] serving a fixed set of files.
#[derive(Debug)]
pub struct StubRateSource {
    directory_url: Url,
    files: RefCell<Vec<(ListedFile, StubBody)>>,
    listing: RefCell<Option<StubBody>>,
    list_calls: Cell<usize>,
    fetch_calls: Cell<usize>,
}

impl Default for StubRateSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StubRateSource {
    /// Create a source with an empty listing.
    ///
    /// # Panics
    /// Never in practice; the stub directory URL is a literal.
    #[must_use]
    pub fn new() -> Self {
        #[expect(clippy::expect_used, reason = "literal URL")]
        let directory_url = Url::parse(STUB_DIRECTORY).expect("valid stub URL");
        Self {
            directory_url,
            files: RefCell::new(Vec::new()),
            listing: RefCell::new(None),
            list_calls: Cell::new(0),
            fetch_calls: Cell::new(0),
        }
    }

    /// Advertise `file_name` and serve `body` for it.
    #[must_use]
    pub fn with_file(self, file_name: &str, body: StubBody) -> Self {
        self.set_file(file_name, body);
        self
    }

    /// Add or replace the file called `file_name`.
    pub fn set_file(&self, file_name: &str, body: StubBody) {
        let listed = ListedFile {
            url: format!("{STUB_DIRECTORY}{file_name}"),
            file_name: file_name.to_owned(),
        };
        let mut files = self.files.borrow_mut();
        if let Some(slot) = files.iter_mut().find(|(file, _)| file.file_name == file_name) {
            slot.1 = body;
        } else {
            files.push((listed, body));
        }
    }

    /// Make the listing itself fail with `body` (which should not be bytes).
    pub fn fail_listing(&self, body: StubBody) {
        *self.listing.borrow_mut() = Some(body);
    }

    /// Number of listing requests served.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    /// Number of file downloads attempted.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }
}

#[async_trait(?Send)]
impl RateTableSource for StubRateSource {
    fn directory_url(&self) -> &Url {
        &self.directory_url
    }

    async fn list_files(&self) -> Result<Vec<ListedFile>, TransportError> {
        self.list_calls.set(self.list_calls.get().saturating_add(1));
        if let Some(failure) = self.listing.borrow().as_ref() {
            failure.respond(self.directory_url.as_str())?;
        }
        Ok(self
            .files
            .borrow()
            .iter()
            .map(|(file, _)| file.clone())
            .collect())
    }

    async fn fetch_file(&self, file: &ListedFile) -> Result<Vec<u8>, TransportError> {
        self.fetch_calls.set(self.fetch_calls.get().saturating_add(1));
        self.files
            .borrow()
            .iter()
            .find(|(listed, _)| listed.url == file.url)
            .map_or(StubBody::Missing, |(_, body)| body.clone())
            .respond(&file.url)
    }
}

/// Stub [`RegimeSource`] with a mutable document and probe headers.
#[derive(Debug)]
pub struct StubRegimeSource {
    document_url: Url,
    document: RefCell<StubBody>,
    remote: RefCell<Result<RemoteMeta, ()>>,
    probe_calls: Cell<usize>,
    fetch_calls: Cell<usize>,
}

impl StubRegimeSource {
    /// Serve `document` with the change indicators in `remote`.
    ///
    /// # Panics
    /// Never in practice; the stub document URL is a literal.
    #[must_use]
    pub fn new(document: StubBody, remote: RemoteMeta) -> Self {
        #[expect(clippy::expect_used, reason = "literal URL")]
        let document_url = Url::parse(STUB_DOCUMENT).expect("valid stub URL");
        Self {
            document_url,
            document: RefCell::new(document),
            remote: RefCell::new(Ok(remote)),
            probe_calls: Cell::new(0),
            fetch_calls: Cell::new(0),
        }
    }

    /// Replace the served document.
    pub fn set_document(&self, document: StubBody) {
        *self.document.borrow_mut() = document;
    }

    /// Replace the probe response.
    pub fn set_remote(&self, remote: RemoteMeta) {
        *self.remote.borrow_mut() = Ok(remote);
    }

    /// Make subsequent probes fail.
    pub fn fail_probe(&self) {
        *self.remote.borrow_mut() = Err(());
    }

    /// Number of probes issued.
    #[must_use]
    pub fn probe_calls(&self) -> usize {
        self.probe_calls.get()
    }

    /// Number of full document downloads attempted.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }
}

#[async_trait(?Send)]
impl RegimeSource for StubRegimeSource {
    fn document_url(&self) -> &Url {
        &self.document_url
    }

    async fn probe(&self) -> Result<RemoteMeta, TransportError> {
        self.probe_calls.set(self.probe_calls.get().saturating_add(1));
        self.remote
            .borrow()
            .clone()
            .map_err(|()| TransportError::Timeout {
                url: self.document_url.to_string(),
            })
    }

    async fn fetch_document(&self) -> Result<Vec<u8>, TransportError> {
        self.fetch_calls.set(self.fetch_calls.get().saturating_add(1));
        self.document.borrow().respond(self.document_url.as_str())
    }
}

/// Build a rate file body from data rows, prepending the header.
#[must_use]
pub fn rate_file(rows: &[&str]) -> StubBody {
    let mut text = String::from(RATE_HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    StubBody::Bytes(text.into_bytes())
}

/// A well-formed rate row for `product_code` with the given national rate.
#[must_use]
pub fn rate_row(product_code: &str, description: &str, national: &str) -> String {
    format!(
        "{product_code};;0;{description};{national};15,85;18,00;0,00;01/01/2026;30/06/2026;A1B2;26.1.A;IBPT"
    )
}

/// Build a regime document with one annex per `(title, rows)` entry.
///
/// Each row is `(regime code, prefix list, description)`.
#[must_use]
pub fn regime_document(annexes: &[(&str, &[(&str, &str, &str)])]) -> StubBody {
    let mut html = String::from("<html><body><p>Convênio ICMS 142/18</p>");
    for (title, rows) in annexes {
        html.push_str(&format!(r#"<p class="A6-1Subtitulo">{title}</p>"#));
        html.push_str("<table><tbody><tr><td>ITEM</td><td>CEST</td><td>NCM/SH</td><td>DESCRIÇÃO</td></tr>");
        for (item, (code, prefixes, description)) in rows.iter().enumerate() {
            html.push_str(&format!(
                "<tr><td>{item}</td><td>{code}</td><td>{prefixes}</td><td>{description}</td></tr>"
            ));
        }
        html.push_str("</tbody></table>");
    }
    html.push_str("</body></html>");
    StubBody::Bytes(html.into_bytes())
}

/// Drive `future` to completion on a fresh current-thread runtime.
///
/// # Panics
/// Panics when the runtime cannot be built.
pub fn block_on_for_tests<F: Future>(future: F) -> F::Output {
    #[expect(clippy::expect_used, reason = "test helper")]
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("build test runtime");
    runtime.block_on(future)
}
