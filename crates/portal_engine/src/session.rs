use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use engine_logging::{engine_debug, engine_warn};

use crate::decode::decode_body;
use crate::document::PageDocument;
use crate::fetch::{FetchSettings, ReqwestFetcher};
use crate::NavError;

/// One browsing context. Every operation acts on the page loaded by the
/// latest successful `goto`; `&mut self` keeps visits strictly sequential.
#[async_trait]
pub trait PageSession: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), NavError>;

    /// Final URL of the loaded page, after redirects.
    fn current_url(&self) -> Option<String>;

    async fn title(&mut self) -> Result<String, NavError>;

    async fn body_text(&mut self) -> Result<String, NavError>;

    /// Link targets on the loaded page, resolved to absolute URLs.
    async fn anchor_hrefs(&mut self) -> Result<Vec<String>, NavError>;

    /// Sets the control addressed by `[name=key]` or `#key`. Returns false
    /// when no such control exists.
    async fn fill_field(&mut self, key: &str, value: &str) -> Result<bool, NavError>;
}

struct LoadedPage {
    url: String,
    document: PageDocument,
    staged: BTreeMap<String, String>,
}

/// Static-document session backed by reqwest.
///
/// Scripts are not executed. Filled values are staged against the loaded
/// document and discarded on the next navigation.
pub struct HttpPageSession {
    fetcher: ReqwestFetcher,
    current: Option<LoadedPage>,
}

impl HttpPageSession {
    pub fn new(settings: FetchSettings) -> Self {
        Self {
            fetcher: ReqwestFetcher::new(settings),
            current: None,
        }
    }

    /// Values staged by `fill_field` on the current page.
    pub fn staged_values(&self) -> Option<&BTreeMap<String, String>> {
        self.current.as_ref().map(|page| &page.staged)
    }

    fn page(&self) -> Result<&LoadedPage, NavError> {
        self.current.as_ref().ok_or_else(NavError::no_document)
    }
}

impl Default for HttpPageSession {
    fn default() -> Self {
        Self::new(FetchSettings::default())
    }
}

#[async_trait]
impl PageSession for HttpPageSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), NavError> {
        // A failed navigation leaves nothing readable behind.
        self.current = None;
        let output = self.fetcher.fetch(url, timeout).await?;
        let decoded = decode_body(&output.bytes, output.metadata.content_type.as_deref());
        if decoded.lossy {
            engine_warn!(
                "Page {} contained bytes invalid in {}; replaced",
                output.metadata.final_url,
                decoded.encoding
            );
        }
        let final_url = output.metadata.final_url;
        let document = PageDocument::parse(&decoded.html, Some(&final_url));
        engine_debug!(
            "Loaded {} ({} bytes, {} redirects, {} links)",
            final_url,
            output.metadata.byte_len,
            output.metadata.redirect_count,
            document.hrefs.len()
        );
        self.current = Some(LoadedPage {
            url: final_url,
            document,
            staged: BTreeMap::new(),
        });
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.current.as_ref().map(|page| page.url.clone())
    }

    async fn title(&mut self) -> Result<String, NavError> {
        Ok(self.page()?.document.title.clone())
    }

    async fn body_text(&mut self) -> Result<String, NavError> {
        Ok(self.page()?.document.text.clone())
    }

    async fn anchor_hrefs(&mut self) -> Result<Vec<String>, NavError> {
        Ok(self.page()?.document.hrefs.clone())
    }

    async fn fill_field(&mut self, key: &str, value: &str) -> Result<bool, NavError> {
        let page = self.current.as_mut().ok_or_else(NavError::no_document)?;
        if !page.document.has_field(key) {
            return Ok(false);
        }
        page.staged.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}
