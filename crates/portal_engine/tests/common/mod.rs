#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use portal_engine::{FailureKind, NavError, PageSession, ProgressSink};

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    pub text: String,
    pub hrefs: Vec<String>,
    pub fields: Vec<String>,
}

impl FakePage {
    pub fn new(title: &str, text: &str) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn links<I, S>(mut self, hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hrefs = hrefs.into_iter().map(Into::into).collect();
        self
    }
}

/// Scripted page session. Unknown URLs fail to load.
#[derive(Default)]
pub struct FakeSession {
    pages: HashMap<String, FakePage>,
    /// Loads fail but leave a readable partial document behind.
    partial: HashMap<String, FakePage>,
    redirects: HashMap<String, String>,
    current: Option<(String, FakePage)>,
    pub visits: Vec<String>,
    pub filled: Vec<(String, String)>,
}

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(engine_logging::initialize_for_tests);
}

impl FakeSession {
    pub fn new() -> Self {
        init_logging();
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn partial(mut self, url: &str, page: FakePage) -> Self {
        self.partial.insert(url.to_string(), page);
        self
    }

    /// Loading `from` lands on `to`.
    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), NavError> {
        self.visits.push(url.to_string());
        let landed = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        let url = landed.as_str();
        if let Some(page) = self.pages.get(url) {
            self.current = Some((url.to_string(), page.clone()));
            return Ok(());
        }
        if let Some(page) = self.partial.get(url) {
            self.current = Some((url.to_string(), page.clone()));
        } else {
            self.current = None;
        }
        Err(NavError::new(FailureKind::Timeout(timeout), format!("{url} did not load")))
    }

    fn current_url(&self) -> Option<String> {
        self.current.as_ref().map(|(url, _)| url.clone())
    }

    async fn title(&mut self) -> Result<String, NavError> {
        self.loaded().map(|page| page.title.clone())
    }

    async fn body_text(&mut self) -> Result<String, NavError> {
        self.loaded().map(|page| page.text.clone())
    }

    async fn anchor_hrefs(&mut self) -> Result<Vec<String>, NavError> {
        self.loaded().map(|page| page.hrefs.clone())
    }

    async fn fill_field(&mut self, key: &str, value: &str) -> Result<bool, NavError> {
        let found = self.loaded()?.fields.iter().any(|f| f == key);
        if found {
            self.filled.push((key.to_string(), value.to_string()));
        }
        Ok(found)
    }
}

impl FakeSession {
    fn loaded(&self) -> Result<&FakePage, NavError> {
        self.current
            .as_ref()
            .map(|(_, page)| page)
            .ok_or_else(NavError::no_document)
    }
}

#[derive(Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}
