//! Bounded, loop-safe traversal over one page session.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use portal_core::{PageRecord, ScrapeResult, DEFAULT_MAX_TEXT_CHARS};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::document::resolve_url;
use crate::{PageSession, ProgressSink};

const EXCLUDED_PATH_MARKERS: [&str; 2] = ["logout", "sign_out"];

/// How a candidate link's host must relate to the seed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPolicy {
    /// The seed host itself or any subdomain of it.
    #[default]
    SameHostOrSubdomain,
    /// Any host containing the seed host as a substring.
    Substring,
}

impl HostPolicy {
    pub fn admits(self, seed_host: &str, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            HostPolicy::SameHostOrSubdomain => {
                host == seed_host
                    || host
                        .strip_suffix(seed_host)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            HostPolicy::Substring => host.contains(seed_host),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Upper bound on pages visited, seed included.
    pub max_pages: usize,
    /// Link layers followed from the seed. 0 visits the seed only.
    pub max_hops: usize,
    #[serde(with = "duration_secs")]
    pub nav_timeout: Duration,
    pub max_text_chars: usize,
    pub host_policy: HostPolicy,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: 25,
            max_hops: 1,
            nav_timeout: Duration::from_secs(15),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            host_policy: HostPolicy::default(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrawlError {
    #[error("seed url {url} is not an http(s) url with a host")]
    InvalidSeed { url: String },
    #[error("seed {url} could not be loaded: {message}")]
    SeedUnreachable { url: String, message: String },
}

/// Decides which discovered links are worth visiting.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    seed_host: String,
    policy: HostPolicy,
}

impl LinkFilter {
    pub fn new(seed_host: &str, policy: HostPolicy) -> Self {
        Self {
            seed_host: seed_host.to_ascii_lowercase(),
            policy,
        }
    }

    /// Builds a filter for the host of `seed`.
    pub fn for_seed(seed: &str, policy: HostPolicy) -> Result<Self, CrawlError> {
        let invalid = || CrawlError::InvalidSeed {
            url: seed.to_string(),
        };
        let url = Url::parse(seed).map_err(|_| invalid())?;
        if !is_web_scheme(&url) {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?;
        Ok(Self::new(host, policy))
    }

    /// Resolves `href` against `base` and returns it if it qualifies.
    pub fn qualify(&self, href: &str, base: Option<&Url>) -> Option<Url> {
        let url = resolve_url(href, base)?;
        if !is_web_scheme(&url) {
            return None;
        }
        let host = url.host_str()?;
        if !self.policy.admits(&self.seed_host, host) {
            return None;
        }
        let path = url.path().to_ascii_lowercase();
        if EXCLUDED_PATH_MARKERS.iter().any(|marker| path.contains(marker)) {
            return None;
        }
        Some(url)
    }
}

fn is_web_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

#[derive(Debug, Clone, Default)]
pub struct Crawler {
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(settings: CrawlSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Visits `urls` in order, one record each. Failures become error records.
    pub async fn visit_all(
        &self,
        session: &mut dyn PageSession,
        urls: &[String],
        sink: &dyn ProgressSink,
    ) -> ScrapeResult {
        let mut pages = Vec::with_capacity(urls.len());
        for url in urls {
            pages.push(self.visit(session, url, sink).await);
        }
        ScrapeResult { pages }
    }

    /// Visits the seed and the qualifying pages reachable from it, breadth
    /// first, never more than `max_pages` and never the same URL twice.
    pub async fn crawl(
        &self,
        session: &mut dyn PageSession,
        seed: &str,
        sink: &dyn ProgressSink,
    ) -> Result<ScrapeResult, CrawlError> {
        let filter = LinkFilter::for_seed(seed, self.settings.host_policy)?;
        if self.settings.max_pages == 0 {
            engine_warn!("Page cap is 0; not visiting {}", seed);
            return Ok(ScrapeResult { pages: Vec::new() });
        }
        let mut frontier = Frontier::new(self.settings.max_pages);
        frontier.mark_seen(seed);
        if let Ok(normalised) = Url::parse(seed) {
            frontier.mark_seen(normalised.as_str());
        }

        let seed_record = self.visit(session, seed, sink).await;
        if let Some(landed) = session.current_url() {
            frontier.mark_seen(&landed);
        }
        let seed_error = seed_record.error.clone();
        let mut pages = vec![seed_record];

        if self.settings.max_pages > 1 && self.settings.max_hops > 0 {
            match session.anchor_hrefs().await {
                Ok(hrefs) => {
                    let base = page_base(session, seed);
                    frontier.offer(&filter, &hrefs, base.as_ref(), 1, pages.len());
                }
                Err(err) => match seed_error {
                    Some(message) => {
                        return Err(CrawlError::SeedUnreachable {
                            url: seed.to_string(),
                            message,
                        })
                    }
                    None => engine_warn!("No links readable on {}: {}", seed, err),
                },
            }
        } else if let Some(message) = seed_error {
            if session.current_url().is_none() {
                return Err(CrawlError::SeedUnreachable {
                    url: seed.to_string(),
                    message,
                });
            }
        }

        engine_info!("Found {} links to visit from {}", frontier.len(), seed);
        sink.emit(&format!("Found {} links to visit", frontier.len()));

        while let Some((url, depth)) = frontier.pop() {
            if pages.len() >= self.settings.max_pages {
                break;
            }
            let record = self.visit(session, &url, sink).await;
            let failed = record.is_error();
            pages.push(record);

            if failed || depth >= self.settings.max_hops {
                continue;
            }
            match session.anchor_hrefs().await {
                Ok(hrefs) => {
                    let base = page_base(session, &url);
                    frontier.offer(&filter, &hrefs, base.as_ref(), depth + 1, pages.len());
                }
                Err(err) => engine_warn!("No links readable on {}: {}", url, err),
            }
        }

        engine_info!("Crawl from {} finished with {} pages", seed, pages.len());
        Ok(ScrapeResult { pages })
    }

    async fn visit(&self, session: &mut dyn PageSession, url: &str, sink: &dyn ProgressSink) -> PageRecord {
        sink.emit(&format!("Navigating to {url}"));
        if let Err(err) = session.goto(url, self.settings.nav_timeout).await {
            engine_warn!("Navigation to {} failed: {}", url, err);
            sink.emit(&format!("Failed to load {url}: {err}"));
            return PageRecord::failure(url, err.to_string());
        }
        let title = match session.title().await {
            Ok(title) => title,
            Err(err) => return PageRecord::failure(url, err.to_string()),
        };
        let text = match session.body_text().await {
            Ok(text) => text,
            Err(err) => return PageRecord::failure(url, err.to_string()),
        };
        engine_debug!("Visited {} ({} chars)", url, text.len());
        PageRecord::success(url, title, &text, self.settings.max_text_chars)
    }
}

fn page_base(session: &dyn PageSession, fallback: &str) -> Option<Url> {
    session
        .current_url()
        .and_then(|url| Url::parse(&url).ok())
        .or_else(|| Url::parse(fallback).ok())
}

/// Pending URLs plus everything ever queued or visited.
struct Frontier {
    queue: VecDeque<(String, usize)>,
    seen: HashSet<String>,
    max_pages: usize,
}

impl Frontier {
    fn new(max_pages: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            max_pages,
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn mark_seen(&mut self, url: &str) {
        self.seen.insert(url.to_string());
    }

    fn pop(&mut self) -> Option<(String, usize)> {
        self.queue.pop_front()
    }

    /// Queues qualifying candidates while visited plus queued stays under the cap.
    fn offer(&mut self, filter: &LinkFilter, hrefs: &[String], base: Option<&Url>, depth: usize, visited: usize) {
        for href in hrefs {
            if visited + self.queue.len() >= self.max_pages {
                break;
            }
            let Some(url) = filter.qualify(href, base) else {
                continue;
            };
            let key = String::from(url);
            if self.seen.insert(key.clone()) {
                self.queue.push_back((key, depth));
            }
        }
    }
}
