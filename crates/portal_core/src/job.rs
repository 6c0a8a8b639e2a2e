use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable carrying the JSON-encoded job into a worker.
pub const JOB_ENV_VAR: &str = "AGENT_JOB";

/// Environment variable carrying the persistent profile directory.
pub const PROFILE_ENV_VAR: &str = "BROWSER_PROFILE_PATH";

/// A form value as supplied by the caller: either free text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Extract,
    FillForm,
    Scrape,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Extract => "extract",
            JobKind::FillForm => "fill_form",
            JobKind::Scrape => "scrape",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of requested automation work.
///
/// Serialized form is the worker's job input:
/// `{ "mode": "extract"|"scrape"|"fill_form", "url"?, "urls"?, "traverse"?, "values"? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum JobSpec {
    Extract {
        url: String,
    },
    FillForm {
        url: String,
        #[serde(default, rename = "values")]
        field_values: BTreeMap<String, FieldValue>,
    },
    Scrape {
        #[serde(default)]
        urls: Vec<String>,
        #[serde(default)]
        traverse: bool,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JobSpecError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported scheme {scheme:?} in {url:?} (expected http or https)")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("scrape job requires at least one url")]
    NoUrls,
    #[error("malformed job description: {0}")]
    Malformed(String),
}

impl JobSpec {
    pub fn extract(url: impl Into<String>) -> Result<Self, JobSpecError> {
        let job = JobSpec::Extract { url: url.into() };
        job.validate()?;
        Ok(job)
    }

    pub fn fill_form(
        url: impl Into<String>,
        field_values: BTreeMap<String, FieldValue>,
    ) -> Result<Self, JobSpecError> {
        let job = JobSpec::FillForm {
            url: url.into(),
            field_values,
        };
        job.validate()?;
        Ok(job)
    }

    pub fn scrape(urls: Vec<String>, traverse: bool) -> Result<Self, JobSpecError> {
        let job = JobSpec::Scrape { urls, traverse };
        job.validate()?;
        Ok(job)
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobSpec::Extract { .. } => JobKind::Extract,
            JobSpec::FillForm { .. } => JobKind::FillForm,
            JobSpec::Scrape { .. } => JobKind::Scrape,
        }
    }

    /// The first URL the job navigates to.
    pub fn primary_url(&self) -> Option<&str> {
        match self {
            JobSpec::Extract { url } | JobSpec::FillForm { url, .. } => Some(url),
            JobSpec::Scrape { urls, .. } => urls.first().map(String::as_str),
        }
    }

    /// Checks every URL is an absolute http(s) URL; `field_values` may be empty.
    pub fn validate(&self) -> Result<(), JobSpecError> {
        match self {
            JobSpec::Extract { url } | JobSpec::FillForm { url, .. } => check_url(url),
            JobSpec::Scrape { urls, .. } => {
                if urls.is_empty() {
                    return Err(JobSpecError::NoUrls);
                }
                urls.iter().try_for_each(|url| check_url(url))
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses and validates a job description as found in [`JOB_ENV_VAR`].
    pub fn from_json(raw: &str) -> Result<Self, JobSpecError> {
        let job: JobSpec =
            serde_json::from_str(raw.trim()).map_err(|err| JobSpecError::Malformed(err.to_string()))?;
        job.validate()?;
        Ok(job)
    }
}

fn check_url(raw: &str) -> Result<(), JobSpecError> {
    let parsed = Url::parse(raw).map_err(|err| JobSpecError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(JobSpecError::UnsupportedScheme {
            url: raw.to_string(),
            scheme: other.to_string(),
        }),
    }
}
