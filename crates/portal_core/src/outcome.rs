use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{ExtractResult, FillFormResult, JobKind, ScrapeResult};

/// The result payload a worker reported for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    kind: JobKind,
    payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("outcome belongs to a {actual} job, not {expected}")]
    KindMismatch { expected: JobKind, actual: JobKind },
    #[error("result payload has an unexpected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

impl JobOutcome {
    pub fn new(kind: JobKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn extract(&self) -> Result<ExtractResult, OutcomeError> {
        self.decode(JobKind::Extract, &self.payload)
    }

    /// Accepts both `{pages}` and the older `{context: {pages}}` wrapping.
    pub fn scrape(&self) -> Result<ScrapeResult, OutcomeError> {
        let body = match self.payload.get("context") {
            Some(context) if context.is_object() => context,
            _ => &self.payload,
        };
        self.decode(JobKind::Scrape, body)
    }

    pub fn fill_form(&self) -> Result<FillFormResult, OutcomeError> {
        self.decode(JobKind::FillForm, &self.payload)
    }

    fn decode<T: DeserializeOwned>(&self, expected: JobKind, body: &Value) -> Result<T, OutcomeError> {
        if self.kind != expected {
            return Err(OutcomeError::KindMismatch {
                expected,
                actual: self.kind,
            });
        }
        Ok(T::deserialize(body)?)
    }
}
