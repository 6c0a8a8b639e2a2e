//! Runs inside the worker process: executes one job on a page session and
//! reports progress lines followed by a single result line on stdout.

use std::collections::BTreeMap;
use std::io::Write;

use engine_logging::{engine_error, engine_info, engine_warn};
use portal_core::{
    truncate_chars, ExtractResult, FillFormResult, JobSpec, JobSpecError, JOB_ENV_VAR,
};

use crate::{CrawlError, CrawlSettings, Crawler, LineWriterSink, NavError, PageSession, ProgressSink};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("no job given (AGENT_JOB is not set)")]
    MissingJob,
    #[error(transparent)]
    InvalidJob(#[from] JobSpecError),
    #[error("navigation failed: {0}")]
    Navigation(#[from] NavError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error("cannot write result: {0}")]
    Output(#[from] std::io::Error),
}

/// Reads and validates the job handed over by the runner.
pub fn job_from_env() -> Result<JobSpec, WorkerError> {
    let raw = std::env::var(JOB_ENV_VAR).map_err(|_| WorkerError::MissingJob)?;
    Ok(JobSpec::from_json(&raw)?)
}

/// Executes `job` and returns the process exit code.
///
/// On failure an `Error: ...` line is printed and no result line is written.
pub async fn run_worker<W: Write + Send>(
    job: &JobSpec,
    session: &mut dyn PageSession,
    settings: &CrawlSettings,
    out: W,
) -> i32 {
    let sink = LineWriterSink::new(out);
    match execute(job, session, settings, &sink).await {
        Ok(()) => 0,
        Err(err) => {
            engine_error!("{} job failed: {}", job.kind(), err);
            sink.emit(&format!("Error: {err}"));
            1
        }
    }
}

async fn execute<W: Write + Send>(
    job: &JobSpec,
    session: &mut dyn PageSession,
    settings: &CrawlSettings,
    sink: &LineWriterSink<W>,
) -> Result<(), WorkerError> {
    job.validate()?;
    engine_info!("Worker starting {} job", job.kind());
    sink.emit("Launching browser");

    match job {
        JobSpec::Extract { url } => {
            sink.emit(&format!("Navigating to {url}"));
            session.goto(url, settings.nav_timeout).await?;
            let title = session.title().await?;
            let text = session.body_text().await?;
            sink.emit("Done");
            sink.write_result(&ExtractResult {
                title,
                text: truncate_chars(&text, settings.max_text_chars),
            })?;
        }
        JobSpec::FillForm { url, field_values } => {
            sink.emit(&format!("Navigating to {url}"));
            session.goto(url, settings.nav_timeout).await?;
            sink.emit("Filling form");
            let mut filled = BTreeMap::new();
            for (name, value) in field_values {
                let ok = match session.fill_field(name, &value.to_string()).await {
                    Ok(found) => found,
                    Err(err) => {
                        engine_warn!("Could not fill {}: {}", name, err);
                        false
                    }
                };
                filled.insert(name.clone(), ok);
            }
            sink.emit("Done");
            sink.write_result(&FillFormResult {
                filled,
                url: url.clone(),
            })?;
        }
        JobSpec::Scrape { urls, traverse } => {
            let crawler = Crawler::new(settings.clone());
            let result = match (urls.split_first(), *traverse) {
                (Some((seed, rest)), true) => {
                    if !rest.is_empty() {
                        engine_warn!("Traversal starts from {} only; {} other urls ignored", seed, rest.len());
                    }
                    crawler.crawl(session, seed, sink).await?
                }
                _ => crawler.visit_all(session, urls, sink).await,
            };
            sink.emit("Done");
            sink.write_result(&result)?;
        }
    }
    Ok(())
}
