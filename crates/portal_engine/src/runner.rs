//! Drives one worker process per job under the profile lock.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, SecondsFormat, Utc};
use engine_logging::{engine_debug, engine_info, engine_warn};
use portal_core::{
    classify_line, JobKind, JobOutcome, JobSpec, JobSpecError, LineBuffer, LineKind, ProcessEvent,
    JOB_ENV_VAR, PROFILE_ENV_VAR,
};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::{LockError, LockManager};

const READ_CHUNK: usize = 8 * 1024;
pub const DEFAULT_LOG_TAIL: usize = 20;

/// Program and arguments used to start a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The running executable in worker mode.
    pub fn current_exe_worker() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }

    fn display(&self) -> String {
        self.program.display().to_string()
    }
}

/// Worker program per job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPrograms {
    pub extract: WorkerCommand,
    pub fill_form: WorkerCommand,
    pub scrape: WorkerCommand,
}

impl WorkerPrograms {
    pub fn uniform(command: WorkerCommand) -> Self {
        Self {
            extract: command.clone(),
            fill_form: command.clone(),
            scrape: command,
        }
    }

    pub fn for_kind(&self, kind: JobKind) -> &WorkerCommand {
        match kind {
            JobKind::Extract => &self.extract,
            JobKind::FillForm => &self.fill_form,
            JobKind::Scrape => &self.scrape,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub profile_dir: PathBuf,
    pub programs: WorkerPrograms,
    /// Log lines kept for failure reports.
    pub log_tail: usize,
}

impl RunnerConfig {
    pub fn new(profile_dir: impl Into<PathBuf>, programs: WorkerPrograms) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            programs,
            log_tail: DEFAULT_LOG_TAIL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid job: {0}")]
    InvalidJob(#[from] JobSpecError),
    #[error(
        "browser session already in use by process {pid} (since {}); close that process or delete {} if it is gone",
        .since.to_rfc3339_opts(SecondsFormat::Secs, true),
        .lock_path.display()
    )]
    SessionBusy {
        pid: u32,
        since: DateTime<Utc>,
        lock_path: PathBuf,
    },
    #[error("profile directory unusable: {0}")]
    ProfileUnavailable(String),
    #[error("failed to start worker {program}: {message}")]
    SpawnFailed { program: String, message: String },
    #[error("worker exited with code {exit_code} without reporting a result{}", format_tail(.tail))]
    NoResult { exit_code: i32, tail: Vec<String> },
    #[error(
        "worker {} without reporting a result{}",
        describe_exit(.exit_code),
        format_tail(.tail)
    )]
    WorkerNonZeroExit {
        exit_code: Option<i32>,
        tail: Vec<String>,
    },
}

impl RunError {
    /// Last log lines captured before the worker exited, if any.
    pub fn tail(&self) -> &[String] {
        match self {
            RunError::NoResult { tail, .. } | RunError::WorkerNonZeroExit { tail, .. } => tail,
            _ => &[],
        }
    }
}

impl From<LockError> for RunError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::SessionBusy {
                pid,
                since,
                lock_path,
            } => RunError::SessionBusy {
                pid,
                since,
                lock_path,
            },
            other @ LockError::Unwritable { .. } => RunError::ProfileUnavailable(other.to_string()),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn format_tail(tail: &[String]) -> String {
    if tail.is_empty() {
        return String::new();
    }
    format!("; last output:\n  {}", tail.join("\n  "))
}

/// Bounded record of recent log lines.
struct LogTail {
    lines: VecDeque<String>,
    cap: usize,
}

impl LogTail {
    fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            cap,
        }
    }

    fn push(&mut self, line: &str) {
        if self.cap == 0 {
            return;
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}

#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    locks: LockManager,
}

impl Runner {
    pub fn new(config: RunnerConfig, locks: LockManager) -> Self {
        Self { config, locks }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn profile_dir(&self) -> &Path {
        &self.config.profile_dir
    }

    /// Runs `job` to completion, reporting every event to `on_event`.
    ///
    /// The profile lock is held for the lifetime of the worker and released on
    /// every path out of this function, including cancellation.
    pub async fn run<F>(&self, job: JobSpec, mut on_event: F) -> Result<JobOutcome, RunError>
    where
        F: FnMut(&ProcessEvent) + Send,
    {
        job.validate()?;
        let profile_dir = &self.config.profile_dir;
        let lease = self.locks.acquire(profile_dir)?;
        if let Some(reason) = self.locks.clear_stale_engine_artifacts(profile_dir).warning() {
            engine_warn!("Engine marker cleanup: {}", reason);
        }

        let result = self.drive(&job, &mut on_event).await;

        let _ = lease.release();
        result
    }

    async fn drive<F>(&self, job: &JobSpec, on_event: &mut F) -> Result<JobOutcome, RunError>
    where
        F: FnMut(&ProcessEvent) + Send,
    {
        let kind = job.kind();
        let command = self.config.programs.for_kind(kind);
        let spawn_failed = |message: String| RunError::SpawnFailed {
            program: command.display(),
            message,
        };
        let payload = job.to_json().map_err(|err| spawn_failed(err.to_string()))?;

        engine_info!("Starting {} worker: {}", kind, command.display());
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .env(JOB_ENV_VAR, payload)
            .env(PROFILE_ENV_VAR, &self.config.profile_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| spawn_failed(err.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_lines(stderr, tx.clone())));
        }
        drop(tx);

        let mut result: Option<Value> = None;
        let mut tail = LogTail::new(self.config.log_tail);
        while let Some(line) = rx.recv().await {
            match classify_line(&line) {
                LineKind::Blank => {}
                LineKind::Result(payload) => {
                    if result.is_some() {
                        engine_warn!("Worker reported more than one result; keeping the latest");
                    }
                    on_event(&ProcessEvent::Result {
                        payload: payload.clone(),
                    });
                    result = Some(payload);
                }
                LineKind::Malformed { text, reason } => {
                    engine_debug!("Unparseable structured line from worker: {}", reason);
                    tail.push(&text);
                    on_event(&ProcessEvent::Log { text });
                }
                LineKind::Log(text) => {
                    tail.push(&text);
                    on_event(&ProcessEvent::Log { text });
                }
            }
        }
        for reader in readers {
            if let Err(err) = reader.await {
                engine_warn!("Worker output reader stopped abnormally: {}", err);
            }
        }

        let exit_code = match child.wait().await {
            Ok(status) => status.code(),
            Err(err) => {
                engine_warn!("Could not collect worker exit status: {}", err);
                None
            }
        };
        on_event(&ProcessEvent::End { exit_code });

        match (result, exit_code) {
            (Some(payload), code) => {
                if code != Some(0) {
                    engine_warn!(
                        "{} worker {} after reporting a result",
                        kind,
                        describe_exit(&code)
                    );
                }
                Ok(JobOutcome::new(kind, payload))
            }
            (None, Some(0)) => Err(RunError::NoResult {
                exit_code: 0,
                tail: tail.into_vec(),
            }),
            (None, exit_code) => Err(RunError::WorkerNonZeroExit {
                exit_code,
                tail: tail.into_vec(),
            }),
        }
    }
}

/// Splits one output stream into lines and forwards them, flushing any
/// unterminated tail once the stream closes.
async fn pump_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for line in buffer.push(&chunk[..n]) {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                engine_warn!("Reading worker output failed: {}", err);
                break;
            }
        }
    }
    if let Some(rest) = buffer.finish() {
        let _ = tx.send(rest);
    }
}
