use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

/// Receives human-readable progress lines from a running job.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &str);
}

/// Writes progress and the final result line to a worker's stdout.
pub struct LineWriterSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineWriterSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn write_result<T: Serialize>(&self, payload: &T) -> std::io::Result<()> {
        let line = portal_core::result_line(payload).map_err(std::io::Error::other)?;
        self.write_raw(&line)
    }

    fn write_raw(&self, text: &str) -> std::io::Result<()> {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

impl<W: Write + Send> ProgressSink for LineWriterSink<W> {
    fn emit(&self, message: &str) {
        // Progress must not break the line protocol; one line per message.
        let line = format!("{}\n", message.replace(['\r', '\n'], " "));
        let _ = self.write_raw(&line);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _message: &str) {}
}
