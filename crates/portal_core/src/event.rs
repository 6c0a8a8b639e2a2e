use serde_json::Value;

/// Event produced while a worker runs, delivered in emission order.
///
/// A run yields zero or more `Log`, at most one `Result`, then exactly one `End`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Log { text: String },
    Result { payload: Value },
    /// Worker exited. `exit_code` is `None` when it was killed by a signal.
    End { exit_code: Option<i32> },
}

impl ProcessEvent {
    pub fn log(text: impl Into<String>) -> Self {
        ProcessEvent::Log { text: text.into() }
    }

    /// `End` closes the stream; no event follows it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessEvent::End { .. })
    }
}
