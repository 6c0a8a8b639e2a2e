//! Portal core: job model, worker line protocol and page records.
mod courses;
mod event;
mod job;
mod outcome;
mod page;
mod protocol;

pub use courses::{parse_courses_and_assignments, Assignment, Course, ParsedCourses};
pub use event::ProcessEvent;
pub use job::{FieldValue, JobKind, JobSpec, JobSpecError, JOB_ENV_VAR, PROFILE_ENV_VAR};
pub use outcome::{JobOutcome, OutcomeError};
pub use page::{
    truncate_chars, ExtractResult, FillFormResult, PageRecord, ScrapeResult,
    DEFAULT_MAX_TEXT_CHARS,
};
pub use protocol::{classify_line, result_line, LineBuffer, LineKind};
