use std::sync::Arc;

use engine_logging::{engine_info, engine_warn};
use portal_core::{parse_courses_and_assignments, JobKind, JobOutcome, JobSpec, ProcessEvent};

use crate::{AssignmentsStore, RunError, Runner};

/// Front door for jobs: runs them and files scraped course data away.
#[derive(Clone)]
pub struct Dispatcher {
    runner: Runner,
    store: Arc<dyn AssignmentsStore>,
}

impl Dispatcher {
    pub fn new(runner: Runner, store: Arc<dyn AssignmentsStore>) -> Self {
        Self { runner, store }
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn store(&self) -> &Arc<dyn AssignmentsStore> {
        &self.store
    }

    pub async fn dispatch<F>(&self, job: JobSpec, on_event: F) -> Result<JobOutcome, RunError>
    where
        F: FnMut(&ProcessEvent) + Send,
    {
        let outcome = self.runner.run(job, on_event).await?;
        if outcome.kind() == JobKind::Scrape {
            self.record_courses(&outcome).await;
        }
        Ok(outcome)
    }

    /// Store failures are logged and never fail the job.
    async fn record_courses(&self, outcome: &JobOutcome) {
        let pages = match outcome.scrape() {
            Ok(result) => result.pages,
            Err(err) => {
                engine_warn!("Scrape result not understood, nothing stored: {}", err);
                return;
            }
        };
        let parsed = parse_courses_and_assignments(&pages);
        let (courses, assignments) = (parsed.courses.len(), parsed.assignments.len());

        for course in parsed.courses {
            if let Err(err) = self.store.upsert_course(course).await {
                engine_warn!("Failed to store course: {}", err);
            }
        }
        for assignment in parsed.assignments {
            if let Err(err) = self.store.upsert_assignment(assignment).await {
                engine_warn!("Failed to store assignment: {}", err);
            }
        }
        engine_info!("Recorded {} courses and {} assignments", courses, assignments);
    }
}
