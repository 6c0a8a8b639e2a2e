use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use portal_core::{Assignment, Course};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("assignments store unavailable: {0}")]
    Unavailable(String),
}

/// Narrow persistence interface for scraped course data.
#[async_trait]
pub trait AssignmentsStore: Send + Sync {
    /// Inserts or replaces the course with the same id.
    async fn upsert_course(&self, course: Course) -> Result<(), StoreError>;
    /// Inserts or replaces the assignment with the same course id and title.
    async fn upsert_assignment(&self, assignment: Assignment) -> Result<(), StoreError>;
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError>;
    async fn list_assignments(&self, course_id: Option<&str>) -> Result<Vec<Assignment>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    courses: Vec<Course>,
    assignments: Vec<Assignment>,
}

/// In-process store; insertion order is kept, replacements stay in place.
#[derive(Debug, Default)]
pub struct MemoryAssignmentsStore {
    tables: Mutex<Tables>,
}

impl MemoryAssignmentsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl AssignmentsStore for MemoryAssignmentsStore {
    async fn upsert_course(&self, course: Course) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        match tables.courses.iter_mut().find(|c| c.id == course.id) {
            Some(existing) => *existing = course,
            None => tables.courses.push(course),
        }
        Ok(())
    }

    async fn upsert_assignment(&self, assignment: Assignment) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        match tables
            .assignments
            .iter_mut()
            .find(|a| a.course_id == assignment.course_id && a.title == assignment.title)
        {
            Some(existing) => *existing = assignment,
            None => tables.assignments.push(assignment),
        }
        Ok(())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        Ok(self.tables()?.courses.clone())
    }

    async fn list_assignments(&self, course_id: Option<&str>) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| course_id.is_none_or(|id| a.course_id.as_deref() == Some(id)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(course: &str, title: &str, due: Option<&str>) -> Assignment {
        Assignment {
            title: title.to_string(),
            course_id: Some(course.to_string()),
            due_date: due.map(str::to_string),
            ..Assignment::default()
        }
    }

    #[tokio::test]
    async fn assignments_are_keyed_by_course_and_title() {
        let store = MemoryAssignmentsStore::new();
        store.upsert_assignment(assignment("1", "A1", None)).await.unwrap();
        store.upsert_assignment(assignment("2", "A1", None)).await.unwrap();
        store
            .upsert_assignment(assignment("1", "A1", Some("Mar 3, 2025")))
            .await
            .unwrap();

        let all = store.list_assignments(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].due_date.as_deref(), Some("Mar 3, 2025"));

        let course_two = store.list_assignments(Some("2")).await.unwrap();
        assert_eq!(course_two.len(), 1);
    }

    #[tokio::test]
    async fn course_upsert_replaces_in_place() {
        let store = MemoryAssignmentsStore::new();
        for (id, name) in [("1", "Course 1"), ("2", "MATH 137"), ("1", "CS 135")] {
            store
                .upsert_course(Course {
                    id: id.to_string(),
                    name: name.to_string(),
                    url: None,
                })
                .await
                .unwrap();
        }
        let names: Vec<_> = store
            .list_courses()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["CS 135", "MATH 137"]);
    }
}
