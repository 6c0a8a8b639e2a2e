//! Course and assignment discovery from scraped portal pages.
//!
//! Tuned for D2L-style portals (`/d2l/home/<id>`, `/d2l/le/content/<id>/...`)
//! but tolerant of generic LMS pages.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{truncate_chars, PageRecord};

const TITLE_SCAN_CHARS: usize = 500;
const MAX_HEADING_CHARS: usize = 120;
const DESCRIPTION_CHARS: usize = 300;

static COURSE_HOME: LazyLock<Regex> = LazyLock::new(|| compile(r"/d2l/home/(\d+)"));
static COURSE_TOOL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"/d2l/le/(?:content|dropbox)/(\d+)"));
static COURSE_TITLE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\s*[-–—|]\s*(Dashboard|Home|Content|Assignments|Dropbox|Grades|Discussions?|Quizzes?)$",
    )
});
static ASSIGNMENT_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)/dropbox/|/assignments?/|assignment"));
static ASSIGNMENT_WORDS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)assignment|dropbox|due\s*date|submit"));
static GENERIC_TITLE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)^(Dashboard|Home|Content|Grades|Discussions?)$"));
static ASSIGNMENT_TITLE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\s*[-–—|]\s*(Dropbox|Assignments?)$"));
static DUE_DATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Due\s*:?\s*([A-Za-z]+\s+\d{1,2},?\s*\d{4})",
        r"(?i)Due\s*date\s*:?\s*([A-Za-z]+\s+\d{1,2},?\s*\d{4})",
        r"Due\s*:?\s*(\d{1,2}/\d{1,2}/\d{2,4})",
        r"(?i)(\d{1,2}\s+[A-Za-z]+\s+\d{4})\s*[-–—]?\s*(?:due|deadline)",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

fn compile(pattern: &str) -> Regex {
    // Patterns are literals above; a failure here is a programming error.
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid built-in pattern {pattern}: {err}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assignment {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCourses {
    pub courses: Vec<Course>,
    pub assignments: Vec<Assignment>,
}

/// Derives courses and assignments from pages. Error pages are skipped.
pub fn parse_courses_and_assignments(pages: &[PageRecord]) -> ParsedCourses {
    let mut courses = CourseTable::default();
    let mut assignments = Vec::new();

    for page in pages.iter().filter(|p| !p.is_error()) {
        let home_id = capture(&COURSE_HOME, &page.url);
        if let Some(id) = &home_id {
            let name = course_name_from_title(&page.title).unwrap_or_else(|| placeholder_name(id));
            courses.record(id, name, &page.url);
        }

        let course_id = capture(&COURSE_TOOL, &page.url).or(home_id);
        let combined = format!("{}\n{}", page.title, page.text);
        if !ASSIGNMENT_URL.is_match(&page.url) && !ASSIGNMENT_WORDS.is_match(&combined) {
            continue;
        }
        let Some(title) = assignment_title(page) else {
            continue;
        };
        let course_name = course_id
            .as_deref()
            .and_then(|id| courses.get(id))
            .map(|course| course.name.clone());
        let description = truncate_chars(&page.text, DESCRIPTION_CHARS).trim().to_string();
        assignments.push(Assignment {
            title,
            course_id,
            course_name,
            url: Some(page.url.clone()),
            due_date: due_date(&combined),
            description: (!description.is_empty()).then_some(description),
        });
    }

    for assignment in &assignments {
        if let (Some(id), Some(name)) = (&assignment.course_id, &assignment.course_name) {
            if courses.get(id).is_none() {
                courses.insert(Course {
                    id: id.clone(),
                    name: name.clone(),
                    url: None,
                });
            }
        }
    }

    ParsedCourses {
        courses: courses.into_vec(),
        assignments,
    }
}

/// Courses in first-seen order.
#[derive(Default)]
struct CourseTable {
    order: Vec<Course>,
    index: HashMap<String, usize>,
}

impl CourseTable {
    fn get(&self, id: &str) -> Option<&Course> {
        self.index.get(id).map(|&i| &self.order[i])
    }

    fn insert(&mut self, course: Course) {
        self.index.insert(course.id.clone(), self.order.len());
        self.order.push(course);
    }

    fn record(&mut self, id: &str, name: String, url: &str) {
        match self.index.get(id) {
            Some(&i) => {
                let existing = &mut self.order[i];
                if existing.name == placeholder_name(id) || name.len() > existing.name.len() {
                    existing.name = name;
                    existing.url = Some(url.to_string());
                }
            }
            None => self.insert(Course {
                id: id.to_string(),
                name,
                url: Some(url.to_string()),
            }),
        }
    }

    fn into_vec(self) -> Vec<Course> {
        self.order
    }
}

fn placeholder_name(id: &str) -> String {
    format!("Course {id}")
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn course_name_from_title(title: &str) -> Option<String> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    let cleaned = COURSE_TITLE_SUFFIX.replace(title, "");
    let cleaned = cleaned.trim();
    let name = if cleaned.is_empty() { title } else { cleaned };
    Some(name.to_string())
}

fn assignment_title(page: &PageRecord) -> Option<String> {
    let title = page.title.trim();
    if !title.is_empty() && !GENERIC_TITLE.is_match(title) {
        let cleaned = ASSIGNMENT_TITLE_SUFFIX.replace(title, "");
        let cleaned = cleaned.trim();
        if cleaned.chars().count() > 2 {
            return Some(cleaned.to_string());
        }
    }
    let head = truncate_chars(&page.text, TITLE_SCAN_CHARS);
    let first_line = head.split('\n').next().map(str::trim).unwrap_or_default();
    if !first_line.is_empty() && first_line.chars().count() < MAX_HEADING_CHARS {
        return Some(first_line.to_string());
    }
    (!title.is_empty()).then(|| title.to_string())
}

fn due_date(text: &str) -> Option<String> {
    DUE_DATE
        .iter()
        .find_map(|re| capture(re, text))
        .map(|date| date.trim().to_string())
}
