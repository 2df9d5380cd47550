use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::interactive::InteractiveElement;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    #[default]
    Draft,
    Published,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "draft",
            CourseStatus::Published => "published",
        }
    }
}

impl FromStr for CourseStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CourseStatus::Draft),
            "published" => Ok(CourseStatus::Published),
            other => Err(ParseEnumError { kind: "course status", value: other.into() }),
        }
    }
}

/// Bloom's taxonomy level of a lesson, ordered from lowest to highest cognitive demand.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyLevel {
    Remember,
    #[default]
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl TaxonomyLevel {
    pub const ALL: [TaxonomyLevel; 6] = [
        TaxonomyLevel::Remember,
        TaxonomyLevel::Understand,
        TaxonomyLevel::Apply,
        TaxonomyLevel::Analyze,
        TaxonomyLevel::Evaluate,
        TaxonomyLevel::Create,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyLevel::Remember => "remember",
            TaxonomyLevel::Understand => "understand",
            TaxonomyLevel::Apply => "apply",
            TaxonomyLevel::Analyze => "analyze",
            TaxonomyLevel::Evaluate => "evaluate",
            TaxonomyLevel::Create => "create",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyLevel::Remember => "Remember",
            TaxonomyLevel::Understand => "Understand",
            TaxonomyLevel::Apply => "Apply",
            TaxonomyLevel::Analyze => "Analyze",
            TaxonomyLevel::Evaluate => "Evaluate",
            TaxonomyLevel::Create => "Create",
        }
    }
}

impl fmt::Display for TaxonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxonomyLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaxonomyLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "taxonomy level", value: s.into() })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    #[default]
    Enrolled,
    InProgress,
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Enrolled => "enrolled",
            EnrollmentStatus::InProgress => "in_progress",
            EnrollmentStatus::Completed => "completed",
        }
    }
}

impl FromStr for EnrollmentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enrolled" => Ok(EnrollmentStatus::Enrolled),
            "in_progress" => Ok(EnrollmentStatus::InProgress),
            "completed" => Ok(EnrollmentStatus::Completed),
            other => Err(ParseEnumError { kind: "enrollment status", value: other.into() }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: CourseStatus,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub order: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub content: Option<String>,
    pub order: i32,
    pub duration: Option<i32>,
    pub taxonomy_level: TaxonomyLevel,
    #[serde(default)]
    pub interactive_elements: Vec<InteractiveElement>,
}

impl Lesson {
    /// True when the lesson carries non-blank HTML content.
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub status: EnrollmentStatus,
    pub progress: i32,
    pub enrolled_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// --- hydrated views ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTree {
    #[serde(flatten)]
    pub module: Module,
    pub lessons: Vec<Lesson>,
}

/// A course with its modules and lessons loaded and sorted by `order`.
///
/// This is an owned snapshot: exporters render from it without touching the store again.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseTree {
    #[serde(flatten)]
    pub course: Course,
    pub modules: Vec<ModuleTree>,
}

impl CourseTree {
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.modules.iter().flat_map(|m| m.lessons.iter())
    }

    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }

    pub fn lessons_with_content(&self) -> usize {
        self.lessons().filter(|l| l.has_content()).count()
    }

    /// Every lesson in every module has content. Vacuously true without lessons.
    pub fn is_complete(&self) -> bool {
        self.lessons().all(Lesson::has_content)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseWithEnrollment {
    #[serde(flatten)]
    pub course: Course,
    pub is_enrolled: bool,
    pub enrollment: Option<Enrollment>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Completeness {
    pub complete: bool,
    pub total_lessons: usize,
    pub lessons_with_content: usize,
}

impl From<&CourseTree> for Completeness {
    fn from(tree: &CourseTree) -> Self {
        Completeness {
            complete: tree.is_complete(),
            total_lessons: tree.lesson_count(),
            lessons_with_content: tree.lessons_with_content(),
        }
    }
}

// --- inputs ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Option<CourseStatus>,
    pub cover_image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoursePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<CourseStatus>,
    pub cover_image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewModule {
    pub title: String,
    pub description: Option<String>,
    /// Appended after the last sibling when absent.
    pub order: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModulePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub order: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub title: String,
    pub content: Option<String>,
    pub order: Option<i32>,
    pub duration: Option<i32>,
    pub taxonomy_level: Option<TaxonomyLevel>,
    pub interactive_elements: Option<Vec<InteractiveElement>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LessonPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub order: Option<i32>,
    pub duration: Option<i32>,
    pub taxonomy_level: Option<TaxonomyLevel>,
    pub interactive_elements: Option<Vec<InteractiveElement>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewEnrollment {
    pub user_id: i64,
    pub course_id: i64,
    pub status: Option<EnrollmentStatus>,
    pub progress: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentPatch {
    pub status: Option<EnrollmentStatus>,
    pub progress: Option<i32>,
}

// --- course outline payload (POST /api/courses) ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    pub course: OutlineCourse,
    #[serde(default)]
    pub modules: Vec<OutlineModule>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OutlineCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub cover_image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutlineModule {
    pub title: String,
    pub description: Option<String>,
    pub order: Option<i32>,
    #[serde(default)]
    pub lessons: Vec<OutlineLesson>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutlineLesson {
    pub title: String,
    pub content: Option<String>,
    pub order: Option<i32>,
    pub duration: Option<i32>,
    pub taxonomy_level: Option<TaxonomyLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(id: i64, content: Option<&str>) -> Lesson {
        Lesson {
            id,
            module_id: 1,
            title: format!("Lesson {id}"),
            content: content.map(String::from),
            order: 0,
            duration: None,
            taxonomy_level: TaxonomyLevel::default(),
            interactive_elements: vec![],
        }
    }

    fn tree(lessons: Vec<Lesson>) -> CourseTree {
        let now = Utc::now();
        CourseTree {
            course: Course {
                id: 1,
                title: "Course".into(),
                description: String::new(),
                status: CourseStatus::Draft,
                cover_image: None,
                created_at: now,
                updated_at: now,
            },
            modules: vec![ModuleTree {
                module: Module { id: 1, course_id: 1, title: "M".into(), description: None, order: 0 },
                lessons,
            }],
        }
    }

    #[test]
    fn taxonomy_levels_are_ordered() {
        assert!(TaxonomyLevel::Remember < TaxonomyLevel::Understand);
        assert!(TaxonomyLevel::Evaluate < TaxonomyLevel::Create);
        assert_eq!("analyze".parse::<TaxonomyLevel>().unwrap(), TaxonomyLevel::Analyze);
        assert!("memorize".parse::<TaxonomyLevel>().is_err());
    }

    #[test]
    fn completeness_requires_content_everywhere() {
        let t = tree(vec![lesson(1, Some("<p>x</p>")), lesson(2, Some("   "))]);
        assert!(!t.is_complete());
        assert_eq!(t.lessons_with_content(), 1);

        let t = tree(vec![lesson(1, Some("<p>x</p>")), lesson(2, Some("<p>y</p>"))]);
        assert!(t.is_complete());
        assert!(tree(vec![]).is_complete());
    }

    #[test]
    fn tree_serializes_flat_camel_case() {
        let t = tree(vec![lesson(7, None)]);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["title"], "Course");
        assert_eq!(v["status"], "draft");
        assert_eq!(v["modules"][0]["courseId"], 1);
        assert_eq!(v["modules"][0]["lessons"][0]["taxonomyLevel"], "understand");
    }
}
