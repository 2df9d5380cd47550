//! Course storage abstraction.
//!
//! `CourseStore` covers course, module, lesson and enrollment CRUD. Every backend must
//! keep two invariants: deleting a course cascades to its modules, lessons and
//! enrollments, and sibling `order` values stay dense (0..n-1) after a delete.

use thiserror::Error;

use crate::models::*;

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} with ID {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    Conflict(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }
}

impl From<ParseEnumError> for StoreError {
    fn from(e: ParseEnumError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[trait_variant::make(Send)]
pub trait CourseStore: Send + Sync + 'static {
    // courses
    async fn get_course(&self, id: i64) -> StoreResult<Option<Course>>;
    async fn list_courses(&self) -> StoreResult<Vec<Course>>;
    async fn list_published(&self) -> StoreResult<Vec<Course>>;
    async fn create_course(&self, new: NewCourse) -> StoreResult<Course>;
    async fn update_course(&self, id: i64, patch: CoursePatch) -> StoreResult<Course>;
    /// Removes the course with its modules, lessons and enrollments. Missing ids are a no-op.
    async fn delete_course(&self, id: i64) -> StoreResult<()>;
    /// Course with modules and lessons, each sorted by `order` then id.
    async fn course_tree(&self, id: i64) -> StoreResult<Option<CourseTree>>;

    // modules
    async fn get_module(&self, id: i64) -> StoreResult<Option<Module>>;
    async fn list_modules(&self, course_id: i64) -> StoreResult<Vec<Module>>;
    async fn create_module(&self, course_id: i64, new: NewModule) -> StoreResult<Module>;
    async fn update_module(&self, id: i64, patch: ModulePatch) -> StoreResult<Module>;
    /// Removes the module and its lessons, then renumbers the remaining siblings.
    async fn delete_module(&self, id: i64) -> StoreResult<()>;

    // lessons
    async fn get_lesson(&self, id: i64) -> StoreResult<Option<Lesson>>;
    async fn list_lessons(&self, module_id: i64) -> StoreResult<Vec<Lesson>>;
    async fn create_lesson(&self, module_id: i64, new: NewLesson) -> StoreResult<Lesson>;
    async fn update_lesson(&self, id: i64, patch: LessonPatch) -> StoreResult<Lesson>;
    /// Removes the lesson, then renumbers the remaining siblings.
    async fn delete_lesson(&self, id: i64) -> StoreResult<()>;

    // enrollments
    async fn get_enrollment(&self, id: i64) -> StoreResult<Option<Enrollment>>;
    async fn find_enrollment(&self, user_id: i64, course_id: i64) -> StoreResult<Option<Enrollment>>;
    async fn list_enrollments_by_user(&self, user_id: i64) -> StoreResult<Vec<Enrollment>>;
    async fn create_enrollment(&self, new: NewEnrollment) -> StoreResult<Enrollment>;
    async fn update_enrollment(&self, id: i64, patch: EnrollmentPatch) -> StoreResult<Enrollment>;
    async fn delete_enrollment(&self, id: i64) -> StoreResult<()>;
}

/// Lifts a legacy embedded interactive payload out of lesson HTML.
///
/// Returns the cleaned content and, when the HTML carried a payload, the elements that
/// replace the lesson's list.
pub(crate) fn normalize_content(
    content: Option<String>,
) -> (Option<String>, Option<Vec<crate::interactive::InteractiveElement>>) {
    match content {
        Some(html) => {
            let (clean, elements) = crate::interactive::extract_embedded(&html);
            (Some(clean), elements)
        }
        None => (None, None),
    }
}

// Patch application shared by the backends. Absent fields leave the record unchanged.

pub(crate) fn apply_course_patch(course: &mut Course, patch: CoursePatch) {
    if let Some(title) = patch.title {
        course.title = title;
    }
    if let Some(description) = patch.description {
        course.description = description;
    }
    if let Some(status) = patch.status {
        course.status = status;
    }
    if patch.cover_image.is_some() {
        course.cover_image = patch.cover_image;
    }
    course.updated_at = chrono::Utc::now();
}

pub(crate) fn apply_module_patch(module: &mut Module, patch: ModulePatch) {
    if let Some(title) = patch.title {
        module.title = title;
    }
    if patch.description.is_some() {
        module.description = patch.description;
    }
    if let Some(order) = patch.order {
        module.order = order;
    }
}

pub(crate) fn apply_lesson_patch(lesson: &mut Lesson, patch: LessonPatch) {
    if let Some(title) = patch.title {
        lesson.title = title;
    }
    let has_content = patch.content.is_some();
    let (content, embedded) = normalize_content(patch.content);
    if has_content {
        lesson.content = content;
    }
    if let Some(order) = patch.order {
        lesson.order = order;
    }
    if patch.duration.is_some() {
        lesson.duration = patch.duration;
    }
    if let Some(level) = patch.taxonomy_level {
        lesson.taxonomy_level = level;
    }
    // an embedded payload wins over an explicit list
    if let Some(elements) = embedded.or(patch.interactive_elements) {
        lesson.interactive_elements = elements;
    }
}

/// Stamps `completed_at` on the transition into `Completed` and clamps progress to 0..=100.
pub(crate) fn apply_enrollment_patch(
    enrollment: &mut Enrollment,
    patch: EnrollmentPatch,
    now: chrono::DateTime<chrono::Utc>,
) {
    if let Some(status) = patch.status {
        if status == EnrollmentStatus::Completed && enrollment.status != EnrollmentStatus::Completed {
            enrollment.completed_at = Some(now);
        }
        enrollment.status = status;
    }
    if let Some(progress) = patch.progress {
        enrollment.progress = progress.clamp(0, 100);
    }
    enrollment.last_accessed_at = now;
}

/// Course-level view used by the enrollment endpoints.
pub async fn course_with_enrollment<S: CourseStore>(
    store: &S,
    course: Course,
    user_id: i64,
) -> StoreResult<CourseWithEnrollment> {
    let enrollment = store.find_enrollment(user_id, course.id).await?;
    Ok(CourseWithEnrollment { is_enrolled: enrollment.is_some(), enrollment, course })
}

/// Creates a course with its modules and lessons from an outline and returns the tree.
///
/// Outline `order` values are used as given; missing ones append in payload order.
pub async fn create_from_outline<S: CourseStore>(store: &S, outline: CourseOutline) -> StoreResult<CourseTree> {
    let course = store
        .create_course(NewCourse {
            title: outline.course.title,
            description: outline.course.description,
            status: None,
            cover_image: outline.course.cover_image,
        })
        .await?;

    for module in outline.modules {
        let created = store
            .create_module(
                course.id,
                NewModule { title: module.title, description: module.description, order: module.order },
            )
            .await?;
        for lesson in module.lessons {
            store
                .create_lesson(
                    created.id,
                    NewLesson {
                        title: lesson.title,
                        content: lesson.content,
                        order: lesson.order,
                        duration: lesson.duration,
                        taxonomy_level: lesson.taxonomy_level,
                        interactive_elements: None,
                    },
                )
                .await?;
        }
    }

    store
        .course_tree(course.id)
        .await?
        .ok_or_else(|| StoreError::not_found("Course", course.id))
}
