//! Postgres-backed `CourseStore`.
//!
//! Cascades ride on `ON DELETE CASCADE`; renumbering after a delete runs in the same
//! transaction as the delete.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;

use super::{apply_course_patch, apply_enrollment_patch, apply_lesson_patch, apply_module_patch};
use super::{normalize_content, CourseStore, StoreError, StoreResult};
use crate::db::Db;
use crate::interactive::InteractiveElement;
use crate::models::*;

#[derive(FromRow, Debug)]
struct CourseRow {
    id: i64,
    title: String,
    description: String,
    status: String,
    cover_image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourseRow> for Course {
    type Error = StoreError;

    fn try_from(r: CourseRow) -> Result<Self, Self::Error> {
        Ok(Course {
            id: r.id,
            title: r.title,
            description: r.description,
            status: r.status.parse()?,
            cover_image: r.cover_image,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow, Debug)]
struct ModuleRow {
    id: i64,
    course_id: i64,
    title: String,
    description: Option<String>,
    position: i32,
}

impl From<ModuleRow> for Module {
    fn from(r: ModuleRow) -> Self {
        Module {
            id: r.id,
            course_id: r.course_id,
            title: r.title,
            description: r.description,
            order: r.position,
        }
    }
}

#[derive(FromRow, Debug)]
struct LessonRow {
    id: i64,
    module_id: i64,
    title: String,
    content: Option<String>,
    position: i32,
    duration: Option<i32>,
    taxonomy_level: String,
    interactive_elements: Json<Vec<InteractiveElement>>,
}

impl TryFrom<LessonRow> for Lesson {
    type Error = StoreError;

    fn try_from(r: LessonRow) -> Result<Self, Self::Error> {
        Ok(Lesson {
            id: r.id,
            module_id: r.module_id,
            title: r.title,
            content: r.content,
            order: r.position,
            duration: r.duration,
            taxonomy_level: r.taxonomy_level.parse()?,
            interactive_elements: r.interactive_elements.0,
        })
    }
}

#[derive(FromRow, Debug)]
struct EnrollmentRow {
    id: i64,
    user_id: i64,
    course_id: i64,
    status: String,
    progress: i32,
    enrolled_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = StoreError;

    fn try_from(r: EnrollmentRow) -> Result<Self, Self::Error> {
        Ok(Enrollment {
            id: r.id,
            user_id: r.user_id,
            course_id: r.course_id,
            status: r.status.parse()?,
            progress: r.progress,
            enrolled_at: r.enrolled_at,
            last_accessed_at: r.last_accessed_at,
            completed_at: r.completed_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const SELECT_COURSE: &str =
    "SELECT id, title, description, status, cover_image, created_at, updated_at FROM courses";
const SELECT_MODULE: &str = "SELECT id, course_id, title, description, position FROM modules";
const SELECT_LESSON: &str = "SELECT id, module_id, title, content, position, duration, taxonomy_level, \
     interactive_elements FROM lessons";
const SELECT_ENROLLMENT: &str = "SELECT id, user_id, course_id, status, progress, enrolled_at, \
     last_accessed_at, completed_at FROM enrollments";

pub struct PgStore {
    pool: Db,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    async fn exists(&self, table: &'static str, id: i64) -> StoreResult<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
        Ok(sqlx::query_scalar::<_, bool>(&sql).bind(id).fetch_one(&self.pool).await?)
    }
}

async fn renumber_modules(conn: &mut PgConnection, course_id: i64) -> StoreResult<()> {
    sqlx::query(
        "UPDATE modules AS m SET position = r.rn \
         FROM (SELECT id, (ROW_NUMBER() OVER (ORDER BY position, id) - 1)::int AS rn \
               FROM modules WHERE course_id = $1) AS r \
         WHERE m.id = r.id",
    )
    .bind(course_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn renumber_lessons(conn: &mut PgConnection, module_id: i64) -> StoreResult<()> {
    sqlx::query(
        "UPDATE lessons AS l SET position = r.rn \
         FROM (SELECT id, (ROW_NUMBER() OVER (ORDER BY position, id) - 1)::int AS rn \
               FROM lessons WHERE module_id = $1) AS r \
         WHERE l.id = r.id",
    )
    .bind(module_id)
    .execute(conn)
    .await?;
    Ok(())
}

impl CourseStore for PgStore {
    async fn get_course(&self, id: i64) -> StoreResult<Option<Course>> {
        let sql = format!("{SELECT_COURSE} WHERE id = $1");
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Course::try_from).transpose()
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let sql = format!("{SELECT_COURSE} ORDER BY id");
        let rows = sqlx::query_as::<_, CourseRow>(&sql).fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn list_published(&self) -> StoreResult<Vec<Course>> {
        let sql = format!("{SELECT_COURSE} WHERE status = 'published' ORDER BY id");
        let rows = sqlx::query_as::<_, CourseRow>(&sql).fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn create_course(&self, new: NewCourse) -> StoreResult<Course> {
        let row = sqlx::query_as::<_, CourseRow>(
            "INSERT INTO courses (title, description, status, cover_image) VALUES ($1, $2, $3, $4) \
             RETURNING id, title, description, status, cover_image, created_at, updated_at",
        )
        .bind(new.title)
        .bind(new.description)
        .bind(new.status.unwrap_or_default().as_str())
        .bind(new.cover_image)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_course(&self, id: i64, patch: CoursePatch) -> StoreResult<Course> {
        let mut course = self.get_course(id).await?.ok_or(StoreError::not_found("Course", id))?;
        apply_course_patch(&mut course, patch);
        sqlx::query(
            "UPDATE courses SET title = $2, description = $3, status = $4, cover_image = $5, \
             updated_at = $6 WHERE id = $1",
        )
        .bind(id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.status.as_str())
        .bind(&course.cover_image)
        .bind(course.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(course)
    }

    async fn delete_course(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn course_tree(&self, id: i64) -> StoreResult<Option<CourseTree>> {
        let Some(course) = self.get_course(id).await? else {
            return Ok(None);
        };
        let modules = self.list_modules(id).await?;
        let module_ids: Vec<i64> = modules.iter().map(|m| m.id).collect();

        let sql = format!("{SELECT_LESSON} WHERE module_id = ANY($1) ORDER BY position, id");
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(&module_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut by_module: HashMap<i64, Vec<Lesson>> = HashMap::new();
        for lesson in convert_all::<_, Lesson>(rows)? {
            by_module.entry(lesson.module_id).or_default().push(lesson);
        }

        let modules = modules
            .into_iter()
            .map(|module| ModuleTree {
                lessons: by_module.remove(&module.id).unwrap_or_default(),
                module,
            })
            .collect();
        Ok(Some(CourseTree { course, modules }))
    }

    async fn get_module(&self, id: i64) -> StoreResult<Option<Module>> {
        let sql = format!("{SELECT_MODULE} WHERE id = $1");
        let row = sqlx::query_as::<_, ModuleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Module::from))
    }

    async fn list_modules(&self, course_id: i64) -> StoreResult<Vec<Module>> {
        let sql = format!("{SELECT_MODULE} WHERE course_id = $1 ORDER BY position, id");
        let rows = sqlx::query_as::<_, ModuleRow>(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Module::from).collect())
    }

    async fn create_module(&self, course_id: i64, new: NewModule) -> StoreResult<Module> {
        if !self.exists("courses", course_id).await? {
            return Err(StoreError::not_found("Course", course_id));
        }
        let row = sqlx::query_as::<_, ModuleRow>(
            "INSERT INTO modules (course_id, title, description, position) \
             VALUES ($1, $2, $3, COALESCE($4, (SELECT COUNT(*)::int FROM modules WHERE course_id = $1))) \
             RETURNING id, course_id, title, description, position",
        )
        .bind(course_id)
        .bind(new.title)
        .bind(new.description)
        .bind(new.order)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_module(&self, id: i64, patch: ModulePatch) -> StoreResult<Module> {
        let mut module = self.get_module(id).await?.ok_or(StoreError::not_found("Module", id))?;
        apply_module_patch(&mut module, patch);
        sqlx::query("UPDATE modules SET title = $2, description = $3, position = $4 WHERE id = $1")
            .bind(id)
            .bind(&module.title)
            .bind(&module.description)
            .bind(module.order)
            .execute(&self.pool)
            .await?;
        Ok(module)
    }

    async fn delete_module(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let course_id: Option<i64> =
            sqlx::query_scalar("DELETE FROM modules WHERE id = $1 RETURNING course_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(course_id) = course_id {
            renumber_modules(&mut tx, course_id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_lesson(&self, id: i64) -> StoreResult<Option<Lesson>> {
        let sql = format!("{SELECT_LESSON} WHERE id = $1");
        let row = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Lesson::try_from).transpose()
    }

    async fn list_lessons(&self, module_id: i64) -> StoreResult<Vec<Lesson>> {
        let sql = format!("{SELECT_LESSON} WHERE module_id = $1 ORDER BY position, id");
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(module_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn create_lesson(&self, module_id: i64, new: NewLesson) -> StoreResult<Lesson> {
        if !self.exists("modules", module_id).await? {
            return Err(StoreError::not_found("Module", module_id));
        }
        let (content, embedded) = normalize_content(new.content);
        let elements = embedded.or(new.interactive_elements).unwrap_or_default();
        let row = sqlx::query_as::<_, LessonRow>(
            "INSERT INTO lessons (module_id, title, content, position, duration, taxonomy_level, interactive_elements) \
             VALUES ($1, $2, $3, COALESCE($4, (SELECT COUNT(*)::int FROM lessons WHERE module_id = $1)), $5, $6, $7) \
             RETURNING id, module_id, title, content, position, duration, taxonomy_level, interactive_elements",
        )
        .bind(module_id)
        .bind(new.title)
        .bind(content)
        .bind(new.order)
        .bind(new.duration)
        .bind(new.taxonomy_level.unwrap_or_default().as_str())
        .bind(Json(elements))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_lesson(&self, id: i64, patch: LessonPatch) -> StoreResult<Lesson> {
        let mut lesson = self.get_lesson(id).await?.ok_or(StoreError::not_found("Lesson", id))?;
        apply_lesson_patch(&mut lesson, patch);
        sqlx::query(
            "UPDATE lessons SET title = $2, content = $3, position = $4, duration = $5, \
             taxonomy_level = $6, interactive_elements = $7 WHERE id = $1",
        )
        .bind(id)
        .bind(&lesson.title)
        .bind(&lesson.content)
        .bind(lesson.order)
        .bind(lesson.duration)
        .bind(lesson.taxonomy_level.as_str())
        .bind(Json(&lesson.interactive_elements))
        .execute(&self.pool)
        .await?;
        Ok(lesson)
    }

    async fn delete_lesson(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let module_id: Option<i64> =
            sqlx::query_scalar("DELETE FROM lessons WHERE id = $1 RETURNING module_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(module_id) = module_id {
            renumber_lessons(&mut tx, module_id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_enrollment(&self, id: i64) -> StoreResult<Option<Enrollment>> {
        let sql = format!("{SELECT_ENROLLMENT} WHERE id = $1");
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn find_enrollment(&self, user_id: i64, course_id: i64) -> StoreResult<Option<Enrollment>> {
        let sql = format!("{SELECT_ENROLLMENT} WHERE user_id = $1 AND course_id = $2");
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn list_enrollments_by_user(&self, user_id: i64) -> StoreResult<Vec<Enrollment>> {
        let sql = format!("{SELECT_ENROLLMENT} WHERE user_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn create_enrollment(&self, new: NewEnrollment) -> StoreResult<Enrollment> {
        if !self.exists("courses", new.course_id).await? {
            return Err(StoreError::not_found("Course", new.course_id));
        }
        if self.find_enrollment(new.user_id, new.course_id).await?.is_some() {
            return Err(StoreError::Conflict("Already enrolled in this course".into()));
        }
        let status = new.status.unwrap_or_default();
        let completed_at = (status == EnrollmentStatus::Completed).then(Utc::now);
        let row = sqlx::query_as::<_, EnrollmentRow>(
            "INSERT INTO enrollments (user_id, course_id, status, progress, completed_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, course_id, status, progress, enrolled_at, last_accessed_at, completed_at",
        )
        .bind(new.user_id)
        .bind(new.course_id)
        .bind(status.as_str())
        .bind(new.progress.unwrap_or(0).clamp(0, 100))
        .bind(completed_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_enrollment(&self, id: i64, patch: EnrollmentPatch) -> StoreResult<Enrollment> {
        let mut enrollment = self
            .get_enrollment(id)
            .await?
            .ok_or(StoreError::not_found("Enrollment", id))?;
        apply_enrollment_patch(&mut enrollment, patch, Utc::now());
        sqlx::query(
            "UPDATE enrollments SET status = $2, progress = $3, last_accessed_at = $4, \
             completed_at = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(enrollment.status.as_str())
        .bind(enrollment.progress)
        .bind(enrollment.last_accessed_at)
        .bind(enrollment.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(enrollment)
    }

    async fn delete_enrollment(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM enrollments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
