//! In-memory `CourseStore`.
//!
//! Ids come from per-table auto-increment counters starting at 1. All tables sit behind a
//! single `RwLock`, so cascade deletes and sibling renumbering are atomic.

use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{apply_course_patch, apply_enrollment_patch, apply_lesson_patch, apply_module_patch};
use super::{normalize_content, CourseStore, StoreError, StoreResult};
use crate::models::*;

#[derive(Default)]
struct Tables {
    courses: BTreeMap<i64, Course>,
    modules: BTreeMap<i64, Module>,
    lessons: BTreeMap<i64, Lesson>,
    enrollments: BTreeMap<i64, Enrollment>,
    next_course: i64,
    next_module: i64,
    next_lesson: i64,
    next_enrollment: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Tables {
    fn sorted_modules(&self, course_id: i64) -> Vec<Module> {
        let mut modules: Vec<Module> = self
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| (m.order, m.id));
        modules
    }

    fn sorted_lessons(&self, module_id: i64) -> Vec<Lesson> {
        let mut lessons: Vec<Lesson> = self
            .lessons
            .values()
            .filter(|l| l.module_id == module_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.order, l.id));
        lessons
    }

    fn renumber_modules(&mut self, course_id: i64) {
        for (position, module) in self.sorted_modules(course_id).into_iter().enumerate() {
            if let Some(m) = self.modules.get_mut(&module.id) {
                m.order = position as i32;
            }
        }
    }

    fn renumber_lessons(&mut self, module_id: i64) {
        for (position, lesson) in self.sorted_lessons(module_id).into_iter().enumerate() {
            if let Some(l) = self.lessons.get_mut(&lesson.id) {
                l.order = position as i32;
            }
        }
    }

    fn remove_module_cascade(&mut self, module_id: i64) {
        self.lessons.retain(|_, l| l.module_id != module_id);
        self.modules.remove(&module_id);
    }
}

#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CourseStore for MemStore {
    async fn get_course(&self, id: i64) -> StoreResult<Option<Course>> {
        Ok(self.tables.read().await.courses.get(&id).cloned())
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        Ok(self.tables.read().await.courses.values().cloned().collect())
    }

    async fn list_published(&self) -> StoreResult<Vec<Course>> {
        Ok(self
            .tables
            .read()
            .await
            .courses
            .values()
            .filter(|c| c.status == CourseStatus::Published)
            .cloned()
            .collect())
    }

    async fn create_course(&self, new: NewCourse) -> StoreResult<Course> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let course = Course {
            id: next(&mut t.next_course),
            title: new.title,
            description: new.description,
            status: new.status.unwrap_or_default(),
            cover_image: new.cover_image,
            created_at: now,
            updated_at: now,
        };
        t.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn update_course(&self, id: i64, patch: CoursePatch) -> StoreResult<Course> {
        let mut t = self.tables.write().await;
        let course = t.courses.get_mut(&id).ok_or(StoreError::not_found("Course", id))?;
        apply_course_patch(course, patch);
        Ok(course.clone())
    }

    async fn delete_course(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let module_ids: Vec<i64> = t
            .modules
            .values()
            .filter(|m| m.course_id == id)
            .map(|m| m.id)
            .collect();
        for module_id in module_ids {
            t.remove_module_cascade(module_id);
        }
        t.enrollments.retain(|_, e| e.course_id != id);
        t.courses.remove(&id);
        Ok(())
    }

    async fn course_tree(&self, id: i64) -> StoreResult<Option<CourseTree>> {
        let t = self.tables.read().await;
        let Some(course) = t.courses.get(&id).cloned() else {
            return Ok(None);
        };
        let modules = t
            .sorted_modules(id)
            .into_iter()
            .map(|module| ModuleTree { lessons: t.sorted_lessons(module.id), module })
            .collect();
        Ok(Some(CourseTree { course, modules }))
    }

    async fn get_module(&self, id: i64) -> StoreResult<Option<Module>> {
        Ok(self.tables.read().await.modules.get(&id).cloned())
    }

    async fn list_modules(&self, course_id: i64) -> StoreResult<Vec<Module>> {
        Ok(self.tables.read().await.sorted_modules(course_id))
    }

    async fn create_module(&self, course_id: i64, new: NewModule) -> StoreResult<Module> {
        let mut t = self.tables.write().await;
        if !t.courses.contains_key(&course_id) {
            return Err(StoreError::not_found("Course", course_id));
        }
        let order = match new.order {
            Some(order) => order,
            None => t.sorted_modules(course_id).len() as i32,
        };
        let module = Module {
            id: next(&mut t.next_module),
            course_id,
            title: new.title,
            description: new.description,
            order,
        };
        t.modules.insert(module.id, module.clone());
        Ok(module)
    }

    async fn update_module(&self, id: i64, patch: ModulePatch) -> StoreResult<Module> {
        let mut t = self.tables.write().await;
        let module = t.modules.get_mut(&id).ok_or(StoreError::not_found("Module", id))?;
        apply_module_patch(module, patch);
        Ok(module.clone())
    }

    async fn delete_module(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let Some(course_id) = t.modules.get(&id).map(|m| m.course_id) else {
            return Ok(());
        };
        t.remove_module_cascade(id);
        t.renumber_modules(course_id);
        Ok(())
    }

    async fn get_lesson(&self, id: i64) -> StoreResult<Option<Lesson>> {
        Ok(self.tables.read().await.lessons.get(&id).cloned())
    }

    async fn list_lessons(&self, module_id: i64) -> StoreResult<Vec<Lesson>> {
        Ok(self.tables.read().await.sorted_lessons(module_id))
    }

    async fn create_lesson(&self, module_id: i64, new: NewLesson) -> StoreResult<Lesson> {
        let mut t = self.tables.write().await;
        if !t.modules.contains_key(&module_id) {
            return Err(StoreError::not_found("Module", module_id));
        }
        let order = match new.order {
            Some(order) => order,
            None => t.sorted_lessons(module_id).len() as i32,
        };
        let (content, embedded) = normalize_content(new.content);
        let lesson = Lesson {
            id: next(&mut t.next_lesson),
            module_id,
            title: new.title,
            content,
            order,
            duration: new.duration,
            taxonomy_level: new.taxonomy_level.unwrap_or_default(),
            interactive_elements: embedded.or(new.interactive_elements).unwrap_or_default(),
        };
        t.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn update_lesson(&self, id: i64, patch: LessonPatch) -> StoreResult<Lesson> {
        let mut t = self.tables.write().await;
        let lesson = t.lessons.get_mut(&id).ok_or(StoreError::not_found("Lesson", id))?;
        apply_lesson_patch(lesson, patch);
        Ok(lesson.clone())
    }

    async fn delete_lesson(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let Some(lesson) = t.lessons.remove(&id) else {
            return Ok(());
        };
        t.renumber_lessons(lesson.module_id);
        Ok(())
    }

    async fn get_enrollment(&self, id: i64) -> StoreResult<Option<Enrollment>> {
        Ok(self.tables.read().await.enrollments.get(&id).cloned())
    }

    async fn find_enrollment(&self, user_id: i64, course_id: i64) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .tables
            .read()
            .await
            .enrollments
            .values()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn list_enrollments_by_user(&self, user_id: i64) -> StoreResult<Vec<Enrollment>> {
        Ok(self
            .tables
            .read()
            .await
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_enrollment(&self, new: NewEnrollment) -> StoreResult<Enrollment> {
        let mut t = self.tables.write().await;
        if !t.courses.contains_key(&new.course_id) {
            return Err(StoreError::not_found("Course", new.course_id));
        }
        if t
            .enrollments
            .values()
            .any(|e| e.user_id == new.user_id && e.course_id == new.course_id)
        {
            return Err(StoreError::Conflict("Already enrolled in this course".into()));
        }
        let now = Utc::now();
        let status = new.status.unwrap_or_default();
        let enrollment = Enrollment {
            id: next(&mut t.next_enrollment),
            user_id: new.user_id,
            course_id: new.course_id,
            status,
            progress: new.progress.unwrap_or(0).clamp(0, 100),
            enrolled_at: now,
            last_accessed_at: now,
            completed_at: (status == EnrollmentStatus::Completed).then_some(now),
        };
        t.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn update_enrollment(&self, id: i64, patch: EnrollmentPatch) -> StoreResult<Enrollment> {
        let mut t = self.tables.write().await;
        let enrollment = t
            .enrollments
            .get_mut(&id)
            .ok_or(StoreError::not_found("Enrollment", id))?;
        apply_enrollment_patch(enrollment, patch, Utc::now());
        Ok(enrollment.clone())
    }

    async fn delete_enrollment(&self, id: i64) -> StoreResult<()> {
        self.tables.write().await.enrollments.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(title: &str) -> NewCourse {
        NewCourse {
            title: title.into(),
            ..Default::default()
        }
    }

    fn module(title: String, order: Option<i32>) -> NewModule {
        NewModule {
            title,
            order,
            ..Default::default()
        }
    }

    fn enrollment(course_id: i64) -> NewEnrollment {
        NewEnrollment {
            user_id: 1,
            course_id,
            ..Default::default()
        }
    }

    async fn course_with_modules(store: &MemStore, lessons_per_module: &[usize]) -> i64 {
        let course = store.create_course(course("Bees")).await.unwrap();
        for (m, count) in lessons_per_module.iter().enumerate() {
            let module = store
                .create_module(course.id, module(format!("M{m}"), None))
                .await
                .unwrap();
            for l in 0..*count {
                let lesson = NewLesson {
                    title: format!("L{m}.{l}"),
                    ..Default::default()
                };
                store.create_lesson(module.id, lesson).await.unwrap();
            }
        }
        course.id
    }

    #[tokio::test]
    async fn ids_auto_increment_from_one() {
        let store = MemStore::new();
        let a = store.create_course(course("A")).await.unwrap();
        let b = store.create_course(course("B")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(a.status, CourseStatus::Draft);
    }

    #[tokio::test]
    async fn delete_course_cascades() {
        let store = MemStore::new();
        let id = course_with_modules(&store, &[2, 1]).await;
        let tree = store.course_tree(id).await.unwrap().unwrap();
        let module_ids: Vec<i64> = tree.modules.iter().map(|m| m.module.id).collect();
        let lesson_ids: Vec<i64> = tree.lessons().map(|l| l.id).collect();
        assert_eq!(lesson_ids.len(), 3);

        store.create_enrollment(enrollment(id)).await.unwrap();
        store.delete_course(id).await.unwrap();

        assert!(store.course_tree(id).await.unwrap().is_none());
        assert!(store.get_course(id).await.unwrap().is_none());
        for m in module_ids {
            assert!(store.get_module(m).await.unwrap().is_none());
        }
        for l in lesson_ids {
            assert!(store.get_lesson(l).await.unwrap().is_none());
        }
        assert!(store.list_enrollments_by_user(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_first_module_renumbers_siblings() {
        let store = MemStore::new();
        let id = course_with_modules(&store, &[1, 1, 1]).await;
        let modules = store.list_modules(id).await.unwrap();
        store.delete_module(modules[0].id).await.unwrap();

        let remaining = store.list_modules(id).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining.iter().map(|m| m.order).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(remaining[0].id, modules[1].id);
        assert!(store.list_lessons(modules[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_middle_lesson_renumbers_siblings() {
        let store = MemStore::new();
        let id = course_with_modules(&store, &[3]).await;
        let module = store.list_modules(id).await.unwrap().remove(0);
        let lessons = store.list_lessons(module.id).await.unwrap();
        assert_eq!(lessons.iter().map(|l| l.order).collect::<Vec<_>>(), vec![0, 1, 2]);

        store.delete_lesson(lessons[1].id).await.unwrap();
        let remaining = store.list_lessons(module.id).await.unwrap();
        assert_eq!(
            remaining.iter().map(|l| (l.id, l.order)).collect::<Vec<_>>(),
            vec![(lessons[0].id, 0), (lessons[2].id, 1)]
        );
    }

    #[tokio::test]
    async fn tree_sorts_by_order() {
        let store = MemStore::new();
        let c = store.create_course(course("C")).await.unwrap();
        store
            .create_module(c.id, module("second".into(), Some(1)))
            .await
            .unwrap();
        store
            .create_module(c.id, module("first".into(), Some(0)))
            .await
            .unwrap();

        let tree = store.course_tree(c.id).await.unwrap().unwrap();
        let titles: Vec<&str> = tree.modules.iter().map(|m| m.module.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn update_lesson_lifts_embedded_elements() {
        let store = MemStore::new();
        let id = course_with_modules(&store, &[1]).await;
        let tree = store.course_tree(id).await.unwrap().unwrap();
        let lesson = tree.modules[0].lessons[0].clone();
        let html = concat!(
            "<p>Hi</p>",
            r#"<div class="interactive-elements-container" style="display:none;" "#,
            r#"data-interactive-elements='[{"type":"tabs","id":"t1","#,
            r#""tabs":[{"title":"A","content":"a"}]}]'></div>"#
        );
        let patch = LessonPatch {
            content: Some(html.into()),
            ..Default::default()
        };
        let updated = store.update_lesson(lesson.id, patch).await.unwrap();
        assert_eq!(updated.content.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(updated.interactive_elements.len(), 1);
        assert_eq!(updated.title, lesson.title);
    }

    #[tokio::test]
    async fn enrollment_lifecycle() {
        let store = MemStore::new();
        let id = course_with_modules(&store, &[]).await;
        let e = store.create_enrollment(enrollment(id)).await.unwrap();
        assert_eq!(e.status, EnrollmentStatus::Enrolled);
        assert!(e.completed_at.is_none());

        let dup = store.create_enrollment(enrollment(id)).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let patch = EnrollmentPatch {
            status: Some(EnrollmentStatus::Completed),
            progress: Some(150),
        };
        let done = store.update_enrollment(e.id, patch).await.unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(done.progress, 100);

        store.delete_enrollment(e.id).await.unwrap();
        assert!(store.get_enrollment(e.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_module_requires_course() {
        let store = MemStore::new();
        let err = store
            .create_module(42, module("orphan".into(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "Course", id: 42 }));
    }
}
