use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use http::{header, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::ai::{assessment_html, AiAssistant, LessonPrompt};
use crate::export::{ExportError, ExportFormat, Exporter};
use crate::interactive::{Answer, InteractiveElement};
use crate::models::*;
use crate::store::{course_with_enrollment, create_from_outline, CourseStore, StoreError};

/// Enrollments belong to a single demo learner until authentication exists.
pub const DEMO_USER_ID: i64 = 1;

pub struct AppState<S> {
    pub store: Arc<S>,
    pub exporter: Arc<Exporter>,
    pub ai: Arc<AiAssistant>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), exporter: self.exporter.clone(), ai: self.ai.clone() }
    }
}

pub fn router<S: CourseStore>(state: AppState<S>) -> Router {
    Router::new()
        // courses
        .route("/api/courses", get(list_courses::<S>).post(create_course::<S>))
        .route("/api/courses/with-enrollment", get(courses_with_enrollment::<S>))
        .route(
            "/api/courses/:id",
            get(get_course::<S>).patch(update_course::<S>).delete(delete_course::<S>),
        )
        .route("/api/courses/:id/preview", get(preview_course::<S>))
        .route("/api/courses/:id/completeness", get(completeness::<S>))
        .route("/api/courses/:id/export", get(export_course::<S>))
        // structure
        .route("/api/courses/:id/modules", post(create_module::<S>))
        .route("/api/modules/:id", patch(update_module::<S>).delete(delete_module::<S>))
        .route("/api/modules/:id/lessons", post(create_lesson::<S>))
        .route(
            "/api/lessons/:id",
            get(get_lesson::<S>).patch(update_lesson::<S>).delete(delete_lesson::<S>),
        )
        .route("/api/lessons/:id/elements/:element_id/check", post(check_element::<S>))
        // catalog + enrollment
        .route("/api/catalog", get(catalog::<S>))
        .route("/api/courses/:id/enrollment", get(enrollment_for_course::<S>))
        .route("/api/courses/:id/enroll", post(enroll::<S>))
        .route("/api/enrollments", get(list_enrollments::<S>))
        .route(
            "/api/enrollments/:id",
            patch(update_enrollment::<S>).delete(delete_enrollment::<S>),
        )
        // authoring assistant
        .route("/api/ai/generate-outline", post(ai_outline::<S>))
        .route("/api/ai/generate-description", post(ai_description::<S>))
        .route("/api/ai/generate-lesson", post(ai_lesson::<S>))
        .route("/api/ai/improve-content", post(ai_improve::<S>))
        .route("/api/ai/content-suggestions", post(ai_suggestions::<S>))
        .route("/api/ai/generate-assessment", post(ai_assessment::<S>))
        .with_state(state)
}

// --- errors ---

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::BAD_REQUEST,
            ApiError::Export(ExportError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "internal error");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str, entity: &str) -> ApiResult<i64> {
    raw.parse().map_err(|_| ApiError::BadRequest(format!("Invalid {entity} ID")))
}

fn required(value: Option<String>, message: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

async fn load_tree<S: CourseStore>(store: &S, id: i64) -> ApiResult<CourseTree> {
    store
        .course_tree(id)
        .await?
        .ok_or_else(|| StoreError::not_found("Course", id).into())
}

// --- courses ---

async fn list_courses<S: CourseStore>(State(st): State<AppState<S>>) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(st.store.list_courses().await?))
}

async fn create_course<S: CourseStore>(
    State(st): State<AppState<S>>,
    Json(outline): Json<CourseOutline>,
) -> ApiResult<(StatusCode, Json<CourseTree>)> {
    if outline.course.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Course title is required".into()));
    }
    let tree = create_from_outline(st.store.as_ref(), outline).await?;
    tracing::info!(course_id = tree.course.id, modules = tree.modules.len(), "course created");
    Ok((StatusCode::CREATED, Json(tree)))
}

async fn courses_with_enrollment<S: CourseStore>(
    State(st): State<AppState<S>>,
) -> ApiResult<Json<Vec<CourseWithEnrollment>>> {
    let mut out = Vec::new();
    for course in st.store.list_courses().await? {
        out.push(course_with_enrollment(st.store.as_ref(), course, DEMO_USER_ID).await?);
    }
    Ok(Json(out))
}

async fn get_course<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CourseTree>> {
    let id = parse_id(&id, "course")?;
    Ok(Json(load_tree(st.store.as_ref(), id).await?))
}

async fn update_course<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
    Json(patch): Json<CoursePatch>,
) -> ApiResult<Json<Course>> {
    let id = parse_id(&id, "course")?;
    Ok(Json(st.store.update_course(id, patch).await?))
}

async fn delete_course<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "course")?;
    st.store.delete_course(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn preview_course<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "course")?;
    let course = load_tree(st.store.as_ref(), id).await?;
    Ok(Json(json!({ "course": course, "previewMode": true })))
}

async fn completeness<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Completeness>> {
    let id = parse_id(&id, "course")?;
    let tree = load_tree(st.store.as_ref(), id).await?;
    Ok(Json(Completeness::from(&tree)))
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

async fn export_course<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
    Query(q): Query<ExportQuery>,
) -> ApiResult<Response> {
    let id = parse_id(&id, "course")?;
    // reject the format before touching the store or any renderer
    let format: ExportFormat = q.format.as_deref().unwrap_or("pdf").parse()?;
    let tree = load_tree(st.store.as_ref(), id).await?;
    let artifact = st.exporter.export(&tree, format).await?;

    Ok((
        [
            (header::CONTENT_TYPE, artifact.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.filename),
            ),
        ],
        artifact.bytes,
    )
        .into_response())
}

// --- modules + lessons ---

async fn create_module<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
    Json(new): Json<NewModule>,
) -> ApiResult<(StatusCode, Json<Module>)> {
    let course_id = parse_id(&id, "course")?;
    let module = st.store.create_module(course_id, new).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

async fn update_module<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
    Json(patch): Json<ModulePatch>,
) -> ApiResult<Json<Module>> {
    let id = parse_id(&id, "module")?;
    Ok(Json(st.store.update_module(id, patch).await?))
}

async fn delete_module<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "module")?;
    st.store.delete_module(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_lesson<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
    Json(new): Json<NewLesson>,
) -> ApiResult<(StatusCode, Json<Lesson>)> {
    let module_id = parse_id(&id, "module")?;
    let lesson = st.store.create_lesson(module_id, new).await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

async fn get_lesson<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Lesson>> {
    let id = parse_id(&id, "lesson")?;
    let lesson = st.store.get_lesson(id).await?.ok_or(StoreError::not_found("Lesson", id))?;
    Ok(Json(lesson))
}

async fn update_lesson<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
    Json(patch): Json<LessonPatch>,
) -> ApiResult<Json<Lesson>> {
    let id = parse_id(&id, "lesson")?;
    Ok(Json(st.store.update_lesson(id, patch).await?))
}

async fn delete_lesson<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "lesson")?;
    st.store.delete_lesson(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CheckReq {
    answers: HashMap<String, Answer>,
    placements: HashMap<String, String>,
}

async fn check_element<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path((id, element_id)): Path<(String, String)>,
    Json(req): Json<CheckReq>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id, "lesson")?;
    let lesson = st.store.get_lesson(id).await?.ok_or(StoreError::not_found("Lesson", id))?;
    let element = lesson
        .interactive_elements
        .iter()
        .find(|e| e.id() == element_id)
        .ok_or_else(|| ApiError::NotFound(format!("Interactive element {element_id} not found")))?;

    match element {
        InteractiveElement::Quiz(quiz) => Ok(Json(json!(quiz.grade(&req.answers)))),
        InteractiveElement::DragDrop(dd) => Ok(Json(json!(dd.check(&req.placements)))),
        InteractiveElement::Tabs(_) => {
            Err(ApiError::BadRequest(format!("Interactive element {element_id} cannot be checked")))
        }
    }
}

// --- catalog + enrollment ---

async fn catalog<S: CourseStore>(State(st): State<AppState<S>>) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(st.store.list_published().await?))
}

async fn enrollment_for_course<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CourseWithEnrollment>> {
    let id = parse_id(&id, "course")?;
    let course = st.store.get_course(id).await?.ok_or(StoreError::not_found("Course", id))?;
    Ok(Json(course_with_enrollment(st.store.as_ref(), course, DEMO_USER_ID).await?))
}

async fn enroll<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Enrollment>)> {
    let course_id = parse_id(&id, "course")?;
    let enrollment = st
        .store
        .create_enrollment(NewEnrollment { user_id: DEMO_USER_ID, course_id, ..Default::default() })
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn list_enrollments<S: CourseStore>(State(st): State<AppState<S>>) -> ApiResult<Json<Vec<Enrollment>>> {
    Ok(Json(st.store.list_enrollments_by_user(DEMO_USER_ID).await?))
}

async fn update_enrollment<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
    Json(patch): Json<EnrollmentPatch>,
) -> ApiResult<Json<Enrollment>> {
    let id = parse_id(&id, "enrollment")?;
    Ok(Json(st.store.update_enrollment(id, patch).await?))
}

async fn delete_enrollment<S: CourseStore>(
    State(st): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "enrollment")?;
    st.store.delete_enrollment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- authoring assistant ---

#[derive(Deserialize)]
struct OutlineReq {
    subject: Option<String>,
    style: Option<String>,
}

async fn ai_outline<S: CourseStore>(
    State(st): State<AppState<S>>,
    Json(req): Json<OutlineReq>,
) -> ApiResult<Json<Value>> {
    let subject = required(req.subject, "Subject is required")?;
    let outline = st.ai.generate_outline(&subject, req.style.as_deref()).await;
    Ok(Json(json!({
        "outline": { "modules": outline.modules },
        "suggestions": outline.suggestions,
    })))
}

#[derive(Deserialize)]
struct DescriptionReq {
    subject: Option<String>,
}

async fn ai_description<S: CourseStore>(
    State(st): State<AppState<S>>,
    Json(req): Json<DescriptionReq>,
) -> ApiResult<Json<Value>> {
    let subject = required(req.subject, "Subject is required")?;
    Ok(Json(json!({ "description": st.ai.generate_description(&subject).await })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LessonReq {
    lesson_title: Option<String>,
    module_title: Option<String>,
    course_context: Option<Value>,
    subject: Option<String>,
    module_number: Option<Value>,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("title").and_then(value_text),
        _ => None,
    }
}

async fn ai_lesson<S: CourseStore>(
    State(st): State<AppState<S>>,
    Json(req): Json<LessonReq>,
) -> ApiResult<Json<Value>> {
    let lesson_title = required(req.lesson_title, "Lesson title and module title are required")?;
    let module_title = required(req.module_title, "Lesson title and module title are required")?;
    let course_title = req
        .course_context
        .as_ref()
        .and_then(value_text)
        .or(req.subject)
        .unwrap_or_else(|| module_title.clone());
    let module_number = req.module_number.as_ref().and_then(value_text).unwrap_or_else(|| "1".into());

    let lesson = st
        .ai
        .generate_lesson(&LessonPrompt {
            lesson_title: &lesson_title,
            module_title: &module_title,
            course_title: &course_title,
            module_number: &module_number,
        })
        .await;
    Ok(Json(json!({ "content": lesson.content, "suggestions": lesson.suggestions })))
}

#[derive(Deserialize)]
struct ImproveReq {
    content: Option<String>,
    instructions: Option<String>,
}

async fn ai_improve<S: CourseStore>(
    State(st): State<AppState<S>>,
    Json(req): Json<ImproveReq>,
) -> ApiResult<Json<Value>> {
    let content = required(req.content, "Content is required")?;
    let improved = st.ai.improve_content(&content, req.instructions.as_deref()).await;
    Ok(Json(json!({ "content": improved })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionsReq {
    course_title: Option<String>,
    course_description: Option<String>,
}

async fn ai_suggestions<S: CourseStore>(
    State(st): State<AppState<S>>,
    Json(req): Json<SuggestionsReq>,
) -> ApiResult<Json<Value>> {
    let title = required(req.course_title, "Course title is required")?;
    let suggestions = st.ai.content_suggestions(&title, req.course_description.as_deref()).await;
    Ok(Json(json!({ "suggestions": suggestions })))
}

#[derive(Deserialize)]
struct AssessmentReq {
    subject: Option<String>,
    count: Option<usize>,
}

async fn ai_assessment<S: CourseStore>(
    State(st): State<AppState<S>>,
    Json(req): Json<AssessmentReq>,
) -> ApiResult<Json<Value>> {
    let subject = required(req.subject, "Subject is required")?;
    let count = req.count.unwrap_or(5).clamp(1, 20);
    let questions = st.ai.generate_assessment(&subject, count).await;
    Ok(Json(json!({ "content": assessment_html(&subject, &questions), "questions": questions })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::pdf::PdfEngine;
    use crate::export::ExportSettings;
    use crate::store::MemStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct StubPdf;

    impl PdfEngine for StubPdf {
        fn render(&self, _html: &str) -> Result<Vec<u8>, ExportError> {
            Ok(b"%PDF-1.4 stub".to_vec())
        }
    }

    struct BrokenPdf;

    impl PdfEngine for BrokenPdf {
        fn render(&self, _html: &str) -> Result<Vec<u8>, ExportError> {
            Err(ExportError::Browser("chromium exited".into()))
        }
    }

    fn app_with(pdf: Arc<dyn PdfEngine>) -> (Router, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let state = AppState {
            store: store.clone(),
            exporter: Arc::new(Exporter::new(
                ExportSettings { templates_dir: "./no-such-templates".into(), ..Default::default() },
                pdf,
            )),
            ai: Arc::new(AiAssistant::demo()),
        };
        (router(state), store)
    }

    fn app() -> (Router, Arc<MemStore>) {
        app_with(Arc::new(StubPdf))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>, Option<String>) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec();
        (status, bytes, disposition)
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes, _) = send(app, method, uri, body).await;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    fn outline(title: &str) -> Value {
        json!({
            "course": { "title": title, "description": "All about bees" },
            "modules": [
                { "title": "Hive", "order": 0, "lessons": [
                    { "title": "Queens", "content": "<p>Queens</p>" },
                    { "title": "Drones" }
                ]},
                { "title": "Honey", "order": 1, "lessons": [{ "title": "Nectar", "content": "<p>Nectar</p>" }] },
                { "title": "Swarms", "order": 2, "lessons": [] }
            ]
        })
    }

    #[tokio::test]
    async fn create_then_fetch_course() {
        let (app, _) = app();
        let (status, created) = send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["modules"].as_array().unwrap().len(), 3);

        let (status, fetched) = send_json(&app, "GET", &format!("/api/courses/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["modules"][0]["lessons"][1]["title"], "Drones");

        let (_, done) = send_json(&app, "GET", &format!("/api/courses/{id}/completeness"), None).await;
        assert_eq!(done, json!({ "complete": false, "totalLessons": 3, "lessonsWithContent": 2 }));

        let (_, preview) = send_json(&app, "GET", &format!("/api/courses/{id}/preview"), None).await;
        assert_eq!(preview["previewMode"], true);
    }

    #[tokio::test]
    async fn bad_and_missing_ids() {
        let (app, _) = app();
        let (status, body) = send_json(&app, "GET", "/api/courses/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid course ID");

        let (status, body) = send_json(&app, "GET", "/api/courses/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Course with ID 42 not found");
    }

    #[tokio::test]
    async fn export_rejects_unknown_format() {
        let (app, _) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        let (status, body) = send_json(&app, "GET", "/api/courses/1/export?format=csv", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unsupported export format: csv");
    }

    #[tokio::test]
    async fn export_defaults_to_pdf() {
        let (app, _) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Intro to Bees!!"))).await;
        let (status, bytes, disposition) = send(&app, "GET", "/api/courses/1/export", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(disposition.as_deref(), Some("attachment; filename=\"intro-to-bees.pdf\""));
    }

    #[tokio::test]
    async fn export_scorm_is_a_zip() {
        let (app, _) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        let (status, bytes, disposition) = send(&app, "GET", "/api/courses/1/export?format=scorm", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(bytes.starts_with(b"PK"));
        assert_eq!(disposition.as_deref(), Some("attachment; filename=\"bees-scorm.zip\""));
    }

    #[tokio::test]
    async fn export_missing_course_is_404() {
        let (app, _) = app();
        let (status, _) = send_json(&app, "GET", "/api/courses/9/export?format=xapi", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn renderer_failure_is_500_with_cause() {
        let (app, _) = app_with(Arc::new(BrokenPdf));
        send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        let (status, body) = send_json(&app, "GET", "/api/courses/1/export?format=pdf", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("Failed to export course in pdf format"));
        assert!(message.contains("chromium exited"));
    }

    #[tokio::test]
    async fn deleting_first_module_renumbers() {
        let (app, store) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        let first = store.list_modules(1).await.unwrap()[0].id;
        let (status, _) = send_json(&app, "DELETE", &format!("/api/modules/{first}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let orders: Vec<i32> = store.list_modules(1).await.unwrap().iter().map(|m| m.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn delete_course_cascades() {
        let (app, store) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        let (status, _) = send_json(&app, "DELETE", "/api/courses/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.list_modules(1).await.unwrap().is_empty());
        let (status, _) = send_json(&app, "GET", "/api/courses/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn enrolling_twice_is_rejected() {
        let (app, _) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        let (status, enrollment) = send_json(&app, "POST", "/api/courses/1/enroll", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(enrollment["userId"], DEMO_USER_ID);

        let (status, body) = send_json(&app, "POST", "/api/courses/1/enroll", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Already enrolled in this course");

        let (_, view) = send_json(&app, "GET", "/api/courses/1/enrollment", None).await;
        assert_eq!(view["isEnrolled"], true);

        let id = enrollment["id"].as_i64().unwrap();
        let (_, updated) = send_json(
            &app,
            "PATCH",
            &format!("/api/enrollments/{id}"),
            Some(json!({ "status": "completed", "progress": 150 })),
        )
        .await;
        assert_eq!(updated["progress"], 100);
        assert!(updated["completedAt"].is_string());

        let (_, list) = send_json(&app, "GET", "/api/enrollments", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn catalog_lists_published_only() {
        let (app, _) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Draft"))).await;
        send_json(&app, "POST", "/api/courses", Some(outline("Live"))).await;
        send_json(&app, "PATCH", "/api/courses/2", Some(json!({ "status": "published" }))).await;
        let (_, catalog) = send_json(&app, "GET", "/api/catalog", None).await;
        let titles: Vec<&str> = catalog.as_array().unwrap().iter().map(|c| c["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Live"]);
    }

    #[tokio::test]
    async fn quiz_check_grades_answers() {
        let (app, _) = app();
        send_json(&app, "POST", "/api/courses", Some(outline("Bees"))).await;
        let quiz = json!([{
            "type": "quiz", "id": "quiz-1", "title": "Check", "passingScore": 50,
            "questions": [
                { "id": "a", "type": "trueFalse", "question": "Bees sting?", "options": ["True", "False"], "correctAnswer": "True" },
                { "id": "b", "type": "shortAnswer", "question": "Queen count?", "correctAnswer": "1" }
            ]
        }]);
        let (status, _) =
            send_json(&app, "PATCH", "/api/lessons/1", Some(json!({ "interactiveElements": quiz }))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, result) = send_json(
            &app,
            "POST",
            "/api/lessons/1/elements/quiz-1/check",
            Some(json!({ "answers": { "a": "True", "b": "2" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["score"], 50);
        assert_eq!(result["passed"], true);
        assert_eq!(result["missed"], json!(["b"]));

        let (status, _) =
            send_json(&app, "POST", "/api/lessons/1/elements/nope/check", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ai_routes_answer_in_demo_mode() {
        let (app, _) = app();
        let (status, body) =
            send_json(&app, "POST", "/api/ai/generate-outline", Some(json!({ "subject": "Bees" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outline"]["modules"].as_array().unwrap().len(), 5);

        let (status, body) = send_json(&app, "POST", "/api/ai/generate-outline", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Subject is required");

        let (_, body) = send_json(
            &app,
            "POST",
            "/api/ai/generate-lesson",
            Some(json!({ "lessonTitle": "Queens", "moduleTitle": "Hive", "moduleNumber": 2 })),
        )
        .await;
        assert!(body["content"].as_str().unwrap().contains("<h1>Queens</h1>"));
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);

        let (_, body) = send_json(
            &app,
            "POST",
            "/api/ai/generate-assessment",
            Some(json!({ "subject": "Bees", "count": 3 })),
        )
        .await;
        assert_eq!(body["questions"].as_array().unwrap().len(), 3);
        assert!(body["content"].as_str().unwrap().starts_with("<h2>Assessment Questions for Bees</h2>"));
    }
}
