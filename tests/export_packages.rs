use std::sync::Arc;
use std::time::Duration;

use rustiscorm_studio::export::inspect::{inspect_manifest, inspect_tincan, read_archive};
use rustiscorm_studio::export::pdf::PdfEngine;
use rustiscorm_studio::export::{ExportError, ExportFormat, ExportSettings, Exporter};
use rustiscorm_studio::models::{CourseOutline, OutlineCourse, OutlineLesson, OutlineModule};
use rustiscorm_studio::store::{create_from_outline, CourseStore, MemStore};

struct NoPdf;

impl PdfEngine for NoPdf {
    fn render(&self, _html: &str) -> Result<Vec<u8>, ExportError> {
        Err(ExportError::Browser("not available in tests".into()))
    }
}

fn lesson(title: &str, content: Option<&str>) -> OutlineLesson {
    OutlineLesson {
        title: title.into(),
        content: content.map(Into::into),
        order: None,
        duration: Some(10),
        taxonomy_level: None,
    }
}

fn outline() -> CourseOutline {
    CourseOutline {
        course: OutlineCourse {
            title: "Urban Beekeeping".into(),
            description: "Keeping bees on rooftops".into(),
            cover_image: None,
        },
        modules: vec![
            OutlineModule {
                title: "Getting Started".into(),
                description: Some("Gear and hives".into()),
                order: None,
                lessons: vec![
                    lesson("Choosing a hive", Some("<p>Langstroth or top-bar?</p>")),
                    lesson("Protective gear", None),
                ],
            },
            OutlineModule {
                title: "Harvest".into(),
                description: None,
                order: None,
                lessons: vec![lesson(
                    "Extracting honey",
                    Some("<p>Spin it out.</p><script>alert(1)</script>"),
                )],
            },
        ],
    }
}

fn exporter(templates: &std::path::Path) -> Exporter {
    Exporter::new(
        ExportSettings {
            templates_dir: templates.to_path_buf(),
            completion_delay: Duration::from_secs(30),
            activity_base: "https://lrs.example.org/activities".into(),
            pdf_timeout: Duration::from_secs(5),
        },
        Arc::new(NoPdf),
    )
}

#[tokio::test]
async fn scorm_package_from_stored_course() {
    let store = MemStore::new();
    let tree = create_from_outline(&store, outline()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let artifact = exporter(dir.path()).export(&tree, ExportFormat::Scorm).await.unwrap();
    assert_eq!(artifact.filename, "urban-beekeeping-scorm.zip");
    assert_eq!(artifact.mime_type, "application/zip");

    let files = read_archive(&artifact.bytes).unwrap();
    let manifest = inspect_manifest(std::str::from_utf8(&files["imsmanifest.xml"]).unwrap()).unwrap();
    assert_eq!(manifest.module_items.len(), 2);
    assert_eq!(manifest.lesson_items.len(), 3);
    assert!(manifest.resources.contains_key("common_files"));
    for (_, resource) in &manifest.lesson_items {
        assert!(manifest.resources.contains_key(resource));
    }

    let harvest = std::str::from_utf8(&files["module_2/lesson_1.html"]).unwrap();
    assert!(harvest.contains("Spin it out."));
    assert!(!harvest.contains("alert(1)"));
    assert!(harvest.contains("}, 30000);"));
    assert!(files.contains_key("scripts/api.js"));
}

#[tokio::test]
async fn xapi_package_uses_template_overrides() {
    let store = MemStore::new();
    let tree = create_from_outline(&store, outline()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("xapi/styles")).unwrap();
    std::fs::write(dir.path().join("xapi/styles/main.css"), "body { color: teal; }").unwrap();

    let artifact = exporter(dir.path()).export(&tree, ExportFormat::Xapi).await.unwrap();
    let files = read_archive(&artifact.bytes).unwrap();

    let activities = inspect_tincan(std::str::from_utf8(&files["tincan.xml"]).unwrap()).unwrap();
    assert_eq!(activities.len(), 4);
    assert_eq!(activities[0].id, format!("https://lrs.example.org/activities/{}", tree.course.id));
    assert_eq!(files["styles/main.css"], b"body { color: teal; }");
    assert!(files.contains_key("scripts/tincan.js"));
}

#[tokio::test]
async fn pdf_failure_surfaces_cause() {
    let store = MemStore::new();
    let tree = create_from_outline(&store, outline()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = exporter(dir.path()).export(&tree, ExportFormat::Pdf).await.unwrap_err();
    assert!(matches!(err, ExportError::Failed { format: ExportFormat::Pdf, .. }));
    assert!(err.to_string().contains("not available in tests"));

    // the course is untouched by a failed export
    assert_eq!(store.course_tree(tree.course.id).await.unwrap(), Some(tree));
}
