//! Course export: PDF, SCORM 2004 and xAPI packages.
//!
//! Renderers work on an owned [`CourseTree`] snapshot and return bytes; nothing is written
//! to disk and the store is never touched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::{error, info};

use crate::models::CourseTree;

pub mod assets;
pub mod html;
pub mod inspect;
pub mod package;
pub mod pdf;
pub mod scorm;
pub mod xapi;

use assets::AssetSource;
use pdf::PdfEngine;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Pdf,
    Scorm,
    Xapi,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Scorm => "scorm",
            ExportFormat::Xapi => "xapi",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => ".pdf",
            ExportFormat::Scorm => "-scorm.zip",
            ExportFormat::Xapi => "-xapi.zip",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Scorm | ExportFormat::Xapi => "application/zip",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(ExportFormat::Pdf),
            "scorm" => Ok(ExportFormat::Scorm),
            "xapi" => Ok(ExportFormat::Xapi),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("PDF rendering timed out after {0:?}")]
    Timeout(Duration),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("malformed package: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Failed to export course in {format} format: {source}")]
    Failed {
        format: ExportFormat,
        source: Box<ExportError>,
    },
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

static UNSAFE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Lowercases the title and collapses every run of other characters into one `-`.
pub fn safe_filename(title: &str) -> String {
    let lowered = title.to_lowercase();
    let dashed = UNSAFE_RUN.replace_all(&lowered, "-");
    let trimmed = dashed.trim_matches('-');
    if trimmed.is_empty() {
        "course".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 1-based module and lesson positions, the numbering used for package paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonPosition {
    pub module: usize,
    pub lesson: usize,
}

impl LessonPosition {
    /// Every lesson position in reading order.
    pub fn walk(course: &CourseTree) -> Vec<LessonPosition> {
        course
            .modules
            .iter()
            .enumerate()
            .flat_map(|(mi, m)| {
                (0..m.lessons.len()).map(move |li| LessonPosition { module: mi + 1, lesson: li + 1 })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub templates_dir: PathBuf,
    pub completion_delay: Duration,
    pub activity_base: String,
    pub pdf_timeout: Duration,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("./templates"),
            completion_delay: Duration::from_secs(60),
            activity_base: "http://example.com/activities".into(),
            pdf_timeout: Duration::from_secs(60),
        }
    }
}

pub struct Exporter {
    settings: ExportSettings,
    assets: AssetSource,
    pdf: Arc<dyn PdfEngine>,
}

impl Exporter {
    pub fn new(settings: ExportSettings, pdf: Arc<dyn PdfEngine>) -> Self {
        let assets = AssetSource::new(settings.templates_dir.clone());
        Self { settings, assets, pdf }
    }

    pub async fn export(&self, course: &CourseTree, format: ExportFormat) -> Result<ExportArtifact, ExportError> {
        let title = &course.course.title;
        info!(course = %title, %format, "exporting course");

        let bytes = match self.render(course, format).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(course = %title, %format, error = %e, "export failed");
                return Err(ExportError::Failed { format, source: Box::new(e) });
            }
        };

        Ok(ExportArtifact {
            format,
            filename: format!("{}{}", safe_filename(title), format.suffix()),
            bytes,
            mime_type: format.mime_type(),
        })
    }

    async fn render(&self, course: &CourseTree, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        match format {
            ExportFormat::Pdf => {
                let html = pdf::build_course_html(course);
                pdf::render(self.pdf.clone(), html, self.settings.pdf_timeout).await
            }
            ExportFormat::Scorm => {
                let assets = self.assets.load("scorm", &scorm::default_assets());
                scorm::build(course, &assets, self.settings.completion_delay)
            }
            ExportFormat::Xapi => {
                let assets = self.assets.load("xapi", &xapi::default_assets());
                xapi::build(course, &assets, &self.settings.activity_base, self.settings.completion_delay)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::models::*;

    /// Course 1 with one module per entry, each holding that many lessons.
    pub fn sample_course(title: &str, lessons_per_module: &[usize]) -> CourseTree {
        let now = Utc::now();
        let mut next_lesson = 100;
        let modules = lessons_per_module
            .iter()
            .enumerate()
            .map(|(mi, count)| {
                let module_id = 10 + mi as i64;
                let lessons = (0..*count)
                    .map(|li| {
                        next_lesson += 1;
                        Lesson {
                            id: next_lesson,
                            module_id,
                            title: format!("Lesson {}.{}", mi + 1, li + 1),
                            content: Some(format!("<p>Body {}.{}</p>", mi + 1, li + 1)),
                            order: li as i32,
                            duration: Some(10),
                            taxonomy_level: TaxonomyLevel::Understand,
                            interactive_elements: vec![],
                        }
                    })
                    .collect();
                ModuleTree {
                    module: Module {
                        id: module_id,
                        course_id: 1,
                        title: format!("Module {}", mi + 1),
                        description: Some("About this module".into()),
                        order: mi as i32,
                    },
                    lessons,
                }
            })
            .collect();
        CourseTree {
            course: Course {
                id: 1,
                title: title.into(),
                description: "A course".into(),
                status: CourseStatus::Draft,
                cover_image: None,
                created_at: now,
                updated_at: now,
            },
            modules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_support::sample_course;

    #[derive(Default)]
    struct StubPdf {
        calls: AtomicUsize,
    }

    impl PdfEngine for StubPdf {
        fn render(&self, html: &str) -> Result<Vec<u8>, ExportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = b"%PDF-1.7\n".to_vec();
            out.extend_from_slice(html.as_bytes());
            Ok(out)
        }
    }

    struct BrokenPdf;

    impl PdfEngine for BrokenPdf {
        fn render(&self, _html: &str) -> Result<Vec<u8>, ExportError> {
            Err(ExportError::Browser("no chromium".into()))
        }
    }

    fn exporter(pdf: Arc<dyn PdfEngine>) -> Exporter {
        let settings = ExportSettings {
            templates_dir: PathBuf::from("/nonexistent/templates"),
            ..Default::default()
        };
        Exporter::new(settings, pdf)
    }

    #[test]
    fn filenames() {
        assert_eq!(safe_filename("Intro to Bees!!"), "intro-to-bees");
        assert_eq!(safe_filename("  --Rust 101: Ownership & Borrowing--  "), "rust-101-ownership-borrowing");
        assert_eq!(safe_filename("¡¿!?"), "course");
        assert_eq!(safe_filename("Café Über"), "caf-ber");
    }

    #[test]
    fn csv_is_rejected() {
        let err = "csv".parse::<ExportFormat>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported export format: csv");
        assert_eq!("xapi".parse::<ExportFormat>().unwrap(), ExportFormat::Xapi);
    }

    #[tokio::test]
    async fn pdf_export_names_and_types_artifact() {
        let stub = Arc::new(StubPdf::default());
        let artifact = exporter(stub.clone())
            .export(&sample_course("Intro to Bees!!", &[1]), ExportFormat::Pdf)
            .await
            .unwrap();
        assert_eq!(artifact.filename, "intro-to-bees.pdf");
        assert_eq!(artifact.mime_type, "application/pdf");
        assert!(artifact.bytes.starts_with(b"%PDF"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn renderer_failure_is_wrapped() {
        let err = exporter(Arc::new(BrokenPdf))
            .export(&sample_course("Bees", &[1]), ExportFormat::Pdf)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Failed { format: ExportFormat::Pdf, .. }));
        assert_eq!(err.to_string(), "Failed to export course in pdf format: browser error: no chromium");
    }

    #[tokio::test]
    async fn empty_course_exports_as_scorm() {
        let stub = Arc::new(StubPdf::default());
        let artifact = exporter(stub.clone())
            .export(&sample_course("Empty", &[]), ExportFormat::Scorm)
            .await
            .unwrap();
        assert_eq!(artifact.filename, "empty-scorm.zip");
        assert_eq!(artifact.mime_type, "application/zip");
        let files = inspect::read_archive(&artifact.bytes).unwrap();
        assert!(files.contains_key("index.html"));
        let manifest = String::from_utf8(files["imsmanifest.xml"].clone()).unwrap();
        let summary = inspect::inspect_manifest(&manifest).unwrap();
        assert!(summary.lesson_items.is_empty());
        assert!(summary.resources.contains_key("common_files"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn placeholder_in_every_format() {
        let mut course = sample_course("Bees", &[1]);
        course.modules[0].lessons[0].content = Some(String::new());
        let ex = exporter(Arc::new(StubPdf::default()));

        let pdf = ex.export(&course, ExportFormat::Pdf).await.unwrap();
        assert!(String::from_utf8_lossy(&pdf.bytes).contains(html::EMPTY_LESSON));

        for format in [ExportFormat::Scorm, ExportFormat::Xapi] {
            let artifact = ex.export(&course, format).await.unwrap();
            let files = inspect::read_archive(&artifact.bytes).unwrap();
            let page = String::from_utf8(files["module_1/lesson_1.html"].clone()).unwrap();
            assert!(page.contains(html::EMPTY_LESSON), "{format}");
        }
    }

    proptest! {
        #[test]
        fn safe_filename_is_idempotent(title in "\\PC{0,40}") {
            let once = safe_filename(&title);
            prop_assert_eq!(safe_filename(&once), once.clone());
            prop_assert!(!once.is_empty());
            prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!once.starts_with('-') && !once.ends_with('-'));
        }

        #[test]
        fn manifest_counts_match_course(shape in prop::collection::vec(0usize..4, 0..5)) {
            let course = sample_course("Prop", &shape);
            let assets: Vec<assets::Asset> = vec![];
            let s = inspect::inspect_manifest(&scorm::manifest_xml(&course, &assets)).unwrap();
            prop_assert_eq!(s.module_items.len(), shape.len());
            prop_assert_eq!(s.lesson_items.len(), shape.iter().sum::<usize>());
            prop_assert!(s.resources.contains_key("common_files"));

            let activities = inspect::inspect_tincan(&xapi::tincan_xml(&course, "http://x")).unwrap();
            prop_assert_eq!(activities.len(), 1 + shape.iter().sum::<usize>());
        }
    }
}
