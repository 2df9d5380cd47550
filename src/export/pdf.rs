//! Print-ready course HTML and the PDF engines that render it.

use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::html::{escape, lesson_body};
use super::ExportError;
use crate::models::CourseTree;

/// Turns a complete HTML document into PDF bytes. Implementations block.
pub trait PdfEngine: Send + Sync {
    fn render(&self, html: &str) -> Result<Vec<u8>, ExportError>;
}

// A4 in inches, 20mm margins
const PAPER_WIDTH: f64 = 8.27;
const PAPER_HEIGHT: f64 = 11.69;
const MARGIN: f64 = 0.787;

const FOOTER_TEMPLATE: &str = r#"<div style="width: 100%; text-align: center; font-size: 10px; color: #999; padding: 0 20px;"><span class="pageNumber"></span> of <span class="totalPages"></span></div>"#;

// Resolves true once the document, its images and fonts have settled for 500ms, or false
// when `limit` ms pass first.
const IDLE_JS: &str = r#"(limit) => new Promise((resolve) => {
  const stop = Date.now() + limit;
  let quietSince = null;
  const settled = () =>
    document.readyState === 'complete' && Array.from(document.images).every((img) => img.complete);
  const tick = () => {
    const now = Date.now();
    if (now >= stop) return resolve(false);
    if (settled()) {
      if (quietSince === null) quietSince = now;
      if (now - quietSince >= 500) return resolve(true);
    } else {
      quietSince = null;
    }
    setTimeout(tick, 50);
  };
  document.fonts.ready.then(tick, tick);
})"#;

// Characters escaped in the path part of a file:// URL.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`');

/// Headless Chromium, one browser process per render.
///
/// Every step runs against a single deadline of `timeout` from the start of the render:
/// each CDP call and the idle wait get only what is left of it. The async [`render`] wrapper
/// uses the same budget, so once it gives up the blocking thread winds down within that
/// window instead of running a second full timeout. The browser and the temporary document
/// are dropped on every path out.
pub struct ChromePdf {
    chrome_path: Option<PathBuf>,
    timeout: Duration,
}

impl ChromePdf {
    pub fn new(chrome_path: Option<PathBuf>, timeout: Duration) -> Self {
        Self { chrome_path, timeout }
    }
}

fn browser_err(e: impl std::fmt::Display) -> ExportError {
    ExportError::Browser(e.to_string())
}

/// Time left before `deadline`, or a timeout error carrying the whole `budget`.
fn remaining(deadline: Instant, budget: Duration) -> Result<Duration, ExportError> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or(ExportError::Timeout(budget))
}

/// Writes the document to a temporary `.html` file removed when the handle drops. Large
/// documents with inlined images would overflow Chromium's URL length limit as a data URL.
fn write_document(html: &str) -> Result<NamedTempFile, ExportError> {
    let mut file = tempfile::Builder::new()
        .prefix("course-")
        .suffix(".html")
        .tempfile()?;
    file.write_all(html.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn file_url(path: &Path) -> String {
    format!("file://{}", utf8_percent_encode(&path.to_string_lossy(), PATH_SET))
}

impl PdfEngine for ChromePdf {
    fn render(&self, html: &str) -> Result<Vec<u8>, ExportError> {
        let budget = self.timeout;
        let deadline = Instant::now() + budget;

        let document = write_document(html)?;
        let url = file_url(document.path());

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(self.chrome_path.clone())
            .idle_browser_timeout(budget)
            .build()
            .map_err(browser_err)?;
        let browser = Browser::new(options).map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;

        tab.set_default_timeout(remaining(deadline, budget)?);
        tab.navigate_to(&url)
            .and_then(|t| t.wait_until_navigated())
            .map_err(browser_err)?;

        let left = remaining(deadline, budget)?;
        tab.set_default_timeout(left);
        let limit_ms = left.saturating_sub(Duration::from_millis(250)).as_millis();
        let idle = tab
            .evaluate(&format!("({IDLE_JS})({limit_ms})"), true)
            .map_err(browser_err)?;
        if idle.value != Some(serde_json::Value::Bool(true)) {
            warn!(url = %url, "page did not settle before the deadline, printing anyway");
        }

        tab.set_default_timeout(remaining(deadline, budget)?);
        let pdf = tab
            .print_to_pdf(Some(PrintToPdfOptions {
                paper_width: Some(PAPER_WIDTH),
                paper_height: Some(PAPER_HEIGHT),
                margin_top: Some(MARGIN),
                margin_bottom: Some(MARGIN),
                margin_left: Some(MARGIN),
                margin_right: Some(MARGIN),
                print_background: Some(true),
                display_header_footer: Some(true),
                header_template: Some("<div></div>".into()),
                footer_template: Some(FOOTER_TEMPLATE.into()),
                ..Default::default()
            }))
            .map_err(browser_err)?;
        debug!(bytes = pdf.len(), "chromium produced pdf");
        Ok(pdf)
    }
}

/// Runs the engine off the async runtime, giving up after `timeout`. The blocking task
/// cannot be cancelled; engines are expected to honour the same budget themselves.
pub async fn render(
    engine: Arc<dyn PdfEngine>,
    html: String,
    timeout: Duration,
) -> Result<Vec<u8>, ExportError> {
    let task = tokio::task::spawn_blocking(move || engine.render(&html));
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => Err(ExportError::Timeout(timeout)),
    }
}

const PDF_CSS: &str = r#"
body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; }
.course-header { text-align: center; margin-bottom: 30px; padding-bottom: 20px; border-bottom: 1px solid #eee; }
.course-header h1 { font-size: 28px; color: #2c3e50; margin-bottom: 10px; }
.course-description { font-style: italic; color: #7f8c8d; margin-bottom: 20px; }
.course-toc { margin-bottom: 40px; page-break-after: always; }
.course-toc h2 { font-size: 22px; margin-bottom: 20px; color: #2c3e50; }
.toc-module { font-weight: bold; margin-bottom: 10px; color: #34495e; }
.toc-lessons li { margin-bottom: 5px; color: #7f8c8d; }
.module { margin-bottom: 30px; page-break-after: always; }
.module-title { font-size: 24px; color: #2c3e50; margin-bottom: 15px; padding-bottom: 10px; border-bottom: 1px solid #eee; }
.module-description { margin-bottom: 20px; color: #7f8c8d; }
.lesson { margin-bottom: 30px; page-break-inside: avoid; }
.lesson-title { font-size: 20px; color: #3498db; margin-bottom: 15px; }
.lesson-content img { max-width: 100%; height: auto; margin: 15px 0; }
.interactive { margin: 20px 0; padding: 15px; border: 1px solid #e1e8ed; border-radius: 6px; }
.course-footer { margin-top: 50px; padding-top: 20px; border-top: 1px solid #eee; text-align: center; color: #7f8c8d; font-size: 14px; }
"#;

/// Single self-contained document: title page, table of contents, one section per
/// module and lesson.
pub fn build_course_html(course: &CourseTree) -> String {
    let title = escape(&course.course.title);
    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>{PDF_CSS}</style>
</head>
<body>
<header class="course-header">
<h1>{title}</h1>
<div class="course-description">{}</div>
</header>
<nav class="course-toc">
<h2>Table of Contents</h2>
<ol class="toc-list">
"#,
        escape(&course.course.description)
    );

    for module in &course.modules {
        html.push_str(&format!(
            "<li><div class=\"toc-module\">{}</div><ol class=\"toc-lessons\">",
            escape(&module.module.title)
        ));
        for lesson in &module.lessons {
            html.push_str(&format!("<li>{}</li>", escape(&lesson.title)));
        }
        html.push_str("</ol></li>\n");
    }
    html.push_str("</ol>\n</nav>\n<main class=\"course-content\">\n");

    for (mi, module) in course.modules.iter().enumerate() {
        let n = mi + 1;
        html.push_str(&format!(
            "<section class=\"module\" id=\"module-{n}\">\n<h2 class=\"module-title\">Module {n}: {}</h2>\n<div class=\"module-description\">{}</div>\n",
            escape(&module.module.title),
            escape(module.module.description.as_deref().unwrap_or_default()),
        ));
        for (li, lesson) in module.lessons.iter().enumerate() {
            html.push_str(&format!(
                "<section class=\"lesson\" id=\"lesson-{n}-{}\">\n<h3 class=\"lesson-title\">{}</h3>\n<div class=\"lesson-content\">{}</div>\n</section>\n",
                li + 1,
                escape(&lesson.title),
                lesson_body(lesson),
            ));
        }
        html.push_str("</section>\n");
    }

    html.push_str(
        "</main>\n<footer class=\"course-footer\"><p>Generated by rustiscorm-studio</p></footer>\n</body>\n</html>\n",
    );
    html
}
