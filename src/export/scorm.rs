//! SCORM 2004 (4th edition) package.

use std::time::Duration;
use tracing::debug;

use super::assets::{Asset, COURSE_CSS};
use super::html::{escape, js_string, lesson_body};
use super::inspect::inspect_manifest;
use super::package::{assemble, lesson_path, LessonPage, PackageLayout};
use super::{ExportError, LessonPosition};
use crate::models::{CourseTree, Lesson, ModuleTree};

pub const API_JS: &str = r#"/* SCORM 2004 runtime stub */
(function () {
  var lastError = "0";
  var errors = {
    "0": "No error",
    "301": "General Get Failure - not initialized",
    "401": "Undefined Data Model Element"
  };
  var API = {
    initialized: false,
    cmi: {
      completion_status: "not attempted",
      success_status: "unknown",
      score: { scaled: "0" }
    },
    Initialize: function (param) {
      this.initialized = true;
      lastError = "0";
      return "true";
    },
    Terminate: function (param) {
      if (!this.initialized) { lastError = "301"; return "false"; }
      this.initialized = false;
      lastError = "0";
      return "true";
    },
    GetValue: function (element) {
      if (!this.initialized) { lastError = "301"; return ""; }
      var path = String(element).split(".");
      var value = this.cmi;
      for (var i = 1; i < path.length; i++) {
        if (value === null || typeof value !== "object" || !(path[i] in value)) {
          lastError = "401";
          return "";
        }
        value = value[path[i]];
      }
      lastError = "0";
      return String(value);
    },
    SetValue: function (element, value) {
      if (!this.initialized) { lastError = "301"; return "false"; }
      var path = String(element).split(".");
      if (path.length < 2 || path[0] !== "cmi") { lastError = "401"; return "false"; }
      var target = this.cmi;
      for (var i = 1; i < path.length - 1; i++) {
        if (typeof target[path[i]] !== "object" || target[path[i]] === null) {
          target[path[i]] = {};
        }
        target = target[path[i]];
      }
      target[path[path.length - 1]] = String(value);
      lastError = "0";
      return "true";
    },
    Commit: function (param) {
      if (!this.initialized) { lastError = "301"; return "false"; }
      lastError = "0";
      return "true";
    },
    GetLastError: function () { return lastError; },
    GetErrorString: function (code) { return errors[String(code)] || "Unknown error"; },
    GetDiagnostic: function (code) { return errors[String(code || lastError)] || ""; }
  };
  window.API_1484_11 = API;
  window.initializeAPI = function () { return window.API_1484_11; };
})();
"#;

pub fn default_assets() -> [(&'static str, &'static str); 2] {
    [("scripts/api.js", API_JS), ("styles/main.css", COURSE_CSS)]
}

pub fn manifest_xml(course: &CourseTree, assets: &[Asset]) -> String {
    let id = course.course.id;
    let mut items = String::new();
    let mut resources = String::new();

    for (mi, module) in course.modules.iter().enumerate() {
        let n = mi + 1;
        items.push_str(&format!(
            "      <item identifier=\"module_{n}\">\n        <title>{}</title>\n",
            escape(&module.module.title)
        ));
        for (li, lesson) in module.lessons.iter().enumerate() {
            let m = li + 1;
            let href = lesson_path(n, m);
            items.push_str(&format!(
                "        <item identifier=\"lesson_{n}_{m}\" identifierref=\"resource_lesson_{n}_{m}\">\n          <title>{}</title>\n        </item>\n",
                escape(&lesson.title)
            ));
            resources.push_str(&format!(
                "    <resource identifier=\"resource_lesson_{n}_{m}\" type=\"webcontent\" adlcp:scormType=\"sco\" href=\"{href}\">\n      <file href=\"{href}\"/>\n      <dependency identifierref=\"common_files\"/>\n    </resource>\n"
            ));
        }
        items.push_str("      </item>\n");
    }

    resources.push_str("    <resource identifier=\"common_files\" type=\"webcontent\" adlcp:scormType=\"asset\">\n");
    for asset in assets {
        resources.push_str(&format!("      <file href=\"{}\"/>\n", escape(&asset.path)));
    }
    resources.push_str("    </resource>\n");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest xmlns="http://www.imsglobal.org/xsd/imscp_v1p1"
          xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
          xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_v1p3"
          xmlns:adlseq="http://www.adlnet.org/xsd/adlseq_v1p3"
          xmlns:adlnav="http://www.adlnet.org/xsd/adlnav_v1p3"
          xmlns:imsss="http://www.imsglobal.org/xsd/imsss"
          identifier="course_{id}"
          version="1"
          xsi:schemaLocation="http://www.imsglobal.org/xsd/imscp_v1p1 imscp_v1p1.xsd
                              http://www.adlnet.org/xsd/adlcp_v1p3 adlcp_v1p3.xsd
                              http://www.adlnet.org/xsd/adlseq_v1p3 adlseq_v1p3.xsd
                              http://www.adlnet.org/xsd/adlnav_v1p3 adlnav_v1p3.xsd
                              http://www.imsglobal.org/xsd/imsss imsss_v1p0.xsd">
  <metadata>
    <schema>ADL SCORM</schema>
    <schemaversion>2004 4th Edition</schemaversion>
  </metadata>
  <organizations default="org_{id}">
    <organization identifier="org_{id}" structure="hierarchical">
      <title>{}</title>
{items}    </organization>
  </organizations>
  <resources>
{resources}  </resources>
</manifest>
"#,
        escape(&course.course.title)
    )
}

pub fn index_html(course: &CourseTree) -> String {
    let title = escape(&course.course.title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <link rel="stylesheet" href="styles/main.css">
  <script src="scripts/api.js"></script>
</head>
<body>
  <div class="course-container">
    <header class="course-header">
      <h1>{title}</h1>
      <p>{}</p>
    </header>
    <main class="course-content">
      <h2>Course Modules</h2>
      <nav class="module-navigation">
{}      </nav>
    </main>
    <footer class="course-footer">
      <p>Click on a lesson to begin your learning journey!</p>
    </footer>
  </div>
  <script>
    window.onload = function () {{ initializeAPI(); }};
  </script>
</body>
</html>
"#,
        escape(&course.course.description),
        module_navigation(course)
    )
}

pub(super) fn module_navigation(course: &CourseTree) -> String {
    let mut nav = String::from("        <ul>\n");
    for (mi, module) in course.modules.iter().enumerate() {
        nav.push_str(&format!(
            "          <li>\n            <h3>Module {}: {}</h3>\n            <ul>\n",
            mi + 1,
            escape(&module.module.title)
        ));
        for (li, lesson) in module.lessons.iter().enumerate() {
            nav.push_str(&format!(
                "              <li><a href=\"{}\">{}</a></li>\n",
                lesson_path(mi + 1, li + 1),
                escape(&lesson.title)
            ));
        }
        nav.push_str("            </ul>\n          </li>\n");
    }
    nav.push_str("        </ul>\n");
    nav
}

/// Footer links: back to the index plus previous and next lesson across module
/// boundaries.
pub(super) fn lesson_navigation(prev: Option<LessonPosition>, next: Option<LessonPosition>) -> String {
    let mut nav = String::from("<a href=\"../index.html\">Back to Course</a>");
    if let Some(p) = prev {
        nav.push_str(&format!("<a href=\"../{}\">Previous Lesson</a>", lesson_path(p.module, p.lesson)));
    }
    if let Some(n) = next {
        nav.push_str(&format!("<a href=\"../{}\">Next Lesson</a>", lesson_path(n.module, n.lesson)));
    }
    nav
}

fn lesson_html(
    course: &CourseTree,
    module: &ModuleTree,
    lesson: &Lesson,
    prev: Option<LessonPosition>,
    next: Option<LessonPosition>,
    completion_delay: Duration,
) -> String {
    let lesson_title = escape(&lesson.title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{lesson_title} - {course_title}</title>
  <link rel="stylesheet" href="../styles/main.css">
  <script src="../scripts/api.js"></script>
</head>
<body>
  <div class="lesson-container">
    <header class="lesson-header">
      <h1>{lesson_title}</h1>
      <p class="lesson-info">
        <span class="course-title">{course_title}</span> &gt;
        <span class="module-title">{module_title}</span>
      </p>
    </header>
    <main class="lesson-content">
{body}
    </main>
    <footer class="lesson-footer">
      <div class="lesson-navigation">{nav}</div>
    </footer>
  </div>
  <script>
    var lessonName = {lesson_js};
    window.onload = function () {{
      var api = initializeAPI();
      api.Initialize("");
      api.SetValue("cmi.completion_status", "incomplete");
      api.SetValue("cmi.location", lessonName);
      setTimeout(function () {{
        api.SetValue("cmi.completion_status", "completed");
        api.SetValue("cmi.success_status", "passed");
        api.SetValue("cmi.score.scaled", "1.0");
        api.Commit("");
      }}, {delay_ms});
    }};
    window.onunload = function () {{ window.API_1484_11.Terminate(""); }};
  </script>
</body>
</html>
"#,
        course_title = escape(&course.course.title),
        module_title = escape(&module.module.title),
        body = lesson_body(lesson),
        nav = lesson_navigation(prev, next),
        lesson_js = js_string(&lesson.title),
        delay_ms = completion_delay.as_millis(),
    )
}

/// Renders, self-checks and zips the package.
pub fn build(course: &CourseTree, assets: &[Asset], completion_delay: Duration) -> Result<Vec<u8>, ExportError> {
    let manifest = manifest_xml(course, assets);
    let summary = inspect_manifest(&manifest).map_err(|e| ExportError::Malformed(e.to_string()))?;
    if summary.lesson_items.len() != course.lesson_count() {
        return Err(ExportError::Malformed(format!(
            "manifest lists {} lessons, course has {}",
            summary.lesson_items.len(),
            course.lesson_count()
        )));
    }
    debug!(lessons = summary.lesson_items.len(), "scorm manifest verified");

    let positions = LessonPosition::walk(course);
    let lessons = positions
        .iter()
        .enumerate()
        .map(|(k, pos)| {
            let module = &course.modules[pos.module - 1];
            let lesson = &module.lessons[pos.lesson - 1];
            let prev = k.checked_sub(1).map(|i| positions[i]);
            let next = positions.get(k + 1).copied();
            LessonPage {
                module: pos.module,
                lesson: pos.lesson,
                html: lesson_html(course, module, lesson, prev, next, completion_delay),
            }
        })
        .collect();

    assemble(&PackageLayout {
        manifest_name: "imsmanifest.xml",
        manifest,
        index: index_html(course),
        module_count: course.modules.len(),
        lessons,
        assets,
    })
}
