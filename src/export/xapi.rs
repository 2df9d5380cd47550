//! xAPI (TinCan) package.
//!
//! Activity ids are built from real course, module and lesson ids so `tincan.xml` and the
//! statements sent by the pages agree.

use std::time::Duration;

use super::assets::{Asset, COURSE_CSS};
use super::html::{escape, js_string, lesson_body};
use super::inspect::inspect_tincan;
use super::package::{assemble, lesson_path, LessonPage, PackageLayout};
use super::scorm::{lesson_navigation, module_navigation};
use super::{ExportError, LessonPosition};
use crate::models::{CourseTree, Lesson, ModuleTree};

const COURSE_TYPE: &str = "http://adlnet.gov/expapi/activities/course";
const LESSON_TYPE: &str = "http://adlnet.gov/expapi/activities/lesson";

pub const TINCAN_JS: &str = r#"/* xAPI client stub */
function TinCan(options) {
  this.activityId = options && options.activity ? options.activity.id : null;
  this.actor = {
    name: "Anonymous Learner",
    mbox: "mailto:anonymous@example.com"
  };
  this.statements = [];
  this.state = {};

  this.sendStatement = function (statement) {
    statement.actor = this.actor;
    statement.timestamp = new Date().toISOString();
    this.statements.push(statement);
    console.log("xAPI statement sent:", statement);
    return true;
  };

  this.getState = function (id) {
    return Object.prototype.hasOwnProperty.call(this.state, id) ? this.state[id] : null;
  };

  this.setState = function (id, value) {
    this.state[id] = value;
    return true;
  };
}
"#;

pub fn default_assets() -> [(&'static str, &'static str); 2] {
    [("scripts/tincan.js", TINCAN_JS), ("styles/main.css", COURSE_CSS)]
}

pub fn course_activity_id(base: &str, course: &CourseTree) -> String {
    format!("{}/{}", base.trim_end_matches('/'), course.course.id)
}

pub fn lesson_activity_id(base: &str, course: &CourseTree, module: &ModuleTree, lesson: &Lesson) -> String {
    format!("{}/{}/{}", course_activity_id(base, course), module.module.id, lesson.id)
}

pub fn tincan_xml(course: &CourseTree, base: &str) -> String {
    let mut activities = format!(
        "    <activity id=\"{}\" type=\"{COURSE_TYPE}\">\n      <name>{}</name>\n      <description lang=\"en-US\">{}</description>\n      <launch lang=\"en-US\">index.html</launch>\n    </activity>\n",
        escape(&course_activity_id(base, course)),
        escape(&course.course.title),
        escape(&course.course.description),
    );
    for (mi, module) in course.modules.iter().enumerate() {
        for (li, lesson) in module.lessons.iter().enumerate() {
            activities.push_str(&format!(
                "    <activity id=\"{}\" type=\"{LESSON_TYPE}\">\n      <name>{}</name>\n      <description lang=\"en-US\">{} - {}</description>\n      <launch lang=\"en-US\">{}</launch>\n    </activity>\n",
                escape(&lesson_activity_id(base, course, module, lesson)),
                escape(&lesson.title),
                escape(&module.module.title),
                escape(&lesson.title),
                lesson_path(mi + 1, li + 1),
            ));
        }
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n<tincan xmlns=\"http://projecttincan.com/tincan.xsd\">\n  <activities>\n{activities}  </activities>\n</tincan>\n"
    )
}

fn index_html(course: &CourseTree, base: &str) -> String {
    let title = escape(&course.course.title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <link rel="stylesheet" href="styles/main.css">
  <script src="scripts/tincan.js"></script>
</head>
<body>
  <div class="course-container">
    <header class="course-header">
      <h1>{title}</h1>
      <p>{description}</p>
    </header>
    <main class="course-content">
      <h2>Course Modules</h2>
      <nav class="module-navigation">
{nav}      </nav>
    </main>
    <footer class="course-footer">
      <p>Click on a lesson to begin your learning journey!</p>
    </footer>
  </div>
  <script>
    var courseId = {course_id};
    window.onload = function () {{
      var tincan = new TinCan({{
        activity: {{ id: courseId, definition: {{ name: {{ "en-US": {course_name} }} }} }}
      }});
      tincan.sendStatement({{
        verb: {{ id: "http://adlnet.gov/expapi/verbs/launched", display: {{ "en-US": "launched" }} }},
        object: {{ id: courseId }}
      }});
    }};
  </script>
</body>
</html>
"#,
        description = escape(&course.course.description),
        nav = module_navigation(course),
        course_id = js_string(&course_activity_id(base, course)),
        course_name = js_string(&course.course.title),
    )
}

fn lesson_html(
    course: &CourseTree,
    module: &ModuleTree,
    lesson: &Lesson,
    activity_id: &str,
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
  <script src="../scripts/tincan.js"></script>
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
    var lessonId = {lesson_id};
    var moduleName = {module_js};
    var lessonName = {lesson_js};
    window.onload = function () {{
      var tincan = new TinCan({{
        activity: {{
          id: lessonId,
          definition: {{
            name: {{ "en-US": lessonName }},
            description: {{ "en-US": moduleName + " - " + lessonName }}
          }}
        }}
      }});
      tincan.sendStatement({{
        verb: {{ id: "http://adlnet.gov/expapi/verbs/launched", display: {{ "en-US": "launched" }} }},
        object: {{ id: lessonId }}
      }});
      tincan.sendStatement({{
        verb: {{ id: "http://id.tincanapi.com/verb/viewed", display: {{ "en-US": "viewed" }} }},
        object: {{ id: lessonId }}
      }});
      setTimeout(function () {{
        tincan.sendStatement({{
          verb: {{ id: "http://adlnet.gov/expapi/verbs/completed", display: {{ "en-US": "completed" }} }},
          object: {{ id: lessonId }},
          result: {{ completion: true, success: true, score: {{ scaled: 1.0 }} }}
        }});
      }}, {delay_ms});
    }};
  </script>
</body>
</html>
"#,
        course_title = escape(&course.course.title),
        module_title = escape(&module.module.title),
        body = lesson_body(lesson),
        nav = lesson_navigation(prev, next),
        lesson_id = js_string(activity_id),
        module_js = js_string(&module.module.title),
        lesson_js = js_string(&lesson.title),
        delay_ms = completion_delay.as_millis(),
    )
}

pub fn build(
    course: &CourseTree,
    assets: &[Asset],
    activity_base: &str,
    completion_delay: Duration,
) -> Result<Vec<u8>, ExportError> {
    let manifest = tincan_xml(course, activity_base);
    let activities = inspect_tincan(&manifest).map_err(|e| ExportError::Malformed(e.to_string()))?;
    if activities.len() != course.lesson_count() + 1 {
        return Err(ExportError::Malformed(format!(
            "tincan.xml lists {} activities, expected {}",
            activities.len(),
            course.lesson_count() + 1
        )));
    }

    let positions = LessonPosition::walk(course);
    let lessons = positions
        .iter()
        .enumerate()
        .map(|(k, pos)| {
            let module = &course.modules[pos.module - 1];
            let lesson = &module.lessons[pos.lesson - 1];
            let activity_id = lesson_activity_id(activity_base, course, module, lesson);
            LessonPage {
                module: pos.module,
                lesson: pos.lesson,
                html: lesson_html(
                    course,
                    module,
                    lesson,
                    &activity_id,
                    k.checked_sub(1).map(|i| positions[i]),
                    positions.get(k + 1).copied(),
                    completion_delay,
                ),
            }
        })
        .collect();

    assemble(&PackageLayout {
        manifest_name: "tincan.xml",
        manifest,
        index: index_html(course, activity_base),
        module_count: course.modules.len(),
        lessons,
        assets,
    })
}
