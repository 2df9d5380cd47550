//! HTML building blocks shared by the renderers.

use std::borrow::Cow;

use crate::interactive::{DragDrop, InteractiveElement, Quiz, Tabs};
use crate::models::Lesson;

pub const EMPTY_LESSON: &str = "<p>No content has been added for this lesson yet.</p>";

/// Escapes plain text for HTML and XML bodies and attributes.
pub fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

/// JSON string literal safe to drop inside an inline `<script>`.
pub fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string().replace("</", "<\\/")
}

// Elements dropped together with everything inside them.
const DROPPED_WITH_CONTENT: [&str; 6] =
    ["script", "style", "iframe", "object", "embed", "noscript"];

const URL_SCHEMES: [&str; 5] = ["http", "https", "mailto", "tel", "data"];

/// Allow-list sanitizer for authored HTML. Unknown tags are unwrapped, `on*` and other
/// unlisted attributes are dropped, and URLs must use one of [`URL_SCHEMES`]. `data:`
/// URLs survive only as `<img src>`, so inline images keep working.
fn sanitizer() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::default();
    builder
        .clean_content_tags(DROPPED_WITH_CONTENT.into_iter().collect())
        .add_generic_attributes(&["class"])
        .url_schemes(URL_SCHEMES.into_iter().collect())
        .attribute_filter(|element, attribute, value| {
            let is_data = value
                .trim_start()
                .get(..5)
                .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"));
            if is_data && !(element == "img" && attribute == "src") {
                None
            } else {
                Some(value.into())
            }
        });
    builder
}

/// Strips active content and legacy interactive containers from authored HTML.
pub fn sanitize(html: &str) -> String {
    let html = crate::interactive::strip_embedded(html);
    sanitizer().clean(&html).to_string()
}

/// Sanitized lesson content (or the empty-lesson placeholder) followed by its
/// interactive elements.
pub fn lesson_body(lesson: &Lesson) -> String {
    let mut body = if lesson.has_content() {
        sanitize(lesson.content.as_deref().unwrap_or_default())
    } else {
        EMPTY_LESSON.to_string()
    };
    for element in &lesson.interactive_elements {
        body.push('\n');
        body.push_str(&render_element(element));
    }
    body
}

pub fn render_element(element: &InteractiveElement) -> String {
    match element {
        InteractiveElement::Tabs(t) => render_tabs(t),
        InteractiveElement::DragDrop(d) => render_drag_drop(d),
        InteractiveElement::Quiz(q) => render_quiz(q),
    }
}

fn render_tabs(tabs: &Tabs) -> String {
    let mut html = format!(r#"<div class="interactive tabs" id="{}">"#, escape(&tabs.id));
    for tab in &tabs.tabs {
        html.push_str(&format!(
            r#"<section class="tab"><h4 class="tab-title">{}</h4><div class="tab-content">{}</div></section>"#,
            escape(&tab.title),
            sanitize(&tab.content)
        ));
    }
    html.push_str("</div>");
    html
}

fn render_drag_drop(dd: &DragDrop) -> String {
    let zones: String = dd
        .zones
        .iter()
        .map(|z| format!(r#"<li data-zone="{}">{}</li>"#, escape(&z.id), escape(&z.title)))
        .collect();
    let items: String = dd
        .items
        .iter()
        .map(|i| format!(r#"<li data-item="{}">{}</li>"#, escape(&i.id), escape(&i.text)))
        .collect();
    format!(
        r#"<div class="interactive drag-drop" id="{}"><p class="instructions">{}</p><h4>Categories</h4><ul class="zones">{zones}</ul><h4>Items</h4><ul class="items">{items}</ul></div>"#,
        escape(&dd.id),
        escape(&dd.instructions),
    )
}

fn render_quiz(quiz: &Quiz) -> String {
    let mut html = format!(
        r#"<div class="interactive quiz" id="{}"><h3 class="quiz-title">{}</h3>"#,
        escape(&quiz.id),
        escape(&quiz.title)
    );
    if let Some(description) = &quiz.description {
        html.push_str(&format!(r#"<p class="quiz-description">{}</p>"#, escape(description)));
    }
    html.push_str(r#"<ol class="questions">"#);
    for question in &quiz.questions {
        html.push_str(&format!("<li><p>{}</p>", escape(&question.question)));
        if !question.options.is_empty() {
            html.push_str(r#"<ul class="options">"#);
            for option in &question.options {
                html.push_str(&format!("<li>{}</li>", escape(option)));
            }
            html.push_str("</ul>");
        }
        html.push_str("</li>");
    }
    html.push_str(&format!(
        r#"</ol><p class="passing-score">Passing score: {}%</p></div>"#,
        quiz.passing_score
    ));
    html
}
