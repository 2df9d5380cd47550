//! AI authoring assistant over an OpenAI-compatible chat completions API.
//!
//! Without an API key every call answers from deterministic demo content. When a live
//! call fails the assistant logs a warning and answers from the same demo content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::export::html::escape;
use crate::interactive::{Answer, QuestionType, QuizQuestion};
use crate::models::{OutlineLesson, OutlineModule};

#[derive(Error, Debug)]
pub enum AiError {
    #[error("no API key configured")]
    MissingKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct AiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedOutline {
    pub modules: Vec<OutlineModule>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneratedLesson {
    pub content: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LessonPrompt<'a> {
    pub lesson_title: &'a str,
    pub module_title: &'a str,
    pub course_title: &'a str,
    pub module_number: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct AiAssistant {
    client: reqwest::Client,
    settings: AiSettings,
}

impl AiAssistant {
    pub fn new(settings: AiSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default http client");
                reqwest::Client::new()
            });
        if settings.api_key.is_none() {
            info!("no OPENAI_API_KEY set, AI assistant runs in demo mode");
        }
        Self { client, settings }
    }

    pub fn demo() -> Self {
        Self::new(AiSettings::default())
    }

    pub fn is_demo(&self) -> bool {
        self.settings.api_key.is_none()
    }

    async fn chat(&self, system: &str, user: &str, json: bool) -> Result<String, AiError> {
        let key = self.settings.api_key.as_deref().ok_or(AiError::MissingKey)?;
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.7,
            response_format: json.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(%url, model = %self.settings.model, "calling chat completions");
        let resp = self.client.post(&url).bearer_auth(key).json(&request).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }
        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::Decode("response had no message content".into()))
    }

    async fn live_or_demo<T, F>(&self, task: &'static str, live: F, demo: impl FnOnce() -> T) -> T
    where
        F: Future<Output = Result<T, AiError>>,
    {
        if self.is_demo() {
            debug!(task, "answering from demo content");
            return demo();
        }
        match live.await {
            Ok(value) => value,
            Err(e) => {
                warn!(task, error = %e, "AI call failed, answering from demo content");
                demo()
            }
        }
    }

    pub async fn generate_outline(&self, subject: &str, style: Option<&str>) -> GeneratedOutline {
        let style = style.unwrap_or("comprehensive");
        let live = async {
            let system = format!(
                "You are an expert curriculum designer. Create a beginner-to-advanced course outline \
                 for {subject} in a {style} style: an introduction module, then fundamentals, \
                 intermediate concepts, advanced techniques and finally practical mastery. \
                 Answer with JSON: {{\"modules\":[{{\"title\":\"\",\"description\":\"\",\"order\":0,\
                 \"lessons\":[{{\"title\":\"\",\"order\":0}}]}}],\"suggestions\":[\"\"]}}"
            );
            let raw = self
                .chat(&system, &format!("Create a course outline about: {subject}"), true)
                .await?;
            serde_json::from_str::<GeneratedOutline>(&raw).map_err(|e| AiError::Decode(e.to_string()))
        };
        self.live_or_demo("outline", live, || demo_outline(subject)).await
    }

    pub async fn generate_description(&self, subject: &str) -> String {
        let live = async {
            let system = "Write a single paragraph, concise course description as HTML (one <p>). \
                          State the target audience, learning goals and concrete skills. \
                          Keep it under 150 words.";
            self.chat(system, &format!("Course subject: {subject}"), false).await
        };
        self.live_or_demo("description", live, || demo_description(subject)).await
    }

    pub async fn generate_lesson(&self, prompt: &LessonPrompt<'_>) -> GeneratedLesson {
        let suggestions = lesson_suggestions(prompt.lesson_title);
        let live = async {
            let system = format!(
                "You write engaging HTML lesson content (h2, p, ul, ol only, no scripts) for the \
                 lesson \"{}\" in module {}: \"{}\" of a course about {}.",
                prompt.lesson_title, prompt.module_number, prompt.module_title, prompt.course_title
            );
            let content = self
                .chat(&system, &format!("Write the lesson \"{}\".", prompt.lesson_title), false)
                .await?;
            Ok(GeneratedLesson { content, suggestions: suggestions.clone() })
        };
        self.live_or_demo("lesson", live, || GeneratedLesson {
            content: demo_lesson(prompt),
            suggestions: suggestions.clone(),
        })
        .await
    }

    pub async fn improve_content(&self, content: &str, instructions: Option<&str>) -> String {
        let instructions = instructions.unwrap_or("Improve clarity, structure and engagement");
        let live = async {
            let system = format!(
                "You are an expert educational content editor. Improve the provided HTML content \
                 following these instructions: {instructions}. Keep the HTML structure and return \
                 the full improved content."
            );
            self.chat(&system, content, false).await
        };
        self.live_or_demo("improve", live, || demo_improvement(content, instructions)).await
    }

    pub async fn content_suggestions(&self, title: &str, description: Option<&str>) -> Vec<String> {
        let description = description.unwrap_or_default();
        let live = async {
            let system = "Suggest 5 to 7 concrete ways to enrich an online course. \
                          Answer with JSON: {\"suggestions\":[\"...\"]}";
            let raw = self
                .chat(
                    system,
                    &format!("Course \"{title}\" with the description: \"{description}\""),
                    true,
                )
                .await?;
            parse_suggestions(&raw)
        };
        self.live_or_demo("suggestions", live, || demo_suggestions(title, description)).await
    }

    pub async fn generate_assessment(&self, subject: &str, count: usize) -> Vec<QuizQuestion> {
        let live = async {
            let system = format!(
                "You design quiz questions. Generate {count} questions about \"{subject}\" mixing \
                 multipleChoice (4 options), trueFalse and shortAnswer. Answer with JSON: \
                 {{\"questions\":[{{\"type\":\"multipleChoice\",\"question\":\"\",\"options\":[],\
                 \"correctAnswer\":\"\",\"feedback\":\"\"}}]}}"
            );
            let raw = self
                .chat(&system, &format!("Generate {count} assessment questions for {subject}"), true)
                .await?;
            parse_questions(&raw)
        };
        self.live_or_demo("assessment", live, || demo_assessment(subject, count)).await
    }
}

// ------------- response parsing -------------

fn parse_suggestions(raw: &str) -> Result<Vec<String>, AiError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| AiError::Decode(e.to_string()))?;
    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("suggestions") {
            Some(Value::Array(items)) => items,
            _ => map.into_iter().map(|(_, v)| v).collect(),
        },
        other => return Err(AiError::Decode(format!("expected suggestions, got {other}"))),
    };
    Ok(items
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .take(7)
        .collect())
}

fn parse_questions(raw: &str) -> Result<Vec<QuizQuestion>, AiError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| AiError::Decode(e.to_string()))?;
    let list = match value {
        Value::Object(mut map) => map.remove("questions").unwrap_or(Value::Array(vec![])),
        other => other,
    };
    let mut questions: Vec<QuizQuestion> =
        serde_json::from_value(list).map_err(|e| AiError::Decode(e.to_string()))?;
    for (i, q) in questions.iter_mut().enumerate() {
        if q.id.is_empty() {
            q.id = format!("q{}", i + 1);
        }
    }
    Ok(questions)
}

// ------------- demo content -------------

const MODULE_DESCRIPTIONS: [&str; 5] = [
    "A comprehensive introduction to key concepts and terminology for beginners",
    "Building core knowledge and understanding of essential principles",
    "Developing more complex skills and applying knowledge in different contexts",
    "In-depth exploration of sophisticated approaches and techniques",
    "Creating, evaluating, and implementing solutions to real-world problems",
];

const LESSON_TITLES: [&str; 9] = [
    "Understanding the Basics",
    "Key Concepts and Terminology",
    "Fundamental Principles",
    "Practical Examples",
    "Case Studies",
    "Implementation Strategies",
    "Best Practices",
    "Common Challenges",
    "Future Directions",
];

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

pub fn demo_outline(subject: &str) -> GeneratedOutline {
    let titles = [
        format!("Introduction to {}", truncate(subject, 30)),
        format!("Fundamentals of {}", truncate(subject, 25)),
        "Intermediate Concepts".to_string(),
        "Advanced Techniques".to_string(),
        "Mastery and Practical Applications".to_string(),
    ];
    let modules = titles
        .into_iter()
        .zip(MODULE_DESCRIPTIONS)
        .enumerate()
        .map(|(mi, (title, description))| {
            // alternate three and four lessons per module
            let lesson_count = 3 + mi % 2;
            let lessons = (0..lesson_count)
                .map(|li| OutlineLesson {
                    title: LESSON_TITLES[(mi * 2 + li) % LESSON_TITLES.len()].to_string(),
                    content: None,
                    order: Some(li as i32),
                    duration: None,
                    taxonomy_level: None,
                })
                .collect();
            OutlineModule {
                title,
                description: Some(description.to_string()),
                order: Some(mi as i32),
                lessons,
            }
        })
        .collect();

    GeneratedOutline {
        modules,
        suggestions: vec![
            "Consider adding interactive quizzes to test understanding".into(),
            "Include real-world case studies to illustrate concepts".into(),
            "Add practical assignments for hands-on learning".into(),
            "Consider creating supplementary resources and cheat sheets".into(),
            "Include a glossary of key terms for quick reference".into(),
        ],
    }
}

fn demo_description(subject: &str) -> String {
    let s = escape(subject);
    format!(
        "<p>Welcome to our comprehensive {s} course designed for both beginners and experienced \
         learners. This structured curriculum takes you from foundational concepts to advanced \
         techniques, so you develop practical skills you can apply in real-world scenarios.</p>\n\
         <p>It is aimed at students, professionals and enthusiasts who want to master {s} through \
         hands-on exercises, case studies and expert guidance. Learning goals include understanding \
         core principles, mastering essential techniques and keeping up with the latest trends in \
         {s}.</p>"
    )
}

fn lesson_suggestions(lesson_title: &str) -> Vec<String> {
    vec![
        format!("Add interactive exercises to help students apply {lesson_title} concepts"),
        format!("Include a video demonstration of {lesson_title} in action"),
        format!("Develop a quiz to test understanding of key {lesson_title} principles"),
    ]
}

fn demo_lesson(prompt: &LessonPrompt<'_>) -> String {
    let lesson = escape(prompt.lesson_title);
    let module = escape(prompt.module_title);
    let course = escape(prompt.course_title);
    format!(
        r#"<h1>{lesson}</h1>
<div class="lesson-intro">
  <p>Welcome to this lesson on <strong>{lesson}</strong>, part of the <em>{module}</em> module.</p>
  <p>We will explore the key concepts, practical applications and best practices related to {lesson}.</p>
</div>
<h2>1. Introduction to {lesson}</h2>
<p>{lesson} is a fundamental concept within {module}. Understanding it deepens your grasp of {course}.</p>
<ul>
  <li>Understand the core principles of {lesson}</li>
  <li>Apply these concepts in real-world scenarios</li>
  <li>Develop practical skills for implementing solutions</li>
</ul>
<h2>2. Key Concepts</h2>
<div class="concept-box">
  <ul>
    <li><strong>Principle 1:</strong> Consistency and reliability in application</li>
    <li><strong>Principle 2:</strong> Adaptability to different contexts</li>
    <li><strong>Principle 3:</strong> Integration with existing frameworks</li>
  </ul>
</div>
<h2>3. Best Practices</h2>
<ol>
  <li>Begin with a clear understanding of objectives and requirements</li>
  <li>Iterate and test as you go</li>
  <li>Seek feedback and improve continuously</li>
</ol>
<h2>4. Summary</h2>
<div class="summary-box">
  <p>In this lesson we explored {lesson} within {module}. As you continue through {course}, you will build on these foundations.</p>
</div>"#
    )
}

fn demo_improvement(content: &str, instructions: &str) -> String {
    format!(
        r#"<div class="improved-content-note">
  <p><strong>Content Improvement Note:</strong></p>
  <ul>
    <li>Enhanced clarity and engagement</li>
    <li>Added more detailed examples</li>
    <li>Improved structure and formatting</li>
  </ul>
  <p><em>Improvement instructions: "{}"</em></p>
</div>
{content}"#,
        escape(instructions)
    )
}

pub fn demo_suggestions(title: &str, description: &str) -> Vec<String> {
    let mut suggestions = vec![
        format!("Create interactive quizzes at the end of each section to reinforce learning about {title}"),
        format!("Include real-world case studies that demonstrate practical applications of {title}"),
        "Develop downloadable resources like cheatsheets, templates, or reference guides".to_string(),
        "Add short video demonstrations to complement text-based content".to_string(),
        "Consider creating a community discussion forum for students to share experiences".to_string(),
        format!("Add a glossary of key terms related to {title} for quick reference"),
        "Incorporate learning assessments at strategic points to gauge student understanding".to_string(),
    ];
    if description.chars().count() > 10 {
        suggestions.extend([
            "Break down complex topics into smaller, more digestible lessons".to_string(),
            "Create a visual roadmap showing how modules connect to each other".to_string(),
            "Include expert interviews or guest contributions for additional perspectives".to_string(),
        ]);
    }
    suggestions.truncate(7);
    suggestions
}

pub fn demo_assessment(subject: &str, count: usize) -> Vec<QuizQuestion> {
    (0..count)
        .map(|i| {
            let id = format!("q{}", i + 1);
            match i % 3 {
                0 => QuizQuestion {
                    id,
                    question_type: QuestionType::MultipleChoice,
                    question: format!("Which statement best describes a core principle of {subject}?"),
                    options: vec![
                        "It builds on clearly defined fundamentals".into(),
                        "It has no practical applications".into(),
                        "It cannot be learned step by step".into(),
                        "It ignores real-world constraints".into(),
                    ],
                    correct_answer: Answer::Single("It builds on clearly defined fundamentals".into()),
                    feedback: Some("Every discipline rests on a set of fundamentals.".into()),
                    points: Some(1),
                },
                1 => QuizQuestion {
                    id,
                    question_type: QuestionType::TrueFalse,
                    question: format!("Practising {subject} regularly improves retention."),
                    options: vec!["True".into(), "False".into()],
                    correct_answer: Answer::Single("True".into()),
                    feedback: Some("Spaced practice strengthens long-term memory.".into()),
                    points: Some(1),
                },
                _ => QuizQuestion {
                    id,
                    question_type: QuestionType::ShortAnswer,
                    question: format!("Name one practical application of {subject}."),
                    options: vec![],
                    correct_answer: Answer::Single("Answers will vary".into()),
                    feedback: Some("Relate the concept to a situation from your own work.".into()),
                    points: Some(1),
                },
            }
        })
        .collect()
}

/// Printable assessment sheet with an answer key per question.
pub fn assessment_html(subject: &str, questions: &[QuizQuestion]) -> String {
    let mut html = format!("<h2>Assessment Questions for {}</h2>\n<ol class=\"assessment\">\n", escape(subject));
    for q in questions {
        html.push_str(&format!("<li><p>{}</p>", escape(&q.question)));
        if !q.options.is_empty() {
            html.push_str("<ul>");
            for option in &q.options {
                html.push_str(&format!("<li>{}</li>", escape(option)));
            }
            html.push_str("</ul>");
        }
        html.push_str(&format!(
            "<p class=\"answer\"><strong>Answer:</strong> {}</p></li>\n",
            escape(&q.correct_answer.display())
        ));
    }
    html.push_str("</ol>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assessment_sheet_lists_answers() {
        let html = assessment_html("Bees & Wasps", &demo_assessment("Bees", 2));
        assert!(html.starts_with("<h2>Assessment Questions for Bees &amp; Wasps</h2>"));
        assert_eq!(html.matches("class=\"answer\"").count(), 2);
        assert!(html.contains("<li>True</li>"));
    }

    #[test]
    fn demo_outline_is_deterministic() {
        let a = demo_outline("Beekeeping");
        assert_eq!(a, demo_outline("Beekeeping"));
        assert_eq!(a.modules.len(), 5);
        assert_eq!(a.modules[0].title, "Introduction to Beekeeping");
        assert_eq!(a.modules[4].title, "Mastery and Practical Applications");
        let counts: Vec<usize> = a.modules.iter().map(|m| m.lessons.len()).collect();
        assert_eq!(counts, vec![3, 4, 3, 4, 3]);
        assert_eq!(a.suggestions.len(), 5);
    }

    #[test]
    fn long_subjects_are_truncated_in_titles() {
        let subject = "a".repeat(50);
        let outline = demo_outline(&subject);
        assert_eq!(outline.modules[0].title, format!("Introduction to {}", "a".repeat(30)));
        assert_eq!(outline.modules[1].title, format!("Fundamentals of {}", "a".repeat(25)));
    }

    #[test]
    fn suggestions_cap_at_seven() {
        assert_eq!(demo_suggestions("Bees", "").len(), 7);
        assert_eq!(demo_suggestions("Bees", "A long enough description").len(), 7);
    }

    #[test]
    fn parses_suggestion_shapes() {
        assert_eq!(parse_suggestions(r#"["a","b"]"#).unwrap(), vec!["a", "b"]);
        assert_eq!(parse_suggestions(r#"{"suggestions":["x"]}"#).unwrap(), vec!["x"]);
        assert!(parse_suggestions("42").is_err());
    }

    #[test]
    fn parsed_questions_get_ids() {
        let raw = r#"{"questions":[{"type":"trueFalse","question":"Sky is blue?","options":["True","False"],"correctAnswer":"True"}]}"#;
        let qs = parse_questions(raw).unwrap();
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].id, "q1");
    }

    #[test]
    fn demo_assessment_honours_count() {
        let qs = demo_assessment("Rust", 4);
        assert_eq!(qs.len(), 4);
        assert_eq!(qs[3].question_type, QuestionType::MultipleChoice);
    }

    #[tokio::test]
    async fn demo_mode_escapes_user_text() {
        let ai = AiAssistant::demo();
        assert!(ai.is_demo());
        let html = ai.generate_description("<Bees>").await;
        assert!(html.contains("&lt;Bees&gt;"));
        let improved = ai.improve_content("<p>x</p>", Some("be \"bold\"")).await;
        assert!(improved.ends_with("<p>x</p>"));
        assert!(improved.contains("&quot;bold&quot;"));
    }

    #[tokio::test]
    async fn unreachable_api_falls_back_to_demo() {
        let ai = AiAssistant::new(AiSettings {
            api_key: Some("sk-test".into()),
            base_url: "http://127.0.0.1:9".into(),
            model: "gpt-4o".into(),
        });
        assert!(!ai.is_demo());
        let outline = ai.generate_outline("Bees", None).await;
        assert_eq!(outline, demo_outline("Bees"));
    }
}
