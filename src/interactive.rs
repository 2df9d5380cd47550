//! Interactive lesson elements: tabs, drag & drop activities and quizzes.
//!
//! Elements live on the lesson as an ordered list. Older clients embedded them in the
//! lesson HTML as a hidden `interactive-elements-container` div carrying the JSON in a
//! `data-interactive-elements` attribute; [`extract_embedded`] lifts that payload out.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InteractiveElement {
    Tabs(Tabs),
    DragDrop(DragDrop),
    Quiz(Quiz),
}

impl InteractiveElement {
    pub fn id(&self) -> &str {
        match self {
            InteractiveElement::Tabs(t) => &t.id,
            InteractiveElement::DragDrop(d) => &d.id,
            InteractiveElement::Quiz(q) => &q.id,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tabs {
    pub id: String,
    #[serde(default)]
    pub tabs: Vec<TabContent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabContent {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DragDrop {
    pub id: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub items: Vec<DragDropItem>,
    #[serde(default)]
    pub zones: Vec<DropZone>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DragDropItem {
    pub id: String,
    pub text: String,
    pub correct_zone: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DropZone {
    pub id: String,
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Matching,
    FillInBlank,
}

/// An answer as authored or submitted. Matching questions use a left -> right map.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Many(Vec<String>),
    Pairs(BTreeMap<String, String>),
}

impl Answer {
    fn matches(&self, submitted: &Answer) -> bool {
        match (self, submitted) {
            (Answer::Single(want), Answer::Single(got)) => eq_ignore_case(want, got),
            (Answer::Many(want), Answer::Many(got)) => {
                want.len() == got.len() && want.iter().zip(got).all(|(w, g)| eq_ignore_case(w, g))
            }
            (Answer::Pairs(want), Answer::Pairs(got)) => {
                want.len() == got.len()
                    && want
                        .iter()
                        .all(|(k, v)| got.get(k).is_some_and(|g| eq_ignore_case(v, g)))
            }
            _ => false,
        }
    }

    /// Human readable form, used in exported answer keys.
    pub fn display(&self) -> String {
        match self {
            Answer::Single(s) => s.clone(),
            Answer::Many(v) => v.join(", "),
            Answer::Pairs(m) => m
                .iter()
                .map(|(k, v)| format!("{k} → {v}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Answer,
    pub feedback: Option<String>,
    pub points: Option<u32>,
}

impl QuizQuestion {
    fn points(&self) -> u32 {
        self.points.unwrap_or(1)
    }
}

fn default_passing_score() -> u32 {
    70
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(default = "default_passing_score")]
    pub passing_score: u32,
    #[serde(default)]
    pub shuffle_questions: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    /// Percentage 0..=100.
    pub score: u32,
    pub passed: bool,
    pub earned_points: u32,
    pub total_points: u32,
    /// Question ids answered incorrectly (or not at all).
    pub missed: Vec<String>,
}

impl Quiz {
    /// Grades submitted answers keyed by question id. Questions without an id are keyed
    /// `q-{index}`.
    pub fn grade(&self, answers: &HashMap<String, Answer>) -> QuizResult {
        let mut earned = 0u64;
        let mut total = 0u64;
        let mut missed = Vec::new();

        for (index, question) in self.questions.iter().enumerate() {
            let key = question_key(question, index);
            total += u64::from(question.points());
            let correct = answers
                .get(&key)
                .is_some_and(|submitted| question.correct_answer.matches(submitted));
            if correct {
                earned += u64::from(question.points());
            } else {
                missed.push(key);
            }
        }

        let score = if total == 0 {
            0
        } else {
            ((earned as f64 / total as f64) * 100.0).round() as u32
        };

        QuizResult {
            score,
            passed: total > 0 && score >= self.passing_score,
            earned_points: u32::try_from(earned).unwrap_or(u32::MAX),
            total_points: u32::try_from(total).unwrap_or(u32::MAX),
            missed,
        }
    }
}

fn question_key(question: &QuizQuestion, index: usize) -> String {
    if question.id.is_empty() {
        format!("q-{index}")
    } else {
        question.id.clone()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DragDropResult {
    pub correct: Vec<String>,
    pub incorrect: Vec<String>,
    pub complete: bool,
}

impl DragDrop {
    /// Checks item placements (item id -> zone id). Unplaced items count as incorrect.
    pub fn check(&self, placements: &HashMap<String, String>) -> DragDropResult {
        let (correct, incorrect): (Vec<_>, Vec<_>) = self
            .items
            .iter()
            .partition(|item| placements.get(&item.id) == Some(&item.correct_zone));
        DragDropResult {
            complete: incorrect.is_empty(),
            correct: correct.into_iter().map(|i| i.id.clone()).collect(),
            incorrect: incorrect.into_iter().map(|i| i.id.clone()).collect(),
        }
    }
}

// ------------- legacy embedded payload -------------

static CONTAINER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<div class="interactive-elements-container"[^>]*>.*?</div>"#)
        .expect("static regex")
});

static PAYLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<div class="interactive-elements-container"[^>]*data-interactive-elements='([^']*)'"#)
        .expect("static regex")
});

/// Splits lesson HTML into the content without the hidden container and the elements it
/// carried.
///
/// The payload is normally raw JSON; an entity-escaped payload is accepted as a fallback.
/// When no payload decodes, the HTML is returned untouched with `None` so nothing is lost.
pub fn extract_embedded(html: &str) -> (String, Option<Vec<InteractiveElement>>) {
    let Some(raw) = PAYLOAD.captures(html).and_then(|caps| caps.get(1)) else {
        return (html.to_string(), None);
    };
    match decode_payload(raw.as_str()) {
        Ok(elements) => {
            let cleaned = CONTAINER.replace_all(html, "").trim_end().to_string();
            (cleaned, Some(elements))
        }
        Err(e) => {
            tracing::warn!(error = %e, "embedded interactive elements unreadable, content kept");
            (html.to_string(), None)
        }
    }
}

fn decode_payload(raw: &str) -> Result<Vec<InteractiveElement>, serde_json::Error> {
    serde_json::from_str(raw).or_else(|first| match quick_xml::escape::unescape(raw) {
        Ok(unescaped) if unescaped != raw => serde_json::from_str(&unescaped),
        _ => Err(first),
    })
}

/// Removes any legacy container without decoding it.
pub fn strip_embedded(html: &str) -> String {
    CONTAINER.replace_all(html, "").into_owned()
}
