//! Process configuration, read from the environment after `.env` is loaded.

use std::path::PathBuf;
use std::time::Duration;

use crate::ai::AiSettings;
use crate::export::ExportSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub templates_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub pdf_timeout: Duration,
    pub completion_delay: Duration,
    pub activity_base: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub body_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset and unparsable
    /// numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let num = |key: &str, default: u64| {
            get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
        };
        let defaults = ExportSettings::default();
        let ai = AiSettings::default();

        Self {
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8081),
            database_url: get("DATABASE_URL"),
            templates_dir: get("TEMPLATES_DIR").map(PathBuf::from).unwrap_or(defaults.templates_dir),
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            pdf_timeout: Duration::from_secs(num("PDF_TIMEOUT_SECS", 60)),
            completion_delay: Duration::from_secs(num("LESSON_COMPLETION_DELAY_SECS", 60)),
            activity_base: get("XAPI_ACTIVITY_BASE").unwrap_or(defaults.activity_base),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(ai.base_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(ai.model),
            body_limit: num("BODY_LIMIT_BYTES", 10 * 1024 * 1024) as usize,
        }
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            templates_dir: self.templates_dir.clone(),
            completion_delay: self.completion_delay,
            activity_base: self.activity_base.clone(),
            pdf_timeout: self.pdf_timeout,
        }
    }

    pub fn ai_settings(&self) -> AiSettings {
        AiSettings {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            model: self.openai_model.clone(),
        }
    }
}
