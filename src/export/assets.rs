//! Static package assets (runtime scripts and stylesheets).
//!
//! Each package kind ships built-in defaults. Files found under
//! `{templates_dir}/{kind}/` replace a default with the same relative path or are added
//! alongside it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Path inside the package, `/`-separated.
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AssetSource {
    root: PathBuf,
}

impl AssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn load(&self, kind: &str, defaults: &[(&str, &str)]) -> Vec<Asset> {
        let mut assets: BTreeMap<String, Vec<u8>> = defaults
            .iter()
            .map(|(path, body)| (path.to_string(), body.as_bytes().to_vec()))
            .collect();

        let dir = self.root.join(kind);
        if dir.is_dir() {
            for entry in WalkDir::new(&dir) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, dir = %dir.display(), "skipping unreadable template entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(rel) = package_path(&dir, entry.path()) else {
                    continue;
                };
                match std::fs::read(entry.path()) {
                    Ok(bytes) => {
                        debug!(kind, path = %rel, "using template asset");
                        assets.insert(rel, bytes);
                    }
                    Err(e) => {
                        warn!(error = %e, path = %entry.path().display(), "template read failed, keeping default")
                    }
                }
            }
        }

        assets.into_iter().map(|(path, bytes)| Asset { path, bytes }).collect()
    }
}

// Top-level files and module_* folders belong to the generated content.
fn package_path(base: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() < 2 || parts[0].starts_with("module_") {
        return None;
    }
    Some(parts.join("/"))
}

pub const COURSE_CSS: &str = r#"/* Course package styles */
body {
  font-family: Arial, sans-serif;
  margin: 0;
  padding: 0;
  color: #333;
  line-height: 1.6;
}

.course-container, .lesson-container {
  max-width: 1000px;
  margin: 0 auto;
  padding: 20px;
}

.course-header, .lesson-header {
  margin-bottom: 30px;
  border-bottom: 1px solid #eee;
  padding-bottom: 20px;
}

.course-header h1, .lesson-header h1 {
  font-size: 2.5em;
  margin-bottom: 10px;
  color: #2c3e50;
}

.lesson-info {
  font-size: 0.9em;
  color: #7f8c8d;
}

.module-navigation {
  background-color: #f8f9fa;
  border-radius: 8px;
  padding: 20px;
  margin-bottom: 30px;
}

.module-navigation ul {
  list-style-type: none;
  padding-left: 0;
}

.module-navigation li {
  margin-bottom: 10px;
}

.course-content, .lesson-content {
  line-height: 1.8;
}

.lesson-content h2 {
  margin-top: 30px;
  color: #2c3e50;
}

.interactive {
  margin: 30px 0;
  padding: 20px;
  border: 1px solid #e1e8ed;
  border-radius: 8px;
}

.course-footer, .lesson-footer {
  margin-top: 50px;
  border-top: 1px solid #eee;
  padding-top: 20px;
  color: #7f8c8d;
}

.lesson-navigation {
  display: flex;
  justify-content: space-between;
  margin-top: 30px;
}

.lesson-navigation a {
  background-color: #3498db;
  color: white;
  padding: 10px 15px;
  border-radius: 4px;
  text-decoration: none;
  font-size: 0.9em;
}

.lesson-navigation a:hover {
  background-color: #2980b9;
}

@media (max-width: 768px) {
  .course-container, .lesson-container {
    padding: 15px;
  }

  .course-header h1, .lesson-header h1 {
    font-size: 2em;
  }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &[(&str, &str)] = &[("scripts/api.js", "// default api"), ("styles/main.css", "body{}")];

    #[test]
    fn falls_back_to_defaults_without_templates() {
        let source = AssetSource::new("/definitely/not/here");
        let assets = source.load("scorm", DEFAULTS);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].path, "scripts/api.js");
        assert_eq!(assets[0].bytes, b"// default api");
    }

    #[test]
    fn template_files_override_and_extend() {
        let tmp = tempfile::tempdir().unwrap();
        let scripts = tmp.path().join("scorm").join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("api.js"), "// custom api").unwrap();
        std::fs::write(scripts.join("extra.js"), "// extra").unwrap();
        // reserved for generated content
        std::fs::write(tmp.path().join("scorm").join("index.html"), "<p>nope</p>").unwrap();

        let assets = AssetSource::new(tmp.path()).load("scorm", DEFAULTS);
        let paths: Vec<&str> = assets.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["scripts/api.js", "scripts/extra.js", "styles/main.css"]);
        assert_eq!(assets[0].bytes, b"// custom api");
        assert_eq!(assets[2].bytes, b"body{}");
    }
}
