//! Deployment answers
//!
//! Answers parameterize a packaged application: database credentials, the
//! target namespace, and so on. They are grouped in sections (`general` plus
//! one per component) and handed to the packaging tool as an ini file.
//!
//! # Example
//!
//! ```
//! use nulecule_harness::answers::Answers;
//!
//! let mut answers = Answers::new();
//! answers.set("general", "namespace", "default");
//! answers.set("wordpress", "db_user", "foo");
//!
//! assert!(answers.to_ini().contains("[wordpress]\ndb_user = foo\n"));
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::TempPath;

/// Errors reading or writing answers
#[derive(Debug, thiserror::Error)]
pub enum AnswersError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("failed to write answers file: {0}")]
    Io(#[from] std::io::Error),
}

/// Sections of key/value pairs, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Answers {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|values| values.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.section_mut(section)
            .insert(key.to_string(), value.into());
    }

    /// Section by name, created empty if missing
    pub fn section_mut(&mut self, section: &str) -> &mut BTreeMap<String, String> {
        self.sections.entry(section.to_string()).or_default()
    }

    pub fn section(&self, section: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(section)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Overlay `other`: its sections replace same-named sections wholesale
    pub fn merge(&mut self, other: Answers) {
        self.sections.extend(other.sections);
    }

    /// Builder-style [`Answers::set`]
    pub fn with(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        self.set(section, key, value);
        self
    }

    /// Render as an ini document
    pub fn to_ini(&self) -> String {
        let mut out = String::new();
        for (name, values) in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{name}]\n"));
            for (key, value) in values {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }

    /// Parse an ini document
    ///
    /// Supports `[section]` headers, `key = value` (or `key: value`) pairs and
    /// full-line `#` / `;` comments. Keys outside any section are an error.
    pub fn parse_ini(input: &str) -> Result<Self, AnswersError> {
        let mut answers = Self::new();
        let mut current: Option<String> = None;

        for (index, raw) in input.lines().enumerate() {
            let line = raw.trim();
            let line_no = index + 1;

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header.strip_suffix(']').ok_or_else(|| AnswersError::Parse {
                    line: line_no,
                    reason: format!("unterminated section header {line:?}"),
                })?;
                let name = name.trim();
                answers.section_mut(name);
                current = Some(name.to_string());
                continue;
            }

            let Some((key, value)) = line.split_once(['=', ':']) else {
                return Err(AnswersError::Parse {
                    line: line_no,
                    reason: format!("expected key = value, got {line:?}"),
                });
            };

            let Some(ref section) = current else {
                return Err(AnswersError::Parse {
                    line: line_no,
                    reason: format!("key {:?} outside of any section", key.trim()),
                });
            };

            answers.set(section, key.trim(), value.trim());
        }

        Ok(answers)
    }

    /// Write to a temporary `.conf` file for the packaging tool
    ///
    /// The file is removed when the returned path is dropped.
    pub fn write_temp(&self) -> Result<TempPath, AnswersError> {
        let mut file = tempfile::Builder::new()
            .prefix("answers-")
            .suffix(".conf")
            .tempfile()?;
        file.write_all(self.to_ini().as_bytes())?;
        Ok(file.into_temp_path())
    }
}
