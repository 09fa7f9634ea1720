//! Environment-file parser.
//!
//! An environment file seeds the interpreter [`Environment`] before a
//! script runs:
//!
//! | Line | Action |
//! |------|--------|
//! | `KEY=VALUE` | set `KEY`; everything after the first `=` is the value |
//! | `KEY` | set `KEY` to the empty string |
//! | blank, `# …`, `// …` | ignored |
//!
//! The same `KEY=VALUE` form is accepted for `-LineEnv` arguments.

use std::path::Path;

use crate::script::env::Environment;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading an environment file.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Parsed environment entries, in file order.
#[derive(Debug, Default)]
pub struct EnvFile {
    pub entries: Vec<(String, String)>,
}

impl EnvFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an environment file's contents.
    ///
    /// Returns the entries and a list of any lines that were rejected.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut file = EnvFile::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            match parse_entry(line) {
                Ok(entry) => file.entries.push(entry),
                Err(msg) => errors.push(ConfigError { line: lineno, message: msg }),
            }
        }

        (file, errors)
    }

    /// Read and parse an environment file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Parse `key=value` strings given on the command line.
    ///
    /// Error line numbers are 1-based argument positions.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> (Self, Vec<ConfigError>) {
        let mut file = EnvFile::new();
        let mut errors = Vec::new();
        for (i, pair) in pairs.iter().enumerate() {
            match parse_entry(pair.as_ref().trim()) {
                Ok(entry) => file.entries.push(entry),
                Err(msg) => errors.push(ConfigError { line: i + 1, message: msg }),
            }
        }
        (file, errors)
    }

    /// Write every entry into `env`; later entries win.
    pub fn apply(&self, env: &Environment) {
        for (key, value) in &self.entries {
            env.set(key.clone(), value.clone());
        }
    }
}

// ── Entry parser ──────────────────────────────────────────────────────────────

fn parse_entry(line: &str) -> Result<(String, String), String> {
    let (key, value) = line.split_once('=').unwrap_or((line, ""));
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in {line:?}"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
