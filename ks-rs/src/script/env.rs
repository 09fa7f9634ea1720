//! Interpreter-level environment store.
//!
//! A flat string → string table holding configuration such as the shell
//! prompt format.  One [`Environment`] is created per top-level run and is
//! shared (by cloning the handle) with every session and worker thread built
//! on it.

use std::sync::Arc;

use dashmap::DashMap;

/// Shell prompt format.
pub const SHELL_INPUT_HEAD: &str = "ShellInputHead";
/// `1` echoes each shell result.
pub const PRINT_RESULT: &str = "PrintResult";
/// `1`, or a `name;name;…` list of blocks whose running marker is masked.
pub const MASK_CODEBLOCK: &str = "MaskCodeblock";

/// Default value of [`SHELL_INPUT_HEAD`].
pub const DEFAULT_SHELL_INPUT_HEAD: &str = "{Username}@{CurrentDirectoryWithSimplifyIfHome} # ";

/// Shared key/value configuration store.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Arc<DashMap<String, String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a key.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Get a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).map(|v| v.value().clone())
    }

    /// Get the value stored under `key`, or `default`.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    /// `true` if `key` holds exactly `"1"`.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.vars.get(key).is_some_and(|v| v.value() == "1")
    }

    /// Remove a key.  Returns `true` if it existed.
    pub fn unset(&self, key: &str) -> bool {
        self.vars.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Snapshot of all entries, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .vars
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let env = Environment::new();
        env.set(PRINT_RESULT, "1");
        assert_eq!(env.get(PRINT_RESULT).as_deref(), Some("1"));
        assert!(env.is_enabled(PRINT_RESULT));
    }

    #[test]
    fn clones_share_the_table() {
        let env = Environment::new();
        let other = env.clone();
        other.set("x", "old");
        env.set("x", "new");
        assert_eq!(other.get("x").as_deref(), Some("new"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn get_or_default() {
        let env = Environment::new();
        assert_eq!(env.get_or(SHELL_INPUT_HEAD, DEFAULT_SHELL_INPUT_HEAD), DEFAULT_SHELL_INPUT_HEAD);
    }

    #[test]
    fn unset() {
        let env = Environment::new();
        env.set("gone", "bye");
        assert!(env.unset("gone"));
        assert!(!env.contains("gone"));
        assert!(!env.unset("gone"));
    }

    #[test]
    fn snapshot_is_sorted() {
        let env = Environment::new();
        env.set("b", "2");
        env.set("a", "1");
        assert_eq!(
            env.snapshot(),
            vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]
        );
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let env = Environment::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let env = env.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        env.set(format!("k{t}_{i}"), "v");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(env.len(), 800);
    }
}
