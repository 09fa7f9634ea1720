//! Named blocks: stored, re-runnable sequences of lines.
//!
//! A block lives in its session's variable store under
//! [`block_key`]`(name)`.  The line list and execution counter are
//! internally synchronised, so concurrent `add` and `run` calls on the same
//! block never corrupt it (their relative order is unspecified).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::error::{ScriptError, ScriptResult};
use super::interp::evaluate_sequence;
use super::session::{Session, WeakSession};
use super::value::Value;

/// Variable-store namespace for blocks.
pub const BLOCK_KEY_PREFIX: &str = "ks.block:";

/// Variable-store key of the block named `name`.
pub fn block_key(name: &str) -> String {
    format!("{BLOCK_KEY_PREFIX}{name}")
}

// ── NamedBlock ────────────────────────────────────────────────────────────────

pub struct NamedBlock {
    name: String,
    lines: Mutex<Vec<String>>,
    executions: AtomicU64,
    bound: Mutex<Option<WeakSession>>,
}

impl NamedBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Mutex::new(Vec::new()),
            executions: AtomicU64::new(0),
            bound: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one line of source.
    pub fn push_line(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Snapshot of the stored lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// How many times the block has been run.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Remember `session` for [`NamedBlock::run_bound`].
    pub fn bind(&self, session: &Session) {
        *self.bound.lock() = Some(session.downgrade());
    }

    /// Run the block's lines against `session`.
    ///
    /// The lines are evaluated on a child handle whose block context names
    /// this block (subject to masking; see [`Session::enter_block`]).
    pub fn run(&self, session: &Session) -> ScriptResult<Value> {
        let lines = self.lines();
        let count = self.executions.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(block = %self.name, lines = lines.len(), run = count, "run block");
        let child = session.enter_block(&self.name);
        evaluate_sequence(&lines, &child).map_err(|e| e.in_block(&self.name))
    }

    /// Run against the session recorded by [`NamedBlock::bind`].
    pub fn run_bound(&self) -> ScriptResult<Value> {
        let session = self
            .bound
            .lock()
            .as_ref()
            .and_then(WeakSession::upgrade)
            .ok_or_else(|| {
                ScriptError::Invocation(format!("code block {} has no live session", self.name))
            })?;
        self.run(&session)
    }
}

impl fmt::Debug for NamedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedBlock")
            .field("name", &self.name)
            .field("lines", &self.len())
            .field("executions", &self.executions())
            .finish()
    }
}

impl fmt::Display for NamedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Codeblock: {} ({} lines, {} executions)",
            self.name,
            self.len(),
            self.executions()
        )
    }
}

// ── Session helpers ───────────────────────────────────────────────────────────

/// Replace any block called `name` with a fresh, empty one.
pub fn make_block(session: &Session, name: &str) -> Arc<NamedBlock> {
    let block = Arc::new(NamedBlock::new(name));
    session.set_var(block_key(name), Value::Block(Arc::clone(&block)));
    block
}

/// Look up the block called `name`.
pub fn find_block(session: &Session, name: &str) -> Option<Arc<NamedBlock>> {
    match session.get_var(&block_key(name)) {
        Some(Value::Block(block)) => Some(block),
        _ => None,
    }
}

/// Look up the block called `name`, creating it when missing.
pub fn find_or_make_block(session: &Session, name: &str) -> ScriptResult<Arc<NamedBlock>> {
    let value = session.get_or_insert_var_with(&block_key(name), || {
        Value::Block(Arc::new(NamedBlock::new(name)))
    });
    match value {
        Value::Block(block) => Ok(block),
        other => Err(ScriptError::argument(
            "Codeblock",
            format!("{} holds a {}, not a code block", block_key(name), other.type_name()),
        )),
    }
}

/// Remove the block called `name`.  Returns `true` if it existed.
pub fn delete_block(session: &Session, name: &str) -> bool {
    session.remove_var(&block_key(name)).is_some()
}

/// Names of all stored blocks, sorted.
pub fn block_names(session: &Session) -> Vec<String> {
    session
        .var_names_with_prefix(BLOCK_KEY_PREFIX)
        .into_iter()
        .filter_map(|key| key.strip_prefix(BLOCK_KEY_PREFIX).map(str::to_owned))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
