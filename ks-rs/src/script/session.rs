//! Session state shared by every evaluation chain of one run.
//!
//! A [`Session`] is a cheap, clonable handle.  All clones share the same
//! stores (variables, last result, termination, search prefixes) through an
//! `Arc`, and every store is internally synchronised, so a handle can be
//! moved into a worker thread by Concurrent Launch without any aliasing of
//! mutable state.
//!
//! Each handle also carries a [`BlockContext`] *by value*: the name of the
//! named block currently running on this chain and whether block masking has
//! already been consumed.  Running a block derives a child handle with its
//! own context instead of writing marker flags into the shared
//! [`Environment`].

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::env::{Environment, MASK_CODEBLOCK};
use super::invoke::HostCatalog;
use super::registry::Registry;
use super::value::Value;

/// Search prefixes installed in every new session.
pub const DEFAULT_SEARCH_PREFIXES: &[&str] = &["ks.control", "ks.commands", "ks.types"];

// ── BlockContext ──────────────────────────────────────────────────────────────

/// Per-chain named-block state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockContext {
    /// Name of the block whose lines are currently being run, if any.
    pub current: Option<String>,
    /// Set once a masked block has run on this chain; nested blocks are then
    /// never masked.
    pub mask_consumed: bool,
}

// ── SessionInner ──────────────────────────────────────────────────────────────

struct SessionInner {
    env: Environment,
    registry: Arc<Registry>,
    hosts: Arc<HostCatalog>,
    vars: DashMap<String, Value>,
    last_result: Mutex<Value>,
    /// `Some(value)` once the session has been terminated.
    termination: RwLock<Option<Value>>,
    prefixes: RwLock<Vec<String>>,
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Handle to a session's shared state plus this chain's [`BlockContext`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
    block: BlockContext,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("vars", &self.inner.vars.len())
            .field("terminated", &self.is_terminated())
            .field("block", &self.block)
            .finish()
    }
}

impl Session {
    /// Create a session with the standard command registry and an empty
    /// host catalog.
    pub fn new(env: Environment) -> Self {
        SessionBuilder::new(env).build()
    }

    /// Start building a session with a custom registry or host catalog.
    pub fn builder(env: Environment) -> SessionBuilder {
        SessionBuilder::new(env)
    }

    // ── Shared collaborators ──────────────────────────────────────────────

    pub fn environment(&self) -> &Environment {
        &self.inner.env
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn hosts(&self) -> &HostCatalog {
        &self.inner.hosts
    }

    /// `true` if both handles refer to the same underlying session.
    pub fn same_session(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A non-owning handle, for values stored inside this session.
    pub fn downgrade(&self) -> WeakSession {
        WeakSession { inner: Arc::downgrade(&self.inner), block: self.block.clone() }
    }

    // ── Complex variables ─────────────────────────────────────────────────

    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.inner.vars.get(name).map(|v| v.value().clone())
    }

    pub fn set_var(&self, name: impl Into<String>, value: Value) {
        self.inner.vars.insert(name.into(), value);
    }

    /// Remove a variable, returning its old value.
    pub fn remove_var(&self, name: &str) -> Option<Value> {
        self.inner.vars.remove(name).map(|(_, v)| v)
    }

    pub fn contains_var(&self, name: &str) -> bool {
        self.inner.vars.contains_key(name)
    }

    /// Atomic read-modify-write of one variable.
    ///
    /// `f` sees the current value (if any) and returns the new one; no other
    /// writer can slip in between.
    pub fn update_var<F>(&self, name: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut entry = self.inner.vars.entry(name.to_owned()).or_insert(Value::Null);
        let existing = if entry.is_null() { None } else { Some(entry.value()) };
        let new = f(existing);
        *entry.value_mut() = new.clone();
        new
    }

    /// Return the variable `name`, inserting `make()` first if it is absent.
    pub fn get_or_insert_var_with<F>(&self, name: &str, make: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        self.inner.vars.entry(name.to_owned()).or_insert_with(make).value().clone()
    }

    /// Names of all variables starting with `prefix`, sorted.
    pub fn var_names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .vars
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    // ── Last result ───────────────────────────────────────────────────────

    pub fn last_result(&self) -> Value {
        self.inner.last_result.lock().clone()
    }

    pub fn set_last_result(&self, value: Value) {
        *self.inner.last_result.lock() = value;
    }

    // ── Termination ───────────────────────────────────────────────────────

    pub fn is_terminated(&self) -> bool {
        self.inner.termination.read().is_some()
    }

    /// The terminating value, or `None` while the session is live.
    pub fn terminating_value(&self) -> Option<Value> {
        self.inner.termination.read().clone()
    }

    /// Terminate the session.  Termination is sticky: the first value wins.
    pub fn terminate(&self, value: Value) -> Value {
        let mut slot = self.inner.termination.write();
        slot.get_or_insert(value).clone()
    }

    // ── Search prefixes ───────────────────────────────────────────────────

    /// Ordered command-namespace prefixes used to resolve bare names.
    pub fn search_prefixes(&self) -> Vec<String> {
        self.inner.prefixes.read().clone()
    }

    pub fn set_search_prefixes(&self, prefixes: Vec<String>) {
        *self.inner.prefixes.write() = prefixes;
    }

    /// Append a prefix (lowest priority).
    pub fn add_search_prefix(&self, prefix: impl Into<String>) {
        self.inner.prefixes.write().push(prefix.into());
    }

    // ── Block context ─────────────────────────────────────────────────────

    pub fn block_context(&self) -> &BlockContext {
        &self.block
    }

    /// Name of the block currently running on this chain.
    pub fn current_block(&self) -> Option<&str> {
        self.block.current.as_deref()
    }

    /// Derive the handle a block named `name` runs its lines on.
    ///
    /// When `MaskCodeblock` is `1` or lists `name;`, and masking has not yet
    /// been consumed on this chain, the child keeps the parent's running
    /// marker and consumes the mask.  Otherwise the child's marker is `name`.
    pub fn enter_block(&self, name: &str) -> Session {
        let masked = !self.block.mask_consumed && {
            let mask = self.inner.env.get(MASK_CODEBLOCK).unwrap_or_default();
            mask == "1" || mask.contains(&format!("{name};"))
        };
        let block = if masked {
            BlockContext { current: self.block.current.clone(), mask_consumed: true }
        } else {
            BlockContext { current: Some(name.to_owned()), mask_consumed: self.block.mask_consumed }
        };
        Session { inner: Arc::clone(&self.inner), block }
    }
}

// ── WeakSession ───────────────────────────────────────────────────────────────

/// Non-owning session handle; see [`Session::downgrade`].
#[derive(Debug, Clone)]
pub struct WeakSession {
    inner: Weak<SessionInner>,
    block: BlockContext,
}

impl WeakSession {
    /// Recover the session if it is still alive.
    pub fn upgrade(&self) -> Option<Session> {
        self.inner
            .upgrade()
            .map(|inner| Session { inner, block: self.block.clone() })
    }
}

// ── SessionBuilder ────────────────────────────────────────────────────────────

/// Builder for [`Session`].
pub struct SessionBuilder {
    env: Environment,
    registry: Option<Arc<Registry>>,
    hosts: Option<Arc<HostCatalog>>,
    prefixes: Vec<String>,
}

impl SessionBuilder {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            registry: None,
            hosts: None,
            prefixes: DEFAULT_SEARCH_PREFIXES.iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn hosts(mut self, hosts: Arc<HostCatalog>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    pub fn search_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Session {
        let inner = SessionInner {
            env: self.env,
            registry: self.registry.unwrap_or_else(|| Arc::new(Registry::standard())),
            hosts: self.hosts.unwrap_or_else(|| Arc::new(HostCatalog::new())),
            vars: DashMap::new(),
            last_result: Mutex::new(Value::Null),
            termination: RwLock::new(None),
            prefixes: RwLock::new(self.prefixes),
        };
        Session { inner: Arc::new(inner), block: BlockContext::default() }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
