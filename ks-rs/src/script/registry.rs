//! Command contract and registry.
//!
//! Control flow and leaf builtins alike implement
//! [`Command`].  The [`Registry`] maps fully-qualified names such as
//! `ks.control.While` to factories producing fresh instances.  Bare names are
//! resolved against a session's search prefixes; the first prefix under
//! which the name is registered wins.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::error::{ScriptError, ScriptResult};
use super::session::Session;
use super::value::Value;

/// Separator between a namespace prefix and a command name.
pub const NAMESPACE_SEPARATOR: char = '.';

// ── Pre-evaluation ────────────────────────────────────────────────────────────

/// Which argument positions the engine substitutes before dispatch.
///
/// Positions are 0-based and exclude the command name.  Positions that are
/// not eligible reach the command as raw [`Value::Text`] tokens, so the
/// command can evaluate them later (and more than once).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreEvaluation {
    /// Selective pre-evaluation disabled: every position is substituted.
    All,
    /// Selective pre-evaluation enabled: only the listed positions are.
    Only(&'static [usize]),
}

impl PreEvaluation {
    pub fn is_selective(&self) -> bool {
        matches!(self, PreEvaluation::Only(_))
    }

    pub fn is_eligible(&self, position: usize) -> bool {
        match self {
            PreEvaluation::All => true,
            PreEvaluation::Only(positions) => positions.contains(&position),
        }
    }
}

// ── Command ───────────────────────────────────────────────────────────────────

/// An executable unit callable from a script line.
///
/// Instances are created fresh for every dispatch; anything that must
/// outlive one call belongs in the [`Session`].
pub trait Command: Send + Sync {
    /// Run the command.  `args` excludes the command name.
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value>;

    /// Argument positions substituted before dispatch.
    fn pre_evaluation(&self) -> PreEvaluation {
        PreEvaluation::All
    }
}

/// Constructor for a fresh command instance.
pub type CommandFactory = Arc<dyn Fn() -> Box<dyn Command> + Send + Sync>;

/// Identification of a resolved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Fully-qualified name.
    pub name: String,
    pub pre_evaluation: PreEvaluation,
}

/// A command instance together with its descriptor.
pub struct ResolvedCommand {
    pub descriptor: CommandDescriptor,
    pub command: Box<dyn Command>,
}

impl fmt::Debug for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCommand").field("descriptor", &self.descriptor).finish()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Name → factory table.
#[derive(Default)]
pub struct Registry {
    commands: IndexMap<String, CommandFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("commands", &self.commands.keys()).finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in command installed.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        super::control::register(&mut registry);
        super::builtins::register(&mut registry);
        registry
    }

    /// Register a factory under a fully-qualified name, replacing any
    /// previous entry.
    pub fn register<F>(&mut self, qualified_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Command> + Send + Sync + 'static,
    {
        self.commands.insert(qualified_name.into(), Arc::new(factory));
    }

    /// Register a stateless command type under `namespace.name`.
    pub fn register_default<C>(&mut self, namespace: &str, name: &str)
    where
        C: Command + Default + 'static,
    {
        self.register(format!("{namespace}{NAMESPACE_SEPARATOR}{name}"), || {
            Box::new(C::default()) as Box<dyn Command>
        });
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.commands.contains_key(qualified_name)
    }

    /// All registered fully-qualified names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Find the fully-qualified name `name` resolves to.
    ///
    /// Names containing [`NAMESPACE_SEPARATOR`] are taken as-is.  Bare names
    /// are tried under each prefix in order and the first hit is used.
    pub fn qualify(&self, name: &str, prefixes: &[String]) -> Option<String> {
        if name.contains(NAMESPACE_SEPARATOR) {
            return self.contains(name).then(|| name.to_owned());
        }
        prefixes
            .iter()
            .map(|prefix| format!("{prefix}{NAMESPACE_SEPARATOR}{name}"))
            .find(|qualified| self.contains(qualified))
    }

    /// Resolve `name` and build a fresh instance.
    pub fn resolve(&self, name: &str, prefixes: &[String]) -> ScriptResult<ResolvedCommand> {
        let qualified = self
            .qualify(name, prefixes)
            .ok_or_else(|| ScriptError::CommandNotFound(name.to_owned()))?;
        let factory = self
            .commands
            .get(&qualified)
            .ok_or_else(|| ScriptError::CommandNotFound(name.to_owned()))?;
        let command = factory();
        Ok(ResolvedCommand {
            descriptor: CommandDescriptor { name: qualified, pre_evaluation: command.pre_evaluation() },
            command,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
