//! Error type for the interpreter core.
//!
//! Nothing inside the core recovers from an error.  Each enclosing frame
//! wraps the failure in a context variant (`InArgument`, `InCommand`, …), so
//! the outermost error carries a breadcrumb trail down to the root cause.
//! Use [`ScriptError::root`] to get at the cause and [`ScriptError::trail`]
//! to print the whole chain.

use std::error::Error as _;

use thiserror::Error;

/// Result alias used throughout the interpreter.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Broad classification of a failure, taken from its root cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty or malformed command name.
    Syntax,
    /// Unknown command, unknown variable, or no matching host overload.
    Resolution,
    /// Wrong argument count or type.
    ArityOrType,
    /// A command or host method failed while running.
    Invocation,
    /// A host method could not be reached.
    HostAccess,
    /// Nested evaluation went too deep.
    Limit,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("variable {0} not found in session")]
    VariableNotFound(String),

    #[error("no compatible overload for {method} on {type_name}")]
    NoCompatibleOverload { method: String, type_name: String },

    #[error("{command}: {message}")]
    Argument { command: String, message: String },

    #[error("{0}")]
    Invocation(String),

    #[error("host access error: {0}")]
    HostAccess(String),

    #[error("evaluation nested deeper than {0} levels")]
    TooDeep(usize),

    // ── Context frames ────────────────────────────────────────────────────

    #[error("failed to evaluate argument {index} of \"{line}\"")]
    InArgument {
        index: usize,
        line: String,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("failed to execute command \"{command}\" at line: \"{line}\"")]
    InCommand {
        command: String,
        line: String,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("failed to execute line {number}: \"{line}\"")]
    InLine {
        number: usize,
        line: String,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("error executing code block: {name}")]
    InBlock {
        name: String,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("{what} failed")]
    InLoop {
        what: &'static str,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// Shorthand for an arity/type failure raised by `command`.
    pub fn argument(command: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError::Argument { command: command.into(), message: message.into() }
    }

    /// Wrap `self` as the cause of a failing argument substitution.
    pub fn in_argument(self, index: usize, line: impl Into<String>) -> Self {
        ScriptError::InArgument { index, line: line.into(), source: Box::new(self) }
    }

    /// Wrap `self` as the cause of a failing command.
    pub fn in_command(self, command: impl Into<String>, line: impl Into<String>) -> Self {
        ScriptError::InCommand { command: command.into(), line: line.into(), source: Box::new(self) }
    }

    /// Wrap `self` as the cause of a failing line in a sequence (1-based).
    pub fn in_line(self, number: usize, line: impl Into<String>) -> Self {
        ScriptError::InLine { number, line: line.into(), source: Box::new(self) }
    }

    pub fn in_block(self, name: impl Into<String>) -> Self {
        ScriptError::InBlock { name: name.into(), source: Box::new(self) }
    }

    pub fn in_loop(self, what: &'static str) -> Self {
        ScriptError::InLoop { what, source: Box::new(self) }
    }

    /// The innermost cause.
    pub fn root(&self) -> &ScriptError {
        let mut cur = self;
        while let Some(inner) = cur.context_source() {
            cur = inner;
        }
        cur
    }

    /// Classification of the root cause.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            ScriptError::Syntax(_) => ErrorKind::Syntax,
            ScriptError::CommandNotFound(_)
            | ScriptError::VariableNotFound(_)
            | ScriptError::NoCompatibleOverload { .. } => ErrorKind::Resolution,
            ScriptError::Argument { .. } => ErrorKind::ArityOrType,
            ScriptError::Invocation(_) => ErrorKind::Invocation,
            ScriptError::HostAccess(_) => ErrorKind::HostAccess,
            ScriptError::TooDeep(_) => ErrorKind::Limit,
            // `root` never stops on a context frame.
            _ => ErrorKind::Invocation,
        }
    }

    /// Render the whole chain, outermost first, joined with `: `.
    pub fn trail(&self) -> String {
        let mut out = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }

    fn context_source(&self) -> Option<&ScriptError> {
        match self {
            ScriptError::InArgument { source, .. }
            | ScriptError::InCommand { source, .. }
            | ScriptError::InLine { source, .. }
            | ScriptError::InBlock { source, .. }
            | ScriptError::InLoop { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
