//! The line interpreter.
//!
//! A line is tokenized, its first token resolved to a [`Command`] through
//! the session's search prefixes, its remaining tokens substituted
//! (`{{name}}` reads a variable, `{line}` evaluates a nested line) and the
//! command executed.  Control flow, named blocks, concurrent launch and
//! host-method invocation are all ordinary commands layered on that loop.
//!
//! # Quick start
//!
//! ```rust
//! use kscript::script::{evaluate_sequence, Environment, Session, Value};
//!
//! let session = Session::new(Environment::new());
//! let out = evaluate_sequence(
//!     &["StoreValue v = {GetAsInteger64 1}", "GetAsInteger64 {{v}}"],
//!     &session,
//! )
//! .unwrap();
//! assert_eq!(out, Value::Integer(1));
//! ```

pub mod block;
pub mod builtins;
pub mod control;
pub mod env;
pub mod error;
pub mod interp;
pub mod invoke;
pub mod launch;
pub mod registry;
pub mod session;
pub mod token;
pub mod value;

// Re-exports for convenience.
pub use block::NamedBlock;
pub use env::Environment;
pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use interp::{evaluate_line, evaluate_sequence};
pub use invoke::{HostCatalog, HostClass, HostMethod, HostRef};
pub use launch::TaskHandle;
pub use registry::{Command, PreEvaluation, Registry};
pub use session::Session;
pub use value::Value;
