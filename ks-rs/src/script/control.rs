//! Control-flow commands: `While`, `Codeblock`, `Asynchronize`.
//!
//! All three are ordinary [`Command`]s registered under `ks.control`.  They
//! opt out of pre-evaluation for their code positions and call back into
//! the engine themselves, so a loop body or stored line is re-parsed every
//! time it runs and always observes the latest session state.

use super::block::{block_names, delete_block, find_or_make_block, make_block};
use super::error::{ScriptError, ScriptResult};
use super::interp::{evaluate_deferred, evaluate_line, join_tokens};
use super::launch::spawn_line;
use super::registry::{Command, PreEvaluation, Registry};
use super::session::Session;
use super::value::Value;

/// Namespace of the control-flow commands.
pub const NAMESPACE: &str = "ks.control";

/// Install the control-flow commands into `registry`.
pub fn register(registry: &mut Registry) {
    registry.register_default::<While>(NAMESPACE, "While");
    registry.register_default::<Codeblock>(NAMESPACE, "Codeblock");
    registry.register_default::<Asynchronize>(NAMESPACE, "Asynchronize");
}

// ── While ─────────────────────────────────────────────────────────────────────

/// `While <condition> <command…>`
///
/// The condition is a Boolean or a raw token evaluated as a line (outer
/// braces stripped) before every pass; it must produce a Boolean.  The
/// remaining tokens are joined once and evaluated as a line on each pass.
#[derive(Debug, Default)]
pub struct While;

impl While {
    fn test(condition: &Value, session: &Session) -> ScriptResult<bool> {
        match condition {
            Value::Boolean(b) => Ok(*b),
            Value::Text(_) => match evaluate_deferred(condition, session)
                .map_err(|e| e.in_loop("While condition"))?
            {
                Value::Boolean(b) => Ok(b),
                other => Err(ScriptError::argument(
                    "While",
                    format!("condition produced {} instead of a boolean", other.type_name()),
                )),
            },
            other => Err(ScriptError::argument(
                "While",
                format!("requires a boolean or a condition line, got {}", other.type_name()),
            )),
        }
    }
}

impl Command for While {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        if args.len() < 2 {
            return Err(ScriptError::argument("While", "requires at least 2 arguments"));
        }
        let body = join_tokens(&args[1..]);
        while !session.is_terminated() && Self::test(&args[0], session)? {
            evaluate_line(&body, session).map_err(|e| e.in_loop("While command"))?;
        }
        Ok(Value::Null)
    }

    fn pre_evaluation(&self) -> PreEvaluation {
        PreEvaluation::Only(&[])
    }
}

// ── Codeblock ─────────────────────────────────────────────────────────────────

/// `Codeblock <name> <action> [code…]`
///
/// | action       | effect                                              |
/// |--------------|-----------------------------------------------------|
/// | `make`       | replace any block `name` with an empty one          |
/// | `add`        | join the code tokens into one line and append it   |
/// | `list`       | list of stored block names                          |
/// | `delete`     | remove the block                                    |
/// | `setSession` | bind the block to this session for later callbacks  |
/// | `get`        | the block itself                                    |
/// | `run`        | run the block's lines; returns the last result      |
#[derive(Debug, Default)]
pub struct Codeblock;

impl Codeblock {
    fn word<'a>(args: &'a [Value], index: usize, what: &str) -> ScriptResult<&'a str> {
        args.get(index).and_then(Value::as_text).ok_or_else(|| {
            ScriptError::argument("Codeblock", format!("{what} must be text"))
        })
    }
}

impl Command for Codeblock {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        if args.len() < 2 {
            return Err(ScriptError::argument(
                "Codeblock",
                "requires at least 2 arguments: <name> <make|add|list|delete|setSession|get|run> [code]",
            ));
        }
        let name = Self::word(&args, 0, "block name")?;
        let action = Self::word(&args, 1, "action")?;

        match action {
            "make" => Ok(Value::Block(make_block(session, name))),
            "delete" => {
                delete_block(session, name);
                Ok(Value::Null)
            }
            "list" => Ok(Value::List(
                block_names(session).into_iter().map(Value::Text).collect(),
            )),
            "add" => {
                if args.len() < 3 {
                    return Err(ScriptError::argument(
                        "Codeblock",
                        "add requires code: <name> add <code>",
                    ));
                }
                let block = find_or_make_block(session, name)?;
                block.push_line(join_tokens(&args[2..]));
                Ok(Value::Block(block))
            }
            "setSession" => {
                let block = find_or_make_block(session, name)?;
                block.bind(session);
                Ok(Value::Block(block))
            }
            "get" => Ok(Value::Block(find_or_make_block(session, name)?)),
            "run" => find_or_make_block(session, name)?.run(session),
            other => Err(ScriptError::argument(
                "Codeblock",
                format!("unknown action {other}; expected make, add, list, delete, setSession, get or run"),
            )),
        }
    }

    fn pre_evaluation(&self) -> PreEvaluation {
        PreEvaluation::Only(&[0, 1])
    }
}

// ── Asynchronize ──────────────────────────────────────────────────────────────

/// `Asynchronize <command…>`: evaluate the joined tokens on a worker and
/// return its task handle immediately.
#[derive(Debug, Default)]
pub struct Asynchronize;

impl Command for Asynchronize {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        if args.is_empty() {
            return Err(ScriptError::argument("Asynchronize", "requires at least one command"));
        }
        spawn_line(join_tokens(&args), session).map(Value::Task)
    }

    fn pre_evaluation(&self) -> PreEvaluation {
        PreEvaluation::Only(&[])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
