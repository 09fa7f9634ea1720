//! Evaluation engine.
//!
//! [`evaluate_line`] drives one line through tokenize → selective
//! substitution → dispatch, re-entering itself for every `{…}` argument.
//! [`evaluate_sequence`] runs a list of lines in order against one session.
//!
//! Both check the session's termination flag before doing anything, so a
//! terminated session short-circuits at every nesting level.

use std::cell::Cell;

use tracing::{debug, trace};

use super::error::{ScriptError, ScriptResult};
use super::registry::PreEvaluation;
use super::session::Session;
use super::token::{nested_line, tokenize, variable_ref};
use super::value::Value;

/// Result of a line with no tokens.
pub const EMPTY_LINE_RESULT: Value = Value::Integer(1);
/// Result of a comment line.
pub const COMMENT_RESULT: Value = Value::Integer(0);
/// Leading marker of a comment line.
pub const COMMENT_MARKER: &str = "//";
/// Maximum nesting of `evaluate_line` on one thread.
pub const RECURSION_LIMIT: usize = 1000;

// ── Recursion guard ───────────────────────────────────────────────────────────

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Holds one level of nesting; released on drop.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> ScriptResult<Self> {
        DEPTH.with(|depth| {
            let next = depth.get() + 1;
            if next > RECURSION_LIMIT {
                return Err(ScriptError::TooDeep(RECURSION_LIMIT));
            }
            depth.set(next);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

// ── Line evaluation ───────────────────────────────────────────────────────────

/// Evaluate one line of script.
pub fn evaluate_line(line: &str, session: &Session) -> ScriptResult<Value> {
    if let Some(value) = session.terminating_value() {
        return Ok(value);
    }

    let tokens = tokenize(line);
    let Some(first) = tokens.first() else {
        return Ok(EMPTY_LINE_RESULT);
    };
    if first.as_deref().is_some_and(|t| t.starts_with(COMMENT_MARKER)) {
        return Ok(COMMENT_RESULT);
    }

    // A line that is just `{{name}}` or `{line}` yields the substituted value.
    if let [Some(only)] = tokens.as_slice() {
        if variable_ref(only).is_some() || nested_line(only).is_some() {
            let _guard = DepthGuard::enter()?;
            return substitute(only, 0, PreEvaluation::All, session);
        }
    }

    let name = match first.as_deref() {
        Some(name) if !name.chars().any(char::is_whitespace) => name,
        _ => return Err(ScriptError::Syntax(format!("invalid command name in \"{line}\""))),
    };

    let _guard = DepthGuard::enter()?;

    let resolved = session.registry().resolve(name, &session.search_prefixes())?;
    let pre_evaluation = resolved.descriptor.pre_evaluation;

    let mut args = Vec::with_capacity(tokens.len() - 1);
    for (index, token) in tokens.iter().skip(1).enumerate() {
        let value = match token {
            None => Value::Null,
            Some(raw) => substitute(raw, index, pre_evaluation, session)
                .map_err(|e| e.in_argument(index, line))?,
        };
        args.push(value);
    }

    debug!(command = name, qualified = %resolved.descriptor.name, args = args.len(), "dispatch");
    resolved
        .command
        .execute(args, session)
        .map_err(|e| e.in_command(name, line))
}

/// Turn one raw token into the value passed to the command.
fn substitute(
    raw: &str,
    position: usize,
    pre_evaluation: PreEvaluation,
    session: &Session,
) -> ScriptResult<Value> {
    if !pre_evaluation.is_eligible(position) {
        return Ok(Value::Text(raw.to_owned()));
    }
    if let Some(name) = variable_ref(raw) {
        trace!(variable = name, "substitute");
        return session
            .get_var(name)
            .ok_or_else(|| ScriptError::VariableNotFound(name.to_owned()));
    }
    if let Some(inner) = nested_line(raw) {
        trace!(line = inner, "nested");
        return evaluate_line(inner, session);
    }
    Ok(Value::Text(raw.to_owned()))
}

/// Evaluate a value that may be a deferred raw token.
///
/// Text is stripped of one pair of outer braces (if present) and evaluated
/// as a line; anything else is returned unchanged.  Commands that receive raw
/// tokens use this to evaluate a condition or body on demand.
pub fn evaluate_deferred(value: &Value, session: &Session) -> ScriptResult<Value> {
    match value {
        Value::Text(raw) => {
            let line = raw
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .unwrap_or(raw);
            evaluate_line(line, session)
        }
        other => Ok(other.clone()),
    }
}

/// Re-join raw tokens into one line of source.
///
/// The result re-tokenizes into the same tokens: spans that need it are
/// quoted again (see [`Value::to_source_fragment`]).
pub fn join_tokens(tokens: &[Value]) -> String {
    tokens
        .iter()
        .map(Value::to_source_fragment)
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Sequence evaluation ───────────────────────────────────────────────────────

/// Evaluate `lines` in order.
///
/// Empty lines are skipped.  Each result becomes the session's last result;
/// the last one is returned (Null if nothing ran).  If the session is
/// terminated, before or during the run, the terminating value is returned.
pub fn evaluate_sequence<S: AsRef<str>>(lines: &[S], session: &Session) -> ScriptResult<Value> {
    let mut last = Value::Null;
    for (i, line) in lines.iter().enumerate() {
        if let Some(value) = session.terminating_value() {
            return Ok(value);
        }
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        last = evaluate_line(line, session).map_err(|e| e.in_line(i + 1, line))?;
        session.set_last_result(last.clone());
    }
    Ok(session.terminating_value().unwrap_or(last))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::script::env::Environment;
    use crate::script::registry::{Command, Registry};

    /// Returns its arguments as a list.
    struct Collect;

    impl Command for Collect {
        fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
            Ok(Value::List(args))
        }
    }

    /// Like `Collect`, but nothing is pre-evaluated.
    struct Raw;

    impl Command for Raw {
        fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
            Ok(Value::List(args))
        }

        fn pre_evaluation(&self) -> PreEvaluation {
            PreEvaluation::Only(&[])
        }
    }

    struct Fail;

    impl Command for Fail {
        fn execute(&self, _args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
            Err(ScriptError::Invocation("boom".into()))
        }
    }

    /// Increments the variable `n`.
    struct Bump;

    impl Command for Bump {
        fn execute(&self, _args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
            Ok(session.update_var("n", |old| {
                Value::Integer(old.and_then(Value::as_int).unwrap_or(0) + 1)
            }))
        }
    }

    fn session() -> Session {
        let mut r = Registry::new();
        r.register("t.Collect", || Box::new(Collect) as Box<dyn Command>);
        r.register("t.Raw", || Box::new(Raw) as Box<dyn Command>);
        r.register("t.Fail", || Box::new(Fail) as Box<dyn Command>);
        r.register("t.Bump", || Box::new(Bump) as Box<dyn Command>);
        Session::builder(Environment::new())
            .registry(Arc::new(r))
            .search_prefixes(["t"])
            .build()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_owned())
    }

    #[test]
    fn empty_and_comment_lines() {
        let s = session();
        assert_eq!(evaluate_line("", &s).unwrap(), Value::Integer(1));
        assert_eq!(evaluate_line("   ", &s).unwrap(), Value::Integer(1));
        assert_eq!(evaluate_line("// Nope at all", &s).unwrap(), Value::Integer(0));
        assert_eq!(evaluate_line("//Nope", &s).unwrap(), Value::Integer(0));
    }

    #[test]
    fn plain_tokens_pass_through() {
        let s = session();
        let out = evaluate_line("Collect a 1 \"b c\"", &s).unwrap();
        assert_eq!(out, Value::List(vec![text("a"), text("1"), text("b c")]));
    }

    #[test]
    fn null_token_becomes_null() {
        let s = session();
        let out = evaluate_line("Collect \"\" x", &s).unwrap();
        assert_eq!(out, Value::List(vec![Value::Null, text("x")]));
    }

    #[test]
    fn variable_substitution_keeps_structure() {
        let s = session();
        let list = Value::List(vec![Value::Integer(1)]);
        s.set_var("v", list.clone());
        let out = evaluate_line("Collect {{v}}", &s).unwrap();
        assert_eq!(out, Value::List(vec![list]));
    }

    #[test]
    fn nested_lines_recurse() {
        let s = session();
        let out = evaluate_line("Collect {Collect {Collect x}}", &s).unwrap();
        assert_eq!(
            out,
            Value::List(vec![Value::List(vec![Value::List(vec![text("x")])])])
        );
    }

    #[test]
    fn raw_positions_are_not_evaluated() {
        let s = session();
        let out = evaluate_line("Raw {Bump} {{missing}}", &s).unwrap();
        assert_eq!(out, Value::List(vec![text("{Bump}"), text("{{missing}}")]));
        assert!(s.get_var("n").is_none());
    }

    #[test]
    fn deferred_token_sees_latest_state() {
        let s = session();
        let raw = text("{Bump}");
        assert_eq!(evaluate_deferred(&raw, &s).unwrap(), Value::Integer(1));
        assert_eq!(evaluate_deferred(&raw, &s).unwrap(), Value::Integer(2));
        assert_eq!(evaluate_deferred(&Value::Boolean(true), &s).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn missing_variable_is_wrapped_with_position() {
        let s = session();
        let err = evaluate_line("Collect a {{nope}}", &s).unwrap_err();
        match &err {
            ScriptError::InArgument { index, line, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(line, "Collect a {{nope}}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root(), ScriptError::VariableNotFound(n) if n == "nope"));
    }

    #[test]
    fn command_failure_is_wrapped_with_name() {
        let s = session();
        let err = evaluate_line("Fail now", &s).unwrap_err();
        assert!(matches!(&err, ScriptError::InCommand { command, .. } if command == "Fail"));
        assert!(matches!(err.root(), ScriptError::Invocation(m) if m == "boom"));
    }

    #[test]
    fn unknown_command() {
        let s = session();
        let err = evaluate_line("Nope", &s).unwrap_err();
        assert!(matches!(err, ScriptError::CommandNotFound(_)));
    }

    #[test]
    fn null_command_name_is_a_syntax_error() {
        let s = session();
        let err = evaluate_line("\"\" x", &s).unwrap_err();
        assert!(matches!(err, ScriptError::Syntax(_)));
    }

    #[test]
    fn termination_short_circuits() {
        let s = session();
        s.terminate(text("done"));
        assert_eq!(evaluate_line("Bump", &s).unwrap(), text("done"));
        assert_eq!(evaluate_line("Nope", &s).unwrap(), text("done"));
        assert!(s.get_var("n").is_none());
    }

    #[test]
    fn sequence_tracks_last_result_and_skips_blanks() {
        let s = session();
        let out = evaluate_sequence(&["Bump", "", "  ", "Bump"], &s).unwrap();
        assert_eq!(out, Value::Integer(2));
        assert_eq!(s.last_result(), Value::Integer(2));
    }

    #[test]
    fn sequence_error_carries_line_number() {
        let s = session();
        let err = evaluate_sequence(&["Bump", "Fail"], &s).unwrap_err();
        assert!(matches!(err, ScriptError::InLine { number: 2, .. }));
    }

    #[test]
    fn runaway_nesting_hits_the_limit() {
        let s = session();
        let mut line = String::from("Collect x");
        for _ in 0..(RECURSION_LIMIT + 5) {
            line = format!("Collect {{{line}}}");
        }
        // Run on a thread with a generous stack so the guard, not the stack,
        // is what stops the recursion.
        let err = std::thread::Builder::new()
            .stack_size(256 * 1024 * 1024)
            .spawn(move || evaluate_line(&line, &s).unwrap_err())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(err.kind(), crate::script::error::ErrorKind::Limit);
    }

    #[test]
    fn join_tokens_renders_source() {
        let toks = vec![text("Print"), Value::Integer(3), text("{{x}}")];
        assert_eq!(join_tokens(&toks), "Print 3 {{x}}");
    }

    #[test]
    fn join_tokens_round_trips_quoted_spans() {
        let s = session();
        let raw = evaluate_line(
            "Raw \"two words\" \"\" {Collect a b} \"say \\\"hi\\\"\" back\\slash",
            &s,
        )
        .unwrap();
        let Value::List(toks) = raw else { panic!("expected a list") };
        let line = join_tokens(&toks);
        let again = tokenize(&line);
        assert_eq!(
            again,
            vec![
                Some("two words".to_owned()),
                None,
                Some("{Collect a b}".to_owned()),
                Some("say \"hi\"".to_owned()),
                Some("back\\slash".to_owned()),
            ]
        );
    }

    #[test]
    fn lone_substitution_line_yields_its_value() {
        let s = session();
        s.set_var("v", Value::Integer(1));
        assert_eq!(evaluate_line("{{v}}", &s).unwrap(), Value::Integer(1));
        assert_eq!(evaluate_line("  {Collect x}  ", &s).unwrap(), Value::List(vec![text("x")]));
        assert!(matches!(
            evaluate_line("{{missing}}", &s).unwrap_err(),
            ScriptError::VariableNotFound(name) if name == "missing"
        ));
    }

    #[test]
    fn lone_substitution_respects_termination() {
        let s = session();
        s.set_var("v", Value::Integer(1));
        s.terminate(text("done"));
        assert_eq!(evaluate_line("{{v}}", &s).unwrap(), text("done"));
    }
}
