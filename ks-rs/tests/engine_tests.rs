//! End-to-end behaviour of the line interpreter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kscript::script::error::ErrorKind;
use kscript::script::invoke::{HostArg, HostError, Prim, TypeRef};
use kscript::script::{
    evaluate_line, evaluate_sequence, Command, Environment, HostCatalog, HostClass, HostMethod,
    HostRef, PreEvaluation, Registry, ScriptError, ScriptResult, Session, Value,
};

fn session() -> Session {
    Session::new(Environment::new())
}

fn eval(line: &str, s: &Session) -> Value {
    evaluate_line(line, s).unwrap_or_else(|e| panic!("{line}: {}", e.trail()))
}

// ── Substitution ──────────────────────────────────────────────────────────────

#[test]
fn stored_value_feeds_later_lines() {
    let s = session();
    let out = evaluate_sequence(
        &["StoreValue v = {GetAsInteger64 1}", "GetAsInteger64 {{v}}"],
        &s,
    )
    .unwrap();
    assert_eq!(out, Value::Integer(1));
    assert_eq!(s.last_result(), Value::Integer(1));
}

#[test]
fn bare_variable_line_yields_its_value() {
    let s = session();
    let out = evaluate_sequence(&["StoreValue v = {GetAsInteger64 1}", "{{v}}"], &s).unwrap();
    assert_eq!(out, Value::Integer(1));
    assert_eq!(eval("{Math add {{v}} 2}", &s), Value::Integer(3));
}

#[test]
fn nested_lines_compose() {
    let s = session();
    eval("StoreValue a = {GetAsInteger64 4}", &s);
    eval("StoreValue b = {GetAsInteger64 2}", &s);
    let out = eval(
        "And {CompareNumber {{a}} > {{b}}} {Not {CompareNumber {{a}} == {{b}}}}",
        &s,
    );
    assert_eq!(out, Value::Boolean(true));
}

#[test]
fn substituted_values_keep_their_type() {
    let s = session();
    eval("StoreValue m = {NewMap k v}", &s);
    assert_eq!(eval("TypeOf {{m}}", &s), Value::from("map"));
    assert_eq!(eval("TypeOf {GetAsFloat64 1.5}", &s), Value::from("float"));
}

#[test]
fn missing_variable_reports_resolution() {
    let s = session();
    let err = evaluate_line("Print {{ghost}}", &s).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(err.trail().contains("ghost"));
}

// ── Selective pre-evaluation ──────────────────────────────────────────────────

#[test]
fn raw_tokens_reach_lazy_commands() {
    let s = session();
    eval("RunIf {False} StoreValue hit = {Exit boom}", &s);
    assert!(s.get_var("hit").is_none());
    assert!(!s.is_terminated());

    eval("Codeblock later add StoreValue seen = {{value}}", &s);
    eval("StoreValue value = first", &s);
    eval("Codeblock later run", &s);
    assert_eq!(s.get_var("seen"), Some(Value::from("first")));
    eval("StoreValue value = second", &s);
    eval("Codeblock later run", &s);
    assert_eq!(s.get_var("seen"), Some(Value::from("second")));
}

// ── Control flow ──────────────────────────────────────────────────────────────

#[test]
fn while_loop_runs_until_condition_fails() {
    let s = session();
    let out = evaluate_sequence(
        &[
            "StoreValue i = {GetAsInteger64 0}",
            "StoreValue max = {GetAsInteger64 3}",
            "Codeblock loop make",
            "Codeblock loop add StoreValue i = {Math add {{i}} {GetAsInteger64 1}}",
            "While {CompareNumber {{i}} < {{max}}} Codeblock loop run",
        ],
        &s,
    )
    .unwrap();
    assert_eq!(out, Value::Null);
    assert_eq!(s.get_var("i"), Some(Value::Integer(3)));
    let Some(Value::Block(block)) = s.get_var("ks.block:loop") else {
        panic!("block not stored");
    };
    assert_eq!(block.executions(), 3);
}

#[test]
fn termination_is_sticky() {
    let s = session();
    let out = evaluate_sequence(
        &["StoreValue a = 1", "Exit finished", "StoreValue b = 2"],
        &s,
    )
    .unwrap();
    assert_eq!(out, Value::from("finished"));
    assert!(s.get_var("b").is_none());
    assert_eq!(eval("GetAsInteger64 7", &s), Value::from("finished"));
    eval("Exit other", &s);
    assert_eq!(s.terminating_value(), Some(Value::from("finished")));
}

#[test]
fn launched_line_shares_the_session() {
    let s = session();
    let Value::Task(task) = eval("Asynchronize StoreValue bg = {GetAsInteger64 11}", &s) else {
        panic!("expected a task");
    };
    let deadline = Instant::now() + Duration::from_secs(10);
    while !task.is_finished() {
        assert!(Instant::now() < deadline, "launch never finished");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(s.get_var("bg"), Some(Value::Integer(11)));
}

#[test]
fn masked_block_keeps_outer_marker() {
    let env = Environment::new();
    env.set("MaskCodeblock", "helper;");
    let s = Session::new(env);
    eval("Codeblock helper add CurrentCodeblock", &s);
    eval("Codeblock outer add Codeblock helper run", &s);
    assert_eq!(eval("Codeblock outer run", &s), Value::from("outer"));
    assert_eq!(eval("Codeblock helper run", &s), Value::Null);
}

// ── Maps ──────────────────────────────────────────────────────────────────────

#[test]
fn maps_are_shared_until_changed() {
    let s = session();
    eval("StoreValue m = {NewMap a 1}", &s);
    eval("StoreValue alias = {{m}}", &s);
    let (Some(Value::Map(m)), Some(Value::Map(alias))) = (s.get_var("m"), s.get_var("alias"))
    else {
        panic!("expected maps");
    };
    assert!(Arc::ptr_eq(&m, &alias));

    eval("StoreValue grown = {PutItemToMap {{m}} b 2}", &s);
    assert_eq!(m.len(), 1);
    assert_eq!(eval("GetItemFromMap {{grown}} b", &s), Value::from("2"));
    assert_eq!(eval("GetItemFromMap {{m}} b", &s), Value::Null);
}

// ── Resolution ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct First;

impl Command for First {
    fn execute(&self, _args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        Ok(Value::from("first"))
    }
}

#[derive(Debug, Default)]
struct Second;

impl Command for Second {
    fn execute(&self, _args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        Ok(Value::from("second"))
    }

    fn pre_evaluation(&self) -> PreEvaluation {
        PreEvaluation::Only(&[])
    }
}

#[test]
fn first_matching_prefix_wins() {
    let mut registry = Registry::standard();
    registry.register_default::<First>("app.one", "Which");
    registry.register_default::<Second>("app.two", "Which");
    let s = Session::builder(Environment::new())
        .registry(Arc::new(registry))
        .search_prefixes(["app.one", "app.two", "ks.commands"])
        .build();
    assert_eq!(eval("Which", &s), Value::from("first"));
    assert_eq!(eval("app.two.Which", &s), Value::from("second"));

    s.set_search_prefixes(vec!["app.two".into(), "app.one".into()]);
    assert_eq!(eval("Which", &s), Value::from("second"));
}

#[test]
fn unknown_command_is_resolution_error() {
    let s = session();
    let err = evaluate_line("NoSuchThing 1 2", &s).unwrap_err();
    assert!(matches!(err.root(), ScriptError::CommandNotFound(name) if name == "NoSuchThing"));
}

// ── Host invocation ───────────────────────────────────────────────────────────

fn label(text: &'static str) -> impl Fn(&Value, Vec<HostArg>) -> Result<Value, HostError> {
    move |_, _| Ok(Value::from(text))
}

fn calc_session() -> Session {
    let mut hosts = HostCatalog::new();
    hosts.register(
        HostClass::new("Calc")
            .method(HostMethod::new("f", vec![TypeRef::Prim(Prim::Long)], label("f(long)")))
            .method(HostMethod::new("f", vec![TypeRef::Prim(Prim::Int)], label("f(int)")))
            .method(HostMethod::new("g", vec![TypeRef::class("Number")], |_, args| {
                Ok(Value::Integer(args[0].as_i64().unwrap_or(-1) * 2))
            })),
    );
    let s = Session::builder(Environment::new()).hosts(Arc::new(hosts)).build();
    s.set_var("calc", Value::Host(HostRef::new("Calc", ())));
    s
}

#[test]
fn overload_prefers_exact_primitive() {
    let s = calc_session();
    assert_eq!(
        eval("InvokeMethodOf {{calc}} f {GetAsInteger64 5}", &s),
        Value::from("f(int)")
    );
    assert_eq!(
        eval("InvokeMethodOf {{calc}} f {GetAsInteger64 9000000000}", &s),
        Value::from("f(long)")
    );
}

#[test]
fn boxed_upcast_is_accepted() {
    let s = calc_session();
    assert_eq!(eval("InvokeMethodOf {{calc}} g {GetAsInteger64 21}", &s), Value::Integer(42));
}

#[test]
fn no_overload_names_method_and_type() {
    let s = calc_session();
    let err = evaluate_line("InvokeMethodOf {{calc}} f text", &s).unwrap_err();
    assert!(matches!(
        err.root(),
        ScriptError::NoCompatibleOverload { method, type_name } if method == "f" && type_name == "Calc"
    ));
}

#[test]
fn builtin_string_methods() {
    let s = session();
    assert_eq!(
        eval("InvokeMethodOf hello substring {GetAsInteger64 1} {GetAsInteger64 3}", &s),
        Value::from("el")
    );
    assert_eq!(eval("InvokeMethodOf hello length", &s), Value::Integer(5));
}
