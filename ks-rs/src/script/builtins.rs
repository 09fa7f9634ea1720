//! Built-in leaf commands.
//!
//! General commands live under `ks.commands`, type conversions under
//! `ks.types`.  Each receives already-substituted arguments (except where a
//! command narrows its pre-evaluation) and returns a [`Value`].  Commands
//! that "modify" a map return a new map and leave their input alone.

use std::sync::Arc;

use super::error::{ScriptError, ScriptResult};
use super::interp::{evaluate_line, join_tokens};
use super::registry::{Command, PreEvaluation, Registry};
use super::session::Session;
use super::value::{Value, ValueMap};

/// Namespace of the general commands.
pub const COMMANDS: &str = "ks.commands";
/// Namespace of the type conversions.
pub const TYPES: &str = "ks.types";

/// Install every leaf command into `registry`.
pub fn register(registry: &mut Registry) {
    registry.register_default::<Print>(COMMANDS, "Print");
    registry.register_default::<StoreValue>(COMMANDS, "StoreValue");
    registry.register_default::<FreeValue>(COMMANDS, "FreeValue");
    registry.register_default::<Exit>(COMMANDS, "Exit");
    registry.register_default::<SysExit>(COMMANDS, "SysExit");
    registry.register_default::<EnvironmentCmd>(COMMANDS, "Environment");
    registry.register_default::<CompareNumber>(COMMANDS, "CompareNumber");
    registry.register_default::<And>(COMMANDS, "And");
    registry.register_default::<Or>(COMMANDS, "Or");
    registry.register_default::<Not>(COMMANDS, "Not");
    registry.register_default::<MathCmd>(COMMANDS, "Math");
    registry.register_default::<RunIf>(COMMANDS, "RunIf");
    registry.register_default::<NewMap>(COMMANDS, "NewMap");
    registry.register_default::<GetItemFromMap>(COMMANDS, "GetItemFromMap");
    registry.register_default::<PutItemToMap>(COMMANDS, "PutItemToMap");
    registry.register_default::<DropItemFromMap>(COMMANDS, "DropItemFromMap");
    registry.register_default::<HostInfo>(COMMANDS, "HostInfo");
    registry.register_default::<CurrentCodeblock>(COMMANDS, "CurrentCodeblock");
    registry.register_default::<InvokeMethodOf>(COMMANDS, "InvokeMethodOf");

    registry.register_default::<GetAsInteger64>(TYPES, "GetAsInteger64");
    registry.register_default::<GetAsFloat64>(TYPES, "GetAsFloat64");
    registry.register_default::<GetAsString>(TYPES, "GetAsString");
    registry.register_default::<GetAsBoolean>(TYPES, "GetAsBoolean");
    registry.register_default::<True>(TYPES, "True");
    registry.register_default::<False>(TYPES, "False");
    registry.register_default::<Null>(TYPES, "Null");
    registry.register_default::<TypeOf>(TYPES, "TypeOf");
}

// ── Argument helpers ──────────────────────────────────────────────────────────

fn arity(command: &str, args: &[Value], min: usize, max: Option<usize>) -> ScriptResult<()> {
    let n = args.len();
    let ok = n >= min && max.map_or(true, |max| n <= max);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => format!("exactly {min}"),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    };
    Err(ScriptError::argument(command, format!("requires {expected} argument(s), got {n}")))
}

fn text<'a>(command: &str, args: &'a [Value], index: usize) -> ScriptResult<&'a str> {
    match args.get(index) {
        Some(Value::Text(s)) => Ok(s),
        Some(other) => Err(ScriptError::argument(
            command,
            format!("argument {index} must be text, got {}", other.type_name()),
        )),
        None => Err(ScriptError::argument(command, format!("missing argument {index}"))),
    }
}

fn boolean(command: &str, value: &Value) -> ScriptResult<bool> {
    value.as_bool().ok_or_else(|| {
        ScriptError::argument(
            command,
            format!("requires boolean or text arguments, got {}", value.type_name()),
        )
    })
}

fn not_a_map(command: &str, value: &Value) -> ScriptError {
    ScriptError::argument(
        command,
        format!("first argument must be a map, got {}", value.type_name()),
    )
}

fn map_arg<'a>(command: &str, value: &'a Value) -> ScriptResult<&'a Arc<ValueMap>> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(not_a_map(command, other)),
    }
}

/// A copy-on-write handle to the map in `value`.
fn map_copy(command: &str, value: &Value) -> ScriptResult<Arc<ValueMap>> {
    value.map_cow().ok_or_else(|| not_a_map(command, value))
}

/// Map keys are the display form of the key value.
fn key(value: &Value) -> String {
    value.to_string()
}

/// A number read from an argument.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn read(command: &str, value: &Value) -> ScriptResult<Num> {
        match value {
            Value::Integer(n) => Ok(Num::Int(*n)),
            Value::Float(x) => Ok(Num::Float(*x)),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Num::Int)
                    .or_else(|_| s.parse::<f64>().map(Num::Float))
                    .map_err(|_| ScriptError::argument(command, format!("{s:?} is not a number")))
            }
            other => Err(ScriptError::argument(
                command,
                format!("requires numbers, got {}", other.type_name()),
            )),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(n) => Value::Integer(n),
            Num::Float(x) => Value::Float(x),
        }
    }
}

// ── ks.commands ───────────────────────────────────────────────────────────────

/// `Print <args…>`: write the joined arguments to stdout and return them.
#[derive(Debug, Default)]
pub struct Print;

impl Command for Print {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        let line = args
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                Value::Text(s) => s.clone(),
                Value::Integer(_) | Value::Float(_) => v.to_string(),
                other => format!("{}: {}", other.type_name(), other),
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("{line}");
        Ok(Value::Text(line))
    }
}

/// `StoreValue <name> = <value>` or `StoreValue <name> <value>`.
#[derive(Debug, Default)]
pub struct StoreValue;

impl Command for StoreValue {
    fn execute(&self, mut args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        arity("StoreValue", &args, 2, Some(3))?;
        let name = text("StoreValue", &args, 0)?.to_owned();
        let value = match args.len() {
            3 if args[1].as_text() == Some("=") => args.swap_remove(2),
            2 => args.swap_remove(1),
            _ => {
                return Err(ScriptError::argument(
                    "StoreValue",
                    "usage: StoreValue <name> = <value>",
                ))
            }
        };
        session.set_var(name, value.clone());
        Ok(value)
    }
}

/// `FreeValue <name…>`: remove session variables.
#[derive(Debug, Default)]
pub struct FreeValue;

impl Command for FreeValue {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        arity("FreeValue", &args, 1, None)?;
        for name in &args {
            session.remove_var(&key(name));
        }
        Ok(Value::Null)
    }
}

/// `Exit [value]`: terminate the session.
#[derive(Debug, Default)]
pub struct Exit;

impl Command for Exit {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        let value = args.into_iter().next().unwrap_or_default();
        Ok(session.terminate(value))
    }
}

/// `SysExit [code]`: exit the process.  Without an argument nothing happens.
#[derive(Debug, Default)]
pub struct SysExit;

impl Command for SysExit {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        let Some(code) = args.first() else {
            return Ok(Value::Null);
        };
        let code = match code {
            Value::Integer(n) => i32::try_from(*n).map_err(|_| {
                ScriptError::argument("SysExit", format!("exit code {n} out of range"))
            })?,
            Value::Text(s) => s.trim().parse::<i32>().map_err(|_| {
                ScriptError::argument("SysExit", format!("invalid exit code {s:?}"))
            })?,
            _ => 0,
        };
        std::process::exit(code)
    }
}

/// `Environment list | get <key> | set <key> <value|null>`
#[derive(Debug, Default)]
pub struct EnvironmentCmd;

impl Command for EnvironmentCmd {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        arity("Environment", &args, 1, Some(3))?;
        let env = session.environment();
        match (text("Environment", &args, 0)?, args.len()) {
            ("list", 1) => Ok(Value::from(
                env.snapshot()
                    .into_iter()
                    .map(|(k, v)| (k, Value::Text(v)))
                    .collect::<ValueMap>(),
            )),
            ("get", 2) => {
                let k = text("Environment", &args, 1)?;
                Ok(env.get(k).map_or(Value::Null, Value::Text))
            }
            ("set", 3) => {
                let k = text("Environment", &args, 1)?;
                match &args[2] {
                    Value::Null => {
                        env.unset(k);
                    }
                    Value::Text(v) => env.set(k, v.as_str()),
                    other => {
                        return Err(ScriptError::argument(
                            "Environment",
                            format!("value must be text or null, got {}", other.type_name()),
                        ))
                    }
                }
                Ok(Value::Null)
            }
            (action, _) => Err(ScriptError::argument(
                "Environment",
                format!("unknown action {action}; usage: list | get <key> | set <key> <value>"),
            )),
        }
    }
}

/// `CompareNumber <a> <op> <b>` with `op` one of `== != < <= > >=`.
#[derive(Debug, Default)]
pub struct CompareNumber;

impl Command for CompareNumber {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("CompareNumber", &args, 3, Some(3))?;
        let a = Num::read("CompareNumber", &args[0])?.as_f64();
        let b = Num::read("CompareNumber", &args[2])?.as_f64();
        let result = match text("CompareNumber", &args, 1)? {
            "==" => a == b,
            "!=" => a != b,
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            ">=" => a >= b,
            op => {
                return Err(ScriptError::argument(
                    "CompareNumber",
                    format!("expected any of ==, !=, <, <=, >, >= but got {op}"),
                ))
            }
        };
        Ok(Value::Boolean(result))
    }
}

/// `And <cond> <cond…>`
#[derive(Debug, Default)]
pub struct And;

impl Command for And {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("And", &args, 2, None)?;
        let mut result = true;
        for arg in &args {
            result &= boolean("And", arg)?;
        }
        Ok(Value::Boolean(result))
    }
}

/// `Or <cond> <cond…>`
#[derive(Debug, Default)]
pub struct Or;

impl Command for Or {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("Or", &args, 2, None)?;
        let mut result = false;
        for arg in &args {
            result |= boolean("Or", arg)?;
        }
        Ok(Value::Boolean(result))
    }
}

/// `Not <cond>`
#[derive(Debug, Default)]
pub struct Not;

impl Command for Not {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("Not", &args, 1, Some(1))?;
        Ok(Value::Boolean(!boolean("Not", &args[0])?))
    }
}

/// `Math <add|sub|mul|div|mod> <a> <b…>`, folded left to right.
///
/// Integer operands stay integers; any float operand makes the result a
/// float.
#[derive(Debug, Default)]
pub struct MathCmd;

impl MathCmd {
    fn apply(op: &str, a: Num, b: Num) -> ScriptResult<Num> {
        let overflow = || ScriptError::argument("Math", format!("integer overflow in {op}"));
        match (a, b) {
            (Num::Int(x), Num::Int(y)) => {
                let r = match op {
                    "add" => x.checked_add(y),
                    "sub" => x.checked_sub(y),
                    "mul" => x.checked_mul(y),
                    "div" | "mod" if y == 0 => {
                        return Err(ScriptError::argument("Math", "division by zero"))
                    }
                    "div" => x.checked_div(y),
                    "mod" => x.checked_rem(y),
                    _ => return Err(Self::unknown(op)),
                };
                r.map(Num::Int).ok_or_else(overflow)
            }
            (a, b) => {
                let (x, y) = (a.as_f64(), b.as_f64());
                Ok(Num::Float(match op {
                    "add" => x + y,
                    "sub" => x - y,
                    "mul" => x * y,
                    "div" => x / y,
                    "mod" => x % y,
                    _ => return Err(Self::unknown(op)),
                }))
            }
        }
    }

    fn unknown(op: &str) -> ScriptError {
        ScriptError::argument("Math", format!("unknown operation {op}; expected add, sub, mul, div or mod"))
    }
}

impl Command for MathCmd {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("Math", &args, 3, None)?;
        let op = text("Math", &args, 0)?;
        let mut acc = Num::read("Math", &args[1])?;
        for arg in &args[2..] {
            acc = Self::apply(op, acc, Num::read("Math", arg)?)?;
        }
        Ok(acc.into_value())
    }
}

/// `RunIf <cond> <command…>`: evaluate the command only when the condition
/// holds.  The command tokens are not pre-evaluated.
#[derive(Debug, Default)]
pub struct RunIf;

impl Command for RunIf {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        arity("RunIf", &args, 2, None)?;
        if boolean("RunIf", &args[0])? {
            evaluate_line(&join_tokens(&args[1..]), session)
        } else {
            Ok(Value::Null)
        }
    }

    fn pre_evaluation(&self) -> PreEvaluation {
        PreEvaluation::Only(&[0])
    }
}

/// `NewMap [key value]…`
#[derive(Debug, Default)]
pub struct NewMap;

impl Command for NewMap {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        if args.len() % 2 != 0 {
            return Err(ScriptError::argument("NewMap", "requires key/value pairs"));
        }
        let mut map = ValueMap::with_capacity(args.len() / 2);
        let mut it = args.into_iter();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            map.insert(key(&k), v);
        }
        Ok(Value::from(map))
    }
}

/// `GetItemFromMap <map> <key>`: the value, or Null.
#[derive(Debug, Default)]
pub struct GetItemFromMap;

impl Command for GetItemFromMap {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("GetItemFromMap", &args, 2, Some(2))?;
        let map = map_arg("GetItemFromMap", &args[0])?;
        Ok(map.get(&key(&args[1])).cloned().unwrap_or_default())
    }
}

/// `PutItemToMap <map> <key> <value>`: a copy of the map with the entry set.
#[derive(Debug, Default)]
pub struct PutItemToMap;

impl Command for PutItemToMap {
    fn execute(&self, mut args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("PutItemToMap", &args, 3, Some(3))?;
        let value = args.swap_remove(2);
        let mut copy = map_copy("PutItemToMap", &args[0])?;
        Arc::make_mut(&mut copy).insert(key(&args[1]), value);
        Ok(Value::Map(copy))
    }
}

/// `DropItemFromMap <map> <key>`: a copy of the map without the entry.
#[derive(Debug, Default)]
pub struct DropItemFromMap;

impl Command for DropItemFromMap {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("DropItemFromMap", &args, 2, Some(2))?;
        if args[0].is_null() {
            return Err(ScriptError::argument("DropItemFromMap", "the first argument cannot be null"));
        }
        let mut copy = map_copy("DropItemFromMap", &args[0])?;
        Arc::make_mut(&mut copy).shift_remove(&key(&args[1]));
        Ok(Value::Map(copy))
    }
}

/// `HostInfo`: a map describing the machine and process.
#[derive(Debug, Default)]
pub struct HostInfo;

impl Command for HostInfo {
    fn execute(&self, _args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        let mut info = ValueMap::new();
        info.insert("OSName".into(), Value::from(std::env::consts::OS));
        info.insert("OSArch".into(), Value::from(std::env::consts::ARCH));
        info.insert("OSFamily".into(), Value::from(std::env::consts::FAMILY));
        let user = std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok();
        info.insert("UserName".into(), user.map_or(Value::Null, Value::Text));
        let home = directories::BaseDirs::new().map(|d| d.home_dir().display().to_string());
        info.insert("UserHome".into(), home.map_or(Value::Null, Value::Text));
        let cwd = std::env::current_dir().ok().map(|p| p.display().to_string());
        info.insert("WorkingDirectory".into(), cwd.map_or(Value::Null, Value::Text));
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        info.insert("ProcessorCount".into(), Value::Integer(cpus as i64));
        Ok(Value::from(info))
    }
}

/// `CurrentCodeblock`: name of the block running on this chain, or Null.
#[derive(Debug, Default)]
pub struct CurrentCodeblock;

impl Command for CurrentCodeblock {
    fn execute(&self, _args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        Ok(session.current_block().map_or(Value::Null, Value::from))
    }
}

/// `InvokeMethodOf <object> <method> <args…>`
#[derive(Debug, Default)]
pub struct InvokeMethodOf;

impl Command for InvokeMethodOf {
    fn execute(&self, args: Vec<Value>, session: &Session) -> ScriptResult<Value> {
        arity("InvokeMethodOf", &args, 2, None)?;
        let method = text("InvokeMethodOf", &args, 1)?;
        session.hosts().invoke(&args[0], method, &args[2..])
    }
}

// ── ks.types ──────────────────────────────────────────────────────────────────

/// `GetAsInteger64 <value>`
#[derive(Debug, Default)]
pub struct GetAsInteger64;

impl Command for GetAsInteger64 {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("GetAsInteger64", &args, 1, Some(1))?;
        args[0].as_int().map(Value::Integer).ok_or_else(|| {
            ScriptError::argument("GetAsInteger64", format!("cannot convert {} to an integer", args[0]))
        })
    }
}

/// `GetAsFloat64 <value>`
#[derive(Debug, Default)]
pub struct GetAsFloat64;

impl Command for GetAsFloat64 {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("GetAsFloat64", &args, 1, Some(1))?;
        args[0].as_float().map(Value::Float).ok_or_else(|| {
            ScriptError::argument("GetAsFloat64", format!("cannot convert {} to a float", args[0]))
        })
    }
}

/// `GetAsString <values…>`: concatenation of the non-null arguments.
#[derive(Debug, Default)]
pub struct GetAsString;

impl Command for GetAsString {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("GetAsString", &args, 1, None)?;
        Ok(Value::Text(
            args.iter().filter(|v| !v.is_null()).map(Value::to_string).collect(),
        ))
    }
}

/// `GetAsBoolean <value>`
#[derive(Debug, Default)]
pub struct GetAsBoolean;

impl Command for GetAsBoolean {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("GetAsBoolean", &args, 1, Some(1))?;
        boolean("GetAsBoolean", &args[0]).map(Value::Boolean)
    }
}

#[derive(Debug, Default)]
pub struct True;

impl Command for True {
    fn execute(&self, _args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        Ok(Value::Boolean(true))
    }
}

#[derive(Debug, Default)]
pub struct False;

impl Command for False {
    fn execute(&self, _args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        Ok(Value::Boolean(false))
    }
}

#[derive(Debug, Default)]
pub struct Null;

impl Command for Null {
    fn execute(&self, _args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        Ok(Value::Null)
    }
}

/// `TypeOf <value>`: the value's type name.
#[derive(Debug, Default)]
pub struct TypeOf;

impl Command for TypeOf {
    fn execute(&self, args: Vec<Value>, _session: &Session) -> ScriptResult<Value> {
        arity("TypeOf", &args, 1, Some(1))?;
        Ok(Value::from(args[0].type_name()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::env::Environment;

    fn session() -> Session {
        Session::new(Environment::new())
    }

    fn eval(line: &str, s: &Session) -> Value {
        evaluate_line(line, s).unwrap()
    }

    #[test]
    fn store_and_free() {
        let s = session();
        assert_eq!(eval("StoreValue a = {GetAsInteger64 4}", &s), Value::Integer(4));
        eval("StoreValue b hello", &s);
        assert_eq!(s.get_var("b"), Some(Value::from("hello")));
        eval("FreeValue a b", &s);
        assert!(!s.contains_var("a") && !s.contains_var("b"));
        assert!(evaluate_line("StoreValue a + 1", &s).is_err());
    }

    #[test]
    fn compare_numbers() {
        let s = session();
        assert_eq!(eval("CompareNumber 1 < 2", &s), Value::Boolean(true));
        assert_eq!(eval("CompareNumber 2.5 >= 3", &s), Value::Boolean(false));
        assert_eq!(eval("CompareNumber {GetAsInteger64 3} == 3.0", &s), Value::Boolean(true));
        assert!(evaluate_line("CompareNumber 1 <> 2", &s).is_err());
        assert!(evaluate_line("CompareNumber a < 2", &s).is_err());
    }

    #[test]
    fn boolean_logic() {
        let s = session();
        assert_eq!(eval("And true {True} TRUE", &s), Value::Boolean(true));
        assert_eq!(eval("And true yes", &s), Value::Boolean(false));
        assert_eq!(eval("Or false {False} true", &s), Value::Boolean(true));
        assert_eq!(eval("Not {CompareNumber 1 > 2}", &s), Value::Boolean(true));
        assert!(evaluate_line("And true", &s).is_err());
        assert!(evaluate_line("Not {GetAsInteger64 1}", &s).is_err());
    }

    #[test]
    fn math() {
        let s = session();
        assert_eq!(eval("Math add 1 2 3", &s), Value::Integer(6));
        assert_eq!(eval("Math sub 10 4", &s), Value::Integer(6));
        assert_eq!(eval("Math mul 2 2.5", &s), Value::Float(5.0));
        assert_eq!(eval("Math div 7 2", &s), Value::Integer(3));
        assert_eq!(eval("Math mod 7 2", &s), Value::Integer(1));
        assert!(evaluate_line("Math div 1 0", &s).is_err());
        assert!(evaluate_line("Math pow 1 2", &s).is_err());
    }

    #[test]
    fn run_if_is_lazy() {
        let s = session();
        eval("RunIf false StoreValue x = {GetAsInteger64 1}", &s);
        assert!(!s.contains_var("x"));
        assert_eq!(eval("RunIf {True} GetAsInteger64 9", &s), Value::Integer(9));
    }

    #[test]
    fn maps_are_copy_on_write() {
        let s = session();
        eval("StoreValue m = {NewMap a 1 b 2}", &s);
        eval("StoreValue m2 = {PutItemToMap {{m}} c 3}", &s);
        eval("StoreValue m3 = {DropItemFromMap {{m}} a}", &s);
        assert_eq!(s.get_var("m").unwrap().to_string(), "{a=1, b=2}");
        assert_eq!(s.get_var("m2").unwrap().to_string(), "{a=1, b=2, c=3}");
        assert_eq!(s.get_var("m3").unwrap().to_string(), "{b=2}");
        assert_eq!(eval("GetItemFromMap {{m}} b", &s), Value::from("2"));
        assert_eq!(eval("GetItemFromMap {{m}} zz", &s), Value::Null);
        assert!(evaluate_line("NewMap a", &s).is_err());
        assert!(evaluate_line("GetItemFromMap notamap a", &s).is_err());
    }

    #[test]
    fn environment_command() {
        let env = Environment::new();
        let s = Session::new(env.clone());
        eval("Environment set PrintResult 1", &s);
        assert!(env.is_enabled("PrintResult"));
        assert_eq!(eval("Environment get PrintResult", &s), Value::from("1"));
        assert_eq!(eval("Environment list", &s).to_string(), "{PrintResult=1}");
        eval("Environment set PrintResult \"\"", &s);
        assert!(!env.contains("PrintResult"));
        assert_eq!(eval("Environment get PrintResult", &s), Value::Null);
        assert!(evaluate_line("Environment frob", &s).is_err());
    }

    #[test]
    fn exit_terminates() {
        let s = session();
        assert_eq!(eval("Exit {GetAsInteger64 2}", &s), Value::Integer(2));
        assert!(s.is_terminated());
        assert_eq!(eval("Print unreachable", &s), Value::Integer(2));
    }

    #[test]
    fn sys_exit_rejects_codes_outside_i32() {
        let s = session();
        assert_eq!(eval("SysExit", &s), Value::Null);
        assert!(evaluate_line("SysExit {GetAsInteger64 9999999999}", &s).is_err());
        assert!(evaluate_line("SysExit {GetAsInteger64 -2147483649}", &s).is_err());
        assert!(evaluate_line("SysExit 4294967296", &s).is_err());
        assert!(evaluate_line("SysExit soon", &s).is_err());
    }

    #[test]
    fn type_conversions() {
        let s = session();
        assert_eq!(eval("GetAsFloat64 2", &s), Value::Float(2.0));
        assert_eq!(eval("GetAsString a {GetAsInteger64 1} {Null} b", &s), Value::from("a1b"));
        assert_eq!(eval("GetAsBoolean True", &s), Value::Boolean(true));
        assert_eq!(eval("TypeOf {GetAsInteger64 1}", &s), Value::from("integer"));
        assert_eq!(eval("TypeOf {Null}", &s), Value::from("null"));
        assert_eq!(eval("TypeOf {NewMap}", &s), Value::from("map"));
        assert!(evaluate_line("GetAsInteger64 abc", &s).is_err());
    }

    #[test]
    fn print_joins_arguments() {
        let s = session();
        assert_eq!(eval("Print a {GetAsInteger64 2} \"c d\"", &s), Value::from("a 2 c d"));
        assert_eq!(eval("Print \"\" {True}", &s), Value::from(" boolean: true"));
    }

    #[test]
    fn host_info_has_os() {
        let s = session();
        let info = eval("GetItemFromMap {HostInfo} OSName", &s);
        assert_eq!(info, Value::from(std::env::consts::OS));
    }

    #[test]
    fn invoke_method_of_builtin_string() {
        let s = session();
        eval("StoreValue greeting = \"hello world\"", &s);
        assert_eq!(eval("InvokeMethodOf {{greeting}} length", &s), Value::Integer(11));
        assert_eq!(
            eval("InvokeMethodOf {{greeting}} substring {GetAsInteger64 6}", &s),
            Value::from("world")
        );
        let err = evaluate_line("InvokeMethodOf {{greeting}} substring 6", &s).unwrap_err();
        assert_eq!(err.kind(), crate::script::error::ErrorKind::Resolution);
    }

    #[test]
    fn current_codeblock_outside_blocks_is_null() {
        let s = session();
        assert_eq!(eval("CurrentCodeblock", &s), Value::Null);
    }
}
