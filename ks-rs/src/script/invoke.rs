//! Dynamic host-method invocation.
//!
//! Host objects are reached through a [`HostCatalog`] of registered
//! [`HostClass`]es.  Every class lists its supertypes and its public
//! methods with typed signatures; `InvokeMethodOf` asks the catalog to pick
//! the best overload for the runtime types of the supplied arguments, coerce
//! the arguments to the chosen signature, and make the call.
//!
//! # Overload scoring
//!
//! Each parameter scores the conversion its argument needs:
//!
//! | conversion                                  | penalty |
//! |---------------------------------------------|---------|
//! | exact type                                  | 0       |
//! | boxing / unboxing (`int` ↔ `Integer`)       | 1       |
//! | primitive widening (`int` → `long`)         | 2       |
//! | one-character text → `char` / `Character`   | 2       |
//! | reference upcast (`String` → `Object`)      | 3       |
//! | `null` → any reference type                 | 3       |
//!
//! Anything else disqualifies the candidate.  A variadic tail either takes a
//! single pre-packed list matching the array type (no extra cost) or scores
//! each trailing argument against the element type and adds 1 for packing.
//! Candidates are ranked by total penalty, then non-variadic first, then by
//! parameter specificity left to right.
//!
//! Runtime argument types: `Boolean` is `boolean`, `Integer` is `int` when
//! it fits 32 bits and `long` otherwise, `Float` is `double`, `Text` is
//! `String`, a list is an array of its common element type (else of
//! `Object`), and host objects are their registered class.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use super::error::{ScriptError, ScriptResult};
use super::value::{Value, ValueMap};

/// Root of the class hierarchy.
pub const OBJECT: &str = "Object";

// ── Types ─────────────────────────────────────────────────────────────────────

/// Primitive parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl Prim {
    /// The boxed class of this primitive.
    pub fn wrapper(self) -> &'static str {
        match self {
            Prim::Boolean => "Boolean",
            Prim::Byte => "Byte",
            Prim::Short => "Short",
            Prim::Char => "Character",
            Prim::Int => "Integer",
            Prim::Long => "Long",
            Prim::Float => "Float",
            Prim::Double => "Double",
        }
    }

    /// The primitive boxed by `class`, if it is a wrapper class.
    pub fn unwrapped(class: &str) -> Option<Prim> {
        Some(match class {
            "Boolean" => Prim::Boolean,
            "Byte" => Prim::Byte,
            "Short" => Prim::Short,
            "Character" => Prim::Char,
            "Integer" => Prim::Int,
            "Long" => Prim::Long,
            "Float" => Prim::Float,
            "Double" => Prim::Double,
            _ => return None,
        })
    }

    /// `true` if a `self` value converts to `to` by primitive widening.
    pub fn widens_to(self, to: Prim) -> bool {
        use Prim::*;
        match self {
            Byte => matches!(to, Short | Int | Long | Float | Double),
            Short | Char => matches!(to, Int | Long | Float | Double),
            Int => matches!(to, Long | Float | Double),
            Long => matches!(to, Float | Double),
            Float => matches!(to, Double),
            Double | Boolean => false,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Prim::Boolean => "boolean",
            Prim::Byte => "byte",
            Prim::Short => "short",
            Prim::Char => "char",
            Prim::Int => "int",
            Prim::Long => "long",
            Prim::Float => "float",
            Prim::Double => "double",
        }
    }
}

/// A parameter or argument type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Prim(Prim),
    Class(String),
    Array(Box<TypeRef>),
}

impl TypeRef {
    pub fn class(name: impl Into<String>) -> Self {
        TypeRef::Class(name.into())
    }

    pub fn array(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    pub fn object() -> Self {
        TypeRef::class(OBJECT)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Prim(_))
    }

    /// Runtime type of `value`, or `None` for Null.
    pub fn of(value: &Value) -> Option<TypeRef> {
        Some(match value {
            Value::Null => return None,
            Value::Boolean(_) => TypeRef::Prim(Prim::Boolean),
            Value::Integer(n) => {
                if i32::try_from(*n).is_ok() {
                    TypeRef::Prim(Prim::Int)
                } else {
                    TypeRef::Prim(Prim::Long)
                }
            }
            Value::Float(_) => TypeRef::Prim(Prim::Double),
            Value::Text(_) => TypeRef::class("String"),
            Value::Map(_) => TypeRef::class("Map"),
            Value::List(items) => {
                let mut types = items.iter().map(TypeRef::of);
                let common = match types.next() {
                    Some(Some(first)) if types.all(|t| t.as_ref() == Some(&first)) => first,
                    _ => TypeRef::object(),
                };
                TypeRef::array(common)
            }
            Value::Block(_) => TypeRef::class("Codeblock"),
            Value::Task(_) => TypeRef::class("Task"),
            Value::Host(host) => TypeRef::class(host.class_name()),
        })
    }

    /// Class a value is dispatched on when it is the call target.
    fn target_class(value: &Value) -> Option<String> {
        Some(match TypeRef::of(value)? {
            TypeRef::Prim(p) => p.wrapper().to_owned(),
            TypeRef::Class(name) => name,
            TypeRef::Array(_) => "List".to_owned(),
        })
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Prim(p) => write!(f, "{}", p.name()),
            TypeRef::Class(name) => write!(f, "{name}"),
            TypeRef::Array(element) => write!(f, "{element}[]"),
        }
    }
}

// ── Host objects ──────────────────────────────────────────────────────────────

/// Opaque reference to a host object of a registered class.
#[derive(Clone)]
pub struct HostRef {
    class: String,
    object: Arc<dyn Any + Send + Sync>,
}

impl HostRef {
    pub fn new<T: Any + Send + Sync>(class: impl Into<String>, object: T) -> Self {
        Self { class: class.into(), object: Arc::new(object) }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// `true` if both refer to the same object.
    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRef").field("class", &self.class).finish_non_exhaustive()
    }
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<host:{}>", self.class)
    }
}

/// An argument after coercion to the chosen signature.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArg {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    /// A packed variadic tail or a list passed to an array parameter.
    Array(Vec<HostArg>),
    /// Any other value, passed through untouched.
    Value(Value),
}

impl HostArg {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostArg::Byte(n) => Some(i64::from(*n)),
            HostArg::Short(n) => Some(i64::from(*n)),
            HostArg::Char(c) => Some(i64::from(u32::from(*c))),
            HostArg::Int(n) => Some(i64::from(*n)),
            HostArg::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostArg::Float(x) => Some(f64::from(*x)),
            HostArg::Double(x) => Some(*x),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            HostArg::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            HostArg::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Convert back into a script value.
    pub fn into_value(self) -> Value {
        match self {
            HostArg::Null => Value::Null,
            HostArg::Boolean(b) => Value::Boolean(b),
            HostArg::Char(c) => Value::Text(c.to_string()),
            HostArg::Float(x) => Value::Float(f64::from(x)),
            HostArg::Double(x) => Value::Float(x),
            HostArg::Text(s) => Value::Text(s),
            HostArg::Array(items) => Value::List(items.into_iter().map(HostArg::into_value).collect()),
            HostArg::Value(v) => v,
            other => other.as_i64().map_or(Value::Null, Value::Integer),
        }
    }

    /// The argument as passed when no conversion is needed.
    fn natural(value: &Value) -> HostArg {
        match value {
            Value::Null => HostArg::Null,
            Value::Boolean(b) => HostArg::Boolean(*b),
            Value::Integer(n) => match i32::try_from(*n) {
                Ok(small) => HostArg::Int(small),
                Err(_) => HostArg::Long(*n),
            },
            Value::Float(x) => HostArg::Double(*x),
            Value::Text(s) => HostArg::Text(s.clone()),
            other => HostArg::Value(other.clone()),
        }
    }
}

/// Failure raised by a host method.
#[derive(Debug, Error)]
pub enum HostError {
    /// The method could not be reached.
    #[error("access denied: {0}")]
    Access(String),
    /// The method ran and failed.
    #[error("{0}")]
    Failed(String),
}

// ── Classes and methods ───────────────────────────────────────────────────────

/// Implementation of a host method: `(target, coerced args) -> result`.
pub type HostFn = Arc<dyn Fn(&Value, Vec<HostArg>) -> Result<Value, HostError> + Send + Sync>;

/// Overload score; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score {
    pub penalty: u32,
    pub varargs: bool,
}

/// A public method of a host class.
#[derive(Clone)]
pub struct HostMethod {
    name: String,
    params: Vec<TypeRef>,
    variadic: bool,
    call: HostFn,
}

impl HostMethod {
    pub fn new<F>(name: impl Into<String>, params: Vec<TypeRef>, call: F) -> Self
    where
        F: Fn(&Value, Vec<HostArg>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self { name: name.into(), params, variadic: false, call: Arc::new(call) }
    }

    /// A variadic method.  The last entry of `params` is the array type of
    /// the variadic tail.
    pub fn variadic<F>(name: impl Into<String>, params: Vec<TypeRef>, call: F) -> Self
    where
        F: Fn(&Value, Vec<HostArg>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        let variadic = matches!(params.last(), Some(TypeRef::Array(_)));
        Self { name: name.into(), params, variadic, call: Arc::new(call) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeRef] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// `name(type, type…)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| match p {
                TypeRef::Array(element) if self.variadic && i + 1 == self.params.len() => {
                    format!("{element}...")
                }
                other => other.to_string(),
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    fn variadic_element(&self) -> Option<&TypeRef> {
        match self.params.last() {
            Some(TypeRef::Array(element)) if self.variadic => Some(element),
            _ => None,
        }
    }

    /// Score `args` against this method, or `None` if incompatible.
    pub fn score(&self, catalog: &HostCatalog, args: &[Value]) -> Option<Score> {
        let Some(element) = self.variadic_element() else {
            if self.params.len() != args.len() {
                return None;
            }
            let penalty = self
                .params
                .iter()
                .zip(args)
                .map(|(p, a)| catalog.param_score(p, a))
                .sum::<Option<u32>>()?;
            return Some(Score { penalty, varargs: false });
        };

        let fixed = self.params.len() - 1;
        if args.len() < fixed {
            return None;
        }
        let mut penalty = self.params[..fixed]
            .iter()
            .zip(args)
            .map(|(p, a)| catalog.param_score(p, a))
            .sum::<Option<u32>>()?;

        if self.is_prepacked(catalog, args) {
            return Some(Score { penalty, varargs: true });
        }
        penalty += args[fixed..]
            .iter()
            .map(|a| catalog.param_score(element, a))
            .sum::<Option<u32>>()?;
        Some(Score { penalty: penalty + 1, varargs: true })
    }

    /// `true` if the caller passed exactly one trailing list that already is
    /// an instance of the variadic array type.
    fn is_prepacked(&self, catalog: &HostCatalog, args: &[Value]) -> bool {
        let Some(array) = self.params.last() else {
            return false;
        };
        args.len() == self.params.len()
            && args
                .last()
                .and_then(TypeRef::of)
                .is_some_and(|t| matches!(t, TypeRef::Array(_)) && catalog.is_assignable(array, &t))
    }

    /// Coerce `args` to this method's parameter types.
    fn prepare(&self, catalog: &HostCatalog, args: &[Value]) -> ScriptResult<Vec<HostArg>> {
        let Some(element) = self.variadic_element() else {
            return self
                .params
                .iter()
                .zip(args)
                .map(|(p, a)| coerce(a, p))
                .collect();
        };
        let fixed = self.params.len() - 1;
        let mut out = self.params[..fixed]
            .iter()
            .zip(args)
            .map(|(p, a)| coerce(a, p))
            .collect::<ScriptResult<Vec<_>>>()?;
        if self.is_prepacked(catalog, args) {
            out.push(coerce(&args[fixed], &self.params[fixed])?);
        } else {
            let packed = args[fixed..]
                .iter()
                .map(|a| coerce(a, element))
                .collect::<ScriptResult<Vec<_>>>()?;
            out.push(HostArg::Array(packed));
        }
        Ok(out)
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostMethod({})", self.signature())
    }
}

/// A registered host class.
#[derive(Debug, Clone)]
pub struct HostClass {
    name: String,
    supertypes: Vec<String>,
    methods: Vec<HostMethod>,
}

impl HostClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), supertypes: Vec::new(), methods: Vec::new() }
    }

    /// Add a direct supertype.
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn method(mut self, method: HostMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[HostMethod] {
        &self.methods
    }
}

// ── Coercion ──────────────────────────────────────────────────────────────────

fn coerce(value: &Value, param: &TypeRef) -> ScriptResult<HostArg> {
    if value.is_null() {
        return Ok(HostArg::Null);
    }
    match param {
        TypeRef::Prim(p) => to_prim(value, *p),
        TypeRef::Class(name) => match Prim::unwrapped(name) {
            Some(p) => to_prim(value, p),
            None => Ok(HostArg::natural(value)),
        },
        TypeRef::Array(element) => match value {
            Value::List(items) => items
                .iter()
                .map(|item| coerce(item, element))
                .collect::<ScriptResult<Vec<_>>>()
                .map(HostArg::Array),
            other => Ok(HostArg::natural(other)),
        },
    }
}

fn to_prim(value: &Value, prim: Prim) -> ScriptResult<HostArg> {
    let mismatch = || {
        ScriptError::argument(
            "InvokeMethodOf",
            format!("cannot convert {} to {}", value.type_name(), prim.name()),
        )
    };
    match prim {
        Prim::Boolean => match value {
            Value::Boolean(b) => Ok(HostArg::Boolean(*b)),
            _ => Err(mismatch()),
        },
        Prim::Char => match value {
            Value::Integer(n) => char::from_u32(u32::from(*n as u16)).map(HostArg::Char).ok_or_else(mismatch),
            Value::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(HostArg::Char(c)),
                    _ => Err(mismatch()),
                }
            }
            _ => Err(mismatch()),
        },
        numeric => {
            let (int, float) = match value {
                Value::Integer(n) => (*n, *n as f64),
                Value::Float(x) => (*x as i64, *x),
                _ => return Err(mismatch()),
            };
            Ok(match numeric {
                Prim::Byte => HostArg::Byte(int as i8),
                Prim::Short => HostArg::Short(int as i16),
                Prim::Int => HostArg::Int(int as i32),
                Prim::Long => HostArg::Long(int),
                Prim::Float => HostArg::Float(float as f32),
                _ => HostArg::Double(float),
            })
        }
    }
}

// ── HostCatalog ───────────────────────────────────────────────────────────────

/// The set of classes reachable through `InvokeMethodOf`.
#[derive(Debug, Clone)]
pub struct HostCatalog {
    classes: IndexMap<String, HostClass>,
}

impl Default for HostCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCatalog {
    /// A catalog holding the built-in classes.
    pub fn new() -> Self {
        let mut catalog = Self { classes: IndexMap::new() };
        for class in builtin_classes() {
            catalog.register(class);
        }
        catalog
    }

    /// Add (or replace) a class.
    pub fn register(&mut self, class: HostClass) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn class(&self, name: &str) -> Option<&HostClass> {
        self.classes.get(name)
    }

    /// `true` if `sub` is `sup` or inherits from it.  Every class inherits
    /// from `Object`.
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT {
            return true;
        }
        let mut pending = vec![sub];
        let mut seen: Vec<&str> = Vec::new();
        while let Some(name) = pending.pop() {
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            if let Some(class) = self.classes.get(name) {
                for parent in &class.supertypes {
                    if parent == sup {
                        return true;
                    }
                    pending.push(parent);
                }
            }
        }
        false
    }

    /// `true` if a value of type `from` may be assigned to `to` without
    /// conversion: identical types, or reference types related by
    /// inheritance (arrays of references are covariant).
    pub fn is_assignable(&self, to: &TypeRef, from: &TypeRef) -> bool {
        match (to, from) {
            _ if to == from => true,
            (TypeRef::Class(to), TypeRef::Class(from)) => self.is_subclass(from, to),
            (TypeRef::Class(to), TypeRef::Array(_)) => to == OBJECT,
            (TypeRef::Array(to), TypeRef::Array(from)) => {
                !to.is_primitive() && !from.is_primitive() && self.is_assignable(to, from)
            }
            _ => false,
        }
    }

    /// Penalty for passing `arg` to a parameter of type `param`.
    pub fn param_score(&self, param: &TypeRef, arg: &Value) -> Option<u32> {
        let Some(arg_type) = TypeRef::of(arg) else {
            return (!param.is_primitive()).then_some(3);
        };
        if *param == arg_type {
            return Some(0);
        }
        let single_char = arg.as_text().is_some_and(|s| s.chars().count() == 1);
        match (param, &arg_type) {
            (TypeRef::Prim(p), TypeRef::Prim(a)) => a.widens_to(*p).then_some(2),
            (TypeRef::Prim(p), TypeRef::Class(c)) => {
                if p.wrapper() == c {
                    Some(1)
                } else if Prim::unwrapped(c).is_some_and(|a| a.widens_to(*p)) {
                    Some(2)
                } else if *p == Prim::Char && c == "String" && single_char {
                    Some(2)
                } else {
                    None
                }
            }
            (TypeRef::Class(c), TypeRef::Prim(a)) => {
                if a.wrapper() == c {
                    Some(1)
                } else if self.is_subclass(a.wrapper(), c) {
                    Some(3)
                } else {
                    None
                }
            }
            (TypeRef::Class(c), TypeRef::Class(_)) if c == "Character" && single_char => Some(2),
            _ => self.is_assignable(param, &arg_type).then_some(3),
        }
    }

    /// All methods callable on `class`, most-derived first.  An inherited
    /// method with the same signature as a nearer one is hidden.
    pub fn methods_of(&self, class: &str) -> Vec<&HostMethod> {
        let mut out: Vec<&HostMethod> = Vec::new();
        let mut queue: Vec<&str> = vec![class];
        let mut visited: Vec<&str> = Vec::new();
        let mut i = 0;
        while i < queue.len() {
            let name = queue[i];
            i += 1;
            if visited.contains(&name) {
                continue;
            }
            visited.push(name);
            let Some(c) = self.classes.get(name) else {
                if name != OBJECT {
                    queue.push(OBJECT);
                }
                continue;
            };
            for m in &c.methods {
                if !out.iter().any(|o| o.name == m.name && o.params == m.params) {
                    out.push(m);
                }
            }
            queue.extend(c.supertypes.iter().map(String::as_str));
            if c.supertypes.is_empty() && name != OBJECT {
                queue.push(OBJECT);
            }
        }
        out
    }

    /// Pick the best overload of `method` on `class` for `args`.
    pub fn select(&self, class: &str, method: &str, args: &[Value]) -> Option<&HostMethod> {
        let mut candidates: Vec<(&HostMethod, Score)> = self
            .methods_of(class)
            .into_iter()
            .filter(|m| m.name == method)
            .filter_map(|m| m.score(self, args).map(|s| (m, s)))
            .collect();
        candidates.sort_by(|(a, sa), (b, sb)| {
            sa.cmp(sb)
                .then_with(|| a.variadic.cmp(&b.variadic))
                .then_with(|| self.compare_specificity(&a.params, &b.params))
        });
        candidates.first().map(|(m, _)| *m)
    }

    /// `Less` if `a`'s parameters are narrower than `b`'s, compared left to
    /// right and summed.
    fn compare_specificity(&self, a: &[TypeRef], b: &[TypeRef]) -> Ordering {
        let total: i32 = a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                if x == y {
                    0
                } else if self.is_assignable(x, y) {
                    1
                } else if self.is_assignable(y, x) {
                    -1
                } else {
                    0
                }
            })
            .sum();
        total.cmp(&0)
    }

    /// Call `method` on `target` with `args`.
    pub fn invoke(&self, target: &Value, method: &str, args: &[Value]) -> ScriptResult<Value> {
        let class = TypeRef::target_class(target)
            .ok_or_else(|| ScriptError::argument("InvokeMethodOf", "target object is null"))?;
        let chosen = self.select(&class, method, args).ok_or_else(|| {
            ScriptError::NoCompatibleOverload { method: method.to_owned(), type_name: class.clone() }
        })?;
        let prepared = chosen.prepare(self, args)?;
        debug!(class = %class, method = %chosen.signature(), "invoke host method");
        (chosen.call)(target, prepared).map_err(|e| match e {
            HostError::Access(msg) => ScriptError::HostAccess(format!(
                "cannot invoke {} on {class}: {msg}",
                chosen.signature()
            )),
            HostError::Failed(msg) => ScriptError::Invocation(format!(
                "failed to invoke {} on {class}: {msg}",
                chosen.signature()
            )),
        })
    }
}

// ── Built-in classes ──────────────────────────────────────────────────────────

fn class(name: &str) -> TypeRef {
    TypeRef::class(name)
}

const INT: TypeRef = TypeRef::Prim(Prim::Int);
const CHAR: TypeRef = TypeRef::Prim(Prim::Char);

fn arg_i64(args: &[HostArg], index: usize) -> Result<i64, HostError> {
    args.get(index)
        .and_then(HostArg::as_i64)
        .ok_or_else(|| HostError::Failed(format!("argument {index} is not an integer")))
}

fn arg_text(args: &[HostArg], index: usize) -> Result<&str, HostError> {
    args.get(index)
        .and_then(HostArg::as_text)
        .ok_or_else(|| HostError::Failed(format!("argument {index} is not a string")))
}

fn target_text(target: &Value) -> Result<&str, HostError> {
    target
        .as_text()
        .ok_or_else(|| HostError::Failed(format!("{} is not a String", target.type_name())))
}

fn target_map(target: &Value) -> Result<&ValueMap, HostError> {
    match target {
        Value::Map(map) => Ok(map),
        other => Err(HostError::Failed(format!("{} is not a Map", other.type_name()))),
    }
}

fn target_list(target: &Value) -> Result<&[Value], HostError> {
    match target {
        Value::List(items) => Ok(items),
        other => Err(HostError::Failed(format!("{} is not a List", other.type_name()))),
    }
}

/// Char offset of the first `needle` at or after char index `from`.
fn index_of(haystack: &str, needle: &str, from: i64) -> i64 {
    let from = usize::try_from(from.max(0)).unwrap_or(0);
    let Some((start, _)) = haystack.char_indices().nth(from) else {
        return if needle.is_empty() { haystack.chars().count() as i64 } else { -1 };
    };
    match haystack[start..].find(needle) {
        Some(byte) => (from + haystack[start..start + byte].chars().count()) as i64,
        None => -1,
    }
}

fn substring(s: &str, begin: i64, end: Option<i64>) -> Result<Value, HostError> {
    let len = s.chars().count() as i64;
    let end = end.unwrap_or(len);
    if begin < 0 || end > len || begin > end {
        return Err(HostError::Failed(format!("begin {begin}, end {end}, length {len}")));
    }
    Ok(Value::Text(
        s.chars().skip(begin as usize).take((end - begin) as usize).collect(),
    ))
}

fn builtin_classes() -> Vec<HostClass> {
    let object = HostClass::new(OBJECT)
        .method(HostMethod::new("toString", vec![], |t, _| Ok(Value::Text(t.to_string()))))
        .method(HostMethod::new("equals", vec![TypeRef::object()], |t, args| {
            let other = args.into_iter().next().map_or(Value::Null, HostArg::into_value);
            Ok(Value::Boolean(*t == other))
        }))
        .method(HostMethod::new("getClassName", vec![], |t, _| {
            Ok(TypeRef::target_class(t).map_or(Value::Null, Value::Text))
        }));

    let number = HostClass::new("Number")
        .extends(OBJECT)
        .method(HostMethod::new("intValue", vec![], |t, _| {
            t.as_int().map(|n| Value::Integer(i64::from(n as i32))).ok_or_else(|| {
                HostError::Failed(format!("{} is not a Number", t.type_name()))
            })
        }))
        .method(HostMethod::new("longValue", vec![], |t, _| {
            t.as_int().map(Value::Integer).ok_or_else(|| {
                HostError::Failed(format!("{} is not a Number", t.type_name()))
            })
        }))
        .method(HostMethod::new("doubleValue", vec![], |t, _| {
            t.as_float().map(Value::Float).ok_or_else(|| {
                HostError::Failed(format!("{} is not a Number", t.type_name()))
            })
        }));

    let boxed_numbers = ["Byte", "Short", "Integer", "Long", "Float", "Double"]
        .into_iter()
        .map(|name| HostClass::new(name).extends("Number"));

    let boolean = HostClass::new("Boolean")
        .extends(OBJECT)
        .method(HostMethod::new("booleanValue", vec![], |t, _| {
            t.as_bool().map(Value::Boolean).ok_or_else(|| {
                HostError::Failed(format!("{} is not a Boolean", t.type_name()))
            })
        }));

    let string = HostClass::new("String")
        .extends("CharSequence")
        .method(HostMethod::new("length", vec![], |t, _| {
            Ok(Value::Integer(target_text(t)?.chars().count() as i64))
        }))
        .method(HostMethod::new("isEmpty", vec![], |t, _| {
            Ok(Value::Boolean(target_text(t)?.is_empty()))
        }))
        .method(HostMethod::new("toUpperCase", vec![], |t, _| {
            Ok(Value::Text(target_text(t)?.to_uppercase()))
        }))
        .method(HostMethod::new("toLowerCase", vec![], |t, _| {
            Ok(Value::Text(target_text(t)?.to_lowercase()))
        }))
        .method(HostMethod::new("trim", vec![], |t, _| {
            Ok(Value::Text(target_text(t)?.trim().to_owned()))
        }))
        .method(HostMethod::new("charAt", vec![INT], |t, args| {
            let s = target_text(t)?;
            let i = arg_i64(&args, 0)?;
            usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Text(c.to_string()))
                .ok_or_else(|| HostError::Failed(format!("index {i} out of range")))
        }))
        .method(HostMethod::new("substring", vec![INT], |t, args| {
            substring(target_text(t)?, arg_i64(&args, 0)?, None)
        }))
        .method(HostMethod::new("substring", vec![INT, INT], |t, args| {
            substring(target_text(t)?, arg_i64(&args, 0)?, Some(arg_i64(&args, 1)?))
        }))
        .method(HostMethod::new("indexOf", vec![class("String")], |t, args| {
            Ok(Value::Integer(index_of(target_text(t)?, arg_text(&args, 0)?, 0)))
        }))
        .method(HostMethod::new("indexOf", vec![CHAR], |t, args| {
            let c = args.first().and_then(HostArg::as_char).unwrap_or('\0');
            Ok(Value::Integer(index_of(target_text(t)?, &c.to_string(), 0)))
        }))
        .method(HostMethod::new("indexOf", vec![class("String"), INT], |t, args| {
            Ok(Value::Integer(index_of(target_text(t)?, arg_text(&args, 0)?, arg_i64(&args, 1)?)))
        }))
        .method(HostMethod::new("contains", vec![class("CharSequence")], |t, args| {
            Ok(Value::Boolean(target_text(t)?.contains(arg_text(&args, 0)?)))
        }))
        .method(HostMethod::new("startsWith", vec![class("String")], |t, args| {
            Ok(Value::Boolean(target_text(t)?.starts_with(arg_text(&args, 0)?)))
        }))
        .method(HostMethod::new("endsWith", vec![class("String")], |t, args| {
            Ok(Value::Boolean(target_text(t)?.ends_with(arg_text(&args, 0)?)))
        }))
        .method(HostMethod::new("concat", vec![class("String")], |t, args| {
            Ok(Value::Text(format!("{}{}", target_text(t)?, arg_text(&args, 0)?)))
        }))
        .method(HostMethod::new(
            "replace",
            vec![class("CharSequence"), class("CharSequence")],
            |t, args| {
                Ok(Value::Text(target_text(t)?.replace(arg_text(&args, 0)?, arg_text(&args, 1)?)))
            },
        ))
        .method(HostMethod::new("split", vec![class("String")], |t, args| {
            Ok(Value::List(
                target_text(t)?
                    .split(arg_text(&args, 0)?)
                    .map(Value::from)
                    .collect(),
            ))
        }))
        .method(HostMethod::new("repeat", vec![INT], |t, args| {
            let n = usize::try_from(arg_i64(&args, 0)?)
                .map_err(|_| HostError::Failed("count is negative".into()))?;
            Ok(Value::Text(target_text(t)?.repeat(n)))
        }));

    let map = HostClass::new("Map")
        .extends(OBJECT)
        .method(HostMethod::new("size", vec![], |t, _| {
            Ok(Value::Integer(target_map(t)?.len() as i64))
        }))
        .method(HostMethod::new("isEmpty", vec![], |t, _| {
            Ok(Value::Boolean(target_map(t)?.is_empty()))
        }))
        .method(HostMethod::new("get", vec![TypeRef::object()], |t, args| {
            let key = args.into_iter().next().map_or(Value::Null, HostArg::into_value);
            Ok(target_map(t)?.get(&key.to_string()).cloned().unwrap_or_default())
        }))
        .method(HostMethod::new("containsKey", vec![TypeRef::object()], |t, args| {
            let key = args.into_iter().next().map_or(Value::Null, HostArg::into_value);
            Ok(Value::Boolean(target_map(t)?.contains_key(&key.to_string())))
        }))
        .method(HostMethod::new("keySet", vec![], |t, _| {
            Ok(Value::List(target_map(t)?.keys().map(|k| Value::from(k.as_str())).collect()))
        }));

    let list = HostClass::new("List")
        .extends(OBJECT)
        .method(HostMethod::new("size", vec![], |t, _| {
            Ok(Value::Integer(target_list(t)?.len() as i64))
        }))
        .method(HostMethod::new("isEmpty", vec![], |t, _| {
            Ok(Value::Boolean(target_list(t)?.is_empty()))
        }))
        .method(HostMethod::new("get", vec![INT], |t, args| {
            let i = arg_i64(&args, 0)?;
            usize::try_from(i)
                .ok()
                .and_then(|i| target_list(t).ok()?.get(i).cloned())
                .ok_or_else(|| HostError::Failed(format!("index {i} out of range")))
        }))
        .method(HostMethod::new("contains", vec![TypeRef::object()], |t, args| {
            let needle = args.into_iter().next().map_or(Value::Null, HostArg::into_value);
            Ok(Value::Boolean(target_list(t)?.contains(&needle)))
        }));

    let codeblock = HostClass::new("Codeblock")
        .extends(OBJECT)
        .method(HostMethod::new("getName", vec![], |t, _| match t {
            Value::Block(b) => Ok(Value::from(b.name())),
            other => Err(HostError::Failed(format!("{} is not a Codeblock", other.type_name()))),
        }))
        .method(HostMethod::new("getExecutionCount", vec![], |t, _| match t {
            Value::Block(b) => Ok(Value::Integer(b.executions() as i64)),
            other => Err(HostError::Failed(format!("{} is not a Codeblock", other.type_name()))),
        }))
        .method(HostMethod::new("run", vec![], |t, _| match t {
            Value::Block(b) => b.run_bound().map_err(|e| HostError::Failed(e.trail())),
            other => Err(HostError::Failed(format!("{} is not a Codeblock", other.type_name()))),
        }));

    let task = HostClass::new("Task")
        .extends(OBJECT)
        .method(HostMethod::new("getId", vec![], |t, _| match t {
            Value::Task(task) => Ok(Value::Integer(task.id() as i64)),
            other => Err(HostError::Failed(format!("{} is not a Task", other.type_name()))),
        }))
        .method(HostMethod::new("isAlive", vec![], |t, _| match t {
            Value::Task(task) => Ok(Value::Boolean(!task.is_finished())),
            other => Err(HostError::Failed(format!("{} is not a Task", other.type_name()))),
        }));

    let mut classes = vec![object, number];
    classes.extend(boxed_numbers);
    classes.extend([
        boolean,
        HostClass::new("Character").extends(OBJECT),
        HostClass::new("CharSequence").extends(OBJECT),
        string,
        map,
        list,
        codeblock,
        task,
    ]);
    classes
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: TypeRef = TypeRef::Prim(Prim::Long);

    fn tag(label: &'static str) -> impl Fn(&Value, Vec<HostArg>) -> Result<Value, HostError> {
        move |_, _| Ok(Value::from(label))
    }

    fn catalog_with(class: HostClass) -> HostCatalog {
        let mut c = HostCatalog::new();
        c.register(class);
        c
    }

    fn calc() -> Value {
        Value::Host(HostRef::new("Calc", ()))
    }

    #[test]
    fn exact_int_beats_widening_to_long() {
        let c = catalog_with(
            HostClass::new("Calc")
                .method(HostMethod::new("f", vec![LONG], tag("long")))
                .method(HostMethod::new("f", vec![INT], tag("int"))),
        );
        assert_eq!(c.invoke(&calc(), "f", &[Value::Integer(5)]).unwrap(), Value::from("int"));
        let m = c.select("Calc", "f", &[Value::Integer(5)]).unwrap();
        assert_eq!(m.score(&c, &[Value::Integer(5)]), Some(Score { penalty: 0, varargs: false }));
        let methods = c.methods_of("Calc");
        assert_eq!(methods[0].signature(), "f(long)");
        assert_eq!(methods[0].score(&c, &[Value::Integer(5)]).map(|s| s.penalty), Some(2));
    }

    #[test]
    fn wide_integer_only_fits_long() {
        let c = catalog_with(
            HostClass::new("Calc")
                .method(HostMethod::new("f", vec![INT], tag("int")))
                .method(HostMethod::new("f", vec![LONG], tag("long"))),
        );
        let big = Value::Integer(5_000_000_000);
        assert_eq!(c.invoke(&calc(), "f", &[big]).unwrap(), Value::from("long"));
    }

    #[test]
    fn penalties_by_conversion() {
        let c = HostCatalog::new();
        let one = Value::Integer(1);
        assert_eq!(c.param_score(&INT, &one), Some(0));
        assert_eq!(c.param_score(&class("Integer"), &one), Some(1));
        assert_eq!(c.param_score(&LONG, &one), Some(2));
        assert_eq!(c.param_score(&class("Number"), &one), Some(3));
        assert_eq!(c.param_score(&TypeRef::object(), &one), Some(3));
        assert_eq!(c.param_score(&class("String"), &one), None);
        assert_eq!(c.param_score(&TypeRef::Prim(Prim::Short), &one), None);

        let text = Value::from("x");
        assert_eq!(c.param_score(&class("String"), &text), Some(0));
        assert_eq!(c.param_score(&class("CharSequence"), &text), Some(3));
        assert_eq!(c.param_score(&CHAR, &text), Some(2));
        assert_eq!(c.param_score(&class("Character"), &text), Some(2));
        assert_eq!(c.param_score(&CHAR, &Value::from("xy")), None);
    }

    #[test]
    fn null_matches_references_only() {
        let c = HostCatalog::new();
        assert_eq!(c.param_score(&class("String"), &Value::Null), Some(3));
        assert_eq!(c.param_score(&INT, &Value::Null), None);
    }

    #[test]
    fn exact_beats_boxing() {
        let c = catalog_with(
            HostClass::new("Calc")
                .method(HostMethod::new("g", vec![class("Integer")], tag("boxed")))
                .method(HostMethod::new("g", vec![INT], tag("prim"))),
        );
        assert_eq!(c.invoke(&calc(), "g", &[Value::Integer(1)]).unwrap(), Value::from("prim"));
    }

    #[test]
    fn prepacked_variadic_costs_less_than_packing() {
        let c = HostCatalog::new();
        let sum = HostMethod::variadic("sum", vec![TypeRef::array(INT)], |_, args| {
            let Some(HostArg::Array(items)) = args.into_iter().next() else {
                return Err(HostError::Failed("expected packed ints".into()));
            };
            Ok(Value::Integer(items.iter().filter_map(HostArg::as_i64).sum()))
        });
        let loose = [Value::Integer(1), Value::Integer(2), Value::Integer(3)];
        let packed = [Value::List(loose.to_vec())];
        let s_loose = sum.score(&c, &loose).unwrap();
        let s_packed = sum.score(&c, &packed).unwrap();
        assert_eq!(s_packed, Score { penalty: 0, varargs: true });
        assert_eq!(s_loose, Score { penalty: 1, varargs: true });
        assert!(s_packed < s_loose);

        let c = catalog_with(HostClass::new("Calc").method(sum));
        assert_eq!(c.invoke(&calc(), "sum", &loose).unwrap(), Value::Integer(6));
        assert_eq!(c.invoke(&calc(), "sum", &packed).unwrap(), Value::Integer(6));
        assert_eq!(c.invoke(&calc(), "sum", &[]).unwrap(), Value::Integer(0));
    }

    #[test]
    fn fixed_arity_beats_variadic_on_tie() {
        let c = catalog_with(
            HostClass::new("Calc")
                .method(HostMethod::variadic("h", vec![TypeRef::array(INT)], tag("varargs")))
                .method(HostMethod::new("h", vec![class("Integer")], tag("fixed"))),
        );
        // fixed: boxing = 1; varargs: exact 0 + packing 1 = 1.
        assert_eq!(c.invoke(&calc(), "h", &[Value::Integer(1)]).unwrap(), Value::from("fixed"));
    }

    #[test]
    fn narrower_parameter_wins_on_tie() {
        let c = catalog_with(
            HostClass::new("Calc")
                .method(HostMethod::new("k", vec![TypeRef::object()], tag("object")))
                .method(HostMethod::new("k", vec![class("CharSequence")], tag("chars"))),
        );
        assert_eq!(c.invoke(&calc(), "k", &[Value::from("s")]).unwrap(), Value::from("chars"));
        // Selection is stable across calls.
        for _ in 0..5 {
            let m = c.select("Calc", "k", &[Value::from("s")]).unwrap();
            assert_eq!(m.signature(), "k(CharSequence)");
        }
    }

    #[test]
    fn no_overload_is_a_resolution_error() {
        let c = HostCatalog::new();
        let err = c.invoke(&Value::from("abc"), "nope", &[]).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::NoCompatibleOverload { ref method, ref type_name }
                if method == "nope" && type_name == "String"
        ));
        assert_eq!(err.to_string(), "no compatible overload for nope on String");
    }

    #[test]
    fn host_failures_are_reported_distinctly() {
        let c = catalog_with(
            HostClass::new("Calc")
                .method(HostMethod::new("locked", vec![], |_, _| Err(HostError::Access("private".into()))))
                .method(HostMethod::new("broken", vec![], |_, _| Err(HostError::Failed("kaput".into())))),
        );
        assert!(matches!(c.invoke(&calc(), "locked", &[]), Err(ScriptError::HostAccess(_))));
        assert!(matches!(c.invoke(&calc(), "broken", &[]), Err(ScriptError::Invocation(_))));
    }

    #[test]
    fn null_target_is_rejected() {
        let c = HostCatalog::new();
        assert!(c.invoke(&Value::Null, "toString", &[]).is_err());
    }

    #[test]
    fn coercion_narrows_and_converts_chars() {
        assert_eq!(to_prim(&Value::Integer(300), Prim::Byte).unwrap(), HostArg::Byte(44));
        assert_eq!(to_prim(&Value::Float(2.9), Prim::Int).unwrap(), HostArg::Int(2));
        assert_eq!(to_prim(&Value::Integer(65), Prim::Char).unwrap(), HostArg::Char('A'));
        assert_eq!(to_prim(&Value::from("z"), Prim::Char).unwrap(), HostArg::Char('z'));
        assert!(to_prim(&Value::from("zz"), Prim::Char).is_err());
        assert!(to_prim(&Value::from("1"), Prim::Int).is_err());
    }

    #[test]
    fn string_overloads() {
        let c = HostCatalog::new();
        let s = Value::from("hello world");
        assert_eq!(c.invoke(&s, "length", &[]).unwrap(), Value::Integer(11));
        assert_eq!(c.invoke(&s, "indexOf", &[Value::from("o")]).unwrap(), Value::Integer(4));
        assert_eq!(
            c.invoke(&s, "indexOf", &[Value::from("o"), Value::Integer(5)]).unwrap(),
            Value::Integer(7)
        );
        assert_eq!(
            c.invoke(&s, "substring", &[Value::Integer(6)]).unwrap(),
            Value::from("world")
        );
        assert_eq!(
            c.invoke(&s, "substring", &[Value::Integer(0), Value::Integer(5)]).unwrap(),
            Value::from("hello")
        );
        assert!(c.invoke(&s, "substring", &[Value::Integer(20)]).is_err());
        assert_eq!(c.invoke(&s, "toString", &[]).unwrap(), s);
    }

    #[test]
    fn inherited_methods() {
        let c = HostCatalog::new();
        assert_eq!(
            c.invoke(&Value::Float(2.75), "intValue", &[]).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            c.invoke(&Value::Integer(4), "equals", &[Value::Integer(4)]).unwrap(),
            Value::Boolean(true)
        );
        assert!(c.is_subclass("Integer", "Number"));
        assert!(c.is_subclass("String", "CharSequence"));
        assert!(c.is_subclass("Calc", OBJECT));
        assert!(!c.is_subclass("String", "Number"));
    }

    #[test]
    fn list_runtime_type() {
        let ints = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(TypeRef::of(&ints), Some(TypeRef::array(INT)));
        let mixed = Value::List(vec![Value::Integer(1), Value::from("a")]);
        assert_eq!(TypeRef::of(&mixed), Some(TypeRef::array(TypeRef::object())));
        let c = HostCatalog::new();
        let strings = TypeRef::array(class("String"));
        assert!(c.is_assignable(&TypeRef::array(TypeRef::object()), &strings));
        assert!(!c.is_assignable(&TypeRef::array(TypeRef::object()), &TypeRef::array(INT)));
    }

    #[test]
    fn host_objects_downcast() {
        struct Counter(u32);
        let h = HostRef::new("Counter", Counter(7));
        assert_eq!(h.downcast_ref::<Counter>().map(|c| c.0), Some(7));
        assert!(h.downcast_ref::<String>().is_none());
        assert!(h.ptr_eq(&h.clone()));
        assert_eq!(h.to_string(), "<host:Counter>");
    }
}
