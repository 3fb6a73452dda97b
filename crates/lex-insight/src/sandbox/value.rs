//! Runtime values and lexical scopes of the script interpreter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::FunctionDef;
use super::error::SandboxError;
use crate::dataset::{Row, Value};
use crate::utils::{format_number, parse_numeric_string};

/// Deepest array/object nesting a script may build.
pub const MAX_VALUE_DEPTH: usize = 256;

/// Smallest share of the output budget one JSON node spends.
pub const JSON_NODE_COST: usize = 8;

/// Length of value renderings inside error messages.
const PREVIEW_LENGTH: usize = 80;

/// A conversion would exceed its size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Text buffer that never grows past `limit` bytes.
///
/// A write that does not fit stores the prefix that does and fails. Arrays
/// walked while writing are counted against the same limit, which bounds the
/// work spent on values that share one subtree many times.
#[derive(Debug)]
pub struct BoundedText {
    buf: String,
    limit: usize,
    nodes: usize,
}

impl BoundedText {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            nodes: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.buf.len()
    }

    pub fn push_str(&mut self, s: &str) -> Result<(), Overflow> {
        let room = self.remaining();
        if s.len() <= room {
            self.buf.push_str(s);
            return Ok(());
        }
        let mut end = room;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push_str(&s[..end]);
        Err(Overflow)
    }

    fn enter(&mut self) -> Result<(), Overflow> {
        self.nodes += 1;
        if self.nodes > self.limit {
            return Err(Overflow);
        }
        Ok(())
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<List>),
    Object(Rc<Record>),
    Function(Rc<Closure>),
    Native(Builtin),
}

/// Immutable array contents together with their nesting depth.
#[derive(Debug, Default)]
pub struct List {
    items: Vec<ScriptValue>,
    depth: usize,
}

impl Deref for List {
    type Target = [ScriptValue];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

/// Immutable object contents together with their nesting depth.
#[derive(Debug, Default)]
pub struct Record {
    entries: IndexMap<String, ScriptValue>,
    depth: usize,
}

impl Deref for Record {
    type Target = IndexMap<String, ScriptValue>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

/// An arrow function and the scope it closes over.
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({} params)", self.def.params.len())
    }
}

/// Host functions reachable from scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Filter,
    Map,
    Reduce,
    GroupBy,
    Aggregate,
    Log,
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Pow,
    Min,
    Max,
    Ln,
    Exp,
    Random,
    Error,
    ToNumber,
    ToString,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Map => "map",
            Self::Reduce => "reduce",
            Self::GroupBy => "groupBy",
            Self::Aggregate => "aggregate",
            Self::Log => "log",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Sqrt => "sqrt",
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
            Self::Ln => "log",
            Self::Exp => "exp",
            Self::Random => "random",
            Self::Error => "Error",
            Self::ToNumber => "Number",
            Self::ToString => "String",
        }
    }
}

fn nesting_exceeded() -> SandboxError {
    SandboxError::ResourceExhausted(format!(
        "Value nesting limit of {MAX_VALUE_DEPTH} exceeded"
    ))
}

impl ScriptValue {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    pub fn array(items: Vec<ScriptValue>) -> Result<Self, SandboxError> {
        let depth = 1 + items.iter().map(Self::depth).max().unwrap_or(0);
        if depth > MAX_VALUE_DEPTH {
            return Err(nesting_exceeded());
        }
        Ok(Self::Array(Rc::new(List { items, depth })))
    }

    pub fn object(entries: IndexMap<String, ScriptValue>) -> Result<Self, SandboxError> {
        let depth = 1 + entries.values().map(Self::depth).max().unwrap_or(0);
        if depth > MAX_VALUE_DEPTH {
            return Err(nesting_exceeded());
        }
        Ok(Self::Object(Rc::new(Record { entries, depth })))
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Array(list) => list.depth,
            Self::Object(record) => record.depth,
            _ => 0,
        }
    }

    /// Script view of a dataset cell. Dates become ISO-8601 strings.
    pub fn from_cell(value: &Value) -> Self {
        match value {
            Value::Number(n) => Self::Number(*n),
            Value::String(s) => Self::string(s.as_str()),
            Value::Boolean(b) => Self::Bool(*b),
            Value::Date(_) => Self::string(value.key()),
            Value::Null => Self::Null,
        }
    }

    /// Script view of a dataset row.
    pub fn from_row(row: &Row) -> Self {
        let entries = row
            .iter()
            .map(|(name, value)| (name.clone(), Self::from_cell(value)))
            .collect();
        Self::Object(Rc::new(Record { entries, depth: 1 }))
    }

    /// Script view of a dataset: an array of row objects.
    pub fn from_rows(rows: &[Row]) -> Self {
        let items = rows.iter().map(Self::from_row).collect::<Vec<_>>();
        let depth = if items.is_empty() { 1 } else { 2 };
        Self::Array(Rc::new(List { items, depth }))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Array(_) | Self::Object(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) | Self::Native(_) => "function",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Array(list) if list.is_empty() => 0.0,
            _ => f64::NAN,
        }
    }

    /// Write the string form used by `+` concatenation and `String(x)`.
    pub fn write_display(&self, out: &mut BoundedText) -> Result<(), Overflow> {
        match self {
            Self::Undefined => out.push_str("undefined"),
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => out.push_str(&format_number(*n)),
            Self::String(s) => out.push_str(s),
            Self::Array(list) => {
                out.enter()?;
                for (index, item) in list.iter().enumerate() {
                    if index > 0 {
                        out.push_str(",")?;
                    }
                    if !item.is_nullish() {
                        item.write_display(out)?;
                    }
                }
                Ok(())
            }
            Self::Object(_) => out.push_str("[object Object]"),
            Self::Function(_) | Self::Native(_) => out.push_str("[Function]"),
        }
    }

    /// Display string of at most `limit` bytes.
    pub fn display_within(&self, limit: usize) -> Result<String, Overflow> {
        let mut out = BoundedText::new(limit);
        self.write_display(&mut out)?;
        Ok(out.into_string())
    }

    /// Write compact JSON text. Whole numbers print as integers, non-finite
    /// numbers as `null`, and `undefined` object entries are skipped.
    pub fn write_json(&self, out: &mut BoundedText) -> Result<(), Overflow> {
        match self {
            Self::Undefined | Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => out.push_str(&number_to_json(*n).to_string()),
            Self::String(s) => write_json_string(s, out),
            Self::Array(list) => {
                out.push_str("[")?;
                for (index, item) in list.iter().enumerate() {
                    if index > 0 {
                        out.push_str(",")?;
                    }
                    item.write_json(out)?;
                }
                out.push_str("]")
            }
            Self::Object(record) => {
                out.push_str("{")?;
                let entries = record
                    .iter()
                    .filter(|(_, value)| !matches!(value, Self::Undefined));
                for (index, (key, value)) in entries.enumerate() {
                    if index > 0 {
                        out.push_str(",")?;
                    }
                    write_json_string(key, out)?;
                    out.push_str(":")?;
                    value.write_json(out)?;
                }
                out.push_str("}")
            }
            Self::Function(_) | Self::Native(_) => out.push_str("\"[Function]\""),
        }
    }

    /// Write the text `console.log` prints: strings verbatim, everything
    /// else as compact JSON.
    pub fn write_log(&self, out: &mut BoundedText) -> Result<(), Overflow> {
        match self {
            Self::String(s) => out.push_str(s),
            Self::Undefined => out.push_str("undefined"),
            Self::Number(n) => out.push_str(&format_number(*n)),
            Self::Function(_) | Self::Native(_) => out.push_str("[Function]"),
            other => other.write_json(out),
        }
    }

    /// Short rendering for error messages.
    pub fn preview(&self) -> String {
        let mut out = BoundedText::new(PREVIEW_LENGTH);
        match self.write_log(&mut out) {
            Ok(()) => out.into_string(),
            Err(Overflow) => format!("{}...", out.into_string()),
        }
    }

    /// Message of a thrown value: `Error` objects render as `name: message`.
    pub fn to_error_message(&self) -> String {
        if let Self::Object(record) = self
            && let Some(Self::String(message)) = record.get("message")
        {
            let name = match record.get("name") {
                Some(Self::String(name)) => name.to_string(),
                _ => "Error".to_string(),
            };
            return format!("{name}: {message}");
        }
        match self {
            Self::String(s) => s.to_string(),
            other => other.preview(),
        }
    }

    /// Convert to JSON. Every node spends its approximate serialized size
    /// (at least [`JSON_NODE_COST`]) from `budget`, so a result that shares
    /// one subtree many times cannot expand without bound.
    pub fn to_json_within(&self, budget: &mut usize) -> Result<serde_json::Value, Overflow> {
        let cost = match self {
            Self::String(s) => s.len() + 2,
            Self::Array(list) => 2 + list.len(),
            Self::Object(record) => 2 + record.keys().map(|key| key.len() + 4).sum::<usize>(),
            _ => 0,
        };
        *budget = budget
            .checked_sub(cost.max(JSON_NODE_COST))
            .ok_or(Overflow)?;

        Ok(match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.to_string()),
            Self::Array(list) => serde_json::Value::Array(
                list.iter()
                    .map(|item| item.to_json_within(budget))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Object(record) => serde_json::Value::Object(
                record
                    .iter()
                    .filter(|(_, value)| !matches!(value, Self::Undefined))
                    .map(|(key, value)| Ok((key.clone(), value.to_json_within(budget)?)))
                    .collect::<Result<serde_json::Map<_, _>, Overflow>>()?,
            ),
            Self::Function(_) | Self::Native(_) => {
                serde_json::Value::String("[Function]".to_string())
            }
        })
    }

    /// `===`: no coercion, reference identity for arrays, objects and functions.
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => a == b,
            _ => false,
        }
    }

    /// `==`: `null == undefined`, and numbers compare with their string or
    /// boolean spelling.
    pub fn loose_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Self::Number(_), Self::String(_) | Self::Bool(_))
            | (Self::String(_) | Self::Bool(_), Self::Number(_))
            | (Self::Bool(_), Self::String(_))
            | (Self::String(_), Self::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }
}

fn write_json_string(s: &str, out: &mut BoundedText) -> Result<(), Overflow> {
    // Escaping only grows the text, so reject before allocating the copy.
    if s.len() + 2 > out.remaining() {
        return Err(Overflow);
    }
    let quoted = serde_json::to_string(s).map_err(|_| Overflow)?;
    out.push_str(&quoted)
}

fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => parse_numeric_string(trimmed).unwrap_or(f64::NAN),
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

// =============================================================================
// Scopes
// =============================================================================

pub type Env = Rc<RefCell<Scope>>;

#[derive(Debug)]
pub struct Binding {
    pub value: ScriptValue,
    pub mutable: bool,
}

/// Why an assignment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Undefined,
    Constant,
}

#[derive(Default)]
pub struct Scope {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Declare a name in this scope. Returns `false` if it already exists here.
    pub fn declare(&mut self, name: &str, value: ScriptValue, mutable: bool) -> bool {
        if self.vars.contains_key(name) {
            return false;
        }
        self.vars
            .insert(name.to_string(), Binding { value, mutable });
        true
    }

    /// Drop every binding, breaking reference cycles through closures.
    pub fn clear(&mut self) -> Vec<ScriptValue> {
        self.parent = None;
        self.vars.drain().map(|(_, binding)| binding.value).collect()
    }
}

/// Resolve a name through the scope chain.
pub fn lookup(env: &Env, name: &str) -> Option<ScriptValue> {
    let mut current = Rc::clone(env);
    loop {
        let parent = {
            let scope = current.borrow();
            if let Some(binding) = scope.vars.get(name) {
                return Some(binding.value.clone());
            }
            scope.parent.clone()
        };
        current = parent?;
    }
}

/// Rebind the nearest declaration of `name`.
pub fn assign(env: &Env, name: &str, value: ScriptValue) -> Result<(), AssignError> {
    let mut current = Rc::clone(env);
    loop {
        let parent = {
            let mut scope = current.borrow_mut();
            if let Some(binding) = scope.vars.get_mut(name) {
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                binding.value = value;
                return Ok(());
            }
            scope.parent.clone()
        };
        current = parent.ok_or(AssignError::Undefined)?;
    }
}

impl Drop for Scope {
    // Closure chains (a closure capturing a scope that holds the previous
    // closure) can be arbitrarily long; tear them down with a work list
    // instead of recursion.
    fn drop(&mut self) {
        let mut values: Vec<ScriptValue> = self.vars.drain().map(|(_, b)| b.value).collect();
        let mut scopes: Vec<Env> = self.parent.take().into_iter().collect();
        loop {
            if let Some(value) = values.pop() {
                match value {
                    ScriptValue::Function(closure) => {
                        if let Ok(closure) = Rc::try_unwrap(closure) {
                            scopes.push(closure.env);
                        }
                    }
                    ScriptValue::Array(list) => {
                        if let Ok(list) = Rc::try_unwrap(list) {
                            values.extend(list.items);
                        }
                    }
                    ScriptValue::Object(record) => {
                        if let Ok(record) = Rc::try_unwrap(record) {
                            values.extend(record.entries.into_values());
                        }
                    }
                    _ => {}
                }
            } else if let Some(env) = scopes.pop() {
                if let Ok(cell) = Rc::try_unwrap(env) {
                    let mut scope = cell.into_inner();
                    values.extend(scope.vars.drain().map(|(_, b)| b.value));
                    scopes.extend(scope.parent.take());
                }
            } else {
                break;
            }
        }
    }
}
