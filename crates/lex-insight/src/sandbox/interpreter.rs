//! Tree-walking evaluator.
//!
//! The interpreter owns every piece of state a script can observe: the
//! read-only `data` snapshot, the `columns` list, captured log lines and a
//! seeded random generator. Nothing else from the host is reachable.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::ast::*;
use super::error::SandboxError;
use super::value::{
    AssignError, BoundedText, Builtin, Closure, Env, Overflow, Scope, ScriptValue, assign, lookup,
};
use crate::config::SandboxConfig;
use crate::dataset::Dataset;

/// How often (in steps) the wall clock is consulted.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// String bytes a script may produce per evaluation step.
const BYTES_PER_STEP: u64 = 16;

enum Flow {
    Normal,
    Return(ScriptValue),
}

pub(crate) struct Interpreter<'a> {
    pub(super) config: &'a SandboxConfig,
    pub(super) data: ScriptValue,
    pub(super) columns: Vec<String>,
    pub(super) logs: Vec<String>,
    pub(super) log_bytes: usize,
    pub(super) rng: StdRng,
    steps: u64,
    started: Instant,
    call_depth: usize,
    captured: Vec<Weak<RefCell<Scope>>>,
    prune_at: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(config: &'a SandboxConfig, dataset: &Dataset, columns: &[String]) -> Self {
        Self {
            config,
            data: ScriptValue::from_rows(&dataset.rows),
            columns: columns.to_vec(),
            logs: Vec::new(),
            log_bytes: 0,
            rng: StdRng::seed_from_u64(config.random_seed),
            steps: 0,
            started: Instant::now(),
            call_depth: 0,
            captured: Vec::new(),
            prune_at: 64,
        }
    }

    pub(crate) fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn take_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.logs)
    }

    /// Run a program. The result is the value of a top-level `return`, else
    /// the value of the last top-level expression statement.
    pub(crate) fn run(
        &mut self,
        program: &Program,
    ) -> Result<Option<serde_json::Value>, SandboxError> {
        self.started = Instant::now();
        let globals = self.globals()?;
        let env = Scope::child(&globals);

        let mut last = ScriptValue::Undefined;
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::Expr(expr) => {
                    self.charge(1)?;
                    last = self.eval(expr, &env)?;
                }
                _ => {
                    if let Flow::Return(value) = self.exec(stmt, &env)? {
                        last = value;
                        break;
                    }
                }
            }
        }

        if matches!(last, ScriptValue::Undefined) {
            return Ok(None);
        }
        let mut budget = self.config.max_output_bytes;
        let result = last.to_json_within(&mut budget).map_err(|Overflow| {
            SandboxError::ResourceExhausted(format!(
                "Result exceeds the output limit of {} bytes",
                self.config.max_output_bytes
            ))
        })?;
        Ok(Some(result))
    }

    fn globals(&self) -> Result<Env, SandboxError> {
        let globals = Scope::root();
        let columns = ScriptValue::array(
            self.columns
                .iter()
                .map(|name| ScriptValue::string(name.as_str()))
                .collect(),
        )?;

        let mut math = native_object(&[
            ("abs", Builtin::Abs),
            ("floor", Builtin::Floor),
            ("ceil", Builtin::Ceil),
            ("round", Builtin::Round),
            ("sqrt", Builtin::Sqrt),
            ("pow", Builtin::Pow),
            ("min", Builtin::Min),
            ("max", Builtin::Max),
            ("log", Builtin::Ln),
            ("exp", Builtin::Exp),
            ("random", Builtin::Random),
        ]);
        math.insert("PI".to_string(), std::f64::consts::PI.into());
        math.insert("E".to_string(), std::f64::consts::E.into());

        let bindings = [
            ("data", self.data.clone()),
            ("columns", columns),
            ("Math", ScriptValue::object(math)?),
            (
                "console",
                ScriptValue::object(native_object(&[("log", Builtin::Log)]))?,
            ),
            ("filter", ScriptValue::Native(Builtin::Filter)),
            ("map", ScriptValue::Native(Builtin::Map)),
            ("reduce", ScriptValue::Native(Builtin::Reduce)),
            ("groupBy", ScriptValue::Native(Builtin::GroupBy)),
            ("aggregate", ScriptValue::Native(Builtin::Aggregate)),
            ("Error", ScriptValue::Native(Builtin::Error)),
            ("Number", ScriptValue::Native(Builtin::ToNumber)),
            ("String", ScriptValue::Native(Builtin::ToString)),
            ("NaN", f64::NAN.into()),
            ("Infinity", f64::INFINITY.into()),
        ];
        {
            let mut scope = globals.borrow_mut();
            for (name, value) in bindings {
                scope.declare(name, value, false);
            }
        }
        Ok(globals)
    }

    // -------------------------------------------------------------------------
    // Limits
    // -------------------------------------------------------------------------

    /// Account for `steps` units of work.
    pub(super) fn charge(&mut self, steps: u64) -> Result<(), SandboxError> {
        let before = self.steps;
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.config.max_steps {
            return Err(SandboxError::ResourceExhausted(format!(
                "Script timed out: exceeded {} evaluation steps",
                self.config.max_steps
            )));
        }
        if before / CLOCK_CHECK_INTERVAL != self.steps / CLOCK_CHECK_INTERVAL
            && self.started.elapsed() > Duration::from_millis(self.config.timeout_ms)
        {
            return Err(SandboxError::ResourceExhausted(format!(
                "Script timed out after {} ms",
                self.config.timeout_ms
            )));
        }
        Ok(())
    }

    /// Account for `bytes` of newly built text.
    pub(super) fn charge_bytes(&mut self, bytes: usize) -> Result<(), SandboxError> {
        self.charge(bytes as u64 / BYTES_PER_STEP)
    }

    pub(super) fn string_limit(&self) -> SandboxError {
        SandboxError::ResourceExhausted(format!(
            "String length limit of {} bytes exceeded",
            self.config.max_string_length
        ))
    }

    /// New script string from text written into `out`.
    pub(super) fn finish_string(&mut self, out: BoundedText) -> Result<ScriptValue, SandboxError> {
        let text = out.into_string();
        self.charge_bytes(text.len())?;
        Ok(ScriptValue::string(text))
    }

    /// Display string of `value`, within the string length limit.
    pub(super) fn display(&mut self, value: &ScriptValue) -> Result<String, SandboxError> {
        let text = value
            .display_within(self.config.max_string_length)
            .map_err(|Overflow| self.string_limit())?;
        self.charge_bytes(text.len())?;
        Ok(text)
    }

    fn capture(&mut self, env: &Env) {
        if self.captured.len() >= self.prune_at {
            self.captured.retain(|scope| scope.strong_count() > 0);
            self.prune_at = (self.captured.len() * 2).max(64);
        }
        self.captured.push(Rc::downgrade(env));
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, SandboxError> {
        self.charge(1)?;
        let line = Some(stmt.line);
        match &stmt.kind {
            StmtKind::Declare { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => ScriptValue::Undefined,
                    };
                    if !env.borrow_mut().declare(name, value, kind.is_mutable()) {
                        return Err(SandboxError::runtime(
                            format!("SyntaxError: Identifier '{name}' has already been declared"),
                            line,
                        ));
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Assign { target, op, value } => {
                let current = match op {
                    AssignOp::Assign => None,
                    _ => Some(
                        lookup(env, target)
                            .ok_or_else(|| SandboxError::reference_error(target, line))?,
                    ),
                };
                let value = self.eval(value, env)?;
                let value = match (op, current) {
                    (AssignOp::Add, Some(current)) => self.add(&current, &value)?,
                    (AssignOp::Sub, Some(current)) => {
                        ScriptValue::Number(current.to_number() - value.to_number())
                    }
                    _ => value,
                };
                assign(env, target, value).map_err(|err| match err {
                    AssignError::Undefined => SandboxError::reference_error(target, line),
                    AssignError::Constant => SandboxError::type_error(
                        format!("Assignment to constant variable '{target}'"),
                        line,
                    ),
                })?;
                Ok(Flow::Normal)
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::ForOf {
                kind,
                binding,
                iterable,
                body,
            } => {
                let items: Vec<ScriptValue> = match self.eval(iterable, env)? {
                    ScriptValue::Array(list) => list.to_vec(),
                    ScriptValue::String(s) => s
                        .chars()
                        .map(|c| ScriptValue::string(c.to_string()))
                        .collect(),
                    other => {
                        return Err(SandboxError::type_error(
                            format!("{} is not iterable", other.preview()),
                            line,
                        ));
                    }
                };
                for item in items {
                    self.charge(1)?;
                    let scope = Scope::child(env);
                    scope.borrow_mut().declare(binding, item, kind.is_mutable());
                    if let Flow::Return(value) = self.exec(body, &scope)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Block(body) => self.exec_block(body, &Scope::child(env)),
            StmtKind::Return(value) => Ok(Flow::Return(match value {
                Some(expr) => self.eval(expr, env)?,
                None => ScriptValue::Undefined,
            })),
            StmtKind::Throw(value) => {
                let value = self.eval(value, env)?;
                Err(SandboxError::Thrown(value.to_error_message()))
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            StmtKind::Empty => Ok(Flow::Normal),
        }
    }

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Result<Flow, SandboxError> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<ScriptValue, SandboxError> {
        self.charge(1)?;
        let line = Some(expr.line);
        match &expr.kind {
            ExprKind::Number(n) => Ok(ScriptValue::Number(*n)),
            ExprKind::Str(s) => Ok(ScriptValue::String(Rc::clone(s))),
            ExprKind::Bool(b) => Ok(ScriptValue::Bool(*b)),
            ExprKind::Null => Ok(ScriptValue::Null),
            ExprKind::Undefined => Ok(ScriptValue::Undefined),
            ExprKind::Ident(name) => {
                lookup(env, name).ok_or_else(|| SandboxError::reference_error(name, line))
            }
            ExprKind::Array(elements) => {
                let items = self.eval_all(elements, env)?;
                ScriptValue::array(items)
            }
            ExprKind::Object(properties) => self.eval_object(properties, env),
            ExprKind::Member { object, property } => {
                let object = self.eval(object, env)?;
                self.get_member(&object, property, line)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.get_index(&object, &index, line)
            }
            ExprKind::Call { callee, args } => {
                if let ExprKind::Member { object, property } = &callee.kind {
                    let receiver = self.eval(object, env)?;
                    let args = self.eval_all(args, env)?;
                    return self.call_method(receiver, property, args, line);
                }
                let function = self.eval(callee, env)?;
                let args = self.eval_all(args, env)?;
                self.call_value(&function, args, &describe_callee(callee), line)
            }
            ExprKind::Arrow(def) => {
                self.capture(env);
                Ok(ScriptValue::Function(Rc::new(Closure {
                    def: Rc::clone(def),
                    env: Rc::clone(env),
                })))
            }
            ExprKind::Unary { op, operand } => {
                if let (UnaryOp::Typeof, ExprKind::Ident(name)) = (op, &operand.kind) {
                    // typeof tolerates undeclared names
                    let value = lookup(env, name).unwrap_or(ScriptValue::Undefined);
                    return Ok(ScriptValue::string(value.type_of()));
                }
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => ScriptValue::Bool(!value.truthy()),
                    UnaryOp::Neg => ScriptValue::Number(-value.to_number()),
                    UnaryOp::Plus => ScriptValue::Number(value.to_number()),
                    UnaryOp::Typeof => ScriptValue::string(value.type_of()),
                })
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, &left, &right)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], env: &Env) -> Result<Vec<ScriptValue>, SandboxError> {
        exprs.iter().map(|expr| self.eval(expr, env)).collect()
    }

    fn eval_object(
        &mut self,
        properties: &[(String, Expr)],
        env: &Env,
    ) -> Result<ScriptValue, SandboxError> {
        let mut entries = IndexMap::with_capacity(properties.len());
        for (key, expr) in properties {
            let value = self.eval(expr, env)?;
            entries.insert(key.clone(), value);
        }
        ScriptValue::object(entries)
    }

    pub(super) fn get_member(
        &self,
        object: &ScriptValue,
        property: &str,
        line: Option<usize>,
    ) -> Result<ScriptValue, SandboxError> {
        Ok(match object {
            ScriptValue::Undefined | ScriptValue::Null => {
                return Err(SandboxError::type_error(
                    format!(
                        "Cannot read properties of {} (reading '{property}')",
                        object.preview()
                    ),
                    line,
                ));
            }
            ScriptValue::Object(record) => {
                record.get(property).cloned().unwrap_or(ScriptValue::Undefined)
            }
            ScriptValue::Array(list) if property == "length" => {
                ScriptValue::Number(list.len() as f64)
            }
            ScriptValue::String(s) if property == "length" => {
                ScriptValue::Number(s.chars().count() as f64)
            }
            _ => ScriptValue::Undefined,
        })
    }

    fn get_index(
        &mut self,
        object: &ScriptValue,
        index: &ScriptValue,
        line: Option<usize>,
    ) -> Result<ScriptValue, SandboxError> {
        let position = match index {
            ScriptValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            _ => None,
        };
        match (object, position) {
            (ScriptValue::Array(list), Some(position)) => {
                Ok(list.get(position).cloned().unwrap_or(ScriptValue::Undefined))
            }
            (ScriptValue::String(s), Some(position)) => Ok(s
                .chars()
                .nth(position)
                .map(|c| ScriptValue::string(c.to_string()))
                .unwrap_or(ScriptValue::Undefined)),
            _ => {
                let key = self.display(index)?;
                self.get_member(object, &key, line)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    pub(super) fn call_value(
        &mut self,
        function: &ScriptValue,
        args: Vec<ScriptValue>,
        name: &str,
        line: Option<usize>,
    ) -> Result<ScriptValue, SandboxError> {
        match function {
            ScriptValue::Function(closure) => self.call_closure(closure, args),
            ScriptValue::Native(builtin) => self.call_builtin(*builtin, args, line),
            _ => Err(SandboxError::type_error(
                format!("{name} is not a function"),
                line,
            )),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Closure,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, SandboxError> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(SandboxError::ResourceExhausted(format!(
                "Maximum call depth of {} exceeded",
                self.config.max_call_depth
            )));
        }

        let scope = Scope::child(&closure.env);
        {
            let mut frame = scope.borrow_mut();
            let mut args = args.into_iter();
            for param in &closure.def.params {
                frame.declare(param, args.next().unwrap_or(ScriptValue::Undefined), true);
            }
        }

        self.call_depth += 1;
        let result = match &closure.def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => self.exec_block(body, &scope).map(|flow| match flow {
                Flow::Return(value) => value,
                Flow::Normal => ScriptValue::Undefined,
            }),
        };
        self.call_depth -= 1;
        result
    }

    /// Call a user function or builtin with positional arguments.
    pub(super) fn invoke(
        &mut self,
        function: &ScriptValue,
        args: Vec<ScriptValue>,
        line: Option<usize>,
    ) -> Result<ScriptValue, SandboxError> {
        self.call_value(function, args, "callback", line)
    }

    // -------------------------------------------------------------------------
    // Operators
    // -------------------------------------------------------------------------

    pub(super) fn add(
        &mut self,
        left: &ScriptValue,
        right: &ScriptValue,
    ) -> Result<ScriptValue, SandboxError> {
        let concatenates = |value: &ScriptValue| {
            !matches!(
                value,
                ScriptValue::Undefined
                    | ScriptValue::Null
                    | ScriptValue::Bool(_)
                    | ScriptValue::Number(_)
            )
        };
        if concatenates(left) || concatenates(right) {
            let mut out = BoundedText::new(self.config.max_string_length);
            left.write_display(&mut out)
                .and_then(|()| right.write_display(&mut out))
                .map_err(|Overflow| self.string_limit())?;
            return self.finish_string(out);
        }
        Ok(ScriptValue::Number(left.to_number() + right.to_number()))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &ScriptValue,
        right: &ScriptValue,
    ) -> Result<ScriptValue, SandboxError> {
        let number = |f: fn(f64, f64) -> f64| {
            ScriptValue::Number(f(left.to_number(), right.to_number()))
        };
        Ok(match op {
            BinaryOp::Add => return self.add(left, right),
            BinaryOp::Sub => number(|a, b| a - b),
            BinaryOp::Mul => number(|a, b| a * b),
            BinaryOp::Div => number(|a, b| a / b),
            BinaryOp::Rem => number(|a, b| a % b),
            BinaryOp::StrictEq => ScriptValue::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => ScriptValue::Bool(!left.strict_equals(right)),
            BinaryOp::Eq => ScriptValue::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => ScriptValue::Bool(!left.loose_equals(right)),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let ordering = match (left, right) {
                    (ScriptValue::String(a), ScriptValue::String(b)) => Some(a.cmp(b)),
                    _ => left.to_number().partial_cmp(&right.to_number()),
                };
                ScriptValue::Bool(ordering.is_some_and(|ordering| match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
        })
    }
}

impl Drop for Interpreter<'_> {
    // Closures stored in the scope they capture form reference cycles.
    // Empty every captured scope so the whole graph is released.
    fn drop(&mut self) {
        let scopes: Vec<Env> = self
            .captured
            .drain(..)
            .filter_map(|scope| scope.upgrade())
            .collect();
        let released: Vec<Vec<ScriptValue>> =
            scopes.iter().map(|scope| scope.borrow_mut().clear()).collect();
        drop(released);
        drop(scopes);
    }
}

fn native_object(members: &[(&str, Builtin)]) -> IndexMap<String, ScriptValue> {
    members
        .iter()
        .map(|(name, builtin)| (name.to_string(), ScriptValue::Native(*builtin)))
        .collect()
}

fn describe_callee(callee: &Expr) -> String {
    match &callee.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Member { property, .. } => property.clone(),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::parser::parse;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dataset() -> Dataset {
        Dataset::from_json_str(
            r#"[
                {"name": "a", "price": 10, "qty": 1},
                {"name": "b", "price": 20, "qty": 2},
                {"name": "c", "price": 30, "qty": null}
            ]"#,
        )
        .unwrap()
    }

    fn eval_with(config: &SandboxConfig, source: &str) -> Result<Option<serde_json::Value>, SandboxError> {
        let dataset = dataset();
        let columns = dataset.columns.clone();
        let program = parse(source)?;
        let mut interpreter = Interpreter::new(config, &dataset, &columns);
        interpreter.run(&program)
    }

    fn eval(source: &str) -> Result<Option<serde_json::Value>, SandboxError> {
        eval_with(&SandboxConfig::default(), source)
    }

    #[test]
    fn test_last_expression_is_result() {
        assert_eq!(eval("1 + 2").unwrap(), Some(json!(3)));
        assert_eq!(eval("const x = 4; x * 2.5").unwrap(), Some(json!(10)));
        assert_eq!(eval("let x = 1").unwrap(), None);
    }

    #[test]
    fn test_return_stops_execution() {
        assert_eq!(eval("return 'early'; throw 'never'").unwrap(), Some(json!("early")));
    }

    #[test]
    fn test_operators() {
        assert_eq!(eval("'a' + 1 + 2").unwrap(), Some(json!("a12")));
        assert_eq!(eval("1 + 2 + 'a'").unwrap(), Some(json!("3a")));
        assert_eq!(eval("7 % 3 === 1 && 2 < 10 && 'b' > 'a'").unwrap(), Some(json!(true)));
        assert_eq!(eval("null ?? 'fallback'").unwrap(), Some(json!("fallback")));
        assert_eq!(eval("0 || 'x'").unwrap(), Some(json!("x")));
        assert_eq!(eval("typeof missing").unwrap(), Some(json!("undefined")));
        assert_eq!(eval("1 / 0 > 1e308").unwrap(), Some(json!(true)));
        assert_eq!(eval("'1' == 1 && '1' !== 1").unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_closures_and_loops() {
        let source = r#"
            let total = 0
            const add = (a, b) => a + b
            for (const row of data) {
                if (row.qty != null) total = add(total, row.price * row.qty)
            }
            return total
        "#;
        assert_eq!(eval(source).unwrap(), Some(json!(50)));
    }

    #[test]
    fn test_recursion_depth_limit() {
        let source = "const f = n => n <= 0 ? 0 : 1 + f(n - 1); f(1000)";
        let err = eval(source).unwrap_err();
        assert!(err.is_resource_exhausted(), "{err}");
        assert_eq!(eval("const f = n => n <= 0 ? 0 : 1 + f(n - 1); f(10)").unwrap(), Some(json!(10)));
    }

    #[test]
    fn test_step_budget() {
        let config = SandboxConfig::builder().max_steps(50).build().unwrap();
        let source = "let n = 0
            for (const r of data) { for (const c of columns) { for (const x of data) { n += 1 } } }";
        let err = eval_with(&config, source).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Script timed out: exceeded 50 evaluation steps"
        );
    }

    #[test]
    fn test_string_limit() {
        let config = SandboxConfig::builder().max_string_length(16).build().unwrap();
        let err = eval_with(&config, "let s = 'abcdefgh'; s += s; s += s").unwrap_err();
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn test_runtime_errors() {
        let err = eval("undefinedThing + 1").unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: undefinedThing is not defined (line 1)");

        let err = eval("const x = 1\nx = 2").unwrap_err();
        assert!(err.to_string().contains("constant"), "{err}");

        let err = eval("data[0].missing.deeper").unwrap_err();
        assert!(err.to_string().contains("reading 'deeper'"), "{err}");

        let err = eval("let a = 1; let a = 2").unwrap_err();
        assert!(err.to_string().contains("already been declared"));

        let err = eval("throw new Error('boom')").unwrap_err();
        assert_eq!(err, SandboxError::Thrown("Error: boom".to_string()));

        let err = eval("const x = 3; x()").unwrap_err();
        assert!(err.to_string().contains("x is not a function"));
    }

    #[test]
    fn test_data_is_shared_not_copied() {
        assert_eq!(eval("data[1].price").unwrap(), Some(json!(20)));
        assert_eq!(eval("data.length + columns.length").unwrap(), Some(json!(6)));
        assert_eq!(eval("data === data").unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_object_and_array_literals() {
        let source = "const arr = [0, [1, 2]]; ({ a: 1, b: 2, b: 3, arr })";
        assert_eq!(
            eval(source).unwrap(),
            Some(json!({"a": 1, "b": 3, "arr": [0, [1, 2]]}))
        );
    }
}
