//! Host functions exposed to scripts: the dataset primitives, `Math`,
//! `console.log`, conversions and `Array.join`.

use std::str::FromStr;

use indexmap::IndexMap;
use rand::Rng;

use super::error::SandboxError;
use super::interpreter::Interpreter;
use super::value::{BoundedText, Builtin, Overflow, ScriptValue};
use crate::error::InsightError;
use crate::utils::parse_numeric_string;

/// Reductions supported by `aggregate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl AggregateOp {
    pub const ALL: [AggregateOp; 5] = [Self::Sum, Self::Mean, Self::Min, Self::Max, Self::Count];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }

    /// Apply to the collected values. No values yields 0.
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => values.len() as f64,
        }
    }
}

impl FromStr for AggregateOp {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| InsightError::UnsupportedOperation {
                operation: s.to_string(),
                expected: Self::ALL.map(|op| op.as_str()).join(", "),
            })
    }
}

/// Numeric reading of a cell for `aggregate`: numbers and numeric strings.
fn aggregate_value(value: &ScriptValue) -> Option<f64> {
    match value {
        ScriptValue::Number(n) if n.is_finite() => Some(*n),
        ScriptValue::String(s) => parse_numeric_string(s),
        _ => None,
    }
}

fn arg(args: &[ScriptValue], index: usize) -> ScriptValue {
    args.get(index).cloned().unwrap_or(ScriptValue::Undefined)
}

fn number_arg(args: &[ScriptValue], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, ScriptValue::to_number)
}

impl Interpreter<'_> {
    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<ScriptValue>,
        line: Option<usize>,
    ) -> Result<ScriptValue, SandboxError> {
        let first = number_arg(&args, 0);
        let math = move |f: fn(f64) -> f64| -> Result<ScriptValue, SandboxError> {
            Ok(ScriptValue::Number(f(first)))
        };
        match builtin {
            Builtin::Filter | Builtin::Map | Builtin::Reduce => {
                let (items, rest) = self.split_target(args);
                self.iterate(builtin, &items, &rest, line)
            }
            Builtin::GroupBy => {
                let (items, rest) = self.split_target(args);
                let column = self.column_arg(&rest, 0, &items, builtin)?;
                self.group_by(&items, &column)
            }
            Builtin::Aggregate => {
                let (items, rest) = self.split_target(args);
                let column = self.column_arg(&rest, 0, &items, builtin)?;
                let op = match rest.get(1) {
                    Some(ScriptValue::String(op)) => AggregateOp::from_str(op)
                        .map_err(|err| SandboxError::Input(err.to_string()))?,
                    _ => {
                        return Err(SandboxError::Input(
                            "aggregate expects an operation name".to_string(),
                        ));
                    }
                };
                self.aggregate(&items, &column, op)
            }
            Builtin::Log => self.log(&args),
            Builtin::Abs => math(f64::abs),
            Builtin::Floor => math(f64::floor),
            Builtin::Ceil => math(f64::ceil),
            Builtin::Round => math(|x| (x + 0.5).floor()),
            Builtin::Sqrt => math(f64::sqrt),
            Builtin::Ln => math(f64::ln),
            Builtin::Exp => math(f64::exp),
            Builtin::Pow => Ok(ScriptValue::Number(
                number_arg(&args, 0).powf(number_arg(&args, 1)),
            )),
            Builtin::Min | Builtin::Max => {
                self.charge(args.len() as u64)?;
                let numbers = args.iter().map(ScriptValue::to_number);
                Ok(ScriptValue::Number(if builtin == Builtin::Min {
                    numbers.fold(f64::INFINITY, |acc, x| {
                        if acc.is_nan() || x.is_nan() { f64::NAN } else { acc.min(x) }
                    })
                } else {
                    numbers.fold(f64::NEG_INFINITY, |acc, x| {
                        if acc.is_nan() || x.is_nan() { f64::NAN } else { acc.max(x) }
                    })
                }))
            }
            Builtin::Random => Ok(ScriptValue::Number(self.rng.gen_range(0.0..1.0))),
            Builtin::Error => {
                let message = match args.first() {
                    None | Some(ScriptValue::Undefined) => String::new(),
                    Some(value) => self.display(value)?,
                };
                let mut entries = IndexMap::new();
                entries.insert("name".to_string(), ScriptValue::from("Error"));
                entries.insert("message".to_string(), ScriptValue::string(message));
                ScriptValue::object(entries)
            }
            Builtin::ToNumber => Ok(ScriptValue::Number(
                args.first().map_or(0.0, ScriptValue::to_number),
            )),
            Builtin::ToString => match args.first() {
                Some(value) => Ok(ScriptValue::string(self.display(value)?)),
                None => Ok(ScriptValue::from("")),
            },
        }
    }

    /// `console.log`: one line per call, arguments joined by spaces. Lines
    /// count against the line cap, the string length limit and the total
    /// output budget.
    fn log(&mut self, args: &[ScriptValue]) -> Result<ScriptValue, SandboxError> {
        if self.logs.len() >= self.config.max_log_lines {
            return Err(SandboxError::ResourceExhausted(format!(
                "Log output limit of {} lines exceeded",
                self.config.max_log_lines
            )));
        }
        let remaining = self.config.max_output_bytes.saturating_sub(self.log_bytes);
        let mut line = BoundedText::new(remaining.min(self.config.max_string_length));
        let written = args.iter().enumerate().try_for_each(|(index, value)| {
            if index > 0 {
                line.push_str(" ")?;
            }
            value.write_log(&mut line)
        });
        if written.is_err() {
            return Err(SandboxError::ResourceExhausted(format!(
                "Log output limit exceeded: lines are capped at {} bytes and all output at {} bytes",
                self.config.max_string_length, self.config.max_output_bytes
            )));
        }

        let text = line.into_string();
        self.charge_bytes(text.len())?;
        self.log_bytes += text.len();
        self.logs.push(text);
        Ok(ScriptValue::Undefined)
    }

    /// Primitives operate on `data` unless an array is passed first.
    fn split_target(&self, mut args: Vec<ScriptValue>) -> (Target, Vec<ScriptValue>) {
        match args.first() {
            Some(ScriptValue::Array(list)) => {
                let target = Target {
                    items: list.to_vec(),
                    is_data: false,
                };
                args.remove(0);
                (target, args)
            }
            _ => {
                let items = match &self.data {
                    ScriptValue::Array(list) => list.to_vec(),
                    _ => Vec::new(),
                };
                (
                    Target {
                        items,
                        is_data: true,
                    },
                    args,
                )
            }
        }
    }

    fn column_arg(
        &self,
        args: &[ScriptValue],
        index: usize,
        target: &Target,
        builtin: Builtin,
    ) -> Result<String, SandboxError> {
        let Some(ScriptValue::String(column)) = args.get(index) else {
            return Err(SandboxError::Input(format!(
                "{} expects a column name",
                builtin.name()
            )));
        };
        if target.is_data && !self.columns.iter().any(|name| name.as_str() == &**column) {
            return Err(SandboxError::Input(format!("Unknown column '{column}'")));
        }
        Ok(column.to_string())
    }

    fn iterate(
        &mut self,
        builtin: Builtin,
        target: &Target,
        args: &[ScriptValue],
        line: Option<usize>,
    ) -> Result<ScriptValue, SandboxError> {
        let callback = arg(args, 0);
        if !callback.is_callable() {
            return Err(SandboxError::type_error(
                format!(
                    "{} expects a function, got {}",
                    builtin.name(),
                    callback.type_of()
                ),
                line,
            ));
        }

        let items = &target.items;
        match builtin {
            Builtin::Filter => {
                let mut kept = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    self.charge(1)?;
                    let keep = self.invoke(
                        &callback,
                        vec![item.clone(), (index as f64).into()],
                        line,
                    )?;
                    if keep.truthy() {
                        kept.push(item.clone());
                    }
                }
                ScriptValue::array(kept)
            }
            Builtin::Map => {
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    self.charge(1)?;
                    mapped.push(self.invoke(
                        &callback,
                        vec![item.clone(), (index as f64).into()],
                        line,
                    )?);
                }
                ScriptValue::array(mapped)
            }
            _ => {
                let (mut acc, start) = match args.get(1) {
                    Some(initial) => (initial.clone(), 0),
                    None => match items.first() {
                        Some(first) => (first.clone(), 1),
                        None => {
                            return Err(SandboxError::type_error(
                                "Reduce of empty array with no initial value",
                                line,
                            ));
                        }
                    },
                };
                for (index, item) in items.iter().enumerate().skip(start) {
                    self.charge(1)?;
                    acc = self.invoke(
                        &callback,
                        vec![acc, item.clone(), (index as f64).into()],
                        line,
                    )?;
                }
                Ok(acc)
            }
        }
    }

    fn group_by(&mut self, target: &Target, column: &str) -> Result<ScriptValue, SandboxError> {
        let mut groups: IndexMap<String, Vec<ScriptValue>> = IndexMap::new();
        for item in &target.items {
            self.charge(1)?;
            let key = match item {
                ScriptValue::Object(record) => match record.get(column) {
                    Some(value) => self.display(value)?,
                    None => "undefined".to_string(),
                },
                _ => "undefined".to_string(),
            };
            groups.entry(key).or_default().push(item.clone());
        }
        let mut entries = IndexMap::with_capacity(groups.len());
        for (key, rows) in groups {
            entries.insert(key, ScriptValue::array(rows)?);
        }
        ScriptValue::object(entries)
    }

    fn aggregate(
        &mut self,
        target: &Target,
        column: &str,
        op: AggregateOp,
    ) -> Result<ScriptValue, SandboxError> {
        self.charge(target.items.len() as u64)?;
        let values: Vec<f64> = target
            .items
            .iter()
            .filter_map(|item| match item {
                ScriptValue::Object(record) => record.get(column).and_then(aggregate_value),
                _ => None,
            })
            .collect();
        Ok(ScriptValue::Number(op.apply(&values)))
    }

    // -------------------------------------------------------------------------
    // Methods
    // -------------------------------------------------------------------------

    /// `receiver.property(args)`: the array primitives and `join`, or a
    /// function stored on an object (`Math.max`, `console.log`).
    pub(super) fn call_method(
        &mut self,
        receiver: ScriptValue,
        property: &str,
        mut args: Vec<ScriptValue>,
        line: Option<usize>,
    ) -> Result<ScriptValue, SandboxError> {
        if matches!(receiver, ScriptValue::Array(_)) {
            let builtin = match property {
                "filter" => Some(Builtin::Filter),
                "map" => Some(Builtin::Map),
                "reduce" => Some(Builtin::Reduce),
                _ => None,
            };
            if let Some(builtin) = builtin {
                args.insert(0, receiver);
                return self.call_builtin(builtin, args, line);
            }
        }

        match (&receiver, property) {
            (ScriptValue::Array(list), "join") => {
                self.charge(list.len() as u64)?;
                let separator = match args.first() {
                    None | Some(ScriptValue::Undefined) => ",".to_string(),
                    Some(value) => self.display(value)?,
                };
                let mut out = BoundedText::new(self.config.max_string_length);
                list.iter()
                    .enumerate()
                    .try_for_each(|(index, item)| {
                        if index > 0 {
                            out.push_str(&separator)?;
                        }
                        if item.is_nullish() {
                            Ok(())
                        } else {
                            item.write_display(&mut out)
                        }
                    })
                    .map_err(|Overflow| self.string_limit())?;
                self.finish_string(out)
            }
            _ => {
                let function = self.get_member(&receiver, property, line)?;
                self.call_value(&function, args, property, line)
            }
        }
    }
}

/// Items a primitive runs over.
struct Target {
    items: Vec<ScriptValue>,
    is_data: bool,
}
