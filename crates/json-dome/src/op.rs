//! The operation set.
//!
//! Every mutation is an [`Op`]. An op is first checked against a read-only
//! view of its target ([`precheck`]), which either rejects it, short-circuits
//! it as a no-op, or lets it through to [`execute`] against a writable
//! [`Place`]. Execution reports the op that should be recorded, which is not
//! always the op that ran: `sort` records a `reposition`, and `fill`/`splice`
//! record their normalized arguments.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::DomeError;
use crate::location::Place;
use crate::value::{add_numbers, compare_values, concat_text, same_value, sub_numbers, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpName {
    Set,
    Del,
    Inc,
    Dec,
    Clear,
    Append,
    Fill,
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Reverse,
    Sort,
    Reposition,
    Invoke,
    /// Only ever seen in change notifications.
    Rollback,
}

impl OpName {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpName::Set => "set",
            OpName::Del => "del",
            OpName::Inc => "inc",
            OpName::Dec => "dec",
            OpName::Clear => "clear",
            OpName::Append => "append",
            OpName::Fill => "fill",
            OpName::Push => "push",
            OpName::Pop => "pop",
            OpName::Shift => "shift",
            OpName::Unshift => "unshift",
            OpName::Splice => "splice",
            OpName::Reverse => "reverse",
            OpName::Sort => "sort",
            OpName::Reposition => "reposition",
            OpName::Invoke => "invoke",
            OpName::Rollback => "rollback",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "set" => OpName::Set,
            "del" => OpName::Del,
            "inc" => OpName::Inc,
            "dec" => OpName::Dec,
            "clear" => OpName::Clear,
            "append" => OpName::Append,
            "fill" => OpName::Fill,
            "push" => OpName::Push,
            "pop" => OpName::Pop,
            "shift" => OpName::Shift,
            "unshift" => OpName::Unshift,
            "splice" => OpName::Splice,
            "reverse" => OpName::Reverse,
            "sort" => OpName::Sort,
            "reposition" => OpName::Reposition,
            "invoke" => OpName::Invoke,
            "rollback" => OpName::Rollback,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed operation together with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Set(Value),
    Del,
    Inc(Number),
    Dec(Number),
    Clear,
    Append(Vec<Value>),
    Fill {
        filler: Value,
        start: Option<i64>,
        end: Option<i64>,
    },
    Push(Vec<Value>),
    Pop,
    Shift,
    Unshift(Vec<Value>),
    Splice {
        start: i64,
        delete_count: Option<i64>,
        items: Vec<Value>,
    },
    Reverse,
    Sort,
    /// `next[i] = prev[moves[i]]`.
    Reposition(Vec<usize>),
    Invoke {
        name: String,
        data: Value,
    },
}

impl Op {
    pub fn name(&self) -> OpName {
        match self {
            Op::Set(_) => OpName::Set,
            Op::Del => OpName::Del,
            Op::Inc(_) => OpName::Inc,
            Op::Dec(_) => OpName::Dec,
            Op::Clear => OpName::Clear,
            Op::Append(_) => OpName::Append,
            Op::Fill { .. } => OpName::Fill,
            Op::Push(_) => OpName::Push,
            Op::Pop => OpName::Pop,
            Op::Shift => OpName::Shift,
            Op::Unshift(_) => OpName::Unshift,
            Op::Splice { .. } => OpName::Splice,
            Op::Reverse => OpName::Reverse,
            Op::Sort => OpName::Sort,
            Op::Reposition(_) => OpName::Reposition,
            Op::Invoke { .. } => OpName::Invoke,
        }
    }

    /// The wire argument list of this op.
    pub fn to_args(&self) -> Vec<Value> {
        match self {
            Op::Set(value) => vec![value.clone()],
            Op::Inc(delta) | Op::Dec(delta) => vec![Value::Number(delta.clone())],
            Op::Append(items) | Op::Push(items) | Op::Unshift(items) => items.clone(),
            Op::Fill { filler, start, end } => {
                let mut args = vec![filler.clone()];
                if start.is_some() || end.is_some() {
                    args.push(start.map_or(Value::Null, Value::from));
                }
                if let Some(end) = end {
                    args.push(Value::from(*end));
                }
                args
            }
            Op::Splice {
                start,
                delete_count,
                items,
            } => {
                let mut args = vec![Value::from(*start)];
                if delete_count.is_some() || !items.is_empty() {
                    args.push(delete_count.map_or(Value::Null, Value::from));
                }
                args.extend(items.iter().cloned());
                args
            }
            Op::Reposition(moves) => vec![Value::Array(moves.iter().map(|m| Value::from(*m)).collect())],
            Op::Invoke { name, data } => vec![Value::String(name.clone()), data.clone()],
            Op::Del | Op::Clear | Op::Pop | Op::Shift | Op::Reverse | Op::Sort => Vec::new(),
        }
    }

    /// Decodes a recorded `(name, args)` pair back into an op.
    pub fn from_entry(name: OpName, args: Vec<Value>) -> Result<Op, DomeError> {
        let mut args = args.into_iter();
        let op = match name {
            OpName::Set => Op::Set(
                args.next()
                    .ok_or_else(|| DomeError::InvalidDiff("set requires a value".into()))?,
            ),
            OpName::Del => Op::Del,
            OpName::Inc => Op::Inc(delta_arg(name, args.next())?),
            OpName::Dec => Op::Dec(delta_arg(name, args.next())?),
            OpName::Clear => Op::Clear,
            OpName::Append => Op::Append(args.collect()),
            OpName::Fill => Op::Fill {
                filler: args.next().unwrap_or(Value::Null),
                start: int_arg(name, args.next())?,
                end: int_arg(name, args.next())?,
            },
            OpName::Push => Op::Push(args.collect()),
            OpName::Pop => Op::Pop,
            OpName::Shift => Op::Shift,
            OpName::Unshift => Op::Unshift(args.collect()),
            OpName::Splice => Op::Splice {
                start: int_arg(name, args.next())?.unwrap_or(0),
                delete_count: int_arg(name, args.next())?,
                items: args.collect(),
            },
            OpName::Reverse => Op::Reverse,
            OpName::Sort => Op::Sort,
            OpName::Reposition => Op::Reposition(moves_arg(args.next())?),
            OpName::Invoke => match args.next() {
                Some(Value::String(event)) => Op::Invoke {
                    name: event,
                    data: args.next().unwrap_or(Value::Null),
                },
                _ => return Err(DomeError::InvalidDiff("invoke requires an event name".into())),
            },
            OpName::Rollback => {
                return Err(DomeError::InvalidDiff("rollback cannot be replayed".into()))
            }
        };
        Ok(op)
    }
}

fn delta_arg(op: OpName, arg: Option<Value>) -> Result<Number, DomeError> {
    match arg {
        None | Some(Value::Null) => Ok(Number::from(1)),
        Some(Value::Number(n)) => Ok(n),
        Some(other) => Err(DomeError::argument(
            op,
            format!("delta must be a number, found {}", ValueKind::of(Some(&other))),
        )),
    }
}

fn int_arg(op: OpName, arg: Option<Value>) -> Result<Option<i64>, DomeError> {
    match arg {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| DomeError::argument(op, format!("{n} is not an integer"))),
        Some(other) => Err(DomeError::argument(
            op,
            format!("expected an integer, found {}", ValueKind::of(Some(&other))),
        )),
    }
}

fn moves_arg(arg: Option<Value>) -> Result<Vec<usize>, DomeError> {
    let Some(Value::Array(items)) = arg else {
        return Err(DomeError::argument(OpName::Reposition, "moves must be a sequence"));
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|m| usize::try_from(m).ok())
                .ok_or_else(|| DomeError::argument(OpName::Reposition, format!("{item} is not an index")))
        })
        .collect()
}

/// Outcome of checking an op against the current value.
#[derive(Debug, PartialEq)]
pub(crate) enum Precheck {
    Proceed,
    /// Nothing to do; the op returns this result without side effects.
    Skip(Option<Value>),
}

/// Validates `op` against `current` without touching anything.
pub(crate) fn precheck(op: &Op, current: Option<&Value>) -> Result<Precheck, DomeError> {
    let kind = ValueKind::of(current);
    let name = op.name();
    match op {
        Op::Set(value) => match current {
            Some(existing) if same_value(existing, value) => Ok(Precheck::Skip(Some(value.clone()))),
            _ => Ok(Precheck::Proceed),
        },
        Op::Del => match current {
            None => Ok(Precheck::Skip(None)),
            Some(_) => Ok(Precheck::Proceed),
        },
        Op::Inc(delta) | Op::Dec(delta) => {
            let Some(Value::Number(n)) = current else {
                return Err(DomeError::mismatch(name, kind));
            };
            let next = match op {
                Op::Inc(_) => add_numbers(n, delta),
                _ => sub_numbers(n, delta),
            };
            match next {
                Some(_) => Ok(Precheck::Proceed),
                None => Err(DomeError::argument(name, "result is not a finite number")),
            }
        }
        Op::Clear => match current {
            Some(Value::Array(items)) if items.is_empty() => Ok(Precheck::Skip(current.cloned())),
            Some(Value::Object(map)) if map.is_empty() => Ok(Precheck::Skip(current.cloned())),
            Some(Value::Array(_)) | Some(Value::Object(_)) => Ok(Precheck::Proceed),
            _ => Err(DomeError::mismatch(name, kind)),
        },
        Op::Append(items) => match current {
            Some(Value::Array(_)) => Ok(Precheck::Proceed),
            Some(Value::String(_)) => {
                if let Some(bad) = items.iter().find(|item| concat_text(item).is_none()) {
                    return Err(DomeError::argument(
                        name,
                        format!("cannot concatenate a {} onto a string", ValueKind::of(Some(bad))),
                    ));
                }
                Ok(Precheck::Proceed)
            }
            _ => Err(DomeError::mismatch(name, kind)),
        },
        Op::Reposition(moves) => {
            let Some(Value::Array(items)) = current else {
                return Err(DomeError::mismatch(name, kind));
            };
            if !is_permutation(moves, items.len()) {
                return Err(DomeError::argument(
                    name,
                    format!("moves must be a permutation of 0..{}", items.len()),
                ));
            }
            Ok(Precheck::Proceed)
        }
        Op::Fill { .. }
        | Op::Push(_)
        | Op::Pop
        | Op::Shift
        | Op::Unshift(_)
        | Op::Splice { .. }
        | Op::Reverse
        | Op::Sort => match current {
            Some(Value::Array(_)) => Ok(Precheck::Proceed),
            _ => Err(DomeError::mismatch(name, kind)),
        },
        Op::Invoke { .. } => Ok(Precheck::Proceed),
    }
}

fn is_permutation(moves: &[usize], len: usize) -> bool {
    if moves.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    moves.iter().all(|&m| m < len && !std::mem::replace(&mut seen[m], true))
}

/// What an executed op returned and what it should be recorded as.
#[derive(Debug)]
pub(crate) struct Effect {
    pub result: Option<Value>,
    pub recorded: Op,
}

/// Stable sort order of `items`: `order[new] = old`.
pub(crate) fn sort_order(
    items: &[Value],
    mut compare: impl FnMut(&Value, &Value) -> Ordering,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| compare(&items[a], &items[b]));
    order
}

/// Runs a prechecked op against its place.
pub(crate) fn execute(op: Op, place: &mut Place<'_>) -> Result<Effect, DomeError> {
    let name = op.name();
    let kind = ValueKind::of(place.get());

    let op = match op {
        Op::Set(value) => {
            place.put(value.clone());
            return Ok(Effect {
                result: Some(value.clone()),
                recorded: Op::Set(value),
            });
        }
        Op::Del => {
            return Ok(Effect {
                result: place.take(),
                recorded: Op::Del,
            })
        }
        invoke @ Op::Invoke { .. } => {
            return Ok(Effect {
                result: None,
                recorded: invoke,
            })
        }
        other => other,
    };

    let target = place.get_mut().ok_or_else(|| DomeError::mismatch(name, kind))?;

    let (result, recorded) = match (op, target) {
        (Op::Inc(delta), Value::Number(n)) => {
            let next = add_numbers(n, &delta).ok_or_else(|| DomeError::argument(name, "result is not a finite number"))?;
            *n = next.clone();
            (Some(Value::Number(next)), Op::Inc(delta))
        }
        (Op::Dec(delta), Value::Number(n)) => {
            let next = sub_numbers(n, &delta).ok_or_else(|| DomeError::argument(name, "result is not a finite number"))?;
            *n = next.clone();
            (Some(Value::Number(next)), Op::Dec(delta))
        }
        (Op::Clear, Value::Array(items)) => {
            items.clear();
            (Some(Value::Array(Vec::new())), Op::Clear)
        }
        (Op::Clear, Value::Object(map)) => {
            map.clear();
            (Some(Value::Object(map.clone())), Op::Clear)
        }
        (Op::Append(args), Value::String(text)) => {
            for arg in &args {
                text.push_str(&concat_text(arg).unwrap_or_default());
            }
            (Some(Value::String(text.clone())), Op::Append(args))
        }
        (Op::Append(args), Value::Array(items)) => {
            for arg in &args {
                match arg {
                    Value::Array(inner) => items.extend(inner.iter().cloned()),
                    other => items.push(other.clone()),
                }
            }
            (Some(Value::Array(items.clone())), Op::Append(args))
        }
        (Op::Fill { filler, start, end }, Value::Array(items)) => {
            let len = items.len() as i64;
            let start = match start {
                None => 0,
                Some(s) if s < 0 => (s + len).max(0),
                Some(s) => s,
            };
            let end = match end {
                None => len,
                Some(e) if e < 0 => (e + len).min(len),
                Some(e) => e.min(len),
            };
            for i in start..end {
                items[i as usize] = filler.clone();
            }
            let recorded = Op::Fill {
                filler,
                start: Some(start),
                end: Some(end),
            };
            (Some(Value::Array(items.clone())), recorded)
        }
        (Op::Push(args), Value::Array(items)) => {
            items.extend(args.iter().cloned());
            (Some(Value::from(items.len())), Op::Push(args))
        }
        (Op::Pop, Value::Array(items)) => (items.pop(), Op::Pop),
        (Op::Shift, Value::Array(items)) => {
            let first = if items.is_empty() { None } else { Some(items.remove(0)) };
            (first, Op::Shift)
        }
        (Op::Unshift(args), Value::Array(items)) => {
            items.splice(0..0, args.iter().cloned());
            (Some(Value::from(items.len())), Op::Unshift(args))
        }
        (
            Op::Splice {
                start,
                delete_count,
                items: inserted,
            },
            Value::Array(items),
        ) => {
            let len = items.len() as i64;
            let start = if start < 0 { (start + len).max(0) } else { start.min(len) };
            let delete_count = match delete_count {
                None => len - start,
                Some(d) => d.clamp(0, len - start),
            };
            let from = start as usize;
            let to = (start + delete_count) as usize;
            let removed: Vec<Value> = items.splice(from..to, inserted.iter().cloned()).collect();
            let recorded = Op::Splice {
                start,
                delete_count: Some(delete_count),
                items: inserted,
            };
            (Some(Value::Array(removed)), recorded)
        }
        (Op::Reverse, Value::Array(items)) => {
            items.reverse();
            (Some(Value::Array(items.clone())), Op::Reverse)
        }
        (Op::Sort, Value::Array(items)) => {
            let order = sort_order(items, compare_values);
            gather(items, &order);
            (Some(Value::Array(items.clone())), Op::Reposition(order))
        }
        (Op::Reposition(moves), Value::Array(items)) => {
            gather(items, &moves);
            (Some(Value::Array(items.clone())), Op::Reposition(moves))
        }
        (op, target) => {
            return Err(DomeError::mismatch(op.name(), ValueKind::of(Some(target))));
        }
    };

    Ok(Effect { result, recorded })
}

/// Rearranges `items` so that `items[i]` becomes the old `items[order[i]]`.
fn gather(items: &mut Vec<Value>, order: &[usize]) {
    let mut old: Vec<Option<Value>> = std::mem::take(items).into_iter().map(Some).collect();
    *items = order
        .iter()
        .map(|&i| old.get_mut(i).and_then(Option::take).unwrap_or(Value::Null))
        .collect();
}
