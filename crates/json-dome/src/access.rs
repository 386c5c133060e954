//! Read and write capabilities shared by [`Reader`], [`Writer`] and
//! [`Dome`](crate::Dome).
//!
//! An accessor is only plumbing: it names a dome and a path relative to
//! it, and every call re-resolves that path against the live tree.

use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use serde_json::{Number, Value};

use crate::dome::DomeState;
use crate::error::DomeError;
use crate::op::{Op, OpName};
use crate::path::{IntoPath, Path};
use crate::reader::Reader;
use crate::value::ValueKind;
use crate::writer::Writer;

pub(crate) mod sealed {
    use super::*;

    pub trait Bound {
        fn dome(&self) -> Weak<DomeState>;

        fn rel(&self) -> &Path;

        /// The owning dome, unless it was dropped or destroyed.
        fn live(&self) -> Option<Rc<DomeState>> {
            self.dome().upgrade().filter(|dome| !dome.is_destroyed())
        }
    }
}

use sealed::Bound;

fn live_or_destroyed<B: Bound + ?Sized>(bound: &B) -> Result<Rc<DomeState>, DomeError> {
    bound.live().ok_or(DomeError::Destroyed)
}

pub trait ReadAccess: Bound {
    /// Path relative to the owning dome.
    fn relative_path(&self) -> Path {
        self.rel().clone()
    }

    /// Path relative to the outermost dome of the wrap chain.
    fn absolute_path(&self) -> Path {
        match self.live() {
            Some(dome) => dome.origin().join(self.rel()),
            None => self.rel().clone(),
        }
    }

    /// Runs `f` on the current value without copying it.
    ///
    /// The tree is borrowed for the duration of `f`, which therefore must
    /// not write through any accessor of the same dome.
    fn with_value<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        match self.live() {
            Some(dome) => dome.with_value(self.rel(), f),
            None => f(None),
        }
    }

    fn exists(&self) -> bool {
        self.with_value(|value| value.is_some())
    }

    fn get(&self) -> Option<Value> {
        self.with_value(|value| value.cloned())
    }

    fn get_or(&self, fallback: Value) -> Value {
        self.get().unwrap_or(fallback)
    }

    /// A detached deep copy of the current value.
    fn copy(&self) -> Option<Value> {
        self.get()
    }

    fn len(&self) -> Result<usize, DomeError> {
        let dome = live_or_destroyed(self)?;
        dome.with_value(self.rel(), |value| match value {
            Some(Value::Array(items)) => Ok(items.len()),
            other => Err(DomeError::NotSequence(ValueKind::of(other))),
        })
    }

    /// A reader for `path` below this accessor. The same composed path on
    /// the same dome always yields the same reader.
    fn read(&self, path: impl IntoPath) -> Result<Reader, DomeError> {
        let rel = self.rel().append(path)?;
        Ok(match self.live() {
            Some(dome) => dome.reader(rel),
            None => Reader::new(self.dome(), rel),
        })
    }

    fn read_with(&self, path: impl IntoPath, f: impl FnOnce(&Reader)) -> Result<Reader, DomeError> {
        let reader = self.read(path)?;
        f(&reader);
        Ok(reader)
    }
}

fn one(result: Option<Value>) -> Value {
    result.unwrap_or(Value::Null)
}

/// `serde_json` turns non-finite floats into `null`.
fn number(op: OpName, delta: Value) -> Result<Number, DomeError> {
    match delta {
        Value::Number(n) => Ok(n),
        other => Err(DomeError::argument(
            op,
            format!("delta must be a finite number, found {}", ValueKind::of(Some(&other))),
        )),
    }
}

fn length(result: Option<Value>) -> usize {
    result
        .and_then(|value| value.as_u64())
        .and_then(|len| usize::try_from(len).ok())
        .unwrap_or_default()
}

pub trait WriteAccess: ReadAccess {
    /// A writer for `path` below this accessor, cached like [`ReadAccess::read`].
    fn write(&self, path: impl IntoPath) -> Result<Writer, DomeError> {
        let rel = self.rel().append(path)?;
        Ok(match self.live() {
            Some(dome) => dome.writer(rel),
            None => Writer::new(self.dome(), rel),
        })
    }

    fn write_with(&self, path: impl IntoPath, f: impl FnOnce(&Writer)) -> Result<Writer, DomeError> {
        let writer = self.write(path)?;
        f(&writer);
        Ok(writer)
    }

    /// Runs `op` here and returns its result.
    fn apply(&self, op: Op) -> Result<Option<Value>, DomeError> {
        let dome = live_or_destroyed(self)?;
        match op {
            Op::Invoke { name, data } => dome.invoke(self.rel(), name, data).map(|_| None),
            op => dome.mutate(self.rel(), op),
        }
    }

    fn set(&self, value: Value) -> Result<Value, DomeError> {
        self.apply(Op::Set(value)).map(one)
    }

    /// Removes the value, returning it; a no-op when absent.
    fn del(&self) -> Result<Option<Value>, DomeError> {
        self.apply(Op::Del)
    }

    /// Adds `delta`, which may be any integer or float. A non-finite float
    /// is rejected as an invalid argument.
    fn inc(&self, delta: impl Into<Value>) -> Result<Value, DomeError> {
        let delta = number(OpName::Inc, delta.into())?;
        self.apply(Op::Inc(delta)).map(one)
    }

    fn dec(&self, delta: impl Into<Value>) -> Result<Value, DomeError> {
        let delta = number(OpName::Dec, delta.into())?;
        self.apply(Op::Dec(delta)).map(one)
    }

    fn clear(&self) -> Result<Value, DomeError> {
        self.apply(Op::Clear).map(one)
    }

    fn append(&self, items: impl IntoIterator<Item = Value>) -> Result<Value, DomeError> {
        self.apply(Op::Append(items.into_iter().collect())).map(one)
    }

    fn fill(&self, filler: Value, start: Option<i64>, end: Option<i64>) -> Result<Value, DomeError> {
        self.apply(Op::Fill { filler, start, end }).map(one)
    }

    /// Returns the new length.
    fn push(&self, items: impl IntoIterator<Item = Value>) -> Result<usize, DomeError> {
        self.apply(Op::Push(items.into_iter().collect())).map(length)
    }

    fn pop(&self) -> Result<Option<Value>, DomeError> {
        self.apply(Op::Pop)
    }

    fn shift(&self) -> Result<Option<Value>, DomeError> {
        self.apply(Op::Shift)
    }

    /// Returns the new length.
    fn unshift(&self, items: impl IntoIterator<Item = Value>) -> Result<usize, DomeError> {
        self.apply(Op::Unshift(items.into_iter().collect())).map(length)
    }

    /// Returns the removed items.
    fn splice(
        &self,
        start: i64,
        delete_count: Option<i64>,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>, DomeError> {
        let op = Op::Splice {
            start,
            delete_count,
            items: items.into_iter().collect(),
        };
        self.apply(op).map(|removed| match removed {
            Some(Value::Array(removed)) => removed,
            _ => Vec::new(),
        })
    }

    fn reverse(&self) -> Result<Value, DomeError> {
        self.apply(Op::Reverse).map(one)
    }

    /// Sorts with the default value order; recorded as a `reposition`.
    fn sort(&self) -> Result<Value, DomeError> {
        self.apply(Op::Sort).map(one)
    }

    /// Sorts with `compare`; recorded as a `reposition`.
    fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<Value, DomeError> {
        let dome = live_or_destroyed(self)?;
        dome.sort_by(self.rel(), compare).map(one)
    }

    fn reposition(&self, moves: Vec<usize>) -> Result<Value, DomeError> {
        self.apply(Op::Reposition(moves)).map(one)
    }

    /// Raises an invoke event named `name` without touching the tree.
    fn invoke(&self, name: &str, data: Value) -> Result<(), DomeError> {
        self.apply(Op::Invoke {
            name: name.to_owned(),
            data,
        })
        .map(|_| ())
    }
}
