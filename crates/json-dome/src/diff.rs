//! Diff log entries.
//!
//! On the wire an entry is the ordered triple `[op, path, args]`, e.g.
//! `["inc", ["counters", 0], [5]]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomeError;
use crate::op::{Op, OpName};
use crate::path::{Chunk, Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "(OpName, Vec<Chunk>, Vec<Value>)",
    from = "(OpName, Vec<Chunk>, Vec<Value>)"
)]
pub struct DiffEntry {
    pub op: OpName,
    pub path: Vec<Chunk>,
    pub args: Vec<Value>,
}

impl DiffEntry {
    pub fn new(op: OpName, path: impl Into<Vec<Chunk>>, args: Vec<Value>) -> Self {
        Self {
            op,
            path: path.into(),
            args,
        }
    }

    pub(crate) fn from_op(op: &Op, path: &Path) -> Self {
        Self::new(op.name(), path.chunks(), op.to_args())
    }

    /// Decodes the recorded arguments back into an operation.
    pub fn to_op(&self) -> Result<Op, DomeError> {
        Op::from_entry(self.op, self.args.clone())
    }

    /// Same entry with `prefix` prepended to its path.
    pub(crate) fn prefixed(&self, prefix: &Path) -> Self {
        let mut path = prefix.chunks().to_vec();
        path.extend(self.path.iter().cloned());
        Self {
            op: self.op,
            path,
            args: self.args.clone(),
        }
    }
}

impl From<DiffEntry> for (OpName, Vec<Chunk>, Vec<Value>) {
    fn from(entry: DiffEntry) -> Self {
        (entry.op, entry.path, entry.args)
    }
}

impl From<(OpName, Vec<Chunk>, Vec<Value>)> for DiffEntry {
    fn from((op, path, args): (OpName, Vec<Chunk>, Vec<Value>)) -> Self {
        Self { op, path, args }
    }
}
