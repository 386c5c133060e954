//! Path-addressed views over nested JSON values.
//!
//! A [`Dome`] owns a `serde_json::Value` tree and hands out [`Reader`]s and
//! [`Writer`]s bound to paths such as `users[0].name`. Mutations made through
//! a writer are recorded in a replayable diff log and announced to change
//! listeners. A dome can take cheap, deferred snapshots and roll back to
//! them, and [`Dome::wrap`] gives a child dome over a sub-tree whose diffs and
//! events are relayed to its parent with the child's path prefixed.
//!
//! # Example
//!
//! ```
//! use json_dome::prelude::*;
//! use serde_json::json;
//!
//! let source = Dome::new(json!({"todos": []}));
//! let replica = Dome::new(json!({"todos": []}));
//!
//! let todos = source.write("todos").unwrap();
//! todos.push([json!({"title": "write docs", "done": false})]).unwrap();
//! source.write("todos[0].done").unwrap().set(json!(true)).unwrap();
//!
//! // Ship the diff across any JSON transport and replay it.
//! let wire = serde_json::to_string(&source.extract_diff()).unwrap();
//! let mut diff: Vec<DiffEntry> = serde_json::from_str(&wire).unwrap();
//! replica.apply_diff(&mut diff, false).unwrap();
//!
//! assert_eq!(replica.value(), source.value());
//! assert!(diff.is_empty());
//! ```

pub mod access;
mod children;
pub mod diff;
mod dome;
pub mod error;
pub mod event;
pub mod location;
pub mod op;
pub mod options;
pub mod path;
mod reader;
pub mod value;
mod writer;

pub use access::{ReadAccess, WriteAccess};
pub use diff::DiffEntry;
pub use dome::Dome;
pub use error::{DomeError, ErrorKind};
pub use event::{ChangeEvent, InvokeEvent, ListenerId, OpData};
pub use op::{Op, OpName};
pub use options::Options;
pub use path::{Chunk, IntoPath, Path, PathError};
pub use reader::Reader;
pub use value::ValueKind;
pub use writer::Writer;

/// Everything needed to work with a dome, including the accessor traits.
pub mod prelude {
    pub use crate::access::{ReadAccess, WriteAccess};
    pub use crate::diff::DiffEntry;
    pub use crate::dome::Dome;
    pub use crate::error::{DomeError, ErrorKind};
    pub use crate::event::{ChangeEvent, InvokeEvent};
    pub use crate::op::{Op, OpName};
    pub use crate::options::Options;
    pub use crate::path::{Chunk, Path};
    pub use crate::reader::Reader;
    pub use crate::writer::Writer;
}
