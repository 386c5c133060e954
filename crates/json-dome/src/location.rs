//! Resolution of a chunk sequence against a value tree.
//!
//! The tree hangs off a single root slot (`Option<Value>`, `None` when the
//! root is absent). Read-only resolution never touches the tree; mutable
//! resolution creates missing or non-traversable intermediate nodes on the
//! way down, choosing a sequence when the key about to be used is an index
//! and a map otherwise.

use serde_json::{Map, Value};

use crate::path::Chunk;

/// Result of a read-only walk.
#[derive(Debug, Clone, Copy)]
pub enum Location<'a> {
    /// The root slot itself.
    Root(Option<&'a Value>),
    /// A key inside an existing container.
    Member { parent: &'a Value, key: &'a Chunk },
    /// The walk crossed a node that cannot be traversed.
    Missing,
}

impl<'a> Location<'a> {
    /// True when the parent container exists, i.e. the slot is addressable.
    pub fn is_addressable(&self) -> bool {
        !matches!(self, Location::Missing)
    }

    /// True iff the parent currently owns the key.
    pub fn exists(&self) -> bool {
        self.value().is_some()
    }

    pub fn value(&self) -> Option<&'a Value> {
        match *self {
            Location::Root(value) => value,
            Location::Member { parent, key } => member(parent, key),
            Location::Missing => None,
        }
    }
}

/// Resolves `chunks` from `root` without modifying anything.
pub fn resolve<'a>(root: &'a Option<Value>, chunks: &'a [Chunk]) -> Location<'a> {
    let Some((last, init)) = chunks.split_last() else {
        return Location::Root(root.as_ref());
    };
    let Some(mut current) = root.as_ref() else {
        return Location::Missing;
    };
    for chunk in init {
        match member(current, chunk) {
            Some(next) => current = next,
            None => return Location::Missing,
        }
    }
    if is_container(current) {
        Location::Member {
            parent: current,
            key: last,
        }
    } else {
        Location::Missing
    }
}

/// Writes past the end of a sequence may pad it with at most this many nulls.
pub const MAX_INDEX_GAP: usize = 1 << 16;

/// Why a mutable walk cannot proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unwritable {
    /// A non-numeric key addressed an existing sequence.
    SequenceKey(Chunk),
    /// An index lies more than [`MAX_INDEX_GAP`] past the end of its sequence.
    IndexTooFar { index: usize, len: usize },
}

fn check_gap(index: usize, len: usize) -> Result<(), Unwritable> {
    if index > len.saturating_add(MAX_INDEX_GAP) {
        return Err(Unwritable::IndexTooFar { index, len });
    }
    Ok(())
}

/// Checks that a mutable walk along `chunks` can succeed without touching
/// the tree.
///
/// Existing sequences reject non-numeric keys, and every index is bounded
/// by [`MAX_INDEX_GAP`] past the length of the sequence it lands in (zero
/// for one that would be created).
pub fn check_writable(root: &Option<Value>, chunks: &[Chunk]) -> Result<(), Unwritable> {
    let mut current = root.as_ref();
    for chunk in chunks {
        current = match current {
            Some(Value::Array(items)) => {
                let idx = sequence_index(chunk).ok_or_else(|| Unwritable::SequenceKey(chunk.clone()))?;
                check_gap(idx, items.len())?;
                items.get(idx)
            }
            Some(Value::Object(map)) => map.get(&map_key(chunk)),
            _ => {
                if let Chunk::Index(idx) = chunk {
                    check_gap(*idx, 0)?;
                }
                None
            }
        };
    }
    Ok(())
}

/// A writable slot produced by [`locate_mut`].
#[derive(Debug)]
pub enum Place<'a> {
    Root(&'a mut Option<Value>),
    Member { parent: &'a mut Value, key: Chunk },
}

impl Place<'_> {
    pub fn get(&self) -> Option<&Value> {
        match self {
            Place::Root(slot) => slot.as_ref(),
            Place::Member { parent, key } => member(parent, key),
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut Value> {
        match self {
            Place::Root(slot) => slot.as_mut(),
            Place::Member { parent, key } => match parent {
                Value::Object(map) => map.get_mut(&map_key(key)),
                Value::Array(items) => sequence_index(key).and_then(|idx| items.get_mut(idx)),
                _ => None,
            },
        }
    }

    /// Stores `value`, padding a sequence with nulls when writing past its end.
    pub fn put(&mut self, value: Value) {
        match self {
            Place::Root(slot) => **slot = Some(value),
            Place::Member { parent, key } => match parent {
                Value::Object(map) => {
                    map.insert(map_key(key), value);
                }
                Value::Array(items) => {
                    if let Some(idx) = sequence_index(key) {
                        if idx >= items.len() {
                            items.resize(idx + 1, Value::Null);
                        }
                        items[idx] = value;
                    }
                }
                _ => {}
            },
        }
    }

    /// Removes the slot; sequence members are spliced out.
    pub fn take(&mut self) -> Option<Value> {
        match self {
            Place::Root(slot) => slot.take(),
            Place::Member { parent, key } => match parent {
                Value::Object(map) => map.shift_remove(&map_key(key)),
                Value::Array(items) => match sequence_index(key) {
                    Some(idx) if idx < items.len() => Some(items.remove(idx)),
                    _ => None,
                },
                _ => None,
            },
        }
    }
}

/// Resolves `chunks` from `root`, autovivifying missing containers.
///
/// Callers are expected to have run [`check_writable`] first so that a
/// failure here cannot leave a half-built path behind.
pub fn locate_mut<'a>(root: &'a mut Option<Value>, chunks: &[Chunk]) -> Result<Place<'a>, Unwritable> {
    check_writable(root, chunks)?;

    let Some((last, init)) = chunks.split_last() else {
        return Ok(Place::Root(root));
    };

    if !root.as_ref().is_some_and(is_container) {
        *root = Some(empty_for(&chunks[0]));
    }
    let Some(mut current) = root.as_mut() else {
        return Err(Unwritable::SequenceKey(chunks[0].clone()));
    };

    for (i, chunk) in init.iter().enumerate() {
        current = descend(current, chunk, &chunks[i + 1])?;
    }

    Ok(Place::Member {
        parent: current,
        key: last.clone(),
    })
}

fn descend<'a>(current: &'a mut Value, chunk: &Chunk, next: &Chunk) -> Result<&'a mut Value, Unwritable> {
    let slot = match current {
        Value::Object(map) => map.entry(map_key(chunk)).or_insert(Value::Null),
        Value::Array(items) => {
            let idx = sequence_index(chunk).ok_or_else(|| Unwritable::SequenceKey(chunk.clone()))?;
            check_gap(idx, items.len())?;
            if idx >= items.len() {
                items.resize(idx + 1, Value::Null);
            }
            &mut items[idx]
        }
        _ => return Err(Unwritable::SequenceKey(chunk.clone())),
    };
    if !is_container(slot) {
        *slot = empty_for(next);
    }
    Ok(slot)
}

fn member<'a>(parent: &'a Value, key: &Chunk) -> Option<&'a Value> {
    match parent {
        Value::Object(map) => map.get(&map_key(key)),
        Value::Array(items) => sequence_index(key).and_then(|idx| items.get(idx)),
        _ => None,
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn empty_for(key: &Chunk) -> Value {
    match key {
        Chunk::Index(_) => Value::Array(Vec::new()),
        Chunk::Key(_) => Value::Object(Map::new()),
    }
}

/// Map keys are strings; an index addresses the key of the same digits.
fn map_key(chunk: &Chunk) -> String {
    match chunk {
        Chunk::Key(key) => key.clone(),
        Chunk::Index(idx) => idx.to_string(),
    }
}

fn sequence_index(chunk: &Chunk) -> Option<usize> {
    match chunk {
        Chunk::Index(idx) => Some(*idx),
        Chunk::Key(key) => key.parse().ok(),
    }
}
