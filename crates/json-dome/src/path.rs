//! Path expressions addressing a location inside a value tree.
//!
//! A path is written as a sequence of segments: a bare or `.`-prefixed
//! property name (any run of characters other than `.` and `[`), or a
//! bracketed non-negative integer index:
//!
//! ```text
//! users[0].name      -> ["users", 0, "name"]
//! [2][0]             -> [2, 0]
//! ""                 -> []   (the value itself)
//! ```
//!
//! A [`Path`] carries both the normalized string and the chunk sequence.
//! Whichever form is missing is computed once, on first access, and kept.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::Peekable;
use std::rc::Rc;
use std::str::CharIndices;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Parsed strings kept per thread before the memo is reset.
const PARSE_MEMO_LIMIT: usize = 4096;

thread_local! {
    static PARSE_MEMO: RefCell<HashMap<String, Path>> = RefCell::new(HashMap::new());
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("unexpected character {found:?} at offset {offset} of path {path:?}")]
    UnexpectedChar {
        path: String,
        offset: usize,
        found: char,
    },
    #[error("unexpected non-digit {found:?} at offset {offset} of path {path:?}")]
    NonDigit {
        path: String,
        offset: usize,
        found: char,
    },
    #[error("unexpected end of path {path:?}")]
    UnexpectedEnd { path: String },
    #[error("index at offset {offset} of path {path:?} does not fit in usize")]
    IndexOverflow { path: String, offset: usize },
}

/// A single step of a path: a map key or a sequence index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Chunk {
    Index(usize),
    Key(String),
}

impl Chunk {
    pub fn is_index(&self) -> bool {
        matches!(self, Chunk::Index(_))
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Chunk::Key(key) => Some(key),
            Chunk::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Chunk::Index(idx) => Some(*idx),
            Chunk::Key(_) => None,
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunk::Key(key) => f.write_str(key),
            Chunk::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

impl From<&str> for Chunk {
    fn from(key: &str) -> Self {
        Chunk::Key(key.to_owned())
    }
}

impl From<String> for Chunk {
    fn from(key: String) -> Self {
        Chunk::Key(key)
    }
}

impl From<usize> for Chunk {
    fn from(idx: usize) -> Self {
        Chunk::Index(idx)
    }
}

struct PathRepr {
    text: OnceCell<String>,
    chunks: Vec<Chunk>,
}

/// An immutable, cheaply clonable path.
#[derive(Clone)]
pub struct Path {
    repr: Rc<PathRepr>,
}

impl Path {
    /// The empty path, addressing the value itself.
    pub fn root() -> Self {
        Self::from_parts(String::new(), Vec::new())
    }

    /// Parses a path expression. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::root());
        }
        if let Some(path) = PARSE_MEMO.with(|memo| memo.borrow().get(text).cloned()) {
            return Ok(path);
        }
        let chunks = parse_chunks(text)?;
        let path = Self::from_parts(render(&chunks), chunks);
        PARSE_MEMO.with(|memo| {
            let mut memo = memo.borrow_mut();
            if memo.len() >= PARSE_MEMO_LIMIT {
                memo.clear();
            }
            memo.insert(text.to_owned(), path.clone());
        });
        Ok(path)
    }

    /// Builds a path from chunks; the string form is rendered on demand.
    pub fn from_chunks(chunks: impl Into<Vec<Chunk>>) -> Self {
        Self {
            repr: Rc::new(PathRepr {
                text: OnceCell::new(),
                chunks: chunks.into(),
            }),
        }
    }

    fn from_parts(text: String, chunks: Vec<Chunk>) -> Self {
        Self {
            repr: Rc::new(PathRepr {
                text: OnceCell::from(text),
                chunks,
            }),
        }
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        self.repr.text.get_or_init(|| render(self.chunks()))
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.repr.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks().is_empty()
    }

    /// Appends another path, string or chunk sequence.
    ///
    /// Appending to an empty path yields the appended path unchanged and
    /// appending an empty path is a no-op. Otherwise an index segment is
    /// concatenated directly and a property segment is joined with `.`.
    pub fn append(&self, other: impl IntoPath) -> Result<Path, PathError> {
        let other = other.into_path()?;
        Ok(self.join(&other))
    }

    /// Infallible form of [`Path::append`] for an already parsed path.
    pub fn join(&self, other: &Path) -> Path {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let tail = other.as_str();
        let mut text = String::with_capacity(self.as_str().len() + tail.len() + 1);
        text.push_str(self.as_str());
        if !tail.starts_with('[') {
            text.push('.');
        }
        text.push_str(tail);
        let chunks = self.chunks().iter().chain(other.chunks()).cloned().collect();
        Self::from_parts(text, chunks)
    }

    /// Splits into the first `at` chunks and the remainder.
    pub fn split_at(&self, at: usize) -> (Path, Path) {
        let (head, tail) = self.chunks().split_at(at.min(self.len()));
        (Path::from_chunks(head), Path::from_chunks(tail))
    }

    /// Returns true when `self` is `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.chunks().starts_with(self.chunks())
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.repr, &other.repr) || self.chunks() == other.chunks()
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chunks().hash(state);
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.as_str())
    }
}

impl std::str::FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.chunks().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Chunk>::deserialize(deserializer).map(Path::from_chunks)
    }
}

/// Anything a path can be built from: strings, chunk sequences, paths.
pub trait IntoPath {
    fn into_path(self) -> Result<Path, PathError>;
}

impl IntoPath for Path {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(self)
    }
}

impl IntoPath for &Path {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(self.clone())
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Result<Path, PathError> {
        Path::parse(self)
    }
}

impl IntoPath for &String {
    fn into_path(self) -> Result<Path, PathError> {
        Path::parse(self)
    }
}

impl IntoPath for String {
    fn into_path(self) -> Result<Path, PathError> {
        Path::parse(&self)
    }
}

impl IntoPath for Vec<Chunk> {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(Path::from_chunks(self))
    }
}

impl IntoPath for &[Chunk] {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(Path::from_chunks(self))
    }
}

impl IntoPath for Chunk {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(Path::from_chunks(vec![self]))
    }
}

/// Renders chunks to the normalized string form.
pub fn render(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        match chunk {
            Chunk::Key(key) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(key);
            }
            Chunk::Index(idx) => {
                out.push('[');
                out.push_str(&idx.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Parses a non-empty, trimmed path string into chunks.
pub fn parse_chunks(text: &str) -> Result<Vec<Chunk>, PathError> {
    let mut chunks = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut first = true;

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            '[' => {
                chars.next();
                chunks.push(Chunk::Index(parse_index(text, &mut chars)?));
            }
            '.' => {
                chars.next();
                chunks.push(Chunk::Key(parse_name(text, &mut chars)?));
            }
            _ if first => chunks.push(Chunk::Key(parse_name(text, &mut chars)?)),
            found => {
                return Err(PathError::UnexpectedChar {
                    path: text.to_owned(),
                    offset,
                    found,
                })
            }
        }
        first = false;
    }

    Ok(chunks)
}

fn parse_name(text: &str, chars: &mut Peekable<CharIndices<'_>>) -> Result<String, PathError> {
    let mut name = String::new();
    while let Some(&(_, ch)) = chars.peek() {
        if ch == '.' || ch == '[' {
            break;
        }
        name.push(ch);
        chars.next();
    }
    if name.is_empty() {
        return Err(match chars.peek() {
            Some(&(offset, found)) => PathError::UnexpectedChar {
                path: text.to_owned(),
                offset,
                found,
            },
            None => PathError::UnexpectedEnd {
                path: text.to_owned(),
            },
        });
    }
    Ok(name)
}

fn parse_index(text: &str, chars: &mut Peekable<CharIndices<'_>>) -> Result<usize, PathError> {
    let mut index: usize = 0;
    let mut digits = 0usize;
    loop {
        let Some((offset, ch)) = chars.next() else {
            return Err(PathError::UnexpectedEnd {
                path: text.to_owned(),
            });
        };
        match ch {
            ']' if digits > 0 => return Ok(index),
            '0'..='9' => {
                let digit = ch as usize - '0' as usize;
                index = index
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(digit))
                    .ok_or_else(|| PathError::IndexOverflow {
                        path: text.to_owned(),
                        offset,
                    })?;
                digits += 1;
            }
            found => {
                return Err(PathError::NonDigit {
                    path: text.to_owned(),
                    offset,
                    found,
                })
            }
        }
    }
}
