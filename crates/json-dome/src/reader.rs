use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Serialize, Serializer};

use crate::access::sealed::Bound;
use crate::access::ReadAccess;
use crate::dome::DomeState;
use crate::path::Path;

/// What a reader or writer is bound to.
pub(crate) struct Binding {
    pub dome: Weak<DomeState>,
    pub path: Path,
}

/// Read-only accessor for one path of a dome.
///
/// Readers are handed out by [`ReadAccess::read`] and cached per dome, so
/// reading the same path twice gives the same reader (see
/// [`Reader::ptr_eq`]).
#[derive(Clone)]
pub struct Reader {
    inner: Rc<Binding>,
}

impl Reader {
    pub(crate) fn new(dome: Weak<DomeState>, path: Path) -> Self {
        Self {
            inner: Rc::new(Binding { dome, path }),
        }
    }

    pub fn ptr_eq(&self, other: &Reader) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Bound for Reader {
    fn dome(&self) -> Weak<DomeState> {
        self.inner.dome.clone()
    }

    fn rel(&self) -> &Path {
        &self.inner.path
    }
}

impl ReadAccess for Reader {}

impl Serialize for Reader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with_value(|value| value.serialize(serializer))
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reader").field(&self.inner.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use serde_json::json;

    #[test]
    fn reads_follow_the_live_tree() {
        let dome = Dome::new(json!({"a": {"b": 1}}));
        let reader = dome.read("a.b").unwrap();
        assert_eq!(reader.get(), Some(json!(1)));
        dome.write("a.b").unwrap().set(json!(2)).unwrap();
        assert_eq!(reader.get(), Some(json!(2)));
        dome.write("a").unwrap().del().unwrap();
        assert!(!reader.exists());
        assert_eq!(reader.get_or(json!("none")), json!("none"));
    }

    #[test]
    fn readers_are_cached_by_normalized_path() {
        let dome = Dome::new(json!({"a": [{"b": 1}]}));
        let direct = dome.read("a[0].b").unwrap();
        let nested = dome.read("a").unwrap().read("[0]").unwrap().read(".b").unwrap();
        assert!(direct.ptr_eq(&nested));
        assert_eq!(nested.relative_path().as_str(), "a[0].b");
    }

    #[test]
    fn length_requires_a_sequence() {
        let dome = Dome::new(json!({"list": [1, 2, 3], "n": 1}));
        assert_eq!(dome.read("list").unwrap().len().unwrap(), 3);
        let err = dome.read("n").unwrap().len().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn serializes_as_current_value() {
        let dome = Dome::new(json!({"a": [1, 2]}));
        let reader = dome.read("a").unwrap();
        assert_eq!(serde_json::to_value(&reader).unwrap(), json!([1, 2]));
        let missing = dome.read("zz").unwrap();
        assert_eq!(serde_json::to_string(&missing).unwrap(), "null");
    }
}
