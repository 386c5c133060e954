use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Serialize, Serializer};

use crate::access::sealed::Bound;
use crate::access::{ReadAccess, WriteAccess};
use crate::dome::DomeState;
use crate::path::Path;
use crate::reader::Binding;

/// Mutating accessor for one path of a dome.
///
/// Every operation records a diff entry and raises change notifications
/// according to the dome's [`Options`](crate::Options).
#[derive(Clone)]
pub struct Writer {
    inner: Rc<Binding>,
}

impl Writer {
    pub(crate) fn new(dome: Weak<DomeState>, path: Path) -> Self {
        Self {
            inner: Rc::new(Binding { dome, path }),
        }
    }

    pub fn ptr_eq(&self, other: &Writer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Bound for Writer {
    fn dome(&self) -> Weak<DomeState> {
        self.inner.dome.clone()
    }

    fn rel(&self) -> &Path {
        &self.inner.path
    }
}

impl ReadAccess for Writer {}

impl WriteAccess for Writer {}

impl Serialize for Writer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with_value(|value| value.serialize(serializer))
    }
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Writer").field(&self.inner.path).finish()
    }
}
