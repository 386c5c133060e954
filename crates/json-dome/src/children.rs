//! Per-dome cache of accessors and wrapped children, keyed by normalized
//! path relative to the dome.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::dome::Dome;
use crate::path::Path;
use crate::reader::Reader;
use crate::writer::Writer;

#[derive(Default)]
pub(crate) struct Children {
    readers: RefCell<HashMap<Path, Reader>>,
    writers: RefCell<HashMap<Path, Writer>>,
    domes: RefCell<HashMap<Path, Dome>>,
}

impl Children {
    pub fn reader(&self, path: &Path, make: impl FnOnce() -> Reader) -> Reader {
        self.readers
            .borrow_mut()
            .entry(path.clone())
            .or_insert_with(make)
            .clone()
    }

    pub fn writer(&self, path: &Path, make: impl FnOnce() -> Writer) -> Writer {
        self.writers
            .borrow_mut()
            .entry(path.clone())
            .or_insert_with(make)
            .clone()
    }

    pub fn dome(&self, path: &Path) -> Option<Dome> {
        self.domes.borrow().get(path).cloned()
    }

    pub fn insert_dome(&self, path: Path, dome: Dome) {
        self.domes.borrow_mut().insert(path, dome);
    }

    pub fn remove_dome(&self, path: &Path) -> Option<Dome> {
        self.domes.borrow_mut().remove(path)
    }

    /// Empties the dome cache, handing back what it held.
    pub fn take_domes(&self) -> Vec<Dome> {
        self.domes.borrow_mut().drain().map(|(_, dome)| dome).collect()
    }

    pub fn clear(&self) {
        self.readers.borrow_mut().clear();
        self.writers.borrow_mut().clear();
        self.domes.borrow_mut().clear();
    }
}
