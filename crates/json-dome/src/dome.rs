use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, trace};

use crate::access::sealed::Bound;
use crate::access::{ReadAccess, WriteAccess};
use crate::children::Children;
use crate::diff::DiffEntry;
use crate::error::DomeError;
use crate::event::{ChangeEvent, InvokeEvent, ListenerId, Listeners, OpData};
use crate::location::{check_writable, locate_mut, resolve};
use crate::op::{execute, precheck, sort_order, Op, OpName, Precheck};
use crate::options::Options;
use crate::path::{IntoPath, Path};
use crate::reader::Reader;
use crate::value::ValueKind;
use crate::writer::Writer;

/// Deferred snapshot bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotState {
    Idle,
    /// Snapshots requested since the last mutation, not yet copied.
    Pending(usize),
}

#[derive(Debug, Clone)]
struct Snapshot {
    value: Option<Value>,
    diff: Vec<DiffEntry>,
}

struct ParentLink {
    dome: Weak<DomeState>,
    /// Where the child sits, relative to the parent.
    path: Path,
}

/// Shared state behind a [`Dome`] handle.
pub struct DomeState {
    tree: Rc<RefCell<Option<Value>>>,
    /// Position of this dome's value inside `tree`.
    origin: Path,
    here: Path,
    parent: Option<ParentLink>,
    options: Options,
    diff: RefCell<Vec<DiffEntry>>,
    snapshots: RefCell<Vec<Rc<Snapshot>>>,
    pending: Cell<SnapshotState>,
    listeners: Listeners,
    children: Children,
    muted: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Restores the previous mute flag when dropped.
struct MuteGuard<'a> {
    flag: &'a Cell<bool>,
    prev: bool,
}

impl<'a> MuteGuard<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        let prev = flag.replace(true);
        Self { flag, prev }
    }
}

impl Drop for MuteGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.prev);
    }
}

impl DomeState {
    fn new(
        tree: Rc<RefCell<Option<Value>>>,
        origin: Path,
        parent: Option<ParentLink>,
        options: Options,
    ) -> Self {
        Self {
            tree,
            origin,
            here: Path::root(),
            parent,
            options,
            diff: RefCell::new(Vec::new()),
            snapshots: RefCell::new(Vec::new()),
            pending: Cell::new(SnapshotState::Idle),
            listeners: Listeners::default(),
            children: Children::default(),
            muted: Cell::new(false),
            destroyed: Cell::new(false),
        }
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub(crate) fn origin(&self) -> &Path {
        &self.origin
    }

    fn ensure_alive(&self) -> Result<(), DomeError> {
        if self.destroyed.get() {
            return Err(DomeError::Destroyed);
        }
        Ok(())
    }

    fn parent(&self) -> Option<(Rc<DomeState>, &Path)> {
        let link = self.parent.as_ref()?;
        let parent = link.dome.upgrade().filter(|parent| !parent.is_destroyed());
        if parent.is_none() {
            trace!(origin = %self.origin, "dropping relay from orphaned dome");
        }
        Some((parent?, &link.path))
    }

    pub(crate) fn with_value<R>(&self, rel: &Path, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let abs = self.origin.join(rel);
        let tree = self.tree.borrow();
        f(resolve(&tree, abs.chunks()).value())
    }

    pub(crate) fn reader(self: &Rc<Self>, rel: Path) -> Reader {
        let dome = Rc::downgrade(self);
        self.children.reader(&rel, || Reader::new(dome, rel.clone()))
    }

    pub(crate) fn writer(self: &Rc<Self>, rel: Path) -> Writer {
        let dome = Rc::downgrade(self);
        self.children.writer(&rel, || Writer::new(dome, rel.clone()))
    }

    pub(crate) fn mutate(&self, rel: &Path, op: Op) -> Result<Option<Value>, DomeError> {
        let label = op.name();
        self.mutate_as(rel, op, label)
    }

    pub(crate) fn sort_by(
        &self,
        rel: &Path,
        compare: impl FnMut(&Value, &Value) -> Ordering,
    ) -> Result<Option<Value>, DomeError> {
        self.ensure_alive()?;
        let items = self.with_value(rel, |value| match value {
            Some(Value::Array(items)) => Ok(items.clone()),
            other => Err(DomeError::mismatch(OpName::Sort, ValueKind::of(other))),
        })?;
        let order = sort_order(&items, compare);
        self.mutate_as(rel, Op::Reposition(order), OpName::Sort)
    }

    /// Runs `op` at `rel`, reporting it to change listeners as `label`.
    fn mutate_as(&self, rel: &Path, op: Op, label: OpName) -> Result<Option<Value>, DomeError> {
        self.ensure_alive()?;
        let abs = self.origin.join(rel);

        let check = {
            let tree = self.tree.borrow();
            let check = precheck(&op, resolve(&tree, abs.chunks()).value())?;
            if check == Precheck::Proceed {
                check_writable(&tree, abs.chunks())?;
            }
            check
        };
        if let Precheck::Skip(result) = check {
            trace!(op = %label, path = %abs, "skipping no-op");
            return Ok(result);
        }

        self.materialize();

        let emit = self.options.emit_change && !self.muted.get();
        let old_value = if emit {
            self.with_value(rel, |value| value.cloned())
        } else {
            None
        };

        let (effect, new_value) = {
            let mut tree = self.tree.borrow_mut();
            let mut place = locate_mut(&mut tree, abs.chunks())?;
            let effect = execute(op, &mut place)?;
            let new_value = if emit { place.get().cloned() } else { None };
            (effect, new_value)
        };

        if self.options.record_diff {
            self.record(DiffEntry::from_op(&effect.recorded, rel));
        }
        if emit {
            let op = OpData {
                op: label,
                result: effect.result.clone(),
            };
            self.notify(rel, new_value.as_ref(), old_value.as_ref(), &op);
        }
        Ok(effect.result)
    }

    pub(crate) fn invoke(&self, rel: &Path, name: String, data: Value) -> Result<(), DomeError> {
        self.ensure_alive()?;
        self.materialize();
        if !self.muted.get() {
            self.announce(&name, rel, &data);
        }
        if self.options.record_diff {
            self.record(DiffEntry::from_op(&Op::Invoke { name, data }, rel));
        }
        Ok(())
    }

    /// Appends to the local log, then relays up the wrap chain.
    fn record(&self, entry: DiffEntry) {
        if !self.options.record_diff {
            return;
        }
        trace!(op = %entry.op, path = ?entry.path, origin = %self.origin, "recorded diff entry");
        self.diff.borrow_mut().push(entry.clone());
        self.listeners.emit_diff(&entry);
        if let Some((parent, prefix)) = self.parent() {
            parent.record(entry.prefixed(prefix));
        }
    }

    fn notify(&self, rel: &Path, new_value: Option<&Value>, old_value: Option<&Value>, op: &OpData) {
        self.listeners.emit_change(rel, new_value, old_value, op);
        if let Some((parent, prefix)) = self.parent() {
            parent.notify(&prefix.join(rel), new_value, old_value, op);
        }
    }

    fn announce(&self, name: &str, rel: &Path, data: &Value) {
        self.listeners.emit_invoke(&InvokeEvent {
            name: name.to_owned(),
            path: rel.as_str().to_owned(),
            data: data.clone(),
        });
        if let Some((parent, prefix)) = self.parent() {
            parent.announce(name, &prefix.join(rel), data);
        }
    }

    /// Copies the state once for all pending snapshots, here and in every
    /// ancestor.
    fn materialize(&self) {
        if let SnapshotState::Pending(count) = self.pending.get() {
            let snapshot = Rc::new(Snapshot {
                value: self.tree.borrow().clone(),
                diff: self.diff.borrow().clone(),
            });
            self.snapshots
                .borrow_mut()
                .extend(std::iter::repeat(snapshot).take(count));
            self.pending.set(SnapshotState::Idle);
            debug!(count, depth = self.snapshots.borrow().len(), "materialized snapshots");
        }
        if let Some(link) = &self.parent {
            if let Some(parent) = link.dome.upgrade() {
                parent.materialize();
            }
        }
    }

    fn snapshot(&self) -> Result<(), DomeError> {
        self.ensure_alive()?;
        if self.parent.is_some() {
            return Err(DomeError::WrappedDome("snapshot"));
        }
        let next = match self.pending.get() {
            SnapshotState::Idle => 1,
            SnapshotState::Pending(count) => count + 1,
        };
        self.pending.set(SnapshotState::Pending(next));
        Ok(())
    }

    fn rollback(&self) -> Result<(), DomeError> {
        self.ensure_alive()?;
        if self.parent.is_some() {
            return Err(DomeError::WrappedDome("rollback"));
        }
        if let SnapshotState::Pending(count) = self.pending.get() {
            let next = match count {
                1 => SnapshotState::Idle,
                n => SnapshotState::Pending(n - 1),
            };
            self.pending.set(next);
            debug!(pending = count - 1, "rolled back an unmaterialized snapshot");
            return Ok(());
        }

        let snapshot = self.snapshots.borrow_mut().pop().ok_or(DomeError::NoSnapshot)?;
        let Snapshot { value, diff } = Rc::unwrap_or_clone(snapshot);
        let emit = self.options.emit_change && !self.muted.get();
        let old_value = {
            let mut tree = self.tree.borrow_mut();
            std::mem::replace(&mut *tree, value)
        };
        *self.diff.borrow_mut() = diff;
        debug!(depth = self.snapshots.borrow().len(), "rolled back to snapshot");

        if emit {
            let new_value = self.tree.borrow().clone();
            let op = OpData {
                op: OpName::Rollback,
                result: None,
            };
            self.notify(&self.here, new_value.as_ref(), old_value.as_ref(), &op);
        }
        Ok(())
    }

    fn wrap(self: &Rc<Self>, rel: Path) -> Result<Dome, DomeError> {
        self.ensure_alive()?;
        if let Some(child) = self.children.dome(&rel) {
            return Ok(child);
        }
        let abs = self.origin.join(&rel);
        let is_container = matches!(
            resolve(&self.tree.borrow(), abs.chunks()).value(),
            Some(Value::Array(_) | Value::Object(_))
        );
        if !is_container {
            return Err(DomeError::WrapMissing(rel.as_str().to_owned()));
        }
        let link = ParentLink {
            dome: Rc::downgrade(self),
            path: rel.clone(),
        };
        let child = Dome {
            state: Rc::new(DomeState::new(self.tree.clone(), abs, Some(link), self.options)),
        };
        debug!(path = %rel, origin = %child.state.origin, "wrapped child dome");
        self.children.insert_dome(rel, child.clone());
        Ok(child)
    }

    fn apply_diff(&self, entries: &mut Vec<DiffEntry>, silent: bool) -> Result<(), DomeError> {
        let entries = std::mem::take(entries);
        self.ensure_alive()?;
        debug!(count = entries.len(), silent, "applying diff");
        let _mute = silent.then(|| MuteGuard::new(&self.muted));
        for entry in entries {
            let op = entry.to_op()?;
            let path = Path::from_chunks(entry.path);
            match op {
                Op::Invoke { name, data } => self.invoke(&path, name, data)?,
                op => {
                    self.mutate(&path, op)?;
                }
            }
        }
        Ok(())
    }

    fn destroy(&self) {
        if self.destroyed.get() {
            return;
        }
        for child in self.children.take_domes() {
            child.state.destroy();
        }
        self.children.clear();
        self.listeners.clear();
        self.diff.borrow_mut().clear();
        self.snapshots.borrow_mut().clear();
        self.pending.set(SnapshotState::Idle);
        if self.parent.is_none() {
            *self.tree.borrow_mut() = None;
        }
        self.destroyed.set(true);
        if let Some(link) = &self.parent {
            if let Some(parent) = link.dome.upgrade() {
                parent.children.remove_dome(&link.path);
            }
        }
        debug!(origin = %self.origin, "destroyed dome");
    }
}

/// A value tree with path-addressed access, a replayable diff log, change
/// notifications and snapshot rollback.
///
/// A `Dome` is itself a writer for its own value:
///
/// ```
/// use json_dome::prelude::*;
/// use serde_json::json;
///
/// let dome = Dome::new(json!({"n": 10}));
/// dome.write("n").unwrap().inc(1).unwrap();
/// assert_eq!(dome.get(), Some(json!({"n": 11})));
/// assert_eq!(dome.extract_diff().len(), 1);
/// ```
///
/// Cloning a `Dome` clones the handle; both refer to the same state.
#[derive(Clone)]
pub struct Dome {
    state: Rc<DomeState>,
}

impl Dome {
    pub fn new(value: impl Into<Option<Value>>) -> Self {
        Self::with_options(value, Options::default())
    }

    pub fn with_options(value: impl Into<Option<Value>>, options: Options) -> Self {
        let tree = Rc::new(RefCell::new(value.into()));
        Self {
            state: Rc::new(DomeState::new(tree, Path::root(), None, options)),
        }
    }

    pub fn options(&self) -> Options {
        self.state.options
    }

    /// True unless this dome was produced by [`Dome::wrap`].
    pub fn is_root(&self) -> bool {
        self.state.parent.is_none()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.is_destroyed()
    }

    /// True when both handles refer to the same dome.
    pub fn ptr_eq(&self, other: &Dome) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// A deep copy of the current value.
    pub fn value(&self) -> Option<Value> {
        self.get()
    }

    /// Requests a snapshot. The copy is taken right before the next
    /// mutation, and several requests with no mutation in between share it.
    pub fn snapshot(&self) -> Result<(), DomeError> {
        self.state.snapshot()
    }

    /// Undoes everything since the most recent snapshot, restoring both the
    /// value and the diff log.
    pub fn rollback(&self) -> Result<(), DomeError> {
        self.state.rollback()
    }

    /// Number of snapshots copied and waiting for a rollback.
    pub fn snapshot_depth(&self) -> usize {
        self.state.snapshots.borrow().len()
    }

    /// Number of snapshots requested but not yet copied.
    pub fn pending_snapshots(&self) -> usize {
        match self.state.pending.get() {
            SnapshotState::Idle => 0,
            SnapshotState::Pending(count) => count,
        }
    }

    /// A child dome viewing the value at `path`.
    ///
    /// Fails unless `path` currently holds a sequence or a map. Wrapping
    /// the same path again returns the same child.
    pub fn wrap(&self, path: impl IntoPath) -> Result<Dome, DomeError> {
        let rel = path.into_path()?;
        self.state.wrap(rel)
    }

    pub fn has_diff(&self) -> bool {
        !self.state.diff.borrow().is_empty()
    }

    /// A copy of the diff log; empty when diffs are not recorded.
    pub fn peek_diff(&self) -> Vec<DiffEntry> {
        self.state.diff.borrow().clone()
    }

    /// Takes the diff log, leaving it empty.
    pub fn extract_diff(&self) -> Vec<DiffEntry> {
        std::mem::take(&mut *self.state.diff.borrow_mut())
    }

    /// Replays `entries` in order. Paths are relative to this dome.
    ///
    /// `entries` is always left empty. With `silent` set, no change or
    /// invoke notifications are raised during the pass; diffs are recorded
    /// as usual.
    pub fn apply_diff(&self, entries: &mut Vec<DiffEntry>, silent: bool) -> Result<(), DomeError> {
        self.state.apply_diff(entries, silent)
    }

    /// Detaches listeners, destroys wrapped children and drops all state.
    pub fn destroy(&self) {
        self.state.destroy();
    }

    /// Subscribes to every change inside this dome.
    ///
    /// A listener may write to the dome from its callback. Changes caused
    /// by that write reach the other listeners, but not the one that is
    /// still running.
    pub fn on_change(&self, f: impl FnMut(&ChangeEvent) + 'static) -> ListenerId {
        self.state.listeners.on_change(f)
    }

    /// Subscribes to changes at or below `path`; events carry the path
    /// below it.
    pub fn on_change_at(
        &self,
        path: impl IntoPath,
        f: impl FnMut(&ChangeEvent) + 'static,
    ) -> Result<ListenerId, DomeError> {
        Ok(self.state.listeners.on_change_at(path.into_path()?, f))
    }

    pub fn on_diff(&self, f: impl FnMut(&DiffEntry) + 'static) -> ListenerId {
        self.state.listeners.on_diff(f)
    }

    pub fn on_invoke(&self, name: &str, f: impl FnMut(&InvokeEvent) + 'static) -> ListenerId {
        self.state.listeners.on_invoke(name.to_owned(), f)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.state.listeners.off(id)
    }
}

impl Bound for Dome {
    fn dome(&self) -> Weak<DomeState> {
        Rc::downgrade(&self.state)
    }

    fn rel(&self) -> &Path {
        &self.state.here
    }

    fn live(&self) -> Option<Rc<DomeState>> {
        Some(self.state.clone()).filter(|state| !state.is_destroyed())
    }
}

impl ReadAccess for Dome {}

impl WriteAccess for Dome {}

impl Serialize for Dome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with_value(|value| value.serialize(serializer))
    }
}

impl fmt::Debug for Dome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dome")
            .field("origin", &self.state.origin)
            .field("root", &self.is_root())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
