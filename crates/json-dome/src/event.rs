//! Notification payloads and the per-dome listener registry.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::diff::DiffEntry;
use crate::op::OpName;
use crate::path::Path;

/// Identifies a registered listener; pass it to `off` to unsubscribe.
pub type ListenerId = u64;

/// The operation behind a change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct OpData {
    pub op: OpName,
    pub result: Option<Value>,
}

/// A change notification.
///
/// For listeners registered with `on_change`, `path` is the full path of
/// the changed slot relative to the dome. For listeners registered with
/// `on_change_at(prefix)`, it is the part of that path below `prefix`
/// (empty when the prefix itself changed).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: String,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    pub op: OpData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeEvent {
    pub name: String,
    /// Path of the invoking accessor relative to the dome.
    pub path: String,
    pub data: Value,
}

type Handler<E> = Rc<RefCell<dyn FnMut(&E)>>;

enum Listener {
    Change(Handler<ChangeEvent>),
    ChangeAt(Path, Handler<ChangeEvent>),
    Diff(Handler<DiffEntry>),
    Invoke(String, Handler<InvokeEvent>),
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: Cell<ListenerId>,
    entries: RefCell<BTreeMap<ListenerId, Listener>>,
}

impl Listeners {
    fn insert(&self, listener: Listener) -> ListenerId {
        let id = self.next_id.get().saturating_add(1);
        self.next_id.set(id);
        self.entries.borrow_mut().insert(id, listener);
        id
    }

    pub fn on_change(&self, f: impl FnMut(&ChangeEvent) + 'static) -> ListenerId {
        self.insert(Listener::Change(Rc::new(RefCell::new(f))))
    }

    pub fn on_change_at(&self, prefix: Path, f: impl FnMut(&ChangeEvent) + 'static) -> ListenerId {
        let handler: Handler<ChangeEvent> = Rc::new(RefCell::new(f));
        if prefix.is_empty() {
            self.insert(Listener::Change(handler))
        } else {
            self.insert(Listener::ChangeAt(prefix, handler))
        }
    }

    pub fn on_diff(&self, f: impl FnMut(&DiffEntry) + 'static) -> ListenerId {
        self.insert(Listener::Diff(Rc::new(RefCell::new(f))))
    }

    pub fn on_invoke(&self, name: String, f: impl FnMut(&InvokeEvent) + 'static) -> ListenerId {
        self.insert(Listener::Invoke(name, Rc::new(RefCell::new(f))))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.entries.borrow_mut().remove(&id).is_some()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Raises a change on `path`, then once per non-empty prefix of `path`
    /// (longest first) for the listeners scoped to that prefix.
    pub fn emit_change(&self, path: &Path, new_value: Option<&Value>, old_value: Option<&Value>, op: &OpData) {
        let mut calls: Vec<(Handler<ChangeEvent>, String)> = Vec::new();
        {
            let entries = self.entries.borrow();
            for listener in entries.values() {
                if let Listener::Change(handler) = listener {
                    calls.push((handler.clone(), path.as_str().to_owned()));
                }
            }
            for i in (1..=path.len()).rev() {
                let (head, tail) = path.split_at(i);
                for listener in entries.values() {
                    if let Listener::ChangeAt(prefix, handler) = listener {
                        if *prefix == head {
                            calls.push((handler.clone(), tail.as_str().to_owned()));
                        }
                    }
                }
            }
        }
        for (handler, path) in calls {
            let event = ChangeEvent {
                path,
                new_value: new_value.cloned(),
                old_value: old_value.cloned(),
                op: op.clone(),
            };
            call(&handler, &event);
        }
    }

    pub fn emit_diff(&self, entry: &DiffEntry) {
        let handlers: Vec<_> = self
            .entries
            .borrow()
            .values()
            .filter_map(|listener| match listener {
                Listener::Diff(handler) => Some(handler.clone()),
                _ => None,
            })
            .collect();
        for handler in handlers {
            call(&handler, entry);
        }
    }

    pub fn emit_invoke(&self, event: &InvokeEvent) {
        let handlers: Vec<_> = self
            .entries
            .borrow()
            .values()
            .filter_map(|listener| match listener {
                Listener::Invoke(name, handler) if *name == event.name => Some(handler.clone()),
                _ => None,
            })
            .collect();
        for handler in handlers {
            call(&handler, event);
        }
    }
}

/// A handler already running further up the stack is skipped.
fn call<E>(handler: &Handler<E>, event: &E) {
    match handler.try_borrow_mut() {
        Ok(mut f) => (*f)(event),
        Err(_) => tracing::trace!("skipping re-entrant listener"),
    }
}
