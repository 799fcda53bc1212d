//! The typed, persisted, observable cell.

use crate::error::Result;
use crate::graph::{self, codec_for, with_graph, CellId, CellNode, Listener, Value};
use crate::store::SettingsStore;
use crate::variant::{canonicalize, VariantConverter};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// A named value of type `T` that persists itself and notifies listeners.
///
/// A cell is either a root, holding its own value and a default it can be
/// reset to, or a follower that mirrors another cell. Every change is written
/// to the cell's [`SettingsStore`] under the cell's name, cascaded to the
/// cell's followers, and then reported to listeners.
///
/// Creating a root cell restores the value stored under its name, if any, so
/// a value survives restarts:
///
/// ```rust,no_run
/// use persisted_signals::prelude::*;
///
/// let store = SettingsStore::in_memory();
/// let temp = PersistentCell::new(&store, "temp", 2.5f32)?;
/// let mirror = PersistentCell::<f32>::follow(&temp, "tempFollower")?;
///
/// temp.assign(3.5);
/// assert_eq!(mirror.read(), 3.5);
/// assert_eq!(store.get("tempFollower").as_deref(), Some("3.5"));
/// # Ok::<(), persisted_signals::CellError>(())
/// ```
///
/// Cells live in a thread-local graph: a cell and its store must stay on the
/// thread that created them, which the types enforce by being `!Send`.
pub struct PersistentCell<T> {
    id: CellId,
    _phantom: PhantomData<Rc<T>>,
}

impl<T: VariantConverter + Clone + 'static> PersistentCell<T> {
    /// Create a root cell named `name`.
    ///
    /// If `store` already holds a value for `name`, that value wins over
    /// `initial`; `initial` stays the default used by
    /// [`reset_to_default`](Self::reset_to_default). Stored text that cannot
    /// be decoded as `T` is reported instead of silently replaced.
    pub fn new(store: &SettingsStore, name: impl Into<String>, initial: T) -> Result<Self> {
        let name = name.into();
        let default = initial.to_variant();

        let stored = if name.is_empty() { None } else { store.get(&name) };
        let (text, value) = match stored {
            Some(stored) => {
                let restored = canonicalize::<T>(&stored)?;
                tracing::debug!(cell = %name, text = %restored.0, "restored cell from settings");
                restored
            }
            None => (default.clone(), initial),
        };

        let node = CellNode::new(
            name,
            text,
            Rc::new(value),
            Some(default),
            store.clone(),
            codec_for::<T>(),
        );
        let id = with_graph(|graph| graph.insert(node));
        store.register(id);
        store.flush_or_warn();
        Ok(Self::from_id(id))
    }

    /// Create a root cell whose default is `T::default()`.
    pub fn new_default(store: &SettingsStore, name: impl Into<String>) -> Result<Self>
    where
        T: Default,
    {
        Self::new(store, name, T::default())
    }

    /// Create a cell that mirrors `source`.
    ///
    /// The new cell starts with `source`'s current value, persists it under
    /// `name` in `source`'s store, and is updated whenever `source` changes.
    /// It has no default of its own.
    pub fn follow<U: VariantConverter + Clone + 'static>(
        source: &PersistentCell<U>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let (source_text, store) = with_graph(|graph| {
            let node = graph.node(source.id).expect("source cell not found");
            (node.text.clone(), node.store.clone())
        });
        let (text, value) = canonicalize::<T>(&source_text)?;

        let node = CellNode::new(name, text, Rc::new(value), None, store.clone(), codec_for::<T>());
        let id = with_graph(|graph| {
            let id = graph.insert(node);
            graph.link(id, source.id).map(|()| id)
        })?;
        store.register(id);
        store.flush_or_warn();
        Ok(Self::from_id(id))
    }

    fn from_id(id: CellId) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Start following `source`.
    ///
    /// Only a cell that follows nothing can be attached, and only to a
    /// source that does not itself (transitively) follow this cell. The cell
    /// adopts `source`'s value immediately and keeps its own default.
    pub fn attach<U: VariantConverter + Clone + 'static>(
        &self,
        source: &PersistentCell<U>,
    ) -> Result<bool> {
        let source_text = with_graph(|graph| -> Result<String> {
            let text = graph
                .node(source.id)
                .map(|node| node.text.clone())
                .expect("source cell not found");
            canonicalize::<T>(&text)?;
            graph.link(self.id, source.id)?;
            Ok(text)
        })?;
        graph::commit(self.id, &source_text)
    }

    /// Set a new value. Returns whether the value changed.
    ///
    /// Followers are updated and every store involved is flushed before any
    /// listener runs.
    pub fn assign(&self, value: T) -> bool {
        match graph::commit(self.id, &value.to_variant()) {
            Ok(changed) => changed,
            Err(err) => {
                tracing::error!(
                    cell = %self.name(),
                    %err,
                    "value does not survive its own conversion"
                );
                false
            }
        }
    }

    /// Set the value from another type through its stored text.
    pub fn assign_from<U: VariantConverter>(&self, value: &U) -> Result<bool> {
        graph::commit(self.id, &value.to_variant())
    }

    /// Copy another cell's current value. No follow link is created.
    pub fn assign_cell<U: VariantConverter + Clone + 'static>(
        &self,
        other: &PersistentCell<U>,
    ) -> Result<bool> {
        graph::commit(self.id, &other.text())
    }

    /// Modify the value in place, then persist and notify.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut value = self.read();
        f(&mut value);
        self.assign(value)
    }

    /// Get a clone of the current value.
    pub fn read(&self) -> T {
        self.with(T::clone)
    }

    /// Read the current value with a closure.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value: Value = with_graph(|graph| graph.node(self.id).map(|node| node.value.clone()))
            .expect("cell not found");
        f(value.downcast_ref::<T>().expect("cell holds a different type"))
    }

    /// The canonical text stored for the current value.
    pub fn text(&self) -> String {
        self.node(|node| node.text.clone())
    }

    /// The value [`reset_to_default`](Self::reset_to_default) restores, if any.
    pub fn default_value(&self) -> Option<T> {
        self.node(|node| node.default.clone())
            .and_then(|text| T::from_variant(&text).ok())
    }

    /// Restore the default given at construction.
    ///
    /// Fails with [`CellError::NoDefault`](crate::CellError::NoDefault) for cells created by
    /// [`follow`](Self::follow).
    pub fn reset_to_default(&self) -> Result<bool> {
        graph::reset_node(self.id)
    }

    /// Add a listener called with the new value after every change.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) {
        let listener = typed_listener(callback);
        with_graph(|graph| {
            if let Some(node) = graph.node_mut(self.id) {
                node.listeners.push(listener);
            }
        });
    }

    /// Replace the change callback. It runs before listeners added with
    /// [`subscribe`](Self::subscribe).
    pub fn set_change_callback(&self, callback: impl Fn(&T) + 'static) {
        let listener = typed_listener(callback);
        // The old callback may own cells; drop it outside the graph borrow.
        let previous = with_graph(|graph| {
            graph
                .node_mut(self.id)
                .and_then(|node| node.primary.replace(listener))
        });
        drop(previous);
    }

    /// Move this cell to a new key. The old entry is removed from the store.
    pub fn set_key_name(&self, name: impl Into<String>) {
        let name = name.into();
        let store = with_graph(|graph| {
            let node = graph.node_mut(self.id)?;
            let old = std::mem::replace(&mut node.name, name);
            if !old.is_empty() {
                node.store.remove(&old);
            }
            node.persist();
            tracing::debug!(from = %old, to = %node.name, "cell renamed");
            Some(node.store.clone())
        });
        if let Some(store) = store {
            store.flush_or_warn();
        }
    }

    pub fn name(&self) -> String {
        self.node(|node| node.name.clone())
    }

    pub fn is_following(&self) -> bool {
        self.node(|node| node.upstream.is_some())
    }

    /// The store this cell persists to.
    pub fn store(&self) -> SettingsStore {
        self.node(|node| node.store.clone())
    }

    /// Get the underlying cell ID (mainly for debugging).
    pub fn id(&self) -> CellId {
        self.id
    }

    fn node<R>(&self, f: impl FnOnce(&CellNode) -> R) -> R {
        with_graph(|graph| f(graph.node(self.id).expect("cell not found")))
    }
}

fn typed_listener<T: 'static>(callback: impl Fn(&T) + 'static) -> Listener {
    Rc::new(move |value: &dyn Any| {
        if let Some(value) = value.downcast_ref::<T>() {
            callback(value);
        }
    })
}

/// Copies are snapshots: the copy gets its own node and reset registration
/// with the same name, value, default and callbacks, and follows nothing.
impl<T: VariantConverter + Clone + 'static> Clone for PersistentCell<T> {
    fn clone(&self) -> Self {
        let (id, store) = with_graph(|graph| {
            let id = graph.duplicate(self.id).expect("cell not found");
            let store = graph.node(id).map(|node| node.store.clone());
            (id, store)
        });
        if let Some(store) = store {
            store.register(id);
            store.flush_or_warn();
        }
        Self::from_id(id)
    }
}

impl<T> Drop for PersistentCell<T> {
    fn drop(&mut self) {
        graph::remove_cell(self.id);
    }
}

impl<T: VariantConverter + Clone + fmt::Debug + 'static> fmt::Debug for PersistentCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCell")
            .field("name", &self.name())
            .field("value", &self.read())
            .field("following", &self.is_following())
            .finish()
    }
}
