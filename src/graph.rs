//! Generational arena holding every live cell and its follow edges.
//!
//! Cells are nodes in a thread-local slot map. A node may follow exactly one
//! upstream node, so the edges form a forest; [`CellGraph::link`] rejects any
//! binding that would close a cycle. A change is applied in two phases: an
//! explicit depth-first walk updates the slot and store entry of the changed
//! node and every follower below it, then listeners run in walk order once the
//! arena is no longer borrowed.

use crate::error::{CellError, ConversionError};
use crate::store::SettingsStore;
use crate::variant::{canonicalize, VariantConverter};
use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

new_key_type! {
    /// Unique identifier for a cell in the graph.
    pub struct CellId;
}

/// A decoded, type-erased cell value.
pub(crate) type Value = Rc<dyn Any>;

/// Change callback; receives the node's new decoded value.
pub(crate) type Listener = Rc<dyn Fn(&dyn Any)>;

/// Turns incoming text into the node's canonical text and decoded value.
pub(crate) type Codec = Rc<dyn Fn(&str) -> Result<(String, Value), ConversionError>>;

pub(crate) fn codec_for<T: VariantConverter + 'static>() -> Codec {
    Rc::new(|text| canonicalize::<T>(text).map(|(text, value)| (text, Rc::new(value) as Value)))
}

pub(crate) struct CellNode {
    /// Key in the store; empty names are never persisted.
    pub name: String,
    /// Canonical text of the current value.
    pub text: String,
    pub value: Value,
    pub default: Option<String>,
    pub upstream: Option<CellId>,
    pub followers: Vec<CellId>,
    /// Replaceable change callback, run before `listeners`.
    pub primary: Option<Listener>,
    pub listeners: Vec<Listener>,
    pub store: SettingsStore,
    pub codec: Codec,
}

impl CellNode {
    pub fn new(
        name: String,
        text: String,
        value: Value,
        default: Option<String>,
        store: SettingsStore,
        codec: Codec,
    ) -> Self {
        Self {
            name,
            text,
            value,
            default,
            upstream: None,
            followers: Vec::new(),
            primary: None,
            listeners: Vec::new(),
            store,
            codec,
        }
    }

    /// Write the current text under this node's name.
    pub fn persist(&self) {
        if !self.name.is_empty() {
            self.store.set(&self.name, &self.text);
        }
    }

    fn callbacks(&self) -> Vec<Listener> {
        self.primary.iter().chain(self.listeners.iter()).cloned().collect()
    }
}

/// Work left over after the arena borrow ends: stores to flush and
/// listeners to run, in walk order.
#[derive(Default)]
#[must_use]
pub(crate) struct Propagation {
    stores: Vec<SettingsStore>,
    notifications: Vec<(Value, Vec<Listener>)>,
    origin_changed: bool,
}

impl Propagation {
    fn touch(&mut self, store: &SettingsStore) {
        if !self.stores.iter().any(|touched| touched.same_store(store)) {
            self.stores.push(store.clone());
        }
    }

    /// Flush touched stores, then notify. Returns whether the origin changed.
    pub fn deliver(self) -> bool {
        for store in &self.stores {
            store.flush_or_warn();
        }

        for (value, listeners) in self.notifications {
            for listener in listeners {
                listener(&*value);
            }
        }
        self.origin_changed
    }
}

pub(crate) struct CellGraph {
    nodes: SlotMap<CellId, CellNode>,
}

impl CellGraph {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    /// Insert a node and write its value to its store.
    pub fn insert(&mut self, node: CellNode) -> CellId {
        node.persist();
        self.nodes.insert(node)
    }

    pub fn node(&self, id: CellId) -> Option<&CellNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: CellId) -> Option<&mut CellNode> {
        self.nodes.get_mut(id)
    }

    /// Remove a node. Its followers keep their values and become roots.
    pub fn remove(&mut self, id: CellId) -> Option<CellNode> {
        let node = self.nodes.remove(id)?;

        if let Some(upstream) = node.upstream.and_then(|upstream| self.nodes.get_mut(upstream)) {
            upstream.followers.retain(|follower| *follower != id);
        }
        for follower in &node.followers {
            if let Some(follower) = self.nodes.get_mut(*follower) {
                tracing::debug!(
                    cell = %follower.name,
                    upstream = %node.name,
                    "upstream dropped, cell is now a root"
                );
                follower.upstream = None;
            }
        }
        Some(node)
    }

    /// A new root node with the same name, value, default and callbacks.
    pub fn duplicate(&mut self, id: CellId) -> Option<CellId> {
        let node = self.nodes.get(id)?;
        let copy = CellNode {
            name: node.name.clone(),
            text: node.text.clone(),
            value: node.value.clone(),
            default: node.default.clone(),
            upstream: None,
            followers: Vec::new(),
            primary: node.primary.clone(),
            listeners: node.listeners.clone(),
            store: node.store.clone(),
            codec: node.codec.clone(),
        };
        Some(self.insert(copy))
    }

    /// True if `id` follows `ancestor`, directly or through a chain.
    pub fn follows(&self, id: CellId, ancestor: CellId) -> bool {
        let mut current = self.nodes.get(id).and_then(|node| node.upstream);
        // The edges form a forest, the step limit only guards a corrupted graph.
        let mut steps = 0;
        while let Some(upstream) = current {
            if upstream == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(upstream).and_then(|node| node.upstream);
        }
        false
    }

    /// Make `follower` follow `upstream`.
    pub fn link(&mut self, follower: CellId, upstream: CellId) -> Result<(), CellError> {
        let name_of = |graph: &Self, id: CellId| {
            graph.nodes.get(id).map(|node| node.name.clone()).unwrap_or_default()
        };

        if follower == upstream || self.follows(upstream, follower) {
            return Err(CellError::CyclicBinding {
                cell: name_of(self, follower),
                source_cell: name_of(self, upstream),
            });
        }
        if self.nodes.get(follower).is_some_and(|node| node.upstream.is_some()) {
            return Err(CellError::AlreadyBound {
                cell: name_of(self, follower),
            });
        }

        if let Some(node) = self.nodes.get_mut(upstream) {
            node.followers.push(follower);
        }
        if let Some(node) = self.nodes.get_mut(follower) {
            node.upstream = Some(upstream);
        }
        Ok(())
    }

    /// Set `origin` from `text` and push the change down to its followers.
    ///
    /// Nodes whose text is unchanged fire nothing, but the walk still visits
    /// their followers so a follower that drifted is brought back in line.
    /// A conversion failure at the origin is returned. A follower that cannot
    /// convert the new value keeps its last value and its subtree is skipped.
    pub fn propagate(&mut self, origin: CellId, text: &str) -> Result<Propagation, CellError> {
        let mut propagation = Propagation::default();
        let Some(node) = self.nodes.get(origin) else {
            return Ok(propagation);
        };
        let (text, value) = (node.codec)(text)?;

        let mut visited = HashSet::new();
        let mut pending = vec![(origin, text, value)];
        while let Some((id, text, value)) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            propagation.touch(&node.store);

            if node.text != text {
                node.text = text;
                node.value = value.clone();
                tracing::debug!(cell = %node.name, text = %node.text, "cell value changed");
                propagation.notifications.push((value, node.callbacks()));
                propagation.origin_changed |= id == origin;
            }
            node.persist();

            let followers = node.followers.clone();
            let parent_text = node.text.clone();
            // Reversed so the first follower is visited first.
            for follower_id in followers.into_iter().rev() {
                let Some(follower) = self.nodes.get(follower_id) else {
                    continue;
                };
                match (follower.codec)(&parent_text) {
                    Ok((text, value)) => pending.push((follower_id, text, value)),
                    Err(err) => {
                        tracing::warn!(
                            cell = %follower.name,
                            %err,
                            "follower keeps its last value"
                        );
                    }
                }
            }
        }
        Ok(propagation)
    }
}

thread_local! {
    static GRAPH: RefCell<CellGraph> = RefCell::new(CellGraph::new());
    /// Cells dropped while the graph was borrowed; removed on the next access.
    static DEFERRED: RefCell<Vec<CellId>> = RefCell::new(Vec::new());
}

/// Access the thread-local cell graph.
pub(crate) fn with_graph<R>(f: impl FnOnce(&mut CellGraph) -> R) -> R {
    let result = GRAPH.with(|graph| f(&mut graph.borrow_mut()));
    remove_deferred();
    result
}

/// Remove a dropped cell, unregister it and flush its store.
///
/// The node is dropped after the graph borrow ends, since its listeners may
/// own other cells. If the graph is busy (a cell dropped from inside a graph
/// access) removal waits for the next access. Nothing happens once the
/// thread-local has been torn down.
pub(crate) fn remove_cell(id: CellId) {
    let removed = GRAPH.try_with(|graph| match graph.try_borrow_mut() {
        Ok(mut graph) => Some(graph.remove(id)),
        Err(_) => None,
    });
    match removed {
        Ok(Some(Some(node))) => {
            tracing::debug!(cell = %node.name, "cell dropped");
            node.store.unregister(id);
            node.store.flush_or_warn();
        }
        Ok(Some(None)) | Err(_) => {}
        Ok(None) => {
            let _ = DEFERRED.try_with(|deferred| deferred.borrow_mut().push(id));
        }
    }
}

fn remove_deferred() {
    loop {
        let ids = DEFERRED
            .try_with(|deferred| std::mem::take(&mut *deferred.borrow_mut()))
            .unwrap_or_default();
        if ids.is_empty() {
            break;
        }
        for id in ids {
            remove_cell(id);
        }
    }
}

/// Apply `text` to a cell, flush, and notify.
pub(crate) fn commit(id: CellId, text: &str) -> Result<bool, CellError> {
    let propagation = with_graph(|graph| graph.propagate(id, text))?;
    Ok(propagation.deliver())
}

/// Restore a cell to its default value.
pub(crate) fn reset_node(id: CellId) -> Result<bool, CellError> {
    let node = with_graph(|graph| {
        graph
            .node(id)
            .map(|node| (node.name.clone(), node.default.clone()))
    });
    match node {
        None => Ok(false),
        Some((_, Some(default))) => commit(id, &default),
        Some((cell, None)) => Err(CellError::NoDefault { cell }),
    }
}
