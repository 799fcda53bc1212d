//! Integration with GPUI's Context system.
//!
//! Cells created through [`CellContext`] call `cx.notify()` on the view that
//! created them whenever their value changes, so a view re-renders when its
//! cell is assigned, restored to its default, or updated through a cell it
//! follows.

use crate::global::GlobalStoreContext;
use crate::{CellError, PersistentCell, VariantConverter};
use futures::channel::mpsc;
use futures::StreamExt;
use gpui::{EntityId, Subscription, WeakEntity};
use std::cell::RefCell;
use std::collections::HashMap;

/// Extension trait for GPUI Context to work with persisted cells.
///
/// # Example
///
/// ```rust,no_run
/// use gpui::*;
/// use persisted_signals::prelude::*;
///
/// struct Swatch {
///     colour: PersistentCell<Colour>,
/// }
///
/// impl Swatch {
///     fn new(cx: &mut Context<Self>) -> Result<Self, CellError> {
///         Ok(Self {
///             colour: cx.create_cell("widgetColor", Colour::RED)?,
///         })
///     }
/// }
/// ```
pub trait CellContext {
    /// Create a root cell in the application's settings store.
    fn create_cell<T: VariantConverter + Clone + 'static>(
        &mut self,
        name: &str,
        initial: T,
    ) -> Result<PersistentCell<T>, CellError>;

    /// Create a cell that follows `source`.
    fn create_follower<T, U>(
        &mut self,
        source: &PersistentCell<U>,
        name: &str,
    ) -> Result<PersistentCell<T>, CellError>
    where
        T: VariantConverter + Clone + 'static,
        U: VariantConverter + Clone + 'static;

    /// Re-render this view whenever `cell` changes.
    fn observe_cell<T: VariantConverter + Clone + 'static>(&mut self, cell: &PersistentCell<T>);
}

// Thread-local storage for tracking subscriptions per entity
thread_local! {
    static ENTITY_SUBSCRIPTIONS: RefCell<HashMap<EntityId, Vec<Subscription>>> =
        RefCell::new(HashMap::new());
}

impl<V: 'static> CellContext for gpui::Context<'_, V> {
    fn create_cell<T: VariantConverter + Clone + 'static>(
        &mut self,
        name: &str,
        initial: T,
    ) -> Result<PersistentCell<T>, CellError> {
        let store = self.settings_store();
        let cell = PersistentCell::new(&store, name, initial)?;
        self.observe_cell(&cell);
        Ok(cell)
    }

    fn create_follower<T, U>(
        &mut self,
        source: &PersistentCell<U>,
        name: &str,
    ) -> Result<PersistentCell<T>, CellError>
    where
        T: VariantConverter + Clone + 'static,
        U: VariantConverter + Clone + 'static,
    {
        let cell = PersistentCell::follow(source, name)?;
        self.observe_cell(&cell);
        Ok(cell)
    }

    fn observe_cell<T: VariantConverter + Clone + 'static>(&mut self, cell: &PersistentCell<T>) {
        let subscription = auto_notify(cell, self);
        track_subscription(self, subscription);
    }
}

/// Notify an entity whenever a cell changes.
///
/// Cell listeners run synchronously inside `assign`, possibly while another
/// entity is being updated, so the listener only sends on a channel and a
/// task spawned on the entity does the `cx.notify()`. The task ends when the
/// cell is dropped (the sender goes with its listener) or when the returned
/// subscription is dropped.
pub(crate) fn auto_notify<T, V>(cell: &PersistentCell<T>, cx: &mut gpui::Context<V>) -> Subscription
where
    T: VariantConverter + Clone + 'static,
    V: 'static,
{
    let (tx, mut rx) = mpsc::unbounded::<()>();

    cell.subscribe(move |_| {
        // Ignore errors - if the receiver is dropped, the entity is gone
        let _ = tx.unbounded_send(());
    });

    let task = cx.spawn(
        async move |entity: WeakEntity<V>, cx: &mut gpui::AsyncApp| {
            while let Some(()) = rx.next().await {
                let Some(entity) = entity.upgrade() else {
                    break;
                };
                entity.update(cx, |_, cx| cx.notify()).ok();
            }
        },
    );

    Subscription::new(move || drop(task))
}

pub(crate) fn track_subscription<V: 'static>(
    cx: &mut gpui::Context<V>,
    subscription: Subscription,
) {
    let entity_id = cx.entity_id();
    let first = ENTITY_SUBSCRIPTIONS.with(|subs| {
        let mut subs = subs.borrow_mut();
        let first = !subs.contains_key(&entity_id);
        subs.entry(entity_id).or_default().push(subscription);
        first
    });

    if first {
        cx.on_release(move |_, _| {
            ENTITY_SUBSCRIPTIONS.with(|subs| {
                subs.borrow_mut().remove(&entity_id);
            });
        })
        .detach();
    }
}
