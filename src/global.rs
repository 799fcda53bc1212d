use crate::SettingsStore;
use gpui::{App, Context, Global};

struct GlobalSettingsStore(SettingsStore);

impl Global for GlobalSettingsStore {}

/// Makes the application's [`SettingsStore`] reachable from any view.
///
/// The composition root creates the store once and installs it here; cells
/// created through [`CellContext`](crate::CellContext) persist to it.
pub trait GlobalStoreContext {
    /// Install the store for the whole application.
    fn init_settings_store(&mut self, store: SettingsStore) -> SettingsStore;

    /// The installed store. Panics if `init_settings_store` was never called.
    fn settings_store(&self) -> SettingsStore;
}

impl GlobalStoreContext for App {
    fn init_settings_store(&mut self, store: SettingsStore) -> SettingsStore {
        self.set_global(GlobalSettingsStore(store.clone()));
        store
    }

    fn settings_store(&self) -> SettingsStore {
        self.global::<GlobalSettingsStore>().0.clone()
    }
}

impl<V: 'static> GlobalStoreContext for Context<'_, V> {
    fn init_settings_store(&mut self, store: SettingsStore) -> SettingsStore {
        self.set_global(GlobalSettingsStore(store.clone()));
        store
    }

    fn settings_store(&self) -> SettingsStore {
        self.global::<GlobalSettingsStore>().0.clone()
    }
}
