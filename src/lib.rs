//! # Persisted Signals
//!
//! Named, typed, observable values that save themselves to a settings file.
//!
//! ## Features
//!
//! - **Restore on creation**: a cell picks up the value stored under its name
//!   and only falls back to its initial value the first time
//! - **Followers**: a cell can mirror another cell; changes cascade
//!   depth-first through the follow graph, which is checked for cycles
//! - **Typed storage**: values are stored as canonical text through
//!   [`VariantConverter`], with JSON for structured types
//! - **Explicit store**: the [`SettingsStore`] is created by the application
//!   and passed to each cell, never looked up globally
//! - **GPUI integration** (feature `gpui`): cells that re-render their view
//!
//! ## Example
//!
//! ```rust,no_run
//! use persisted_signals::prelude::*;
//!
//! let store = SettingsStore::open(&StoreOptions::new("ColourSync", "Acme"));
//! let colour = PersistentCell::new(&store, "widgetColor", Colour::RED)?;
//! colour.subscribe(|colour| println!("now {colour}"));
//! colour.assign(Colour::from_rgb(0x20, 0x80, 0xff));
//! # Ok::<(), persisted_signals::CellError>(())
//! ```

mod cell;
mod colour;
mod error;
mod graph;
mod store;
mod variant;

#[cfg(feature = "gpui")]
mod context;
#[cfg(feature = "gpui")]
mod global;

pub use cell::PersistentCell;
pub use colour::Colour;
pub use error::{CellError, ConversionError, StoreError};
pub use graph::CellId;
pub use store::{SettingsStore, StoreOptions};
pub use variant::{canonicalize, JsonVariant, VariantConverter};

#[cfg(feature = "gpui")]
pub use context::CellContext;
#[cfg(feature = "gpui")]
pub use global::GlobalStoreContext;

// Re-export the prelude
pub mod prelude {
    pub use crate::{
        CellError, Colour, JsonVariant, PersistentCell, SettingsStore, StoreOptions,
        VariantConverter,
    };

    #[cfg(feature = "gpui")]
    pub use crate::{CellContext, GlobalStoreContext};
}
