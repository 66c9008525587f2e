//! A shared, observable data store.
//!
//! A [`StoreProvider`] owns a [`Store`] holding a catalog of [`Record`]s and a search
//! text. On activation it loads the catalog once from a [`StaticSource`]. Consumers
//! hold cloned [`Store`] handles, read the current [`StoreState`], change it through
//! [`Store::replace_dataset`] and [`Store::set_search_text`], and are notified of
//! every change through [`effect`] or [`Store::subscribe`].
//!
//! All of this runs on a single thread driven by [`core::Runtime`].
//!
//! ```
//! use dexstore::{core::Runtime, MemorySource, StoreConfig, StoreProvider};
//!
//! let mut rt = Runtime::new();
//! let source = MemorySource::new().with("/pokemon.json", "[]");
//! let provider = StoreProvider::activate(source, &StoreConfig::default());
//! let store = provider.store().clone();
//!
//! rt.update();
//! store.set_search_text("char", rt.ac());
//! assert_eq!(store.search_text(&mut rt.sc()), "char");
//! ```

pub mod core;
mod effect;
mod provider;
mod record;
mod source;
mod state;
mod store;
mod subscription;
mod utils;
mod view;

pub use crate::core::{
    spawn_action, spawn_action_async, ActionContext, AsyncActionContext, Runtime, SignalContext,
};
pub use effect::*;
pub use provider::*;
pub use record::*;
pub use source::*;
pub use state::*;
pub use store::*;
pub use subscription::*;
pub use view::*;
