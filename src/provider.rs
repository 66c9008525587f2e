use std::rc::Rc;

use futures::future::{AbortHandle, Abortable};
use log::{debug, info, warn};
use parse_display::Display;
use serde::{Deserialize, Serialize};

use crate::{
    core::{spawn_action_async, ActionContext, SignalContext},
    parse_records, FetchError, Record, State, StaticSource, Store, WeakStore,
};

#[cfg(test)]
mod tests;

/// Settings of a [`StoreProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON document fetched from the [`StaticSource`].
    pub resource_path: String,
    /// Search text the store starts with.
    pub initial_search: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            resource_path: "/pokemon.json".to_string(),
            initial_search: "foo".to_string(),
        }
    }
}

#[derive(Display, Debug)]
pub enum LoadError {
    #[display("failed to fetch `{path}`: {source}")]
    Fetch { path: String, source: FetchError },
    #[display("failed to parse `{path}`: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Fetch { source, .. } => Some(source),
            LoadError::Parse { source, .. } => Some(source),
        }
    }
}

/// Progress of the one-shot load of a [`StoreProvider`].
#[derive(Clone, Debug, Display)]
pub enum LoadStatus {
    #[display("loading")]
    Loading,
    #[display("loaded {count} records")]
    Loaded { count: usize },
    #[display("failed: {0}")]
    Failed(Rc<LoadError>),
}

impl LoadStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadStatus::Loading)
    }
}

/// Owning scope of a [`Store`].
///
/// Activating a provider creates the store and starts loading the dataset from a
/// [`StaticSource`] exactly once. Consumers receive [`Store`] handles through
/// [`store`](Self::store). Dropping the provider cancels a load that has not
/// finished yet; its result is never applied.
///
/// A failed load leaves the dataset as it was. The failure is only visible through
/// [`load_status`](Self::load_status) and the log.
pub struct StoreProvider {
    store: Store,
    status: State<LoadStatus>,
    load: AbortHandle,
}

impl StoreProvider {
    /// # Panics
    ///
    /// Panics if no [`Runtime`](crate::core::Runtime) exists on the current thread.
    pub fn activate(source: impl StaticSource + 'static, config: &StoreConfig) -> Self {
        let store = Store::new(config.initial_search.clone());
        let status = State::new(LoadStatus::Loading);
        let (load, registration) = AbortHandle::new_pair();
        let path = config.resource_path.clone();
        let target = store.downgrade();
        let status_target = status.clone();
        spawn_action_async(move |aac| async move {
            match Abortable::new(fetch_records(&source, &path), registration).await {
                Ok(result) => {
                    aac.call(|ac| apply_load(result, &path, &target, &status_target, ac))
                }
                Err(_) => debug!("load of `{path}` cancelled"),
            }
        });
        Self {
            store,
            status,
            load,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn load_status(&self, sc: &mut SignalContext) -> LoadStatus {
        self.status.get(sc)
    }
}

impl Drop for StoreProvider {
    fn drop(&mut self) {
        self.load.abort();
        debug!("store provider dropped");
    }
}

async fn fetch_records(source: &impl StaticSource, path: &str) -> Result<Vec<Record>, LoadError> {
    let bytes = source.fetch(path).await.map_err(|source| LoadError::Fetch {
        path: path.to_string(),
        source,
    })?;
    parse_records(&bytes).map_err(|source| LoadError::Parse {
        path: path.to_string(),
        source,
    })
}

fn apply_load(
    result: Result<Vec<Record>, LoadError>,
    path: &str,
    target: &WeakStore,
    status: &State<LoadStatus>,
    ac: &mut ActionContext,
) {
    match result {
        Ok(records) => {
            let Some(store) = target.upgrade() else {
                debug!("discarding `{path}`: store is gone");
                return;
            };
            let count = records.len();
            store.replace_dataset(records, ac);
            info!("loaded {count} records from `{path}`");
            status.set(LoadStatus::Loaded { count }, ac);
        }
        Err(e) => {
            warn!("{e}");
            status.set(LoadStatus::Failed(Rc::new(e)), ac);
        }
    }
}
