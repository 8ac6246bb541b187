//! Space registry: the named atomspaces served by this process.
//!
//! The [`SpaceRegistry`] keeps an insertion-ordered id list (endpoint
//! enumeration, metadata listing) and an id → [`Space`] map (lookup). Both
//! live behind one lock and change together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::atom::AtomSpace;
use crate::error::{HubError, HubResult};
use crate::query;

/// Ids reserved by the metadata routes.
const RESERVED_IDS: &[&str] = &["atomspaces", "atomspace"];

/// One named atomspace.
#[derive(Debug)]
pub struct Space {
    id: String,
    store: Arc<AtomSpace>,
    /// Serializes query execution against `store`.
    exec: Mutex<()>,
}

impl Space {
    fn new(id: String, store: AtomSpace) -> Self {
        Self {
            id,
            store: Arc::new(store),
            exec: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<AtomSpace> {
        &self.store
    }

    /// Run a query against this space, blocking until any other query on the
    /// same space has finished.
    pub fn execute(&self, text: &str, wait: Option<Duration>) -> HubResult<Vec<String>> {
        let _running = self.exec.lock().expect("space exec lock poisoned");
        query::execute(&self.store, text, wait)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    ids: Vec<String>,
    spaces: HashMap<String, Arc<Space>>,
}

/// Owner of every loaded space.
#[derive(Debug, Default)]
pub struct SpaceRegistry {
    inner: RwLock<RegistryInner>,
}

/// Check that `id` can name a space and its `/{id}` endpoint.
pub fn validate_id(id: &str) -> HubResult<()> {
    let invalid = |reason: &str| {
        Err(HubError::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        })
    };
    if id.is_empty() {
        return invalid("id is empty");
    }
    if RESERVED_IDS.contains(&id) {
        return invalid("id is reserved for the metadata routes");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return invalid("only ASCII letters, digits, '-', '_' and '.' are allowed");
    }
    Ok(())
}

impl SpaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `id`. Fails without side effects if `id` is
    /// invalid or already taken.
    pub fn create_space(&self, id: impl Into<String>, store: AtomSpace) -> HubResult<Arc<Space>> {
        let id = id.into();
        validate_id(&id)?;

        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.spaces.contains_key(&id) {
            return Err(HubError::DuplicateId { id });
        }
        let space = Arc::new(Space::new(id.clone(), store));
        inner.ids.push(id.clone());
        inner.spaces.insert(id, Arc::clone(&space));
        Ok(space)
    }

    /// Remove the space named `id`. Returns whether it existed.
    ///
    /// Queries already holding the space finish against it; new lookups miss.
    pub fn remove_space(&self, id: &str) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.spaces.remove(id).is_none() {
            return false;
        }
        inner.ids.retain(|known| known != id);
        true
    }

    /// Look up a space; `None` when absent.
    pub fn get(&self, id: &str) -> Option<Arc<Space>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .spaces
            .get(id)
            .cloned()
    }

    /// Look up a space that a query expects to exist.
    pub fn require(&self, id: &str) -> HubResult<Arc<Space>> {
        self.get(id).ok_or_else(|| HubError::QueryNotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .spaces
            .contains_key(id)
    }

    /// Snapshot of the known ids in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.inner.read().expect("registry lock poisoned").ids.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `id` and run `text` against it.
    ///
    /// The registry lock is released before the query runs.
    pub fn execute(&self, id: &str, text: &str, wait: Option<Duration>) -> HubResult<Vec<String>> {
        self.require(id)?.execute(text, wait)
    }
}
