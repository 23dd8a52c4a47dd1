//! Id-keyed registry of live service instances

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tracing::{debug, error};

use crate::config::ConfigBlob;
use crate::error::{BridgeError, ErrorCode, Result};

/// Value returned to the host when an instance cannot be created
pub const CREATE_FAILED: i64 = -1;

/// Live instances keyed by the ids handed out to the host
///
/// Ids come from a counter starting at 1 and are never reused.
pub struct HandleRegistry<T> {
    counter: AtomicI64,
    instances: DashMap<i64, T>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(0),
            instances: DashMap::new(),
        }
    }

    /// Build an instance from a configuration blob and register it
    ///
    /// Returns the new id, or [`CREATE_FAILED`] when the blob cannot be read or the constructor
    /// fails; the cause is logged.
    pub fn create<F>(&self, config: &[u8], constructor: F) -> i64
    where
        F: FnOnce(ConfigBlob) -> Result<T>,
    {
        let config = match ConfigBlob::from_bytes(config) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Failed to read config");
                return CREATE_FAILED;
            }
        };
        debug!(?config, "Loaded config");

        match constructor(config) {
            Ok(instance) => self.insert(instance),
            Err(e) => {
                error!(error = %e, "Failed to create instance");
                CREATE_FAILED
            }
        }
    }

    /// Register an already built instance
    pub fn insert(&self, instance: T) -> i64 {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.instances.insert(id, instance);
        id
    }

    /// Run `f` against the instance registered under `id`
    pub fn with<R, F>(&self, id: i64, f: F) -> Result<R>
    where
        F: FnOnce(&T) -> Result<R>,
    {
        match self.instances.get(&id) {
            Some(instance) => f(instance.value()),
            None => Err(BridgeError::domain(
                ErrorCode::ResourceDoesNotExist,
                "Instance not found",
            )),
        }
    }

    /// Remove and drop the instance; unknown ids are ignored
    pub fn destroy(&self, id: i64) -> Option<T> {
        self.instances.remove(&id).map(|(_, instance)| instance)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
