//! In-memory table of outstanding and finished queries.
//!
//! The registry is the only state shared across tasks. One executor task
//! owns each entry's writes for its whole lifetime, so a coarse
//! table-level lock is enough: readers never observe a partially-written
//! status/output pair because every mutation happens under the write
//! guard.
//!
//! Entries are never evicted; they persist for the life of the process.
//! That unbounded growth is a known gap carried over from the system this
//! replaces — [`QueryStore`] exists as a seam so a TTL-evicting store can
//! be injected without touching callers.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::glass::query::Query;

/// Store seam for query lifecycle tracking.
pub trait QueryStore: Send + Sync {
    /// Register a query, returning its id.
    fn create(&self, query: Query) -> String;

    /// Fetch a snapshot of a query.
    ///
    /// `NotFound` here is a normal condition, not a bug: the id may have
    /// been handed to the client before the background task registered the
    /// entry, or the process may have restarted since the id was issued.
    fn get(&self, id: &str) -> Result<Query>;

    /// Apply a mutation to a query atomically with respect to `get`.
    fn update(&self, id: &str, mutate: &mut dyn FnMut(&mut Query)) -> Result<()>;
}

/// The default coarse-locked in-memory store.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<String, Query>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked queries (terminal entries included).
    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryStore for MemoryRegistry {
    fn create(&self, query: Query) -> String {
        let id = query.id.clone();
        self.entries
            .write()
            .expect("registry lock poisoned")
            .insert(id.clone(), query);
        id
    }

    fn get(&self, id: &str) -> Result<Query> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("query", id))
    }

    fn update(&self, id: &str, mutate: &mut dyn FnMut(&mut Query)) -> Result<()> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        let query = entries
            .get_mut(id)
            .ok_or_else(|| Error::not_found("query", id))?;
        mutate(query);
        Ok(())
    }
}
