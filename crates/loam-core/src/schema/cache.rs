use super::Schema;
use crate::{Error, Result};

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

/// Cache key: the record type plus an optional table alias.
pub type CacheKey = (TypeId, Option<String>);

/// Concurrent schema cache with one-shot completion per entry.
///
/// The first caller for a key wins the parse; later callers block on the
/// entry's condition until the parse finishes. A failed parse removes the
/// entry before signalling, so waiters observe the error exactly once and a
/// retry misses.
#[derive(Default)]
pub struct SchemaCache {
    entries: Mutex<HashMap<CacheKey, Arc<Entry>>>,
}

pub struct Entry {
    state: Mutex<EntryState>,
    cond: Condvar,
}

enum EntryState {
    /// Field parse in flight; the schema appears once fields are published
    /// so that relationship resolution can reach in-progress types.
    Parsing(Option<Arc<Schema>>),
    Done(Result<Arc<Schema>, Error>),
}

pub enum Begin {
    /// The caller owns the parse and must publish through the entry.
    Started(Arc<Entry>),
    /// Another caller owns the parse.
    Existing(Arc<Entry>),
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the parse for `key`, or join the in-flight one.
    pub fn begin(&self, key: CacheKey) -> Begin {
        let mut entries = self.entries.lock().expect("schema cache poisoned");
        if let Some(entry) = entries.get(&key) {
            return Begin::Existing(entry.clone());
        }

        let entry = Arc::new(Entry {
            state: Mutex::new(EntryState::Parsing(None)),
            cond: Condvar::new(),
        });
        entries.insert(key, entry.clone());
        Begin::Started(entry)
    }

    /// Publish the parse outcome. On failure the poisoned entry is removed
    /// before waiters wake.
    pub fn finish(&self, key: &CacheKey, entry: &Arc<Entry>, result: Result<Arc<Schema>>) {
        if result.is_err() {
            let mut entries = self.entries.lock().expect("schema cache poisoned");
            entries.remove(key);
        }

        let mut state = entry.state.lock().expect("schema cache entry poisoned");
        *state = EntryState::Done(result);
        entry.cond.notify_all();
    }
}

impl Entry {
    /// Make the schema visible to relationship resolution before its own
    /// relationships exist.
    pub fn publish_partial(&self, schema: Arc<Schema>) {
        let mut state = self.state.lock().expect("schema cache entry poisoned");
        if matches!(*state, EntryState::Parsing(None)) {
            *state = EntryState::Parsing(Some(schema));
        }
        self.cond.notify_all();
    }

    /// Block until the parse completes.
    pub fn wait_done(&self) -> Result<Arc<Schema>> {
        let mut state = self.state.lock().expect("schema cache entry poisoned");
        loop {
            if let EntryState::Done(result) = &*state {
                return result.clone();
            }
            state = self
                .cond
                .wait(state)
                .expect("schema cache entry poisoned");
        }
    }

    /// Take whatever is available: the finished schema, or the partial one
    /// published by an in-flight parse. Blocks only while neither exists.
    pub fn take_available(&self) -> Result<Arc<Schema>> {
        let mut state = self.state.lock().expect("schema cache entry poisoned");
        loop {
            match &*state {
                EntryState::Done(result) => return result.clone(),
                EntryState::Parsing(Some(schema)) => return Ok(schema.clone()),
                EntryState::Parsing(None) => {
                    state = self
                        .cond
                        .wait(state)
                        .expect("schema cache entry poisoned");
                }
            }
        }
    }
}
