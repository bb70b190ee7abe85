// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The object cache: the single in-process authority over things.
//!
//! Lookups load lazily from the store and memoize. Structural writes (create, move, save) go to
//! the store first and are then applied to the cached copies, all under one coarse lock, so two
//! moves touching the same containers never interleave their splice and append.
//!
//! A given id maps to at most one cached `Arc<Thing>` at a time. Cached things are immutable
//! snapshots; a write replaces the entry. Edits go through `update_thing`, which applies them to
//! the current entry while the lock is held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use thicket_common::{Session, ThingId, ThingType};
use thicket_db::{StoreError, StoredThing, WorldStore};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::thing::Thing;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("No such thing: {0}")]
    NoSuchThing(ThingId),
    #[error("Cannot move {thing} into {target}, it would contain itself")]
    RecursiveMove { thing: ThingId, target: ThingId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Cache {
    things: HashMap<ThingId, Arc<Thing>>,
    /// Bumped on every structural write. A cold load that raced a write is thrown away.
    generation: u64,
}

pub struct World {
    store: Arc<dyn WorldStore>,
    config: Config,
    cache: Mutex<Cache>,
    sessions: RwLock<HashMap<ThingId, Arc<dyn Session>>>,
}

impl World {
    pub fn new(store: Arc<dyn WorldStore>, config: Config) -> Self {
        Self {
            store,
            config,
            cache: Mutex::new(Cache {
                things: HashMap::new(),
                generation: 0,
            }),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up a thing, loading it from the store on first reference.
    ///
    /// `None` for the root, for ids the store doesn't know, and for store failures (which are
    /// logged).
    pub fn thing_for_id(&self, id: ThingId) -> Option<Arc<Thing>> {
        if id.is_root() {
            return None;
        }
        loop {
            let generation = {
                let cache = self.cache.lock().unwrap();
                if let Some(thing) = cache.things.get(&id) {
                    return Some(thing.clone());
                }
                cache.generation
            };

            // Load and compile without holding the lock.
            let stored = match self.store.thing_for_id(id) {
                Ok(stored) => stored,
                Err(StoreError::NotFound(_)) => {
                    debug!(?id, "No such thing");
                    return None;
                }
                Err(e) => {
                    error!(?id, "Could not load thing: {e}");
                    return None;
                }
            };
            let thing = Arc::new(Thing::from_stored(stored, &self.config.scripts));

            let mut cache = self.cache.lock().unwrap();
            // First insert wins; a concurrent loader that got here earlier is adopted.
            if let Some(existing) = cache.things.get(&id) {
                return Some(existing.clone());
            }
            if cache.generation == generation {
                cache.things.insert(id, thing.clone());
                return Some(thing);
            }
            debug!(?id, "Cold load raced a write, reloading");
        }
    }

    /// Create and persist a new thing inside `parent`.
    pub fn create_thing(
        &self,
        name: &str,
        thing_type: ThingType,
        creator: Option<ThingId>,
        parent: ThingId,
    ) -> Result<Arc<Thing>, WorldError> {
        if !parent.is_root() && self.thing_for_id(parent).is_none() {
            return Err(WorldError::NoSuchThing(parent));
        }

        let mut cache = self.cache.lock().unwrap();
        let record = self
            .store
            .create_thing(name, thing_type, creator, parent)
            .inspect_err(|e| error!(name, ?parent, "Could not create thing: {e}"))?;
        let id = record.id;
        let thing = Arc::new(Thing::from_stored(
            StoredThing {
                record,
                contents: vec![],
            },
            &self.config.scripts,
        ));
        cache.things.insert(id, thing.clone());
        if let Some(parent) = cache.things.get_mut(&parent) {
            Arc::make_mut(parent).contents.push(id);
        }
        cache.generation += 1;
        Ok(thing)
    }

    /// Move `id` into `target`.
    ///
    /// The store is written first. Only once that succeeds are the cached containers spliced,
    /// so a failed move leaves the cache as it was. Uncached containers are left alone; their
    /// next load reads the already-updated store.
    pub fn move_thing(&self, id: ThingId, target: ThingId) -> Result<(), WorldError> {
        if self.thing_for_id(id).is_none() {
            return Err(WorldError::NoSuchThing(id));
        }
        if !target.is_root() && self.thing_for_id(target).is_none() {
            return Err(WorldError::NoSuchThing(target));
        }

        let mut cache = self.cache.lock().unwrap();
        self.check_not_recursive(&cache, id, target)?;

        let source = match cache.things.get(&id) {
            Some(thing) => thing.parent,
            None => self.store.thing_for_id(id)?.record.parent,
        };
        self.store
            .move_thing(id, target)
            .inspect_err(|e| error!(?id, ?target, "Could not move thing: {e}"))?;

        Self::splice_out(&mut cache, source, id);
        if let Some(target) = cache.things.get_mut(&target) {
            Arc::make_mut(target).contents.push(id);
        }
        if let Some(thing) = cache.things.get_mut(&id) {
            Arc::make_mut(thing).parent = target;
        }
        cache.generation += 1;
        debug!(?id, ?source, ?target, "Moved thing");
        Ok(())
    }

    /// Persist the columns of `thing` and make it the cached instance.
    ///
    /// Containment is left as the cache has it: the caller's `parent` and `contents` are
    /// ignored, so saving an older copy never undoes a move. Reparent with `move_thing`, or
    /// through `update_thing`.
    pub fn save_thing(&self, thing: Thing) -> Result<Arc<Thing>, WorldError> {
        self.update_thing(thing.id, move |current| {
            let parent = current.parent;
            *current = Thing { parent, ..thing };
        })
    }

    /// Apply `edit` to the current cached instance of `id` and write it through.
    ///
    /// The edit runs under the cache lock, so it always starts from the latest properties and
    /// containment. It must not call back into the world. Changing `parent` moves the thing;
    /// changes to `id` and `contents` are discarded.
    pub fn update_thing<F>(&self, id: ThingId, edit: F) -> Result<Arc<Thing>, WorldError>
    where
        F: FnOnce(&mut Thing),
    {
        // Cold loads compile programs, so they happen before the lock is taken.
        let mut cache = loop {
            if self.thing_for_id(id).is_none() {
                return Err(WorldError::NoSuchThing(id));
            }
            let cache = self.cache.lock().unwrap();
            if cache.things.contains_key(&id) {
                break cache;
            }
            debug!(?id, "Evicted before update, reloading");
        };
        let Some(previous) = cache.things.get(&id).cloned() else {
            return Err(WorldError::NoSuchThing(id));
        };

        let mut edited = (*previous).clone();
        edit(&mut edited);
        edited.id = previous.id;
        edited.contents = previous.contents.clone();

        let reparented = edited.parent != previous.parent;
        if reparented {
            if !edited.parent.is_root() && !self.exists(&cache, edited.parent)? {
                return Err(WorldError::NoSuchThing(edited.parent));
            }
            self.check_not_recursive(&cache, id, edited.parent)?;
        }

        self.store
            .save_thing(&edited.to_record())
            .inspect_err(|e| error!(?id, "Could not save thing: {e}"))?;

        if reparented {
            Self::splice_out(&mut cache, previous.parent, id);
            if let Some(target) = cache.things.get_mut(&edited.parent) {
                Arc::make_mut(target).contents.push(id);
            }
        }
        let edited = Arc::new(edited);
        cache.things.insert(id, edited.clone());
        cache.generation += 1;
        Ok(edited)
    }

    /// Drop a cached thing. The next lookup reloads it from the store.
    pub fn evict(&self, id: ThingId) {
        let mut cache = self.cache.lock().unwrap();
        cache.things.remove(&id);
    }

    pub fn checkpoint(&self) -> Result<(), WorldError> {
        self.store.checkpoint()?;
        Ok(())
    }

    fn splice_out(cache: &mut Cache, container: ThingId, id: ThingId) {
        if let Some(container) = cache.things.get_mut(&container) {
            Arc::make_mut(container).contents.retain(|c| *c != id);
        }
    }

    fn exists(&self, cache: &Cache, id: ThingId) -> Result<bool, WorldError> {
        if cache.things.contains_key(&id) {
            return Ok(true);
        }
        match self.store.thing_for_id(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Refuse moves that would put a thing inside itself. Walks up from `target` through the
    /// cached parents, falling back to the store for anything not cached.
    fn check_not_recursive(
        &self,
        cache: &Cache,
        id: ThingId,
        target: ThingId,
    ) -> Result<(), WorldError> {
        let mut current = target;
        while !current.is_root() {
            if current == id {
                return Err(WorldError::RecursiveMove { thing: id, target });
            }
            current = match cache.things.get(&current) {
                Some(thing) => thing.parent,
                None => match self.store.thing_for_id(current) {
                    Ok(stored) => stored.record.parent,
                    Err(StoreError::NotFound(_)) => break,
                    Err(e) => return Err(e.into()),
                },
            };
        }
        Ok(())
    }

    /// Attach `session` to `id`. A session it replaces is told to disconnect.
    pub fn attach_session(&self, id: ThingId, session: Arc<dyn Session>) {
        let previous = self.sessions.write().unwrap().insert(id, session.clone());
        let Some(previous) = previous else {
            return;
        };
        if Arc::ptr_eq(&previous, &session) {
            return;
        }
        warn!(?id, "Replaced existing session");
        if let Err(e) = previous.disconnect() {
            debug!(?id, "Replaced session already gone: {e}");
        }
    }

    pub fn detach_session(&self, id: ThingId) {
        self.sessions.write().unwrap().remove(&id);
    }

    pub fn session_for(&self, id: ThingId) -> Option<Arc<dyn Session>> {
        self.sessions.read().unwrap().get(&id).cloned()
    }

    /// Send a line to the session attached to `id`, if there is one.
    pub fn tell(&self, id: ThingId, text: &str) {
        let Some(session) = self.session_for(id) else {
            return;
        };
        if let Err(e) = session.send_text(text) {
            warn!(?id, "Could not deliver output: {e}");
        }
    }
}
