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

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use fjall::{Config, Keyspace, PartitionHandle, PersistMode};
use thicket_common::{ThingId, ThingType};
use tracing::{debug, error, info};

use crate::config::TableConfig;
use crate::{DatabaseConfig, StoreError, StoredThing, ThingRecord, WorldStore};

const THING_ID_SEQUENCE: &str = "thing_id_sequence";
const ARRIVAL_SEQUENCE: &str = "arrival_sequence";
const FIRST_THING_ID: i64 = 1;

/// Things stored in a fjall keyspace.
///
/// Partitions:
///  - `things`: id -> JSON `ThingRecord`
///  - `contents`: parent id ++ child id -> arrival sequence. Prefix-scanned to list children.
///  - `sequences`: next thing id, next arrival number
///  - `accounts`: login name -> JSON `Account`
///
/// Every mutation that touches both a row and the contents index goes through one write batch.
pub struct FjallWorldStore {
    pub(crate) inner: Mutex<FjallInner>,
    /// Login names held by an in-progress account creation. Locked before `inner`.
    pub(crate) reserved_logins: Mutex<HashSet<String>>,
}

pub(crate) struct FjallInner {
    _tmpdir: Option<tempfile::TempDir>,
    pub(crate) keyspace: Keyspace,
    things: PartitionHandle,
    contents: PartitionHandle,
    sequences: PartitionHandle,
    pub(crate) accounts: PartitionHandle,
    next_id: i64,
    next_arrival: u64,
    pub(crate) sync_writes: bool,
}

fn contents_key(parent: ThingId, child: ThingId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..8].copy_from_slice(&parent.to_key());
    key[8..16].copy_from_slice(&child.to_key());
    key
}

fn read_sequence(partition: &PartitionHandle, name: &str) -> Result<Option<[u8; 8]>, StoreError> {
    let Some(bytes) = partition.get(name)? else {
        return Ok(None);
    };
    let bytes: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
        StoreError::Encoding(format!("sequence {name} has a malformed value"))
    })?;
    Ok(Some(bytes))
}

impl FjallWorldStore {
    /// Open (or create) the store at `path`, or in a temporary directory if no path is given.
    /// Also returns whether the keyspace was freshly created.
    pub fn open(path: Option<&Path>, config: &DatabaseConfig) -> Result<(Self, bool), StoreError> {
        let (tmpdir, path) = match path {
            Some(path) => (None, path.to_path_buf()),
            None => {
                let tmpdir = tempfile::TempDir::new()
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
                let path = tmpdir.path().to_path_buf();
                (Some(tmpdir), path)
            }
        };

        info!("Opening world database at {:?}", path);
        let keyspace = Config::new(&path).open()?;
        let fresh = keyspace.partition_count() == 0;

        let things =
            keyspace.open_partition("things", TableConfig::partition_options(&config.things))?;
        let contents = keyspace
            .open_partition("contents", TableConfig::partition_options(&config.contents))?;
        let accounts = keyspace
            .open_partition("accounts", TableConfig::partition_options(&config.accounts))?;
        let sequences = keyspace.open_partition("sequences", Default::default())?;

        let next_id = read_sequence(&sequences, THING_ID_SEQUENCE)?
            .map(i64::from_be_bytes)
            .unwrap_or(FIRST_THING_ID);
        let next_arrival = read_sequence(&sequences, ARRIVAL_SEQUENCE)?
            .map(u64::from_be_bytes)
            .unwrap_or(0);
        debug!(next_id, next_arrival, fresh, "World database open");

        let inner = FjallInner {
            _tmpdir: tmpdir,
            keyspace,
            things,
            contents,
            sequences,
            accounts,
            next_id,
            next_arrival,
            sync_writes: config.sync_writes,
        };
        Ok((
            Self {
                inner: Mutex::new(inner),
                reserved_logins: Mutex::new(HashSet::new()),
            },
            fresh,
        ))
    }
}

impl FjallInner {
    fn load_record(&self, id: ThingId) -> Result<ThingRecord, StoreError> {
        let Some(bytes) = self.things.get(id.to_key())? else {
            return Err(StoreError::NotFound(id));
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn children_of(&self, id: ThingId) -> Result<Vec<ThingId>, StoreError> {
        let mut children = vec![];
        for entry in self.contents.prefix(id.to_key()) {
            let (key, value) = entry?;
            let child = ThingId::from_key(&key[8..])
                .ok_or_else(|| StoreError::Encoding("malformed contents key".to_string()))?;
            let arrival: [u8; 8] = value
                .as_ref()
                .try_into()
                .map_err(|_| StoreError::Encoding("malformed contents entry".to_string()))?;
            children.push((u64::from_be_bytes(arrival), child));
        }
        children.sort();
        Ok(children.into_iter().map(|(_, child)| child).collect())
    }

    /// Claim the next arrival number, for ordering a child within its new parent.
    fn take_arrival(&mut self) -> u64 {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        arrival
    }

    fn sync(&self) -> Result<(), StoreError> {
        if self.sync_writes {
            self.keyspace.persist(PersistMode::SyncAll)?;
        }
        Ok(())
    }
}

impl WorldStore for FjallWorldStore {
    fn thing_for_id(&self, id: ThingId) -> Result<StoredThing, StoreError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.load_record(id)?;
        let contents = inner.children_of(id).map_err(|e| {
            error!(?id, "Loaded row but could not list its contents: {e}");
            StoreError::LoadInconsistency(id, e.to_string())
        })?;
        Ok(StoredThing { record, contents })
    }

    fn create_thing(
        &self,
        name: &str,
        thing_type: ThingType,
        creator: Option<ThingId>,
        parent: ThingId,
    ) -> Result<ThingRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let id = ThingId(inner.next_id);
        inner.next_id += 1;
        let arrival = inner.take_arrival();
        let record = ThingRecord::new(id, name, thing_type, creator, parent);
        let encoded = serde_json::to_vec(&record)?;

        let mut batch = inner.keyspace.batch();
        batch.insert(&inner.things, id.to_key(), encoded);
        batch.insert(
            &inner.contents,
            contents_key(parent, id),
            arrival.to_be_bytes(),
        );
        batch.insert(
            &inner.sequences,
            THING_ID_SEQUENCE,
            inner.next_id.to_be_bytes(),
        );
        batch.insert(
            &inner.sequences,
            ARRIVAL_SEQUENCE,
            inner.next_arrival.to_be_bytes(),
        );
        batch.commit().inspect_err(|e| {
            error!(?id, name, "Could not persist new thing: {e}");
        })?;
        inner.sync()?;

        debug!(?id, name, ?thing_type, ?parent, "Created thing");
        Ok(record)
    }

    fn move_thing(&self, id: ThingId, target: ThingId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let mut record = inner.load_record(id)?;
        let source = record.parent;
        record.parent = target;
        let encoded = serde_json::to_vec(&record)?;
        let arrival = inner.take_arrival();

        let mut batch = inner.keyspace.batch();
        batch.insert(&inner.things, id.to_key(), encoded);
        batch.remove(&inner.contents, contents_key(source, id));
        batch.insert(
            &inner.contents,
            contents_key(target, id),
            arrival.to_be_bytes(),
        );
        batch.insert(
            &inner.sequences,
            ARRIVAL_SEQUENCE,
            inner.next_arrival.to_be_bytes(),
        );
        batch.commit().inspect_err(|e| {
            error!(?id, ?target, "Could not persist move: {e}");
        })?;
        inner.sync()
    }

    fn save_thing(&self, record: &ThingRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let previous = inner.load_record(record.id)?;
        let encoded = serde_json::to_vec(record)?;

        let mut batch = inner.keyspace.batch();
        batch.insert(&inner.things, record.id.to_key(), encoded);
        if previous.parent != record.parent {
            let arrival = inner.take_arrival();
            batch.remove(&inner.contents, contents_key(previous.parent, record.id));
            batch.insert(
                &inner.contents,
                contents_key(record.parent, record.id),
                arrival.to_be_bytes(),
            );
            batch.insert(
                &inner.sequences,
                ARRIVAL_SEQUENCE,
                inner.next_arrival.to_be_bytes(),
            );
        }
        batch.commit().inspect_err(|e| {
            error!(id = ?record.id, "Could not save thing: {e}");
        })?;
        inner.sync()
    }

    fn children_of(&self, id: ThingId) -> Result<Vec<ThingId>, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.children_of(id)
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use thicket_common::Value;

    fn open(path: &Path) -> (FjallWorldStore, bool) {
        FjallWorldStore::open(Some(path), &DatabaseConfig::default()).unwrap()
    }

    #[test]
    fn open_reopen() {
        let tmpdir = tempfile::tempdir().expect("Unable to create temporary directory");
        {
            let (_store, fresh) = open(tmpdir.path());
            assert!(fresh);
        }
        {
            let (_store, fresh) = open(tmpdir.path());
            assert!(!fresh);
        }
    }

    #[test]
    fn create_then_load() {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        let lobby = store
            .create_thing("Lobby", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let lamp = store
            .create_thing("lamp", ThingType::Regular, Some(ThingId(99)), lobby.id)
            .unwrap();

        let loaded = store.thing_for_id(lobby.id).unwrap();
        assert_eq!(loaded.record, lobby);
        assert_eq!(loaded.contents, vec![lamp.id]);

        let loaded_lamp = store.thing_for_id(lamp.id).unwrap();
        assert_eq!(loaded_lamp.record.owner, Some(ThingId(99)));
        assert_eq!(loaded_lamp.record.creator, Some(ThingId(99)));
        assert!(loaded_lamp.contents.is_empty());
    }

    #[test]
    fn players_have_no_owner() {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        let alice = store
            .create_thing("Alice", ThingType::Player, Some(ThingId(5)), ThingId::ROOT)
            .unwrap();
        assert_eq!(alice.owner, None);
        assert_eq!(alice.creator, None);
    }

    #[test]
    fn missing_thing() {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        assert_eq!(
            store.thing_for_id(ThingId(42)),
            Err(StoreError::NotFound(ThingId(42)))
        );
        assert_eq!(
            store.move_thing(ThingId(42), ThingId::ROOT),
            Err(StoreError::NotFound(ThingId(42)))
        );
    }

    #[test]
    fn contents_keep_arrival_order() {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        let room = store
            .create_thing("room", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let hall = store
            .create_thing("hall", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let a = store
            .create_thing("a", ThingType::Regular, None, room.id)
            .unwrap();
        let b = store
            .create_thing("b", ThingType::Regular, None, hall.id)
            .unwrap();

        // b was created after a, but arrives in the room later still.
        store.move_thing(b.id, room.id).unwrap();
        store.move_thing(a.id, hall.id).unwrap();
        store.move_thing(a.id, room.id).unwrap();
        assert_eq!(store.children_of(room.id).unwrap(), vec![b.id, a.id]);
        assert!(store.children_of(hall.id).unwrap().is_empty());
        assert_eq!(store.thing_for_id(a.id).unwrap().record.parent, room.id);
    }

    #[test]
    fn save_then_reopen() {
        let tmpdir = tempfile::tempdir().expect("Unable to create temporary directory");
        let (lamp_id, room_id);
        {
            let (store, _) = open(tmpdir.path());
            let room = store
                .create_thing("room", ThingType::Place, None, ThingId::ROOT)
                .unwrap();
            let mut lamp = store
                .create_thing("lamp", ThingType::Regular, None, ThingId::ROOT)
                .unwrap();
            lamp.name = "brass lamp".to_string();
            lamp.parent = room.id;
            lamp.deny_list.push(ThingId(7));
            lamp.table
                .insert("description".to_string(), Value::from("It glows."));
            lamp.program = Some("function Run() end".to_string());
            store.save_thing(&lamp).unwrap();
            store.checkpoint().unwrap();
            lamp_id = lamp.id;
            room_id = room.id;
        }
        let (store, _) = open(tmpdir.path());
        let lamp = store.thing_for_id(lamp_id).unwrap().record;
        assert_eq!(lamp.name, "brass lamp");
        assert_eq!(lamp.parent, room_id);
        assert_eq!(lamp.deny_list, vec![ThingId(7)]);
        assert_eq!(
            lamp.table.get("description"),
            Some(&Value::from("It glows."))
        );
        assert_eq!(lamp.program.as_deref(), Some("function Run() end"));
        assert_eq!(store.children_of(room_id).unwrap(), vec![lamp_id]);
        assert!(store.children_of(ThingId::ROOT).unwrap().contains(&room_id));
        assert!(!store.children_of(ThingId::ROOT).unwrap().contains(&lamp_id));
    }

    #[test]
    fn ids_survive_reopen() {
        let tmpdir = tempfile::tempdir().expect("Unable to create temporary directory");
        let first = {
            let (store, _) = open(tmpdir.path());
            store
                .create_thing("one", ThingType::Regular, None, ThingId::ROOT)
                .unwrap()
                .id
        };
        let (store, _) = open(tmpdir.path());
        let second = store
            .create_thing("two", ThingType::Regular, None, ThingId::ROOT)
            .unwrap()
            .id;
        assert!(second > first);
    }
}
