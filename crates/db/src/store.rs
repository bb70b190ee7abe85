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

use thicket_common::{ThingId, ThingType};
use thiserror::Error;

use crate::{StoredThing, ThingRecord};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Thing not found: {0}")]
    NotFound(ThingId),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("Could not encode or decode record: {0}")]
    Encoding(String),
    /// The header row loaded, but the listing of its children did not.
    #[error("Inconsistent load of {0}: {1}")]
    LoadInconsistency(ThingId, String),
}

impl From<fjall::Error> for StoreError {
    fn from(e: fjall::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Encoding(e.to_string())
    }
}

/// Durable storage of things. Every operation either fully succeeds or reports failure; callers
/// never see a half-written thing.
pub trait WorldStore: Send + Sync {
    /// Load a row and the ids of its direct children.
    fn thing_for_id(&self, id: ThingId) -> Result<StoredThing, StoreError>;

    /// Allocate an id and persist a fresh thing under `parent`, with no contents.
    fn create_thing(
        &self,
        name: &str,
        thing_type: ThingType,
        creator: Option<ThingId>,
        parent: ThingId,
    ) -> Result<ThingRecord, StoreError>;

    /// Change only the parent of `id`.
    fn move_thing(&self, id: ThingId, target: ThingId) -> Result<(), StoreError>;

    /// Persist every column of the row.
    fn save_thing(&self, record: &ThingRecord) -> Result<(), StoreError>;

    /// The ids of the direct children of `id`, in arrival order.
    fn children_of(&self, id: ThingId) -> Result<Vec<ThingId>, StoreError>;

    /// Make everything written so far durable.
    fn checkpoint(&self) -> Result<(), StoreError>;
}
