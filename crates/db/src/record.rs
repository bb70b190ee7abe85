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

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thicket_common::{ThingId, ThingType, Value};

/// The persisted form of a thing: one row per id.
///
/// Contents are not part of the row. They're derived from the `parent` column of other rows
/// (kept in a separate index) and handed back alongside the row on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingRecord {
    pub id: ThingId,
    #[serde(rename = "type")]
    pub thing_type: ThingType,
    pub name: String,
    pub creator: Option<ThingId>,
    pub owner: Option<ThingId>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default)]
    pub admin_list: Vec<ThingId>,
    #[serde(default)]
    pub allow_list: Vec<ThingId>,
    #[serde(default)]
    pub deny_list: Vec<ThingId>,
    pub parent: ThingId,
    #[serde(default)]
    pub table: BTreeMap<String, Value>,
    /// Script source, compiled by whoever turns this row into a live thing.
    pub program: Option<String>,
}

impl ThingRecord {
    pub fn new(
        id: ThingId,
        name: &str,
        thing_type: ThingType,
        creator: Option<ThingId>,
        parent: ThingId,
    ) -> Self {
        // Players own themselves; everything else is owned by whoever made it.
        let (creator, owner) = match thing_type {
            ThingType::Player => (None, None),
            _ => (creator, creator),
        };
        ThingRecord {
            id,
            thing_type,
            name: name.to_string(),
            creator,
            owner,
            created: Utc::now(),
            superuser: false,
            admin_list: vec![],
            allow_list: vec![],
            deny_list: vec![],
            parent,
            table: BTreeMap::new(),
            program: None,
        }
    }
}

/// A row as loaded, together with the ids of its direct children in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredThing {
    pub record: ThingRecord,
    pub contents: Vec<ThingId>,
}
