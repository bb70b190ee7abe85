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
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thicket_common::{ThingId, ThingType, Value};
use thicket_db::{StoredThing, ThingRecord};
use tracing::warn;

use crate::config::ScriptConfig;
use crate::softcode::{Program, ScriptValue};
use crate::world::World;

pub const DESCRIPTION: &str = "description";
pub const TARGET: &str = "target";
pub const ALIASES: &str = "aliases";
pub const PRONOUNS: &str = "pronouns";
pub const GLANCE: &str = "glance";

/// A node of the world, as held by the cache.
///
/// Shared as `Arc<Thing>` snapshots. To change one, hand an edit to `World::update_thing`. The
/// attached session, if any, lives in the world's session registry rather than here.
#[derive(Clone)]
pub struct Thing {
    pub id: ThingId,
    pub thing_type: ThingType,
    pub name: String,
    pub creator: Option<ThingId>,
    pub owner: Option<ThingId>,
    pub created: DateTime<Utc>,
    pub superuser: bool,
    pub admin_list: Vec<ThingId>,
    pub allow_list: Vec<ThingId>,
    pub deny_list: Vec<ThingId>,
    pub parent: ThingId,
    pub contents: Vec<ThingId>,
    pub table: BTreeMap<String, Value>,
    pub program: Option<Arc<Program>>,
}

impl std::fmt::Debug for Thing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thing")
            .field("id", &self.id)
            .field("type", &self.thing_type)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("contents", &self.contents)
            .finish_non_exhaustive()
    }
}

impl Thing {
    /// Build the live thing from a stored row, compiling its program if it has one.
    pub fn from_stored(stored: StoredThing, limits: &ScriptConfig) -> Thing {
        let StoredThing { record, contents } = stored;
        let program = record
            .program
            .as_ref()
            .map(|source| Arc::new(Program::compile(&record.name, source, limits)));
        Thing {
            id: record.id,
            thing_type: record.thing_type,
            name: record.name,
            creator: record.creator,
            owner: record.owner,
            created: record.created,
            superuser: record.superuser,
            admin_list: record.admin_list,
            allow_list: record.allow_list,
            deny_list: record.deny_list,
            parent: record.parent,
            contents,
            table: record.table,
            program,
        }
    }

    pub fn to_record(&self) -> ThingRecord {
        ThingRecord {
            id: self.id,
            thing_type: self.thing_type,
            name: self.name.clone(),
            creator: self.creator,
            owner: self.owner,
            created: self.created,
            superuser: self.superuser,
            admin_list: self.admin_list.clone(),
            allow_list: self.allow_list.clone(),
            deny_list: self.deny_list.clone(),
            parent: self.parent,
            table: self.table.clone(),
            program: self.program.as_ref().map(|p| p.source().to_string()),
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.table.get(key)
    }

    pub fn description(&self) -> Option<&str> {
        self.property(DESCRIPTION)
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
    }

    /// The id an action leads to, if it has a usable `target`.
    pub fn target(&self) -> Option<ThingId> {
        let target = self.property(TARGET)?;
        match target.as_int() {
            Some(id) => Some(ThingId(id)),
            None => {
                warn!(
                    thing = ?self.id,
                    "target is a {} rather than an id",
                    target.type_name()
                );
                None
            }
        }
    }

    /// Whether `word` names this thing, by name or by one of its `;`-separated aliases.
    pub fn answers_to(&self, word: &str) -> bool {
        if self.name.eq_ignore_ascii_case(word) {
            return true;
        }
        let Some(aliases) = self.property(ALIASES).and_then(Value::as_str) else {
            return false;
        };
        aliases
            .split(';')
            .map(str::trim)
            .any(|alias| !alias.is_empty() && alias.eq_ignore_ascii_case(word))
    }

    /// Whether this thing is a trigger, which is never looked at or entered.
    pub fn is_action(&self) -> bool {
        self.thing_type == ThingType::Action
    }

    pub fn owned_by_id(&self, id: ThingId) -> bool {
        (self.thing_type == ThingType::Player && self.id == id) || self.owner == Some(id)
    }

    pub fn editable_by_id(&self, id: ThingId, superuser: bool) -> bool {
        superuser || self.owned_by_id(id) || self.admin_list.contains(&id)
    }

    pub fn editable_by(&self, actor: &Thing) -> bool {
        self.editable_by_id(actor.id, actor.superuser)
    }

    pub fn denied_by_id(&self, id: ThingId) -> bool {
        self.deny_list.contains(&id)
    }

    /// Run the named hook of this thing's program, if it has one and implements the hook.
    ///
    /// Failures are reported to this thing's attached session, if any, and otherwise only
    /// logged. Never an error for the caller.
    pub fn try_to_call(
        &self,
        world: &Arc<World>,
        hook: &str,
        env: &[(&str, ScriptValue)],
        args: &[ScriptValue],
    ) {
        let Some(program) = &self.program else {
            return;
        };
        if let Err(e) = program.try_to_call(world, hook, env, args) {
            warn!(thing = ?self.id, hook, "Program failed: {e}");
            world.tell(
                self.id,
                &format!("Error with your program '{}': {}", self.name, e),
            );
        }
    }
}
