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

//! Editing things on behalf of a player: property table, program, access lists, and the
//! handful of descriptive details. Each flow checks the actor's rights, then applies its change
//! to the current cached thing through `World::update_thing`.

use std::collections::BTreeMap;
use std::sync::Arc;

use thicket_common::{ThingId, ThingType, Value};
use thiserror::Error;
use tracing::info;

use crate::softcode::{Program, ScriptValue};
use crate::thing::{DESCRIPTION, GLANCE, PRONOUNS, Thing};
use crate::world::{World, WorldError};

/// Run on a thing right after its program has been replaced.
pub const PROGRAMMED_HOOK: &str = "Programmed";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("You don't have permission to do that.")]
    AccessDenied,
    #[error("There is no thing {0}.")]
    NoSuchThing(ThingId),
    #[error("That isn't a valid value: {0}")]
    BadValue(String),
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Merge `source` into `target`. Maps merge recursively; anything else replaces.
pub fn merge_map_into(source: &BTreeMap<String, Value>, target: &mut BTreeMap<String, Value>) {
    for (key, value) in source {
        if let Value::Map(source) = value {
            if let Some(Value::Map(target)) = target.get_mut(key) {
                merge_map_into(source, target);
                continue;
            }
        }
        target.insert(key.clone(), value.clone());
    }
}

/// Delete from `target` every key named in `source`. A map in `source` deletes within the
/// corresponding map in `target` rather than the whole entry.
pub fn delete_map_from(source: &BTreeMap<String, Value>, target: &mut BTreeMap<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Map(source) => {
                if let Some(Value::Map(target)) = target.get_mut(key) {
                    delete_map_from(source, target);
                }
            }
            _ => {
                target.remove(key);
            }
        }
    }
}

fn editable(world: &World, actor: &Thing, id: ThingId) -> Result<Arc<Thing>, EditError> {
    let thing = world.thing_for_id(id).ok_or(EditError::NoSuchThing(id))?;
    if !thing.editable_by(actor) {
        return Err(EditError::AccessDenied);
    }
    Ok(thing)
}

fn owned(world: &World, actor: &Thing, id: ThingId) -> Result<Arc<Thing>, EditError> {
    let thing = world.thing_for_id(id).ok_or(EditError::NoSuchThing(id))?;
    if !thing.owned_by_id(actor.id) {
        return Err(EditError::AccessDenied);
    }
    Ok(thing)
}

/// Apply `updates` then `deletes` to the property table.
pub fn update_table(
    world: &World,
    actor: &Thing,
    id: ThingId,
    updates: &BTreeMap<String, Value>,
    deletes: &BTreeMap<String, Value>,
) -> Result<Arc<Thing>, EditError> {
    editable(world, actor, id)?;
    Ok(world.update_thing(id, |thing| {
        merge_map_into(updates, &mut thing.table);
        delete_map_from(deletes, &mut thing.table);
    })?)
}

/// Parse both sides as JSON objects, then `update_table`.
pub fn update_table_json(
    world: &World,
    actor: &Thing,
    id: ThingId,
    updates: &str,
    deletes: &str,
) -> Result<Arc<Thing>, EditError> {
    let as_map = |text: &str| -> Result<BTreeMap<String, Value>, EditError> {
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match Value::parse(text).map_err(|e| EditError::BadValue(e.to_string()))? {
            Value::Map(m) => Ok(m),
            other => Err(EditError::BadValue(format!(
                "expected an object, got {}",
                other.type_name()
            ))),
        }
    };
    update_table(world, actor, id, &as_map(updates)?, &as_map(deletes)?)
}

/// Replace the thing's program wholesale with one compiled from `source`, then give the new
/// program a chance to run its `Programmed` hook. A source that fails to compile is still
/// saved; the returned thing's program carries the error.
pub fn set_program(
    world: &Arc<World>,
    actor: &Thing,
    id: ThingId,
    source: &str,
) -> Result<Arc<Thing>, EditError> {
    let thing = editable(world, actor, id)?;
    // Compiling runs Lua, which must happen outside the cache lock.
    let program = if source.trim().is_empty() {
        None
    } else {
        Some(Arc::new(Program::compile(
            &thing.name,
            source,
            &world.config().scripts,
        )))
    };
    let saved = world.update_thing(id, |thing| thing.program = program)?;
    info!(thing = ?id, actor = ?actor.id, "Program replaced");
    saved.try_to_call(
        world,
        PROGRAMMED_HOOK,
        &[("me", ScriptValue::Thing(actor.id))],
        &[],
    );
    Ok(saved)
}

/// Replace the admin and/or deny lists. Only the owner may.
pub fn set_access(
    world: &World,
    actor: &Thing,
    id: ThingId,
    admins: Option<Vec<ThingId>>,
    denied: Option<Vec<ThingId>>,
) -> Result<Arc<Thing>, EditError> {
    let thing = owned(world, actor, id)?;
    if admins.is_none() && denied.is_none() {
        return Ok(thing);
    }
    Ok(world.update_thing(id, |thing| {
        if let Some(admins) = admins {
            thing.admin_list = admins;
        }
        if let Some(denied) = denied {
            thing.deny_list = denied;
        }
    })?)
}

/// The descriptive details an editor changes together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingDetails {
    pub description: Option<String>,
    /// Players only.
    pub glance: Option<String>,
    /// Players only.
    pub pronouns: Option<String>,
    pub parent: Option<ThingId>,
}

pub fn edit_details(
    world: &World,
    actor: &Thing,
    id: ThingId,
    details: ThingDetails,
) -> Result<Arc<Thing>, EditError> {
    editable(world, actor, id)?;
    if let Some(parent) = details.parent {
        if !parent.is_root() && world.thing_for_id(parent).is_none() {
            return Err(EditError::NoSuchThing(parent));
        }
    }
    Ok(world.update_thing(id, |thing| {
        if let Some(description) = details.description {
            thing
                .table
                .insert(DESCRIPTION.to_string(), Value::Str(description));
        }
        if thing.thing_type == ThingType::Player {
            if let Some(glance) = details.glance {
                thing.table.insert(GLANCE.to_string(), Value::Str(glance));
            }
            if let Some(pronouns) = details.pronouns {
                thing
                    .table
                    .insert(PRONOUNS.to_string(), Value::Str(pronouns));
            }
        }
        if let Some(parent) = details.parent {
            thing.parent = parent;
        }
    })?)
}
