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

//! Finding things by what players type.

use std::sync::Arc;

use thicket_common::{ThingId, ThingType};

use crate::thing::Thing;
use crate::world::World;

/// First non-action thing among `ids` whose name matches `text`. An exact (case-insensitive)
/// name beats a prefix; otherwise the earliest prefix match wins.
fn match_among(world: &World, ids: &[ThingId], text: &str) -> Option<Arc<Thing>> {
    let needle = text.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let candidates: Vec<Arc<Thing>> = ids
        .iter()
        .filter_map(|id| world.thing_for_id(*id))
        .filter(|thing| !thing.is_action())
        .collect();
    if let Some(exact) = candidates
        .iter()
        .find(|thing| thing.name.to_lowercase() == needle)
    {
        return Some(exact.clone());
    }
    candidates
        .into_iter()
        .find(|thing| thing.name.to_lowercase().starts_with(&needle))
}

/// Resolve `text` from `source`'s point of view: `me`, `here`, then something `source` is
/// carrying, then something alongside it.
pub fn identify(world: &World, source: &Thing, text: &str) -> Option<Arc<Thing>> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("me") {
        return world.thing_for_id(source.id);
    }
    let here = world.thing_for_id(source.parent);
    if text.eq_ignore_ascii_case("here") {
        return here;
    }
    if let Some(found) = match_among(world, &source.contents, text) {
        return Some(found);
    }
    let here = here?;
    match_among(world, &here.contents, text)
}

/// Something directly inside `container` named by `text`.
pub fn find_inside(world: &World, container: &Thing, text: &str) -> Option<Arc<Thing>> {
    match_among(world, &container.contents, text.trim())
}

/// The nearest action or program answering to the command `word`: first among what `actor`
/// carries, then in each enclosing container on the way up to the root.
pub fn find_action(world: &World, actor: &Arc<Thing>, word: &str) -> Option<Arc<Thing>> {
    let mut current = Some(actor.clone());
    while let Some(container) = current {
        for id in &container.contents {
            let Some(candidate) = world.thing_for_id(*id) else {
                continue;
            };
            if !matches!(
                candidate.thing_type,
                ThingType::Action | ThingType::Program
            ) {
                continue;
            }
            if candidate.answers_to(word) {
                return Some(candidate);
            }
        }
        current = world.thing_for_id(container.parent);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use thicket_common::Value;
    use thicket_db::{DatabaseConfig, FjallWorldStore};

    fn world() -> World {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        World::new(Arc::new(store), Config::default())
    }

    #[test]
    fn identify_prefers_exact_names() {
        let world = world();
        let room = world
            .create_thing("Room", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let alice = world
            .create_thing("Alice", ThingType::Player, None, room.id)
            .unwrap();
        let lamp_stand = world
            .create_thing("lamp stand", ThingType::Regular, None, room.id)
            .unwrap();
        let lamp = world
            .create_thing("Lamp", ThingType::Regular, None, room.id)
            .unwrap();
        let alice = world.thing_for_id(alice.id).unwrap();

        assert_eq!(identify(&world, &alice, "lamp").unwrap().id, lamp.id);
        assert_eq!(identify(&world, &alice, "lamp s").unwrap().id, lamp_stand.id);
        assert_eq!(identify(&world, &alice, "HERE").unwrap().id, room.id);
        assert_eq!(identify(&world, &alice, "me").unwrap().id, alice.id);
        assert!(identify(&world, &alice, "sofa").is_none());
        assert!(identify(&world, &alice, "").is_none());
    }

    #[test]
    fn carried_things_come_first() {
        let world = world();
        let room = world
            .create_thing("Room", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let alice = world
            .create_thing("Alice", ThingType::Player, None, room.id)
            .unwrap();
        world
            .create_thing("coin", ThingType::Regular, None, room.id)
            .unwrap();
        let mine = world
            .create_thing("coin", ThingType::Regular, None, alice.id)
            .unwrap();
        let alice = world.thing_for_id(alice.id).unwrap();
        assert_eq!(identify(&world, &alice, "coin").unwrap().id, mine.id);
    }

    #[test]
    fn actions_are_not_identified() {
        let world = world();
        let room = world
            .create_thing("Room", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let alice = world
            .create_thing("Alice", ThingType::Player, None, room.id)
            .unwrap();
        world
            .create_thing("north", ThingType::Action, None, room.id)
            .unwrap();
        let alice = world.thing_for_id(alice.id).unwrap();
        assert!(identify(&world, &alice, "north").is_none());
    }

    #[test]
    fn actions_found_up_the_tree() {
        let world = world();
        let building = world
            .create_thing("Building", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let room = world
            .create_thing("Room", ThingType::Place, None, building.id)
            .unwrap();
        let alice = world
            .create_thing("Alice", ThingType::Player, None, room.id)
            .unwrap();
        let out = world
            .create_thing("out", ThingType::Action, None, building.id)
            .unwrap();
        let mut out_edit = (*out).clone();
        out_edit
            .table
            .insert("aliases".to_string(), Value::from("leave;exit"));
        world.save_thing(out_edit).unwrap();
        world
            .create_thing("Leave", ThingType::Regular, None, room.id)
            .unwrap();

        let alice = world.thing_for_id(alice.id).unwrap();
        assert_eq!(find_action(&world, &alice, "OUT").unwrap().id, out.id);
        // The regular thing named "Leave" in the room is not an action.
        assert_eq!(find_action(&world, &alice, "leave").unwrap().id, out.id);
        assert!(find_action(&world, &alice, "dance").is_none());
    }
}
