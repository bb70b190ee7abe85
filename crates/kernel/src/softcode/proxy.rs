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

//! Things as seen from inside a program.
//!
//! A program only ever holds a `ThingProxy`: an id. Every field read or method call resolves
//! the id through the world's cache again, so a proxy never goes stale and never sees more
//! than the cache currently holds.

use std::sync::Arc;

use mlua::{Lua, MetaMethod, UserData, UserDataFields, UserDataMethods, UserDataRef};
use thicket_common::ThingId;
use tracing::debug;

use super::ScriptValue;
use crate::matching;
use crate::pronouns;
use crate::thing::Thing;
use crate::world::World;

/// Set as interpreter app data for the duration of a call.
pub(crate) struct ScriptContext {
    pub(crate) world: Arc<World>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThingProxy {
    pub id: ThingId,
}

fn world(lua: &Lua) -> mlua::Result<Arc<World>> {
    lua.app_data_ref::<ScriptContext>()
        .map(|context| context.world.clone())
        .ok_or_else(|| mlua::Error::RuntimeError("the world is not reachable here".to_string()))
}

fn resolve(lua: &Lua, id: ThingId) -> mlua::Result<(Arc<World>, Arc<Thing>)> {
    let world = world(lua)?;
    let thing = world
        .thing_for_id(id)
        .ok_or_else(|| mlua::Error::RuntimeError(format!("no such thing {id}")))?;
    Ok((world, thing))
}

fn proxy_or_nil(lua: &Lua, thing: Option<Arc<Thing>>) -> mlua::Result<mlua::Value> {
    match thing {
        Some(thing) => Ok(mlua::Value::UserData(
            lua.create_userdata(ThingProxy { id: thing.id })?,
        )),
        None => Ok(mlua::Value::Nil),
    }
}

fn to_lua(lua: &Lua, value: ScriptValue) -> mlua::Result<mlua::Value> {
    value
        .to_lua(lua)
        .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
}

impl UserData for ThingProxy {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("id", |_, this| Ok(this.id.id()));
        fields.add_field_method_get("name", |lua, this| {
            let (_, thing) = resolve(lua, this.id)?;
            Ok(thing.name.clone())
        });
        fields.add_field_method_get("type", |lua, this| {
            let (_, thing) = resolve(lua, this.id)?;
            Ok(thing.thing_type.name())
        });
        fields.add_field_method_get("contents", |lua, this| {
            let (_, thing) = resolve(lua, this.id)?;
            let contents = lua.create_table()?;
            for (i, child) in thing.contents.iter().enumerate() {
                contents.raw_set(i + 1, ThingProxy { id: *child })?;
            }
            Ok(contents)
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("tell", |lua, this, text: String| {
            let world = world(lua)?;
            world.tell(this.id, &text);
            Ok(())
        });
        methods.add_method("moveto", |lua, this, target: UserDataRef<ThingProxy>| {
            let (world, destination) = resolve(lua, target.id)?;
            if destination.is_action() {
                return Ok(false);
            }
            match world.move_thing(this.id, destination.id) {
                Ok(()) => Ok(true),
                Err(e) => {
                    debug!(thing = ?this.id, target = ?destination.id, "Script move refused: {e}");
                    Ok(false)
                }
            }
        });
        methods.add_method("findnear", |lua, this, text: String| {
            let (world, thing) = resolve(lua, this.id)?;
            proxy_or_nil(lua, matching::identify(&world, &thing, &text))
        });
        methods.add_method("findinside", |lua, this, text: String| {
            let (world, thing) = resolve(lua, this.id)?;
            proxy_or_nil(lua, matching::find_inside(&world, &thing, &text))
        });
        methods.add_method("pronounsub", |lua, this, text: String| {
            let (_, thing) = resolve(lua, this.id)?;
            Ok(pronouns::pronoun_sub(&thing, &text))
        });

        // Anything not above is a read-only look into the property table.
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            let (_, thing) = resolve(lua, this.id)?;
            match thing.property(&key) {
                Some(value) => to_lua(lua, ScriptValue::from(value)),
                None => Ok(mlua::Value::Nil),
            }
        });
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: UserDataRef<ThingProxy>| {
            Ok(this.id == other.id)
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ScriptConfig};
    use crate::softcode::{Program, ScriptError};
    use thicket_common::{MockSession, ThingType, Value};
    use thicket_db::{DatabaseConfig, FjallWorldStore};

    struct Fixture {
        world: Arc<World>,
        room: Arc<Thing>,
        lamp: Arc<Thing>,
        alice: Arc<Thing>,
        alice_session: Arc<MockSession>,
    }

    fn fixture() -> Fixture {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        let world = Arc::new(World::new(Arc::new(store), Config::default()));
        let room = world
            .create_thing("Room", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let alice = world
            .create_thing("Alice", ThingType::Player, None, room.id)
            .unwrap();
        let lamp = world
            .create_thing("brass lamp", ThingType::Regular, Some(alice.id), room.id)
            .unwrap();
        let mut edited = (*lamp).clone();
        edited
            .table
            .insert("wattage".to_string(), Value::Int(40));
        let lamp = world.save_thing(edited).unwrap();
        let alice_session = Arc::new(MockSession::new());
        world.attach_session(alice.id, alice_session.clone());
        Fixture {
            world,
            room,
            lamp,
            alice,
            alice_session,
        }
    }

    fn run(f: &Fixture, source: &str) -> Result<(), ScriptError> {
        let program = Program::compile("test", source, &ScriptConfig::default());
        assert!(program.is_runnable(), "{:?}", program.compile_error());
        program.try_to_call(
            &f.world,
            "Run",
            &[
                ("me", ScriptValue::Thing(f.alice.id)),
                ("here", ScriptValue::Thing(f.room.id)),
                ("lamp", ScriptValue::Thing(f.lamp.id)),
            ],
            &[],
        )
    }

    #[test]
    fn fields() {
        let f = fixture();
        run(
            &f,
            r##"
            function Run()
                assert(me.name == "Alice")
                assert(me.type == "player")
                assert(here.type == "place")
                assert(lamp.id > 0)
                local c = here.contents
                assert(#c == 2)
                assert(c[1] == me)
                assert(c[2] == lamp)
                assert(tostring(me) == "#" .. me.id)
            end
            "##,
        )
        .unwrap();
    }

    #[test]
    fn property_fallback_is_read_only() {
        let f = fixture();
        run(
            &f,
            r#"
            function Run()
                assert(lamp.wattage == 40)
                assert(lamp.missing == nil)
            end
            "#,
        )
        .unwrap();
        assert!(run(&f, "function Run() lamp.wattage = 60 end").is_err());
        assert_eq!(
            f.world.thing_for_id(f.lamp.id).unwrap().property("wattage"),
            Some(&Value::Int(40))
        );
    }

    #[test]
    fn tell_reaches_session() {
        let f = fixture();
        run(&f, r#"function Run() me:tell("psst") lamp:tell("nobody home") end"#).unwrap();
        assert_eq!(f.alice_session.received(), vec!["psst"]);
    }

    #[test]
    fn moveto_goes_through_the_world() {
        let f = fixture();
        let closet = f
            .world
            .create_thing("closet", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        let program = Program::compile(
            "mover",
            "function Run(dest) assert(lamp:moveto(dest) == true) end",
            &ScriptConfig::default(),
        );
        program
            .try_to_call(
                &f.world,
                "Run",
                &[("lamp", ScriptValue::Thing(f.lamp.id))],
                &[ScriptValue::Thing(closet.id)],
            )
            .unwrap();
        assert_eq!(
            f.world.thing_for_id(closet.id).unwrap().contents,
            vec![f.lamp.id]
        );
        assert!(!f.world.thing_for_id(f.room.id).unwrap().contents.contains(&f.lamp.id));
    }

    #[test]
    fn moveto_refuses_actions_and_forgeries() {
        let f = fixture();
        let exit = f
            .world
            .create_thing("north", ThingType::Action, None, f.room.id)
            .unwrap();
        let program = Program::compile(
            "mover",
            r#"
            function Run(exit)
                assert(lamp:moveto(exit) == false)
            end
            function Forge()
                lamp:moveto({ id = 1 })
            end
            "#,
            &ScriptConfig::default(),
        );
        let env = [("lamp", ScriptValue::Thing(f.lamp.id))];
        program
            .try_to_call(&f.world, "Run", &env, &[ScriptValue::Thing(exit.id)])
            .unwrap();
        assert!(program.try_to_call(&f.world, "Forge", &env, &[]).is_err());
        assert_eq!(f.world.thing_for_id(f.lamp.id).unwrap().parent, f.room.id);
    }

    #[test]
    fn finders() {
        let f = fixture();
        run(
            &f,
            r#"
            function Run()
                assert(me:findnear("brass") == lamp)
                assert(me:findnear("here") == here)
                assert(me:findnear("me") == me)
                assert(me:findnear("nothing") == nil)
                assert(here:findinside("ali") == me)
                assert(lamp:findinside("ali") == nil)
            end
            "#,
        )
        .unwrap();
    }

    #[test]
    fn proxies_see_later_changes() {
        let f = fixture();
        let program = Program::compile(
            "watcher",
            "function Run(expected) assert(lamp.name == expected) end",
            &ScriptConfig::default(),
        );
        let env = [("lamp", ScriptValue::Thing(f.lamp.id))];
        program
            .try_to_call(&f.world, "Run", &env, &[ScriptValue::from("brass lamp")])
            .unwrap();
        let mut renamed = (*f.world.thing_for_id(f.lamp.id).unwrap()).clone();
        renamed.name = "oil lamp".to_string();
        f.world.save_thing(renamed).unwrap();
        program
            .try_to_call(&f.world, "Run", &env, &[ScriptValue::from("oil lamp")])
            .unwrap();
    }

    #[test]
    fn dangling_proxies_error() {
        let f = fixture();
        let program = Program::compile(
            "ghost",
            "function Run() return ghost.name end",
            &ScriptConfig::default(),
        );
        let err = program
            .try_to_call(&f.world, "Run", &[("ghost", ScriptValue::Thing(ThingId(4242)))], &[])
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(msg) if msg.contains("no such thing #4242")));
    }

    #[test]
    fn pronouns_from_scripts() {
        let f = fixture();
        let mut alice = (*f.alice).clone();
        alice
            .table
            .insert("pronouns".to_string(), Value::from("she"));
        f.world.save_thing(alice).unwrap();
        run(
            &f,
            r#"
            function Run()
                assert(me:pronounsub("%N picks up %p lamp.") == "Alice picks up her lamp.")
            end
            "#,
        )
        .unwrap();
    }
}
