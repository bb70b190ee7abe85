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

//! End to end: a world on disk, players driving it through the command loop.

use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use thicket_common::{MockSession, ThingId, ThingType, Value};
use thicket_db::{Account, AccountStore, DatabaseConfig, FjallWorldStore};
use thicket_kernel::{Config, World, game_client};

fn open(path: &Path) -> (Arc<FjallWorldStore>, Arc<World>) {
    let (store, _) = FjallWorldStore::open(Some(path), &DatabaseConfig::default()).unwrap();
    let store = Arc::new(store);
    let world = Arc::new(World::new(store.clone(), Config::default()));
    (store, world)
}

fn play(world: &Arc<World>, account: &Account, lines: &[&str]) -> Vec<String> {
    let session = Arc::new(MockSession::new());
    let (tx, rx) = flume::unbounded();
    for line in lines {
        tx.send(line.to_string()).unwrap();
    }
    drop(tx);
    game_client(world.clone(), session.clone(), account, rx).unwrap();
    session.received()
}

fn set_property(world: &World, id: ThingId, key: &str, value: Value) {
    let mut thing = (*world.thing_for_id(id).unwrap()).clone();
    thing.table.insert(key.to_string(), value);
    world.save_thing(thing).unwrap();
}

#[test]
fn containment_survives_moves_and_eviction() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let (_, world) = open(dir.path());
    let a = world.create_thing("A", ThingType::Place, None, ThingId::ROOT)?;
    let b = world.create_thing("B", ThingType::Place, None, ThingId::ROOT)?;
    let ball = world.create_thing("ball", ThingType::Regular, None, a.id)?;
    assert_eq!(world.thing_for_id(a.id).unwrap().contents, vec![ball.id]);

    world.move_thing(ball.id, a.id)?;
    world.move_thing(ball.id, b.id)?;
    assert!(world.thing_for_id(a.id).unwrap().contents.is_empty());
    assert_eq!(world.thing_for_id(b.id).unwrap().contents, vec![ball.id]);

    for id in [a.id, b.id, ball.id] {
        world.evict(id);
    }
    assert!(world.thing_for_id(a.id).unwrap().contents.is_empty());
    assert_eq!(world.thing_for_id(b.id).unwrap().contents, vec![ball.id]);
    assert_eq!(world.thing_for_id(ball.id).unwrap().parent, b.id);
    Ok(())
}

#[test]
fn edits_survive_a_restart() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let (lamp_id, program) = {
        let (_, world) = open(dir.path());
        let room = world.create_thing("Room", ThingType::Place, None, ThingId::ROOT)?;
        let lamp = world.create_thing("lamp", ThingType::Regular, None, room.id)?;
        let mut edited = (*lamp).clone();
        edited
            .table
            .insert("description".to_string(), Value::from("Brass."));
        let program = "function Looked() me:tell('warm') end";
        edited.program = Some(Arc::new(thicket_kernel::Program::compile(
            "lamp",
            program,
            &world.config().scripts,
        )));
        world.save_thing(edited)?;
        world.checkpoint()?;
        (lamp.id, program)
    };

    let (_, world) = open(dir.path());
    let lamp = world.thing_for_id(lamp_id).unwrap();
    assert_eq!(lamp.description(), Some("Brass."));
    let reloaded = lamp.program.as_ref().unwrap();
    assert_eq!(reloaded.source(), program);
    assert!(reloaded.is_runnable());
    Ok(())
}

#[test]
fn a_fresh_player_looks_around() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let (store, world) = open(dir.path());
    let lobby = world.create_thing("Lobby", ThingType::Place, None, ThingId::ROOT)?;
    let alice = world.create_thing("Alice", ThingType::Player, None, lobby.id)?;
    let account = store.create_account("alice", "hunter2", alice.id)?;

    assert_eq!(
        play(&world, &account, &["look here"]),
        vec![
            "Lobby",
            "You see nothing special.",
            "Lobby",
            "You see nothing special."
        ]
    );
    assert_eq!(store.account_for_login("Alice", "hunter2")?.character, alice.id);
    Ok(())
}

#[test]
fn programs_without_targets_stay_quiet() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let (store, world) = open(dir.path());
    let lobby = world.create_thing("Lobby", ThingType::Place, None, ThingId::ROOT)?;
    let alice = world.create_thing("Alice", ThingType::Player, None, lobby.id)?;
    let bell = world.create_thing("ring", ThingType::Program, Some(alice.id), lobby.id)?;
    let mut edited = (*bell).clone();
    edited.program = Some(Arc::new(thicket_kernel::Program::compile(
        "ring",
        "function Run() me:tell('ding') end",
        &world.config().scripts,
    )));
    world.save_thing(edited)?;
    let account = store.create_account("alice", "pw", alice.id)?;

    let told = play(&world, &account, &["ring"]);
    assert_eq!(told.last().map(String::as_str), Some("Nothing happens."));
    assert!(!told.iter().any(|line| line == "ding"));
    Ok(())
}

#[test]
fn deny_lists_block_exits() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let (store, world) = open(dir.path());
    let lobby = world.create_thing("Lobby", ThingType::Place, None, ThingId::ROOT)?;
    let vault = world.create_thing("Vault", ThingType::Place, None, ThingId::ROOT)?;
    let alice = world.create_thing("Alice", ThingType::Player, None, lobby.id)?;
    let mallory = world.create_thing("Mallory", ThingType::Player, None, lobby.id)?;
    let door = world.create_thing("door", ThingType::Action, Some(alice.id), lobby.id)?;
    set_property(&world, door.id, "target", Value::Int(vault.id.id()));

    let alice_account = store.create_account("alice", "pw", alice.id)?;
    let mallory_account = store.create_account("mallory", "pw", mallory.id)?;

    let deny = format!("@deny door=#{}", mallory.id.id());
    let told = play(&world, &alice_account, &[deny.as_str()]);
    assert_eq!(
        told.last().unwrap(),
        &format!("{} may no longer use door.", mallory.id)
    );

    let told = play(&world, &mallory_account, &["door"]);
    assert_eq!(told.last().map(String::as_str), Some("You can't use that."));
    assert_eq!(world.thing_for_id(mallory.id).unwrap().parent, lobby.id);

    let told = play(&world, &alice_account, &["door"]);
    assert_eq!(told[told.len() - 2..].to_vec(), vec!["Vault", "You see nothing special."]);
    assert_eq!(world.thing_for_id(alice.id).unwrap().parent, vault.id);
    Ok(())
}

#[test]
fn scripts_move_things_and_talk_back() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let (store, world) = open(dir.path());
    let lobby = world.create_thing("Lobby", ThingType::Place, None, ThingId::ROOT)?;
    let alice = world.create_thing("Alice", ThingType::Player, None, lobby.id)?;
    let account = store.create_account("alice", "pw", alice.id)?;

    let told = play(
        &world,
        &account,
        &[
            "@create place Attic",
            "@create program ladder",
            "@create action climb",
            "@set climb target=4",
            "@program ladder=function Run() local attic = here:findinside('Attic'); me:tell(me:pronounsub('%S climb%%s.')); me:moveto(attic) end",
            "climb",
        ],
    );
    assert_eq!(told.last().map(String::as_str), Some("They climb%s."));

    let attic = world.thing_for_id(ThingId(3)).unwrap();
    assert_eq!(attic.name, "Attic");
    assert_eq!(attic.contents, vec![alice.id]);
    assert!(!world.thing_for_id(lobby.id).unwrap().contents.contains(&alice.id));
    Ok(())
}
