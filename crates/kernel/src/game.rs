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

//! The command loop for one connected player.

use std::sync::Arc;

use flume::Receiver;
use thicket_common::{Session, ThingId, ThingType, Value};
use thicket_db::Account;
use tracing::{debug, info, warn};

use crate::editing::{self, EditError, ThingDetails};
use crate::matching::{find_action, identify};
use crate::softcode::ScriptValue;
use crate::thing::Thing;
use crate::world::{World, WorldError};

pub const LOOKED_HOOK: &str = "Looked";
pub const RUN_HOOK: &str = "Run";

pub const NOTHING_SPECIAL: &str = "You see nothing special.";
pub const NOTHING_HAPPENS: &str = "Nothing happens.";
pub const CANT_USE: &str = "You can't use that.";
pub const GOODBYE: &str = "Goodbye!";

/// Attach `session` to the account's player and run its commands until `quit`, until the input
/// side hangs up, or until a later login replaces the session.
pub fn game_client(
    world: Arc<World>,
    session: Arc<dyn Session>,
    account: &Account,
    input: Receiver<String>,
) -> Result<(), WorldError> {
    let player = world
        .thing_for_id(account.character)
        .ok_or(WorldError::NoSuchThing(account.character))?;
    world.attach_session(player.id, session.clone());
    info!(player = ?player.id, login = %account.login_name, "Player connected");

    let still_attached = || {
        world
            .session_for(player.id)
            .is_some_and(|current| Arc::ptr_eq(&current, &session))
    };

    let client = GameClient {
        world: world.clone(),
        player: player.id,
    };
    client.look("");
    for line in input.iter() {
        if !still_attached() {
            debug!(player = ?player.id, "Session replaced by a newer login");
            break;
        }
        if !client.handle(&line) {
            if let Err(e) = session.disconnect() {
                debug!("Session already gone: {e}");
            }
            break;
        }
    }

    if still_attached() {
        world.detach_session(player.id);
    }
    info!(player = ?player.id, "Player disconnected");
    Ok(())
}

struct GameClient {
    world: Arc<World>,
    player: ThingId,
}

fn parse_id(text: &str) -> Option<ThingId> {
    text.trim()
        .trim_start_matches('#')
        .parse::<i64>()
        .ok()
        .map(ThingId)
}

impl GameClient {
    fn tell(&self, text: &str) {
        self.world.tell(self.player, text);
    }

    /// The player as the cache has it now.
    fn me(&self) -> Option<Arc<Thing>> {
        let me = self.world.thing_for_id(self.player);
        if me.is_none() {
            warn!(player = ?self.player, "Player thing has gone missing");
        }
        me
    }

    fn here_value(me: &Thing) -> ScriptValue {
        if me.parent.is_root() {
            ScriptValue::Null
        } else {
            ScriptValue::Thing(me.parent)
        }
    }

    /// Returns false once the player has quit.
    fn handle(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }
        if let Some(said) = line.strip_prefix('"') {
            self.say(said);
            return true;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let command = word.to_lowercase();
        debug!(player = ?self.player, %command, rest, "Command");

        match command.as_str() {
            "quit" => {
                self.tell(GOODBYE);
                return false;
            }
            "look" | "l" => self.look(rest),
            "say" => self.say(rest),
            "whoami" => self.whoami(),
            "@create" => self.create(rest),
            "@describe" => self.describe(rest),
            "@set" => self.set(rest),
            "@program" => self.program(rest),
            "@deny" => self.deny(rest),
            _ => self.dispatch(&command, rest),
        }
        true
    }

    fn look(&self, rest: &str) {
        let Some(me) = self.me() else {
            return;
        };
        let text = if rest.is_empty() { "here" } else { rest };
        let Some(target) = identify(&self.world, &me, text) else {
            self.tell(&format!("Not sure what you meant by \"{text}\"."));
            return;
        };
        self.tell(&target.name);
        self.tell(target.description().unwrap_or(NOTHING_SPECIAL));
        target.try_to_call(
            &self.world,
            LOOKED_HOOK,
            &[
                ("me", ScriptValue::Thing(me.id)),
                ("here", Self::here_value(&me)),
            ],
            &[],
        );
    }

    fn say(&self, text: &str) {
        let Some(me) = self.me() else {
            return;
        };
        self.tell(&format!("You say, \"{text}\""));
        let Some(here) = self.world.thing_for_id(me.parent) else {
            return;
        };
        let heard = format!("{} says, \"{text}\"", me.name);
        for other in here.contents.iter().filter(|id| **id != me.id) {
            self.world.tell(*other, &heard);
        }
    }

    fn whoami(&self) {
        if let Some(me) = self.me() {
            self.tell(&format!("You are {} ({}).", me.name, me.id));
        }
    }

    /// Any other word: the nearest action answering to it, if the player may use it.
    fn dispatch(&self, command: &str, rest: &str) {
        let Some(me) = self.me() else {
            return;
        };
        let Some(action) = find_action(&self.world, &me, command) else {
            self.tell(&format!("Oops, not sure what you mean by \"{command}\"."));
            return;
        };
        if action.denied_by_id(me.id) {
            self.tell(CANT_USE);
            return;
        }
        let Some(target) = action.target().and_then(|id| self.world.thing_for_id(id)) else {
            debug!(action = ?action.id, "Action has no usable target");
            self.tell(NOTHING_HAPPENS);
            return;
        };

        match target.thing_type {
            ThingType::Program => target.try_to_call(
                &self.world,
                RUN_HOOK,
                &[
                    ("me", ScriptValue::Thing(me.id)),
                    ("here", Self::here_value(&me)),
                    ("action", ScriptValue::Thing(action.id)),
                ],
                &[ScriptValue::from(rest)],
            ),
            ThingType::Action => self.tell(NOTHING_HAPPENS),
            _ => match self.world.move_thing(me.id, target.id) {
                Ok(()) => self.look(""),
                Err(e) => {
                    warn!(player = ?me.id, target = ?target.id, "Move failed: {e}");
                    self.tell(NOTHING_HAPPENS);
                }
            },
        }
    }

    fn report(&self, result: Result<Arc<Thing>, EditError>, done: impl FnOnce(&Thing) -> String) {
        match result {
            Ok(thing) => self.tell(&done(&thing)),
            Err(e) => self.tell(&e.to_string()),
        }
    }

    /// Something nearby to build on. Actions aren't matched by name when looking, so they are
    /// found by the command word they answer to instead.
    fn find_editable(&self, me: &Arc<Thing>, text: &str) -> Option<Arc<Thing>> {
        identify(&self.world, me, text).or_else(|| find_action(&self.world, me, text))
    }

    /// `<target>=<text>`, with the target resolved from the player's point of view.
    fn target_and_text<'a>(
        &self,
        me: &Arc<Thing>,
        rest: &'a str,
    ) -> Option<(Arc<Thing>, &'a str)> {
        let Some((target, text)) = rest.split_once('=') else {
            self.tell("Expected <thing>=<text>.");
            return None;
        };
        let target = target.trim();
        match self.find_editable(me, target) {
            Some(found) => Some((found, text.trim())),
            None => {
                self.tell(&format!("Not sure what you meant by \"{target}\"."));
                None
            }
        }
    }

    fn create(&self, rest: &str) {
        let Some(me) = self.me() else {
            return;
        };
        let Some((type_name, name)) = rest.split_once(char::is_whitespace) else {
            self.tell("Expected @create <type> <name>.");
            return;
        };
        let thing_type = match type_name.parse::<ThingType>() {
            Ok(t) => t,
            Err(e) => {
                self.tell(&e.to_string());
                return;
            }
        };
        match self
            .world
            .create_thing(name.trim(), thing_type, Some(me.id), me.parent)
        {
            Ok(thing) => self.tell(&format!("Created {} ({}).", thing.name, thing.id)),
            Err(e) => {
                warn!(player = ?me.id, "Create failed: {e}");
                self.tell("That couldn't be created.");
            }
        }
    }

    fn describe(&self, rest: &str) {
        let Some(me) = self.me() else {
            return;
        };
        let Some((target, text)) = self.target_and_text(&me, rest) else {
            return;
        };
        let details = ThingDetails {
            description: Some(text.to_string()),
            ..ThingDetails::default()
        };
        self.report(
            editing::edit_details(&self.world, &me, target.id, details),
            |thing| format!("Description of {} set.", thing.name),
        );
    }

    /// `@set <target> <key>=<json>`. Text that isn't JSON is stored as a string.
    fn set(&self, rest: &str) {
        let Some(me) = self.me() else {
            return;
        };
        // The value may itself contain '='; the key may not.
        let Some((target, assignment)) = rest.split_once('=').and_then(|(lhs, value)| {
            let (target, key) = lhs.trim().rsplit_once(char::is_whitespace)?;
            Some((target.trim(), (key.to_string(), value.trim())))
        }) else {
            self.tell("Expected @set <thing> <key>=<value>.");
            return;
        };
        let Some(found) = self.find_editable(&me, target) else {
            self.tell(&format!("Not sure what you meant by \"{target}\"."));
            return;
        };
        let (key, text) = assignment;
        let value = match Value::parse(text) {
            Ok(value) => value,
            Err(thicket_common::ValueError::UnsupportedArray) => {
                self.tell("Lists can't be stored.");
                return;
            }
            Err(_) => Value::from(text),
        };
        let updates = [(key.clone(), value)].into_iter().collect();
        self.report(
            editing::update_table(&self.world, &me, found.id, &updates, &Default::default()),
            |thing| format!("Set {key} on {}.", thing.name),
        );
    }

    fn program(&self, rest: &str) {
        let Some(me) = self.me() else {
            return;
        };
        let Some((target, source)) = self.target_and_text(&me, rest) else {
            return;
        };
        self.report(
            editing::set_program(&self.world, &me, target.id, source),
            |thing| match thing.program.as_ref().and_then(|p| p.compile_error()) {
                Some(e) => format!("Program for {} saved, but {e}.", thing.name),
                None => format!("Program for {} saved.", thing.name),
            },
        );
    }

    fn deny(&self, rest: &str) {
        let Some(me) = self.me() else {
            return;
        };
        let Some((target, who)) = self.target_and_text(&me, rest) else {
            return;
        };
        let Some(denied) = parse_id(who)
            .or_else(|| identify(&self.world, &me, who).map(|thing| thing.id))
        else {
            self.tell(&format!("Not sure who you meant by \"{who}\"."));
            return;
        };
        let mut deny_list = target.deny_list.clone();
        if !deny_list.contains(&denied) {
            deny_list.push(denied);
        }
        self.report(
            editing::set_access(&self.world, &me, target.id, None, Some(deny_list)),
            |thing| format!("{denied} may no longer use {}.", thing.name),
        );
    }
}
