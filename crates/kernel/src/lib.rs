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

pub use crate::config::{Config, ScriptConfig};
pub use crate::editing::{EditError, ThingDetails};
pub use crate::game::game_client;
pub use crate::softcode::{Program, ScriptError, ScriptValue};
pub use crate::thing::Thing;
pub use crate::world::{World, WorldError};

pub mod config;
pub mod editing;
pub mod game;
pub mod matching;
pub mod pronouns;
pub mod softcode;
pub mod thing;
pub mod world;
