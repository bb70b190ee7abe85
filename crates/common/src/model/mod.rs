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

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The identity of a thing in the world. Allocated by the store, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingId(pub i64);

impl ThingId {
    /// The root of the containment tree. Not a real thing; nothing is stored under it.
    pub const ROOT: ThingId = ThingId(0);

    pub fn id(&self) -> i64 {
        self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == 0
    }

    /// Big-endian encoding, so that byte-ordered keys sort the same as ids do.
    pub fn to_key(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(bytes: &[u8]) -> Option<ThingId> {
        let bytes: [u8; 8] = bytes.get(0..8)?.try_into().ok()?;
        Some(ThingId(i64::from_be_bytes(bytes)))
    }
}

impl Display for ThingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i64> for ThingId {
    fn from(id: i64) -> Self {
        ThingId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThingType {
    #[serde(rename = "thing")]
    Regular,
    Place,
    Player,
    /// A trigger: matched by command word, never entered or listed.
    Action,
    Program,
}

impl ThingType {
    pub fn name(&self) -> &'static str {
        match self {
            ThingType::Regular => "thing",
            ThingType::Place => "place",
            ThingType::Player => "player",
            ThingType::Action => "action",
            ThingType::Program => "program",
        }
    }

    pub fn all() -> [ThingType; 5] {
        [
            ThingType::Regular,
            ThingType::Place,
            ThingType::Player,
            ThingType::Action,
            ThingType::Program,
        ]
    }
}

impl Display for ThingType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown thing type: {0}")]
pub struct UnknownThingType(pub String);

impl FromStr for ThingType {
    type Err = UnknownThingType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThingType::all()
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownThingType(s.to_string()))
    }
}
