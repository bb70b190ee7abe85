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

use mlua::Lua;
use thicket_common::{ThingId, Value};

use super::ScriptError;
use super::proxy::ThingProxy;

/// Nesting deeper than this is refused, which also stops self-referencing tables.
const MAX_DEPTH: usize = 32;

/// Everything that may cross into or out of a program: property values, plus references to
/// things (which cross as `ThingProxy` handles, never as the things themselves).
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(BTreeMap<String, ScriptValue>),
    Thing(ThingId),
}

impl ScriptValue {
    pub fn to_lua(&self, lua: &Lua) -> Result<mlua::Value, ScriptError> {
        let marshal = |e: mlua::Error| ScriptError::Marshal(e.to_string());
        Ok(match self {
            ScriptValue::Null => mlua::Value::Nil,
            ScriptValue::Bool(b) => mlua::Value::Boolean(*b),
            ScriptValue::Int(i) => mlua::Value::Integer(*i),
            ScriptValue::Float(f) => mlua::Value::Number(*f),
            ScriptValue::Str(s) => mlua::Value::String(lua.create_string(s).map_err(marshal)?),
            ScriptValue::Map(m) => {
                let table = lua.create_table().map_err(marshal)?;
                for (k, v) in m {
                    table.raw_set(k.as_str(), v.to_lua(lua)?).map_err(marshal)?;
                }
                mlua::Value::Table(table)
            }
            ScriptValue::Thing(id) => mlua::Value::UserData(
                lua.create_userdata(ThingProxy { id: *id })
                    .map_err(marshal)?,
            ),
        })
    }

    pub fn from_lua(value: mlua::Value) -> Result<ScriptValue, ScriptError> {
        Self::from_lua_at(value, 0)
    }

    fn from_lua_at(value: mlua::Value, depth: usize) -> Result<ScriptValue, ScriptError> {
        if depth > MAX_DEPTH {
            return Err(ScriptError::Marshal("table nested too deeply".to_string()));
        }
        let marshal = |e: mlua::Error| ScriptError::Marshal(e.to_string());
        Ok(match value {
            mlua::Value::Nil => ScriptValue::Null,
            mlua::Value::Boolean(b) => ScriptValue::Bool(b),
            mlua::Value::Integer(i) => ScriptValue::Int(i),
            mlua::Value::Number(f) => ScriptValue::Float(f),
            mlua::Value::String(s) => ScriptValue::Str(s.to_str().map_err(marshal)?.to_string()),
            mlua::Value::Table(t) => {
                let mut map = BTreeMap::new();
                for pair in t.pairs::<mlua::Value, mlua::Value>() {
                    let (k, v) = pair.map_err(marshal)?;
                    let key = match k {
                        mlua::Value::String(s) => s.to_str().map_err(marshal)?.to_string(),
                        mlua::Value::Integer(i) => i.to_string(),
                        other => {
                            return Err(ScriptError::Marshal(format!(
                                "{} keys are not supported",
                                other.type_name()
                            )));
                        }
                    };
                    map.insert(key, Self::from_lua_at(v, depth + 1)?);
                }
                ScriptValue::Map(map)
            }
            mlua::Value::UserData(ud) => {
                let proxy = ud.borrow::<ThingProxy>().map_err(|_| {
                    ScriptError::Marshal("userdata is not a thing".to_string())
                })?;
                ScriptValue::Thing(proxy.id)
            }
            other => {
                return Err(ScriptError::Marshal(format!(
                    "{} values are not supported",
                    other.type_name()
                )));
            }
        })
    }
}

impl From<&Value> for ScriptValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(b) => ScriptValue::Bool(*b),
            Value::Int(i) => ScriptValue::Int(*i),
            Value::Float(f) => ScriptValue::Float(*f),
            Value::Str(s) => ScriptValue::Str(s.clone()),
            Value::Map(m) => {
                ScriptValue::Map(m.iter().map(|(k, v)| (k.clone(), v.into())).collect())
            }
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::Str(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::Str(s)
    }
}

impl From<ThingId> for ScriptValue {
    fn from(id: ThingId) -> Self {
        ScriptValue::Thing(id)
    }
}
