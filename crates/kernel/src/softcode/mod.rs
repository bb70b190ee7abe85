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

//! Per-thing Lua programs.
//!
//! Each program gets its own interpreter with only the base, string, table and math libraries.
//! There is no io, os, package or module loading. Hooks are plain global functions, looked up
//! by (possibly dotted) name and called with transient globals bound for the duration of the
//! call.

mod marshal;
mod proxy;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use mlua::{Function, HookTriggers, Lua, LuaOptions, StdLib, Table, Variadic, VmState};
use thiserror::Error;
use tracing::{debug, warn};

pub use marshal::ScriptValue;
pub use proxy::ThingProxy;

use crate::config::ScriptConfig;
use crate::world::World;
use proxy::ScriptContext;

/// Globals from the base library that reach outside the sandbox or load code.
const REMOVED_GLOBALS: &[&str] = &[
    "dofile",
    "loadfile",
    "load",
    "loadstring",
    "require",
    "collectgarbage",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("compile failed: {0}")]
    Compile(String),
    #[error("{0}")]
    Runtime(String),
    #[error("{0} is not a function")]
    NotCallable(String),
    #[error("cannot pass value: {0}")]
    Marshal(String),
}

pub struct Program {
    source: String,
    limits: ScriptConfig,
    /// `Err` if the source failed to compile; the program then never runs.
    state: Result<Mutex<Lua>, ScriptError>,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("source_len", &self.source.len())
            .field("compile_error", &self.compile_error())
            .finish()
    }
}

fn new_sandbox(limits: &ScriptConfig) -> mlua::Result<Lua> {
    let lua = Lua::new_with(
        StdLib::STRING | StdLib::TABLE | StdLib::MATH,
        LuaOptions::default(),
    )?;
    lua.set_memory_limit(limits.memory_limit)?;

    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.raw_set(*name, mlua::Value::Nil)?;
    }
    // print goes to the log rather than the server's stdout.
    let print = lua.create_function(|_, args: Variadic<mlua::Value>| {
        let parts: Vec<String> = args
            .iter()
            .map(|v| v.to_string().unwrap_or_else(|_| v.type_name().to_string()))
            .collect();
        debug!("script: {}", parts.join("\t"));
        Ok(())
    })?;
    globals.raw_set("print", print)?;
    Ok(lua)
}

/// Abort the running chunk once `limits.timeout()` has passed, checked every
/// `limits.hook_interval` instructions.
fn arm_deadline(lua: &Lua, limits: &ScriptConfig) {
    let deadline = Instant::now() + limits.timeout();
    let timeout_ms = limits.timeout_ms;
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(limits.hook_interval.max(1)),
        move |_lua, _debug| {
            if Instant::now() >= deadline {
                return Err(mlua::Error::RuntimeError(format!(
                    "program ran longer than {timeout_ms}ms"
                )));
            }
            Ok(VmState::Continue)
        },
    );
}

/// Walk a dotted global path. `None` if any segment is missing.
fn resolve_hook(lua: &Lua, path: &str) -> Result<Option<Function>, ScriptError> {
    let mut table: Table = lua.globals();
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value: mlua::Value = table
            .raw_get(segment)
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;
        let last = segments.peek().is_none();
        match value {
            mlua::Value::Nil => return Ok(None),
            mlua::Value::Function(f) if last => return Ok(Some(f)),
            mlua::Value::Table(t) if !last => table = t,
            _ if last => return Err(ScriptError::NotCallable(path.to_string())),
            // A non-table in the middle of the path: nothing lives below it.
            _ => return Ok(None),
        }
    }
    Ok(None)
}

impl Program {
    /// Compile `source` into a fresh sandbox, running its top-level chunk under the usual limits.
    /// A failure is recorded on the program rather than returned.
    pub fn compile(name: &str, source: &str, limits: &ScriptConfig) -> Program {
        let state = Self::load(name, source, limits).map(Mutex::new);
        if let Err(e) = &state {
            debug!(name, "Program did not compile: {e}");
        }
        Program {
            source: source.to_string(),
            limits: limits.clone(),
            state,
        }
    }

    fn load(name: &str, source: &str, limits: &ScriptConfig) -> Result<Lua, ScriptError> {
        let lua = new_sandbox(limits).map_err(|e| ScriptError::Compile(e.to_string()))?;
        arm_deadline(&lua, limits);
        let result = lua.load(source).set_name(format!("={name}")).exec();
        lua.remove_hook();
        result.map_err(|e| ScriptError::Compile(e.to_string()))?;
        Ok(lua)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn compile_error(&self) -> Option<&ScriptError> {
        self.state.as_ref().err()
    }

    pub fn is_runnable(&self) -> bool {
        self.state.is_ok()
    }

    /// Call the hook at `path`, if the program defines it.
    ///
    /// Each `env` entry is bound as a global for the duration of the call. Afterwards every one
    /// of those globals is put back to what it was before, whatever the outcome. A missing hook
    /// is a successful no-op, as is any call on a program that failed to compile.
    pub fn try_to_call(
        &self,
        world: &Arc<World>,
        path: &str,
        env: &[(&str, ScriptValue)],
        args: &[ScriptValue],
    ) -> Result<(), ScriptError> {
        let Ok(lua) = &self.state else {
            return Ok(());
        };
        let lua = lua.lock().unwrap();
        let Some(function) = resolve_hook(&lua, path)? else {
            return Ok(());
        };

        let globals = lua.globals();
        let mut saved = Vec::with_capacity(env.len());
        for (key, _) in env {
            let previous: mlua::Value = globals.raw_get(*key).unwrap_or(mlua::Value::Nil);
            saved.push((*key, previous));
        }

        lua.set_app_data(ScriptContext {
            world: world.clone(),
        });
        let result = self.call_bound(&lua, &globals, function, env, args);
        lua.remove_hook();
        lua.remove_app_data::<ScriptContext>();

        for (key, previous) in saved {
            if let Err(e) = globals.raw_set(key, previous) {
                warn!(key, "Could not unbind script global: {e}");
            }
        }
        result
    }

    fn call_bound(
        &self,
        lua: &Lua,
        globals: &Table,
        function: Function,
        env: &[(&str, ScriptValue)],
        args: &[ScriptValue],
    ) -> Result<(), ScriptError> {
        for (key, value) in env {
            let value = value.to_lua(lua)?;
            globals
                .raw_set(*key, value)
                .map_err(|e| ScriptError::Runtime(e.to_string()))?;
        }
        let args = args
            .iter()
            .map(|a| a.to_lua(lua))
            .collect::<Result<mlua::MultiValue, _>>()?;

        arm_deadline(lua, &self.limits);
        function
            .call::<()>(args)
            .map_err(|e| ScriptError::Runtime(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thicket_db::{DatabaseConfig, FjallWorldStore};

    use crate::config::Config;

    fn world() -> Arc<World> {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        Arc::new(World::new(Arc::new(store), Config::default()))
    }

    fn compile(source: &str) -> Program {
        Program::compile("test", source, &ScriptConfig::default())
    }

    fn global_is_nil(program: &Program, name: &str) -> bool {
        let lua = program.state.as_ref().unwrap().lock().unwrap();
        matches!(lua.globals().raw_get::<mlua::Value>(name), Ok(mlua::Value::Nil))
    }

    #[test]
    fn compile_failure_is_recorded() {
        let program = compile("function Run(");
        assert!(!program.is_runnable());
        assert!(matches!(
            program.compile_error(),
            Some(ScriptError::Compile(_))
        ));
        // Calls on a broken program are quiet no-ops.
        assert_eq!(program.try_to_call(&world(), "Run", &[], &[]), Ok(()));
    }

    #[test]
    fn top_level_runtime_error_is_a_compile_failure() {
        let program = compile("error('nope')");
        assert!(matches!(
            program.compile_error(),
            Some(ScriptError::Compile(msg)) if msg.contains("nope")
        ));
    }

    #[test]
    fn sandbox_has_no_os_or_io() {
        let program = compile(
            r#"
            function Probe()
                assert(os == nil, "os")
                assert(io == nil, "io")
                assert(package == nil, "package")
                assert(require == nil, "require")
                assert(dofile == nil, "dofile")
                assert(loadfile == nil, "loadfile")
                assert(load == nil, "load")
                assert(string.upper("x") == "X")
                assert(math.floor(2.5) == 2)
                assert(table.concat({"a", "b"}) == "ab")
            end
            function Escape()
                os.execute("true")
            end
            "#,
        );
        assert!(program.is_runnable());
        let world = world();
        assert_eq!(program.try_to_call(&world, "Probe", &[], &[]), Ok(()));
        let err = program
            .try_to_call(&world, "Escape", &[], &[])
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(msg) if msg.contains("os")));
    }

    #[test]
    fn missing_hooks_are_noops() {
        let program = compile("helpers = { greet = function() end }");
        let world = world();
        assert_eq!(program.try_to_call(&world, "Looked", &[], &[]), Ok(()));
        assert_eq!(
            program.try_to_call(&world, "helpers.missing", &[], &[]),
            Ok(())
        );
        assert_eq!(
            program.try_to_call(&world, "helpers.greet.deeper", &[], &[]),
            Ok(())
        );
        assert_eq!(
            program.try_to_call(&world, "helpers.greet", &[], &[]),
            Ok(())
        );
        assert_eq!(
            program.try_to_call(&world, "helpers", &[], &[]),
            Err(ScriptError::NotCallable("helpers".to_string()))
        );
    }

    #[test]
    fn env_is_unbound_after_call() {
        let program = compile(
            r#"
            function Check(expected)
                assert(who == expected, "who")
                seen = who
            end
            function Later()
                assert(who == nil, "who leaked")
            end
            "#,
        );
        let world = world();
        let env = [("who", ScriptValue::from("alice"))];
        assert_eq!(
            program.try_to_call(&world, "Check", &env, &[ScriptValue::from("alice")]),
            Ok(())
        );
        assert!(global_is_nil(&program, "who"));
        assert_eq!(program.try_to_call(&world, "Later", &[], &[]), Ok(()));
        // Globals the script sets itself persist.
        assert!(!global_is_nil(&program, "seen"));
    }

    #[test]
    fn env_is_unbound_after_failure() {
        let program = compile("function Boom() error('boom') end");
        let world = world();
        let env = [("here", ScriptValue::Int(1)), ("me", ScriptValue::Int(2))];
        let err = program.try_to_call(&world, "Boom", &env, &[]).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(msg) if msg.contains("boom")));
        assert!(global_is_nil(&program, "here"));
        assert!(global_is_nil(&program, "me"));
    }

    #[test]
    fn env_restores_shadowed_globals() {
        let program = compile(
            r#"
            me = "mine"
            function Peek(expected) assert(me == expected) end
            "#,
        );
        let world = world();
        program
            .try_to_call(&world, "Peek", &[("me", ScriptValue::Int(7))], &[ScriptValue::Int(7)])
            .unwrap();
        program
            .try_to_call(&world, "Peek", &[], &[ScriptValue::from("mine")])
            .unwrap();
    }

    #[test]
    fn runaway_scripts_are_stopped() {
        let limits = ScriptConfig {
            timeout_ms: 50,
            ..ScriptConfig::default()
        };
        let program = Program::compile("spin", "function Spin() while true do end end", &limits);
        let started = Instant::now();
        let err = program
            .try_to_call(&world(), "Spin", &[], &[])
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(msg) if msg.contains("ran longer")));
        assert!(started.elapsed().as_secs() < 5);

        // And at the top level too.
        let program = Program::compile("spin", "while true do end", &limits);
        assert!(!program.is_runnable());
    }

    #[test]
    fn memory_is_bounded() {
        let limits = ScriptConfig {
            memory_limit: 2 * 1024 * 1024,
            ..ScriptConfig::default()
        };
        let program = Program::compile(
            "hog",
            "function Hog() local t = {} for i = 1, 10000000 do t[i] = string.rep('x', 64) .. i end end",
            &limits,
        );
        assert!(program.is_runnable());
        assert!(program.try_to_call(&world(), "Hog", &[], &[]).is_err());
    }

    #[test]
    fn args_are_marshaled() {
        let program = compile(
            r#"
            function Args(s, i, f, b, n, m)
                assert(s == "text")
                assert(math.type(i) == "integer" and i == 3)
                assert(f == 1.5)
                assert(b == true)
                assert(n == nil)
                assert(m.inner.deep == "yes")
            end
            "#,
        );
        let map = ScriptValue::Map(
            [(
                "inner".to_string(),
                ScriptValue::Map(
                    [("deep".to_string(), ScriptValue::from("yes"))]
                        .into_iter()
                        .collect(),
                ),
            )]
            .into_iter()
            .collect(),
        );
        let args = [
            ScriptValue::from("text"),
            ScriptValue::Int(3),
            ScriptValue::Float(1.5),
            ScriptValue::Bool(true),
            ScriptValue::Null,
            map,
        ];
        assert_eq!(program.try_to_call(&world(), "Args", &[], &args), Ok(()));
    }
}
