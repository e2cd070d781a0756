//! Lua sandbox with an allow-list environment and a wall-clock budget.

use std::cell::Cell;
use std::time::{Duration, Instant};

use mlua::{
    FromLuaMulti, Function, HookTriggers, IntoLuaMulti, Lua, LuaOptions, MultiValue,
    Result as LuaResult, StdLib, Table, Value, Variadic, VmState,
};

use super::pattern::{self, PatternFn};
use crate::{ChrolloError, Result};

/// Instructions between two deadline checks.
const CHECK_INTERVAL: u32 = 1000;

/// Pure language builtins copied into every script environment.
const BUILTINS: &[&str] = &[
    "tostring", "tonumber", "type", "pairs", "ipairs", "next", "select", "error", "assert",
];

/// Pure libraries exposed read-only to every script environment.
const LIBRARIES: &[&str] = &["string", "table", "math", "utf8"];

/// Resource limits for script execution.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Wall-clock budget for one script load or one hook call.
    pub max_execution: Duration,
    /// Maximum Lua heap in bytes (0 = unlimited).
    pub max_memory: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_execution: Duration::from_secs(1),
            max_memory: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Budget state of the running call, stored as Lua app data.
#[derive(Default)]
struct Budget {
    expired: Cell<bool>,
}

/// Whether the current call has run past its deadline.
///
/// Anything that catches Lua errors on the host side must re-raise once
/// this is set.
pub(crate) fn budget_expired(lua: &Lua) -> bool {
    lua.app_data_ref::<Budget>()
        .is_some_and(|budget| budget.expired.get())
}

/// Isolated Lua VM that runs scripts and hook handlers under a time budget.
///
/// Scripts never see the VM globals. Each chunk gets an environment table
/// that contains only what [`Sandbox::environment`] puts there.
pub struct Sandbox {
    lua: Lua,
    limits: ResourceLimits,
}

impl Sandbox {
    /// Create a sandbox with default limits.
    pub fn new() -> Result<Self> {
        Self::with_limits(ResourceLimits::default())
    }

    /// Create a sandbox with custom limits.
    pub fn with_limits(limits: ResourceLimits) -> Result<Self> {
        let libs = StdLib::STRING | StdLib::TABLE | StdLib::MATH | StdLib::UTF8;
        let lua = Lua::new_with(libs, LuaOptions::default())
            .map_err(|e| ChrolloError::Script(format!("Failed to create Lua state: {}", e)))?;

        if limits.max_memory > 0 {
            lua.set_memory_limit(limits.max_memory)
                .map_err(|e| ChrolloError::Script(format!("Failed to set memory limit: {}", e)))?;
        }

        lua.set_app_data(Budget::default());
        install_pattern_guard(&lua)
            .map_err(|e| ChrolloError::Script(format!("Failed to guard string library: {}", e)))?;

        Ok(Self { lua, limits })
    }

    /// Build a fresh environment table for one script.
    ///
    /// The table holds the allow-listed builtins, frozen copies of the pure
    /// libraries, `print` routed to `console.log`, and the given named
    /// capabilities. It has no metatable, so missing names are plain `nil`.
    pub fn environment(&self, capabilities: &[(&str, &Table)]) -> Result<Table> {
        self.build_environment(capabilities)
            .map_err(|e| ChrolloError::Script(format!("Failed to build environment: {}", e)))
    }

    fn build_environment(&self, capabilities: &[(&str, &Table)]) -> LuaResult<Table> {
        let globals = self.lua.globals();
        let env = self.lua.create_table()?;

        for name in BUILTINS {
            let value: Value = globals.get(*name)?;
            if !value.is_nil() {
                env.set(*name, value)?;
            }
        }

        env.set("pcall", self.lua.create_function(guarded_pcall)?)?;
        env.set("xpcall", self.lua.create_function(guarded_xpcall)?)?;

        for name in LIBRARIES {
            if let Value::Table(lib) = globals.get::<Value>(*name)? {
                env.set(*name, freeze(&self.lua, lib)?)?;
            }
        }

        for (name, table) in capabilities {
            env.set(*name, (*table).clone())?;
        }

        if let Some((_, console)) = capabilities.iter().find(|(name, _)| *name == "console") {
            let log: Value = console.get("log")?;
            env.set("print", log)?;
        }

        Ok(env)
    }

    /// Run `source` as a chunk against `env`.
    pub fn execute(&self, name: &str, source: &str, env: Table) -> Result<()> {
        self.with_budget(|| {
            self.lua
                .load(source)
                .set_name(format!("={name}"))
                .set_environment(env)
                .exec()
        })
    }

    /// Call a script function (typically a hook handler) under a fresh budget.
    pub fn call<R: FromLuaMulti>(&self, func: &Function, args: impl IntoLuaMulti) -> Result<R> {
        self.with_budget(|| func.call::<R>(args))
    }

    fn with_budget<T>(&self, run: impl FnOnce() -> LuaResult<T>) -> Result<T> {
        let budget = self.limits.max_execution;
        let deadline = Instant::now() + budget;
        set_expired(&self.lua, false);

        self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(CHECK_INTERVAL),
            move |lua, _debug| {
                if Instant::now() >= deadline {
                    set_expired(lua, true);
                    Err(mlua::Error::RuntimeError(format!(
                        "script exceeded its {}ms execution budget",
                        budget.as_millis()
                    )))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        let result = run();
        self.lua.remove_hook();
        let expired = budget_expired(&self.lua);
        set_expired(&self.lua, false);

        result.map_err(|e| {
            if expired {
                ChrolloError::Timeout(budget)
            } else {
                ChrolloError::Script(format_lua_error(&e))
            }
        })
    }

    /// Get the resource limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Get a reference to the underlying Lua instance.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

/// Replace the pattern functions of `string` with cost-checked wrappers,
/// both in the library table and behind string method calls.
fn install_pattern_guard(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();
    let original: Table = globals.get("string")?;

    let guarded = lua.create_table()?;
    for pair in original.clone().pairs::<Value, Value>() {
        let (key, value) = pair?;
        guarded.raw_set(key, value)?;
    }

    for function in PatternFn::ALL {
        let inner: Function = original.get(function.name())?;
        let wrapper = lua.create_function(
            move |_, (subject, pattern, rest): (Value, Value, Variadic<Value>)| {
                pattern::check_call(function, &subject, &pattern, &rest)?;
                inner.call::<MultiValue>((subject, pattern, rest))
            },
        )?;
        guarded.raw_set(function.name(), wrapper)?;
    }

    let set_index: Function = lua
        .load("getmetatable('').__index = ...")
        .set_name("=string-guard")
        .into_function()?;
    set_index.call::<()>(guarded.clone())?;

    globals.set("string", guarded)
}

fn set_expired(lua: &Lua, expired: bool) {
    if let Some(budget) = lua.app_data_ref::<Budget>() {
        budget.expired.set(expired);
    }
}

/// `pcall` that lets an expired budget through.
fn guarded_pcall(lua: &Lua, (func, args): (Function, MultiValue)) -> LuaResult<(bool, MultiValue)> {
    match func.call::<MultiValue>(args) {
        Ok(values) => Ok((true, values)),
        Err(e) if budget_expired(lua) => Err(e),
        Err(e) => Ok((false, error_value(lua, &e)?)),
    }
}

/// `xpcall` that lets an expired budget through.
fn guarded_xpcall(
    lua: &Lua,
    (func, handler, args): (Function, Function, MultiValue),
) -> LuaResult<(bool, MultiValue)> {
    match func.call::<MultiValue>(args) {
        Ok(values) => Ok((true, values)),
        Err(e) if budget_expired(lua) => Err(e),
        Err(e) => {
            let handled = handler.call::<MultiValue>(error_value(lua, &e)?)?;
            Ok((false, handled))
        }
    }
}

fn error_value(lua: &Lua, e: &mlua::Error) -> LuaResult<MultiValue> {
    let message = lua.create_string(format_lua_error(e))?;
    Ok(MultiValue::from_iter([Value::String(message)]))
}

/// Wrap `inner` in a read-only proxy.
///
/// Reads and `pairs` go to `inner`; writes raise; the metatable is locked.
pub(crate) fn freeze(lua: &Lua, inner: Table) -> LuaResult<Table> {
    let proxy = lua.create_table()?;
    let meta = lua.create_table()?;

    let next: Function = lua.globals().get("next")?;
    let pairs_inner = inner.clone();
    let pairs_fn = lua.create_function(move |_, _proxy: Value| {
        Ok((next.clone(), pairs_inner.clone(), Value::Nil))
    })?;

    let newindex_fn = lua.create_function(|_, _args: mlua::MultiValue| -> LuaResult<()> {
        Err(mlua::Error::RuntimeError(
            "attempt to modify read-only table".to_string(),
        ))
    })?;

    meta.set("__index", inner)?;
    meta.set("__newindex", newindex_fn)?;
    meta.set("__pairs", pairs_fn)?;
    meta.set("__metatable", "locked")?;
    proxy.set_metatable(Some(meta));

    Ok(proxy)
}

/// Reduce an mlua error to the message a script author cares about.
pub(crate) fn format_lua_error(e: &mlua::Error) -> String {
    match e {
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
