//! Chrollo API for Lua scripts.
//!
//! Builds the frozen `chrollo` table and the `console` shim. Every function
//! closes over one [`RuntimeState`]; a new runtime needs a new surface.

use std::rc::Rc;

use mlua::{Function, Lua, LuaSerdeExt, Result as LuaResult, Table, Value, Variadic};
use rand::Rng;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::faker::build_faker_table;
use super::runtime::RuntimeState;
use super::sandbox::{budget_expired, format_lua_error, freeze};
use super::types::TestResult;
use crate::hooks::HookPhase;
use crate::notify::ConsoleLevel;
use crate::protocol::now_millis;
use crate::variables::Scope;

/// Alphabet for `utils.randomId`.
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const DEFAULT_ID_SIZE: usize = 21;

/// Largest id `utils.randomId` will generate.
pub const MAX_ID_SIZE: usize = 1024;

/// Functions on each variable scope, also used for the deprecated aliases.
const SCOPE_FUNCTIONS: &[&str] = &["get", "set", "unset", "all", "clear"];

/// Which optional namespaces the surface exposes.
#[derive(Debug, Clone)]
pub struct ApiOptions {
    /// Expose `chrollo.test` (test-running context only).
    pub test_api: bool,
    /// Expose `chrollo.faker`.
    pub faker: bool,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            test_api: false,
            faker: true,
        }
    }
}

/// The `chrollo` and `console` tables handed to every script.
pub struct ApiSurface {
    chrollo: Table,
    console: Table,
}

impl ApiSurface {
    /// Build the surface bound to `runtime`.
    pub fn build(lua: &Lua, runtime: &Rc<RuntimeState>, options: &ApiOptions) -> LuaResult<Self> {
        let chrollo = lua.create_table()?;

        chrollo.set("stomp", register_stomp(lua, runtime)?)?;
        chrollo.set("variables", register_variables(lua, runtime)?)?;
        chrollo.set("request", register_request(lua, runtime)?)?;
        chrollo.set("utils", register_utils(lua)?)?;

        if options.test_api {
            chrollo.set("test", register_test(lua, runtime)?)?;
        }
        if options.faker {
            let faker = build_faker_table(lua, runtime.generator())?;
            chrollo.set("faker", freeze(lua, faker)?)?;
        }

        Ok(Self {
            chrollo: freeze(lua, chrollo)?,
            console: register_console(lua, runtime)?,
        })
    }

    pub fn chrollo(&self) -> &Table {
        &self.chrollo
    }

    pub fn console(&self) -> &Table {
        &self.console
    }

    /// Named tables injected into a script environment.
    pub fn capabilities(&self) -> [(&str, &Table); 2] {
        [("chrollo", &self.chrollo), ("console", &self.console)]
    }
}

/// `chrollo.stomp.on*` registration functions.
fn register_stomp(lua: &Lua, runtime: &Rc<RuntimeState>) -> LuaResult<Table> {
    let stomp = lua.create_table()?;

    for phase in HookPhase::ALL {
        let rt = Rc::clone(runtime);
        let register_fn = lua.create_function(move |_, handler: Function| {
            rt.hooks_mut().register(phase, handler);
            debug!(%phase, "hook registered");
            Ok(())
        })?;
        stomp.set(phase.api_name(), register_fn)?;
    }

    freeze(lua, stomp)
}

/// `chrollo.variables` with one sub-table per scope plus deprecated aliases.
fn register_variables(lua: &Lua, runtime: &Rc<RuntimeState>) -> LuaResult<Table> {
    let variables = lua.create_table()?;

    let globals = scope_functions(lua, runtime, Scope::Global)?;
    let environment = scope_functions(lua, runtime, Scope::Environment)?;
    let local = scope_functions(lua, runtime, Scope::Local)?;

    // Unscoped aliases forward to `globals`.
    for name in SCOPE_FUNCTIONS {
        let target: Function = globals.get(*name)?;
        let alias = *name;
        let alias_fn = lua.create_function(move |_, args: mlua::MultiValue| {
            debug!(function = alias, "deprecated chrollo.variables alias; use chrollo.variables.globals");
            target.call::<mlua::MultiValue>(args)
        })?;
        variables.set(*name, alias_fn)?;
    }

    let local = freeze(lua, local)?;
    variables.set("globals", freeze(lua, globals)?)?;
    variables.set("environment", freeze(lua, environment)?)?;
    // `local` is a Lua keyword, so `locals` is the dot-accessible name.
    variables.set("local", local.clone())?;
    variables.set("locals", local)?;

    freeze(lua, variables)
}

fn scope_functions(lua: &Lua, runtime: &Rc<RuntimeState>, scope: Scope) -> LuaResult<Table> {
    let table = lua.create_table()?;

    let rt = Rc::clone(runtime);
    table.set(
        "get",
        lua.create_function(move |lua, key: String| {
            let value = rt.variables().scope(scope).get(&key).cloned();
            match value {
                Some(value) => lua.to_value(&value),
                None => Ok(Value::Nil),
            }
        })?,
    )?;

    let rt = Rc::clone(runtime);
    table.set(
        "set",
        lua.create_function(move |lua, (key, value): (String, Value)| {
            if value.is_nil() {
                rt.variables_mut().scope_mut(scope).unset(&key);
                return Ok(());
            }
            let value: JsonValue = lua.from_value(value)?;
            rt.variables_mut().scope_mut(scope).set(key, value);
            Ok(())
        })?,
    )?;

    let rt = Rc::clone(runtime);
    table.set(
        "unset",
        lua.create_function(move |_, key: String| {
            rt.variables_mut().scope_mut(scope).unset(&key);
            Ok(())
        })?,
    )?;

    let rt = Rc::clone(runtime);
    table.set(
        "all",
        lua.create_function(move |lua, ()| {
            let snapshot = rt.variables().scope(scope).all();
            let table = lua.create_table()?;
            for (key, value) in snapshot {
                table.set(key, lua.to_value(&value)?)?;
            }
            Ok(table)
        })?,
    )?;

    let rt = Rc::clone(runtime);
    table.set(
        "clear",
        lua.create_function(move |_, ()| {
            rt.variables_mut().scope_mut(scope).clear();
            Ok(())
        })?,
    )?;

    Ok(table)
}

/// `chrollo.request` correlation functions.
fn register_request(lua: &Lua, runtime: &Rc<RuntimeState>) -> LuaResult<Table> {
    let request = lua.create_table()?;

    let rt = Rc::clone(runtime);
    request.set(
        "setRequestKey",
        lua.create_function(move |_, key: String| {
            rt.tracker_mut().set_request_key(&key);
            Ok(())
        })?,
    )?;

    let rt = Rc::clone(runtime);
    request.set(
        "resolveRequestKey",
        lua.create_function(move |_, key: String| {
            rt.tracker_mut().resolve_request_key(&key);
            Ok(())
        })?,
    )?;

    freeze(lua, request)
}

/// `chrollo.utils` helpers.
fn register_utils(lua: &Lua) -> LuaResult<Table> {
    let utils = lua.create_table()?;

    let random_id_fn = lua.create_function(|_, size: Option<usize>| {
        if size.is_some_and(|size| size > MAX_ID_SIZE) {
            return Err(mlua::Error::RuntimeError(format!(
                "utils.randomId: size must be at most {}",
                MAX_ID_SIZE
            )));
        }
        Ok(random_id(size))
    })?;
    utils.set("randomId", random_id_fn)?;

    let now_fn = lua.create_function(|_, ()| Ok(now_millis()))?;
    utils.set("now", now_fn)?;

    freeze(lua, utils)
}

/// URL-safe random id, 21 characters unless `size` says otherwise.
pub fn random_id(size: Option<usize>) -> String {
    let size = size.unwrap_or(DEFAULT_ID_SIZE);
    let mut rng = rand::rng();
    (0..size)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// `chrollo.test` assertion recording.
fn register_test(lua: &Lua, runtime: &Rc<RuntimeState>) -> LuaResult<Table> {
    let test = lua.create_table()?;

    let rt = Rc::clone(runtime);
    let test_fn = lua.create_function(move |lua, (name, body): (String, Function)| {
        let (passed, error) = match body.call::<()>(()) {
            Ok(()) => (true, None),
            Err(e) if budget_expired(lua) => return Err(e),
            Err(e) => (false, Some(format_lua_error(&e))),
        };
        debug!(test = %name, passed, "test recorded");
        rt.record_test(TestResult {
            name,
            passed,
            error,
            timestamp: now_millis(),
        });
        Ok(passed)
    })?;
    test.set("test", test_fn)?;

    let expect_fn = lua.create_function(|lua, actual: Value| build_matcher(lua, actual))?;
    test.set("expect", expect_fn)?;

    freeze(lua, test)
}

/// Matcher table returned by `chrollo.test.expect(actual)`.
fn build_matcher(lua: &Lua, actual: Value) -> LuaResult<Table> {
    let matcher = lua.create_table()?;

    let a = actual.clone();
    matcher.set(
        "toBe",
        lua.create_function(move |lua, expected: Value| {
            check(lua, same_value(lua, &a, &expected), &a, "to be", Some(&expected))
        })?,
    )?;

    let a = actual.clone();
    matcher.set(
        "toEqual",
        lua.create_function(move |lua, expected: Value| {
            let equal = match (to_json(lua, &a), to_json(lua, &expected)) {
                (Some(x), Some(y)) => json_eq(&x, &y),
                _ => a == expected,
            };
            check(lua, equal, &a, "to equal", Some(&expected))
        })?,
    )?;

    let a = actual.clone();
    matcher.set(
        "toBeTruthy",
        lua.create_function(move |lua, ()| check(lua, is_truthy(&a), &a, "to be truthy", None))?,
    )?;

    let a = actual.clone();
    matcher.set(
        "toBeFalsy",
        lua.create_function(move |lua, ()| check(lua, !is_truthy(&a), &a, "to be falsy", None))?,
    )?;

    let a = actual.clone();
    matcher.set(
        "toBeNil",
        lua.create_function(move |lua, ()| check(lua, a.is_nil(), &a, "to be nil", None))?,
    )?;

    let a = actual;
    matcher.set(
        "toContain",
        lua.create_function(move |lua, item: Value| {
            let contained = match (&a, &item) {
                (Value::String(haystack), Value::String(needle)) => haystack
                    .to_string_lossy()
                    .contains(&*needle.to_string_lossy()),
                _ => match (to_json(lua, &a), to_json(lua, &item)) {
                    (Some(JsonValue::Array(items)), Some(wanted)) => {
                        items.iter().any(|candidate| json_eq(candidate, &wanted))
                    }
                    _ => false,
                },
            };
            check(lua, contained, &a, "to contain", Some(&item))
        })?,
    )?;

    freeze(lua, matcher)
}

fn check(
    lua: &Lua,
    ok: bool,
    actual: &Value,
    relation: &str,
    expected: Option<&Value>,
) -> LuaResult<()> {
    if ok {
        return Ok(());
    }
    let message = match expected {
        Some(expected) => format!(
            "expected {} {} {}",
            display_value(lua, actual),
            relation,
            display_value(lua, expected)
        ),
        None => format!("expected {} {}", display_value(lua, actual), relation),
    };
    Err(mlua::Error::RuntimeError(message))
}

/// Identity for tables and functions, value equality for everything else.
fn same_value(lua: &Lua, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Table(_), _) | (_, Value::Table(_)) | (Value::Function(_), _) | (_, Value::Function(_)) => {
            a == b
        }
        _ => match (to_json(lua, a), to_json(lua, b)) {
            (Some(x), Some(y)) => json_eq(&x, &y),
            _ => a == b,
        },
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

fn to_json(lua: &Lua, value: &Value) -> Option<JsonValue> {
    lua.from_value(value.clone()).ok()
}

/// Deep equality that treats `1` and `1.0` as the same number.
fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_eq(x, y))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| json_eq(value, other)))
        }
        // An empty Lua table may come back as either shape.
        (JsonValue::Array(x), JsonValue::Object(y)) | (JsonValue::Object(y), JsonValue::Array(x)) => {
            x.is_empty() && y.is_empty()
        }
        _ => a == b,
    }
}

/// The `console` shim. Output goes to the notification channel only.
fn register_console(lua: &Lua, runtime: &Rc<RuntimeState>) -> LuaResult<Table> {
    let console = lua.create_table()?;

    for level in [
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
    ] {
        let rt = Rc::clone(runtime);
        let console_fn = lua.create_function(move |lua, args: Variadic<Value>| {
            let message = args
                .iter()
                .map(|value| display_value(lua, value))
                .collect::<Vec<_>>()
                .join(" ");
            debug!(target: "chrollo::console", level = level.as_str(), "{}", message);
            rt.notifier().console(level, message);
            Ok(())
        })?;
        console.set(level.as_str(), console_fn)?;
    }

    freeze(lua, console)
}

/// Convert a Lua Value to a string for console output.
pub(crate) fn display_value(lua: &Lua, value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Table(_) => match to_json(lua, value) {
            Some(json) => json.to_string(),
            None => "[table]".to_string(),
        },
        Value::LightUserData(ud) if ud.0.is_null() => "null".to_string(),
        Value::Function(_) => "[function]".to_string(),
        Value::Thread(_) => "[thread]".to_string(),
        Value::UserData(_) => "[userdata]".to_string(),
        Value::Error(e) => format!("[error: {}]", e),
        _ => "[unknown]".to_string(),
    }
}
