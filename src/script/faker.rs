//! Fake data generation for the `chrollo.faker` namespace.
//!
//! Scripts reach the generator only through the fixed method set listed in
//! [`FAKER_METHODS`]; there is no dynamic property forwarding.

use std::rc::Rc;

use mlua::{Lua, Result as LuaResult, Table, Value};
use rand::distr::Alphanumeric;
use rand::Rng;

/// Method names exposed under `chrollo.faker`.
pub const FAKER_METHODS: &[&str] = &[
    "uuid",
    "integer",
    "float",
    "boolean",
    "word",
    "words",
    "firstName",
    "lastName",
    "fullName",
    "email",
    "alphanumeric",
    "pick",
];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Dennis", "Edsger", "Frances", "Grace", "Ken", "Linus", "Margaret",
    "Niklaus", "Radia",
];

const LAST_NAMES: &[&str] = &[
    "Lovelace", "Turing", "Liskov", "Ritchie", "Dijkstra", "Allen", "Hopper", "Thompson",
    "Torvalds", "Hamilton", "Wirth", "Perlman",
];

const WORDS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa",
];

const DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// Largest count accepted by `faker.words` and `faker.alphanumeric`.
pub const MAX_COUNT: usize = 1024;

/// Source of fake values.
pub trait DataGenerator {
    fn uuid(&self) -> String;
    fn integer(&self, min: i64, max: i64) -> i64;
    fn float(&self, min: f64, max: f64) -> f64;
    fn boolean(&self) -> bool;
    fn word(&self) -> String;
    fn first_name(&self) -> String;
    fn last_name(&self) -> String;
    fn alphanumeric(&self, len: usize) -> String;
    /// Index in `0..len`; `len` is never zero.
    fn index(&self, len: usize) -> usize;

    fn words(&self, count: usize) -> String {
        (0..count).map(|_| self.word()).collect::<Vec<_>>().join(" ")
    }

    fn full_name(&self) -> String {
        format!("{} {}", self.first_name(), self.last_name())
    }

    fn email(&self) -> String {
        let domain = DOMAINS[self.index(DOMAINS.len())];
        format!(
            "{}.{}@{}",
            self.first_name().to_lowercase(),
            self.last_name().to_lowercase(),
            domain
        )
    }
}

/// Generator backed by the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDataGenerator;

impl DataGenerator for RandomDataGenerator {
    fn uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn integer(&self, min: i64, max: i64) -> i64 {
        rand::rng().random_range(min..=max)
    }

    fn float(&self, min: f64, max: f64) -> f64 {
        // Also covers NaN bounds and spans too wide to sample.
        if min.is_nan() || max.is_nan() || min >= max || !(max - min).is_finite() {
            return min;
        }
        rand::rng().random_range(min..max)
    }

    fn boolean(&self) -> bool {
        rand::rng().random()
    }

    fn word(&self) -> String {
        WORDS[self.index(WORDS.len())].to_string()
    }

    fn first_name(&self) -> String {
        FIRST_NAMES[self.index(FIRST_NAMES.len())].to_string()
    }

    fn last_name(&self) -> String {
        LAST_NAMES[self.index(LAST_NAMES.len())].to_string()
    }

    fn alphanumeric(&self, len: usize) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Build the `faker` table over `generator`.
pub(crate) fn build_faker_table(lua: &Lua, generator: Rc<dyn DataGenerator>) -> LuaResult<Table> {
    let faker = lua.create_table()?;

    let g = Rc::clone(&generator);
    faker.set("uuid", lua.create_function(move |_, ()| Ok(g.uuid()))?)?;

    let g = Rc::clone(&generator);
    faker.set(
        "integer",
        lua.create_function(move |_, (min, max): (Option<i64>, Option<i64>)| {
            let min = min.unwrap_or(0);
            let max = max.unwrap_or(i64::from(i32::MAX));
            if min > max {
                return Err(mlua::Error::RuntimeError(
                    "faker.integer: min must be less than or equal to max".to_string(),
                ));
            }
            Ok(g.integer(min, max))
        })?,
    )?;

    let g = Rc::clone(&generator);
    faker.set(
        "float",
        lua.create_function(move |_, (min, max): (Option<f64>, Option<f64>)| {
            let min = min.unwrap_or(0.0);
            let max = max.unwrap_or(1.0);
            if !min.is_finite() || !max.is_finite() {
                return Err(mlua::Error::RuntimeError(
                    "faker.float: bounds must be finite numbers".to_string(),
                ));
            }
            if min > max {
                return Err(mlua::Error::RuntimeError(
                    "faker.float: min must be less than or equal to max".to_string(),
                ));
            }
            if !(max - min).is_finite() {
                return Err(mlua::Error::RuntimeError(
                    "faker.float: range is too wide".to_string(),
                ));
            }
            Ok(g.float(min, max))
        })?,
    )?;

    let g = Rc::clone(&generator);
    faker.set("boolean", lua.create_function(move |_, ()| Ok(g.boolean()))?)?;

    let g = Rc::clone(&generator);
    faker.set("word", lua.create_function(move |_, ()| Ok(g.word()))?)?;

    let g = Rc::clone(&generator);
    faker.set(
        "words",
        lua.create_function(move |_, count: Option<usize>| {
            let count = checked_count("faker.words", count.unwrap_or(3))?;
            Ok(g.words(count))
        })?,
    )?;

    let g = Rc::clone(&generator);
    faker.set("firstName", lua.create_function(move |_, ()| Ok(g.first_name()))?)?;

    let g = Rc::clone(&generator);
    faker.set("lastName", lua.create_function(move |_, ()| Ok(g.last_name()))?)?;

    let g = Rc::clone(&generator);
    faker.set("fullName", lua.create_function(move |_, ()| Ok(g.full_name()))?)?;

    let g = Rc::clone(&generator);
    faker.set("email", lua.create_function(move |_, ()| Ok(g.email()))?)?;

    let g = Rc::clone(&generator);
    faker.set(
        "alphanumeric",
        lua.create_function(move |_, len: Option<usize>| {
            let len = checked_count("faker.alphanumeric", len.unwrap_or(10))?;
            Ok(g.alphanumeric(len))
        })?,
    )?;

    let g = Rc::clone(&generator);
    faker.set(
        "pick",
        lua.create_function(move |_, items: Table| {
            let len = items.raw_len();
            if len == 0 {
                return Ok(Value::Nil);
            }
            items.raw_get(g.index(len) + 1)
        })?,
    )?;

    Ok(faker)
}

fn checked_count(method: &str, count: usize) -> LuaResult<usize> {
    if count > MAX_COUNT {
        return Err(mlua::Error::RuntimeError(format!(
            "{}: count must be at most {}",
            method, MAX_COUNT
        )));
    }
    Ok(count)
}
