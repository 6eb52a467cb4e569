use std::collections::HashMap;

use crate::fx::{Dynamic, Generator};
use crate::value::{Tuple, Value, ValueRange};
use crate::{LuxError, Result};

/// Built-in callable: receives the size of the current selection and the
/// evaluated arguments (`None` for `_`).
pub type NativeFunction = fn(usize, Vec<Option<Value>>) -> Result<Value>;

/// Name to function lookup used by `Call` nodes.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, NativeFunction>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("rgb", rgb);
        registry.register("cmy", cmy);
        registry.register("sin", |count, args| Ok(dynamic(Generator::Sin, count, args)));
        registry.register("cos", |count, args| Ok(dynamic(Generator::Cos, count, args)));
        registry.register("square", |count, args| {
            Ok(dynamic(Generator::Square, count, args))
        });
        registry.register("pulse", |count, args| Ok(dynamic(Generator::Pulse, count, args)));
        registry.register("cycle", |count, args| Ok(dynamic(Generator::Cycle, count, args)));
        registry.register("chase", chase);
        registry
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, function: NativeFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<NativeFunction> {
        self.functions.get(name).copied()
    }

    pub fn call(&self, name: &str, fixture_count: usize, args: Vec<Option<Value>>) -> Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| LuxError::UnknownFunction(name.to_string()))?;
        function(fixture_count, args)
    }
}

fn dynamic(generator: Generator, fixture_count: usize, args: Vec<Option<Value>>) -> Value {
    Value::Dynamic(Dynamic::new(generator, fixture_count, args))
}

fn color_tuple(name: &str, keys: [&str; 3], args: Vec<Option<Value>>) -> Result<Value> {
    if args.len() != keys.len() {
        return Err(LuxError::invalid_argument(format!(
            "{name} takes 3 arguments, got {}",
            args.len()
        )));
    }

    let mut entries = Vec::with_capacity(keys.len());
    for (key, arg) in keys.into_iter().zip(args) {
        let value = arg.ok_or_else(|| {
            LuxError::invalid_argument(format!("{name}: `{key}` cannot be `_`"))
        })?;
        entries.push((key, value));
    }
    Ok(Value::Tuple(Tuple::named(entries)))
}

fn rgb(_: usize, args: Vec<Option<Value>>) -> Result<Value> {
    color_tuple("rgb", ["red", "green", "blue"], args)
}

fn cmy(_: usize, args: Vec<Option<Value>>) -> Result<Value> {
    color_tuple("cmy", ["cyan", "magenta", "yellow"], args)
}

/// `chase(min, max, period)` with an implicit position per fixture, so each
/// fixture in the selection lights on its own step.
fn chase(fixture_count: usize, args: Vec<Option<Value>>) -> Result<Value> {
    if args.len() > 3 {
        return Err(LuxError::invalid_argument(format!(
            "chase takes at most 3 arguments, got {}",
            args.len()
        )));
    }

    let count = fixture_count.max(1);
    let defaults = [0.0, 100.0, 1.0];
    let mut args = args;
    for default in defaults.iter().skip(args.len()) {
        args.push(Some(Value::Static(*default)));
    }
    args.push(Some(Value::Range(ValueRange::new(
        0.0,
        (count - 1) as f64,
        count,
    ))));
    Ok(dynamic(Generator::Chase, count, args))
}
