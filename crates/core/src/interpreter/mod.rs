//! Tree-walking interpreter that turns statements into fixture state.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Literal, Node};
use crate::value::{Tuple, TupleKey, Value, ValueRange, ValueSequence};
use crate::world::{Predicate, World};
use crate::{LuxError, Result};

mod registry;

pub use registry::{FunctionRegistry, NativeFunction};

/// Nesting limit for variables that fetch other variables.
const MAX_FETCH_DEPTH: usize = 32;

/// Show-control statements, queued during interpretation and handed back to
/// the caller once the script has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowCommand {
    Go,
    Goto(usize),
    Load(String),
}

/// Result of evaluating an expression node, before it is bound to a
/// parameter.
#[derive(Debug, Clone, PartialEq)]
enum Evaluated {
    Nil,
    Number(f64),
    Percent(f64),
    Range { start: f64, end: f64, percent: bool },
    List(Vec<Evaluated>),
    Value(Value),
}

/// A global: the defining block and the generation that last defined it.
#[derive(Debug, Clone)]
struct Global {
    block: Node,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    globals: HashMap<String, Global>,
    generation: u64,
    functions: FunctionRegistry,
    current_parameter: Option<String>,
    fetch_depth: usize,
    pending: Vec<ShowCommand>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self {
            functions,
            ..Self::default()
        }
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn global_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluates a whole script against `world`.
    ///
    /// Top-level time directives live in a scope of their own, so they last
    /// until the end of the script and never leak into the next one. On
    /// success, globals this script did not (re)define are dropped. On error
    /// the world keeps whatever was applied before the failing statement.
    #[tracing::instrument(level = "debug", skip_all, fields(statements = ast.len()))]
    pub fn interpret(&mut self, ast: &[Node], world: &mut World) -> Result<Vec<ShowCommand>> {
        self.generation += 1;
        self.pending.clear();

        let result = world.with_time_scope(|world| {
            ast.iter().try_for_each(|node| self.execute(node, world))
        });
        self.current_parameter = None;
        self.fetch_depth = 0;
        result?;

        let generation = self.generation;
        let before = self.globals.len();
        self.globals.retain(|_, global| global.generation == generation);
        if self.globals.len() != before {
            debug!(dropped = before - self.globals.len(), "dropped stale globals");
        }

        Ok(std::mem::take(&mut self.pending))
    }

    fn execute(&mut self, node: &Node, world: &mut World) -> Result<()> {
        match node {
            Node::Apply { parameter, values } => self.apply(parameter, values, world),
            Node::Block(statements) => statements
                .iter()
                .try_for_each(|statement| self.execute(statement, world)),
            Node::Selection { selector, block } => {
                let selector = self.evaluate(selector, world)?;
                let query = query(&selector)?;
                world.with_selection(&query, |world| self.execute(block, world))
            }
            Node::Time(time) => {
                world.time_mut().set(time.keyword, time.seconds);
                Ok(())
            }
            Node::TimeBlock { times, block } => world.with_time_scope(|world| {
                for time in times {
                    world.time_mut().set(time.keyword, time.seconds);
                }
                self.execute(block, world)
            }),
            Node::VarDefine { identifier, block } => {
                self.globals.insert(
                    identifier.clone(),
                    Global {
                        block: block.as_ref().clone(),
                        generation: self.generation,
                    },
                );
                Ok(())
            }
            Node::VarFetch(identifier) => {
                let block = self.global(identifier)?.clone();
                self.nested(identifier, |interpreter| interpreter.execute(&block, world))
            }
            Node::Go => {
                self.pending.push(ShowCommand::Go);
                Ok(())
            }
            Node::Goto(cue) => {
                self.pending.push(ShowCommand::Goto(*cue));
                Ok(())
            }
            Node::Load(identifier) => {
                self.pending.push(ShowCommand::Load(identifier.clone()));
                Ok(())
            }
            Node::Selector(_)
            | Node::Range { .. }
            | Node::Value(_)
            | Node::Tuple(_)
            | Node::Call { .. } => {
                let value = self.evaluate(node, world)?;
                debug!(?value, "discarded expression statement");
                Ok(())
            }
        }
    }

    /// Evaluates the value list, then pulls one concrete value per selected
    /// fixture in selection order.
    fn apply(&mut self, parameter: &str, values: &[Node], world: &mut World) -> Result<()> {
        let previous = self.current_parameter.replace(parameter.to_string());
        let evaluated: Result<Vec<Evaluated>> = values
            .iter()
            .map(|value| self.evaluate(value, world))
            .collect();
        self.current_parameter = previous;

        let count = world.selection_len();
        let mut value = match evaluated?.as_slice() {
            [] => None,
            [single] => to_value(single, count)?,
            many => {
                let items = many
                    .iter()
                    .map(|item| {
                        to_value(item, count)?.ok_or_else(|| {
                            LuxError::InvalidExpression(format!(
                                "`_` cannot be part of a value list for `{parameter}`"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(Value::Sequence(ValueSequence::new(items)?))
            }
        };

        world.for_each_selected(|fixture, time| {
            fixture.apply(parameter, value.as_mut().map(Value::get), time)
        })
    }

    fn evaluate(&mut self, node: &Node, world: &mut World) -> Result<Evaluated> {
        match node {
            Node::Value(Literal::Number(number)) => Ok(Evaluated::Number(*number)),
            Node::Value(Literal::Percent(percent)) => Ok(Evaluated::Percent(*percent)),
            Node::Value(Literal::Nil) => Ok(Evaluated::Nil),
            Node::Range { start, end } => {
                let start = first(self.evaluate(start, world)?);
                let end = first(self.evaluate(end, world)?);
                match (start, end) {
                    (Evaluated::Number(start), Evaluated::Number(end)) => Ok(Evaluated::Range {
                        start,
                        end,
                        percent: false,
                    }),
                    (Evaluated::Percent(start), Evaluated::Percent(end)) => Ok(Evaluated::Range {
                        start,
                        end,
                        percent: true,
                    }),
                    (start, end) => Err(LuxError::InvalidExpression(format!(
                        "cannot build a range from {start:?} to {end:?}"
                    ))),
                }
            }
            Node::Selector(terms) => terms
                .iter()
                .map(|term| self.evaluate(term, world))
                .collect::<Result<Vec<_>>>()
                .map(Evaluated::List),
            Node::Tuple(entries) => {
                let count = world.selection_len();
                let mut tuple = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let evaluated = self.evaluate(value, world)?;
                    let value = to_value(&evaluated, count)?.ok_or_else(|| {
                        LuxError::InvalidExpression(format!("tuple entry `{key}` cannot be `_`"))
                    })?;
                    tuple.push((TupleKey::parse(key), value));
                }
                Ok(Evaluated::Value(Value::Tuple(Tuple::new(tuple)?)))
            }
            Node::Call {
                identifier,
                arguments,
            } => {
                let count = world.selection_len();
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    let evaluated = self.evaluate(argument, world)?;
                    args.push(to_value(&evaluated, count)?);
                }
                self.functions
                    .call(identifier, count, args)
                    .map(Evaluated::Value)
            }
            Node::VarFetch(identifier) => {
                let block = self.global(identifier)?.clone();
                match self.current_parameter.clone() {
                    Some(parameter) => self.nested(identifier, |interpreter| {
                        interpreter.fetch_for_parameter(&block, &parameter, world)
                    }),
                    None => {
                        self.nested(identifier, |interpreter| interpreter.execute(&block, world))?;
                        Ok(Evaluated::Nil)
                    }
                }
            }
            other => Err(LuxError::InvalidExpression(format!(
                "statement used as a value: {}",
                crate::ast::dump(std::slice::from_ref(other)).trim_end()
            ))),
        }
    }

    /// Evaluates only the values the variable's block applies to
    /// `parameter`; `Nil` when it has none.
    fn fetch_for_parameter(&mut self, block: &Node, parameter: &str, world: &mut World) -> Result<Evaluated> {
        let statements = match block {
            Node::Block(statements) => statements.as_slice(),
            other => std::slice::from_ref(other),
        };
        let values = statements.iter().find_map(|statement| match statement {
            Node::Apply {
                parameter: target,
                values,
            } if target == parameter => Some(values),
            _ => None,
        });

        let Some(values) = values else {
            return Ok(Evaluated::Nil);
        };
        let mut evaluated = values
            .iter()
            .map(|value| self.evaluate(value, world))
            .collect::<Result<Vec<_>>>()?;
        if evaluated.len() == 1 {
            return Ok(evaluated.remove(0));
        }
        Ok(Evaluated::List(evaluated))
    }

    fn global(&self, identifier: &str) -> Result<&Node> {
        self.globals
            .get(identifier)
            .map(|global| &global.block)
            .ok_or_else(|| LuxError::UndefinedVariable(identifier.to_string()))
    }

    fn nested<R>(&mut self, identifier: &str, body: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.fetch_depth >= MAX_FETCH_DEPTH {
            return Err(LuxError::InvalidExpression(format!(
                "variable `{identifier}` nests deeper than {MAX_FETCH_DEPTH} levels"
            )));
        }
        self.fetch_depth += 1;
        let result = body(self);
        self.fetch_depth -= 1;
        result
    }
}

/// Lists in range endpoints collapse to their first element.
fn first(evaluated: Evaluated) -> Evaluated {
    match evaluated {
        Evaluated::List(items) => items.into_iter().next().unwrap_or(Evaluated::Nil),
        other => other,
    }
}

/// Binds an evaluated expression to a value; ranges spread over `count`
/// fixtures. `None` means "keep the current value".
fn to_value(evaluated: &Evaluated, count: usize) -> Result<Option<Value>> {
    let value = match evaluated {
        Evaluated::Nil => return Ok(None),
        Evaluated::Number(number) => Value::Static(*number),
        Evaluated::Percent(percent) => Value::Percent(*percent),
        Evaluated::Range {
            start,
            end,
            percent: false,
        } => Value::Range(ValueRange::new(*start, *end, count)),
        Evaluated::Range { start, end, .. } => {
            Value::Range(ValueRange::percent(*start, *end, count))
        }
        Evaluated::List(items) => {
            let items = items
                .iter()
                .map(|item| {
                    to_value(item, count)?.ok_or_else(|| {
                        LuxError::InvalidExpression("`_` cannot be part of a value list".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Value::Sequence(ValueSequence::new(items)?)
        }
        Evaluated::Value(value) => value.clone(),
    };
    Ok(Some(value))
}

/// Turns an evaluated selector into selection predicates.
fn query(selector: &Evaluated) -> Result<Vec<Predicate>> {
    let id = |number: f64| -> Result<u32> {
        if number < 0.0 || number.fract() != 0.0 || number > f64::from(u32::MAX) {
            return Err(LuxError::InvalidSelector(format!("`{number}` is not a fixture id")));
        }
        Ok(number as u32)
    };

    match selector {
        Evaluated::Number(number) => Ok(vec![Predicate::Single(id(*number)?)]),
        Evaluated::Range {
            start,
            end,
            percent: false,
        } => Ok(vec![Predicate::Range {
            start: id(*start)?,
            end: id(*end)?,
        }]),
        Evaluated::List(terms) => {
            let mut predicates = Vec::new();
            for term in terms {
                predicates.extend(query(term)?);
            }
            Ok(predicates)
        }
        other => Err(LuxError::InvalidSelector(format!("{other:?}"))),
    }
}
