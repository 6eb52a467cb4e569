//! Statement tree consumed by the interpreter.
//!
//! Script text is turned into these nodes by a front end outside the core;
//! the serde form is the interchange format.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::timing::TimeKeyword;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// `parameter value...`
    Apply { parameter: String, values: Vec<Node> },
    Block(Vec<Node>),
    /// Selector terms, each evaluating to an id or an id range.
    Selector(Vec<Node>),
    Selection { selector: Box<Node>, block: Box<Node> },
    Range { start: Box<Node>, end: Box<Node> },
    Time(TimeDirective),
    TimeBlock { times: Vec<TimeDirective>, block: Box<Node> },
    Value(Literal),
    Tuple(Vec<(String, Node)>),
    Call { identifier: String, arguments: Vec<Node> },
    VarDefine { identifier: String, block: Box<Node> },
    VarFetch(String),
    Go,
    Goto(usize),
    Load(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(f64),
    Percent(f64),
    /// `_`: keep the current value.
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDirective {
    pub keyword: TimeKeyword,
    #[serde(default)]
    pub seconds: f64,
}

impl TimeDirective {
    pub fn new(keyword: TimeKeyword, seconds: f64) -> Self {
        Self { keyword, seconds }
    }
}

impl Node {
    pub fn number(value: f64) -> Self {
        Self::Value(Literal::Number(value))
    }

    pub fn percent(value: f64) -> Self {
        Self::Value(Literal::Percent(value))
    }

    pub fn nil() -> Self {
        Self::Value(Literal::Nil)
    }

    pub fn range(start: Node, end: Node) -> Self {
        Self::Range {
            start: Box::new(start),
            end: Box::new(end),
        }
    }

    pub fn apply(parameter: impl Into<String>, values: Vec<Node>) -> Self {
        Self::Apply {
            parameter: parameter.into(),
            values,
        }
    }

    pub fn call(identifier: impl Into<String>, arguments: Vec<Node>) -> Self {
        Self::Call {
            identifier: identifier.into(),
            arguments,
        }
    }

    pub fn selection(terms: Vec<Node>, statements: Vec<Node>) -> Self {
        Self::Selection {
            selector: Box::new(Self::Selector(terms)),
            block: Box::new(Self::Block(statements)),
        }
    }

    pub fn time_block(times: Vec<TimeDirective>, statements: Vec<Node>) -> Self {
        Self::TimeBlock {
            times,
            block: Box::new(Self::Block(statements)),
        }
    }

    pub fn define(identifier: impl Into<String>, statements: Vec<Node>) -> Self {
        Self::VarDefine {
            identifier: identifier.into(),
            block: Box::new(Self::Block(statements)),
        }
    }

    pub fn fetch(identifier: impl Into<String>) -> Self {
        Self::VarFetch(identifier.into())
    }
}

/// Renders statements one per line, indented two spaces per level.
pub fn dump(ast: &[Node]) -> String {
    let mut out = String::new();
    for node in ast {
        write_node(&mut out, node, 0);
    }
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    let _ = writeln!(out, "{:indent$}{text}", "", indent = depth * 2);
}

fn literal(value: &Literal) -> String {
    match value {
        Literal::Number(number) => format!("VALUE {number}"),
        Literal::Percent(percent) => format!("PERCENT_VALUE {percent}%"),
        Literal::Nil => "VALUE _".to_string(),
    }
}

fn write_node(out: &mut String, node: &Node, depth: usize) {
    match node {
        Node::Apply { parameter, values } => {
            line(out, depth, "APPLY");
            line(out, depth + 1, &format!("PARAMETER {parameter}"));
            for value in values {
                write_node(out, value, depth + 2);
            }
        }
        Node::Block(statements) => {
            line(out, depth, "BLOCK");
            for statement in statements {
                write_node(out, statement, depth + 1);
            }
        }
        Node::Selector(terms) => {
            line(out, depth, "SELECTOR");
            for term in terms {
                write_node(out, term, depth + 1);
            }
        }
        Node::Selection { selector, block } => {
            line(out, depth, "SELECTION");
            write_node(out, selector, depth + 1);
            write_node(out, block, depth + 1);
        }
        Node::Range { start, end } => match (start.as_ref(), end.as_ref()) {
            (Node::Value(Literal::Number(a)), Node::Value(Literal::Number(b))) => {
                line(out, depth, &format!("RANGE {a}->{b}"));
            }
            (Node::Value(Literal::Percent(a)), Node::Value(Literal::Percent(b))) => {
                line(out, depth, &format!("RANGE {a}%->{b}%"));
            }
            _ => {
                line(out, depth, "RANGE");
                write_node(out, start, depth + 1);
                write_node(out, end, depth + 1);
            }
        },
        Node::Time(time) => {
            line(out, depth, &format!("TIME {} {}", time.keyword.name(), time.seconds));
        }
        Node::TimeBlock { times, block } => {
            line(out, depth, "TIME BLOCK");
            for time in times {
                write_node(out, &Node::Time(*time), depth + 1);
            }
            write_node(out, block, depth + 1);
        }
        Node::Value(value) => line(out, depth, &literal(value)),
        Node::Tuple(entries) => {
            line(out, depth, "TUPLE {");
            for (key, value) in entries {
                line(out, depth + 1, &format!("{key} :"));
                write_node(out, value, depth + 1);
            }
            line(out, depth, "}");
        }
        Node::Call {
            identifier,
            arguments,
        } => {
            line(out, depth, &format!("CALL {identifier}"));
            for (index, argument) in arguments.iter().enumerate() {
                line(out, depth + 1, &format!("ARG {index}"));
                write_node(out, argument, depth + 1);
            }
        }
        Node::VarDefine { identifier, block } => {
            line(out, depth, &format!("VARDEFINE {identifier}"));
            write_node(out, block, depth + 1);
        }
        Node::VarFetch(identifier) => line(out, depth, &format!("VARFETCH {identifier}")),
        Node::Go => line(out, depth, "GO"),
        Node::Goto(cue) => line(out, depth, &format!("GOTO {cue}")),
        Node::Load(identifier) => line(out, depth, &format!("LOAD {identifier}")),
    }
}
