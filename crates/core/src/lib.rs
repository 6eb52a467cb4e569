//! Core runtime for the Lux live lighting language.
//!
//! Scripts arrive as statement trees ([`ast::Node`]) and are interpreted
//! against a [`World`] of patched fixtures. Every fixture parameter holds a
//! value tree (static levels, fades, delays, generators) that is sampled each
//! render tick into DMX universes. Cue lists sequence script files and decide
//! how much history has to be replayed to reach a cue.

pub mod ast;
pub mod color;
pub mod config;
pub mod cue;
pub mod error;
pub mod fixture;
pub mod fx;
pub mod interpreter;
pub mod parameter;
pub mod render;
pub mod show;
pub mod timeline;
pub mod timing;
pub mod value;
pub mod world;

pub use ast::Node;
pub use color::ColorSpace;
pub use config::{AppConfig, PatchEntry, RenderConfig};
pub use cue::{Cue, CueEngine, CueList, Replay};
pub use error::{LuxError, Result};
pub use fixture::{Fixture, FixtureDescriptor, ParameterSpec};
pub use interpreter::{FunctionRegistry, Interpreter, ShowCommand};
pub use render::{DmxSink, Frame, LightingEngine, RenderLoop, Universe};
pub use show::{lock_show, JsonScriptParser, ScriptParser, SharedShow, Show};
pub use timeline::{CueClock, TickPacer};
pub use timing::{TimeContext, TimeKeyword};
pub use value::Value;
pub use world::{Predicate, World};
