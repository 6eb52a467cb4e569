//! The running show: world, interpreter, cue lists and the cue clock behind
//! one owner.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::ast::Node;
use crate::cue::{CueEngine, Replay};
use crate::interpreter::{Interpreter, ShowCommand};
use crate::render::{Frame, LightingEngine};
use crate::timeline::CueClock;
use crate::world::World;
use crate::{LuxError, Result};

/// Limit on show commands triggering replays that issue further commands.
pub const MAX_COMMAND_DEPTH: usize = 8;

/// Turns script text into statements.
pub trait ScriptParser: Send {
    fn parse(&self, source: &str) -> Result<Vec<Node>>;
}

/// Reads scripts stored as the JSON form of [`Node`]. Lines starting with
/// `//` are skipped, so cue metadata headers can sit on top.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonScriptParser;

impl ScriptParser for JsonScriptParser {
    fn parse(&self, source: &str) -> Result<Vec<Node>> {
        let body: String = source
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|err| LuxError::Parse(err.to_string()))
    }
}

pub type SharedShow = Arc<Mutex<Show>>;

pub fn lock_show(show: &SharedShow) -> Result<MutexGuard<'_, Show>> {
    show.lock()
        .map_err(|_| LuxError::msg("show state has been poisoned"))
}

pub struct Show {
    parser: Box<dyn ScriptParser>,
    world: World,
    interpreter: Interpreter,
    cues: Option<CueEngine>,
    clock: CueClock,
    engine: LightingEngine,
    depth: usize,
    entry: Option<PathBuf>,
}

impl Show {
    pub fn new(world: World, parser: impl ScriptParser + 'static) -> Self {
        Self {
            parser: Box::new(parser),
            world,
            interpreter: Interpreter::new(),
            cues: None,
            clock: CueClock::default(),
            engine: LightingEngine::new(),
            depth: 0,
            entry: None,
        }
    }

    pub fn with_cues(mut self, cues: CueEngine) -> Self {
        self.cues = Some(cues);
        self
    }

    pub fn with_clock(mut self, clock: CueClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_engine(mut self, engine: LightingEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn into_shared(self) -> SharedShow {
        Arc::new(Mutex::new(self))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn cues(&self) -> Option<&CueEngine> {
        self.cues.as_ref()
    }

    pub fn clock_mut(&mut self) -> &mut CueClock {
        &mut self.clock
    }

    /// Seconds since the current cue started.
    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    pub fn entry(&self) -> Option<&Path> {
        self.entry.as_deref()
    }

    pub fn parse(&self, source: &str) -> Result<Vec<Node>> {
        self.parser.parse(source)
    }

    pub fn dump_state(&self) -> String {
        self.world.dump_state()
    }

    /// Evaluates the entry script and remembers it for later rebuilds.
    pub fn start(&mut self, entry: impl AsRef<Path>) -> Result<()> {
        let entry = fs::canonicalize(entry.as_ref())?;
        info!(entry = %entry.display(), "starting show");
        self.entry = Some(entry.clone());
        self.evaluate_file(&entry)
    }

    pub fn evaluate_source(&mut self, source: &str) -> Result<()> {
        let ast = self.parser.parse(source)?;
        self.evaluate_ast(&ast)
    }

    pub fn evaluate_file(&mut self, path: &Path) -> Result<()> {
        debug!(file = %path.display(), "evaluating file");
        let ast = self.read_script(path)?;
        self.evaluate_ast(&ast)
    }

    /// Evaluates statements live: in-flight transitions are anchored at the
    /// current cue time, the cue clock restarts and the new statements fade
    /// from there. Show commands issued by the script run afterwards.
    pub fn evaluate_ast(&mut self, ast: &[Node]) -> Result<()> {
        let elapsed = self.clock.elapsed();
        self.world.resolve(elapsed);
        self.world.restart_from(elapsed);
        self.clock.restart();

        let commands = self.interpreter.interpret(ast, &mut self.world)?;
        commands
            .into_iter()
            .try_for_each(|command| self.command(command))
    }

    /// Runs one show-control command against the cue engine. Commands with
    /// nothing to act on are logged and ignored.
    pub fn command(&mut self, command: ShowCommand) -> Result<()> {
        if self.depth >= MAX_COMMAND_DEPTH {
            return Err(LuxError::CommandDepth(MAX_COMMAND_DEPTH));
        }

        self.depth += 1;
        let result = self.dispatch(command);
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, command: ShowCommand) -> Result<()> {
        let Some(cues) = self.cues.as_mut() else {
            warn!(?command, "no cue lists configured");
            return Ok(());
        };

        let replay = match &command {
            ShowCommand::Go => cues.go(),
            ShowCommand::Goto(n) => cues.goto(*n),
            ShowCommand::Load(name) => {
                if !cues.contains(name) {
                    warn!(list = %name, "unknown cue list");
                    return Ok(());
                }
                cues.load(name)
            }
        };

        match replay {
            Some(replay) => self.replay(replay),
            None => {
                debug!(?command, "command had no effect");
                Ok(())
            }
        }
    }

    /// Replays cue files. A rebuild resets the world and replays the entry
    /// script first. Every file but the last is applied and fast-forwarded;
    /// the last one is evaluated live.
    pub fn replay(&mut self, replay: Replay) -> Result<()> {
        let Replay { rebuild, mut files } = replay;
        if files.is_empty() {
            return Ok(());
        }

        if rebuild {
            info!(files = files.len(), "rebuilding show state");
            self.world.reset();
            self.clock.restart();
            if let Some(entry) = &self.entry {
                if !files.contains(entry) {
                    files.insert(0, entry.clone());
                }
            }
        }

        let Some(last) = files.pop() else {
            return Ok(());
        };
        for file in &files {
            let ast = self.read_script(file)?;
            let dropped = self.interpreter.interpret(&ast, &mut self.world)?;
            self.world.fast_forward();
            if !dropped.is_empty() {
                debug!(file = %file.display(), commands = dropped.len(), "skipped commands while replaying");
            }
        }
        self.evaluate_file(&last)
    }

    /// Reacts to an edited script on disk.
    pub fn file_changed(&mut self, path: &Path) -> Result<()> {
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        if self.entry.as_deref() == Some(path.as_path()) {
            info!(file = %path.display(), "entry script changed");
            let files = self
                .cues
                .as_ref()
                .and_then(CueEngine::current)
                .map(|list| list.all_cues_till_current())
                .unwrap_or_default();
            let mut files = files;
            if files.is_empty() {
                files.push(path);
            }
            return self.replay(Replay {
                rebuild: true,
                files,
            });
        }

        let files = self
            .cues
            .as_ref()
            .map(|cues| cues.files_to_rerun(&path))
            .unwrap_or_default();
        if files.is_empty() {
            debug!(file = %path.display(), "change has no visible effect");
            return Ok(());
        }

        info!(file = %path.display(), files = files.len(), "cue changed, replaying");
        self.replay(Replay {
            rebuild: true,
            files,
        })
    }

    /// Rescans a cue list directory; `false` when the list is unknown.
    pub fn reload_cues(&mut self, name: &str) -> Result<bool> {
        match self.cues.as_mut() {
            Some(cues) => cues.reload(name),
            None => Ok(false),
        }
    }

    pub fn render_frame(&mut self) -> &Frame {
        let elapsed = self.clock.elapsed();
        self.render_at(elapsed)
    }

    pub fn render_at(&mut self, elapsed: f64) -> &Frame {
        self.world.resolve(elapsed);
        self.engine.render(&self.world, elapsed)
    }

    fn read_script(&self, path: &Path) -> Result<Vec<Node>> {
        let source = fs::read_to_string(path)?;
        self.parser.parse(&source)
    }
}

impl std::fmt::Debug for Show {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Show")
            .field("fixtures", &self.world.fixture_count())
            .field("cues", &self.cues)
            .field("clock", &self.clock)
            .field("entry", &self.entry)
            .finish()
    }
}
