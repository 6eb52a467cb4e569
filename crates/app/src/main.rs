use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{anyhow, Context as _};
use clap::{Args, Parser, Subcommand};
use lux_core::{
    ast, lock_show, AppConfig, CueEngine, DmxSink, Frame, JsonScriptParser, LightingEngine,
    LuxError, RenderLoop, ScriptParser, SharedShow, Show, ShowCommand,
};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_show(args),
        Commands::Check { file } => run_check(&file),
        Commands::Patch { config } => run_patch(config.as_deref()),
    }
}

fn run_show(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let world = config.build_world().context("building the fixture rig")?;
    let cues_dir = args.cues.clone().or_else(|| config.cues_dir.clone());
    info!(fixtures = world.fixture_count(), cues = ?cues_dir, "starting live mode");

    if args.print_ast {
        let source = std::fs::read_to_string(&args.entry)
            .with_context(|| format!("reading {}", args.entry.display()))?;
        print!("{}", ast::dump(&JsonScriptParser.parse(&source)?));
    }

    let mut show = Show::new(world, JsonScriptParser)
        .with_engine(LightingEngine::with_universes(&config.universes()));
    if let Some(dir) = &cues_dir {
        show = show.with_cues(CueEngine::open(dir)?);
    }

    match show.start(&args.entry) {
        Ok(()) => {}
        Err(err @ (LuxError::Io(_) | LuxError::InvalidFixture(_) | LuxError::MissingCueDirectory(_))) => {
            return Err(err).with_context(|| format!("starting {}", args.entry.display()));
        }
        Err(err) => error!(error = %err, "entry script failed, rendering the last good state"),
    }
    if args.print_state {
        print!("{}", show.dump_state());
    }

    let shared = show.into_shared();
    let _watcher = if args.no_watch {
        None
    } else {
        let mut roots = Vec::new();
        match args.entry.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => roots.push(parent.to_path_buf()),
            _ => roots.push(PathBuf::from(".")),
        }
        roots.extend(cues_dir);
        let roots = roots
            .into_iter()
            .map(|root| std::fs::canonicalize(&root).unwrap_or(root))
            .collect();
        Some(watch_scripts(shared.clone(), &distinct_roots(roots))?)
    };

    let render = RenderLoop::new(shared.clone(), args.rate.unwrap_or(config.render.rate_hz));
    let stop = render.stop_handle();
    let handle = render.spawn(LogSink::new(args.dump_universes));

    let console = run_console(&shared);
    stop.store(true, Ordering::Relaxed);
    handle
        .join()
        .map_err(|_| anyhow!("render thread panicked"))??;
    console
}

fn run_check(file: &Path) -> anyhow::Result<()> {
    let source =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let nodes = JsonScriptParser.parse(&source)?;
    print!("{}", ast::dump(&nodes));
    Ok(())
}

fn run_patch(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let world = config.build_world()?;
    for fixture in world.fixtures() {
        println!(
            "{:>4}  {:<16} {}/{:<3} ({} channels)",
            fixture.id(),
            fixture.name(),
            fixture.universe(),
            fixture.address(),
            fixture.footprint()
        );
    }
    print!("{}", world.dump_state());
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

/// Reads console commands until `quit` or end of input. Lines that are not
/// commands are evaluated as scripts.
fn run_console(show: &SharedShow) -> anyhow::Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        let mut show = lock_show(show)?;
        if let Err(err) = console_command(&mut show, line) {
            error!(error = %err, "command failed");
        }
    }
    Ok(())
}

fn console_command(show: &mut Show, line: &str) -> lux_core::Result<()> {
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));

    match word {
        "go" => show.command(ShowCommand::Go),
        "goto" => {
            let n = rest
                .parse()
                .map_err(|_| LuxError::invalid_argument(format!("`{rest}` is not a cue number")))?;
            show.command(ShowCommand::Goto(n))
        }
        "load" => show.command(ShowCommand::Load(rest.to_string())),
        "reload" => {
            if !show.reload_cues(rest)? {
                warn!(list = rest, "unknown cue list");
            }
            Ok(())
        }
        "state" => {
            print!("{}", show.dump_state());
            Ok(())
        }
        "universes" => {
            for universe in show.render_frame().iter() {
                print!("{universe}");
            }
            Ok(())
        }
        _ => show.evaluate_source(line),
    }
}

/// Drops roots already covered by another recursive root.
fn distinct_roots(mut roots: Vec<PathBuf>) -> Vec<PathBuf> {
    roots.sort();
    roots.dedup();
    let covered: Vec<bool> = roots
        .iter()
        .map(|root| {
            roots
                .iter()
                .any(|other| other != root && root.starts_with(other))
        })
        .collect();
    roots
        .into_iter()
        .zip(covered)
        .filter_map(|(root, covered)| (!covered).then_some(root))
        .collect()
}

fn watch_scripts(show: SharedShow, roots: &[PathBuf]) -> anyhow::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "script watcher failed");
                return;
            }
        };
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }

        for path in event.paths.iter().filter(|path| path.is_file()) {
            debug!(file = %path.display(), "script changed on disk");
            let result = lock_show(&show).and_then(|mut show| show.file_changed(path));
            if let Err(err) = result {
                error!(file = %path.display(), error = %err, "reloading script failed");
            }
        }
    })?;

    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {}", root.display()))?;
        info!(root = %root.display(), "watching scripts");
    }
    Ok(watcher)
}

/// Stands in for a network encoder: logs frames, or prints them when they
/// change.
struct LogSink {
    dump: bool,
    last: Option<Frame>,
}

impl LogSink {
    fn new(dump: bool) -> Self {
        Self { dump, last: None }
    }
}

impl DmxSink for LogSink {
    fn send(&mut self, frame: &Frame) -> lux_core::Result<()> {
        if self.last.as_ref() == Some(frame) {
            return Ok(());
        }

        if self.dump {
            for universe in frame.iter() {
                print!("{universe}");
            }
        } else {
            trace!(universes = frame.len(), "frame changed");
        }
        self.last = Some(frame.clone());
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live lighting control runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a show: evaluate the entry script and render until `quit`.
    Run(RunArgs),
    /// Parse a script and print its statement tree.
    Check {
        /// Script file to parse.
        file: PathBuf,
    },
    /// Print the patched rig and its default state.
    Patch {
        /// JSON rig configuration. Defaults to the built-in demo rig.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Entry script, evaluated first and on every full rebuild.
    entry: PathBuf,
    /// JSON rig configuration. Defaults to the built-in demo rig.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding one subdirectory per cue list.
    #[arg(long)]
    cues: Option<PathBuf>,
    /// Render rate in Hz.
    #[arg(long)]
    rate: Option<f64>,
    /// Print universes whenever the output changes.
    #[arg(long)]
    dump_universes: bool,
    /// Print the entry script's statement tree before running.
    #[arg(long)]
    print_ast: bool,
    /// Print fixture state after the entry script ran.
    #[arg(long)]
    print_state: bool,
    /// Do not reload scripts when they change on disk.
    #[arg(long)]
    no_watch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_watch_roots_collapse() {
        let roots = distinct_roots(vec![
            PathBuf::from("/show/cues"),
            PathBuf::from("/show"),
            PathBuf::from("/show"),
            PathBuf::from("/other/cues"),
        ]);
        assert_eq!(roots, vec![PathBuf::from("/other/cues"), PathBuf::from("/show")]);
    }

    #[test]
    fn sibling_roots_are_kept() {
        let roots = distinct_roots(vec![PathBuf::from("/show/cues"), PathBuf::from("/show/cuesheet")]);
        assert_eq!(roots.len(), 2);
    }
}
