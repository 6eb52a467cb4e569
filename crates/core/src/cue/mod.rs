//! File-backed cue lists and the replay policy used to reach a cue.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{LuxError, Result};

/// What the caller has to evaluate to reach the requested cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    /// Reset the world before replaying.
    pub rebuild: bool,
    /// Files in replay order. Every file but the last is fast-forwarded.
    pub files: Vec<PathBuf>,
}

impl Replay {
    fn rebuild(files: Vec<PathBuf>) -> Self {
        Self {
            rebuild: true,
            files,
        }
    }

    fn incremental(files: Vec<PathBuf>) -> Self {
        Self {
            rebuild: false,
            files,
        }
    }
}

/// One script file plus the `// key: value` header lines at its top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    path: PathBuf,
    name: String,
    metadata: BTreeMap<String, String>,
}

impl Cue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            metadata: BTreeMap::new(),
        }
    }

    /// Reads the header metadata from disk.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let mut cue = Self::new(path);
        let source = fs::read_to_string(&cue.path)?;
        cue.metadata = parse_metadata(&source);
        Ok(cue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// The `name:` header when present, else the file name.
    pub fn label(&self) -> &str {
        self.metadata
            .get("name")
            .map_or(self.name.as_str(), String::as_str)
    }
}

/// Parses the leading comment block: `// key: value` lines until the first
/// line that is neither blank nor a comment.
pub fn parse_metadata(source: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for line in source.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        let Some(comment) = line.strip_prefix("//") else {
            break;
        };
        if let Some((key, value)) = comment.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                metadata.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    metadata
}

/// The regular, non-hidden files in `dir`, sorted by name.
fn cue_files(dir: &Path) -> Result<Vec<Cue>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    paths.into_iter().map(Cue::read).collect()
}

/// Ordered cues from one directory with a 0-based current index.
#[derive(Debug, Clone)]
pub struct CueList {
    name: String,
    dir: Option<PathBuf>,
    cues: Vec<Cue>,
    current: usize,
}

impl CueList {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = fs::canonicalize(dir.as_ref())?;
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cues = cue_files(&dir)?;
        debug!(list = %name, cues = cues.len(), "opened cue list");
        Ok(Self {
            name,
            dir: Some(dir),
            cues,
            current: 0,
        })
    }

    /// A list not backed by a directory; [`CueList::reload`] keeps it as is.
    pub fn from_cues(name: impl Into<String>, cues: Vec<Cue>) -> Self {
        Self {
            name: name.into(),
            dir: None,
            cues,
            current: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_cue(&self) -> Option<&Cue> {
        self.cues.get(self.current)
    }

    fn paths(&self, range: std::ops::RangeInclusive<usize>) -> Vec<PathBuf> {
        self.cues[range]
            .iter()
            .map(|cue| cue.path.clone())
            .collect()
    }

    /// Advances one cue, wrapping to the first. Wrapping is a rebuild.
    pub fn go(&mut self) -> Option<Replay> {
        if self.cues.is_empty() {
            return None;
        }

        self.current = (self.current + 1) % self.cues.len();
        info!(list = %self.name, cue = self.current, "go");
        if self.current == 0 {
            return Some(Replay::rebuild(self.paths(0..=0)));
        }
        Some(Replay::incremental(self.paths(self.current..=self.current)))
    }

    /// Jumps to cue `n`. Out-of-range and already-current targets are
    /// no-ops. Moving forward replays from the old cue to `n`; moving back
    /// rebuilds from the top.
    pub fn goto(&mut self, n: usize) -> Option<Replay> {
        if n >= self.cues.len() || n == self.current {
            return None;
        }

        let old = self.current;
        self.current = n;
        info!(list = %self.name, from = old, to = n, "goto");

        if n == 0 {
            Some(Replay::rebuild(self.paths(0..=0)))
        } else if n > old {
            Some(Replay::incremental(self.paths(old..=n)))
        } else {
            Some(Replay::rebuild(self.paths(0..=n)))
        }
    }

    /// Moves back to the first cue. Its file is played on top of the
    /// current state.
    pub fn restart(&mut self) -> Replay {
        self.current = 0;
        if self.cues.is_empty() {
            return Replay::incremental(Vec::new());
        }
        Replay::incremental(self.paths(0..=0))
    }

    pub fn position(&self, path: &Path) -> Option<usize> {
        self.cues.iter().position(|cue| cue.path == path)
    }

    pub fn cue_is_before_current(&self, path: &Path) -> bool {
        self.position(path)
            .map_or(false, |index| index <= self.current)
    }

    pub fn all_cues_till_current(&self) -> Vec<PathBuf> {
        if self.cues.is_empty() {
            return Vec::new();
        }
        self.paths(0..=self.current)
    }

    /// Rescans the directory and finds the current cue again by path,
    /// falling back to the first cue when it is gone.
    pub fn reload(&mut self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let current = self.current_cue().map(|cue| cue.path.clone());
        self.cues = cue_files(dir)?;
        self.current = current
            .and_then(|path| self.position(&path))
            .unwrap_or(0);
        debug!(list = %self.name, cues = self.cues.len(), current = self.current, "reloaded cue list");
        Ok(())
    }
}

/// Every cue list under a root directory (one per subdirectory) and the
/// currently loaded one.
#[derive(Debug, Clone, Default)]
pub struct CueEngine {
    lists: BTreeMap<String, CueList>,
    current: Option<String>,
}

impl CueEngine {
    /// Opens `root`. A missing root is fatal.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(LuxError::MissingCueDirectory(root.to_path_buf()));
        }

        let mut lists = BTreeMap::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let list = CueList::open(entry.path())?;
                lists.insert(list.name().to_string(), list);
            }
        }
        info!(root = %root.display(), lists = lists.len(), "opened cue engine");
        Ok(Self {
            lists,
            current: None,
        })
    }

    pub fn from_lists(lists: impl IntoIterator<Item = CueList>) -> Self {
        Self {
            lists: lists
                .into_iter()
                .map(|list| (list.name().to_string(), list))
                .collect(),
            current: None,
        }
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.lists.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.lists.contains_key(identifier)
    }

    pub fn current(&self) -> Option<&CueList> {
        self.current.as_ref().and_then(|name| self.lists.get(name))
    }

    fn current_mut(&mut self) -> Option<&mut CueList> {
        let name = self.current.as_ref()?;
        self.lists.get_mut(name)
    }

    /// Makes `identifier` the active list, positioned at its first cue.
    /// Unknown identifiers are ignored.
    pub fn load(&mut self, identifier: &str) -> Option<Replay> {
        let list = self.lists.get_mut(identifier)?;
        let replay = list.restart();
        self.current = Some(identifier.to_string());
        info!(list = identifier, "loaded cue list");
        Some(replay)
    }

    pub fn go(&mut self) -> Option<Replay> {
        self.current_mut()?.go()
    }

    pub fn goto(&mut self, n: usize) -> Option<Replay> {
        self.current_mut()?.goto(n)
    }

    /// Files to replay after `path` was edited: everything up to the current
    /// cue when the edit is at or before it, otherwise nothing.
    pub fn files_to_rerun(&self, path: &Path) -> Vec<PathBuf> {
        match self.current() {
            Some(list) if list.cue_is_before_current(path) => list.all_cues_till_current(),
            _ => Vec::new(),
        }
    }

    pub fn is_current_cue(&self, path: &Path) -> bool {
        self.current()
            .and_then(CueList::current_cue)
            .map_or(false, |cue| cue.path() == path)
    }

    /// Rescans the named list; `false` when no such list exists.
    pub fn reload(&mut self, identifier: &str) -> Result<bool> {
        match self.lists.get_mut(identifier) {
            Some(list) => list.reload().map(|_| true),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(count: usize) -> CueList {
        let cues = (0..count).map(|i| Cue::new(format!("cue{i}"))).collect();
        CueList::from_cues("main", cues)
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn goto_forward_replays_incrementally() {
        let mut list = list(5);
        list.goto(1);
        assert_eq!(
            list.goto(3),
            Some(Replay {
                rebuild: false,
                files: paths(&["cue1", "cue2", "cue3"]),
            })
        );
        assert_eq!(list.current(), 3);
    }

    #[test]
    fn goto_first_or_backward_rebuilds() {
        let mut list = list(5);
        list.goto(3);
        assert_eq!(
            list.goto(2),
            Some(Replay {
                rebuild: true,
                files: paths(&["cue0", "cue1", "cue2"]),
            })
        );
        assert_eq!(
            list.goto(0),
            Some(Replay {
                rebuild: true,
                files: paths(&["cue0"]),
            })
        );
    }

    #[test]
    fn goto_ignores_out_of_range_and_current() {
        let mut list = list(3);
        assert_eq!(list.goto(0), None);
        assert_eq!(list.goto(3), None);
        assert_eq!(list.current(), 0);
    }

    #[test]
    fn go_advances_and_wraps_with_rebuild() {
        let mut list = list(2);
        assert_eq!(
            list.go(),
            Some(Replay {
                rebuild: false,
                files: paths(&["cue1"]),
            })
        );
        assert_eq!(
            list.go(),
            Some(Replay {
                rebuild: true,
                files: paths(&["cue0"]),
            })
        );
        assert_eq!(CueList::from_cues("empty", Vec::new()).go(), None);
    }

    #[test]
    fn editing_past_cues_reruns_history() {
        let mut engine = CueEngine::from_lists([list(5)]);
        assert!(engine.files_to_rerun(Path::new("cue1")).is_empty());

        engine.load("main");
        engine.goto(4);
        assert_eq!(
            engine.files_to_rerun(Path::new("cue1")),
            paths(&["cue0", "cue1", "cue2", "cue3", "cue4"])
        );

        engine.goto(2);
        assert!(engine.files_to_rerun(Path::new("cue3")).is_empty());
        assert!(engine.files_to_rerun(Path::new("elsewhere")).is_empty());
    }

    #[test]
    fn load_restarts_the_list() {
        let mut engine = CueEngine::from_lists([list(3)]);
        assert_eq!(engine.load("missing"), None);
        engine.load("main");
        engine.go();
        let replay = engine.load("main").unwrap();
        assert!(!replay.rebuild);
        assert_eq!(replay.files, paths(&["cue0"]));
        assert!(engine.is_current_cue(Path::new("cue0")));
    }

    #[test]
    fn metadata_comes_from_leading_comments() {
        let source = "// name: Opening\n//note: house to half\n\n[]\n// later: ignored\n";
        let metadata = parse_metadata(source);
        assert_eq!(metadata.get("name").map(String::as_str), Some("Opening"));
        assert_eq!(metadata.get("note").map(String::as_str), Some("house to half"));
        assert!(!metadata.contains_key("later"));
    }

    #[test]
    fn engine_reads_directories_and_reloads() {
        let root = tempfile::tempdir().unwrap();
        let main = root.path().join("main");
        fs::create_dir(&main).unwrap();
        for (name, header) in [("01.lux", "// name: Walk in"), ("02.lux", ""), ("03.lux", "")] {
            fs::write(main.join(name), format!("{header}\n[]\n")).unwrap();
        }
        fs::write(main.join(".01.lux.swp"), "").unwrap();
        fs::write(root.path().join("stray.lux"), "[]").unwrap();

        let mut engine = CueEngine::open(root.path()).unwrap();
        assert_eq!(engine.list_names(), vec!["main"]);
        engine.load("main");
        engine.goto(2);

        let list = engine.current().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.cues()[0].label(), "Walk in");
        assert_eq!(list.cues()[1].label(), "02.lux");

        fs::remove_file(main.join("02.lux")).unwrap();
        assert!(engine.reload("main").unwrap());
        let list = engine.current().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.current_cue().unwrap().name(), "03.lux");

        fs::remove_file(main.join("03.lux")).unwrap();
        engine.reload("main").unwrap();
        assert_eq!(engine.current().unwrap().current(), 0);
        assert!(!engine.reload("other").unwrap());
    }

    #[test]
    fn missing_root_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let err = CueEngine::open(root.path().join("nope")).unwrap_err();
        assert!(matches!(err, LuxError::MissingCueDirectory(_)));
        assert!(err.is_fatal());
    }
}
