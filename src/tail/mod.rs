//! Follow every file matching a glob and report new lines.
//!
//! Architecture:
//! ```text
//! notify (parent dirs) ──┐
//!                        ├─→ rescan → glob diff → on_watch / on_unwatch
//! poll interval ─────────┘          → per-file read → on_lines
//! ```
//!
//! notify only wakes the loop early; every wakeup does a full rescan, so a
//! missed event costs at most one poll interval.

mod file;


use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::core::Cancellation;
use file::{Start, TailedFile};

/// Default rescan interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum TailError {
    #[error("invalid file pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to start file system watcher")]
    Notify(#[from] notify::Error),
}

/// Receives file lifecycle events and new lines.
pub trait WatchHandler {
    fn on_watch(&mut self, file: &Path);
    fn on_unwatch(&mut self, file: &Path);
    fn on_lines(&mut self, file: &Path, lines: &[String]);
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Replay whole files found at startup.
    pub all_lines: bool,
    /// Replay this many trailing lines of files found at startup.
    pub tail_lines: usize,
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            all_lines: false,
            tail_lines: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WatchOptions {
    fn initial_start(&self) -> Start {
        if self.all_lines {
            Start::Beginning
        } else if self.tail_lines > 0 {
            Start::Tail(self.tail_lines)
        } else {
            Start::End
        }
    }
}

pub struct LogWatcher {
    pattern: String,
    options: WatchOptions,
    files: BTreeMap<PathBuf, TailedFile>,
    scanned: bool,
}

impl LogWatcher {
    pub fn new(pattern: &str, options: WatchOptions) -> Result<Self, TailError> {
        glob::Pattern::new(pattern).map_err(|source| TailError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            options,
            files: BTreeMap::new(),
            scanned: false,
        })
    }

    /// Files currently followed.
    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.files.values().map(TailedFile::path)
    }

    /// Follow files until `cancel` is set.
    pub fn watch<H: WatchHandler>(
        &mut self,
        handler: &mut H,
        cancel: &Cancellation,
    ) -> Result<(), TailError> {
        let (tx, rx) = channel::unbounded();
        let _watcher = self.start_notify(tx.clone())?;

        self.poll(handler);
        while !cancel.is_cancelled() {
            // `tx` outlives the loop, so this only ever times out or wakes
            let _ = rx.recv_timeout(self.options.poll_interval);
            while rx.try_recv().is_ok() {}
            self.poll(handler);
        }
        Ok(())
    }

    /// One rescan: unwatch vanished files, read grown ones, add new ones.
    ///
    /// Files found by the first scan start where [`WatchOptions`] says;
    /// files that appear later are read from the beginning.
    pub fn poll<H: WatchHandler>(&mut self, handler: &mut H) {
        let found = self.discover();
        let present: FxHashSet<&Path> = found.iter().map(PathBuf::as_path).collect();

        let gone: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|path| !present.contains(path.as_path()))
            .cloned()
            .collect();
        for path in gone {
            self.unwatch(&path, handler);
        }

        let mut vanished = Vec::new();
        for (path, file) in &mut self.files {
            match file.read_new() {
                Ok(lines) if !lines.is_empty() => handler.on_lines(path, &lines),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => vanished.push(path.clone()),
                Err(e) => crate::debug!("tail"; "failed to read {}: {}", path.display(), e),
            }
        }
        for path in vanished {
            self.unwatch(&path, handler);
        }

        let start = if self.scanned {
            Start::Beginning
        } else {
            self.options.initial_start()
        };
        self.scanned = true;

        for path in found {
            if self.files.contains_key(&path) {
                continue;
            }
            match TailedFile::open(&path, start) {
                Ok((file, lines)) => {
                    handler.on_watch(&path);
                    if !lines.is_empty() {
                        handler.on_lines(&path, &lines);
                    }
                    self.files.insert(path, file);
                }
                Err(e) => crate::debug!("tail"; "failed to open {}: {}", path.display(), e),
            }
        }
    }

    fn unwatch<H: WatchHandler>(&mut self, path: &Path, handler: &mut H) {
        if self.files.remove(path).is_some() {
            handler.on_unwatch(path);
        }
    }

    fn discover(&self) -> Vec<PathBuf> {
        let Ok(paths) = glob::glob(&self.pattern) else {
            return Vec::new();
        };
        let mut found: Vec<PathBuf> = paths.flatten().filter(|p| p.is_file()).collect();
        found.sort();
        found
    }

    fn start_notify(&self, tx: Sender<()>) -> Result<Option<RecommendedWatcher>, TailError> {
        let (root, recursive) = watch_root(&self.pattern);
        if !root.is_dir() {
            crate::debug!("tail"; "{} does not exist, polling only", root.display());
            return Ok(None);
        }

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        })?;
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode)?;
        crate::debug!("tail"; "watching {}", root.display());
        Ok(Some(watcher))
    }
}

/// Deepest directory without glob syntax, and whether any directory
/// component below it is a pattern.
fn watch_root(pattern: &str) -> (PathBuf, bool) {
    let is_glob = |s: &str| s.contains(['*', '?', '[']);
    let path = Path::new(pattern);

    let mut root = PathBuf::new();
    let mut components = path.components().peekable();
    while let Some(component) = components.next() {
        let last = components.peek().is_none();
        if last || matches!(component, Component::Normal(s) if is_glob(&s.to_string_lossy())) {
            if root.as_os_str().is_empty() {
                root.push(".");
            }
            return (root, !last);
        }
        root.push(component);
    }
    (PathBuf::from("."), false)
}
