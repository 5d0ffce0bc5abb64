// Shader hot-reload (file watching)
//
// Watches the directories holding the compiled shaders rather than the files
// themselves: compilers and editors often replace a file instead of writing
// to it, which drops a per-file watch.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, TryRecvError};

pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    file_names: HashSet<OsString>,
}

impl ShaderWatcher {
    pub fn new(paths: &[&Path]) -> Result<Self> {
        let (tx, events) = channel();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;

        let mut dirs = HashSet::new();
        let mut file_names = HashSet::new();
        for path in paths {
            let file_name = path
                .file_name()
                .with_context(|| format!("Shader path {:?} has no file name", path))?;
            file_names.insert(file_name.to_os_string());

            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };
            dirs.insert(dir);
        }

        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {:?}", dir))?;
            log::info!("Watching {:?} for shader changes", dir);
        }

        Ok(Self {
            _watcher: watcher,
            events,
            file_names,
        })
    }

    /// Drains pending events; true if any watched shader changed
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => changed |= is_shader_change(&event, &self.file_names),
                Ok(Err(e)) => log::warn!("Shader watcher error: {}", e),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }
}

fn is_shader_change(event: &Event, file_names: &HashSet<OsString>) -> bool {
    let writes = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    );
    writes
        && event.paths.iter().any(|path| {
            path.file_name()
                .is_some_and(|name| file_names.contains(name))
        })
}
