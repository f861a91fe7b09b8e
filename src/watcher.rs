use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

// A config file name (or glob pattern) and the mtime of every file it
// matched when it was last loaded.
struct WatchedPattern {
    pattern: String,
    mtimes: BTreeMap<PathBuf, SystemTime>,
}

impl WatchedPattern {
    fn scan(pattern: &str) -> io::Result<WatchedPattern> {
        let entries = glob::glob(pattern)
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, format!("{}: {}", pattern, e)))?;

        let mut mtimes = BTreeMap::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                let msg = format!("{}: {}", e.path().display(), e.error());
                io::Error::new(e.error().kind(), msg)
            })?;
            let mtime = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
            mtimes.insert(path, mtime);
        }
        if mtimes.is_empty() {
            return Err(io::Error::new(ErrorKind::NotFound, format!("{}: file not found", pattern)));
        }

        Ok(WatchedPattern { pattern: pattern.to_string(), mtimes })
    }

    // A file that appeared, vanished or was touched since the scan.
    fn changed(&self) -> bool {
        match WatchedPattern::scan(&self.pattern) {
            Ok(now) => now.mtimes != self.mtimes,
            Err(_) => true,
        }
    }
}

/// Check if the configuration has changed on disk.
///
/// A `Watcher` remembers the modification time of every configuration
/// file loaded through a [`crate::ConfigParser`] it was handed to via
/// [`crate::Builder::watcher`]. Clones share the same state.
#[derive(Clone, Default)]
pub struct Watcher {
    inner: Arc<Mutex<WatcherInner>>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[private]")
    }
}

#[derive(Default)]
struct WatcherInner {
    patterns: Vec<WatchedPattern>,
}

impl Watcher {
    /// Create a new watcher.
    pub fn new() -> Watcher {
        Watcher::default()
    }

    fn lock(&self) -> MutexGuard<'_, WatcherInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an extra file (or wildcard pattern) to be watched for changes.
    pub fn add_file(&self, file: &str) -> io::Result<()> {
        let watched = WatchedPattern::scan(file)?;
        let mut inner = self.lock();
        inner.patterns.retain(|p| p.pattern != watched.pattern);
        inner.patterns.push(watched);
        Ok(())
    }

    /// Forget all watched files.
    pub fn clear(&self) {
        self.lock().patterns.clear();
    }

    /// Check if any watched files have changed.
    pub fn changed(&self) -> bool {
        self.lock().patterns.iter().any(|p| p.changed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("searchconf-watcher-{}-{}", std::process::id(), name));
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn detects_modification_and_removal() {
        let path = temp_file("a.conf", "indexer {\n}\n");
        let name = path.to_string_lossy().to_string();
        let watcher = Watcher::new();
        watcher.add_file(&name).unwrap();
        assert!(!watcher.changed());

        let later = SystemTime::now() + std::time::Duration::from_secs(10);
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(later).unwrap();
        assert!(watcher.changed());

        // re-adding records the new time.
        watcher.add_file(&name).unwrap();
        assert!(!watcher.changed());

        fs::remove_file(&path).unwrap();
        assert!(watcher.changed());

        watcher.clear();
        assert!(!watcher.changed());
    }

    #[test]
    fn new_file_matching_pattern() {
        let dir = std::env::temp_dir().join(format!("searchconf-watcher-dir-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.conf"), "").unwrap();
        let watcher = Watcher::new();
        watcher.add_file(&format!("{}/*.conf", dir.display())).unwrap();
        assert!(!watcher.changed());

        fs::write(dir.join("b.conf"), "").unwrap();
        assert!(watcher.changed());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file() {
        let watcher = Watcher::new();
        let err = watcher.add_file("/nonexistent/searchconf/*.conf").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
