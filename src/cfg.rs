use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::diag::{Diagnostics, DEFAULT_WARNING_LIMIT};
use crate::error::{Error, ErrorKind, Result};
use crate::exec::CommandRunner;
use crate::parser::{self, Input, Settings};
use crate::schema::Registry;
use crate::store::Config;
use crate::watcher::Watcher;

const TEXT_NAME: &str = "config-text";

/// Read configuration from a string, with default settings.
pub fn from_str(text: &str) -> Result<Config> {
    Builder::new().from_str(text)
}

/// Read configuration from a file, with default settings.
pub fn from_file(name: impl AsRef<Path>) -> Result<Config> {
    Builder::new().from_file(name)
}

/// Find the configuration file to use.
///
/// An explicitly given path must be readable. Without one, the first
/// readable entry of `candidates` is used.
pub fn locate_config(explicit: Option<&str>, candidates: &[&str]) -> Result<PathBuf> {
    if let Some(name) = explicit {
        return File::open(name).map(|_| PathBuf::from(name)).map_err(|e| Error::io(name, e));
    }
    for name in candidates {
        if File::open(name).is_ok() {
            debug!("locate_config: using {}", name);
            return Ok(PathBuf::from(name));
        }
    }
    Err(Error::new(
        ErrorKind::Io,
        format!("no readable config file (looked in {})", candidates.join(", ")),
    ))
}

/// Configuration builder.
pub struct Builder {
    settings: Settings,
    warning_limit: usize,
    watcher: Option<Watcher>,
}

impl Default for Builder {
    fn default() -> Builder {
        Builder {
            settings: Settings::default(),
            warning_limit: DEFAULT_WARNING_LIMIT,
            watcher: None,
        }
    }
}

impl Builder {
    /// Return a new builder with the standard schema and default limits.
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Schema to validate section types and keys against.
    pub fn registry(mut self, registry: Registry) -> Builder {
        self.settings.registry = registry;
        self
    }

    /// Size of the line buffer. Longer lines are read in pieces.
    pub fn line_buffer(mut self, size: usize) -> Builder {
        self.settings.line_buffer = size;
        self
    }

    /// Maximum length of a value. Longer values are truncated.
    pub fn value_max(mut self, size: usize) -> Builder {
        self.settings.value_max = size;
        self
    }

    /// Number of warnings logged individually before the rest are counted.
    pub fn warning_limit(mut self, limit: usize) -> Builder {
        self.warning_limit = limit;
        self
    }

    /// Runs the `#!` preprocessor.
    pub fn runner(mut self, runner: impl CommandRunner + Send + Sync + 'static) -> Builder {
        self.settings.runner = Arc::new(runner);
        self
    }

    /// Arguments for the `#!` preprocessor, replacing the ones on the `#!` line.
    pub fn preprocessor_args(mut self, args: impl Into<String>) -> Builder {
        self.settings.preprocessor_args = Some(args.into());
        self
    }

    /// Record loaded files in `watcher`.
    pub fn watcher(mut self, watcher: Watcher) -> Builder {
        self.watcher = Some(watcher);
        self
    }

    /// Turn this builder into a reusable parser context.
    pub fn build(self) -> ConfigParser {
        ConfigParser {
            settings: self.settings,
            diag: Diagnostics::new(self.warning_limit),
            active: None,
            last_error: None,
            source: None,
            watcher: self.watcher,
        }
    }

    /// Parse a string once.
    pub fn from_str(self, text: &str) -> Result<Config> {
        self.build().parse(&Source::Text(text.as_bytes().to_vec()))
    }

    /// Parse a file once.
    pub fn from_file(self, name: impl AsRef<Path>) -> Result<Config> {
        let mut parser = self.build();
        parser.load_file(name)?;
        parser.active.take().ok_or_else(|| Error::new(ErrorKind::Internal, "no configuration loaded"))
    }
}

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Text(Vec<u8>),
}

/// A parser context holding the active configuration.
///
/// Loading is all or nothing: when a parse fails the previously active
/// configuration stays in place and the error is kept in `last_error()`.
pub struct ConfigParser {
    settings: Settings,
    diag: Diagnostics,
    active: Option<Config>,
    last_error: Option<Error>,
    source: Option<Source>,
    watcher: Option<Watcher>,
}

impl ConfigParser {
    /// Load and activate a configuration file.
    pub fn load_file(&mut self, name: impl AsRef<Path>) -> Result<()> {
        self.load(Source::File(name.as_ref().to_path_buf()))
    }

    /// Load and activate configuration text.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        self.load(Source::Text(text.as_bytes().to_vec()))
    }

    /// Parse the last successfully loaded source again.
    pub fn reparse(&mut self) -> Result<()> {
        match self.source.clone() {
            Some(source) => self.load(source),
            None => {
                let err = Error::new(ErrorKind::Internal, "reparse: no configuration loaded yet");
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// True if a watched file changed since it was loaded.
    pub fn changed(&self) -> bool {
        self.watcher.as_ref().map(|w| w.changed()).unwrap_or(false)
    }

    /// Reparse if a watched file changed. Returns whether a reload happened.
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        if !self.changed() {
            return Ok(false);
        }
        self.reparse()?;
        Ok(true)
    }

    /// The active configuration.
    pub fn active(&self) -> Option<&Config> {
        self.active.as_ref()
    }

    /// Error from the most recent failed load, cleared by a successful one.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Warnings from the most recent load.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    fn load(&mut self, source: Source) -> Result<()> {
        match self.parse(&source) {
            Ok(config) => {
                if let (Some(watcher), Source::File(path)) = (&self.watcher, &source) {
                    watcher.clear();
                    if let Err(e) = watcher.add_file(&path.to_string_lossy()) {
                        warn!("cannot watch {}: {}", path.display(), e);
                    }
                }
                if let Source::File(path) = &source {
                    info!("loaded {}", path.display());
                }
                self.active = Some(config);
                self.source = Some(source);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                debug!("load failed, keeping previous configuration: {}", e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn parse(&mut self, source: &Source) -> Result<Config> {
        self.diag.reset();
        let input = match source {
            Source::File(path) => Input::File(path),
            Source::Text(data) => Input::Text { name: TEXT_NAME, data },
        };
        let res = parser::parse(input, &self.settings, &mut self.diag);
        self.diag.finish();
        res
    }
}
