//! Non-fatal warnings produced while parsing.
//!
//! Warnings are logged as they happen, up to a limit. Past the limit they
//! are only counted, and `finish` logs a single summary line.

use std::fmt;

pub const DEFAULT_WARNING_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    Deprecated,
    Removed,
    NotMultiValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub key: String,
    pub file_name: String,
    pub line: u32,
    pub msg: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    limit: usize,
    total: usize,
    warnings: Vec<Warning>,
}

impl Default for Diagnostics {
    fn default() -> Diagnostics {
        Diagnostics::new(DEFAULT_WARNING_LIMIT)
    }
}

impl Diagnostics {
    pub fn new(limit: usize) -> Diagnostics {
        Diagnostics { limit, total: 0, warnings: Vec::new() }
    }

    /// Forget everything from an earlier parse.
    pub fn reset(&mut self) {
        self.total = 0;
        self.warnings.clear();
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        self.total += 1;
        if self.total <= self.limit {
            warn!("{}", warning.msg);
            self.warnings.push(warning);
        }
    }

    /// Log the "more warnings skipped" summary, if any were skipped.
    pub(crate) fn finish(&self) {
        if self.suppressed() > 0 {
            warn!("{} more warnings skipped.", self.suppressed());
        }
    }

    /// Warnings that were emitted individually.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// All warnings, emitted or not.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn suppressed(&self) -> usize {
        self.total.saturating_sub(self.limit)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
