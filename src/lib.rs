//! Streaming parser for search daemon configuration files.
//!
//! ```text
//! source src1 {
//!     type = mysql
//!     sql_query = SELECT id, title FROM docs
//! }
//!
//! index main : base {
//!     source = src1
//!     path = /var/data/main
//! }
//!
//! searchd {
//!     listen = 9312
//!     listen = 9306:mysql41
//! }
//! ```
//!
//! Section types and their keys are checked against a [`Registry`].
//! Named sections can inherit from an earlier section of the same type.
//! A file starting with `#!` is run through that command first, and its
//! output is parsed instead.
#[macro_use]
extern crate log;

mod cfg;
mod de;
mod diag;
mod error;
mod exec;
mod parser;
mod reader;
mod schema;
mod store;
mod watcher;

pub use cfg::{from_file, from_str, locate_config, Builder, ConfigParser};
pub use diag::{Diagnostics, Warning, WarningKind, DEFAULT_WARNING_LIMIT};
pub use error::{Error, ErrorKind, Position, Result};
pub use exec::{CommandRunner, ExecError, Shebang, SystemRunner};
pub use parser::DEFAULT_VALUE_MAX;
pub use reader::DEFAULT_LINE_BUFFER;
pub use schema::{KeyDesc, KeyFlags, Registry, SchemaError, SectionDesc, SectionKind};
pub use store::{AddOutcome, Config, KeyChain, Section, Value};
pub use watcher::Watcher;
