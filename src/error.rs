use serde::de;
use std::fmt;
use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration could not be opened or read.
    Io,
    /// Unexpected character, token or end of input.
    Syntax,
    /// Unknown section type or key name.
    Schema,
    /// Duplicate section, or inheritance from a missing parent.
    Structure,
    /// The shebang preprocessor could not be run or failed.
    Preprocessor,
    /// A stored value could not be converted by a typed accessor.
    Value,
    /// The state machine reached a state it has no transition for.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            ErrorKind::Io => "i/o error",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Schema => "schema error",
            ErrorKind::Structure => "structure error",
            ErrorKind::Preprocessor => "preprocessor error",
            ErrorKind::Value => "value error",
            ErrorKind::Internal => "internal error",
        }
    }
}

/// Line and column in the input. Both are 1-based; a line of `0`
/// means "no position".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Position {
        Position { line, column }
    }

    pub fn none() -> Position {
        Position { line: 0, column: 0 }
    }

    pub fn is_none(&self) -> bool {
        self.line == 0
    }
}

#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub pos: Position,
    pub msg: String,
    pub file_name: String,
    /// Up to 16 bytes of the line right before `pos`.
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Error {
        Error {
            kind,
            pos: Position::none(),
            msg: msg.into(),
            file_name: "config-text".to_string(),
            context: String::new(),
        }
    }

    pub(crate) fn at(mut self, file_name: &str, pos: Position, context: impl Into<String>) -> Error {
        self.file_name = file_name.to_string();
        self.pos = pos;
        self.context = context.into();
        self
    }

    pub(crate) fn io(name: &str, e: io::Error) -> Error {
        let mut err = Error::new(ErrorKind::Io, e.to_string());
        err.file_name = name.to_string();
        err
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::new(ErrorKind::Value, msg.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pos.is_none() {
            write!(f, "{}: {}", self.file_name, self.msg)?;
        } else {
            write!(f, "{}:{}:{}: {}", self.file_name, self.pos.line, self.pos.column, self.msg)?;
        }
        if !self.context.is_empty() {
            write!(f, " (near '{}')", self.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_position() {
        let e = Error::new(ErrorKind::Syntax, "expected '{', got 'x'")
            .at("sphinx.conf", Position::new(3, 7), "index foo x");
        assert_eq!(e.to_string(), "sphinx.conf:3:7: expected '{', got 'x' (near 'index foo x')");
    }

    #[test]
    fn display_without_position() {
        let e = Error::new(ErrorKind::Value, "bad integer");
        assert_eq!(e.to_string(), "config-text: bad integer");
        assert_eq!(e.kind(), ErrorKind::Value);
    }
}
