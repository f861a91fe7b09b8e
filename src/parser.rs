//! The configuration parser: a character-at-a-time state machine with an
//! explicit stack of return states.
//!
//! Callers push a state to run a sub-machine (a token, a comment, an
//! expected character) and get control back, with the terminating
//! character not consumed, when that state pops.

use std::path::Path;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::diag::{Diagnostics, Warning, WarningKind};
use crate::error::{Error, ErrorKind, Result};
use crate::exec::{CommandRunner, Shebang, SystemRunner};
use crate::reader::{Fill, LineReader, DEFAULT_LINE_BUFFER};
use crate::schema::{KeyFlags, Registry, SchemaError, SectionKind};
use crate::store::Config;

pub const DEFAULT_VALUE_MAX: usize = 65535;

const STACK_DEPTH: usize = 8;
const TOKEN_MAX: usize = 64;

/// Parser tunables, shared by every parse run from one context.
#[derive(Clone)]
pub(crate) struct Settings {
    pub registry: Registry,
    pub line_buffer: usize,
    pub value_max: usize,
    pub runner: Arc<dyn CommandRunner + Send + Sync>,
    pub preprocessor_args: Option<String>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            registry: Registry::standard(),
            line_buffer: DEFAULT_LINE_BUFFER,
            value_max: DEFAULT_VALUE_MAX,
            runner: Arc::new(SystemRunner),
            preprocessor_args: None,
        }
    }
}

/// Where the text comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Input<'a> {
    File(&'a Path),
    Text { name: &'a str, data: &'a [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    CommentSkip,
    Token,
    SectionType,
    ExpectChar(u8),
    SectionBody,
    Key,
    Value,
    SectionName,
    SectionBase,
}

// What to do with the input after a state handled a character.
enum Step {
    // consume it.
    Next,
    // hand the same character to the (new) current state.
    Again,
    // consume this many characters.
    Skip(usize),
    // drop the rest of the line.
    SkipLine,
    // run the `#!` command and parse its output instead.
    Preprocess,
}

/// Parse one input into a fresh `Config`.
pub(crate) fn parse(input: Input<'_>, settings: &Settings, diag: &mut Diagnostics) -> Result<Config> {
    let (reader, file_name, is_file) = match input {
        Input::File(path) => {
            let name = path.to_string_lossy().to_string();
            let reader = LineReader::from_file(path, settings.line_buffer).map_err(|e| Error::io(&name, e))?;
            (reader, name, true)
        }
        Input::Text { name, data } => (LineReader::from_bytes(data, settings.line_buffer), name.to_string(), false),
    };
    debug!("parse: {}", file_name);

    let mut engine = Engine {
        settings,
        diag,
        reader,
        file_name,
        is_file,
        preprocess: true,
        state: State::Start,
        stack: SmallVec::new(),
        token: String::new(),
        value: Vec::new(),
        section_type: String::new(),
        section_name: String::new(),
        key: "",
        discard: false,
        truncated: false,
        last_key: None,
        config: Config::new(),
    };
    engine.run()?;
    Ok(engine.config)
}

struct Engine<'a> {
    settings: &'a Settings,
    diag: &'a mut Diagnostics,
    reader: LineReader,
    file_name: String,
    is_file: bool,
    preprocess: bool,
    state: State,
    stack: SmallVec<[State; STACK_DEPTH]>,
    token: String,
    value: Vec<u8>,
    section_type: String,
    section_name: String,
    key: &'static str,
    // the value being read belongs to a single-value key that is already set.
    discard: bool,
    truncated: bool,
    // key of the last value stored in the open section.
    last_key: Option<&'static str>,
    config: Config,
}

fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

fn is_space(c: u8) -> bool {
    c.is_ascii_whitespace()
}

fn show(c: u8) -> String {
    (c as char).escape_default().to_string()
}

impl<'a> Engine<'a> {
    fn run(&mut self) -> Result<()> {
        loop {
            if self.reader.at_end() {
                if self.reader.refill().map_err(|e| self.error(ErrorKind::Io, e.to_string()))? == Fill::Eof {
                    break;
                }
            }
            let c = match self.reader.peek(0) {
                Some(c) => c,
                None => continue,
            };
            match self.step(c)? {
                Step::Next => self.reader.advance(1),
                Step::Again => {}
                Step::Skip(n) => self.reader.advance(n),
                Step::SkipLine => self.reader.skip_line(),
                Step::Preprocess => self.run_preprocessor()?,
            }
        }
        self.end_of_input()
    }

    fn step(&mut self, c: u8) -> Result<Step> {
        match self.state {
            State::Start => {
                if is_space(c) {
                    return Ok(Step::Next);
                }
                if c == b'#' {
                    if self.preprocess && self.reader.at_input_start() && self.reader.peek(1) == Some(b'!') {
                        return Ok(Step::Preprocess);
                    }
                    self.push(State::CommentSkip)?;
                    return Ok(Step::Again);
                }
                if c.is_ascii_alphabetic() {
                    self.push(State::SectionType)?;
                    self.begin_token()?;
                    return Ok(Step::Again);
                }
                Err(self.syntax(format!("unexpected character '{}'", show(c))))
            }

            State::CommentSkip => {
                self.pop()?;
                Ok(Step::SkipLine)
            }

            State::Token => {
                if !is_token_char(c) {
                    self.pop()?;
                    return Ok(Step::Again);
                }
                if self.token.len() >= TOKEN_MAX {
                    return Err(self.syntax("token too long"));
                }
                self.token.push(c as char);
                Ok(Step::Next)
            }

            State::SectionType => {
                if is_space(c) {
                    return Ok(Step::Next);
                }
                if c == b'#' {
                    self.push(State::CommentSkip)?;
                    return Ok(Step::Again);
                }
                match self.settings.registry.classify(&self.token) {
                    Some(SectionKind::Plain) => {
                        let name = std::mem::take(&mut self.token);
                        self.add_section(name.clone(), name)?;
                        self.state = State::SectionBody;
                        self.push(State::ExpectChar(b'{'))?;
                        Ok(Step::Again)
                    }
                    Some(SectionKind::Named) => {
                        self.section_type = std::mem::take(&mut self.token);
                        self.state = State::SectionName;
                        Ok(Step::Again)
                    }
                    None => Err(self.error(ErrorKind::Schema, format!("invalid section type '{}'", self.token))),
                }
            }

            State::ExpectChar(want) => {
                if is_space(c) {
                    return Ok(Step::Next);
                }
                if c == b'#' {
                    self.push(State::CommentSkip)?;
                    return Ok(Step::Again);
                }
                if c != want {
                    return Err(self.syntax(format!("expected '{}', got '{}'", show(want), show(c))));
                }
                self.pop()?;
                Ok(Step::Next)
            }

            State::SectionBody => {
                if is_space(c) {
                    return Ok(Step::Next);
                }
                match c {
                    b'#' => {
                        self.push(State::CommentSkip)?;
                        Ok(Step::Again)
                    }
                    b'}' => {
                        debug!("end of section {} '{}'", self.section_type, self.section_name);
                        self.last_key = None;
                        self.pop()?;
                        Ok(Step::Next)
                    }
                    c if c.is_ascii_alphabetic() => {
                        self.push(State::Key)?;
                        self.begin_token()?;
                        Ok(Step::Again)
                    }
                    c => Err(self.syntax(format!("section contents: expected token, got '{}'", show(c)))),
                }
            }

            State::Key => {
                self.validate_key()?;
                self.value.clear();
                self.state = State::Value;
                self.push(State::ExpectChar(b'='))?;
                Ok(Step::Again)
            }

            State::Value => match c {
                b'\n' => {
                    self.commit_value()?;
                    self.pop()?;
                    Ok(Step::Next)
                }
                b'#' => {
                    self.commit_value()?;
                    self.pop()?;
                    self.push(State::CommentSkip)?;
                    Ok(Step::Again)
                }
                b'\\' => match self.reader.peek(1) {
                    // continuation: the rest of the line, newline included, is dropped.
                    Some(b'\n') => {
                        self.push(State::CommentSkip)?;
                        Ok(Step::Again)
                    }
                    Some(b'\r') if matches!(self.reader.peek(2), Some(b'\n') | None) => {
                        self.push(State::CommentSkip)?;
                        Ok(Step::Again)
                    }
                    Some(b'#') => {
                        self.push_value(b'#');
                        Ok(Step::Skip(2))
                    }
                    _ => {
                        self.push_value(c);
                        Ok(Step::Next)
                    }
                },
                c => {
                    self.push_value(c);
                    Ok(Step::Next)
                }
            },

            State::SectionName => {
                if is_space(c) {
                    return Ok(Step::Next);
                }
                if self.token.is_empty() {
                    if !is_token_char(c) {
                        return Err(self.syntax(format!("named section: expected name, got '{}'", show(c))));
                    }
                    self.begin_token()?;
                    return Ok(Step::Again);
                }
                let name = std::mem::take(&mut self.token);
                self.add_section(self.section_type.clone(), name)?;
                match c {
                    b':' => {
                        self.state = State::SectionBase;
                        Ok(Step::Next)
                    }
                    b'{' => {
                        self.state = State::SectionBody;
                        Ok(Step::Next)
                    }
                    c => Err(self.syntax(format!("named section: expected ':' or '{{', got '{}'", show(c)))),
                }
            }

            State::SectionBase => {
                if is_space(c) {
                    return Ok(Step::Next);
                }
                if self.token.is_empty() {
                    if !is_token_char(c) {
                        return Err(self.syntax(format!("named section: expected parent name, got '{}'", show(c))));
                    }
                    self.begin_token()?;
                    return Ok(Step::Again);
                }
                let parent = std::mem::take(&mut self.token);
                if !self.config.inherit(&self.section_type, &self.section_name, &parent) {
                    return Err(self.error(
                        ErrorKind::Structure,
                        format!("inherited section '{}': parent doesn't exist", parent),
                    ));
                }
                debug!("{} '{}' inherits from '{}'", self.section_type, self.section_name, parent);
                self.state = State::SectionBody;
                self.push(State::ExpectChar(b'{'))?;
                Ok(Step::Again)
            }
        }
    }

    // Input ran out. Only a finished value or comment may be pending.
    fn end_of_input(&mut self) -> Result<()> {
        loop {
            match self.state {
                State::Start if self.stack.is_empty() => return Ok(()),
                State::CommentSkip => self.pop()?,
                State::Value => {
                    self.commit_value()?;
                    self.pop()?;
                }
                State::SectionBody => {
                    if !self.close_on_trailing_brace() {
                        return Err(self.syntax("unexpected end of file"));
                    }
                    self.pop()?;
                }
                _ => return Err(self.syntax("unexpected end of file")),
            }
        }
    }

    // `indexer { mem_limit = 128M }` on the last line: the brace ended up in
    // the value. Take it back and treat it as the end of the section.
    fn close_on_trailing_brace(&mut self) -> bool {
        let key = match self.last_key.take() {
            Some(key) => key,
            None => return false,
        };
        match self.config.section_mut(&self.section_type, &self.section_name) {
            Some(section) => section.strip_trailing_brace(key),
            None => false,
        }
    }

    fn push(&mut self, next: State) -> Result<()> {
        if self.stack.len() >= STACK_DEPTH {
            return Err(self.error(ErrorKind::Internal, "state stack overflow"));
        }
        self.stack.push(self.state);
        self.state = next;
        Ok(())
    }

    fn pop(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(state) => {
                self.state = state;
                Ok(())
            }
            None => Err(self.error(ErrorKind::Internal, "state stack underflow")),
        }
    }

    fn begin_token(&mut self) -> Result<()> {
        self.token.clear();
        self.push(State::Token)
    }

    fn add_section(&mut self, section_type: String, name: String) -> Result<()> {
        if !self.config.add_section(&section_type, &name) {
            return Err(self.error(
                ErrorKind::Structure,
                format!("section '{}' (type='{}') already exists", name, section_type),
            ));
        }
        debug!("new section {} '{}'", section_type, name);
        self.last_key = None;
        self.section_type = section_type;
        self.section_name = name;
        Ok(())
    }

    fn validate_key(&mut self) -> Result<()> {
        let desc = match self.settings.registry.lookup(&self.section_type, &self.token) {
            Ok(desc) => desc,
            Err(SchemaError::UnknownSection) => {
                return Err(self.error(ErrorKind::Schema, format!("unknown section type '{}'", self.section_type)));
            }
            Err(SchemaError::UnknownKey) => {
                return Err(self.error(ErrorKind::Schema, format!("unknown key name '{}'", self.token)));
            }
        };
        let line = self.reader.position().line;

        if desc.flags.contains(KeyFlags::DEPRECATED) {
            let msg = format!(
                "key '{}' is deprecated in {} line {}; use '{}' instead.",
                self.token,
                self.file_name,
                line,
                desc.hint.unwrap_or("")
            );
            self.warn(WarningKind::Deprecated, msg);
        }

        self.discard = false;
        if !desc.is_list() {
            let already_set = self
                .config
                .section(&self.section_type, &self.section_name)
                .and_then(|s| s.get(desc.name))
                .map(|chain| !chain.is_inherited())
                .unwrap_or(false);
            if already_set {
                let msg = format!(
                    "key '{}' is not multi-value; value in {} line {} will be ignored.",
                    self.token, self.file_name, line
                );
                self.warn(WarningKind::NotMultiValue, msg);
                self.discard = true;
            }
        }

        if desc.flags.contains(KeyFlags::REMOVED) {
            let msg = format!(
                "key '{}' was permanently removed from the configuration. Refer to documentation for details.",
                self.token
            );
            self.warn(WarningKind::Removed, msg);
        }

        self.key = desc.name;
        Ok(())
    }

    fn warn(&mut self, kind: WarningKind, msg: String) {
        let warning = Warning {
            kind,
            key: self.token.clone(),
            file_name: self.file_name.clone(),
            line: self.reader.position().line,
            msg,
        };
        self.diag.warn(warning);
    }

    fn push_value(&mut self, c: u8) {
        if self.value.is_empty() && is_space(c) {
            return;
        }
        if self.value.len() < self.settings.value_max {
            self.value.push(c);
        } else if !self.truncated {
            debug!("value of '{}' truncated to {} bytes", self.key, self.settings.value_max);
            self.truncated = true;
        }
    }

    fn commit_value(&mut self) -> Result<()> {
        let value = String::from_utf8_lossy(&self.value).trim().to_string();
        self.value.clear();
        self.truncated = false;
        if self.discard {
            self.discard = false;
            return Ok(());
        }
        let tag = self.config.next_tag();
        let key = self.key;
        if let Some(section) = self.config.section_mut(&self.section_type, &self.section_name) {
            section.add(key, value, tag);
            self.last_key = Some(key);
            return Ok(());
        }
        Err(self.error(ErrorKind::Internal, format!("no current section for key '{}'", key)))
    }

    fn run_preprocessor(&mut self) -> Result<()> {
        let line = String::from_utf8_lossy(&self.reader.rest_of_line()[2..]).into_owned();
        let file_name = if self.is_file { Some(self.file_name.as_str()) } else { None };
        let shebang = match Shebang::parse(&line, self.settings.preprocessor_args.as_deref(), file_name) {
            Some(sb) => sb,
            None => return Err(self.error(ErrorKind::Preprocessor, "missing preprocessor command after '#!'")),
        };
        info!("{}: running preprocessor '{}'", self.file_name, shebang.program);
        let output = self
            .settings
            .runner
            .run(&shebang.program, &shebang.args)
            .map_err(|e| self.error(ErrorKind::Preprocessor, format!("preprocessor '{}' {}", shebang.program, e)))?;

        // The output replaces the input. A `#!` at its start is just a comment.
        self.reader = LineReader::from_bytes(output, self.settings.line_buffer);
        self.preprocess = false;
        Ok(())
    }

    fn syntax(&self, msg: impl Into<String>) -> Error {
        self.error(ErrorKind::Syntax, msg)
    }

    fn error(&self, kind: ErrorKind, msg: impl Into<String>) -> Error {
        Error::new(kind, msg).at(&self.file_name, self.reader.position(), self.reader.context())
    }
}
