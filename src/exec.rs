//! Running the `#!` preprocessor.
//!
//! The parser only sees the `CommandRunner` trait. `SystemRunner` is the
//! real thing; tests substitute their own.

use std::fmt;
use std::io;
use std::process::{Command, ExitStatus, Stdio};

/// How a command failed.
#[derive(Debug)]
pub enum ExecError {
    /// Could not start the command at all.
    Spawn(io::Error),
    /// Reading its output failed.
    Io(io::Error),
    /// Exited with a non-zero status.
    Exit(i32),
    /// Killed by a signal.
    Signal(i32),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Spawn(e) => write!(f, "failed to execute: {}", e),
            ExecError::Io(e) => write!(f, "failed to read output: {}", e),
            ExecError::Exit(code) => write!(f, "exited with status {}", code),
            ExecError::Signal(sig) => write!(f, "killed by signal {}", sig),
        }
    }
}

impl std::error::Error for ExecError {}

/// Run a command with no input and capture all of its standard output.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError>;
}

/// Runs commands as child processes. Blocks until the child exits; there
/// is no timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ExecError::Spawn(e),
                _ => ExecError::Io(e),
            })?;
        check_status(output.status)?;
        Ok(output.stdout)
    }
}

#[cfg(unix)]
fn check_status(status: ExitStatus) -> Result<(), ExecError> {
    use std::os::unix::process::ExitStatusExt;
    if status.success() {
        return Ok(());
    }
    match (status.code(), status.signal()) {
        (Some(code), _) => Err(ExecError::Exit(code)),
        (None, Some(sig)) => Err(ExecError::Signal(sig)),
        (None, None) => Err(ExecError::Exit(-1)),
    }
}

#[cfg(not(unix))]
fn check_status(status: ExitStatus) -> Result<(), ExecError> {
    if status.success() {
        return Ok(());
    }
    Err(ExecError::Exit(status.code().unwrap_or(-1)))
}

/// The command line taken from a `#!` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shebang {
    pub program: String,
    pub args: Vec<String>,
}

impl Shebang {
    /// Split `line` (the text after `#!`) into a program and its arguments.
    ///
    /// The first whitespace-delimited word is the program. The rest of the
    /// line becomes one argument, unless `explicit_args` is given, which
    /// replaces it. A single pair of surrounding double quotes is removed.
    /// Without any argument the program gets `file_name`, if any, so that
    /// `#!/usr/bin/php` runs the file itself.
    pub fn parse(line: &str, explicit_args: Option<&str>, file_name: Option<&str>) -> Option<Shebang> {
        let line = line.trim();
        let (program, rest) = match line.find(char::is_whitespace) {
            Some(idx) => (&line[..idx], line[idx..].trim()),
            None => (line, ""),
        };
        if program.is_empty() {
            return None;
        }
        let arg = explicit_args.map(str::trim).unwrap_or(rest);
        let arg = unquote(arg);

        let args = match (arg, file_name) {
            ("", Some(name)) => vec![name.to_string()],
            ("", None) => Vec::new(),
            (arg, _) => vec![arg.to_string()],
        };
        Some(Shebang { program: program.to_string(), args })
    }
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_split() {
        let sb = Shebang::parse("/usr/bin/php -q \n", None, Some("/etc/search.conf")).unwrap();
        assert_eq!(sb.program, "/usr/bin/php");
        assert_eq!(sb.args, vec!["-q"]);

        let sb = Shebang::parse("echo \"indexer{mem_limit=128M}\"", None, Some("/etc/search.conf")).unwrap();
        assert_eq!(sb.program, "echo");
        assert_eq!(sb.args, vec!["indexer{mem_limit=128M}"]);

        let sb = Shebang::parse("/bin/sh", None, Some("a.conf")).unwrap();
        assert_eq!(sb.args, vec!["a.conf"]);

        assert_eq!(Shebang::parse("   ", None, None), None);
    }

    #[test]
    fn explicit_args_win() {
        let sb = Shebang::parse("/usr/bin/python gen.py", Some("--all"), Some("x.conf")).unwrap();
        assert_eq!(sb.program, "/usr/bin/python");
        assert_eq!(sb.args, vec!["--all"]);

        let sb = Shebang::parse("/usr/bin/python", Some(" "), Some("x.conf")).unwrap();
        assert_eq!(sb.args, vec!["x.conf"]);
    }

    #[cfg(unix)]
    #[test]
    fn system_runner() {
        let out = SystemRunner.run("/bin/sh", &["-c".to_string(), "echo hello".to_string()]).unwrap();
        assert_eq!(out, b"hello\n");

        match SystemRunner.run("/bin/sh", &["-c".to_string(), "exit 3".to_string()]) {
            Err(ExecError::Exit(3)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match SystemRunner.run("/bin/sh", &["-c".to_string(), "kill -9 $$".to_string()]) {
            Err(ExecError::Signal(9)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match SystemRunner.run("/nonexistent/program", &[]) {
            Err(ExecError::Spawn(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
