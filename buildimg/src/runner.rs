//! The seam through which all external programs are run.

use std::{
    ffi::OsStr,
    fmt,
    num::NonZeroI32,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use crate::{
    cancel::Cancellation,
    process::{self, ErrorKind, SharedWriter},
};

/// A program together with its arguments and the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandLine {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(
        program: impl Into<String>,
        args: I,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(S::into).collect(),
            current_dir: None,
        }
    }

    pub fn with_current_dir(mut self, current_dir: Option<PathBuf>) -> Self {
        self.current_dir = current_dir;
        self
    }

    /// The program followed by its arguments.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut argv = self.argv();
        if let Some(program) = argv.next() {
            f.write_str(program)?;
        }
        for arg in argv {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub trait Runner: Send + Sync {
    /// Runs `command` to completion. Blocks until the program exits; a non-zero exit status is an
    /// error. Must return promptly with [`ErrorKind::Cancelled`] once `cancellation` is cancelled.
    fn run(&self, cancellation: &Cancellation, command: &CommandLine) -> process::Result<()>;
}

/// Where the standard output and error of spawned programs go.
#[derive(Default, Clone)]
pub enum Streams {
    /// Forward to our own standard output and error.
    #[default]
    Inherit,
    Discard,
    /// Write both into the given writer.
    Writer(SharedWriter),
}

impl fmt::Debug for Streams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Streams::Inherit => f.write_str("Inherit"),
            Streams::Discard => f.write_str("Discard"),
            Streams::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Runs commands as child processes.
#[derive(Debug, Default)]
pub struct ProcessRunner {
    streams: Streams,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streams(streams: Streams) -> Self {
        Self { streams }
    }
}

impl Runner for ProcessRunner {
    fn run(&self, cancellation: &Cancellation, command: &CommandLine) -> process::Result<()> {
        let mut child =
            process::Command::new(&command.program).args(command.args.iter().map(OsStr::new));
        if let Some(dir) = &command.current_dir {
            child = child.current_dir(dir);
        }
        match &self.streams {
            Streams::Inherit => child.status(cancellation),
            Streams::Discard => child.quiet().status(cancellation),
            Streams::Writer(sink) => child.status_forwarding(cancellation, sink),
        }
    }
}

/// Formats `command` as a JSON array of strings, e.g. `["docker","buildx","rm","test"]`.
pub fn render(command: &CommandLine) -> String {
    serde_json::Value::from(command.argv().collect::<Vec<_>>()).to_string()
}

/// Prints every command as a JSON array on standard output instead of running it.
#[derive(Debug, Default)]
pub struct DryRunRunner;

impl Runner for DryRunRunner {
    fn run(&self, cancellation: &Cancellation, command: &CommandLine) -> process::Result<()> {
        if cancellation.is_cancelled() {
            return Err(cancelled(command));
        }
        println!("{}", render(command));
        Ok(())
    }
}

/// Records commands instead of running them, optionally failing one of them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandLine>>,
    fail_at: Option<usize>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the call with the zero-based index `index` with exit code 1. The failing command is
    /// still recorded.
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<CommandLine> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The recorded commands as program and arguments.
    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.commands()
            .iter()
            .map(|command| command.argv().map(str::to_owned).collect())
            .collect()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, cancellation: &Cancellation, command: &CommandLine) -> process::Result<()> {
        if cancellation.is_cancelled() {
            return Err(cancelled(command));
        }

        let index = {
            let mut commands = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
            commands.push(command.clone());
            commands.len() - 1
        };

        if self.fail_at == Some(index) {
            return Err(process::Error::new(
                &command.program,
                command.to_string(),
                ErrorKind::NonZeroExitStatus(NonZeroI32::new(1)),
            ));
        }

        Ok(())
    }
}

fn cancelled(command: &CommandLine) -> process::Error {
    process::Error::new(&command.program, command.to_string(), ErrorKind::Cancelled)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn docker(args: &[&str]) -> CommandLine {
        CommandLine::new("docker", args.iter().copied())
    }

    #[test]
    fn command_line_display() {
        assert_eq!(
            docker(&["buildx", "rm", "test"]).to_string(),
            "docker buildx rm test"
        );
        assert_eq!(CommandLine::new("true", [""; 0]).to_string(), "true");
    }

    #[test]
    fn render_prints_json_array() {
        assert_eq!(
            render(&docker(&["buildx", "rm", "test"])),
            r#"["docker","buildx","rm","test"]"#
        );
        assert_eq!(
            render(&CommandLine::new("echo", ["a \"quoted\" arg"])),
            r#"["echo","a \"quoted\" arg"]"#
        );
    }

    #[test]
    fn dry_run_runner_succeeds_without_running() {
        let command = CommandLine::new("buildimg-this-program-does-not-exist", ["--help"]);
        DryRunRunner.run(&Cancellation::new(), &command).unwrap();
    }

    #[test]
    fn dry_run_runner_refuses_when_cancelled() {
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let error = DryRunRunner
            .run(&cancellation, &docker(&["buildx", "rm", "test"]))
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Cancelled);
        assert_eq!(error.command, "docker buildx rm test");
    }

    #[test]
    fn recording_runner_records_in_order() {
        let runner = RecordingRunner::new();
        let cancellation = Cancellation::new();
        runner.run(&cancellation, &docker(&["a"])).unwrap();
        runner.run(&cancellation, &docker(&["b"])).unwrap();
        assert_eq!(
            runner.argvs(),
            vec![vec!["docker", "a"], vec!["docker", "b"]]
        );
    }

    #[test]
    fn recording_runner_fails_requested_call() {
        let runner = RecordingRunner::failing_at(1);
        let cancellation = Cancellation::new();
        assert!(runner.run(&cancellation, &docker(&["a"])).is_ok());
        let error = runner.run(&cancellation, &docker(&["b"])).unwrap_err();
        assert_eq!(error.kind, ErrorKind::NonZeroExitStatus(NonZeroI32::new(1)));
        assert_eq!(error.command, "docker b");
        assert!(runner.run(&cancellation, &docker(&["c"])).is_ok());
        assert_eq!(runner.commands().len(), 3);
    }

    #[test]
    fn recording_runner_refuses_when_cancelled() {
        let runner = RecordingRunner::new();
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let error = runner.run(&cancellation, &docker(&["a"])).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Cancelled);
        assert!(runner.commands().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_uses_current_dir() {
        let runner = ProcessRunner::with_streams(Streams::Discard);
        let command = CommandLine::new("sh", ["-c", "test \"$(pwd)\" = /"])
            .with_current_dir(Some(PathBuf::from("/")));
        runner.run(&Cancellation::new(), &command).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_writes_output_to_writer() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let runner = ProcessRunner::with_streams(Streams::Writer(buffer.clone()));
        let command = CommandLine::new("sh", ["-c", "echo built; echo warned >&2"]);
        runner.run(&Cancellation::new(), &command).unwrap();
        let written = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(written.contains("built\n"));
        assert!(written.contains("warned\n"));
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_reports_failure() {
        let runner = ProcessRunner::with_streams(Streams::Discard);
        let error = runner
            .run(&Cancellation::new(), &CommandLine::new("sh", ["-c", "exit 2"]))
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NonZeroExitStatus(NonZeroI32::new(2)));
    }
}
