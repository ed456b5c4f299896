use std::{
    ffi::OsStr,
    fmt,
    io::{self, Read, Write},
    num::NonZeroI32,
    path::Path,
    process,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};

use log::debug;

use crate::cancel::Cancellation;

/// How often a running child is checked for exit and for cancellation.
pub const POLLING_INTERVAL: Duration = Duration::from_millis(50);

/// A writer shared between the threads that forward the output of a child.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Locks the shared writer for every write so that stdout and stderr chunks interleave.
struct Forward(SharedWriter);

impl Write for Forward {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

fn forward<R: Read + Send + 'static>(mut pipe: R, sink: &SharedWriter) -> thread::JoinHandle<()> {
    let mut writer = Forward(Arc::clone(sink));
    thread::spawn(move || {
        if let Err(error) = io::copy(&mut pipe, &mut writer) {
            debug!("failed to forward child output: {error}");
        }
    })
}

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<'a, I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.0.current_dir(dir);
        self
    }

    /// Discards the standard output and error of the child instead of forwarding them to ours.
    pub fn quiet(mut self) -> Self {
        self.0
            .stdout(process::Stdio::null())
            .stderr(process::Stdio::null());
        self
    }

    fn error(&self, kind: ErrorKind) -> Error {
        Error {
            program: self.0.get_program().to_string_lossy().into_owned(),
            command: format!("{:?}", self.0),
            kind,
        }
    }

    /// Runs the command to completion. The child is killed when `cancellation` is cancelled
    /// while it runs, and never spawned if it was cancelled before.
    pub fn status(self, cancellation: &Cancellation) -> Result<()> {
        self.run(cancellation, None)
    }

    /// Like [`Command::status`], but writes the standard output and error of the child to `sink`.
    pub fn status_forwarding(self, cancellation: &Cancellation, sink: &SharedWriter) -> Result<()> {
        self.run(cancellation, Some(sink))
    }

    fn run(mut self, cancellation: &Cancellation, sink: Option<&SharedWriter>) -> Result<()> {
        if cancellation.is_cancelled() {
            return Err(self.error(ErrorKind::Cancelled));
        }

        if sink.is_some() {
            self.0
                .stdout(process::Stdio::piped())
                .stderr(process::Stdio::piped());
        }

        if log::log_enabled!(log::Level::Debug) {
            debug!("running `{command:?}`...", command = &self.0);
        }

        let mut child = match self.0.spawn() {
            Ok(child) => child,
            Err(error) => return Err(self.error(error.into())),
        };

        let mut forwarders = Vec::new();
        if let Some(sink) = sink {
            if let Some(stdout) = child.stdout.take() {
                forwarders.push(forward(stdout, sink));
            }
            if let Some(stderr) = child.stderr.take() {
                forwarders.push(forward(stderr, sink));
            }
        }

        let result = self.wait(&mut child, cancellation);

        // The pipes close once the child is gone.
        for forwarder in forwarders {
            let _ = forwarder.join();
        }

        result
    }

    fn wait(&self, child: &mut process::Child, cancellation: &Cancellation) -> Result<()> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(self.error(ErrorKind::NonZeroExitStatus(
                        status.code().and_then(NonZeroI32::new),
                    )))
                }
                Ok(None) => {}
                Err(error) => return Err(self.error(error.into())),
            }

            if cancellation.is_cancelled() {
                debug!("killing `{command:?}`...", command = &self.0);
                // Killing fails if the child exited in the meantime, which is fine.
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.error(ErrorKind::Cancelled));
            }

            thread::sleep(POLLING_INTERVAL);
        }
    }

    /// Runs the command to completion while capturing its standard output and error.
    pub fn output(mut self) -> Result<Output> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        let output = match self.0.output() {
            Ok(output) => output,
            Err(error) => return Err(self.error(error.into())),
        };

        if output.status.success() {
            Ok(Output(output))
        } else {
            Err(self.error(ErrorKind::NonZeroExitStatus(
                output.status.code().and_then(NonZeroI32::new),
            )))
        }
    }
}

#[derive(Debug)]
pub struct Output(process::Output);

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NonZeroExitStatus(Option<NonZeroI32>),
    Cancelled,
    Io(io::ErrorKind),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            kind => ErrorKind::Io(kind),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub program: String,
    pub command: String,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(program: impl Into<String>, command: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            program: program.into(),
            command: command.into(),
            kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to run `{command}`: ", command = self.command)?;
        let program = &self.program;
        match &self.kind {
            ErrorKind::NotFound => {
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::NonZeroExitStatus(code) => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")
                } else {
                    write!(f, "did not run successfully")
                }
            }
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Io(kind) => write!(f, "{kind}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::AsRef::as_ref`] on each.
macro_rules! command {
    ($program:expr, $($arg:expr),* $(,)?) => {
        $crate::process::args!($crate::process::Command::new($program), $($arg,)*)
    };
}

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr, $($arg:expr),+ $(,)?) => {
        $program.args([
            $(::std::convert::AsRef::<::std::ffi::OsStr>::as_ref(&$arg),)*
        ])
    }
}

pub(crate) use args;
pub(crate) use command;

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn status_succeeds_on_zero_exit() {
        command!("sh", "-c", "exit 0")
            .quiet()
            .status(&Cancellation::new())
            .unwrap();
    }

    #[test]
    fn status_reports_exit_code() {
        let error = command!("sh", "-c", "exit 3")
            .quiet()
            .status(&Cancellation::new())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NonZeroExitStatus(NonZeroI32::new(3)));
        assert_eq!(error.program, "sh");
    }

    #[test]
    fn status_reports_missing_program() {
        let error = command!("buildimg-this-program-does-not-exist", "--help")
            .status(&Cancellation::new())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert!(error.to_string().contains("is required but not available"));
    }

    #[test]
    fn status_does_not_spawn_when_already_cancelled() {
        let cancellation = Cancellation::new();
        cancellation.cancel();
        // Spawning would fail with `NotFound`.
        let error = command!("buildimg-this-program-does-not-exist", "--help")
            .status(&cancellation)
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Cancelled);
    }

    #[test]
    fn status_kills_child_on_cancellation() {
        let cancellation = Cancellation::new();
        let start = Instant::now();
        let error = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(100));
                cancellation.cancel();
            });
            command!("sleep", "30").quiet().status(&cancellation)
        })
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn status_forwarding_writes_both_streams_to_sink() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink: SharedWriter = buffer.clone();
        command!("sh", "-c", "echo to-stdout; echo to-stderr >&2")
            .status_forwarding(&Cancellation::new(), &sink)
            .unwrap();
        let written = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(written.contains("to-stdout\n"));
        assert!(written.contains("to-stderr\n"));
    }

    #[test]
    fn status_forwarding_reports_failure() {
        let sink: SharedWriter = Arc::new(Mutex::new(io::sink()));
        let error = command!("sh", "-c", "echo oops >&2; exit 4")
            .status_forwarding(&Cancellation::new(), &sink)
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NonZeroExitStatus(NonZeroI32::new(4)));
    }

    #[test]
    fn output_captures_stdout() {
        let output = command!("sh", "-c", "echo hello").output().unwrap();
        assert_eq!(output.stdout, b"hello\n");
    }
}
