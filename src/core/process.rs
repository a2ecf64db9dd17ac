//! Process orchestration: spawn the downloader, stream its output, classify
//! failures, and stop it on request.
//!
//! stdout and stderr are read by two independent tasks that feed a single
//! channel. Ordering holds within a stream, not across the two.

use crate::core::job::DownloadJob;
use crate::error::{DlpError, Result};
use crate::types::{ErrorSignal, JobState, StreamKind};
use regex::Regex;
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Terms that must all appear (case-insensitively, in any order) for a stderr
/// line to raise the signal
const SIGNATURES: &[(ErrorSignal, &[&str])] = &[
    (ErrorSignal::SignInRequired, &["ERROR", "sign", "confirm"]),
    (ErrorSignal::Unsupported, &["ERROR", "Unsupported"]),
];

static COMPILED_SIGNATURES: LazyLock<Vec<(ErrorSignal, Vec<Regex>)>> = LazyLock::new(|| {
    SIGNATURES
        .iter()
        .map(|(signal, terms)| {
            let patterns = terms
                .iter()
                .map(|term| {
                    Regex::new(&format!("(?i){}", regex::escape(term)))
                        .expect("Invalid signature regex")
                })
                .collect();
            (*signal, patterns)
        })
        .collect()
});

/// Every signal a single stderr line matches
pub fn classify(line: &str) -> Vec<ErrorSignal> {
    COMPILED_SIGNATURES
        .iter()
        .filter(|(_, patterns)| patterns.iter().all(|p| p.is_match(line)))
        .map(|(signal, _)| *signal)
        .collect()
}

/// Receives a job's output as it arrives.
///
/// Blank lines never reach a sink. `on_line` sees both streams, before the
/// stream-specific callback.
pub trait OutputSink {
    fn on_line(&mut self, _stream: StreamKind, _line: &str) {}
    fn on_stdout(&mut self, _line: &str) {}
    fn on_stderr(&mut self, _line: &str) {}
    /// Called the first time a job raises `signal`
    fn on_signal(&mut self, _signal: ErrorSignal) {}
}

impl OutputSink for () {}

/// Stops a running job; safe to use from any task while the job is executing
#[derive(Debug, Clone, Default)]
pub struct JobCanceller {
    token: CancellationToken,
}

impl JobCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct StreamLine {
    stream: StreamKind,
    text: String,
}

impl DownloadJob {
    /// Run the downloader and wait for it to exit.
    ///
    /// Returns `Ok(None)` without spawning anything when the downloader binary
    /// is missing. The exit status is reported but not interpreted; check
    /// [`DownloadJob::signals`] and [`DownloadJob::files`] to judge success.
    pub async fn exec<S: OutputSink>(&mut self, sink: &mut S) -> Result<Option<ExitStatus>> {
        self.state = JobState::Starting;

        let Some(program) = self.program.clone().filter(|p| p.is_file()) else {
            warn!("Downloader binary missing: {:?}", self.program);
            self.state = JobState::FailedToStart;
            return Ok(None);
        };

        let command_line = self.render();
        info!("{} {}", program.display(), command_line);

        let mut command = Command::new(&program);
        #[cfg(windows)]
        {
            command.raw_arg(command_line.to_string());
            command.creation_flags(CREATE_NO_WINDOW);
        }
        #[cfg(not(windows))]
        command.args(command_line.argv());

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state = JobState::FailedToStart;
                return Err(DlpError::Spawn(format!(
                    "Failed to start {}: {}",
                    program.display(),
                    e
                )));
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, StreamKind::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, StreamKind::Stderr, tx.clone());
        }
        drop(tx);

        self.state = JobState::Running;
        let token = self.canceller.token.clone();
        let mut interrupted = false;

        let status = loop {
            tokio::select! {
                Some(line) = rx.recv() => self.dispatch(line, sink),
                status = child.wait() => break status?,
                _ = token.cancelled(), if !interrupted => {
                    info!("Stopping {}", self.url);
                    interrupted = true;
                    interrupt(&mut child);
                }
            }
        };

        while let Some(line) = rx.recv().await {
            self.dispatch(line, sink);
        }

        if interrupted {
            self.state = JobState::Cancelled;
            self.remove_partial_output().await;
        } else {
            self.state = JobState::Completed;
        }

        debug!("Downloader exited with {}", status);
        Ok(Some(status))
    }

    fn dispatch<S: OutputSink>(&mut self, line: StreamLine, sink: &mut S) {
        sink.on_line(line.stream, &line.text);

        match line.stream {
            StreamKind::Stdout => sink.on_stdout(&line.text),
            StreamKind::Stderr => {
                sink.on_stderr(&line.text);
                for signal in classify(&line.text) {
                    if self.signals.insert(signal) {
                        debug!("Raised {:?}", signal);
                        sink.on_signal(signal);
                    }
                }
            }
        }
    }

    /// Partial downloads are useless; live recordings are kept
    async fn remove_partial_output(&self) {
        if self.is_live {
            return;
        }

        let Some(output) = self.output_path() else {
            return;
        };

        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!("Removed partial output {}", output),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", output, e),
        }
    }
}

/// Soft stop: SIGINT on Unix, like pressing Ctrl-C in a terminal
#[cfg(unix)]
fn interrupt(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };

    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        warn!("Failed to interrupt process {}: {}", pid, e);
    }
}

/// No per-process console Ctrl-C without attaching to the child's console; terminate instead
#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to stop process: {}", e);
    }
}

/// Forward non-blank lines of `stream` into `tx`, decoding invalid UTF-8 lossily
fn spawn_line_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    kind: StreamKind,
    tx: mpsc::UnboundedSender<StreamLine>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    debug!("{:?}: {}", kind, text);

                    if text.trim().is_empty() {
                        continue;
                    }
                    if tx.send(StreamLine { stream: kind, text }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("{:?} reader exiting: {}", kind, e);
                    break;
                }
            }
        }
    });
}
