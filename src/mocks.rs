//! Recording doubles for [`CommandRunner`] and [`CallbackNotifier`].
//!
//! Enabled with the `test-support` feature. Each call is reported over an
//! unbounded channel so tests can await work scheduled in the background.

use std::io;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

use crate::error::{HookError, Result};
use crate::runner::{CallbackNotifier, CommandRunner, RunStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub program: String,
    pub args: Vec<String>,
}

/// Pretends to run programs, exiting with a fixed code.
pub struct RecordingRunner {
    exit_code: Option<i32>,
    runs: mpsc::UnboundedSender<RecordedRun>,
}

impl RecordingRunner {
    pub fn new(exit_code: i32) -> (Self, mpsc::UnboundedReceiver<RecordedRun>) {
        let (runs, rx) = mpsc::unbounded_channel();
        (
            Self {
                exit_code: Some(exit_code),
                runs,
            },
            rx,
        )
    }

    /// A runner whose programs never start.
    pub fn failing_to_spawn() -> (Self, mpsc::UnboundedReceiver<RecordedRun>) {
        let (runs, rx) = mpsc::unbounded_channel();
        (
            Self {
                exit_code: None,
                runs,
            },
            rx,
        )
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<RunStatus> {
        let _ = self.runs.send(RecordedRun {
            program: program.to_string(),
            args: args.to_vec(),
        });
        match self.exit_code {
            Some(code) => Ok(RunStatus::from_code(code)),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }
}

/// Records each run, then holds it until the test releases it.
pub struct GatedRunner {
    gate: Arc<Semaphore>,
    runs: mpsc::UnboundedSender<RecordedRun>,
}

impl GatedRunner {
    /// Returns the runner, a handle that releases held runs, and the run log.
    pub fn new() -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<RecordedRun>) {
        let gate = Arc::new(Semaphore::new(0));
        let (runs, rx) = mpsc::unbounded_channel();
        (
            Self {
                gate: Arc::clone(&gate),
                runs,
            },
            gate,
            rx,
        )
    }
}

impl CommandRunner for GatedRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<RunStatus> {
        let _ = self.runs.send(RecordedRun {
            program: program.to_string(),
            args: args.to_vec(),
        });
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| io::Error::other(e.to_string()))?;
        permit.forget();
        Ok(RunStatus::from_code(0))
    }
}

/// Records callback URLs instead of calling them.
pub struct RecordingCallback {
    fail: bool,
    calls: mpsc::UnboundedSender<String>,
}

impl RecordingCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { fail: false, calls }, rx)
    }

    /// Records the call, then reports it as failed.
    pub fn failing() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { fail: true, calls }, rx)
    }
}

impl CallbackNotifier for RecordingCallback {
    async fn notify(&self, callback_url: &str) -> Result<()> {
        let _ = self.calls.send(callback_url.to_string());
        if self.fail {
            return Err(HookError::Callback(format!("{callback_url} unreachable")));
        }
        Ok(())
    }
}
