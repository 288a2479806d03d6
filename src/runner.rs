//! Process and callback capabilities used by the script executor.
//!
//! Both are traits so the executor can be driven with test doubles.

use std::fmt;
use std::future::Future;
use std::io;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{HookError, Result};

/// Exit status of a finished script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    /// `None` when the process was terminated by a signal
    pub code: Option<i32>,
}

impl RunStatus {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {}", code),
            None => write!(f, "termination by signal"),
        }
    }
}

/// Spawn a program and wait for it to exit.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> impl Future<Output = io::Result<RunStatus>> + Send;
}

/// Notify the registry that a triggered script finished successfully.
pub trait CallbackNotifier: Send + Sync + 'static {
    fn notify(&self, callback_url: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Runs scripts as child processes of this server.
///
/// The child inherits the server's environment, stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<RunStatus> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        Ok(RunStatus {
            code: status.code(),
        })
    }
}

/// Issues a plain GET against the callback URL.
#[derive(Debug, Clone, Default)]
pub struct HttpCallback {
    client: reqwest::Client,
}

impl HttpCallback {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl CallbackNotifier for HttpCallback {
    async fn notify(&self, callback_url: &str) -> Result<()> {
        self.client
            .get(callback_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| HookError::Callback(e.to_string()))?;
        Ok(())
    }
}
