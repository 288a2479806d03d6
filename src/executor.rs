//! Background execution of matched rules.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::error::{HookError, Result};
use crate::payload::Payload;
use crate::rules::RepoConfig;
use crate::runner::{CallbackNotifier, CommandRunner};
use crate::template::{EnvSnapshot, ScriptRenderer, split_command};

/// How many triggered scripts may run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionLimit {
    /// Every matching call starts its script immediately. No back-pressure.
    #[default]
    Unbounded,
    /// Scripts beyond this many wait for a running one to finish.
    Bounded(usize),
}

impl From<Option<usize>> for ExecutionLimit {
    fn from(max: Option<usize>) -> Self {
        match max {
            Some(n) => ExecutionLimit::Bounded(n),
            None => ExecutionLimit::Unbounded,
        }
    }
}

/// Renders and runs rule scripts, then pings the registry callback.
pub struct ScriptExecutor<R, N> {
    runner: R,
    notifier: N,
    renderer: ScriptRenderer,
    permits: Option<Arc<Semaphore>>,
}

impl<R: CommandRunner, N: CallbackNotifier> ScriptExecutor<R, N> {
    pub fn new(runner: R, notifier: N, limit: ExecutionLimit) -> Self {
        let permits = match limit {
            ExecutionLimit::Unbounded => None,
            ExecutionLimit::Bounded(n) => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            runner,
            notifier,
            renderer: ScriptRenderer::new(),
            permits,
        }
    }

    /// Run the rule for this payload in a detached task.
    ///
    /// Nothing observes the task; its failures only show up in the logs.
    pub fn spawn(self: &Arc<Self>, rule: RepoConfig, payload: Payload) {
        let executor = Arc::clone(self);
        let span = info_span!(
            "script",
            execution_id = %Uuid::now_v7(),
            rule = %rule.display_name(),
            tag = %rule.tag,
        );

        tokio::spawn(
            async move {
                let _permit = match &executor.permits {
                    Some(permits) => match Arc::clone(permits).acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            error!("Execution limiter closed: {}", e);
                            return;
                        }
                    },
                    None => None,
                };

                if let Err(e) = executor.execute(&rule, &payload).await {
                    error!("{}", e);
                }
            }
            .instrument(span),
        );
    }

    /// Render the rule's script, run it, and call back on success.
    ///
    /// The callback is skipped when the script fails to start or exits non-zero.
    pub async fn execute(&self, rule: &RepoConfig, payload: &Payload) -> Result<()> {
        let env = EnvSnapshot::capture();
        let command_line = self.renderer.render(&rule.script, &env, payload)?;
        info!("Executing {}", command_line.trim());

        let (program, args) = split_command(&command_line)?;
        let status = self
            .runner
            .run(&program, &args)
            .await
            .map_err(|source| HookError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(HookError::NonZeroExit {
                program,
                status: status.to_string(),
            });
        }

        self.notifier.notify(&payload.callback_url).await?;
        info!("Called back {}", payload.callback_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{GatedRunner, RecordedRun, RecordingCallback, RecordingRunner};
    use crate::payload::tests::SUCCESS_PAYLOAD;
    use std::time::Duration;
    use tokio::time::timeout;

    fn payload() -> Payload {
        serde_json::from_str(SUCCESS_PAYLOAD).unwrap()
    }

    fn rule(script: &str) -> RepoConfig {
        RepoConfig {
            name: Some("connctd/test".to_string()),
            api_key: "foobaz".to_string(),
            tag: "latest".to_string(),
            script: script.to_string(),
        }
    }

    #[tokio::test]
    async fn success_runs_rendered_command_and_calls_back_once() {
        let (runner, mut runs) = RecordingRunner::new(0);
        let (notifier, mut calls) = RecordingCallback::new();
        let executor = ScriptExecutor::new(runner, notifier, ExecutionLimit::Unbounded);

        executor
            .execute(
                &rule("/deploy.sh {{ Hub.repository.repo_name }} {{ Hub.push_data.tag }}"),
                &payload(),
            )
            .await
            .unwrap();

        assert_eq!(
            runs.try_recv().unwrap(),
            RecordedRun {
                program: "/deploy.sh".to_string(),
                args: vec!["connctd/test".to_string(), "latest".to_string()],
            }
        );
        assert_eq!(calls.try_recv().unwrap(), payload().callback_url);
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_zero_exit_skips_callback() {
        let (runner, mut runs) = RecordingRunner::new(1);
        let (notifier, mut calls) = RecordingCallback::new();
        let executor = ScriptExecutor::new(runner, notifier, ExecutionLimit::Unbounded);

        let err = executor
            .execute(&rule("/deploy.sh"), &payload())
            .await
            .unwrap_err();

        assert!(matches!(err, HookError::NonZeroExit { .. }));
        assert!(runs.try_recv().is_ok());
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn spawn_failure_skips_callback() {
        let (runner, _runs) = RecordingRunner::failing_to_spawn();
        let (notifier, mut calls) = RecordingCallback::new();
        let executor = ScriptExecutor::new(runner, notifier, ExecutionLimit::Unbounded);

        let err = executor
            .execute(&rule("/deploy.sh"), &payload())
            .await
            .unwrap_err();

        assert!(matches!(err, HookError::Spawn { program, .. } if program == "/deploy.sh"));
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn template_errors_abort_before_running() {
        let (runner, mut runs) = RecordingRunner::new(0);
        let (notifier, mut calls) = RecordingCallback::new();
        let executor = ScriptExecutor::new(runner, notifier, ExecutionLimit::Unbounded);

        let err = executor
            .execute(&rule("/deploy.sh {{ Hub.nope }}"), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::TemplateRender(_)));

        let err = executor
            .execute(&rule("{{ '' }}"), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::EmptyCommand));

        assert!(runs.try_recv().is_err());
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_callback_is_reported() {
        let (runner, _runs) = RecordingRunner::new(0);
        let (notifier, mut calls) = RecordingCallback::failing();
        let executor = ScriptExecutor::new(runner, notifier, ExecutionLimit::Unbounded);

        let err = executor
            .execute(&rule("/deploy.sh"), &payload())
            .await
            .unwrap_err();

        assert!(matches!(err, HookError::Callback(_)));
        assert_eq!(calls.try_recv().unwrap(), payload().callback_url);
    }

    #[tokio::test]
    async fn spawned_runs_are_independent() {
        let (runner, mut runs) = RecordingRunner::new(0);
        let (notifier, mut calls) = RecordingCallback::new();
        let executor = Arc::new(ScriptExecutor::new(
            runner,
            notifier,
            ExecutionLimit::Bounded(1),
        ));

        executor.spawn(rule("/deploy.sh"), payload());
        executor.spawn(rule("/deploy.sh"), payload());

        for _ in 0..2 {
            let run = timeout(Duration::from_secs(1), runs.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(run.program, "/deploy.sh");
            let url = timeout(Duration::from_secs(1), calls.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(url, payload().callback_url);
        }
    }

    #[tokio::test]
    async fn bounded_limit_holds_back_extra_runs() {
        let (runner, release, mut runs) = GatedRunner::new();
        let (notifier, mut calls) = RecordingCallback::new();
        let executor = Arc::new(ScriptExecutor::new(
            runner,
            notifier,
            ExecutionLimit::Bounded(1),
        ));

        executor.spawn(rule("/first.sh"), payload());
        executor.spawn(rule("/second.sh"), payload());

        let first = timeout(Duration::from_secs(1), runs.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(
            timeout(Duration::from_millis(100), runs.recv()).await.is_err(),
            "second script started while the first was still running"
        );

        release.add_permits(1);
        let second = timeout(Duration::from_secs(1), runs.recv())
            .await
            .unwrap()
            .unwrap();
        let mut programs = vec![first.program, second.program];
        programs.sort();
        assert_eq!(programs, vec!["/first.sh", "/second.sh"]);

        release.add_permits(1);
        for _ in 0..2 {
            timeout(Duration::from_secs(1), calls.recv())
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn unbounded_limit_starts_every_run_at_once() {
        let (runner, release, mut runs) = GatedRunner::new();
        let (notifier, _calls) = RecordingCallback::new();
        let executor = Arc::new(ScriptExecutor::new(
            runner,
            notifier,
            ExecutionLimit::Unbounded,
        ));

        for _ in 0..3 {
            executor.spawn(rule("/deploy.sh"), payload());
        }
        for _ in 0..3 {
            timeout(Duration::from_secs(1), runs.recv())
                .await
                .expect("every run should start without waiting")
                .unwrap();
        }

        release.add_permits(3);
    }

    #[test]
    fn limit_from_config() {
        assert_eq!(ExecutionLimit::from(None), ExecutionLimit::Unbounded);
        assert_eq!(ExecutionLimit::from(Some(3)), ExecutionLimit::Bounded(3));
    }
}
