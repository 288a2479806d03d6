pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod payload;
pub mod rules;
pub mod runner;
pub mod template;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

use axum::{Router, routing};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use error::{HookError, Result};
use executor::{ExecutionLimit, ScriptExecutor};
use rules::{RepoConfig, RuleStore};
use runner::{CallbackNotifier, CommandRunner};
use template::ScriptRenderer;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HookConfig {
    /// Cap on concurrently running scripts; unbounded when absent
    #[serde(default)]
    pub max_concurrent_scripts: Option<usize>,
    #[serde(default)]
    pub repo: Vec<RepoConfig>,
}

impl HookConfig {
    /// Rejects rules that could never be triggered or run.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_scripts == Some(0) {
            return Err(HookError::ConfigError(
                "max_concurrent_scripts must be greater than 0".to_string(),
            ));
        }

        for (idx, rule) in self.repo.iter().enumerate() {
            let missing = if rule.api_key.is_empty() {
                Some("api_key")
            } else if rule.tag.is_empty() {
                Some("tag")
            } else if rule.script.trim().is_empty() {
                Some("script")
            } else {
                None
            };
            if let Some(field) = missing {
                return Err(HookError::ConfigError(format!(
                    "repo #{} ('{}') has an empty {}",
                    idx + 1,
                    rule.display_name(),
                    field
                )));
            }
        }
        Ok(())
    }

    pub fn execution_limit(&self) -> ExecutionLimit {
        ExecutionLimit::from(self.max_concurrent_scripts)
    }
}

/// Load, parse and validate the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<HookConfig> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        HookError::ConfigError(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    let config: HookConfig = toml::from_str(&config_str).map_err(|e| {
        HookError::ConfigError(format!("Failed to parse config file '{}': {}", path.display(), e))
    })?;
    config.validate()?;

    // Broken templates only fail when triggered; flag them early.
    let renderer = ScriptRenderer::new();
    for rule in &config.repo {
        if let Err(e) = renderer.check(&rule.script) {
            warn!("Rule '{}' tag '{}': {}", rule.display_name(), rule.tag, e);
        }
    }

    Ok(config)
}

pub struct AppState<R, N> {
    pub rules: RuleStore,
    pub executor: Arc<ScriptExecutor<R, N>>,
}

impl<R: CommandRunner, N: CallbackNotifier> AppState<R, N> {
    pub fn new(config: HookConfig, runner: R, notifier: N) -> Self {
        let limit = config.execution_limit();
        Self {
            rules: RuleStore::new(config.repo),
            executor: Arc::new(ScriptExecutor::new(runner, notifier, limit)),
        }
    }
}

pub type SharedState<R, N> = Arc<AppState<R, N>>;

pub fn router<R: CommandRunner, N: CallbackNotifier>(state: SharedState<R, N>) -> Router {
    Router::new()
        .route("/", routing::get(handlers::root))
        .route("/docker/{apikey}", routing::post(handlers::handle_hook::<R, N>))
        .with_state(state)
}
