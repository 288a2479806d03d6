//! HTTP handlers for registry push notifications

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod handlers_tests;

use axum::{
    body::Bytes,
    extract::{Path, State as AxumState},
    http::StatusCode,
};
use tracing::{info, warn};

use crate::error::{HookError, Result};
use crate::payload::Payload;
use crate::rules::{RepoConfig, RuleStore};
use crate::runner::{CallbackNotifier, CommandRunner};
use crate::SharedState;

/// Root health check endpoint
pub async fn root() -> &'static str {
    "simple_docker_hook - healthy"
}

/// Pick the rule that a push notification triggers.
///
/// The first rule whose tag matches decides the outcome; later rules with the
/// same tag are never considered, even when their repository name would match.
pub fn match_rule<'a>(
    rules: &'a RuleStore,
    api_key: &str,
    body: &[u8],
) -> Result<(&'a RepoConfig, Payload)> {
    let candidates = rules.lookup_by_api_key(api_key)?;
    let payload = Payload::from_body(body)?;

    let tag = &payload.push_data.tag;
    let rule = candidates
        .into_iter()
        .find(|rule| &rule.tag == tag)
        .ok_or_else(|| HookError::TagNotConfigured(tag.clone()))?;

    if let Some(expected) = rule.repo_constraint() {
        if expected != payload.repository.repo_name {
            return Err(HookError::RepoMismatch {
                received: payload.repository.repo_name.clone(),
                configured: expected.to_string(),
            });
        }
    }

    Ok((rule, payload))
}

/// Handles `POST /docker/{apikey}`.
///
/// Responds as soon as a rule matches; the script runs in the background.
pub async fn handle_hook<R, N>(
    AxumState(state): AxumState<SharedState<R, N>>,
    Path(api_key): Path<String>,
    body: Bytes,
) -> StatusCode
where
    R: CommandRunner,
    N: CallbackNotifier,
{
    match match_rule(&state.rules, &api_key, &body) {
        Ok((rule, payload)) => {
            info!(
                "Received valid call for '{}' tag '{}'",
                rule.display_name(),
                rule.tag
            );
            state.executor.spawn(rule.clone(), payload);
            StatusCode::OK
        }
        Err(e) => {
            warn!("Rejected call: {}", e);
            e.status_code()
        }
    }
}
