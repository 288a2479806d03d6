//! Script template rendering
//!
//! Templates see two bindings: `ENV`, a snapshot of the process environment,
//! and `Hub`, the push notification under its wire field names, e.g.
//! `/deploy.sh {{ Hub.repository.repo_name }} {{ ENV.HOME }}`.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{HookError, Result};
use crate::payload::Payload;

/// Environment variables visible to a script template.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EnvSnapshot(BTreeMap<String, String>);

impl EnvSnapshot {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        let entries = std::env::vars_os().filter_map(|(name, value)| {
            match (name.to_str(), value.to_str()) {
                (Some(name), Some(value)) => Some(format!("{name}={value}")),
                _ => {
                    warn!("Unusual environment value {:?}={:?}", name, value);
                    None
                }
            }
        });
        Self::from_entries(entries)
    }

    /// Build a snapshot from raw `NAME=VALUE` entries.
    ///
    /// Entries that do not contain exactly one `=` are logged and skipped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vars = BTreeMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((name, value)) if !value.contains('=') => {
                    vars.insert(name.to_string(), value.to_string());
                }
                _ => warn!("Unusual environment value {}", entry),
            }
        }
        Self(vars)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    #[serde(rename = "ENV")]
    env: &'a EnvSnapshot,
    #[serde(rename = "Hub")]
    hub: &'a Payload,
}

/// Renders rule scripts into command lines.
pub struct ScriptRenderer {
    templates: Environment<'static>,
}

impl ScriptRenderer {
    pub fn new() -> Self {
        let mut templates = Environment::new();
        templates.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { templates }
    }

    /// Check that a script parses, without rendering it.
    pub fn check(&self, script: &str) -> Result<()> {
        self.templates
            .template_from_str(script)
            .map(|_| ())
            .map_err(HookError::TemplateSyntax)
    }

    pub fn render(&self, script: &str, env: &EnvSnapshot, payload: &Payload) -> Result<String> {
        let template = self
            .templates
            .template_from_str(script)
            .map_err(HookError::TemplateSyntax)?;

        template
            .render(TemplateContext { env, hub: payload })
            .map_err(HookError::TemplateRender)
    }
}

impl Default for ScriptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a rendered command line into the program and its arguments.
///
/// Splitting is on whitespace only; quoting is not supported.
pub fn split_command(command_line: &str) -> Result<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace();
    let program = parts.next().ok_or(HookError::EmptyCommand)?;
    let args = parts.map(String::from).collect();
    Ok((program.to_string(), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::tests::SUCCESS_PAYLOAD;

    fn payload() -> Payload {
        serde_json::from_str(SUCCESS_PAYLOAD).unwrap()
    }

    #[test]
    fn malformed_env_entries_are_skipped() {
        let env = EnvSnapshot::from_entries(["HOME=/root", "BROKEN", "OPTS=a=b", "EMPTY="]);

        assert_eq!(env.get("HOME"), Some("/root"));
        assert_eq!(env.get("EMPTY"), Some(""));
        assert_eq!(env.get("BROKEN"), None);
        assert_eq!(env.get("OPTS"), None);
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn renders_env_and_hub_bindings() {
        let env = EnvSnapshot::from_entries(["DEPLOY_ROOT=/srv", "BROKEN"]);
        let rendered = ScriptRenderer::new()
            .render(
                "/deploy.sh {{ ENV.DEPLOY_ROOT }} {{ Hub.repository.repo_name }}:{{ Hub.push_data.tag }}",
                &env,
                &payload(),
            )
            .unwrap();

        assert_eq!(rendered, "/deploy.sh /srv connctd/test:latest");
    }

    #[test]
    fn undefined_field_is_a_render_error() {
        let err = ScriptRenderer::new()
            .render(
                "/deploy.sh {{ Hub.repository.nope }}",
                &EnvSnapshot::default(),
                &payload(),
            )
            .unwrap_err();

        assert!(matches!(err, HookError::TemplateRender(_)));
    }

    #[test]
    fn unset_env_variable_is_a_render_error() {
        let env = EnvSnapshot::from_entries(["HOME=/root"]);
        let err = ScriptRenderer::new()
            .render("/deploy.sh {{ ENV.DEPLOY_TARGET }}", &env, &payload())
            .unwrap_err();

        assert!(matches!(err, HookError::TemplateRender(_)));
    }

    #[test]
    fn invalid_syntax_is_a_syntax_error() {
        let renderer = ScriptRenderer::new();
        let err = renderer
            .render("/deploy.sh {{ Hub.", &EnvSnapshot::default(), &payload())
            .unwrap_err();

        assert!(matches!(err, HookError::TemplateSyntax(_)));
        assert!(renderer.check("/deploy.sh {% if %}").is_err());
        assert!(renderer.check("/deploy.sh {{ Hub.callback_url }}").is_ok());
    }

    #[test]
    fn splits_on_whitespace() {
        let (program, args) = split_command("  /deploy.sh  org/test\tlatest\n").unwrap();

        assert_eq!(program, "/deploy.sh");
        assert_eq!(args, vec!["org/test", "latest"]);
    }

    #[test]
    fn blank_command_is_rejected() {
        assert!(matches!(split_command(" \n\t"), Err(HookError::EmptyCommand)));
    }
}
