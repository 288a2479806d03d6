use serde::Deserialize;

use crate::error::{HookError, Result};

/// One configured mapping from api key and tag to a script template.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RepoConfig {
    /// Expected repository full name, e.g. `org/repo`
    #[serde(default)]
    pub name: Option<String>,
    pub api_key: String,
    pub tag: String,
    pub script: String,
}

impl RepoConfig {
    /// Returns the configured repository name, if the rule constrains one.
    pub fn repo_constraint(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Name used in log lines; falls back to the tag for unnamed rules.
    pub fn display_name(&self) -> &str {
        self.repo_constraint().unwrap_or(&self.tag)
    }
}

/// Read-only view over the rules loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Vec<RepoConfig>,
}

impl RuleStore {
    pub fn new(rules: Vec<RepoConfig>) -> Self {
        Self { rules }
    }

    /// Returns every rule with the given api key, in load order.
    pub fn lookup_by_api_key(&self, api_key: &str) -> Result<Vec<&RepoConfig>> {
        let matches: Vec<&RepoConfig> = self
            .rules
            .iter()
            .filter(|rule| rule.api_key == api_key)
            .collect();

        if matches.is_empty() {
            return Err(HookError::UnknownApiKey(api_key.to_string()));
        }
        Ok(matches)
    }
}
