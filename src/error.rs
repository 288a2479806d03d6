use axum::http::StatusCode;
use std::io;

/// Custom error type for simple_docker_hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Can't find configs for api key {0}")]
    UnknownApiKey(String),

    #[error("Can't parse payload: {0}")]
    PayloadDecode(#[from] serde_json::Error),

    #[error("Tag {0} is not configured")]
    TagNotConfigured(String),

    #[error("Received call for repo {received} but {configured} is configured as repo name")]
    RepoMismatch { received: String, configured: String },

    #[error("Can't parse script template: {0}")]
    TemplateSyntax(#[source] minijinja::Error),

    #[error("Can't execute script template: {0}")]
    TemplateRender(#[source] minijinja::Error),

    #[error("Rendered script is empty")]
    EmptyCommand,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    NonZeroExit { program: String, status: String },

    #[error("Failed to call callback URL: {0}")]
    Callback(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl HookError {
    /// HTTP status for errors raised before the dispatcher responds.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HookError::UnknownApiKey(_) => StatusCode::NOT_FOUND,
            HookError::PayloadDecode(_)
            | HookError::TagNotConfigured(_)
            | HookError::RepoMismatch { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;
