use thiserror::Error;

#[derive(Debug, Error)]
pub enum SestermError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} has no entry for user {username} and relying party {target}")]
    EntryNotFound {
        job_id: String,
        username: String,
        target: String,
    },

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
