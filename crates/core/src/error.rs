use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error aborts a whole agent run (connector-class failures)
    /// as opposed to being absorbed into the trace as a failed tool outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Sandbox(_) | Error::Provider(_) | Error::Config(_))
    }

    /// The bare message without the variant prefix, as surfaced in tool
    /// outcomes and client-facing errors.
    pub fn message(&self) -> String {
        match self {
            Error::Config(m)
            | Error::Provider(m)
            | Error::Tool(m)
            | Error::Validation(m)
            | Error::Sandbox(m)
            | Error::Storage(m)
            | Error::Timeout(m)
            | Error::Other(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Sandbox("no browser context".into()).is_fatal());
        assert!(Error::Provider("connection refused".into()).is_fatal());
        assert!(!Error::Tool("navigation timed out".into()).is_fatal());
        assert!(!Error::Validation("click action requires 'x' and 'y'".into()).is_fatal());
    }
}
