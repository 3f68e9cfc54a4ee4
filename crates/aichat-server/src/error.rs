use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a configuration key
pub fn to_env_var(field: &str) -> String {
    format!("AICHAT_{}", field.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("server.port"), "AICHAT_SERVER__PORT");
        assert_eq!(
            to_env_var("connection_strings.openai"),
            "AICHAT_CONNECTION_STRINGS__OPENAI"
        );
    }
}
