//! Error types for Desk Core

/// Configuration and setup errors
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text is not valid TOML for [`crate::DeskConfig`]
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_display() {
        let err = CoreError::InvalidConfig("heavy_limit".to_string());
        assert!(err.to_string().contains("invalid configuration"));
    }
}
