use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shown to the end user verbatim, so it reads as a sentence.
    #[error("{backend} does not support {operation}")]
    Unsupported { backend: String, operation: String },
}

impl RelayError {
    /// Short error code string, used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "CONFIG_ERROR",
            RelayError::Unsupported { .. } => "UNSUPPORTED",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_reads_as_sentence() {
        let e = RelayError::Unsupported {
            backend: "gemini".into(),
            operation: "system prompts".into(),
        };
        assert_eq!(e.to_string(), "gemini does not support system prompts");
        assert_eq!(e.code(), "UNSUPPORTED");
    }
}
