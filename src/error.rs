//! Error taxonomy for title resolution and metadata filtering.
//!
//! Every per-item failure is recovered by the batch runner and turned into a
//! rejection. Only [`ErrorKind::SchemaField`] escapes a batch.

use std::path::PathBuf;

/// Coarse classification carried by every [`LookupError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity problem, timeout, or a non-success response.
    Network,
    /// Document body could not be decoded.
    Encoding,
    /// Nothing searchable was left after cleaning the raw title.
    UnparseableTitle,
    /// Document structure did not match what the parser expects.
    UnexpectedParse,
    /// A pre-parsed item attribute has the wrong primitive type.
    SchemaField,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Encoding => "encoding",
            Self::UnparseableTitle => "unparseable_title",
            Self::UnexpectedParse => "unexpected_parse",
            Self::SchemaField => "schema_field",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("request to {target} failed: {message}")]
    Network { target: String, message: String },
    #[error("unable to decode {reference}: {message}")]
    Encoding { reference: String, message: String },
    #[error("failed to parse a searchable name from '{title}'")]
    UnparseableTitle { title: String },
    #[error("unexpected document structure at {reference}: {message}")]
    UnexpectedParse { reference: String, message: String },
    #[error("pre-parsed attribute '{field}' should be {expected}")]
    SchemaField {
        field: &'static str,
        expected: &'static str,
    },
}

impl LookupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::UnparseableTitle { .. } => ErrorKind::UnparseableTitle,
            Self::UnexpectedParse { .. } => ErrorKind::UnexpectedParse,
            Self::SchemaField { .. } => ErrorKind::SchemaField,
        }
    }

    /// Returns true when the error must abort the whole batch instead of one item.
    pub fn is_batch_fatal(&self) -> bool {
        self.kind() == ErrorKind::SchemaField
    }
}

/// Failures while loading or writing `config.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config directory available on this platform")]
    NoConfigDir,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, LookupError};

    #[test]
    fn test_only_schema_field_errors_abort_the_batch() {
        let schema = LookupError::SchemaField {
            field: "votes",
            expected: "an integer",
        };
        let network = LookupError::Network {
            target: "https://example.test".to_string(),
            message: "timed out".to_string(),
        };
        assert!(schema.is_batch_fatal());
        assert!(!network.is_batch_fatal());
        assert_eq!(network.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_error_messages_name_the_failing_input() {
        let error = LookupError::UnparseableTitle {
            title: "[720p]".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "failed to parse a searchable name from '[720p]'"
        );
    }
}
