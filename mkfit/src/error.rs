//! Error types for FIT assembly

use std::path::{Path, PathBuf};

/// Errors that abort a FIT build
#[derive(thiserror::Error, Debug)]
pub enum MkFitError {
    #[error("Unknown compression algorithm '{0}'")]
    UnknownCompressionAlgorithm(String),

    #[error("Missing tool(s): {tools}")]
    MissingCompressionTool { tools: String },

    #[error("Compression tool '{tool}' failed: {status}")]
    CompressionToolFailed { tool: String, status: String },

    #[error("Malformed devicetree '{}': {reason}", path.display())]
    MalformedDeviceTree { path: PathBuf, reason: String },

    #[error("Missing build metadata '{}' for '{}'", cmd.display(), dtb.display())]
    MissingBuildMetadata { cmd: PathBuf, dtb: PathBuf },

    #[error("Cannot decompose '{}': {reason}", path.display())]
    InvalidBuildCommand { path: PathBuf, reason: String },

    #[error("Duplicate file name '{0}' during FIT creation")]
    DuplicateConfigurationName(String),

    #[error("Tree writer consistency error: {0}")]
    TreeWriterConsistency(String),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidTreeValue { name: String, reason: String },

    #[error("Invalid FIT image: {0}")]
    InvalidFit(String),

    #[error("External data conversion with '{tool}' failed: {reason}")]
    ExternalizeFailed { tool: String, reason: String },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Failed to read '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, MkFitError>;

impl MkFitError {
    pub fn malformed_dtb(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedDeviceTree {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn invalid_build_command(path: &Path, reason: impl Into<String>) -> Self {
        Self::InvalidBuildCommand {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn consistency(reason: impl Into<String>) -> Self {
        Self::TreeWriterConsistency(reason.into())
    }

    pub fn invalid_value(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTreeValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn read_file(path: &Path, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = MkFitError::DuplicateConfigurationName("board.dtb".into());
        assert_eq!(
            err.to_string(),
            "Duplicate file name 'board.dtb' during FIT creation"
        );

        let err = MkFitError::MissingCompressionTool {
            tools: "pigz,gzip".into(),
        };
        assert_eq!(err.to_string(), "Missing tool(s): pigz,gzip");

        let err = MkFitError::malformed_dtb(Path::new("a/b.dtb"), "missing 'model'");
        assert!(err.to_string().contains("a/b.dtb"));
        assert!(err.to_string().contains("missing 'model'"));
    }
}
