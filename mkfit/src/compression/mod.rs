//! Compression of image payloads through external filter tools

pub mod runner;
pub mod tools;
pub mod traits;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MkFitError, Result};

pub use runner::{ProcessRunner, RunOutcome, SystemRunner};
pub use tools::{CompTool, CompressionTable};
pub use traits::{CompressionInterface, ToolCompressor, create_compressor};

/// Compression algorithms accepted for devicetree payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Compression {
    #[default]
    None,
    Bzip2,
    Gzip,
    Lz4,
    Lzma,
    Lzo,
    Zstd,
}

impl Compression {
    pub const ALL: [Compression; 7] = [
        Self::None,
        Self::Bzip2,
        Self::Gzip,
        Self::Lz4,
        Self::Lzma,
        Self::Lzo,
        Self::Zstd,
    ];

    /// Name used both on the command line and in the `compression` property
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bzip2 => "bzip2",
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
            Self::Lzma => "lzma",
            Self::Lzo => "lzo",
            Self::Zstd => "zstd",
        }
    }
}

impl FromStr for Compression {
    type Err = MkFitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MkFitError::UnknownCompressionAlgorithm(s.to_string()))
    }
}

impl TryFrom<String> for Compression {
    type Error = MkFitError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Compression> for String {
    fn from(value: Compression) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
