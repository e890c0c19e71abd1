//! FIT build options
//!
//! Defines the options a FIT build is driven by.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compression::Compression;

/// Options for building a FIT with one kernel and many devicetrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Image name, e.g. `Linux-6.6`; also used in the root description
    pub name: String,

    /// FIT architecture, e.g. `arm64`
    pub arch: String,

    /// Operating system, e.g. `linux`
    pub os: String,

    /// Uncompressed kernel image
    pub kernel: PathBuf,

    /// Top-level devicetree files; anything not ending in `.dtb` is skipped
    #[serde(default)]
    pub dtbs: Vec<PathBuf>,

    /// Compression applied to every devicetree
    #[serde(default)]
    pub dtb_compress: Compression,

    /// Split composite DTBs into base and overlays
    #[serde(default)]
    pub decompose_dtbs: bool,

    /// Root `timestamp`; the current time when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u32>,
}

impl FitOptions {
    pub fn new(
        name: impl Into<String>,
        arch: impl Into<String>,
        os: impl Into<String>,
        kernel: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            arch: arch.into(),
            os: os.into(),
            kernel: kernel.into(),
            dtbs: Vec::new(),
            dtb_compress: Compression::None,
            decompose_dtbs: false,
            timestamp: None,
        }
    }

    pub fn with_dtb(mut self, dtb: impl Into<PathBuf>) -> Self {
        self.dtbs.push(dtb.into());
        self
    }

    pub fn with_dtbs<I, P>(mut self, dtbs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dtbs.extend(dtbs.into_iter().map(Into::into));
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.dtb_compress = compression;
        self
    }

    pub fn with_decompose(mut self, decompose: bool) -> Self {
        self.decompose_dtbs = decompose;
        self
    }

    /// Pin the root timestamp, making the output reproducible
    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Root node `description`
    pub fn description(&self) -> String {
        format!("{} with devicetree set", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_creation() {
        let opts = FitOptions::new("Linux-6.6", "arm64", "linux", "Image")
            .with_dtb("a.dtb")
            .with_dtbs(["b.dtb", "c.dtb"])
            .with_compression(Compression::Gzip)
            .with_decompose(true)
            .with_timestamp(42);

        assert_eq!(opts.description(), "Linux-6.6 with devicetree set");
        assert_eq!(opts.dtbs.len(), 3);
        assert_eq!(opts.dtb_compress, Compression::Gzip);
        assert!(opts.decompose_dtbs);
        assert_eq!(opts.timestamp, Some(42));
    }

    #[test]
    fn test_options_from_toml() {
        let opts: FitOptions = toml::from_str(
            r#"
            name = "Linux-6.6"
            arch = "arm64"
            os = "linux"
            kernel = "Image"
            dtbs = ["a.dtb"]
            dtb_compress = "zstd"
            "#,
        )
        .unwrap();
        assert_eq!(opts.dtb_compress, Compression::Zstd);
        assert!(!opts.decompose_dtbs);
        assert_eq!(opts.timestamp, None);

        let err = toml::from_str::<FitOptions>(
            r#"
            name = "n"
            arch = "a"
            os = "o"
            kernel = "k"
            dtb_compress = "brotli"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("brotli"));
    }
}
