//! Image nodes of a FIT

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::compression::{Compression, CompressionInterface};
use crate::error::Result;
use crate::fit::DeviceTreeBuilder;

/// Node name, and configuration reference, of the kernel image
pub const KERNEL_LABEL: &str = "kernel";

/// Image `type` values written by this tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Kernel run from wherever the bootloader put it
    KernelNoload,
    FlatDt,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KernelNoload => "kernel_noload",
            Self::FlatDt => "flat_dt",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of an image node under `/images`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageId {
    Fdt(u32),
    Kernel,
}

impl ImageId {
    pub fn node_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fdt(seq) => write!(f, "fdt-{seq}"),
            Self::Kernel => f.write_str(KERNEL_LABEL),
        }
    }
}

/// One blob stored in the FIT
#[derive(Debug, Clone)]
pub struct ImageEntry<'a> {
    pub id: ImageId,
    pub description: String,
    pub kind: ImageKind,
    pub arch: String,
    /// Only set for the kernel
    pub os: Option<String>,
    pub compression: Compression,
    pub source: PathBuf,
    pub raw_size: u64,
    pub data: Cow<'a, [u8]>,
}

impl<'a> ImageEntry<'a> {
    /// Devicetree image, compressed with `compressor`
    pub fn fdt(
        seq: u32,
        source: &Path,
        raw: &'a [u8],
        arch: &str,
        compressor: &dyn CompressionInterface,
    ) -> Result<Self> {
        let description = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            id: ImageId::Fdt(seq),
            description,
            kind: ImageKind::FlatDt,
            arch: arch.to_string(),
            os: None,
            compression: compressor.compression_type(),
            source: source.to_path_buf(),
            raw_size: raw.len() as u64,
            data: compressor.compress(raw)?,
        })
    }

    /// Kernel image, stored uncompressed
    pub fn kernel(name: &str, source: &Path, raw: &'a [u8], arch: &str, os: &str) -> Self {
        Self {
            id: ImageId::Kernel,
            description: name.to_string(),
            kind: ImageKind::KernelNoload,
            arch: arch.to_string(),
            os: Some(os.to_string()),
            compression: Compression::None,
            source: source.to_path_buf(),
            raw_size: raw.len() as u64,
            data: Cow::Borrowed(raw),
        }
    }

    /// Write this image as a child of the open `/images` node
    pub fn write(&self, dt: &mut DeviceTreeBuilder) -> Result<()> {
        dt.node(&self.id.node_name(), |dt| {
            dt.property_string("description", &self.description)?;
            dt.property_string("type", self.kind.as_str())?;
            dt.property_string("arch", &self.arch)?;
            if let Some(os) = &self.os {
                dt.property_string("os", os)?;
            }
            dt.property_string("compression", self.compression.as_str())?;
            dt.property("data", &self.data)?;
            if self.kind == ImageKind::KernelNoload {
                // zero lets the bootloader choose placement
                dt.property_u32("load", 0)?;
                dt.property_u32("entry", 0)?;
            }
            Ok(())
        })
    }
}
