//! # mkfit
//!
//! Builds a U-Boot FIT (Flattened Image Tree) holding one kernel and a set
//! of devicetrees, with one configuration per devicetree.
//!
//! Devicetree files shared between boards, such as a base DTB that several
//! composite DTBs were built from with overlays, are embedded only once.
//! DTBs may be compressed with an external tool (gzip, zstd, ...).
//!
//! ## Example
//!
//! ```no_run
//! use mkfit::{Compression, FitImageBuilder, FitOptions};
//!
//! let options = FitOptions::new("Linux-6.6", "arm64", "linux", "arch/arm64/boot/Image")
//!     .with_dtbs(["board-a.dtb", "board-b.dtb"])
//!     .with_compression(Compression::Gzip);
//!
//! let fit = FitImageBuilder::new(options).build()?;
//! std::fs::write("image.fit", &fit.data)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod compression;
pub mod dedup;
pub mod dtb;
pub mod error;
pub mod external;
pub mod fit;

pub use compression::{Compression, CompressionInterface, CompressionTable};
pub use error::{MkFitError, Result};
pub use fit::{FitImageBuilder, FitOptions, FitOutput, FitSummary};

/// Current version of mkfit
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
