//! FIT (Flattened Image Tree) module
//!
//! Creation and inspection of U-Boot FIT images holding a kernel and a set of
//! devicetrees.

pub mod builder;
pub mod config;
pub mod configurations;
pub mod dt_builder;
pub mod inspect;
pub mod types;

pub use builder::{FitImageBuilder, FitOutput};
pub use config::FitOptions;
pub use configurations::{Configuration, ConfigurationSet};
pub use dt_builder::{DeviceTreeBuilder, NodeHandle};
pub use inspect::{ConfigSummary, FitSummary, ImageSummary};
pub use types::{ImageEntry, ImageId, ImageKind, KERNEL_LABEL};
