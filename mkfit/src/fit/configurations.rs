//! Boot configurations
//!
//! One configuration is emitted per top-level DTB. It names the kernel and
//! the devicetree images (base first, then overlays) by their node names.

use std::collections::HashSet;

use crate::error::{MkFitError, Result};
use crate::fit::DeviceTreeBuilder;
use crate::fit::types::{ImageId, KERNEL_LABEL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Basename of the top-level DTB
    pub name: String,
    pub model: String,
    /// Raw `compatible` list copied from the DTB root
    pub compatible: Vec<u8>,
    /// Sequence numbers of the member images, in load order
    pub fdts: Vec<u32>,
}

impl Configuration {
    pub fn node_name(&self) -> String {
        format!("conf-{}", self.name)
    }

    /// `fdt` property value: `fdt-<seq>\0` for every member
    pub fn fdt_property(&self) -> Vec<u8> {
        let mut value = Vec::new();
        for &seq in &self.fdts {
            value.extend_from_slice(ImageId::Fdt(seq).node_name().as_bytes());
            value.push(0);
        }
        value
    }

    fn write(&self, dt: &mut DeviceTreeBuilder) -> Result<()> {
        dt.node(&self.node_name(), |dt| {
            dt.property("compatible", &self.compatible)?;
            dt.property_string("description", &self.model)?;
            dt.property("fdt", &self.fdt_property())?;
            dt.property_string("kernel", KERNEL_LABEL)
        })
    }
}

/// Configurations collected during a build, unique by name
#[derive(Debug, Default)]
pub struct ConfigurationSet {
    seen: HashSet<String>,
    entries: Vec<Configuration>,
}

impl ConfigurationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a configuration; a name already present aborts the build.
    pub fn add(&mut self, config: Configuration) -> Result<()> {
        if !self.seen.insert(config.name.clone()) {
            return Err(MkFitError::DuplicateConfigurationName(config.name));
        }
        self.entries.push(config);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Configuration> {
        self.entries.iter()
    }

    /// Emit the `/configurations` node; the root node must be open.
    pub fn write(&self, dt: &mut DeviceTreeBuilder) -> Result<()> {
        dt.node("configurations", |dt| {
            for config in &self.entries {
                config.write(dt)?;
            }
            Ok(())
        })
    }
}
