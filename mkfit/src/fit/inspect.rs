//! Reading back a FIT
//!
//! Summarizes the images and configurations of a FIT blob, including FITs
//! converted to external data where `data` is replaced by `data-size`.

use fdt::Fdt;
use fdt::node::FdtNode;

use crate::dtb::{check_blob, split_string_list};
use crate::error::{MkFitError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub name: String,
    pub description: String,
    pub image_type: String,
    pub arch: String,
    pub compression: String,
    /// Stored payload size
    pub data_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSummary {
    pub name: String,
    pub description: String,
    pub compatible: Vec<String>,
    pub fdts: Vec<String>,
    pub kernel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitSummary {
    pub description: String,
    pub timestamp: Option<u32>,
    /// `totalsize` from the FDT header, i.e. the structure without external data
    pub total_size: usize,
    pub images: Vec<ImageSummary>,
    pub configurations: Vec<ConfigSummary>,
}

impl FitSummary {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_blob(data).map_err(MkFitError::InvalidFit)?;
        let fit = Fdt::new(data).map_err(|e| MkFitError::InvalidFit(format!("{e:?}")))?;
        let root = fit
            .find_node("/")
            .ok_or_else(|| MkFitError::InvalidFit("no root node".into()))?;
        let images = fit
            .find_node("/images")
            .ok_or_else(|| MkFitError::InvalidFit("no /images node".into()))?;
        let configurations = fit
            .find_node("/configurations")
            .ok_or_else(|| MkFitError::InvalidFit("no /configurations node".into()))?;

        Ok(Self {
            description: prop_str(&root, "description"),
            timestamp: root
                .property("timestamp")
                .and_then(|p| p.as_usize())
                .map(|t| t as u32),
            total_size: fit.total_size(),
            images: images.children().map(|n| image_summary(&n)).collect(),
            configurations: configurations
                .children()
                .map(|n| config_summary(&n))
                .collect(),
        })
    }
}

fn image_summary(node: &FdtNode<'_, '_>) -> ImageSummary {
    let data_size = match node.property("data") {
        Some(p) => p.value.len(),
        None => node
            .property("data-size")
            .and_then(|p| p.as_usize())
            .unwrap_or(0),
    };
    ImageSummary {
        name: node.name.to_string(),
        description: prop_str(node, "description"),
        image_type: prop_str(node, "type"),
        arch: prop_str(node, "arch"),
        compression: prop_str(node, "compression"),
        data_size,
    }
}

fn config_summary(node: &FdtNode<'_, '_>) -> ConfigSummary {
    let list = |name: &str| -> Vec<String> {
        node.property(name)
            .map(|p| {
                split_string_list(p.value)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    ConfigSummary {
        name: node.name.to_string(),
        description: prop_str(node, "description"),
        compatible: list("compatible"),
        fdts: list("fdt"),
        kernel: prop_str(node, "kernel"),
    }
}

fn prop_str(node: &FdtNode<'_, '_>, name: &str) -> String {
    node.property(name)
        .and_then(|p| p.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::DeviceTreeBuilder;

    #[test]
    fn test_external_data_size() {
        let mut dt = DeviceTreeBuilder::new();
        dt.node("", |dt| {
            dt.property_string("description", "ext")?;
            dt.node("images", |dt| {
                dt.node("fdt-1", |dt| {
                    dt.property_string("type", "flat_dt")?;
                    dt.property_u32("data-offset", 0)?;
                    dt.property_u32("data-size", 4096)
                })
            })?;
            dt.node("configurations", |_| Ok(()))
        })
        .unwrap();
        let blob = dt.finish().unwrap();

        let summary = FitSummary::from_bytes(&blob).unwrap();
        assert_eq!(summary.description, "ext");
        assert_eq!(summary.timestamp, None);
        assert_eq!(summary.total_size, blob.len());
        assert_eq!(summary.images[0].data_size, 4096);
        assert_eq!(summary.images[0].image_type, "flat_dt");
        assert!(summary.configurations.is_empty());
    }

    #[test]
    fn test_rejects_non_fit() {
        let mut dt = DeviceTreeBuilder::new();
        dt.node("", |dt| dt.property_string("model", "board")).unwrap();
        let blob = dt.finish().unwrap();
        assert!(matches!(
            FitSummary::from_bytes(&blob).unwrap_err(),
            MkFitError::InvalidFit(_)
        ));
        assert!(FitSummary::from_bytes(b"garbage").is_err());
    }

    #[test]
    fn test_corrupt_fit_is_an_error() {
        let mut dt = DeviceTreeBuilder::new();
        dt.node("", |dt| {
            dt.node("images", |_| Ok(()))?;
            dt.node("configurations", |_| Ok(()))
        })
        .unwrap();
        let mut blob = dt.finish().unwrap();
        // point the strings block far outside the blob
        blob[12..16].copy_from_slice(&0x7fff_0000u32.to_be_bytes());
        assert!(matches!(
            FitSummary::from_bytes(&blob).unwrap_err(),
            MkFitError::InvalidFit(_)
        ));
    }
}
