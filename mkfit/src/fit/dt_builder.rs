//! Flattened devicetree writer
//!
//! Emits the FDT v17 binary layout directly: header, an empty memory
//! reservation map, the structure block and a deduplicated strings block.
//! Nodes follow a strict stack discipline; every [`DeviceTreeBuilder::begin_node`]
//! hands out a [`NodeHandle`] that must be returned to
//! [`DeviceTreeBuilder::end_node`] before its parent can be closed.

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{MkFitError, Result};

pub const FDT_MAGIC: u32 = 0xd00d_feed;
pub const FDT_VERSION: u32 = 17;
pub const FDT_LAST_COMP_VERSION: u32 = 16;

pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

pub(crate) const HEADER_SIZE: usize = 40;
// A single all-zero entry terminates the reservation map.
const RSVMAP_SIZE: usize = 16;

/// Token for an open node; consumed when the node is closed
#[derive(Debug)]
#[must_use = "an open node must be passed back to end_node"]
pub struct NodeHandle {
    depth: usize,
}

/// Incremental writer for the flattened devicetree format
pub struct DeviceTreeBuilder {
    structure: Vec<u8>,
    strings: Vec<u8>,
    string_offsets: HashMap<String, u32>,
    open: Vec<String>,
    root_done: bool,
}

impl DeviceTreeBuilder {
    pub fn new() -> Self {
        Self {
            structure: Vec::new(),
            strings: Vec::new(),
            string_offsets: HashMap::new(),
            open: Vec::new(),
            root_done: false,
        }
    }

    /// Open a node as a child of the innermost open node.
    ///
    /// The first node must be the root, whose name is empty.
    pub fn begin_node(&mut self, name: &str) -> Result<NodeHandle> {
        if self.root_done {
            return Err(MkFitError::consistency(format!(
                "node '{name}' opened after the root was closed"
            )));
        }
        if self.open.is_empty() && !name.is_empty() {
            return Err(MkFitError::consistency(format!(
                "first node must be the root, got '{name}'"
            )));
        }
        if !self.open.is_empty() && name.is_empty() {
            return Err(MkFitError::invalid_value(name, "empty node name"));
        }
        if name.contains(['/', '\0']) {
            return Err(MkFitError::invalid_value(
                name,
                "node names cannot contain '/' or NUL",
            ));
        }

        self.structure.write_u32::<BigEndian>(FDT_BEGIN_NODE)?;
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad_structure();

        self.open.push(name.to_string());
        Ok(NodeHandle {
            depth: self.open.len(),
        })
    }

    /// Close the innermost open node.
    pub fn end_node(&mut self, handle: NodeHandle) -> Result<()> {
        match self.open.len() {
            0 => Err(MkFitError::consistency("end_node without an open node")),
            depth if depth != handle.depth => Err(MkFitError::consistency(format!(
                "node at depth {} closed while '{}' (depth {depth}) is still open",
                handle.depth,
                self.open[depth - 1],
            ))),
            _ => {
                self.structure.write_u32::<BigEndian>(FDT_END_NODE)?;
                self.open.pop();
                if self.open.is_empty() {
                    self.root_done = true;
                }
                Ok(())
            }
        }
    }

    /// Run `f` inside a node; the node is closed whether or not `f` succeeds.
    pub fn node<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let handle = self.begin_node(name)?;
        let body = f(self);
        let ended = self.end_node(handle);
        body?;
        ended
    }

    /// Raw byte property
    pub fn property(&mut self, name: &str, value: &[u8]) -> Result<()> {
        if self.open.is_empty() {
            return Err(MkFitError::consistency(format!(
                "property '{name}' written outside of any node"
            )));
        }
        if name.is_empty() || name.contains('\0') {
            return Err(MkFitError::invalid_value(name, "bad property name"));
        }
        let len = u32::try_from(value.len())
            .map_err(|_| MkFitError::invalid_value(name, "value exceeds 4 GiB"))?;
        let name_off = self.string_offset(name);

        self.structure.write_u32::<BigEndian>(FDT_PROP)?;
        self.structure.write_u32::<BigEndian>(len)?;
        self.structure.write_u32::<BigEndian>(name_off)?;
        self.structure.extend_from_slice(value);
        self.pad_structure();
        Ok(())
    }

    pub fn property_string(&mut self, name: &str, value: &str) -> Result<()> {
        if value.contains('\0') {
            return Err(MkFitError::invalid_value(name, "string contains NUL"));
        }
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.property(name, &bytes)
    }

    pub fn property_u32(&mut self, name: &str, value: u32) -> Result<()> {
        self.property(name, &value.to_be_bytes())
    }

    /// Each member is written followed by a NUL terminator.
    pub fn property_string_list<S: AsRef<str>>(&mut self, name: &str, values: &[S]) -> Result<()> {
        let mut bytes = Vec::new();
        for value in values {
            let value = value.as_ref();
            if value.contains('\0') {
                return Err(MkFitError::invalid_value(name, "list member contains NUL"));
            }
            bytes.extend_from_slice(value.as_bytes());
            bytes.push(0);
        }
        self.property(name, &bytes)
    }

    /// Size of the blob if it were finished now
    pub fn size(&self) -> usize {
        HEADER_SIZE + RSVMAP_SIZE + self.structure.len() + 4 + self.strings.len()
    }

    /// Number of currently open nodes
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Finalize and return the devicetree blob
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if let Some(name) = self.open.last() {
            return Err(MkFitError::consistency(format!(
                "{} node(s) still open, innermost '{name}'",
                self.open.len()
            )));
        }
        if !self.root_done {
            return Err(MkFitError::consistency("no root node written"));
        }
        self.structure.write_u32::<BigEndian>(FDT_END)?;

        let off_mem_rsvmap = HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + RSVMAP_SIZE;
        let off_dt_strings = off_dt_struct + self.structure.len();
        let total_size = off_dt_strings + self.strings.len();
        let to_u32 = |v: usize| {
            u32::try_from(v).map_err(|_| MkFitError::invalid_value("totalsize", "blob exceeds 4 GiB"))
        };

        let mut out = Vec::with_capacity(total_size);
        out.write_u32::<BigEndian>(FDT_MAGIC)?;
        out.write_u32::<BigEndian>(to_u32(total_size)?)?;
        out.write_u32::<BigEndian>(to_u32(off_dt_struct)?)?;
        out.write_u32::<BigEndian>(to_u32(off_dt_strings)?)?;
        out.write_u32::<BigEndian>(to_u32(off_mem_rsvmap)?)?;
        out.write_u32::<BigEndian>(FDT_VERSION)?;
        out.write_u32::<BigEndian>(FDT_LAST_COMP_VERSION)?;
        out.write_u32::<BigEndian>(0)?; // boot_cpuid_phys
        out.write_u32::<BigEndian>(to_u32(self.strings.len())?)?;
        out.write_u32::<BigEndian>(to_u32(self.structure.len())?)?;
        out.extend_from_slice(&[0u8; RSVMAP_SIZE]);
        out.extend_from_slice(&self.structure);
        out.extend_from_slice(&self.strings);

        debug_assert_eq!(out.len(), total_size);
        Ok(out)
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        if let Some(&off) = self.string_offsets.get(name) {
            return off;
        }
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(name.to_string(), off);
        off
    }

    fn pad_structure(&mut self) {
        let padded = self.structure.len().next_multiple_of(4);
        self.structure.resize(padded, 0);
    }
}

impl Default for DeviceTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Vec<u8> {
        let mut dt = DeviceTreeBuilder::new();
        dt.node("", |dt| {
            dt.property_string("model", "Test Board")?;
            dt.property_string_list("compatible", &["vendor,board", "vendor,soc"])?;
            dt.property_u32("#address-cells", 1)?;
            dt.node("images", |dt| {
                dt.node("fdt-1", |dt| dt.property("data", &[1, 2, 3]))
            })
        })
        .unwrap();
        dt.finish().unwrap()
    }

    #[test]
    fn test_header_and_parse_back() {
        let blob = sample_tree();
        assert_eq!(&blob[0..4], b"\xd0\x0d\xfe\xed");
        assert_eq!(
            u32::from_be_bytes(blob[4..8].try_into().unwrap()) as usize,
            blob.len()
        );

        let fdt = fdt::Fdt::new(&blob).unwrap();
        let root = fdt.find_node("/").unwrap();
        assert_eq!(root.property("model").unwrap().as_str(), Some("Test Board"));
        assert_eq!(
            root.property("compatible").unwrap().value,
            b"vendor,board\0vendor,soc\0"
        );
        assert_eq!(root.property("#address-cells").unwrap().as_usize(), Some(1));

        let node = fdt.find_node("/images/fdt-1").unwrap();
        assert_eq!(node.property("data").unwrap().value, &[1, 2, 3]);
    }

    #[test]
    fn test_property_names_are_shared_in_strings_block() {
        let mut dt = DeviceTreeBuilder::new();
        let root = dt.begin_node("").unwrap();
        dt.property_string("description", "a").unwrap();
        let before = dt.strings.len();
        dt.property_string("description", "b").unwrap();
        assert_eq!(dt.strings.len(), before);
        dt.end_node(root).unwrap();
    }

    #[test]
    fn test_size_is_monotonic_and_matches_output() {
        let mut dt = DeviceTreeBuilder::new();
        let mut last = dt.size();
        let root = dt.begin_node("").unwrap();
        assert!(dt.size() >= last);
        last = dt.size();
        dt.property("data", &[0u8; 13]).unwrap();
        assert!(dt.size() > last);
        dt.end_node(root).unwrap();
        let expected = dt.size();
        assert_eq!(dt.finish().unwrap().len(), expected);
    }

    #[test]
    fn test_out_of_order_close_fails() {
        let mut dt = DeviceTreeBuilder::new();
        let root = dt.begin_node("").unwrap();
        let _images = dt.begin_node("images").unwrap();
        let err = dt.end_node(root).unwrap_err();
        assert!(matches!(err, MkFitError::TreeWriterConsistency(_)));
    }

    #[test]
    fn test_finish_with_open_nodes_fails() {
        let mut dt = DeviceTreeBuilder::new();
        let _root = dt.begin_node("").unwrap();
        let err = dt.finish().unwrap_err();
        assert!(matches!(err, MkFitError::TreeWriterConsistency(_)));

        let err = DeviceTreeBuilder::new().finish().unwrap_err();
        assert!(matches!(err, MkFitError::TreeWriterConsistency(_)));
    }

    #[test]
    fn test_root_rules() {
        let mut dt = DeviceTreeBuilder::new();
        assert!(dt.begin_node("images").is_err());
        assert!(dt.property_u32("x", 1).is_err());

        let root = dt.begin_node("").unwrap();
        assert!(dt.begin_node("a/b").is_err());
        dt.end_node(root).unwrap();
        assert!(dt.begin_node("").is_err());
    }

    #[test]
    fn test_closure_closes_node_on_error() {
        let mut dt = DeviceTreeBuilder::new();
        let root = dt.begin_node("").unwrap();
        let err = dt
            .node("images", |dt| dt.property_string("bad", "nul\0inside"))
            .unwrap_err();
        assert!(matches!(err, MkFitError::InvalidTreeValue { .. }));
        assert_eq!(dt.depth(), 1);
        dt.end_node(root).unwrap();
    }
}
