//! Sequence numbering for devicetree files
//!
//! Each distinct file gets a 1-based number the first time it is seen. The
//! number names its image node (`fdt-<seq>`) and is what configurations
//! refer to, so a base DTB shared by several boards is embedded once.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Outcome of [`DedupIndex::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub seq: u32,
    /// True when this call assigned the number; the caller must emit the image
    pub is_new: bool,
}

#[derive(Debug, Default)]
pub struct DedupIndex {
    seqs: HashMap<PathBuf, u32>,
    last: u32,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, path: &Path) -> Resolved {
        let key = normalize(path);
        if let Some(&seq) = self.seqs.get(&key) {
            return Resolved { seq, is_new: false };
        }
        self.last += 1;
        self.seqs.insert(key, self.last);
        Resolved {
            seq: self.last,
            is_new: true,
        }
    }

    pub fn get(&self, path: &Path) -> Option<u32> {
        self.seqs.get(&normalize(path)).copied()
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }
}

/// Lexical normalization: drops `.` components and redundant separators.
/// `..` is kept as is since resolving it needs the filesystem.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
