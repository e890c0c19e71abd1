//! Table of external compression tools

use std::collections::HashMap;

use super::Compression;

/// File extension hint and candidate tools for one algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompTool {
    pub ext: &'static str,
    /// Tried in order; the first one found on the system is used
    pub tools: Vec<&'static str>,
}

impl CompTool {
    pub fn new(ext: &'static str, tools: &[&'static str]) -> Self {
        Self {
            ext,
            tools: tools.to_vec(),
        }
    }

    /// Comma-joined candidate list, as reported when none is found
    pub fn tool_list(&self) -> String {
        self.tools.join(",")
    }
}

/// Read-only mapping from algorithm to its tools
#[derive(Debug, Clone)]
pub struct CompressionTable {
    tools: HashMap<Compression, CompTool>,
}

impl CompressionTable {
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with(mut self, compression: Compression, tool: CompTool) -> Self {
        self.tools.insert(compression, tool);
        self
    }

    pub fn get(&self, compression: Compression) -> Option<&CompTool> {
        self.tools.get(&compression)
    }
}

impl Default for CompressionTable {
    fn default() -> Self {
        Self::empty()
            .with(Compression::Bzip2, CompTool::new(".bz2", &["bzip2"]))
            .with(Compression::Gzip, CompTool::new(".gz", &["pigz", "gzip"]))
            .with(Compression::Lz4, CompTool::new(".lz4", &["lz4"]))
            .with(Compression::Lzma, CompTool::new(".lzma", &["lzma"]))
            .with(Compression::Lzo, CompTool::new(".lzo", &["lzop"]))
            .with(Compression::Zstd, CompTool::new(".zstd", &["zstd"]))
    }
}
