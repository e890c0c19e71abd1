//! Compressor interface
//!
//! Every payload compressor implements [`CompressionInterface`];
//! [`create_compressor`] picks the implementation for an algorithm.

use std::borrow::Cow;

use log::debug;

use super::{CompTool, Compression, CompressionTable, ProcessRunner, RunOutcome};
use crate::error::{MkFitError, Result};

/// Interface implemented by all compressors
pub trait CompressionInterface {
    /// Compress `data`; implementations may hand back the input unchanged.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Algorithm recorded in the image's `compression` property
    fn compression_type(&self) -> Compression;

    fn name(&self) -> &'static str {
        self.compression_type().as_str()
    }
}

/// Identity transform used for `none`
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompression;

impl CompressionInterface for NoCompression {
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn compression_type(&self) -> Compression {
        Compression::None
    }
}

/// Pipes data through the first available tool of a [`CompTool`] entry.
///
/// Only a missing executable moves on to the next candidate. A tool that
/// starts and then fails ends the call.
pub struct ToolCompressor<'r> {
    compression: Compression,
    tool: CompTool,
    runner: &'r dyn ProcessRunner,
}

impl<'r> ToolCompressor<'r> {
    pub fn new(compression: Compression, tool: CompTool, runner: &'r dyn ProcessRunner) -> Self {
        Self {
            compression,
            tool,
            runner,
        }
    }
}

impl CompressionInterface for ToolCompressor<'_> {
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        for tool in &self.tool.tools {
            match self.runner.run(tool, &["-c"], data)? {
                RunOutcome::NotFound => {
                    debug!("compression tool '{tool}' not found");
                }
                RunOutcome::Finished {
                    code: Some(0),
                    stdout,
                } => {
                    debug!(
                        "{tool}: {} -> {} bytes (.{})",
                        data.len(),
                        stdout.len(),
                        self.tool.ext
                    );
                    return Ok(Cow::Owned(stdout));
                }
                RunOutcome::Finished { code, .. } => {
                    return Err(MkFitError::CompressionToolFailed {
                        tool: tool.to_string(),
                        status: match code {
                            Some(code) => format!("exit code {code}"),
                            None => "terminated by signal".to_string(),
                        },
                    });
                }
            }
        }

        Err(MkFitError::MissingCompressionTool {
            tools: self.tool.tool_list(),
        })
    }

    fn compression_type(&self) -> Compression {
        self.compression
    }
}

/// Build the compressor for `compression` from `table`.
///
/// Fails with [`MkFitError::UnknownCompressionAlgorithm`] when the table has
/// no tools for the algorithm; nothing is spawned in that case.
pub fn create_compressor<'r>(
    compression: Compression,
    table: &CompressionTable,
    runner: &'r dyn ProcessRunner,
) -> Result<Box<dyn CompressionInterface + 'r>> {
    if compression == Compression::None {
        return Ok(Box::new(NoCompression));
    }
    let tool = table
        .get(compression)
        .ok_or_else(|| MkFitError::UnknownCompressionAlgorithm(compression.to_string()))?;
    Ok(Box::new(ToolCompressor::new(compression, tool.clone(), runner)))
}
