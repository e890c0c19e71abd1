//! FIT assembly
//!
//! Walks the input DTBs in order, embeds every distinct devicetree file once,
//! appends the kernel and writes one configuration per input.

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::{debug, info};

use crate::compression::{
    CompressionInterface, CompressionTable, ProcessRunner, SystemRunner, create_compressor,
};
use crate::dedup::DedupIndex;
use crate::dtb::process_dtb;
use crate::error::{MkFitError, Result};
use crate::fit::configurations::{Configuration, ConfigurationSet};
use crate::fit::types::ImageEntry;
use crate::fit::{DeviceTreeBuilder, FitOptions};

/// A finished FIT
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub data: Vec<u8>,
    /// Images embedded, kernel included
    pub count: usize,
    /// Sum of the input file sizes before compression
    pub uncompressed_size: u64,
    pub configurations: usize,
}

/// Builds a FIT from [`FitOptions`]
pub struct FitImageBuilder<'r> {
    options: FitOptions,
    table: CompressionTable,
    runner: &'r dyn ProcessRunner,
}

impl FitImageBuilder<'static> {
    /// Builder running real compression tools
    pub fn new(options: FitOptions) -> Self {
        Self::with_runner(options, &SystemRunner)
    }
}

impl<'r> FitImageBuilder<'r> {
    pub fn with_runner(options: FitOptions, runner: &'r dyn ProcessRunner) -> Self {
        Self {
            options,
            table: CompressionTable::default(),
            runner,
        }
    }

    /// Replace the compression tool table
    pub fn with_table(mut self, table: CompressionTable) -> Self {
        self.table = table;
        self
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    pub fn build(&self) -> Result<FitOutput> {
        let opts = &self.options;
        let compressor = create_compressor(opts.dtb_compress, &self.table, self.runner)?;
        let timestamp = match opts.timestamp {
            Some(t) => t,
            None => current_timestamp()?,
        };

        let mut index = DedupIndex::new();
        let mut configs = ConfigurationSet::new();
        let mut size = 0u64;

        let mut dt = DeviceTreeBuilder::new();
        dt.node("", |dt| {
            dt.property_string("description", &opts.description())?;
            dt.property_u32("#address-cells", 1)?;
            dt.property_u32("timestamp", timestamp)?;

            dt.node("images", |dt| {
                for path in &opts.dtbs {
                    if path.extension().is_none_or(|ext| ext != "dtb") {
                        debug!("skipping non-DTB input {}", path.display());
                        continue;
                    }
                    let config = self.add_dtb(dt, path, &mut index, compressor.as_ref(), &mut size)?;
                    configs.add(config)?;
                }
                size += self.add_kernel(dt)?;
                Ok(())
            })?;

            configs.write(dt)
        })?;

        let data = dt.finish()?;
        let count = index.len() + 1;
        info!(
            "FIT built: {} bytes, {count} images, {} configurations",
            data.len(),
            configs.len()
        );

        Ok(FitOutput {
            data,
            count,
            uncompressed_size: size,
            configurations: configs.len(),
        })
    }

    /// Embed the not yet seen parts of one top-level DTB and describe its
    /// configuration.
    fn add_dtb(
        &self,
        dt: &mut DeviceTreeBuilder,
        path: &Path,
        index: &mut DedupIndex,
        compressor: &dyn CompressionInterface,
        size: &mut u64,
    ) -> Result<Configuration> {
        let info = process_dtb(path, self.options.decompose_dtbs)?;
        debug!(
            "{}: model '{}', compatible {:?}",
            path.display(),
            info.model,
            info.compatible_strings()
        );

        let mut fdts = Vec::with_capacity(info.files.len());
        for file in &info.files {
            let resolved = index.resolve(file);
            if resolved.is_new {
                let raw = fs::read(file).map_err(|e| MkFitError::read_file(file, e))?;
                *size += raw.len() as u64;
                let entry =
                    ImageEntry::fdt(resolved.seq, file, &raw, &self.options.arch, compressor)?;
                debug!(
                    "{} -> {} ({} -> {} bytes)",
                    entry.source.display(),
                    entry.id,
                    entry.raw_size,
                    entry.data.len()
                );
                entry.write(dt)?;
            }
            fdts.push(resolved.seq);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Configuration {
            name,
            model: info.model,
            compatible: info.compatible,
            fdts,
        })
    }

    fn add_kernel(&self, dt: &mut DeviceTreeBuilder) -> Result<u64> {
        let opts = &self.options;
        let raw = fs::read(&opts.kernel).map_err(|e| MkFitError::read_file(&opts.kernel, e))?;
        let entry = ImageEntry::kernel(&opts.name, &opts.kernel, &raw, &opts.arch, &opts.os);
        entry.write(dt)?;
        Ok(entry.raw_size)
    }
}

/// Seconds since the epoch as stored in the root `timestamp`
fn current_timestamp() -> Result<u32> {
    to_timestamp(Utc::now().timestamp())
}

fn to_timestamp(seconds: i64) -> Result<u32> {
    u32::try_from(seconds).map_err(|_| {
        MkFitError::invalid_value("timestamp", format!("{seconds} does not fit in 32 bits"))
    })
}
