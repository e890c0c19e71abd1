//! Conversion to an external-data FIT
//!
//! `mkimage -E -F <fit>` moves image payloads after the structure block so a
//! loader can parse the FIT without reading every blob.

use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use log::info;

use crate::dtb::check_blob;
use crate::error::{MkFitError, Result};

/// Environment variable naming the mkimage executable
pub const MKIMAGE_ENV: &str = "MKIMAGE";
pub const DEFAULT_MKIMAGE: &str = "mkimage";

/// mkimage executable from the environment
pub fn mkimage_tool() -> String {
    env::var(MKIMAGE_ENV).unwrap_or_else(|_| DEFAULT_MKIMAGE.to_string())
}

/// Rewrite `fit` in place with external data.
///
/// Returns the size of the FIT structure that now precedes the data.
pub fn externalize(tool: &str, fit: &Path) -> Result<usize> {
    info!("converting {} to external data with {tool}", fit.display());

    let failed = |reason: String| MkFitError::ExternalizeFailed {
        tool: tool.to_string(),
        reason,
    };

    let status = Command::new(tool)
        .args(["-E", "-F"])
        .arg(fit)
        .stdout(Stdio::null())
        .status()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => failed("executable not found".to_string()),
            _ => failed(e.to_string()),
        })?;
    if !status.success() {
        return Err(failed(format!("exited with {status}")));
    }

    let data = fs::read(fit).map_err(|e| MkFitError::read_file(fit, e))?;
    check_blob(&data).map_err(|reason| MkFitError::InvalidFit(format!("{}: {reason}", fit.display())))
}
