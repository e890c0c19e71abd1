//! Reading input devicetree blobs
//!
//! Every top-level DTB contributes its root `model` and `compatible` to a
//! configuration. With decomposition enabled, composite DTBs built by
//! `fdtoverlay` are replaced by their base DTB and overlays so shared pieces
//! can be deduplicated.

pub mod blob;
pub mod cmd;

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{MkFitError, Result};

pub use blob::check_blob;
pub use cmd::{cmd_file_path, parse_build_command};

/// What a top-level DTB contributes to the FIT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtbInfo {
    pub model: String,
    /// Raw `compatible` value: NUL-terminated strings back to back
    pub compatible: Vec<u8>,
    /// Files to embed, base first
    pub files: Vec<PathBuf>,
}

impl DtbInfo {
    pub fn compatible_strings(&self) -> Vec<&str> {
        split_string_list(&self.compatible)
    }
}

/// Read `path` and work out which files represent it.
pub fn process_dtb(path: &Path, decompose: bool) -> Result<DtbInfo> {
    let data = fs::read(path).map_err(|e| MkFitError::read_file(path, e))?;
    let (model, compatible) = read_identity(path, &data)?;

    let files = if decompose {
        decompose_dtb(path)?
    } else {
        vec![path.to_path_buf()]
    };

    Ok(DtbInfo {
        model,
        compatible,
        files,
    })
}

/// Root `model` string and raw `compatible` list of a DTB
pub fn read_identity(path: &Path, data: &[u8]) -> Result<(String, Vec<u8>)> {
    check_blob(data).map_err(|reason| MkFitError::malformed_dtb(path, reason))?;
    let fdt = fdt::Fdt::new(data)
        .map_err(|e| MkFitError::malformed_dtb(path, format!("not a devicetree blob ({e:?})")))?;
    let root = fdt
        .find_node("/")
        .ok_or_else(|| MkFitError::malformed_dtb(path, "no root node"))?;

    let model = root
        .property("model")
        .ok_or_else(|| MkFitError::malformed_dtb(path, "missing 'model' property"))?
        .as_str()
        .ok_or_else(|| MkFitError::malformed_dtb(path, "'model' is not a string"))?
        .to_string();
    let compatible = root
        .property("compatible")
        .ok_or_else(|| MkFitError::malformed_dtb(path, "missing 'compatible' property"))?
        .value
        .to_vec();

    Ok((model, compatible))
}

/// Constituent files of `path` according to its build sidecar
pub fn decompose_dtb(path: &Path) -> Result<Vec<PathBuf>> {
    let cmd_path = cmd_file_path(path);
    let text = match fs::read_to_string(&cmd_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MkFitError::MissingBuildMetadata {
                cmd: cmd_path,
                dtb: path.to_path_buf(),
            });
        }
        Err(e) => return Err(MkFitError::read_file(&cmd_path, e)),
    };

    match parse_build_command(&cmd_path, &text)? {
        Some(files) => {
            debug!("{} decomposes into {files:?}", path.display());
            Ok(files)
        }
        None => Ok(vec![path.to_path_buf()]),
    }
}

/// Split a devicetree string list, ignoring the final terminator
pub fn split_string_list(raw: &[u8]) -> Vec<&str> {
    raw.split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .filter_map(|s| std::str::from_utf8(s).ok())
        .collect()
}
