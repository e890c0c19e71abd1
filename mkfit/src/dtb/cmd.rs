//! Kernel build `.cmd` sidecar files
//!
//! Kbuild records the command that produced every target in
//! `<dir>/.<target>.cmd`. Composite DTBs are produced by `fdtoverlay`:
//!
//! ```text
//! savedcmd_arch/arm64/boot/dts/board-ov.dtb := ./scripts/dtc/fdtoverlay -o arch/arm64/boot/dts/board-ov.dtb -i arch/arm64/boot/dts/board.dtb arch/arm64/boot/dts/ov.dtbo
//! ```
//!
//! The files after `-i` are the base DTB followed by its overlays.

use std::path::{Path, PathBuf};

use crate::error::{MkFitError, Result};

pub const FDTOVERLAY_MARKER: &str = "scripts/dtc/fdtoverlay";
pub const INPUT_LIST_FLAG: &str = "-i";

/// Sidecar path for `dtb`: same directory, `.<basename>.cmd`
pub fn cmd_file_path(dtb: &Path) -> PathBuf {
    let name = dtb
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dtb.with_file_name(format!(".{name}.cmd"))
}

/// Extract the constituent files from a build command.
///
/// Returns `None` when the command does not run `fdtoverlay`, meaning the
/// DTB is not a composite.
pub fn parse_build_command(cmd_path: &Path, text: &str) -> Result<Option<Vec<PathBuf>>> {
    let Some(line) = text.lines().find(|l| l.contains(FDTOVERLAY_MARKER)) else {
        return Ok(None);
    };

    let mut tokens = line.split_whitespace();
    if !tokens.any(|t| t == INPUT_LIST_FLAG) {
        return Err(MkFitError::invalid_build_command(
            cmd_path,
            format!("fdtoverlay command has no '{INPUT_LIST_FLAG}' input list"),
        ));
    }
    let files: Vec<PathBuf> = tokens.map(PathBuf::from).collect();
    if files.is_empty() {
        return Err(MkFitError::invalid_build_command(
            cmd_path,
            format!("nothing follows '{INPUT_LIST_FLAG}'"),
        ));
    }
    Ok(Some(files))
}
