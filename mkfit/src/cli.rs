//! Command line interface for mkfit

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use byte_unit::Byte;
use clap::{Parser, ValueEnum};
use log::info;
use serde::Deserialize;

use crate::VERSION;
use crate::compression::Compression;
use crate::error::{MkFitError, Result};
use crate::external::{externalize, mkimage_tool};
use crate::fit::{FitImageBuilder, FitOptions};

/// Command line arguments for mkfit
#[derive(Parser, Debug)]
#[command(name = "mkfit")]
#[command(version = VERSION)]
#[command(about = "Build a FIT containing a kernel and a set of devicetree files", long_about = None)]
#[command(after_help = "Arguments of the form @FILE are replaced by the lines of FILE")]
pub struct Args {
    /// Architecture, e.g. arm64
    #[arg(short = 'A', long)]
    pub arch: Option<String>,

    /// Compression of the DTBs
    #[arg(long, value_enum)]
    pub dtb_compress: Option<CompressionArg>,

    /// Decompose composite DTBs into base DTB and overlays
    #[arg(short = 'D', long)]
    pub decompose_dtbs: bool,

    /// Convert the FIT to use external data
    #[arg(short = 'E', long)]
    pub external: bool,

    /// Image name, e.g. Linux-6.6
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Output file (.fit)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Operating system, e.g. linux
    #[arg(short = 'O', long)]
    pub os: Option<String>,

    /// Uncompressed kernel image (.itk)
    #[arg(short = 'k', long)]
    pub kernel: Option<PathBuf>,

    /// TOML file providing defaults for any of the options
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Devicetree files to process
    pub dtbs: Vec<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum CompressionArg {
    None,
    Bzip2,
    Gzip,
    Lz4,
    Lzma,
    Lzo,
    Zstd,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Self::None,
            CompressionArg::Bzip2 => Self::Bzip2,
            CompressionArg::Gzip => Self::Gzip,
            CompressionArg::Lz4 => Self::Lz4,
            CompressionArg::Lzma => Self::Lzma,
            CompressionArg::Lzo => Self::Lzo,
            CompressionArg::Zstd => Self::Zstd,
        }
    }
}

/// Defaults loaded with `--config`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildFile {
    pub name: Option<String>,
    pub arch: Option<String>,
    pub os: Option<String>,
    pub kernel: Option<PathBuf>,
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub dtbs: Vec<PathBuf>,
    pub dtb_compress: Option<Compression>,
    pub decompose_dtbs: Option<bool>,
    pub external: Option<bool>,
}

impl BuildFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| MkFitError::read_file(path, e))?;
        Ok(toml::from_str(&text)?)
    }
}

/// Everything needed to run one build
#[derive(Debug, Clone)]
pub struct Plan {
    pub options: FitOptions,
    pub output: PathBuf,
    pub external: bool,
    pub verbose: bool,
}

impl Args {
    /// Merge the command line over the `--config` file, if any.
    pub fn resolve(self) -> Result<Plan> {
        let file = match &self.config {
            Some(path) => BuildFile::load(path)?,
            None => BuildFile::default(),
        };

        fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
            value.ok_or_else(|| MkFitError::InvalidOptions(format!("{flag} is required")))
        }

        let options = FitOptions::new(
            required(self.name.or(file.name), "--name")?,
            required(self.arch.or(file.arch), "--arch")?,
            required(self.os.or(file.os), "--os")?,
            required(self.kernel.or(file.kernel), "--kernel")?,
        )
        .with_dtbs(if self.dtbs.is_empty() { file.dtbs } else { self.dtbs })
        .with_compression(
            self.dtb_compress
                .map(Compression::from)
                .or(file.dtb_compress)
                .unwrap_or_default(),
        )
        .with_decompose(self.decompose_dtbs || file.decompose_dtbs.unwrap_or(false));

        Ok(Plan {
            options,
            output: required(self.output.or(file.output), "--output")?,
            external: self.external || file.external.unwrap_or(false),
            verbose: self.verbose,
        })
    }
}

const MAX_ARG_FILE_DEPTH: usize = 8;

/// Replace every `@FILE` argument by the non-empty lines of FILE.
pub fn expand_arg_files<I>(args: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    for arg in args {
        expand_arg(arg, 0, &mut out)?;
    }
    Ok(out)
}

fn expand_arg(arg: String, depth: usize, out: &mut Vec<String>) -> Result<()> {
    let Some(file) = arg.strip_prefix('@') else {
        out.push(arg);
        return Ok(());
    };
    if depth >= MAX_ARG_FILE_DEPTH {
        return Err(MkFitError::InvalidOptions(format!(
            "argument files nested too deeply at '{file}'"
        )));
    }
    let path = Path::new(file);
    let text = fs::read_to_string(path).map_err(|e| MkFitError::read_file(path, e))?;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        expand_arg(line.to_string(), depth + 1, out)?;
    }
    Ok(())
}

/// Set up `env_logger`; `RUST_LOG` takes precedence over `verbose`.
pub fn init_logger(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

/// Main CLI handler
pub fn run_cli(args: Args) -> anyhow::Result<()> {
    let plan = args.resolve()?;

    let out = FitImageBuilder::new(plan.options.clone())
        .build()
        .context("FIT creation failed")?;
    write_output(&plan.output, &out.data)?;
    info!(
        "wrote {} ({:#})",
        plan.output.display(),
        Byte::from_u64(out.data.len() as u64)
    );

    let header_size = if plan.external {
        match externalize(&mkimage_tool(), &plan.output) {
            Ok(size) => Some(size),
            Err(e) => {
                let _ = fs::remove_file(&plan.output);
                return Err(e.into());
            }
        }
    } else {
        None
    };

    if plan.verbose {
        println!(
            "{}",
            summary_line(out.data.len(), header_size, out.count, out.uncompressed_size)
        );
    }
    Ok(())
}

/// Write `data` to `output` without ever leaving a partial file behind.
pub fn write_output(output: &Path, data: &[u8]) -> anyhow::Result<()> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        bail!("output directory '{}' does not exist", dir.display());
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix(".mkfit");
    // same mode as a plain create; the umask still applies
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder
        .tempfile_in(dir)
        .with_context(|| format!("cannot create temporary file in '{}'", dir.display()))?;
    tmp.write_all(data)?;
    tmp.persist(output)
        .map_err(|e| e.error)
        .with_context(|| format!("cannot write '{}'", output.display()))?;
    Ok(())
}

/// Verbose report: FIT size, optional external header size, file count and
/// total uncompressed input size.
pub fn summary_line(
    fit_size: usize,
    header_size: Option<usize>,
    count: usize,
    uncompressed: u64,
) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let mut line = format!("FIT size {fit_size:#x}/{:.1} MB", fit_size as f64 / MB);
    if let Some(header) = header_size {
        line += &format!(", header {header:#x}/{:.1} KB", header as f64 / KB);
    }
    line += &format!(
        ", {count} files, uncompressed {:.1} MB",
        uncompressed as f64 / MB
    );
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_args_parsing() {
        let args = parse(&[
            "mkfit", "-A", "arm64", "-n", "Linux-6.6", "-O", "linux", "-k", "Image", "-o",
            "out.fit", "--dtb-compress", "gzip", "-D", "-E", "-v", "a.dtb", "b.dtb",
        ]);
        assert_eq!(args.dtb_compress, Some(CompressionArg::Gzip));
        assert!(args.decompose_dtbs && args.external && args.verbose);

        let plan = args.resolve().unwrap();
        assert_eq!(plan.options.arch, "arm64");
        assert_eq!(plan.options.dtb_compress, Compression::Gzip);
        assert_eq!(plan.options.dtbs, vec![PathBuf::from("a.dtb"), PathBuf::from("b.dtb")]);
        assert_eq!(plan.output, PathBuf::from("out.fit"));
        assert!(plan.external);
    }

    #[test]
    fn test_unknown_compression_is_rejected() {
        assert!(Args::try_parse_from(["mkfit", "--dtb-compress", "brotli"]).is_err());
    }

    #[test]
    fn test_missing_required_option() {
        let err = parse(&["mkfit", "-A", "arm64", "-n", "x", "-O", "linux", "-o", "o.fit"])
            .resolve()
            .unwrap_err();
        assert!(matches!(err, MkFitError::InvalidOptions(ref m) if m.contains("--kernel")));
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = TempDir::new().unwrap();
        let cfg = dir.path().join("fit.toml");
        fs::write(
            &cfg,
            r#"
            name = "Linux-6.6"
            arch = "arm64"
            os = "linux"
            kernel = "Image"
            output = "image.fit"
            dtbs = ["a.dtb"]
            dtb_compress = "lz4"
            decompose_dtbs = true
            "#,
        )
        .unwrap();

        let plan = parse(&["mkfit", "-c", cfg.to_str().unwrap(), "-A", "riscv", "b.dtb"])
            .resolve()
            .unwrap();
        assert_eq!(plan.options.arch, "riscv");
        assert_eq!(plan.options.name, "Linux-6.6");
        assert_eq!(plan.options.dtbs, vec![PathBuf::from("b.dtb")]);
        assert_eq!(plan.options.dtb_compress, Compression::Lz4);
        assert!(plan.options.decompose_dtbs);
        assert!(!plan.external);

        fs::write(&cfg, "colour = \"blue\"\n").unwrap();
        let err = parse(&["mkfit", "-c", cfg.to_str().unwrap()]).resolve().unwrap_err();
        assert!(matches!(err, MkFitError::Toml(_)));
    }

    #[test]
    fn test_expand_arg_files() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("more");
        fs::write(&inner, "c.dtb\n").unwrap();
        let list = dir.path().join("dtbs-list");
        fs::write(&list, format!("a.dtb\n\n  b.dtb \n@{}\n", inner.display())).unwrap();

        let args = expand_arg_files(
            ["mkfit", "-v", &format!("@{}", list.display()), "d.dtb"].map(String::from),
        )
        .unwrap();
        assert_eq!(args, vec!["mkfit", "-v", "a.dtb", "b.dtb", "c.dtb", "d.dtb"]);

        let err = expand_arg_files([format!("@{}", dir.path().join("none").display())]).unwrap_err();
        assert!(matches!(err, MkFitError::ReadFile { .. }));
    }

    #[test]
    fn test_self_referencing_arg_file() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("loop");
        fs::write(&list, format!("@{}\n", list.display())).unwrap();
        let err = expand_arg_files([format!("@{}", list.display())]).unwrap_err();
        assert!(matches!(err, MkFitError::InvalidOptions(_)));
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(
            summary_line(0x200000, None, 3, 3 * 1024 * 1024),
            "FIT size 0x200000/2.0 MB, 3 files, uncompressed 3.0 MB"
        );
        assert_eq!(
            summary_line(0x100000, Some(0x800), 2, 0),
            "FIT size 0x100000/1.0 MB, header 0x800/2.0 KB, 2 files, uncompressed 0.0 MB"
        );
    }

    #[test]
    fn test_write_output_replaces_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("image.fit");
        fs::write(&out, b"old").unwrap();
        write_output(&out, b"new contents").unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"new contents");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        assert!(write_output(&dir.path().join("missing/image.fit"), b"x").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_output_mode_matches_plain_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("image.fit");
        let plain = dir.path().join("plain.fit");
        write_output(&out, b"data").unwrap();
        fs::write(&plain, b"data").unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&out), mode(&plain));
    }
}
