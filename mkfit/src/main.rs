//! Main entry point for the mkfit CLI tool

use clap::Parser;
use colored::Colorize;
use mkfit::cli::{Args, expand_arg_files, init_logger, run_cli};

fn main() {
    let argv = match expand_arg_files(std::env::args()) {
        Ok(argv) => argv,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            std::process::exit(1);
        }
    };
    let args = Args::parse_from(argv);
    init_logger(args.verbose);

    if let Err(e) = run_cli(args) {
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}
