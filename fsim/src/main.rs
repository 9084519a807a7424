//! Command-line entry point: opens (or formats) a filesystem image and
//! drops into the interactive shell.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fsim::fs::FileSystem;
use fsim::shell;

/// A user-space simulation of a Unix-style filesystem backed by a single
/// image file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the image file to use (created if it does not exist).
    #[arg(default_value = "filesystem.img")]
    image: PathBuf,

    /// Format the image from scratch even if it already exists.
    #[arg(short, long)]
    init: bool,

    /// Path to the append-only event log.
    #[arg(short, long, default_value = "log.txt")]
    log: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_file = match OpenOptions::new().create(true).append(true).open(&args.log) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open log file {}: {e}", args.log.display());
            return ExitCode::FAILURE;
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();

    let mut fs = match FileSystem::open(&args.image, args.init) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("failed to open {}: {e}", args.image.display());
            return ExitCode::FAILURE;
        }
    };

    shell::run(&mut fs);

    if let Err(e) = fs.close() {
        eprintln!("failed to close {}: {e}", args.image.display());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
