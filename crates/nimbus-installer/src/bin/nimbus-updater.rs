//! nimbus-updater - performs the privileged install step.
//!
//! Takes the pathname of the directory containing the prepared platform
//! payload; an optional second argument (a historical lock file path) is
//! accepted and ignored. Status, progress, and errors travel to the parent
//! installer as line-delimited JSON on stdout.

use nimbus_core::ProductPaths;
use nimbus_installer::updater;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    setup_logging();

    let args: Vec<String> = std::env::args().collect();
    let dir = match args.len() {
        3 => {
            debug!("ignoring lockfile = {}", args[2]);
            PathBuf::from(&args[1])
        }
        2 => PathBuf::from(&args[1]),
        _ => {
            eprintln!("usage: nimbus-updater <dir> [lockfile]");
            return -1;
        }
    };
    debug!("dir = {}", dir.display());

    let paths = match ProductPaths::system() {
        Ok(paths) => paths,
        Err(e) => {
            error!("{e}");
            return -1;
        }
    };

    match updater::run_update(&dir, &paths) {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            -1
        }
    }
}

fn setup_logging() {
    // stdout carries the message protocol; logs go to a file next to the
    // installer's own.
    let path = std::env::temp_dir().join("NimbusUpdater.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);
    match file {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
