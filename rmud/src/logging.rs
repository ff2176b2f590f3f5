//! Tracing output for a program whose stdout is the game screen.
//!
//! Diagnostics never go to the console: they would interleave with server
//! text. Everything lands in one plain-text log file, `--log-file` if
//! given, else `<data-dir>/rmud.log`. `--log-level` sets the default
//! verbosity; the `RMUD_LOG` environment variable accepts a full filter
//! expression (`rmud::net=trace,info`) and wins over the flag.

use std::fs::{self, File};
use std::path::PathBuf;

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::cli;
use crate::config::{self, CRATE_NAME};
use crate::error::{Error, ErrorKind};

/// Filter override variable, e.g. `RMUD_LOG=rmud::script=trace`.
pub static LOG_ENV: &str = "RMUD_LOG";

pub fn init(args: &cli::Args) -> Result<(), Error> {
    let path = log_file(args);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ErrorKind::from)?;
    }
    let file = File::create(&path).map_err(ErrorKind::from)?;

    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV)
        .with_default_directive(args.log_level.into())
        .from_env()
        .map_err(|e| ErrorKind::Cli(format!("invalid {LOG_ENV} filter: {e}")))?;

    // Target paths (rmud::net::session and friends) are the useful grep
    // key in a protocol log; ANSI stays off so the file greps clean.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

fn log_file(args: &cli::Args) -> PathBuf {
    match &args.log_file {
        Some(path) => path.clone(),
        None => config::data_dir().join(format!("{CRATE_NAME}.log")),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn log_file_defaults_to_data_dir() {
        let args = cli::Args::parse_from(["rmud"]);
        let path = log_file(&args);
        assert_eq!(path, config::data_dir().join("rmud.log"));
    }

    #[test]
    fn log_file_flag_wins() {
        let args = cli::Args::parse_from(["rmud", "--log-file", "/tmp/session.log"]);
        assert_eq!(log_file(&args), PathBuf::from("/tmp/session.log"));
    }
}
