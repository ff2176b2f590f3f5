use std::process::exit;

use clap::Parser;
use tracing::{error, info};

use rmud::app::App;
use rmud::config::Config;
use rmud::error::Error;
use rmud::{cli, logging, panic};

#[tokio::main]
async fn main() -> Result<(), Error> {
    panic::install_handler();

    let args = cli::Args::parse();
    logging::init(&args)?;

    info!(args = ?args, "starting client");
    let config = Config::from(&args);

    if let Err(err) = App::new(config).run().await {
        error!("{err}");
        eprintln!("{err}");
        exit(1);
    }
    Ok(())
}
