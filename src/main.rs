// src/main.rs

use clap::Parser;

use savepoint::cli::CliArgs;
use savepoint::{logging, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
