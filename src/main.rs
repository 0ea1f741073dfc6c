mod action;
mod bits;
mod cli;
mod config;
mod count_array;
mod database;
mod driver;
mod error;
mod histogram;
mod input;
mod kmer;
mod printer;
mod scheduler;
mod schema;
mod seq;

use anyhow::Result;
use clap::Parser;
use log::error;

fn main() -> Result<()> {
    env_logger::init();

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli) {
        error!("{e:#}");
        eprintln!("meryl: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}
