use anyhow::{Context, Result};
use clap::Parser;
use oblivious_fm_search::cli_utils::LpmArgs;
use oblivious_fm_search::fm_index::run;

fn main() -> Result<()> {
    env_logger::init();

    let args = LpmArgs::parse();

    println!("{:?}", args);

    run(args).with_context(|| "Failed to run the protocol.")?;

    Ok(())
}
