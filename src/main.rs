mod analysis;
mod ast;
mod cfg;
mod cli;
mod commands;
mod errors;
mod librarian;
mod oracle;
mod pipeline;
mod scanner;
mod taint;
mod utils;
mod walk;

use crate::errors::ArgusResult;
use crate::utils::Config;
use clap::Parser;
use cli::Cli;
use console::style;
use directories::ProjectDirs;
use std::fs;
use std::time::Instant;
use tracing_subscriber::fmt::time;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .pretty()
        .with_thread_ids(true)
        .with_timer(time::UtcTime::rfc_3339());

    Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer)
        .init();
}

fn main() -> ArgusResult<()> {
    let now = Instant::now();
    init_tracing();

    tracing::debug!("CLI starting up");
    let cli = Cli::parse();

    let proj_dirs = ProjectDirs::from("dev", "ecpeter23", "argus")
        .ok_or("Unable to determine project directories")?;

    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)?;

    let database_dir = proj_dirs.data_local_dir();
    fs::create_dir_all(database_dir)?;

    let mut config = Config::load(config_dir)?;

    rayon::ThreadPoolBuilder::new()
        .stack_size(config.performance.rayon_thread_stack_size)
        .build_global()
        .expect("set rayon stack size");

    commands::handle_command(cli.command, database_dir, &mut config)?;

    println!(
        "{} in {:.3}s.",
        style("Finished").green().bold(),
        now.elapsed().as_secs_f32()
    );
    Ok(())
}
