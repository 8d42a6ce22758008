use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Map the `-d` verbosity count to a level.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Logger writing one line per record, to stderr or appended to `log_file`.
pub fn builder(level: LevelFilter, log_file: Option<&Path>) -> Result<env_logger::Builder> {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - mod path |{}| - target | {} | args: |{}|",
                record.level(),
                record.module_path().unwrap_or(""),
                record.target(),
                record.args()
            )
        })
        .filter_level(level)
        .filter_module("rfgen_engine::sim", level.min(LevelFilter::Info));

    if let Some(path) = log_file {
        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    Ok(builder)
}

pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    builder(level_for(verbosity), log_file)?
        .try_init()
        .context("logger already initialised")
}
