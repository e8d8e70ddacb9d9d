mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::{FileConfig, Settings};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "gatesync", &mut io::stdout());
        return Ok(());
    }

    let settings = Settings::resolve(FileConfig::load()?, &cli.gateway)?;
    log::debug!("Admin API: {}", settings.admin_url);
    if ctx.verbose > 0 && !ctx.quiet {
        ui::dim(&format!("admin API {}", settings.admin_url));
    }

    match cli.command {
        Command::Diff(args) => commands::diff::run(&ctx, &settings, &args),
        Command::Sync(args) => {
            let settings = settings.with_run_overrides(args.jobs, args.timeout);
            commands::sync::run(&ctx, &settings, &args)
        }
        Command::Dump { output } => commands::dump::run(&ctx, &settings, &output),
        Command::Validate(args) => commands::validate::run(&ctx, &settings, &args),
        Command::Completions { .. } => Ok(()),
    }
}
