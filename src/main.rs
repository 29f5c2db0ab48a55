mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
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

    match run(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Create(args) => commands::create::run(ctx, &args),
        Command::Read(args) => commands::read::run(ctx, &args),
        Command::Update(args) => commands::update::run(ctx, &args),
        Command::Delete(args) => commands::delete::run(ctx, &args),
        Command::Show(args) => commands::show::run(ctx, &args),
        Command::Plan(args) => commands::plan::run(ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

fn report(err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));
    if let Some(lib) = err.downcast_ref::<catalogkit::Error>() {
        let category = lib.category();
        ui::hint(&format!("{}: {}", category.description(), category.advice()));
    }
}
