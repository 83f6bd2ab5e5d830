mod cli;
mod terminal;

use clap::Parser;
use cli::{Cli, Command};
use dockyard::config::Config;
use dockyard::error::Result;
use tracing_subscriber::EnvFilter;

fn main() {
    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(&config.log_filter);

    let code = match cli.command {
        Command::Shell => {
            terminal::shell(&config, cli.workspace)?;
            0
        }
        Command::Run { json, command } => terminal::run(&command, json, &config, cli.workspace)?,
        Command::Validate { file, json } => terminal::validate(&file, json, cli.workspace)?,
        Command::Events { json } => {
            terminal::events(json)?;
            0
        }
        Command::Reset { force } => {
            terminal::reset(force)?;
            0
        }
        Command::Parse { command } => {
            terminal::parse(&command)?;
            0
        }
    };

    Ok(code)
}
