use anyhow::Result;
use clap::Parser;
use taskschedule::cli::{Cli, Command};
use taskschedule::commands;
use taskschedule::config::{load_config, Settings};

fn main() -> Result<()> {
    let args = Cli::parse();
    let file = load_config(args.config.as_deref())?;
    let settings = Settings::resolve(file, &args);
    commands::init_logging(&settings);
    log::info!("taskschedule starting: {:?}", settings);

    let command = args.command.unwrap_or(Command::Live);
    let result = match command {
        Command::Live => commands::live(settings),
        Command::Print => commands::print(settings),
    };
    if let Err(err) = &result {
        log::error!("{err:#}");
    }
    result
}
