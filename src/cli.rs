use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "taskschedule",
    version,
    about = "Hour-by-hour schedule of Taskwarrior tasks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Scheduled-date filter, e.g. today, tomorrow or 2026-10-18
    #[arg(long, short = 's', global = true)]
    pub scheduled: Option<String>,

    /// Seconds between refreshes
    #[arg(long, short = 'r', global = true)]
    pub refresh: Option<u64>,

    /// Leave completed tasks out
    #[arg(long, global = true)]
    pub no_completed: bool,

    /// Show hours without tasks before the first task
    #[arg(long, global = true)]
    pub show_empty: bool,

    /// Hide the project column
    #[arg(long, global = true)]
    pub hide_projects: bool,

    /// Taskwarrior data directory
    #[arg(long, global = true)]
    pub data_location: Option<PathBuf>,

    /// Taskwarrior rc file
    #[arg(long, global = true)]
    pub taskrc: Option<PathBuf>,

    /// Read tasks from a saved `task export` file instead of Taskwarrior
    #[arg(long, global = true)]
    pub import: Option<PathBuf>,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Live schedule, refreshed until q/Esc/Ctrl-C
    Live,
    /// Print the schedule once as a plain table
    Print,
}
