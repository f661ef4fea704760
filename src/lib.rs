//! Hour-bucketed live schedule of Taskwarrior tasks.

pub mod cli;
pub mod commands;
pub mod config;
pub mod model;
pub mod schedule;
pub mod source;
pub mod ui;
