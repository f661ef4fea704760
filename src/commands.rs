use crate::config::{Settings, SourceSettings};
use crate::model::ScheduleError;
use crate::schedule::{align_columns, HourBuckets, Schedule};
use crate::source::{MemorySource, TaskSource, TaskWarrior};
use crate::ui::{self, plain_rows, FrameOptions};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::{info, LevelFilter};
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::{self, File};

pub fn live(settings: Settings) -> Result<()> {
    let schedule = open_schedule(&settings, Local::now().naive_local())?;
    ui::run(schedule, settings)
}

pub fn print(settings: Settings) -> Result<()> {
    let schedule = open_schedule(&settings, Local::now().naive_local())?;
    let opts = FrameOptions::from(&settings);
    for line in render_table(&schedule.bucket_by_hour(), opts) {
        println!("{}", line);
    }
    Ok(())
}

/// Opens the task source and performs the first load. Any failure here is
/// fatal and happens before the terminal is touched.
pub fn open_schedule(settings: &Settings, now: NaiveDateTime) -> Result<Schedule> {
    let source = open_source(&settings.source).context("opening task data source")?;
    let mut schedule = Schedule::new(source);
    schedule
        .load_tasks(&settings.scheduled, settings.completed, now)
        .with_context(|| format!("loading tasks scheduled {}", settings.scheduled))?;
    info!(
        "loaded {} tasks scheduled {}",
        schedule.tasks().len(),
        settings.scheduled
    );
    Ok(schedule)
}

fn open_source(settings: &SourceSettings) -> Result<Box<dyn TaskSource>, ScheduleError> {
    Ok(match settings {
        SourceSettings::TaskWarrior {
            command,
            data_location,
            taskrc,
        } => Box::new(TaskWarrior::open(
            command.clone(),
            data_location.clone(),
            taskrc.clone(),
        )?),
        SourceSettings::ExportFile(path) => Box::new(MemorySource::from_export_file(path)?),
    })
}

/// Plain-text table: aligned cells joined by single spaces.
pub fn render_table(buckets: &HourBuckets, opts: FrameOptions) -> Vec<String> {
    align_columns(&plain_rows(buckets, opts))
        .into_iter()
        .map(|row| row.join(" ").trim_end().to_string())
        .collect()
}

/// Sends log output to the configured file. The terminal belongs to the
/// schedule, so nothing is logged to stdout or stderr.
pub fn init_logging(settings: &Settings) {
    let Some(path) = settings.log_file.as_ref() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let level = if settings.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    if let Ok(log_file) = File::create(path) {
        let _ = WriteLogger::init(level, log_config, log_file);
    }
}
