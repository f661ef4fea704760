use crate::model::{parse_timestamp, RawTask, ScheduleError, TaskStatus};
use chrono::{Duration, Local, NaiveDate};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Read-only provider of tasks matching a scheduled-date predicate.
pub trait TaskSource {
    fn query(&self, scheduled: &str, status: TaskStatus) -> Result<Vec<RawTask>, ScheduleError>;
}

/// Runs the `task` binary and reads its JSON export.
#[derive(Debug, Clone)]
pub struct TaskWarrior {
    command: PathBuf,
    data_location: Option<PathBuf>,
    taskrc: Option<PathBuf>,
}

impl TaskWarrior {
    pub fn open(
        command: impl Into<PathBuf>,
        data_location: Option<PathBuf>,
        taskrc: Option<PathBuf>,
    ) -> Result<Self, ScheduleError> {
        let tw = TaskWarrior {
            command: command.into(),
            data_location,
            taskrc,
        };
        if let Some(dir) = &tw.data_location {
            if !dir.is_dir() {
                return Err(ScheduleError::DataSource(format!(
                    "data location {} is not a directory",
                    dir.display()
                )));
            }
        }
        if let Some(rc) = &tw.taskrc {
            if !rc.is_file() {
                return Err(ScheduleError::DataSource(format!(
                    "taskrc {} does not exist",
                    rc.display()
                )));
            }
        }
        let output = tw
            .base_command()
            .arg("--version")
            .output()
            .map_err(|e| {
                ScheduleError::DataSource(format!("failed to run {}: {e}", tw.command.display()))
            })?;
        if !output.status.success() {
            return Err(ScheduleError::DataSource(format!(
                "{} --version exited with {}",
                tw.command.display(),
                output.status
            )));
        }
        debug!(
            "taskwarrior {} ready",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(tw)
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        if let Some(rc) = &self.taskrc {
            cmd.env("TASKRC", rc);
        }
        cmd
    }

    fn export_args(&self, scheduled: &str, status: TaskStatus) -> Vec<String> {
        let mut args = vec![
            "rc.confirmation=off".to_string(),
            "rc.hooks=off".to_string(),
            "rc.json.array=on".to_string(),
            "rc.verbose=nothing".to_string(),
        ];
        if let Some(dir) = &self.data_location {
            args.push(format!("rc.data.location={}", dir.display()));
        }
        args.push(format!("scheduled:{scheduled}"));
        args.push(format!("status:{}", status.as_str()));
        args.push("export".to_string());
        args
    }
}

impl TaskSource for TaskWarrior {
    fn query(&self, scheduled: &str, status: TaskStatus) -> Result<Vec<RawTask>, ScheduleError> {
        let output = self
            .base_command()
            .args(self.export_args(scheduled, status))
            .output()
            .map_err(|e| ScheduleError::DataSource(format!("failed to run task export: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScheduleError::DataSource(format!(
                "task export failed: {}",
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        decode_export(&stdout)
    }
}

/// Tasks held in memory, filtered with a small subset of Taskwarrior's
/// date predicates. Backs `--import` of a saved `task export`.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tasks: Vec<RawTask>,
    today: Option<NaiveDate>,
}

impl MemorySource {
    pub fn new(tasks: Vec<RawTask>) -> Self {
        MemorySource { tasks, today: None }
    }

    pub fn from_export_file(path: &Path) -> Result<Self, ScheduleError> {
        let data = fs::read_to_string(path).map_err(|e| {
            ScheduleError::DataSource(format!("reading {}: {e}", path.display()))
        })?;
        Ok(MemorySource::new(decode_export(&data)?))
    }

    /// Pins the reference day used by relative predicates such as `today`.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn reference_day(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

impl TaskSource for MemorySource {
    fn query(&self, scheduled: &str, status: TaskStatus) -> Result<Vec<RawTask>, ScheduleError> {
        let day = resolve_day(scheduled, self.reference_day()).ok_or_else(|| {
            ScheduleError::DataSource(format!("unsupported scheduled predicate: {scheduled}"))
        })?;
        Ok(self
            .tasks
            .iter()
            .filter(|task| task.status == status)
            .filter(|task| {
                task.scheduled
                    .as_deref()
                    .and_then(parse_timestamp)
                    .map(|start| start.date() == day)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

pub fn resolve_day(predicate: &str, today: NaiveDate) -> Option<NaiveDate> {
    match predicate.trim() {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        "tomorrow" => Some(today + Duration::days(1)),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d").ok(),
    }
}

/// Decodes `task export` output. Older versions emit one object per line
/// instead of a JSON array.
pub fn decode_export(data: &str) -> Result<Vec<RawTask>, ScheduleError> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .map(|line| line.trim().trim_end_matches(','))
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(ScheduleError::from))
        .collect()
}
