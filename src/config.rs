//! Settings resolution: built-in defaults, then the optional TOML file,
//! then command-line flags.

use crate::cli::Cli;
use directories::{BaseDirs, ProjectDirs};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REFRESH_RATE: u64 = 1;
pub const DEFAULT_SCHEDULED: &str = "today";
pub const DEFAULT_TASK_COMMAND: &str = "task";
const LOG_FILE_NAME: &str = "taskschedule.log";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub taskwarrior: TaskwarriorSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ScheduleSection {
    pub refresh_rate: Option<u64>,
    pub scheduled: Option<String>,
    pub completed: Option<bool>,
    pub hide_empty: Option<bool>,
    pub hide_projects: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TaskwarriorSection {
    pub command: Option<String>,
    pub data_location: Option<String>,
    pub taskrc: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LogSection {
    pub file: Option<String>,
}

/// Where tasks come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSettings {
    TaskWarrior {
        command: PathBuf,
        data_location: Option<PathBuf>,
        taskrc: Option<PathBuf>,
    },
    ExportFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub refresh_rate: u64,
    pub scheduled: String,
    pub completed: bool,
    pub hide_empty: bool,
    pub hide_projects: bool,
    pub source: SourceSettings,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            refresh_rate: DEFAULT_REFRESH_RATE,
            scheduled: DEFAULT_SCHEDULED.to_string(),
            completed: true,
            hide_empty: true,
            hide_projects: false,
            source: SourceSettings::TaskWarrior {
                command: PathBuf::from(DEFAULT_TASK_COMMAND),
                data_location: None,
                taskrc: None,
            },
            log_file: default_log_path(),
            verbose: false,
        }
    }
}

impl Settings {
    pub fn resolve(file: FileConfig, cli: &Cli) -> Self {
        let defaults = Settings::default();
        let schedule = file.schedule;
        let tw = file.taskwarrior;

        let refresh_rate = cli
            .refresh
            .or(schedule.refresh_rate)
            .unwrap_or(defaults.refresh_rate)
            .max(1);
        let scheduled = cli
            .scheduled
            .clone()
            .or(schedule.scheduled)
            .unwrap_or(defaults.scheduled);
        let completed = !cli.no_completed && schedule.completed.unwrap_or(defaults.completed);
        let hide_empty = !cli.show_empty && schedule.hide_empty.unwrap_or(defaults.hide_empty);
        let hide_projects =
            cli.hide_projects || schedule.hide_projects.unwrap_or(defaults.hide_projects);

        let source = match &cli.import {
            Some(path) => SourceSettings::ExportFile(path.clone()),
            None => SourceSettings::TaskWarrior {
                command: tw
                    .command
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TASK_COMMAND)),
                data_location: cli
                    .data_location
                    .clone()
                    .or_else(|| tw.data_location.as_deref().map(expand_home)),
                taskrc: cli
                    .taskrc
                    .clone()
                    .or_else(|| tw.taskrc.as_deref().map(expand_home)),
            },
        };

        let log_file = cli
            .log_file
            .clone()
            .or_else(|| file.log.file.as_deref().map(expand_home))
            .or(defaults.log_file);

        Settings {
            refresh_rate,
            scheduled,
            completed,
            hide_empty,
            hide_projects,
            source,
            log_file,
            verbose: cli.verbose,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "taskschedule")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn default_log_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join(LOG_FILE_NAME))
}

/// Loads the config file. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => return Ok(FileConfig::default()),
    };
    if !path.exists() {
        debug!("no config file at {}", path.display());
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

pub fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["taskschedule"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let settings = Settings::resolve(FileConfig::default(), &cli(&[]));
        assert_eq!(settings.refresh_rate, 1);
        assert_eq!(settings.scheduled, "today");
        assert!(settings.completed);
        assert!(settings.hide_empty);
        assert!(!settings.hide_projects);
        assert!(matches!(settings.source, SourceSettings::TaskWarrior { .. }));
    }

    #[test]
    fn flags_override_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            [schedule]
            refresh_rate = 5
            scheduled = "tomorrow"
            hide_empty = true
            [taskwarrior]
            data_location = "/srv/tasks"
            "#,
        )
        .unwrap();
        let settings = Settings::resolve(
            file,
            &cli(&["--refresh", "3", "--show-empty", "--no-completed"]),
        );
        assert_eq!(settings.refresh_rate, 3);
        assert_eq!(settings.scheduled, "tomorrow");
        assert!(!settings.hide_empty);
        assert!(!settings.completed);
        assert_eq!(
            settings.source,
            SourceSettings::TaskWarrior {
                command: PathBuf::from("task"),
                data_location: Some(PathBuf::from("/srv/tasks")),
                taskrc: None,
            }
        );
    }

    #[test]
    fn zero_refresh_rate_is_clamped() {
        let settings = Settings::resolve(FileConfig::default(), &cli(&["--refresh", "0"]));
        assert_eq!(settings.refresh_rate, 1);
    }

    #[test]
    fn import_flag_selects_export_file() {
        let settings = Settings::resolve(FileConfig::default(), &cli(&["--import", "tasks.json"]));
        assert_eq!(
            settings.source,
            SourceSettings::ExportFile(PathBuf::from("tasks.json"))
        );
    }

    #[test]
    fn missing_file_is_default_and_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_config(Some(missing.as_path())).is_ok());

        let bad = dir.path().join("bad.toml");
        let mut f = fs::File::create(&bad).unwrap();
        writeln!(f, "[schedule\nrefresh_rate = ").unwrap();
        assert!(matches!(
            load_config(Some(bad.as_path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn home_prefix_expands() {
        let expanded = expand_home("~/.task");
        assert!(expanded.ends_with(".task"));
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
