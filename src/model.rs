use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

pub type TaskId = u32;

const TASKWARRIOR_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("task data source unavailable: {0}")]
    DataSource(String),
    #[error("could not decode task export: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid task record {uuid}: {reason}")]
    InvalidRecord { uuid: String, reason: String },
    #[error("terminal surface unavailable: {0}")]
    Surface(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    #[serde(other)]
    Other,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Other => "other",
        }
    }
}

/// A task as exported by Taskwarrior. Only the fields the schedule reads
/// are kept; everything else in the export is ignored.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawTask {
    #[serde(default)]
    pub id: TaskId,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub scheduled: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub estimate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Completed,
    Active,
    Overdue,
    Pending,
}

impl Glyph {
    pub fn symbol(&self) -> char {
        match self {
            Glyph::Completed => '✔',
            Glyph::Active => '▶',
            Glyph::Overdue => '!',
            Glyph::Pending => '○',
        }
    }
}

/// Normalized view of a task with a scheduled start, in local wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub description: String,
    pub project: Option<String>,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub duration: Duration,
    pub completed: bool,
    pub active: bool,
    pub glyph: Glyph,
}

impl ScheduledTask {
    pub fn new(id: TaskId, description: impl Into<String>, start: NaiveDateTime) -> Self {
        ScheduledTask {
            id,
            description: description.into(),
            project: None,
            start,
            end: None,
            duration: Duration::zero(),
            completed: false,
            active: false,
            glyph: Glyph::Pending,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the end time. An end before the start collapses onto the start.
    pub fn with_end(mut self, end: NaiveDateTime) -> Self {
        let end = end.max(self.start);
        self.end = Some(end);
        self.duration = end - self.start;
        self
    }

    pub fn with_estimate(self, estimate: Duration) -> Self {
        let end = self.start + estimate;
        self.with_end(end)
    }

    pub fn mark_completed(mut self) -> Self {
        self.completed = true;
        self.active = false;
        self.glyph = Glyph::Completed;
        self
    }

    pub fn mark_active(mut self) -> Self {
        if !self.completed {
            self.active = true;
            self.glyph = Glyph::Active;
        }
        self
    }

    pub fn from_raw(raw: &RawTask, now: NaiveDateTime) -> Result<Self, ScheduleError> {
        let invalid = |reason: String| ScheduleError::InvalidRecord {
            uuid: raw.uuid.clone(),
            reason,
        };
        let scheduled = raw
            .scheduled
            .as_deref()
            .ok_or_else(|| invalid("missing scheduled date".into()))?;
        let start = parse_timestamp(scheduled)
            .ok_or_else(|| invalid(format!("bad scheduled date {scheduled}")))?;

        let mut task = ScheduledTask::new(raw.id, raw.description.clone(), start);
        task.project = raw.project.clone().filter(|p| !p.is_empty());
        if let Some(estimate) = raw.estimate.as_deref() {
            match parse_duration(estimate) {
                Some(duration) => task = task.with_estimate(duration),
                None => warn!("task {}: ignoring bad estimate {estimate}", raw.uuid),
            }
        }
        if raw.status == TaskStatus::Completed {
            task = task.mark_completed();
        } else if raw.start.is_some() {
            task = task.mark_active();
        }
        task.glyph = task.resolve_glyph(now);
        Ok(task)
    }

    /// `end` if known, otherwise the start plus the estimated duration.
    pub fn estimated_end(&self) -> NaiveDateTime {
        self.end.unwrap_or(self.start + self.duration)
    }

    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        !self.completed && self.estimated_end() < now
    }

    /// Whether this task owns the current time slot: from its start until the
    /// next task in the same hour starts, or open-ended when it is the last.
    pub fn should_be_active(&self, next: Option<&ScheduledTask>, now: NaiveDateTime) -> bool {
        match next {
            Some(next) => self.start <= now && now < next.start,
            None => now >= self.start,
        }
    }

    pub fn resolve_glyph(&self, now: NaiveDateTime) -> Glyph {
        if self.completed {
            Glyph::Completed
        } else if self.active {
            Glyph::Active
        } else if self.is_overdue(now) {
            Glyph::Overdue
        } else {
            Glyph::Pending
        }
    }

    pub fn hour(&self) -> u32 {
        self.start.hour()
    }

    pub fn start_time(&self) -> String {
        self.start.format("%H:%M").to_string()
    }

    pub fn formatted_time(&self) -> String {
        match self.end {
            Some(end) => format!("{}-{}", self.start_time(), end.format("%H:%M")),
            None => self.start_time(),
        }
    }

    pub fn id_label(&self) -> String {
        if self.id == 0 {
            String::new()
        } else {
            self.id.to_string()
        }
    }
}

pub fn current_hour(now: NaiveDateTime) -> u32 {
    now.hour()
}

/// Parses a Taskwarrior export timestamp (UTC) into local wall-clock time.
/// RFC 3339 is accepted as well.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    let utc = match NaiveDateTime::parse_from_str(trimmed, TASKWARRIOR_DATE_FORMAT) {
        Ok(naive) => Utc.from_utc_datetime(&naive),
        Err(_) => DateTime::parse_from_rfc3339(trimmed).ok()?.with_timezone(&Utc),
    };
    Some(utc.with_timezone(&Local).naive_local())
}

/// Parses an ISO 8601 duration such as `PT1H30M` or `P1DT2H`.
/// Years and months use Taskwarrior's approximations of 365 and 30 days.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let body = raw.trim().strip_prefix('P')?;
    if body.is_empty() {
        return None;
    }
    let mut total = Duration::zero();
    let mut in_time = false;
    let mut number = String::new();
    let mut saw_component = false;
    for ch in body.chars() {
        match ch {
            'T' if !in_time && number.is_empty() => in_time = true,
            '0'..='9' => number.push(ch),
            unit => {
                let value: i64 = number.parse().ok()?;
                number.clear();
                let part = match (in_time, unit) {
                    (false, 'Y') => Duration::days(value * 365),
                    (false, 'M') => Duration::days(value * 30),
                    (false, 'W') => Duration::weeks(value),
                    (false, 'D') => Duration::days(value),
                    (true, 'H') => Duration::hours(value),
                    (true, 'M') => Duration::minutes(value),
                    (true, 'S') => Duration::seconds(value),
                    _ => return None,
                };
                total = total + part;
                saw_component = true;
            }
        }
    }
    if !number.is_empty() || !saw_component {
        return None;
    }
    Some(total)
}
