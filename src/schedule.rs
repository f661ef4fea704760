use crate::model::{ScheduleError, ScheduledTask, TaskStatus};
use crate::source::TaskSource;
use chrono::NaiveDateTime;
use log::{debug, warn};
use std::collections::BTreeMap;
use unicode_width::UnicodeWidthStr;

/// Tasks keyed by the hour of their start. Always holds all 24 hours.
pub type HourBuckets = BTreeMap<u32, Vec<ScheduledTask>>;

pub const HOURS_PER_DAY: u32 = 24;

const GLYPH_COLUMN: u16 = 5;
const TIME_WIDTH: u16 = 12;
const MIN_PROJECT_WIDTH: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Description,
    Project,
}

/// x positions of the schedule table, each derived from the one before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnOffsets {
    pub hour: u16,
    pub glyph: u16,
    pub id: u16,
    pub time: u16,
    pub project: u16,
}

impl ColumnOffsets {
    pub fn as_array(&self) -> [u16; 5] {
        [self.hour, self.glyph, self.id, self.time, self.project]
    }
}

pub struct Schedule {
    source: Box<dyn TaskSource>,
    tasks: Vec<ScheduledTask>,
}

impl Schedule {
    pub fn new(source: Box<dyn TaskSource>) -> Self {
        Schedule {
            source,
            tasks: Vec::new(),
        }
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    /// Replaces the task list with pending (and optionally completed) tasks
    /// matching `scheduled`. On error the previous list is kept.
    pub fn load_tasks(
        &mut self,
        scheduled: &str,
        completed: bool,
        now: NaiveDateTime,
    ) -> Result<(), ScheduleError> {
        let mut raw = self.source.query(scheduled, TaskStatus::Pending)?;
        if completed {
            raw.extend(self.source.query(scheduled, TaskStatus::Completed)?);
        }

        let mut tasks = Vec::with_capacity(raw.len());
        for record in &raw {
            match ScheduledTask::from_raw(record, now) {
                Ok(task) => tasks.push(task),
                Err(err) => warn!("skipping task: {err}"),
            }
        }
        debug!("loaded {} scheduled tasks for {scheduled}", tasks.len());
        self.tasks = tasks;
        Ok(())
    }

    pub fn bucket_by_hour(&self) -> HourBuckets {
        bucket_by_hour(&self.tasks)
    }

    pub fn max_field_width(&self, field: Field) -> usize {
        max_field_width(&self.tasks, field)
    }

    pub fn column_offsets(&self) -> ColumnOffsets {
        column_offsets(&self.tasks)
    }
}

pub fn max_field_width(tasks: &[ScheduledTask], field: Field) -> usize {
    tasks
        .iter()
        .map(|task| field_text(task, field).width())
        .max()
        .unwrap_or(0)
}

/// Column x positions for a task list. The project column is never
/// narrower than `MIN_PROJECT_WIDTH`.
pub fn column_offsets(tasks: &[ScheduledTask]) -> ColumnOffsets {
    let hour = 0;
    let glyph = GLYPH_COLUMN;
    let id = glyph.saturating_add(clamp_width(max_field_width(tasks, Field::Id)) + 1);
    let time = id.saturating_add(TIME_WIDTH);
    let project_width =
        (clamp_width(max_field_width(tasks, Field::Project)) + 1).max(MIN_PROJECT_WIDTH);
    let project = time.saturating_add(project_width);
    ColumnOffsets {
        hour,
        glyph,
        id,
        time,
        project,
    }
}

pub fn bucket_by_hour(tasks: &[ScheduledTask]) -> HourBuckets {
    let mut buckets: HourBuckets = (0..HOURS_PER_DAY).map(|h| (h, Vec::new())).collect();
    for task in tasks {
        if let Some(bucket) = buckets.get_mut(&task.hour()) {
            bucket.push(task.clone());
        }
    }
    for bucket in buckets.values_mut() {
        bucket.sort_by_key(|task| task.start);
    }
    buckets
}

fn field_text(task: &ScheduledTask, field: Field) -> String {
    match field {
        Field::Id => task.id.to_string(),
        Field::Description => task.description.clone(),
        Field::Project => task.project.clone().unwrap_or_default(),
    }
}

fn clamp_width(width: usize) -> u16 {
    u16::try_from(width).unwrap_or(u16::MAX - 1)
}

/// Pads jagged rows to the same column count and left-justifies each
/// cell to the widest entry of its column.
pub fn align_columns(rows: &[Vec<String>]) -> Vec<Vec<String>> {
    let ncols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; ncols];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    rows.iter()
        .map(|row| {
            (0..ncols)
                .map(|i| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    let pad = widths[i].saturating_sub(cell.width());
                    format!("{cell}{}", " ".repeat(pad))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawTask;
    use crate::source::MemorySource;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::rc::Rc;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn schedule_with(tasks: Vec<ScheduledTask>) -> Schedule {
        let mut schedule = Schedule::new(Box::new(MemorySource::default()));
        schedule.tasks = tasks;
        schedule
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    struct CountingSource {
        calls: Rc<Cell<usize>>,
    }

    impl TaskSource for CountingSource {
        fn query(&self, _: &str, status: TaskStatus) -> Result<Vec<RawTask>, ScheduleError> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![RawTask {
                id: 1,
                uuid: status.as_str().into(),
                description: "x".into(),
                project: None,
                status,
                scheduled: None,
                start: None,
                estimate: None,
            }])
        }
    }

    struct FailingSource;

    impl TaskSource for FailingSource {
        fn query(&self, _: &str, _: TaskStatus) -> Result<Vec<RawTask>, ScheduleError> {
            Err(ScheduleError::DataSource("database locked".into()))
        }
    }

    #[test]
    fn buckets_cover_every_hour_when_empty() {
        let buckets = bucket_by_hour(&[]);
        assert_eq!(buckets.len(), 24);
        assert!(buckets.keys().copied().eq(0..24));
        assert!(buckets.values().all(Vec::is_empty));
    }

    #[test]
    fn buckets_sort_by_start_and_keep_ties_stable() {
        let tasks = vec![
            ScheduledTask::new(3, "late", at(9, 45)),
            ScheduledTask::new(1, "tie-a", at(9, 15)),
            ScheduledTask::new(2, "tie-b", at(9, 15)),
            ScheduledTask::new(4, "evening", at(18, 0)),
        ];
        let buckets = bucket_by_hour(&tasks);
        let nine: Vec<_> = buckets[&9].iter().map(|t| t.description.as_str()).collect();
        assert_eq!(nine, ["tie-a", "tie-b", "late"]);
        assert_eq!(buckets[&18].len(), 1);
        for task in &tasks {
            assert!(buckets[&task.hour()].contains(task));
        }
    }

    #[test]
    fn max_field_width_uses_rendered_text() {
        let schedule = schedule_with(vec![
            ScheduledTask::new(7, "a", at(9, 0)),
            ScheduledTask::new(1234, "abc", at(10, 0)).with_project("home.garden"),
        ]);
        assert_eq!(schedule.max_field_width(Field::Id), 4);
        assert_eq!(schedule.max_field_width(Field::Description), 3);
        assert_eq!(schedule.max_field_width(Field::Project), 11);
        assert_eq!(schedule_with(Vec::new()).max_field_width(Field::Id), 0);
    }

    #[test]
    fn column_offsets_follow_content_with_project_floor() {
        let schedule = schedule_with(vec![ScheduledTask::new(12, "standup", at(9, 0))
            .with_project("alpha")]);
        let offsets = schedule.column_offsets();
        assert_eq!(offsets.as_array(), [0, 5, 8, 20, 28]);

        let wide = schedule_with(vec![
            ScheduledTask::new(123, "x", at(9, 0)).with_project("a-very-long-project")
        ]);
        let offsets = wide.column_offsets();
        assert_eq!(offsets.as_array(), [0, 5, 9, 21, 41]);
    }

    #[test]
    fn column_offsets_strictly_increase_without_tasks() {
        let offsets = schedule_with(Vec::new()).column_offsets().as_array();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert!(offsets[4] - offsets[3] >= 8);
    }

    #[test]
    fn load_tasks_queries_completed_only_when_asked() {
        let calls = Rc::new(Cell::new(0));
        let mut schedule = Schedule::new(Box::new(CountingSource {
            calls: Rc::clone(&calls),
        }));
        schedule.load_tasks("today", false, at(8, 0)).unwrap();
        assert_eq!(calls.get(), 1);
        schedule.load_tasks("today", true, at(8, 0)).unwrap();
        assert_eq!(calls.get(), 3);
        // records without a scheduled date are dropped
        assert!(schedule.tasks().is_empty());
    }

    #[test]
    fn load_tasks_failure_keeps_previous_tasks() {
        let mut schedule = Schedule::new(Box::new(FailingSource));
        schedule.tasks = vec![ScheduledTask::new(1, "kept", at(9, 0))];
        let err = schedule.load_tasks("today", true, at(9, 0)).unwrap_err();
        assert!(matches!(err, ScheduleError::DataSource(_)));
        assert_eq!(schedule.tasks().len(), 1);
    }

    #[test]
    fn align_columns_pads_jagged_rows() {
        let rows = vec![strings(&["9", "12", "09:00"]), strings(&["10"])];
        let aligned = align_columns(&rows);
        assert_eq!(aligned[0], strings(&["9 ", "12", "09:00"]));
        assert_eq!(aligned[1], strings(&["10", "  ", "     "]));
    }

    #[test]
    fn align_columns_is_idempotent() {
        let rows = vec![
            strings(&["a", "bbbb"]),
            strings(&["ccc"]),
            strings(&["", "d", "ee"]),
        ];
        let once = align_columns(&rows);
        let twice = align_columns(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), rows.len());
        let lengths: Vec<usize> = once.iter().map(|r| r.concat().len()).collect();
        assert!(lengths.windows(2).all(|w| w[0] == w[1]));
        for (input, output) in rows.iter().zip(&once) {
            for (cell, aligned) in input.iter().zip(output) {
                assert!(aligned.len() >= cell.len());
            }
        }
    }

    #[test]
    fn align_columns_handles_empty_input() {
        assert!(align_columns(&[]).is_empty());
        assert_eq!(align_columns(&[Vec::new()]), vec![Vec::<String>::new()]);
    }
}
