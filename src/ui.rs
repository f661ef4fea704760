use crate::config::Settings;
use crate::model::{current_hour, ScheduleError, ScheduledTask};
use crate::schedule::{ColumnOffsets, HourBuckets, Schedule, HOURS_PER_DAY};
use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::{debug, error, info, trace, warn};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::buffer::Buffer;
use ratatui::prelude::{Color, Modifier, Rect, Style};
use ratatui::Terminal;
use std::io::{self, stdout};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const GLYPH_X: u16 = 3;
const FILL_X: u16 = 5;
const INPUT_SLICE: Duration = Duration::from_millis(100);

pub fn run(schedule: Schedule, settings: Settings) -> Result<()> {
    let exit = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&exit);
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("no interrupt handler installed: {err}");
    }

    let _guard = SurfaceGuard::acquire()?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout()))
        .map_err(|e| ScheduleError::Surface(e.to_string()))?;
    let mut screen = Screen::new(terminal, schedule, settings);
    let result = screen.event_loop(&exit);
    if let Err(err) = &result {
        error!("render loop stopped: {err:#}");
    }
    result
}

/// Semantic colour roles of the schedule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleRole {
    Header,
    Hour,
    CurrentHour,
    Background,
    BackgroundAlt,
    Completed,
    CompletedAlt,
    ActiveTask,
    CurrentTask,
    OverdueTask,
    Glyph,
}

impl StyleRole {
    pub const ALL: [StyleRole; 11] = [
        StyleRole::Header,
        StyleRole::Hour,
        StyleRole::CurrentHour,
        StyleRole::Background,
        StyleRole::BackgroundAlt,
        StyleRole::Completed,
        StyleRole::CompletedAlt,
        StyleRole::ActiveTask,
        StyleRole::CurrentTask,
        StyleRole::OverdueTask,
        StyleRole::Glyph,
    ];

    pub fn style(self) -> Style {
        let stripe = Color::Indexed(234);
        match self {
            StyleRole::Header => Style::default()
                .fg(Color::White)
                .bg(Color::Black)
                .add_modifier(Modifier::UNDERLINED),
            StyleRole::Hour => Style::default().fg(Color::Indexed(8)).bg(Color::Black),
            StyleRole::CurrentHour => Style::default()
                .fg(Color::Green)
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
            StyleRole::Background => Style::default().fg(Color::Gray).bg(Color::Black),
            StyleRole::BackgroundAlt => Style::default().fg(Color::Gray).bg(stripe),
            StyleRole::Completed => Style::default().fg(Color::Indexed(242)).bg(Color::Black),
            StyleRole::CompletedAlt => Style::default().fg(Color::Indexed(242)).bg(stripe),
            StyleRole::ActiveTask => Style::default().fg(Color::Black).bg(Color::Green),
            StyleRole::CurrentTask => Style::default().fg(Color::LightGreen).bg(Color::Black),
            StyleRole::OverdueTask => Style::default().fg(Color::Yellow).bg(Color::Black),
            StyleRole::Glyph => Style::default().fg(Color::Indexed(244)).bg(Color::Black),
        }
    }

    fn stripe(alternate: bool) -> StyleRole {
        if alternate {
            StyleRole::Background
        } else {
            StyleRole::BackgroundAlt
        }
    }
}

/// Picks a task row's style. Being worked on beats owning the current
/// slot, which beats being overdue; otherwise the row follows the stripes.
pub fn resolve_style(
    task: &ScheduledTask,
    next: Option<&ScheduledTask>,
    alternate: bool,
    now: NaiveDateTime,
) -> StyleRole {
    if task.active {
        StyleRole::ActiveTask
    } else if task.should_be_active(next, now) {
        StyleRole::CurrentTask
    } else if task.is_overdue(now) && !task.completed {
        StyleRole::OverdueTask
    } else if task.completed {
        if alternate {
            StyleRole::Completed
        } else {
            StyleRole::CompletedAlt
        }
    } else {
        StyleRole::stripe(alternate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOptions {
    pub hide_empty: bool,
    pub hide_projects: bool,
}

impl From<&Settings> for FrameOptions {
    fn from(settings: &Settings) -> Self {
        FrameOptions {
            hide_empty: settings.hide_empty,
            hide_projects: settings.hide_projects,
        }
    }
}

/// Per-draw bookkeeping, rebuilt for every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    pub current_line: usize,
    pub alternate: bool,
    pub past_first_task: bool,
}

impl FrameState {
    fn new() -> Self {
        FrameState {
            current_line: 1,
            alternate: true,
            past_first_task: false,
        }
    }

    fn advance(&mut self) {
        self.current_line += 1;
        self.alternate = !self.alternate;
    }
}

/// Writes clipped to `area`; anything past the right edge or bottom is dropped.
fn put(buf: &mut Buffer, area: Rect, line: usize, x: u16, text: &str, role: StyleRole) {
    let Ok(y) = u16::try_from(line) else {
        return;
    };
    if y >= area.height || x >= area.width || text.is_empty() {
        return;
    }
    let width = usize::from(area.width - x);
    buf.set_stringn(area.x + x, area.y + y, text, width, role.style());
}

fn paint_header(buf: &mut Buffer, area: Rect, offsets: &ColumnOffsets, opts: FrameOptions) {
    let header = StyleRole::Header;
    put(buf, area, 0, offsets.glyph, "ID", header);
    put(buf, area, 0, offsets.id, "Time", header);
    if opts.hide_projects {
        put(buf, area, 0, offsets.time, "Description", header);
    } else {
        put(buf, area, 0, offsets.time, "Project", header);
        put(buf, area, 0, offsets.project, "Description", header);
    }
}

fn paint_hour(buf: &mut Buffer, area: Rect, line: usize, hour: u32, now: NaiveDateTime) {
    let role = if hour == current_hour(now) {
        StyleRole::CurrentHour
    } else {
        StyleRole::Hour
    };
    put(buf, area, line, 0, &hour.to_string(), role);
}

fn paint_fill(buf: &mut Buffer, area: Rect, line: usize, role: StyleRole) {
    let width = usize::from(area.width.saturating_sub(FILL_X));
    put(buf, area, line, FILL_X, &" ".repeat(width), role);
}

/// Paints the header and one row per task (plus filler rows for empty
/// hours) into `buf`. Returns the final frame state.
pub fn paint_schedule(
    buf: &mut Buffer,
    area: Rect,
    buckets: &HourBuckets,
    offsets: &ColumnOffsets,
    opts: FrameOptions,
    now: NaiveDateTime,
) -> FrameState {
    paint_header(buf, area, offsets, opts);

    let mut state = FrameState::new();
    for hour in 0..HOURS_PER_DAY {
        let tasks = buckets.get(&hour).map(Vec::as_slice).unwrap_or(&[]);

        if tasks.is_empty() {
            if state.past_first_task || !opts.hide_empty {
                paint_fill(buf, area, state.current_line, StyleRole::stripe(state.alternate));
                paint_hour(buf, area, state.current_line, hour, now);
                state.advance();
            }
            continue;
        }

        state.past_first_task = true;
        for (idx, task) in tasks.iter().enumerate() {
            let line = state.current_line;
            let role = resolve_style(task, tasks.get(idx + 1), state.alternate, now);

            if idx == 0 {
                paint_hour(buf, area, line, hour, now);
            }
            paint_fill(buf, area, line, role);
            put(
                buf,
                area,
                line,
                GLYPH_X,
                &task.glyph.symbol().to_string(),
                StyleRole::Glyph,
            );
            put(buf, area, line, offsets.glyph, &task.id_label(), role);
            put(buf, area, line, offsets.id, &task.formatted_time(), role);
            if opts.hide_projects {
                put(buf, area, line, offsets.time, &task.description, role);
            } else {
                let project = task.project.as_deref().unwrap_or("");
                put(buf, area, line, offsets.time, project, role);
                put(buf, area, line, offsets.project, &task.description, role);
            }
            state.advance();
        }
    }
    state
}

/// The schedule as plain text rows, following the same visibility rules
/// as the live view: `[hour, glyph, id, time, (project,) description]`.
pub fn plain_rows(buckets: &HourBuckets, opts: FrameOptions) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut past_first_task = false;
    for hour in 0..HOURS_PER_DAY {
        let tasks = buckets.get(&hour).map(Vec::as_slice).unwrap_or(&[]);
        if tasks.is_empty() {
            if past_first_task || !opts.hide_empty {
                rows.push(vec![hour.to_string()]);
            }
            continue;
        }
        past_first_task = true;
        for (idx, task) in tasks.iter().enumerate() {
            let mut row = vec![
                if idx == 0 { hour.to_string() } else { String::new() },
                task.glyph.symbol().to_string(),
                task.id_label(),
                task.formatted_time(),
            ];
            if !opts.hide_projects {
                row.push(task.project.clone().unwrap_or_default());
            }
            row.push(task.description.clone());
            rows.push(row);
        }
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
    Painting,
    Flushed,
}

/// Owns the terminal and repaints the schedule every cycle.
pub struct Screen<B: Backend> {
    terminal: Terminal<B>,
    schedule: Schedule,
    settings: Settings,
    previous: Option<HourBuckets>,
    phase: Phase,
}

impl<B: Backend> Screen<B> {
    pub fn new(terminal: Terminal<B>, schedule: Schedule, settings: Settings) -> Self {
        Screen {
            terminal,
            schedule,
            settings,
            previous: None,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    fn enter(&mut self, phase: Phase) {
        trace!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Runs one refresh, paint and flush. Returns whether the screen was
    /// cleared because the bucketed tasks changed since the last frame.
    ///
    /// A terminal write error drops back to `Idle` and forgets the last
    /// frame, so the next draw starts from a cleared screen.
    pub fn draw(&mut self, now: NaiveDateTime) -> Result<bool> {
        self.enter(Phase::Refreshing);
        if let Err(err) =
            self.schedule
                .load_tasks(&self.settings.scheduled, self.settings.completed, now)
        {
            warn!("refresh failed, keeping previous tasks: {err}");
        }
        let buckets = self.schedule.bucket_by_hour();
        let offsets = self.schedule.column_offsets();

        let changed = self.previous.as_ref() != Some(&buckets);
        if let Err(err) = self.paint(&buckets, &offsets, changed, now) {
            self.previous = None;
            self.enter(Phase::Idle);
            return Err(ScheduleError::Surface(err.to_string()).into());
        }

        self.enter(Phase::Flushed);
        self.previous = Some(buckets);
        Ok(changed)
    }

    fn paint(
        &mut self,
        buckets: &HourBuckets,
        offsets: &ColumnOffsets,
        changed: bool,
        now: NaiveDateTime,
    ) -> io::Result<()> {
        if changed {
            debug!("schedule changed, clearing screen");
            self.terminal.clear()?;
        }
        self.enter(Phase::Painting);
        let opts = FrameOptions::from(&self.settings);
        self.terminal.draw(|f| {
            let area = f.size();
            paint_schedule(f.buffer_mut(), area, buckets, offsets, opts, now);
        })?;
        Ok(())
    }

    /// One loop cycle. A failed frame is logged and skipped.
    fn tick(&mut self, now: NaiveDateTime) {
        if let Err(err) = self.draw(now) {
            warn!("frame skipped: {err:#}");
        }
    }

    fn event_loop(&mut self, exit: &AtomicBool) -> Result<()> {
        let interval = Duration::from_secs(self.settings.refresh_rate);
        info!("render loop started, refreshing every {}s", interval.as_secs());
        loop {
            self.tick(Local::now().naive_local());
            if wait_for_exit(interval, exit)? {
                info!("exit requested");
                break;
            }
        }
        self.enter(Phase::Idle);
        Ok(())
    }
}

/// Sleeps up to `timeout` while watching for an exit key or the interrupt
/// flag. A resize ends the wait early so the next frame picks up the new
/// size.
fn wait_for_exit(timeout: Duration, exit: &AtomicBool) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if exit.load(Ordering::SeqCst) {
            return Ok(true);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        if event::poll(remaining.min(INPUT_SLICE))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press && is_exit_key(key) => {
                    return Ok(true)
                }
                Event::Resize(..) => return Ok(false),
                _ => {}
            }
        }
    }
}

pub fn is_exit_key(key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Raw mode and the alternate screen for as long as the guard lives. The
/// terminal is restored on drop and from the panic hook, which is removed
/// again on drop.
struct SurfaceGuard;

impl SurfaceGuard {
    fn acquire() -> Result<Self, ScheduleError> {
        setup_terminal().map_err(|e| {
            let _ = teardown_terminal();
            ScheduleError::Surface(e.to_string())
        })?;
        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let _ = teardown_terminal();
            original_hook(panic_info);
        }));
        Ok(SurfaceGuard)
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        if !thread::panicking() {
            let _ = panic::take_hook();
        }
        if let Err(err) = teardown_terminal() {
            error!("failed to restore terminal: {err}");
        }
        debug!("terminal released");
    }
}

fn setup_terminal() -> std::io::Result<()> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen, Hide)?;
    Ok(())
}

fn teardown_terminal() -> std::io::Result<()> {
    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen, Show)?;
    Ok(())
}
