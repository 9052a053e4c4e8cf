//! Attendance ledger: one CSV file per session window and date.
//!
//! ```text
//! Name, Attendance Time
//! Alice, 09:05:12
//! ```

use crate::retry::{FileAccessError, RetryPolicy};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LEDGER_HEADER: &str = "Name, Attendance Time";

const WINDOW_FORMAT_12H: &str = "%I:%M %p";
const WINDOW_FORMAT_24H: &str = "%H:%M";
const FILE_TIME_FORMAT: &str = "%H-%M-%S";
const ENTRY_TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid session window {input:?}: {reason}")]
    InvalidWindow { input: String, reason: String },
    #[error("session naming cancelled")]
    UserCancelled,
    #[error("{}: line {line}: malformed attendance entry", path.display())]
    Malformed { path: PathBuf, line: usize },
    #[error(transparent)]
    File(#[from] FileAccessError),
}

/// Inclusive time-of-day range during which marks are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl SessionWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, LedgerError> {
        if start > end {
            return Err(LedgerError::InvalidWindow {
                input: format!("{} - {}", start.format(WINDOW_FORMAT_12H), end.format(WINDOW_FORMAT_12H)),
                reason: "window ends before it starts".to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse `"07:00 AM - 07:15 AM"`; `"07:00 - 07:15"` is accepted too.
    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let invalid = |reason: &str| LedgerError::InvalidWindow {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (start, end) = input
            .split_once('-')
            .ok_or_else(|| invalid("expected \"HH:MM AM - HH:MM PM\""))?;
        let start = parse_clock(start).ok_or_else(|| invalid("unreadable start time"))?;
        let end = parse_clock(end).ok_or_else(|| invalid("unreadable end time"))?;
        Self::new(start, end).map_err(|_| invalid("window ends before it starts"))
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Inclusive on both ends.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

impl fmt::Display for SessionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(WINDOW_FORMAT_12H),
            self.end.format(WINDOW_FORMAT_12H)
        )
    }
}

fn parse_clock(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, WINDOW_FORMAT_12H)
        .or_else(|_| NaiveTime::parse_from_str(text, WINDOW_FORMAT_24H))
        .ok()
}

/// `attendance_<start>_to_<end>_date-<YYYY-MM-DD>.csv`, times as `HH-MM-SS`.
pub fn session_file_name(window: &SessionWindow, date: NaiveDate) -> String {
    format!(
        "attendance_{}_to_{}_date-{}.csv",
        window.start.format(FILE_TIME_FORMAT),
        window.end.format(FILE_TIME_FORMAT),
        date.format("%Y-%m-%d")
    )
}

/// A named attendance session: its window and calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub window: SessionWindow,
    pub date: NaiveDate,
}

impl SessionFile {
    pub fn file_name(&self) -> String {
        session_file_name(&self.window, self.date)
    }
}

/// Interactive source of session windows.
pub trait WindowPrompt {
    /// Next window typed by the operator, `None` when they cancel.
    fn ask_window(&mut self) -> Option<String>;
    /// Show a problem with the last answer.
    fn report(&mut self, message: &str);
}

/// Ask for a window until one parses and contains `now`.
pub fn name_session_file(
    now: NaiveDateTime,
    prompt: &mut dyn WindowPrompt,
) -> Result<SessionFile, LedgerError> {
    loop {
        let Some(answer) = prompt.ask_window() else {
            return Err(LedgerError::UserCancelled);
        };
        let window = match SessionWindow::parse(&answer) {
            Ok(window) => window,
            Err(err) => {
                prompt.report(&err.to_string());
                continue;
            }
        };
        if !window.contains(now.time()) {
            prompt.report(&format!(
                "the current time {} is outside {window}",
                now.time().format(WINDOW_FORMAT_12H)
            ));
            continue;
        }
        return Ok(SessionFile {
            window,
            date: now.date(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyMarked,
    OutOfWindow,
    RequiresConfirmation,
    EmptyName,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEntry {
    pub name: String,
    pub time: NaiveTime,
}

pub struct Ledger {
    path: PathBuf,
    window: SessionWindow,
    retry: RetryPolicy,
}

impl Ledger {
    /// Ledger for `session`, stored in `dir`. The file is only created on the first mark.
    pub fn new(dir: &Path, session: &SessionFile, retry: RetryPolicy) -> Self {
        Self {
            path: dir.join(session.file_name()),
            window: session.window,
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn window(&self) -> &SessionWindow {
        &self.window
    }

    /// What [`mark`](Self::mark) would do for `name` at `now`, without writing.
    pub fn prepare(&self, name: &str, now: NaiveTime) -> Result<MarkOutcome, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(MarkOutcome::EmptyName);
        }
        if !self.window.contains(now) {
            return Ok(MarkOutcome::OutOfWindow);
        }
        if self.is_marked(name)? {
            return Ok(MarkOutcome::AlreadyMarked);
        }
        Ok(MarkOutcome::RequiresConfirmation)
    }

    /// Record `name` at `now` once `confirm` agrees.
    pub fn mark(
        &self,
        name: &str,
        now: NaiveTime,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<MarkOutcome, LedgerError> {
        let outcome = self.prepare(name, now)?;
        if outcome != MarkOutcome::RequiresConfirmation {
            tracing::debug!(name, ?outcome, "attendance not recorded");
            return Ok(outcome);
        }

        let name = name.trim();
        if !confirm(name) {
            tracing::info!(name, "attendance declined");
            return Ok(MarkOutcome::Declined);
        }

        let line = format!("{name}, {}\n", now.format(ENTRY_TIME_FORMAT));
        self.retry.run(&self.path, || self.append(&line))?;
        tracing::info!(name, time = %now.format(ENTRY_TIME_FORMAT), path = %self.path.display(), "attendance marked");
        Ok(MarkOutcome::Marked)
    }

    /// Entries recorded so far, in file order.
    pub fn entries(&self) -> Result<Vec<AttendanceEntry>, LedgerError> {
        let text = self.read()?;
        let mut entries = Vec::new();
        for (idx, row) in text.lines().enumerate() {
            let row = row.trim();
            if row.is_empty() || row == LEDGER_HEADER {
                continue;
            }
            let malformed = || LedgerError::Malformed {
                path: self.path.clone(),
                line: idx + 1,
            };
            let (name, time) = row.split_once(',').ok_or_else(malformed)?;
            let time = NaiveTime::parse_from_str(time.trim(), ENTRY_TIME_FORMAT)
                .map_err(|_| malformed())?;
            entries.push(AttendanceEntry {
                name: name.trim().to_string(),
                time,
            });
        }
        Ok(entries)
    }

    fn is_marked(&self, name: &str) -> Result<bool, LedgerError> {
        let text = self.read()?;
        Ok(text
            .lines()
            .skip(1)
            .filter_map(|row| row.split(',').next())
            .any(|first| first.trim() == name))
    }

    fn read(&self) -> Result<String, LedgerError> {
        let text = self.retry.run(&self.path, || match fs::read_to_string(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            other => other,
        })?;
        Ok(text)
    }

    fn append(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut chunk = String::new();
        if file.metadata()?.len() == 0 {
            chunk.push_str(LEDGER_HEADER);
            chunk.push('\n');
        }
        chunk.push_str(line);
        file.write_all(chunk.as_bytes())
    }
}
