//! Daily log files.
//!
//! The binary writes every log line to `rpi.<YYYY-MM-DD>.log` in the log
//! directory (UTC dates, one file per day). [`LogFiles::tail`] reads them back
//! for `/statistics/getlogs`.

use crate::error::{Result, ServiceError};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub const LOG_FILE_PREFIX: &str = "rpi";
pub const LOG_FILE_SUFFIX: &str = "log";

/// Lines returned when the client does not ask for a number
pub const DEFAULT_MAX_LINES: usize = 1000;

/// Seven days
pub const DEFAULT_MINUTES: f64 = 10_080.0;

const MAX_MINUTES: f64 = 1_000_000.0;

/// How much of the log a client asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogQuery {
    pub max_lines: usize,
    pub minutes: f64,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            minutes: DEFAULT_MINUTES,
        }
    }
}

impl LogQuery {
    /// Build a query from raw `maxLines`/`minutes` parameters. Missing,
    /// unparsable or non-positive values fall back to the defaults.
    pub fn parse(max_lines: Option<&str>, minutes: Option<&str>) -> Self {
        let max_lines = max_lines
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_LINES);
        let minutes = minutes
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(DEFAULT_MINUTES)
            .min(MAX_MINUTES);
        Self { max_lines, minutes }
    }
}

/// The directory holding the daily log files.
#[derive(Debug, Clone)]
pub struct LogFiles {
    dir: PathBuf,
}

impl LogFiles {
    /// Log files kept in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the files live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writer rolling over to a new file at UTC midnight. Creates the
    /// directory if needed.
    pub fn appender(&self) -> Result<RollingFileAppender> {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix(LOG_FILE_SUFFIX)
            .build(&self.dir)
            .map_err(|e| {
                ServiceError::system_error(format!(
                    "Cannot write logs to {}: {}",
                    self.dir.display(),
                    e
                ))
            })
    }

    /// Name of the file holding the lines logged on `date`.
    pub fn file_name(date: NaiveDate) -> String {
        format!(
            "{}.{}.{}",
            LOG_FILE_PREFIX,
            date.format("%Y-%m-%d"),
            LOG_FILE_SUFFIX
        )
    }

    /// The newest lines logged within `query.minutes`, at most
    /// `query.max_lines` of them, oldest first.
    pub fn tail(&self, query: LogQuery) -> Result<Vec<String>> {
        self.tail_at(query, Utc::now())
    }

    /// Like [`LogFiles::tail`] with an explicit clock.
    pub fn tail_at(&self, query: LogQuery, now: DateTime<Utc>) -> Result<Vec<String>> {
        let window = chrono::Duration::milliseconds((query.minutes * 60_000.0) as i64);
        let earliest = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut chunks: Vec<Vec<String>> = Vec::new();
        let mut count = 0;
        for (date, path) in self.files()? {
            if count >= query.max_lines {
                break;
            }
            let day_end = date
                .succ_opt()
                .and_then(|next| next.and_hms_opt(0, 0, 0))
                .map(|midnight| midnight.and_utc());
            if day_end.is_some_and(|end| end < earliest) {
                break;
            }

            let text = fs::read_to_string(&path)?;
            let mut kept = Vec::new();
            let mut keep = false;
            for line in text.lines() {
                // Lines without a timestamp continue the previous entry
                if let Some(at) = line_timestamp(line) {
                    keep = at >= earliest;
                }
                if keep {
                    kept.push(line.to_string());
                }
            }

            let remaining = query.max_lines - count;
            if kept.len() > remaining {
                kept.drain(..kept.len() - remaining);
            }
            count += kept.len();
            chunks.push(kept);
        }

        Ok(chunks.into_iter().rev().flatten().collect())
    }

    /// Log files in the directory, newest day first.
    fn files(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let date = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_file_date);
            if let Some(date) = date {
                files.push((date, path));
            }
        }
        files.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(files)
    }
}

fn parse_file_date(name: &str) -> Option<NaiveDate> {
    let date = name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_prefix('.')?
        .strip_suffix(LOG_FILE_SUFFIX)?
        .strip_suffix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let stamp = line.split_whitespace().next()?;
    DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SecondsFormat;
    use std::io::Write;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pi_gpiod_logs_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn line(at: DateTime<Utc>, message: &str) -> String {
        format!(
            "{}  INFO {}",
            at.to_rfc3339_opts(SecondsFormat::Micros, true),
            message
        )
    }

    fn write_day(dir: &Path, date: NaiveDate, lines: &[String]) {
        let mut text = lines.join("\n");
        text.push('\n');
        fs::write(dir.join(LogFiles::file_name(date)), text).unwrap();
    }

    #[test]
    fn test_file_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(LogFiles::file_name(date), "rpi.2024-03-09.log");
        assert_eq!(parse_file_date("rpi.2024-03-09.log"), Some(date));
        assert_eq!(parse_file_date("rpi.20240309.log"), None);
        assert_eq!(parse_file_date("other.2024-03-09.log"), None);
    }

    #[test]
    fn test_query_defaults() {
        assert_eq!(LogQuery::parse(None, None), LogQuery::default());
        assert_eq!(LogQuery::parse(Some("0"), Some("-5")), LogQuery::default());
        assert_eq!(LogQuery::parse(Some("abc"), Some("NaN")), LogQuery::default());

        let query = LogQuery::parse(Some("25"), Some("90.5"));
        assert_eq!(query.max_lines, 25);
        assert_eq!(query.minutes, 90.5);
        assert_eq!(LogQuery::parse(None, Some("1e12")).minutes, 1_000_000.0);
    }

    #[test]
    fn test_tail_spans_days_oldest_first() {
        let dir = temp_dir("days");
        let now = Utc::now();
        let today = now.date_naive();
        let yesterday = today.pred_opt().unwrap();
        let long_ago = today - chrono::Duration::days(30);

        write_day(&dir, long_ago, &[line(now - chrono::Duration::days(30), "ancient")]);
        write_day(
            &dir,
            yesterday,
            &[
                line(now - chrono::Duration::hours(30), "y1"),
                line(now - chrono::Duration::hours(26), "y2"),
            ],
        );
        write_day(
            &dir,
            today,
            &[
                line(now - chrono::Duration::minutes(10), "t1"),
                "    at continuation".to_string(),
                line(now - chrono::Duration::minutes(1), "t2"),
            ],
        );
        fs::write(dir.join("unrelated.txt"), "noise\n").unwrap();

        let logs = LogFiles::new(&dir);
        let all = logs.tail_at(LogQuery::default(), now).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all[0].ends_with("y1"));
        assert!(all[4].ends_with("t2"));

        let newest = logs
            .tail_at(LogQuery { max_lines: 3, ..LogQuery::default() }, now)
            .unwrap();
        assert_eq!(newest.len(), 3);
        assert!(newest[0].ends_with("t1"));
        assert_eq!(newest[1], "    at continuation");

        let recent = logs
            .tail_at(LogQuery { minutes: 5.0, ..LogQuery::default() }, now)
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].ends_with("t2"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let logs = LogFiles::new("/nonexistent/pi_gpiod/logs");
        assert!(logs.tail(LogQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_appender_writes_todays_file() {
        let dir = temp_dir("appender");
        let logs = LogFiles::new(&dir);
        let mut appender = logs.appender().unwrap();
        writeln!(appender, "{}", line(Utc::now(), "hello")).unwrap();
        appender.flush().unwrap();

        let tail = logs.tail(LogQuery::default()).unwrap();
        assert_eq!(tail.len(), 1);
        assert!(tail[0].ends_with("hello"));
        let _ = fs::remove_dir_all(&dir);
    }
}
