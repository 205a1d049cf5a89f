// Tweet journal - the markdown log screenshots are captured for
//
// Format, one block per day:
//   ## Day 12
//   ...
//   - URL: https://example.com/post
//   Screen Shot: day-12-screenshot.png

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

const SCREENSHOT_PREFIX: &str = "Screen Shot: ";

lazy_static! {
    static ref DAY_HEADER_RE: Regex = Regex::new(r"^## Day (\d+)").unwrap();
    static ref URL_RE: Regex = Regex::new(r"^- URL: (https?://.+)$").unwrap();
    static ref SCREENSHOT_RE: Regex = Regex::new(r"^Screen Shot: (.+)$").unwrap();
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to read journal {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write journal {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid day number in header {0:?}")]
    InvalidDay(String),

    #[error("day {0} not found")]
    DayNotFound(u32),

    #[error("day {0} already has a screenshot reference")]
    AlreadyRecorded(u32),
}

/// One `## Day N` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayEntry {
    pub day: u32,
    /// Raw block text, header included
    pub content: String,
    pub url: Option<String>,
    pub screenshot: Option<String>,
}

impl DayEntry {
    pub fn has_screenshot(&self) -> bool {
        self.screenshot.is_some()
    }
}

/// Parsed journal plus its raw lines, so edits keep everything else intact
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    entries: Vec<DayEntry>,
    lines: Vec<String>,
}

impl Journal {
    pub fn parse(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| JournalError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(path, &text)
    }

    /// Parse `text` as the content of the journal at `path`
    pub fn parse_str(path: impl Into<PathBuf>, text: &str) -> Result<Self, JournalError> {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let entries = parse_entries(&lines)?;

        debug!(entries = entries.len(), "journal parsed");
        Ok(Self {
            path: path.into(),
            entries,
            lines,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[DayEntry] {
        &self.entries
    }

    pub fn entry(&self, day: u32) -> Option<&DayEntry> {
        self.entries.iter().find(|e| e.day == day)
    }

    /// Entries with a URL and no screenshot yet
    pub fn pending(&self) -> Vec<&DayEntry> {
        self.entries
            .iter()
            .filter(|e| !e.has_screenshot() && e.url.is_some())
            .collect()
    }

    /// Add a `Screen Shot:` line at the end of the day's block
    pub fn record_screenshot(&mut self, day: u32, filename: &str) -> Result<(), JournalError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.day == day)
            .ok_or(JournalError::DayNotFound(day))?;
        if entry.has_screenshot() {
            return Err(JournalError::AlreadyRecorded(day));
        }

        let header = self
            .lines
            .iter()
            .position(|line| header_day(line) == Some(day))
            .ok_or(JournalError::DayNotFound(day))?;
        let block_end = self.lines[header + 1..]
            .iter()
            .position(|line| DAY_HEADER_RE.is_match(line))
            .map(|offset| header + 1 + offset)
            .unwrap_or(self.lines.len());
        // keep blank separator lines after the inserted line
        let insert_at = (header + 1..block_end)
            .rev()
            .find(|&i| !self.lines[i].trim().is_empty())
            .map(|i| i + 1)
            .unwrap_or(header + 1);

        let line = format!("{}{}", SCREENSHOT_PREFIX, filename);
        self.lines.insert(insert_at, line.clone());

        entry.screenshot = Some(filename.to_string());
        entry.content.push('\n');
        entry.content.push_str(&line);
        debug!(day, filename, "screenshot recorded");
        Ok(())
    }

    /// Journal text as it would be saved
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Write the journal back, keeping a `.backup` copy until the write lands
    pub fn save(&self) -> Result<(), JournalError> {
        let backup = backup_path(&self.path);
        let write_err = |source| JournalError::Write {
            path: self.path.clone(),
            source,
        };

        let original = match fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(JournalError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if let Some(bytes) = original.as_ref().filter(|b| !b.is_empty()) {
            fs::write(&backup, bytes).map_err(write_err)?;
        }

        if let Err(e) = fs::write(&self.path, self.render()) {
            if let Some(bytes) = original.as_ref().filter(|b| !b.is_empty()) {
                if let Err(restore) = fs::write(&self.path, bytes) {
                    warn!(error = %restore, backup = %backup.display(), "failed to restore journal, backup kept");
                    return Err(write_err(e));
                }
            }
            let _ = fs::remove_file(&backup);
            return Err(write_err(e));
        }

        if backup.exists() {
            if let Err(e) = fs::remove_file(&backup) {
                warn!(error = %e, backup = %backup.display(), "failed to remove journal backup");
            }
        }
        Ok(())
    }
}

fn parse_entries(lines: &[String]) -> Result<Vec<DayEntry>, JournalError> {
    let mut entries = Vec::new();
    let mut current: Option<(DayEntry, Vec<&str>)> = None;

    for line in lines {
        if let Some(caps) = DAY_HEADER_RE.captures(line) {
            if let Some((entry, block)) = current.take() {
                entries.push(finish(entry, &block));
            }
            let day = caps[1]
                .parse::<u32>()
                .map_err(|_| JournalError::InvalidDay(line.clone()))?;
            current = Some((
                DayEntry {
                    day,
                    content: String::new(),
                    url: None,
                    screenshot: None,
                },
                vec![line.as_str()],
            ));
            continue;
        }

        // lines before the first header belong to no entry
        if let Some((entry, block)) = current.as_mut() {
            block.push(line);
            let trimmed = line.trim();
            if let Some(caps) = URL_RE.captures(trimmed) {
                entry.url = Some(caps[1].to_string());
            }
            if let Some(caps) = SCREENSHOT_RE.captures(trimmed) {
                entry.screenshot = Some(caps[1].to_string());
            }
        }
    }
    if let Some((entry, block)) = current {
        entries.push(finish(entry, &block));
    }

    Ok(entries)
}

fn finish(mut entry: DayEntry, block: &[&str]) -> DayEntry {
    entry.content = block.join("\n");
    entry
}

fn header_day(line: &str) -> Option<u32> {
    DAY_HEADER_RE
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
}

/// `{path}.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "# 100 Days of Code\n",
        "\n",
        "## Day 1\n",
        "Started the challenge.\n",
        "- URL: https://x.com/me/status/1\n",
        "Screen Shot: day-1-screenshot.png\n",
        "\n",
        "## Day 2\n",
        "Worked on the parser.\n",
        "  - URL: https://www.youtube.com/watch?v=Kf5-HWJPTIE\n",
        "\n",
        "## Day 3\n",
        "No link today.\n",
        "\n",
        "## Day 12\n",
        "- URL: http://example.com/article\n",
    );

    fn sample() -> Journal {
        Journal::parse_str("log.md", SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_entries() {
        let journal = sample();
        let days: Vec<u32> = journal.entries().iter().map(|e| e.day).collect();
        assert_eq!(days, vec![1, 2, 3, 12]);

        let day1 = journal.entry(1).unwrap();
        assert_eq!(day1.url.as_deref(), Some("https://x.com/me/status/1"));
        assert_eq!(day1.screenshot.as_deref(), Some("day-1-screenshot.png"));
        assert!(day1.content.starts_with("## Day 1\nStarted the challenge."));

        // indented URL lines are matched after trimming
        let day2 = journal.entry(2).unwrap();
        assert_eq!(
            day2.url.as_deref(),
            Some("https://www.youtube.com/watch?v=Kf5-HWJPTIE")
        );
        assert!(!day2.has_screenshot());

        assert!(journal.entry(3).unwrap().url.is_none());
    }

    #[test]
    fn test_pending_needs_url_and_no_screenshot() {
        let journal = sample();
        let pending: Vec<u32> = journal.pending().iter().map(|e| e.day).collect();
        assert_eq!(pending, vec![2, 12]);
    }

    #[test]
    fn test_text_before_first_header_is_ignored() {
        let journal = Journal::parse_str("log.md", "- URL: https://example.com\n## Day 4\n").unwrap();
        assert_eq!(journal.entries().len(), 1);
        assert!(journal.entry(4).unwrap().url.is_none());
    }

    #[test]
    fn test_non_http_urls_are_ignored() {
        let journal = Journal::parse_str("log.md", "## Day 1\n- URL: ftp://example.com/file\n").unwrap();
        assert!(journal.pending().is_empty());
    }

    #[test]
    fn test_oversized_day_number_is_an_error() {
        let err = Journal::parse_str("log.md", "## Day 99999999999\n").unwrap_err();
        assert!(matches!(err, JournalError::InvalidDay(_)));
    }

    #[test]
    fn test_record_inserts_at_end_of_block() {
        let mut journal = sample();
        journal.record_screenshot(2, "day-2-screenshot.png").unwrap();

        let text = journal.render();
        assert!(text.contains(
            "  - URL: https://www.youtube.com/watch?v=Kf5-HWJPTIE\nScreen Shot: day-2-screenshot.png\n\n## Day 3"
        ));
        assert!(journal.entry(2).unwrap().has_screenshot());
        assert_eq!(journal.pending().len(), 1);
    }

    #[test]
    fn test_record_last_block_and_prefix_days() {
        let mut journal = sample();
        // Day 1 must not match the Day 12 header
        journal.record_screenshot(12, "day-12-screenshot.png").unwrap();

        let text = journal.render();
        assert!(text.ends_with("- URL: http://example.com/article\nScreen Shot: day-12-screenshot.png\n"));

        let reparsed = Journal::parse_str("log.md", &text).unwrap();
        assert_eq!(
            reparsed.entry(12).unwrap().screenshot.as_deref(),
            Some("day-12-screenshot.png")
        );
        assert_eq!(
            reparsed.entry(1).unwrap().screenshot.as_deref(),
            Some("day-1-screenshot.png")
        );
    }

    #[test]
    fn test_record_errors() {
        let mut journal = sample();
        assert!(matches!(
            journal.record_screenshot(1, "again.png"),
            Err(JournalError::AlreadyRecorded(1))
        ));
        assert!(matches!(
            journal.record_screenshot(40, "nope.png"),
            Err(JournalError::DayNotFound(40))
        ));
    }

    #[test]
    fn test_save_round_trip_removes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.md");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut journal = Journal::parse(&path).unwrap();
        journal.record_screenshot(2, "day-2-screenshot.png").unwrap();
        journal.save().unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("Screen Shot: day-2-screenshot.png"));
        assert!(!backup_path(&path).exists());

        let reloaded = Journal::parse(&path).unwrap();
        assert_eq!(reloaded.pending().len(), 1);
    }

    #[test]
    fn test_parse_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Journal::parse(dir.path().join("missing.md")).unwrap_err();
        assert!(err.to_string().starts_with("failed to read journal"));
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(backup_path(Path::new("/tmp/log.md")), PathBuf::from("/tmp/log.md.backup"));
    }
}
