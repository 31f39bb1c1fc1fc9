//! The per-user log file shared with the writer tool.
//!
//! We clear it and write a banner before each run. After that only the tool
//! appends to it, and we only read its tail.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

/// Opening half of the banner that starts a session.
pub const BANNER_OPEN: &str = ">>>>>";
/// Closing half of the banner that starts a session.
pub const BANNER_CLOSE: &str = "<<<<<";

/// File name of the log inside the log directory.
pub const LOG_FILE_NAME: &str = "usb-creator.log";

/// How far back from the end we read when tailing.
const TAIL_WINDOW: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLog {
    path: PathBuf,
    max_bytes: u64,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    /// The log inside `dir`, creating the directory if needed.
    pub fn in_dir(dir: &Path, max_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self::new(dir.join(LOG_FILE_NAME), max_bytes))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the log and write a fresh session banner.
    pub fn start_session(&self) -> io::Result<()> {
        let mut f = File::create(&self.path)?;
        writeln!(f, "{}", banner())?;
        debug!(path = ?self.path, "Started new log session");
        Ok(())
    }

    /// Append a line. If that would grow the log past its cap, the log is
    /// restarted first.
    pub fn write(&self, line: &str) -> io::Result<()> {
        let len = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if len + line.len() as u64 + 1 > self.max_bytes {
            warn!(len, max = self.max_bytes, "Log is over its size cap, restarting it");
            self.start_session()?;
        }

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{line}")
    }

    /// The last `n` lines, oldest first, minus debug and separator lines.
    ///
    /// Reads whatever has been flushed so far and never waits for more. A
    /// missing log has no lines.
    pub fn tail(&self, n: usize) -> Vec<String> {
        match self.try_tail(n) {
            Ok(lines) => lines,
            Err(e) if e.kind() == io::ErrorKind::NotFound => vec![],
            Err(e) => {
                warn!(path = ?self.path, "Could not read log tail: {e}");
                vec![]
            }
        }
    }

    fn try_tail(&self, n: usize) -> io::Result<Vec<String>> {
        let mut f = File::open(&self.path)?;
        let len = f.seek(SeekFrom::End(0))?;
        let start = len.saturating_sub(TAIL_WINDOW);
        f.seek(SeekFrom::Start(start))?;

        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        let text = String::from_utf8_lossy(&buf);

        let mut lines: Vec<&str> = text.lines().collect();
        if start > 0 && !lines.is_empty() {
            // We probably landed in the middle of a line.
            lines.remove(0);
        }

        let skip = lines.len().saturating_sub(n);
        Ok(lines[skip..]
            .iter()
            .filter(|l| !is_noise(l))
            .map(|l| l.to_string())
            .collect())
    }
}

/// Whether `line` starts a session.
pub fn is_banner(line: &str) -> bool {
    line.contains(BANNER_OPEN) && line.contains(BANNER_CLOSE)
}

fn is_noise(line: &str) -> bool {
    line.contains("DEBUG") || line.contains("==")
}

const BANNER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn banner() -> String {
    let now = chrono::Local::now().format(BANNER_TIME_FORMAT);
    format!("{BANNER_OPEN} Start usb-creator: {now} {BANNER_CLOSE}")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn log_in(dir: &TempDir) -> SessionLog {
        SessionLog::in_dir(&dir.path().join("nested"), 1024 * 1024).unwrap()
    }

    #[test]
    fn start_session_clears_and_writes_banner() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.write("old run").unwrap();

        log.start_session().unwrap();

        let lines = log.tail(50);
        assert_eq!(lines.len(), 1);
        assert!(is_banner(&lines[0]));
    }

    #[test]
    fn tail_filters_noise_after_taking_last_lines() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.start_session().unwrap();
        for i in 0..10 {
            log.write(&format!("line {i}")).unwrap();
        }
        log.write("DEBUG something").unwrap();
        log.write("==========").unwrap();
        log.write("copied: 40").unwrap();

        let lines = log.tail(4);

        assert_eq!(lines, ["line 9", "copied: 40"]);
    }

    #[test]
    fn missing_log_has_no_lines() {
        let log = SessionLog::new("/definitely/not/here.log", 1024);
        assert!(log.tail(50).is_empty());
    }

    #[test]
    fn size_cap_restarts_log() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path().join("capped.log"), 96);
        log.start_session().unwrap();
        for i in 0..20 {
            log.write(&format!("entry {i}")).unwrap();
        }

        let size = fs::metadata(log.path()).unwrap().len();
        assert!(size <= 96, "log grew to {size}");
        let lines = log.tail(50);
        assert!(is_banner(&lines[0]));
        assert_eq!(lines.last().unwrap(), "entry 19");
    }

    #[test]
    fn banner_detection() {
        assert!(is_banner(&banner()));
        assert!(is_banner(">>>>> start <<<<<"));
        assert!(!is_banner(">>> Start USB Creator <<<"));
        assert!(!is_banner(">>>>> half"));
    }

    #[test]
    fn banner_carries_local_time() {
        let line = banner();
        let stamp = line
            .strip_prefix(&format!("{BANNER_OPEN} Start usb-creator: "))
            .and_then(|rest| rest.strip_suffix(&format!(" {BANNER_CLOSE}")))
            .unwrap();

        chrono::NaiveDateTime::parse_from_str(stamp, BANNER_TIME_FORMAT).unwrap();
    }
}
