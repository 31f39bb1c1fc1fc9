//! Infers progress of the writer tool from the tail of its log.
//!
//! The tool does not report structured progress. Instead we look for known
//! phrases in its log lines, newest first, using [LOG_GRAMMAR].

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::session_log::is_banner;

/// Bumped whenever [LOG_GRAMMAR] changes meaning.
pub const GRAMMAR_VERSION: u32 = 1;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").expect("Invalid regex"));

/// A line containing this is a running byte count rather than a percentage.
const BYTE_COUNT_MARKER: &str = "bytes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Something is happening, but we cannot tell how far along it is.
    Pulse,
    /// The line carries a number telling how far along we are.
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTrigger {
    /// Matched case-insensitively anywhere in the line.
    pub trigger: &'static str,
    pub kind: TriggerKind,
    pub message: &'static str,
}

const COPY_MESSAGE: &str = "Copy ISO to USB...";

/// Known log phrases, in priority order.
pub const LOG_GRAMMAR: &[LogTrigger] = &[
    LogTrigger {
        trigger: "copied:",
        kind: TriggerKind::Percentage,
        message: COPY_MESSAGE,
    },
    LogTrigger {
        trigger: "bytes (",
        kind: TriggerKind::Percentage,
        message: COPY_MESSAGE,
    },
    LogTrigger {
        trigger: "prepare copy",
        kind: TriggerKind::Pulse,
        message: "Prepare copy of ISO...",
    },
    LogTrigger {
        trigger: "verify hash",
        kind: TriggerKind::Pulse,
        message: "Verify hash of ISO...",
    },
    LogTrigger {
        trigger: "install grub",
        kind: TriggerKind::Pulse,
        message: "Install Grub...",
    },
    LogTrigger {
        trigger: "unpacking",
        kind: TriggerKind::Pulse,
        message: "Unpacking ISO...",
    },
    LogTrigger {
        trigger: "gather iso",
        kind: TriggerKind::Pulse,
        message: "Gather ISO information...",
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// How far along we are, in `[0, 1]`.
    Fraction(f64),
    /// Indeterminate activity.
    Pulse,
    /// A message, but no usable number. Keep whatever fraction was shown.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub message: &'static str,
    pub progress: Progress,
}

/// Find the newest line in `lines` (oldest first) that tells us something.
///
/// Lines before the newest session banner belong to an older run and are
/// never looked at. `required` is the byte total of the current transfer,
/// used to turn byte counts into fractions.
pub fn scan(lines: &[String], required: u64) -> Option<ProgressSample> {
    for line in lines.iter().rev() {
        if is_banner(line) {
            trace!("Reached session banner");
            return None;
        }
        if let Some(sample) = match_line(line, required) {
            trace!(line, ?sample, "Matched log line");
            return Some(sample);
        }
    }
    None
}

fn match_line(line: &str, required: u64) -> Option<ProgressSample> {
    let lower = line.to_lowercase();
    let t = LOG_GRAMMAR.iter().find(|t| lower.contains(t.trigger))?;

    let progress = match t.kind {
        TriggerKind::Pulse => Progress::Pulse,
        TriggerKind::Percentage => extract_fraction(&lower, required),
    };

    Some(ProgressSample {
        message: t.message,
        progress,
    })
}

fn extract_fraction(line: &str, required: u64) -> Progress {
    let Some(value) = DIGITS
        .find(line)
        .and_then(|m| m.as_str().parse::<f64>().ok())
    else {
        return Progress::Unchanged;
    };

    let fraction = if line.contains(BYTE_COUNT_MARKER) {
        if required == 0 {
            return Progress::Unchanged;
        }
        value / required as f64
    } else {
        value / 100.0
    };

    Progress::Fraction(fraction.clamp(0.0, 1.0))
}

/// What is currently shown to the user, built up from samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    pub message: Option<&'static str>,
    pub fraction: f64,
    /// How many pulses were requested since the start.
    pub pulses: u64,
}

impl ProgressState {
    pub fn apply(&mut self, sample: ProgressSample) {
        self.message = Some(sample.message);
        match sample.progress {
            Progress::Fraction(f) => self.fraction = f,
            Progress::Pulse => self.pulses += 1,
            Progress::Unchanged => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use test_case::test_case;

    use super::*;

    fn lines(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|l| l.to_string()).collect()
    }

    const KB: u64 = 1024;

    #[test]
    fn newest_byte_count_wins() {
        let log = lines(&[
            ">>>>> start <<<<<",
            "prepare copy...",
            "copied: 50",
            "bytes (512000)",
        ]);

        let sample = scan(&log, 1000 * KB).unwrap();

        assert_eq!(sample.message, COPY_MESSAGE);
        match sample.progress {
            Progress::Fraction(f) => assert_relative_eq!(f, (512000.0 / 1024.0) / 1000.0),
            p => panic!("unexpected {p:?}"),
        }
    }

    #[test]
    fn percentage_line() {
        let sample = scan(&lines(&["Prepare copy", "Copied: 42%"]), 0).unwrap();
        assert_eq!(sample.progress, Progress::Fraction(0.42));
    }

    #[test_case("Prepare copy of /isos/a.iso", "Prepare copy of ISO...")]
    #[test_case("VERIFY HASH sha256", "Verify hash of ISO...")]
    #[test_case("Install GRUB on /dev/sdb", "Install Grub...")]
    #[test_case("unpacking squashfs", "Unpacking ISO...")]
    #[test_case("Gather ISO info", "Gather ISO information...")]
    fn pulse_lines(line: &str, message: &str) {
        let sample = scan(&lines(&[line]), 100).unwrap();
        assert_eq!(sample.message, message);
        assert_eq!(sample.progress, Progress::Pulse);
    }

    #[test]
    fn earlier_trigger_wins_within_a_line() {
        let sample = scan(&lines(&["prepare copy done, copied: 10"]), 0).unwrap();
        assert_eq!(sample.message, COPY_MESSAGE);
        assert_eq!(sample.progress, Progress::Fraction(0.1));
    }

    #[test]
    fn unmatched_lines_are_skipped() {
        let sample = scan(&lines(&["unpacking", "mkdir /tmp/x", "sync"]), 0).unwrap();
        assert_eq!(sample.progress, Progress::Pulse);
    }

    #[test]
    fn nothing_before_banner_counts() {
        let log = lines(&["copied: 90", ">>>>> Start usb-creator: 1 <<<<<", "mkdir x"]);
        assert_eq!(scan(&log, 100), None);
    }

    #[test]
    fn no_match_means_no_sample() {
        assert_eq!(scan(&lines(&["hello", "world"]), 100), None);
        assert_eq!(scan(&[], 100), None);
    }

    #[test]
    fn byte_count_without_total_keeps_fraction() {
        let sample = scan(&lines(&["1024 bytes (1 kB) copied"]), 0).unwrap();
        assert_eq!(sample.message, COPY_MESSAGE);
        assert_eq!(sample.progress, Progress::Unchanged);
    }

    #[test]
    fn fractions_are_clamped() {
        let sample = scan(&lines(&["bytes (999999999)"]), 10).unwrap();
        assert_eq!(sample.progress, Progress::Fraction(1.0));

        let sample = scan(&lines(&["copied: 250"]), 0).unwrap();
        assert_eq!(sample.progress, Progress::Fraction(1.0));
    }

    #[test]
    fn percentage_without_digits_is_unchanged() {
        let sample = scan(&lines(&["copied: ?"]), 0).unwrap();
        assert_eq!(sample.progress, Progress::Unchanged);
    }

    #[test]
    fn state_keeps_fraction_across_unchanged_samples() {
        let mut st = ProgressState::default();
        st.apply(ProgressSample {
            message: COPY_MESSAGE,
            progress: Progress::Fraction(0.3),
        });
        st.apply(ProgressSample {
            message: "Install Grub...",
            progress: Progress::Pulse,
        });
        st.apply(ProgressSample {
            message: COPY_MESSAGE,
            progress: Progress::Unchanged,
        });

        assert_eq!(st.fraction, 0.3);
        assert_eq!(st.pulses, 1);
        assert_eq!(st.message, Some(COPY_MESSAGE));
    }
}
