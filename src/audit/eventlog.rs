//! Append-only JSONL attempt trace.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which adapter ran the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptMode {
    Generate,
    Validate,
    Pipeline,
    SyntaxCheck,
}

impl std::fmt::Display for AttemptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Generate => "generate",
            Self::Validate => "validate",
            Self::Pipeline => "pipeline",
            Self::SyntaxCheck => "syntax_check",
        };
        write!(f, "{}", s)
    }
}

/// Trace event for the JSONL attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AttemptEvent {
    AttemptStarted {
        mode: AttemptMode,
        fingerprint: String,
    },
    AttemptCompleted {
        mode: AttemptMode,
        fingerprint: String,
        duration_seconds: f64,
    },
    AttemptFailed {
        mode: AttemptMode,
        fingerprint: String,
        error_kind: String,
        message: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: AttemptEvent,
}

/// Generate an ISO 8601 timestamp.
pub fn now_iso8601() -> String {
    // Manual implementation — no chrono dependency
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = dur.as_secs();
    let days = secs / 86400;
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    let (y, m, d) = days_to_ymd(days as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y, m, d, hours, minutes, seconds
    )
}

/// Days since epoch to Y-M-D (simplified Gregorian).
fn days_to_ymd(days: i64) -> (i64, usize, i64) {
    let mut y = 1970i64;
    let mut remaining = days;
    loop {
        let year_days = if is_leap(y) { 366 } else { 365 };
        if remaining < year_days {
            break;
        }
        remaining -= year_days;
        y += 1;
    }
    let leap = is_leap(y);
    let month_days = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut m = 0;
    for (i, &md) in month_days.iter().enumerate() {
        if remaining < md {
            m = i + 1;
            break;
        }
        remaining -= md;
    }
    (y, m, remaining + 1)
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Derive the attempt log path within a trace directory.
pub fn log_path(trace_dir: &Path) -> PathBuf {
    trace_dir.join("attempts.jsonl")
}

/// Append an event to the trace log, creating the directory if needed.
pub fn append_event(trace_dir: &Path, event: AttemptEvent) -> Result<(), String> {
    std::fs::create_dir_all(trace_dir)
        .map_err(|e| format!("cannot create trace dir {}: {}", trace_dir.display(), e))?;

    let te = TimestampedEvent { ts: now_iso8601(), event };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let path = log_path(trace_dir);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open trace log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso8601_shape() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }

    #[test]
    fn is_leap_rules() {
        assert!(is_leap(2000));
        assert!(!is_leap(1900));
        assert!(is_leap(2024));
        assert!(!is_leap(2026));
    }

    #[test]
    fn days_to_ymd_epoch_and_later() {
        assert_eq!(days_to_ymd(0), (1970, 1, 1));
        assert_eq!(days_to_ymd(31), (1970, 2, 1));
        assert_eq!(days_to_ymd(365), (1971, 1, 1));
    }

    #[test]
    fn append_event_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        append_event(
            dir.path(),
            AttemptEvent::AttemptStarted {
                mode: AttemptMode::Generate,
                fingerprint: "blake3:abc".to_string(),
            },
        )
        .unwrap();
        append_event(
            dir.path(),
            AttemptEvent::AttemptFailed {
                mode: AttemptMode::Generate,
                fingerprint: "blake3:abc".to_string(),
                error_kind: "timeout".to_string(),
                message: "timeout after 5.000s".to_string(),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(log_path(dir.path())).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event\":\"attempt_started\""));
        assert!(lines[0].contains("\"mode\":\"generate\""));
        assert!(lines[1].contains("\"error_kind\":\"timeout\""));
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = AttemptEvent::AttemptCompleted {
            mode: AttemptMode::Pipeline,
            fingerprint: "blake3:xyz".to_string(),
            duration_seconds: 0.25,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"attempt_completed\""));
        let back: AttemptEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, AttemptEvent::AttemptCompleted { .. }));
    }
}
