//! Normalization of the `parallel_processing` block
//!
//! Raw values arrive untyped (straight from figment as JSON) and may be
//! missing, malformed, or use the `"auto"` worker sentinel. [`ConfigValidator`]
//! turns them into a [`ProcessingPolicy`] whose worker count is always a
//! concrete positive number. Validation never fails: bad values are replaced
//! with defaults and a warning is logged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::parallel::available_cores;

/// `parallel_processing` as found in configuration, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawParallelConfig {
    pub enabled: Option<Value>,
    pub max_workers: Option<Value>,
    pub timeout_per_file: Option<Value>,
    pub save_error_reports: Option<Value>,
    pub progress_reporting: Option<Value>,
}

impl RawParallelConfig {
    /// Lenient conversion: anything that is not an object counts as empty
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            Value::Null => Self::default(),
            other => {
                tracing::warn!("parallel_processing should be a table, got {}; using defaults", other);
                Self::default()
            }
        }
    }
}

/// Requested worker count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLimit {
    Auto,
    Fixed(NonZeroUsize),
}

impl fmt::Display for WorkerLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerLimit::Auto => f.write_str("auto"),
            WorkerLimit::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// Fully resolved execution policy for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingPolicy {
    pub enabled: bool,
    /// What was asked for, kept for display
    pub requested_workers: WorkerLimit,
    /// What the dispatcher will use
    pub max_workers: NonZeroUsize,
    pub timeout_per_task: Option<Duration>,
    pub save_error_reports: bool,
    pub progress_reporting: bool,
}

impl ProcessingPolicy {
    /// Inline, one stem at a time
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            requested_workers: WorkerLimit::Fixed(NonZeroUsize::MIN),
            max_workers: NonZeroUsize::MIN,
            timeout_per_task: None,
            save_error_reports: false,
            progress_reporting: true,
        }
    }

    pub fn parallel(workers: usize) -> Self {
        let workers = NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN);
        Self {
            enabled: true,
            requested_workers: WorkerLimit::Fixed(workers),
            max_workers: workers,
            ..Self::sequential()
        }
    }
}

/// Turns [`RawParallelConfig`] into a [`ProcessingPolicy`]
#[derive(Debug, Clone, Copy)]
pub struct ConfigValidator {
    cpu_count: usize,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::with_cpu_count(available_cores())
    }

    /// Use a fixed CPU count instead of probing the machine
    pub fn with_cpu_count(cpu_count: usize) -> Self {
        Self {
            cpu_count: cpu_count.max(1),
        }
    }

    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    pub fn validate(&self, raw: &RawParallelConfig, stem_count: usize) -> ProcessingPolicy {
        let requested_workers = parse_worker_limit(raw.max_workers.as_ref());
        let max_workers = self.resolve_workers(requested_workers, stem_count);

        let policy = ProcessingPolicy {
            enabled: parse_bool("enabled", raw.enabled.as_ref(), true),
            requested_workers,
            max_workers,
            timeout_per_task: parse_timeout(raw.timeout_per_file.as_ref()),
            save_error_reports: parse_bool("save_error_reports", raw.save_error_reports.as_ref(), false),
            progress_reporting: parse_bool("progress_reporting", raw.progress_reporting.as_ref(), true),
        };

        tracing::debug!(
            "Resolved policy: enabled={} workers={} (requested {}, cpus {}, stems {}) timeout={:?}",
            policy.enabled,
            policy.max_workers,
            policy.requested_workers,
            self.cpu_count,
            stem_count,
            policy.timeout_per_task
        );

        policy
    }

    /// `Auto` -> min(cpus, stems); `Fixed(n)` -> min(n, stems); never below 1
    fn resolve_workers(&self, limit: WorkerLimit, stem_count: usize) -> NonZeroUsize {
        let ceiling = match limit {
            WorkerLimit::Auto => self.cpu_count,
            WorkerLimit::Fixed(n) => n.get(),
        };
        let workers = std::cmp::min(ceiling, stem_count);
        NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN)
    }
}

fn parse_bool(key: &str, value: Option<&Value>, default: bool) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            tracing::warn!(
                "parallel_processing.{} expects a boolean, got {}; using {}",
                key,
                other,
                default
            );
            default
        }
    }
}

fn parse_worker_limit(value: Option<&Value>) -> WorkerLimit {
    let parsed = match value {
        None | Some(Value::Null) => return WorkerLimit::Auto,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("auto") => return WorkerLimit::Auto,
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        Some(_) => None,
    };

    match parsed.and_then(|n| usize::try_from(n).ok()).and_then(NonZeroUsize::new) {
        Some(n) => WorkerLimit::Fixed(n),
        None => {
            tracing::warn!(
                "parallel_processing.max_workers must be a positive integer or \"auto\", got {}; using auto",
                value.map(serde_json::Value::to_string).unwrap_or_default()
            );
            WorkerLimit::Auto
        }
    }
}

fn parse_timeout(value: Option<&Value>) -> Option<Duration> {
    let parsed = match value {
        None | Some(Value::Null) => return None,
        Some(Value::Number(n)) => n.as_f64().and_then(seconds_to_duration),
        Some(Value::String(s)) => parse_duration(s),
        Some(_) => None,
    };

    if parsed.is_none() {
        tracing::warn!(
            "parallel_processing.timeout_per_file must be a positive duration, got {}; no timeout",
            value.map(serde_json::Value::to_string).unwrap_or_default()
        );
    }
    parsed
}

/// Parses `"90"`, `"90s"`, `"250ms"`, `"1.5m"`
fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    let parse = |n: &str| n.trim().parse::<f64>().ok();

    let seconds = if let Some(ms) = input.strip_suffix("ms") {
        parse(ms)? / 1000.0
    } else if let Some(s) = input.strip_suffix('s') {
        parse(s)?
    } else if let Some(m) = input.strip_suffix('m') {
        parse(m)? * 60.0
    } else {
        parse(input)?
    };

    seconds_to_duration(seconds)
}

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}
