//! Fire-and-forget job telemetry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Counter label for one dispatch.
///
/// `ShortCircuited` keeps dedupe hits and lock-contention skips apart
/// from real completions in dashboards; the queue-visible outcome is
/// `Completed` either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryLabel {
    Completed,
    ShortCircuited,
    Failed,
    Poisoned,
}

impl TelemetryLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryLabel::Completed => "completed",
            TelemetryLabel::ShortCircuited => "short_circuited",
            TelemetryLabel::Failed => "failed",
            TelemetryLabel::Poisoned => "poisoned",
        }
    }
}

/// Sink for per-job-type counters and timers.
///
/// Infallible by contract: emitting telemetry is never on the critical
/// path, and a sink that cannot record must swallow the problem rather
/// than fail the job.
pub trait TelemetrySink: Send + Sync {
    fn count(&self, job_type: &str, label: TelemetryLabel);
    fn timing(&self, job_type: &str, elapsed: Duration);
}

impl<T> TelemetrySink for std::sync::Arc<T>
where
    T: TelemetrySink + ?Sized,
{
    fn count(&self, job_type: &str, label: TelemetryLabel) {
        (**self).count(job_type, label)
    }

    fn timing(&self, job_type: &str, elapsed: Duration) {
        (**self).timing(job_type, elapsed)
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn count(&self, _job_type: &str, _label: TelemetryLabel) {}
    fn timing(&self, _job_type: &str, _elapsed: Duration) {}
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    counters: Mutex<HashMap<(String, TelemetryLabel), u64>>,
    timings: Mutex<Vec<(String, Duration)>>,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, job_type: &str, label: TelemetryLabel) -> u64 {
        *self
            .counters
            .lock()
            .unwrap()
            .get(&(job_type.to_string(), label))
            .unwrap_or(&0)
    }

    pub fn timing_count(&self, job_type: &str) -> usize {
        self.timings
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == job_type)
            .count()
    }
}

impl TelemetrySink for InMemoryTelemetry {
    fn count(&self, job_type: &str, label: TelemetryLabel) {
        *self
            .counters
            .lock()
            .unwrap()
            .entry((job_type.to_string(), label))
            .or_insert(0) += 1;
    }

    fn timing(&self, job_type: &str, elapsed: Duration) {
        self.timings
            .lock()
            .unwrap()
            .push((job_type.to_string(), elapsed));
    }
}
