//! History aggregation job records.

use chartfeed_types::Interval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an aggregation job.
pub type JobId = Uuid;

/// Status of a job or of one interval within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Not yet started.
    #[default]
    Pending,
    /// Currently running.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the status as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one target interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalTask {
    /// Target interval.
    pub interval: Interval,
    /// Current status.
    pub status: JobStatus,
    /// Aggregated bars written to the store.
    pub bars_written: usize,
    /// Error message if the interval failed.
    pub error_message: Option<String>,
}

impl IntervalTask {
    const fn new(interval: Interval) -> Self {
        Self {
            interval,
            status: JobStatus::Pending,
            bars_written: 0,
            error_message: None,
        }
    }
}

/// One run of the full-history aggregation for an instrument and range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationJob {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Exchange of the instrument.
    pub exchange: String,
    /// Instrument symbol.
    pub symbol: String,
    /// First instant aggregated (inclusive).
    pub start: DateTime<Utc>,
    /// Last instant aggregated (inclusive).
    pub end: DateTime<Utc>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Overall status.
    pub status: JobStatus,
    /// Number of 1-second bars read.
    pub base_bars: usize,
    /// Per-interval progress.
    pub tasks: Vec<IntervalTask>,
}

impl AggregationJob {
    /// Creates a pending job. The 1-second interval is never a target.
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        targets: &[Interval],
    ) -> Self {
        let mut intervals: Vec<Interval> =
            targets.iter().copied().filter(|i| !i.is_base()).collect();
        intervals.sort();
        intervals.dedup();

        Self {
            id: Uuid::new_v4(),
            exchange: exchange.into(),
            symbol: symbol.into(),
            start,
            end,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: JobStatus::Pending,
            base_bars: 0,
            tasks: intervals.into_iter().map(IntervalTask::new).collect(),
        }
    }

    /// Returns the number of intervals that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == JobStatus::Failed)
            .count()
    }

    /// Returns the total number of aggregated bars written.
    #[must_use]
    pub fn bars_written(&self) -> usize {
        self.tasks.iter().map(|t| t.bars_written).sum()
    }

    /// Returns true if the job is in a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Marks the job as running.
    pub fn mark_started(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Marks the job finished; it fails if any interval failed.
    pub fn mark_finished(&mut self) {
        self.status = if self.failed_count() == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.completed_at = Some(Utc::now());
    }

    /// Marks the job failed before any interval ran.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        for task in &mut self.tasks {
            if !task.status.is_finished() {
                task.status = JobStatus::Failed;
                task.error_message = Some(error.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(targets: &[Interval]) -> AggregationJob {
        AggregationJob::new(
            "NYSE",
            "IBM",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
            targets,
        )
    }

    #[test]
    fn test_targets_exclude_base_and_duplicates() {
        let job = job(&[Interval::Hour1, Interval::Second1, Interval::Minute1, Interval::Hour1]);
        let intervals: Vec<Interval> = job.tasks.iter().map(|t| t.interval).collect();
        assert_eq!(intervals, vec![Interval::Minute1, Interval::Hour1]);
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = job(&[Interval::Minute1, Interval::Day1]);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.is_finished());

        job.mark_started();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        for task in &mut job.tasks {
            task.status = JobStatus::Completed;
            task.bars_written = 10;
        }
        job.mark_finished();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.bars_written(), 20);
        assert!(job.is_finished());
    }

    #[test]
    fn test_one_failed_interval_fails_job() {
        let mut job = job(&[Interval::Minute1, Interval::Day1]);
        job.mark_started();
        job.tasks[1].status = JobStatus::Failed;
        job.mark_finished();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failed_count(), 1);
    }

    #[test]
    fn test_mark_failed_fails_pending_tasks() {
        let mut job = job(&[Interval::Minute5]);
        job.mark_failed("store unreadable");
        assert_eq!(job.tasks[0].status, JobStatus::Failed);
        assert_eq!(job.tasks[0].error_message.as_deref(), Some("store unreadable"));
    }
}
