//! Background interval fan-out.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chartfeed_aggregate::resample_all;
use chartfeed_cache::{ResultHandle, ResultStore};
use chartfeed_types::{Bar, Interval};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A request to derive every other standard interval from a served series.
#[derive(Debug, Clone)]
pub struct FanoutJob {
    /// Handle the caller received; derived series are stored under `{handle}:{interval}`.
    pub handle: ResultHandle,
    /// The 1-second series the caller's result was computed from.
    pub base: Arc<Vec<Bar>>,
    /// Interval the caller already received.
    pub requested: Interval,
}

impl FanoutJob {
    /// Returns the intervals this job produces.
    #[must_use]
    pub fn targets(&self) -> Vec<Interval> {
        Interval::all()
            .iter()
            .copied()
            .filter(|i| !i.is_base() && *i != self.requested)
            .collect()
    }
}

/// Bounded queue drained by a fixed set of workers.
///
/// Jobs are identified by their handle: enqueuing a handle that is already
/// queued or running is a no-op. Failures are logged and never reach the
/// request that triggered the job.
#[derive(Debug)]
pub struct FanoutPool {
    sender: Mutex<Option<mpsc::Sender<FanoutJob>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl FanoutPool {
    /// Starts `workers` workers behind a queue holding at most `capacity` jobs.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(results: ResultStore, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let in_flight = Arc::clone(&in_flight);
                let results = results.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(job) = next else {
                            break;
                        };
                        run_job(worker, &results, &job).await;
                        lock(&in_flight).remove(job.handle.as_str());
                    }
                    debug!(worker, "fan-out worker stopped");
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            in_flight,
            workers: tokio::sync::Mutex::new(handles),
        }
    }

    /// Queues a job without waiting. Returns false if it was dropped.
    ///
    /// A job is dropped when its handle is already in flight, the queue is
    /// full, or the pool is closed.
    pub fn enqueue(&self, job: FanoutJob) -> bool {
        let key = job.handle.as_str().to_string();
        if !lock(&self.in_flight).insert(key.clone()) {
            debug!(handle = %key, "fan-out already in flight");
            return false;
        }

        let sent = match lock(&self.sender).as_ref() {
            Some(sender) => sender.try_send(job).map_err(|e| e.to_string()),
            None => Err("pool closed".to_string()),
        };
        match sent {
            Ok(()) => true,
            Err(reason) => {
                lock(&self.in_flight).remove(&key);
                warn!(handle = %key, reason, "fan-out job dropped");
                false
            }
        }
    }

    /// Returns the number of jobs queued or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Stops accepting jobs, lets queued jobs finish and waits for the workers.
    pub async fn close(&self) {
        lock(&self.sender).take();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "fan-out worker panicked");
            }
        }
    }
}

async fn run_job(worker: usize, results: &ResultStore, job: &FanoutJob) {
    let targets = job.targets();
    let base = Arc::clone(&job.base);
    let derived = match tokio::task::spawn_blocking(move || resample_all(&base, &targets)).await {
        Ok(derived) => derived,
        Err(e) => {
            warn!(worker, handle = %job.handle, error = %e, "fan-out aggregation failed");
            return;
        }
    };

    let mut stored = 0usize;
    for (interval, bars) in derived {
        if bars.is_empty() {
            continue;
        }
        let handle = job.handle.derived(interval);
        match results.store_at(&handle, &bars).await {
            Ok(()) => stored += 1,
            Err(e) => warn!(worker, handle = %handle, error = %e, "fan-out store failed"),
        }
    }
    info!(worker, handle = %job.handle, intervals = stored, "fan-out finished");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartfeed_cache::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn base_series(len: i64) -> Arc<Vec<Bar>> {
        Arc::new(
            (0..len)
                .map(|i| {
                    let ts = Utc.timestamp_opt(1_704_067_200 + i, 0).unwrap();
                    Bar::new(ts, 1.0, 2.0, 0.5, 1.5, 1.0)
                })
                .collect(),
        )
    }

    fn results() -> ResultStore {
        ResultStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(3600))
    }

    #[test]
    fn test_targets_skip_base_and_requested() {
        let job = FanoutJob {
            handle: ResultHandle::generate("s1"),
            base: base_series(1),
            requested: Interval::Minute5,
        };
        let targets = job.targets();
        assert_eq!(targets.len(), Interval::all().len() - 2);
        assert!(!targets.contains(&Interval::Second1));
        assert!(!targets.contains(&Interval::Minute5));
        assert!(targets.contains(&Interval::Day1));
    }

    #[tokio::test]
    async fn test_fanout_stores_derived_handles() {
        let results = results();
        let pool = FanoutPool::spawn(results.clone(), 2, 8);
        let handle = ResultHandle::generate("s1");

        assert!(pool.enqueue(FanoutJob {
            handle: handle.clone(),
            base: base_series(600),
            requested: Interval::Minute1,
        }));
        pool.close().await;

        let five = results
            .page(handle.derived(Interval::Minute5).as_str(), 0, 100)
            .await
            .unwrap();
        assert_eq!(five.total, 2);
        let hourly = results
            .page(handle.derived(Interval::Hour1).as_str(), 0, 100)
            .await
            .unwrap();
        assert_eq!(hourly.total, 1);
        assert!(
            results
                .page(handle.derived(Interval::Minute1).as_str(), 0, 10)
                .await
                .is_err()
        );
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_and_closed_enqueues_are_dropped() {
        let pool = FanoutPool::spawn(results(), 1, 8);
        let job = FanoutJob {
            handle: ResultHandle::generate("s1"),
            base: base_series(10),
            requested: Interval::Second1,
        };

        // Holding the in-flight slot makes the second enqueue a duplicate
        lock(&pool.in_flight).insert(job.handle.as_str().to_string());
        assert!(!pool.enqueue(job.clone()));
        lock(&pool.in_flight).clear();

        pool.close().await;
        assert!(!pool.enqueue(job));
        assert_eq!(pool.in_flight(), 0);
    }
}
