//! Compaction scheduling
//!
//! A small worker pool compacts rotated segments, and an optional ticker
//! thread runs the merge cycle. Both stop when the scheduler shuts down.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, select, tick, Receiver, Sender};

use crate::error::Result;
use crate::segment::SegmentId;

/// Work the scheduler drives; implemented by the engine
pub trait CompactionRunner: Send + Sync + 'static {
    /// Deduplicate one freshly rotated segment
    fn compact_rotated(&self, id: SegmentId) -> Result<()>;

    /// Merge sealed segments if there are too many
    fn run_merge_cycle(&self) -> Result<()>;
}

/// Owns the compaction threads
///
/// Dropping the shutdown sender disconnects the channel every thread selects
/// on, which ends their loops. Queued rotation jobs that have not started
/// are abandoned; the merge cycle picks those segments up on a later run.
pub struct CompactionScheduler {
    shutdown_tx: Option<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl CompactionScheduler {
    /// Spawn `workers` rotation workers fed by `jobs`, plus a merge thread
    /// ticking every `merge_interval` when one is given
    pub fn start<R: CompactionRunner>(
        runner: Arc<R>,
        jobs: Receiver<SegmentId>,
        workers: usize,
        merge_interval: Option<Duration>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut scheduler = Self {
            shutdown_tx: Some(shutdown_tx),
            handles: Vec::with_capacity(workers + 1),
        };

        for n in 0..workers {
            let runner = Arc::clone(&runner);
            let jobs = jobs.clone();
            let shutdown = shutdown_rx.clone();

            let handle = thread::Builder::new()
                .name(format!("cinderkv-compact-{}", n))
                .spawn(move || worker_loop(runner, jobs, shutdown))?;
            scheduler.handles.push(handle);
        }

        if let Some(interval) = merge_interval {
            let runner = Arc::clone(&runner);
            let shutdown = shutdown_rx.clone();

            let handle = thread::Builder::new()
                .name("cinderkv-merge".to_string())
                .spawn(move || merge_loop(runner, interval, shutdown))?;
            scheduler.handles.push(handle);
        }

        tracing::debug!(
            workers,
            merge_interval = ?merge_interval,
            "Compaction scheduler started"
        );

        Ok(scheduler)
    }

    /// Signal every thread to stop and wait for them
    ///
    /// A compaction already in progress finishes first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.shutdown_tx.take().is_none() {
            return;
        }

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Compaction thread panicked");
            }
        }

        tracing::debug!("Compaction scheduler stopped");
    }
}

impl Drop for CompactionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<R: CompactionRunner>(
    runner: Arc<R>,
    jobs: Receiver<SegmentId>,
    shutdown: Receiver<()>,
) {
    loop {
        select! {
            recv(jobs) -> job => match job {
                Ok(id) => {
                    if let Err(e) = runner.compact_rotated(id) {
                        tracing::error!(segment = %id, "Segment compaction failed: {}", e);
                    }
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
}

fn merge_loop<R: CompactionRunner>(runner: Arc<R>, interval: Duration, shutdown: Receiver<()>) {
    let ticker = tick(interval);

    loop {
        select! {
            recv(ticker) -> _ => {
                if let Err(e) = runner.run_merge_cycle() {
                    tracing::error!("Merge cycle failed: {}", e);
                }
            },
            recv(shutdown) -> _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRunner {
        compacted: AtomicUsize,
        merges: AtomicUsize,
    }

    impl CompactionRunner for CountingRunner {
        fn compact_rotated(&self, _id: SegmentId) -> Result<()> {
            self.compacted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn run_merge_cycle(&self) -> Result<()> {
            self.merges.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_workers_drain_jobs() {
        let runner = Arc::new(CountingRunner::default());
        let (tx, rx) = unbounded();
        let scheduler = CompactionScheduler::start(Arc::clone(&runner), rx, 2, None).unwrap();

        for id in 1..=5 {
            tx.send(SegmentId(id)).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runner.compacted.load(Ordering::SeqCst) < 5 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        scheduler.shutdown();

        assert_eq!(runner.compacted.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_merge_cycle_ticks_until_shutdown() {
        let runner = Arc::new(CountingRunner::default());
        let (_tx, rx) = unbounded();
        let scheduler = CompactionScheduler::start(
            Arc::clone(&runner),
            rx,
            0,
            Some(Duration::from_millis(10)),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        scheduler.shutdown();
        let after_shutdown = runner.merges.load(Ordering::SeqCst);
        assert!(after_shutdown >= 1);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(runner.merges.load(Ordering::SeqCst), after_shutdown);
    }
}
