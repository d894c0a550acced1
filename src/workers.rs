use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::error::{TransferError, error_chain_text};
use crate::events::EventHub;
use crate::job::{Job, JobKind};
use crate::queue::JobQueue;
use crate::transfer::endpoint::RemoteEndpoint;
use crate::transfer::remote_fs::Connector;

/// What a worker does with a dequeued job.
pub trait JobExecutor: Send + Sync + 'static {
    fn execute(&self, job: &Job) -> Result<(), TransferError>;
}

impl<C: Connector> JobExecutor for RemoteEndpoint<C> {
    fn execute(&self, job: &Job) -> Result<(), TransferError> {
        match job.kind() {
            JobKind::Upload { local, remote } => self.upload_local(local, remote).map(|_| ()),
            JobKind::Download { remote, local } => self.download_to_local(remote, local).map(|_| ()),
            JobKind::DeleteDir { remote } => self.delete_directory_recursive(remote, false),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerTimings {
    /// Sleep between polls of an empty queue.
    pub idle_poll: Duration,
    /// Sleep after a failed job before the next dequeue.
    pub failure_backoff: Duration,
}

struct WorkerCtx<E> {
    id: usize,
    queue: Arc<JobQueue>,
    executor: Arc<E>,
    events: Arc<EventHub>,
    timings: WorkerTimings,
    stop_rx: Receiver<()>,
}

/// Fixed set of worker threads sharing one `JobQueue`.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    stop_tx: Option<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<E: JobExecutor>(
        count: usize,
        queue: Arc<JobQueue>,
        executor: Arc<E>,
        events: Arc<EventHub>,
        timings: WorkerTimings,
    ) -> Result<Self, TransferError> {
        // 不发送任何消息；drop 发送端即为停止信号
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let ctx = WorkerCtx {
                id,
                queue: queue.clone(),
                executor: executor.clone(),
                events: events.clone(),
                timings,
                stop_rx: stop_rx.clone(),
            };
            let handle = std::thread::Builder::new()
                .name(format!("hostferry-worker-{}", id))
                .spawn(move || worker_loop(ctx))
                .map_err(|e| TransferError::Config(format!("failed to spawn worker {}: {}", id, e)))?;
            handles.push(handle);
        }
        tracing::info!("worker pool started with {} workers", count);
        Ok(Self { queue, stop_tx: Some(stop_tx), handles })
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Ask every worker to stop. No job is dequeued after this returns; jobs
    /// already executing finish in the background.
    pub fn shutdown(&mut self) {
        self.queue.close();
        if self.stop_tx.take().is_some() {
            tracing::info!("worker pool shutdown requested");
        }
    }

    /// Shut down and wait for every worker thread to exit.
    pub fn join(mut self) {
        self.shutdown();
        for h in self.handles.drain(..) {
            if h.join().is_err() {
                tracing::error!("worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Returns `false` once the stop signal has fired.
fn pause(stop_rx: &Receiver<()>, dur: Duration) -> bool {
    match stop_rx.recv_timeout(dur) {
        Err(RecvTimeoutError::Timeout) => true,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
    }
}

fn worker_loop<E: JobExecutor>(ctx: WorkerCtx<E>) {
    tracing::debug!("worker {} running", ctx.id);
    loop {
        if ctx.queue.is_closed() {
            break;
        }
        let Some(mut job) = ctx.queue.dequeue_next() else {
            if !pause(&ctx.stop_rx, ctx.timings.idle_poll) {
                break;
            }
            continue;
        };
        job.record_attempt();
        let outcome = catch_unwind(AssertUnwindSafe(|| ctx.executor.execute(&job)));
        match outcome {
            Ok(Ok(())) => {
                tracing::debug!("worker {}: {:?} done", ctx.id, job.key());
                ctx.queue.complete_success(&job);
                ctx.events.emit(job.completed_event());
            }
            Ok(Err(e)) => {
                let text = error_chain_text(&e);
                tracing::warn!(
                    "worker {}: {:?} failed (attempt {}): {}",
                    ctx.id,
                    job.key(),
                    job.attempts(),
                    text
                );
                fail(&ctx, job, text);
                if !pause(&ctx.stop_rx, ctx.timings.failure_backoff) {
                    break;
                }
            }
            Err(_) => {
                tracing::error!("worker {}: job {:?} panicked", ctx.id, job.key());
                fail(&ctx, job, "job panicked".to_string());
                if !pause(&ctx.stop_rx, ctx.timings.failure_backoff) {
                    break;
                }
            }
        }
    }
    tracing::debug!("worker {} exiting", ctx.id);
}

fn fail<E>(ctx: &WorkerCtx<E>, job: Job, text: String) {
    let event = job.failed_event(text);
    ctx.queue.complete_failure(job);
    ctx.events.emit(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TransferEvent;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl JobExecutor for Flaky {
        fn execute(&self, _job: &Job) -> Result<(), TransferError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(TransferError::Validation(format!("fail {}", n)))
            } else {
                Ok(())
            }
        }
    }

    struct Panicky;

    impl JobExecutor for Panicky {
        fn execute(&self, _job: &Job) -> Result<(), TransferError> {
            panic!("boom");
        }
    }

    fn fast() -> WorkerTimings {
        WorkerTimings { idle_poll: Duration::from_millis(5), failure_backoff: Duration::from_millis(1) }
    }

    #[test]
    fn retries_until_success_with_increasing_attempts() {
        let queue = Arc::new(JobQueue::new());
        let events = Arc::new(EventHub::new());
        let rx = events.subscribe();
        let exec = Arc::new(Flaky { failures: 3, calls: AtomicU32::new(0) });
        queue.enqueue(Job::delete_dir("d"));
        let pool = WorkerPool::spawn(1, queue.clone(), exec, events, fast()).unwrap();

        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(ev) = rx.recv_timeout(Duration::from_millis(50)) {
                let done = !ev.is_error();
                seen.push(ev);
                if done {
                    break;
                }
            }
        }
        pool.join();
        let attempts: Vec<u32> = seen
            .iter()
            .filter_map(|e| match e {
                TransferEvent::DeleteDirectoryError { attempts, .. } => Some(*attempts),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(seen.last(), Some(&TransferEvent::DeleteDirectoryComplete { path: "d".into() }));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn panic_is_reported_and_job_requeued() {
        let queue = Arc::new(JobQueue::new());
        let events = Arc::new(EventHub::new());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        events.register(Arc::new(move |ev: &TransferEvent| {
            sink.lock().unwrap().push(ev.clone());
        }));
        queue.enqueue(Job::delete_dir("p"));
        let mut pool = WorkerPool::spawn(1, queue.clone(), Arc::new(Panicky), events, fast()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while errors.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.shutdown();
        pool.join();
        let first = errors.lock().unwrap()[0].clone();
        assert!(matches!(first, TransferEvent::DeleteDirectoryError { attempts: 1, .. }));
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn shutdown_stops_idle_workers_promptly() {
        let queue = Arc::new(JobQueue::new());
        let exec = Arc::new(Flaky { failures: 0, calls: AtomicU32::new(0) });
        let slow = WorkerTimings { idle_poll: Duration::from_secs(30), failure_backoff: Duration::from_secs(30) };
        let pool = WorkerPool::spawn(3, queue.clone(), exec.clone(), Arc::new(EventHub::new()), slow).unwrap();
        assert_eq!(pool.worker_count(), 3);
        std::thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        pool.join();
        assert!(started.elapsed() < Duration::from_secs(5));
        queue.enqueue(Job::delete_dir("late"));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending_len(), 1);
    }
}
