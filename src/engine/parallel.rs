//! Fixed-size worker pool variant. Each worker owns its own `Executor`, but all
//! workers share one `PauseController` -- pausing or cancelling the pool is a
//! single signal observed by every worker at its next step boundary, exactly as in
//! the sequential case.

use crate::engine::config::EngineConfig;
use crate::engine::events::{EngineEvent, EventSink};
use crate::engine::executor::{Execution, Executor};
use crate::engine::pause::PauseController;
use crate::models::{ExecutionStatus, Story};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CHANNEL_CAPACITY: usize = 100;
const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 10;

struct Job {
    id: u64,
    story: Story,
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: u64,
    pub key: String,
    pub execution: Execution,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Progress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

pub struct ParallelExecutor {
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
    pause: Arc<PauseController>,
    job_tx: Mutex<Option<SyncSender<Job>>>,
    job_rx: Arc<Mutex<Receiver<Job>>>,
    result_tx: SyncSender<JobResult>,
    result_rx: Mutex<Receiver<JobResult>>,
    active_jobs: Arc<Mutex<HashMap<u64, Story>>>,
    progress: Arc<Mutex<Progress>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_job_id: AtomicU64,
    worker_count: usize,
}

impl ParallelExecutor {
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        let worker_count = config.max_workers.clamp(MIN_WORKERS, MAX_WORKERS);
        let (job_tx, job_rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        let (result_tx, result_rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        Self {
            config,
            sink,
            pause: Arc::new(PauseController::new()),
            job_tx: Mutex::new(Some(job_tx)),
            job_rx: Arc::new(Mutex::new(job_rx)),
            result_tx,
            result_rx: Mutex::new(result_rx),
            active_jobs: Arc::new(Mutex::new(HashMap::new())),
            progress: Arc::new(Mutex::new(Progress::default())),
            workers: Mutex::new(Vec::new()),
            next_job_id: AtomicU64::new(0),
            worker_count,
        }
    }

    /// Spawns the worker threads. Idempotent: a second call is a no-op while
    /// workers from the first call are still alive.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap();
        if !workers.is_empty() {
            return;
        }
        self.pause.reset();
        for _ in 0..self.worker_count {
            let job_rx = Arc::clone(&self.job_rx);
            let result_tx = self.result_tx.clone();
            let sink = Arc::clone(&self.sink);
            let pause = Arc::clone(&self.pause);
            let config = self.config.clone();
            let active_jobs = Arc::clone(&self.active_jobs);
            let progress = Arc::clone(&self.progress);
            workers.push(thread::spawn(move || {
                worker_loop(config, sink, pause, job_rx, result_tx, active_jobs, progress)
            }));
        }
    }

    /// Enqueues a story for some worker to pick up. Returns `None` if the pool has
    /// already been shut down.
    pub fn submit(&self, story: Story) -> Option<u64> {
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let sent = {
            let guard = self.job_tx.lock().unwrap();
            match guard.as_ref() {
                Some(tx) => tx.send(Job { id, story }).is_ok(),
                None => false,
            }
        };
        if sent {
            self.progress.lock().unwrap().total += 1;
            self.sink.emit(EngineEvent::QueueUpdated {
                queue_len: self.progress.lock().unwrap().total,
            });
            Some(id)
        } else {
            None
        }
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_rx.lock().unwrap().recv().ok()
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_rx.lock().unwrap().try_recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_rx.lock().unwrap().recv_timeout(timeout).ok()
    }

    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    pub fn cancel(&self) {
        self.pause.cancel();
    }

    pub fn get_progress(&self) -> (usize, usize, usize) {
        let progress = self.progress.lock().unwrap();
        (progress.completed, progress.failed, progress.total)
    }

    pub fn get_active_jobs(&self) -> usize {
        self.active_jobs.lock().unwrap().len()
    }

    /// Closes the job channel (workers finish their current job, then exit on
    /// their next empty `recv`) and joins every worker thread.
    pub fn shutdown(&self) {
        {
            let mut tx = self.job_tx.lock().unwrap();
            *tx = None;
        }
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
    pause: Arc<PauseController>,
    job_rx: Arc<Mutex<Receiver<Job>>>,
    result_tx: SyncSender<JobResult>,
    active_jobs: Arc<Mutex<HashMap<u64, Story>>>,
    progress: Arc<Mutex<Progress>>,
) {
    let executor = Arc::new(Executor::with_pause(config, sink, Arc::clone(&pause)));
    loop {
        let job = {
            let rx = job_rx.lock().unwrap();
            rx.recv()
        };
        let job = match job {
            Ok(job) => job,
            Err(_) => break, // sender dropped: pool is shutting down
        };

        // A pool-wide cancel prevents further dequeues from taking effect; any
        // job still in flight when cancel fired is unaffected (its own Executor
        // already observed the same signal). We don't report a result for a job
        // skipped this way -- the caller reconciles via `get_progress`.
        if pause.is_canceled() {
            break;
        }

        active_jobs.lock().unwrap().insert(job.id, job.story.clone());
        let execution = executor.execute(job.story.clone());
        active_jobs.lock().unwrap().remove(&job.id);

        {
            let mut progress = progress.lock().unwrap();
            progress.completed += 1;
            if execution.status == ExecutionStatus::Failed {
                progress.failed += 1;
            }
        }

        let _ = result_tx.send(JobResult {
            job_id: job.id,
            key: job.story.key.clone(),
            execution,
        });
    }
}
