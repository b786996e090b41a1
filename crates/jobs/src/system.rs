use crate::{JobError, JobResult, JobSystemError, WaitError};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Index information handed to every job body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobArgs {
    /// Index across the whole dispatch.
    pub job_index: u32,
    pub group_id: u32,
    /// Index within the group.
    pub group_index: u32,
    pub is_first_job_in_group: bool,
    pub is_last_job_in_group: bool,
}

impl JobArgs {
    pub(crate) fn single() -> Self {
        Self {
            is_first_job_in_group: true,
            is_last_job_in_group: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ContextState {
    pending: AtomicUsize,
    cancelled: AtomicBool,
    errors: Mutex<Vec<JobError>>,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl ContextState {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }
}

/// Synchronization token grouping jobs that are waited on together.
///
/// Cloning a context yields another handle to the same counter.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub(crate) state: Arc<ContextState>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.state.pending.load(Ordering::Acquire) > 0
    }

    /// Number of jobs enqueued and not yet finished.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Request cooperative cancellation of the remaining work.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Allow new work to run again after a cancellation.
    pub fn clear_cancel(&self) {
        self.state.cancelled.store(false, Ordering::Release);
    }
}

pub(crate) type Task = Box<dyn FnOnce() -> JobResult + Send + 'static>;

pub(crate) struct Job {
    ctx: Arc<ContextState>,
    task: Task,
}

impl Job {
    fn run(self) {
        let Job { ctx, task } = self;
        if !ctx.is_cancelled() {
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => ctx.errors.lock().push(err),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(%message, "job panicked");
                    ctx.errors.lock().push(JobError::Panicked(message));
                }
            }
        }
        ctx.finish_one();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Default)]
pub struct JobSystemConfig {
    /// Worker count. `None` uses one less than the available parallelism
    /// (at least one); `Some(0)` runs every job inline on the caller.
    pub thread_count: Option<usize>,
}

/// Shared thread pool. Dropping it drains the queue and joins the workers.
pub struct JobSystem {
    sender: Option<flume::Sender<Job>>,
    receiver: flume::Receiver<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl JobSystem {
    pub fn new(config: JobSystemConfig) -> Result<Self, JobSystemError> {
        let thread_count = config.thread_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1)
        });
        let (sender, receiver) = flume::unbounded::<Job>();
        let mut workers = Vec::with_capacity(thread_count);
        for i in 0..thread_count {
            let rx = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("lumen-job-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job.run();
                    }
                })?;
            workers.push(handle);
        }
        tracing::info!(threads = thread_count, "job system started");
        Ok(Self {
            sender: Some(sender),
            receiver,
            workers,
        })
    }

    /// Pool that runs every job on the calling thread.
    pub fn inline() -> Self {
        let (sender, receiver) = flume::unbounded::<Job>();
        Self {
            sender: Some(sender),
            receiver,
            workers: Vec::new(),
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn submit(&self, ctx: &Arc<ContextState>, task: Task) {
        ctx.pending.fetch_add(1, Ordering::AcqRel);
        let job = Job {
            ctx: Arc::clone(ctx),
            task,
        };
        match &self.sender {
            Some(tx) if !self.workers.is_empty() => {
                if let Err(flume::SendError(job)) = tx.send(job) {
                    job.run();
                }
            }
            _ => job.run(),
        }
    }

    /// Enqueue a single job under `ctx`.
    pub fn execute<F>(&self, ctx: &Context, f: F)
    where
        F: FnOnce(JobArgs) -> JobResult + Send + 'static,
    {
        self.submit(&ctx.state, Box::new(move || f(JobArgs::single())));
    }

    /// Run `f` for every index in `0..job_count`, `group_size` indices per
    /// queued job.
    pub fn dispatch<F>(&self, ctx: &Context, job_count: u32, group_size: u32, f: F)
    where
        F: Fn(JobArgs) -> JobResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        for_each_group(job_count, group_size, |group_id, group_size| {
            let f = Arc::clone(&f);
            let state = Arc::clone(&ctx.state);
            self.submit(
                &ctx.state,
                Box::new(move || run_group(&*f, &state, group_id, group_size, job_count)),
            );
        });
    }

    pub fn is_busy(&self, ctx: &Context) -> bool {
        ctx.is_busy()
    }

    /// Block until every job under `ctx` has finished. Returns whether the
    /// context was busy on entry, or the errors its jobs reported.
    ///
    /// The waiting thread executes queued jobs (from any context) while it
    /// waits.
    pub fn wait(&self, ctx: &Context) -> Result<bool, WaitError> {
        let was_busy = ctx.is_busy();
        while ctx.is_busy() {
            match self.receiver.try_recv() {
                Ok(job) => job.run(),
                Err(_) => {
                    let mut guard = ctx.state.idle_lock.lock();
                    if ctx.is_busy() {
                        ctx.state
                            .idle
                            .wait_for(&mut guard, Duration::from_millis(1));
                    }
                }
            }
        }
        let errors = std::mem::take(&mut *ctx.state.errors.lock());
        if errors.is_empty() {
            Ok(was_busy)
        } else {
            tracing::warn!(failed = errors.len(), "jobs reported errors");
            Err(WaitError { errors })
        }
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("job worker exited with a panic");
            }
        }
    }
}

pub(crate) fn for_each_group(job_count: u32, group_size: u32, mut f: impl FnMut(u32, u32)) {
    if job_count == 0 {
        return;
    }
    let group_size = group_size.clamp(1, job_count);
    for group_id in 0..job_count.div_ceil(group_size) {
        f(group_id, group_size);
    }
}

pub(crate) fn run_group(
    f: &(dyn Fn(JobArgs) -> JobResult + Send + Sync),
    state: &ContextState,
    group_id: u32,
    group_size: u32,
    job_count: u32,
) -> JobResult {
    let start = group_id * group_size;
    let end = (start + group_size).min(job_count);
    for job_index in start..end {
        if state.is_cancelled() {
            return Ok(());
        }
        f(JobArgs {
            job_index,
            group_id,
            group_index: job_index - start,
            is_first_job_in_group: job_index == start,
            is_last_job_in_group: job_index + 1 == end,
        })?;
    }
    Ok(())
}
