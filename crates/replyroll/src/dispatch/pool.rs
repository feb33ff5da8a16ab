use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info};

use super::task::{run_task, DispatchContext, DispatchReport, DispatchTask};
use super::DispatchError;

struct QueuedTask {
    task: DispatchTask,
    done: Sender<DispatchReport>,
}

/// Handle to a queued task. Dropping it does not cancel the task.
#[derive(Debug)]
pub struct DispatchTicket {
    /// Recipients the task will attempt.
    pub queued: usize,
    receiver: Receiver<DispatchReport>,
}

impl DispatchTicket {
    /// A ticket for a run that had nothing to do.
    pub(crate) fn completed(report: DispatchReport) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(report);
        Self {
            queued: 0,
            receiver: rx,
        }
    }

    /// Blocks until the task finishes. `None` if the pool shut down first.
    pub fn wait(self) -> Option<DispatchReport> {
        self.receiver.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<DispatchReport> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

/// Fixed set of threads executing dispatch tasks from a bounded queue.
/// The worker count caps concurrent SMTP sessions.
pub struct DispatchPool {
    task_sender: Sender<QueuedTask>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl DispatchPool {
    /// # Panics
    /// Panics if `worker_count` or `queue_capacity` is 0.
    pub fn new(ctx: DispatchContext, worker_count: usize, queue_capacity: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        assert!(queue_capacity > 0, "queue_capacity must be > 0");
        let (task_sender, task_receiver) = bounded::<QueuedTask>(queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_ctx = ctx.clone();

            let handle = thread::spawn(move || {
                run_worker(worker_id, task_rx, shutdown_flag, worker_ctx);
            });
            workers.push(handle);
        }

        info!("Started {} dispatch workers", worker_count);

        Self {
            task_sender,
            workers,
            shutdown,
        }
    }

    /// Queues a task without blocking.
    pub fn submit(&self, task: DispatchTask) -> Result<DispatchTicket, DispatchError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(DispatchError::ChannelClosed);
        }

        let queued = task.teacher_ids.len();
        let (done, receiver) = bounded(1);
        match self.task_sender.try_send(QueuedTask { task, done }) {
            Ok(()) => Ok(DispatchTicket { queued, receiver }),
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::ChannelClosed),
        }
    }

    /// Stops workers after their current task; queued tasks are dropped.
    pub fn shutdown(&self) {
        info!("Shutting down dispatch pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Closes the queue and joins the workers. Without a prior
    /// [`shutdown`](Self::shutdown) the queue is drained first.
    pub fn wait(self) {
        drop(self.task_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Dispatch worker {} panicked: {:?}", i, e);
            } else {
                debug!("Dispatch worker {} finished", i);
            }
        }

        info!("All dispatch workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<QueuedTask>,
    shutdown: Arc<AtomicBool>,
    ctx: DispatchContext,
) {
    debug!("Dispatch worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Dispatch worker {} received shutdown signal", worker_id);
            break;
        }

        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(queued) => {
                debug!(
                    "Dispatch worker {} running task for project {}",
                    worker_id, queued.task.project_id
                );
                let report = run_task(&ctx, &queued.task);
                // the ticket may have been dropped
                let _ = queued.done.send(report);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Dispatch worker {} queue disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Dispatch worker {} stopped", worker_id);
}
