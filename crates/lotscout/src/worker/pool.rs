use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;

/// A fixed-size pool of worker threads draining a bounded job channel.
///
/// The same pool type serves all three stages; the stage-specific work lives
/// in the handler closure. The job channel is bounded at `worker_count * 2`,
/// so a submitter feeding a large batch must drain results concurrently
/// (see `Orchestrator::process_job`) or `submit` will block.
pub struct WorkerPool<J, R> {
    job_sender: Sender<J>,
    result_receiver: Receiver<R>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl<J: Send + 'static, R: Send + 'static> WorkerPool<J, R> {
    /// Starts `worker_count` threads running `handler` on each job.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new<F>(worker_count: usize, handler: F) -> Self
    where
        F: Fn(usize, J) -> R + Send + Sync + 'static,
    {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<J>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<R>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(handler);

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_handler = Arc::clone(&handler);

            let handle = thread::spawn(move || {
                run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_handler);
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, job: J) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<R> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<R> {
        self.result_receiver.recv().ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker<J, R>(
    worker_id: usize,
    job_receiver: Receiver<J>,
    result_sender: Sender<R>,
    shutdown: Arc<AtomicBool>,
    handler: Arc<dyn Fn(usize, J) -> R + Send + Sync>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job) => {
                let result = handler(worker_id, job);

                if result_sender.send(result).is_err() {
                    error!("Worker {} failed to send result", worker_id);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
