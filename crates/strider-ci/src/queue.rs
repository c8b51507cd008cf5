//! Serial job queue.
//!
//! One worker task pulls jobs in submission order and runs each through the
//! pipeline to completion (cleanup included) before taking the next.

use std::sync::Arc;

use strider_core::{Job, Result, StriderError, METRICS};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pipeline::JobPipeline;

/// Handle for submitting jobs to the single worker.
pub struct JobQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    drained: watch::Receiver<bool>,
}

impl JobQueue {
    /// Spawn the worker. The handle resolves to the number of jobs run once
    /// the queue is shut down and drained.
    pub fn start(pipeline: Arc<JobPipeline>) -> (Self, JoinHandle<usize>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (drained_tx, drained) = watch::channel(false);

        let worker = tokio::spawn(async move {
            let mut processed = 0usize;
            while let Some(job) = rx.recv().await {
                debug!(job_id = %job.job_id, "dequeued job");
                let report = pipeline.run(job).await;
                info!(
                    job_id = %report.job_id,
                    success = report.success(),
                    test_exit_code = ?report.test_exit_code,
                    deploy_exit_code = ?report.deploy_exit_code,
                    duration_ms = report.duration_ms,
                    phases = ?report.phases_run(),
                    "job finished"
                );
                METRICS.flush();
                processed += 1;
            }
            info!(processed = processed, "job queue drained");
            let _ = drained_tx.send(true);
            processed
        });

        let queue = Self {
            tx: Mutex::new(Some(tx)),
            drained,
        };
        (queue, worker)
    }

    /// Enqueue a job. Fails with [`StriderError::QueueClosed`] after shutdown.
    pub async fn submit(&self, job: Job) -> Result<()> {
        let guard = self.tx.lock().await;
        let tx = guard.as_ref().ok_or(StriderError::QueueClosed)?;
        let job_id = job.job_id.clone();
        tx.send(job).map_err(|_| StriderError::QueueClosed)?;
        debug!(job_id = %job_id, "job submitted");
        Ok(())
    }

    /// True once `shutdown` has been called.
    pub async fn is_closed(&self) -> bool {
        self.tx.lock().await.is_none()
    }

    /// Stop accepting jobs and wait for everything already submitted to finish.
    pub async fn shutdown(&self) {
        if self.tx.lock().await.take().is_some() {
            info!("job queue closed to new submissions");
        }
        let mut drained = self.drained.clone();
        if drained.wait_for(|done| *done).await.is_err() {
            warn!("job worker exited before draining");
        }
    }
}
