//! Pipeline job queue and per-application locks

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use crate::errors::BerthError;
use crate::models::application::Application;
use crate::models::deployment::Deployment;

/// One pipeline run waiting for a worker
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub application: Application,
    pub deployment: Deployment,
}

/// Sending half of the bounded job queue
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<PipelineJob>,
}

/// Receiving half, shared by all workers
#[derive(Clone)]
pub struct JobReceiver {
    receiver: Arc<Mutex<mpsc::Receiver<PipelineJob>>>,
}

impl JobQueue {
    pub fn bounded(capacity: usize) -> (JobQueue, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            JobQueue { sender },
            JobReceiver {
                receiver: Arc::new(Mutex::new(receiver)),
            },
        )
    }

    /// Enqueue without waiting. Fails when the queue is full or closed.
    pub fn submit(&self, job: PipelineJob) -> Result<(), BerthError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BerthError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => {
                BerthError::ShutdownError("deployment queue is closed".to_string())
            }
        })
    }
}

impl JobReceiver {
    /// Next job, or `None` once every sender is gone
    pub async fn next(&self) -> Option<PipelineJob> {
        self.receiver.lock().await.recv().await
    }

    /// Close the queue and take every job still waiting in it.
    /// Later submits fail as closed.
    pub async fn drain(&self) -> Vec<PipelineJob> {
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut jobs = Vec::new();
        while let Ok(job) = receiver.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}

/// One mutex per application id
#[derive(Default)]
pub struct ApplicationLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ApplicationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other pipeline holds the application
    pub async fn acquire(&self, application_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(application_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn is_locked(&self, application_id: &str) -> bool {
        self.locks
            .get(application_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}
