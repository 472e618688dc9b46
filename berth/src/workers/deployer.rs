//! Deployer worker pool

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::deploy::pipeline::Pipeline;
use crate::deploy::queue::JobReceiver;

const SHUTDOWN_REASON: &str = "daemon shutting down";

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of pipelines that may run at once
    pub workers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

/// Run the deployer workers until shutdown.
///
/// On shutdown the workers stop taking jobs; a job in progress runs to
/// completion first. Jobs still queued are failed so no deployment is left
/// RUNNING.
pub async fn run(
    options: &Options,
    pipeline: Arc<Pipeline>,
    jobs: JobReceiver,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    let workers = options.workers.max(1);
    info!("Deployer starting {} workers...", workers);

    let (stop_tx, stop_rx) = watch::channel(false);
    let handles: Vec<_> = (0..workers)
        .map(|index| {
            tokio::spawn(work(index, pipeline.clone(), jobs.clone(), stop_rx.clone()))
        })
        .collect();

    shutdown_signal.await;
    info!("Deployer shutting down...");
    let _ = stop_tx.send(true);

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!("Deployer worker panicked: {}", e);
        }
    }

    let leftover = jobs.drain().await;
    if !leftover.is_empty() {
        info!("Failing {} queued deployments", leftover.len());
    }
    for job in leftover {
        pipeline.abandon(job, SHUTDOWN_REASON).await;
    }
    info!("Deployer stopped");
}

async fn work(
    index: usize,
    pipeline: Arc<Pipeline>,
    jobs: JobReceiver,
    mut stop: watch::Receiver<bool>,
) {
    debug!("Deployer worker {} ready", index);
    loop {
        if *stop.borrow() {
            break;
        }

        let job = tokio::select! {
            biased;
            _ = stop.changed() => break,
            job = jobs.next() => job,
        };

        let Some(job) = job else {
            debug!("Deployment queue closed");
            break;
        };

        debug!(
            "Worker {} picked deployment {} for {}",
            index, job.deployment.id, job.application.name
        );
        let outcome = pipeline.run(job).await;
        debug!("Worker {} finished with {:?}", index, outcome);
    }
    debug!("Deployer worker {} exiting", index);
}
