//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::broadcaster::LogHub;
use crate::deploy::builder::{ImageBuilder, ProcessImageBuilder};
use crate::deploy::coordinator::Coordinator;
use crate::deploy::git::{GitCli, SourceFetcher};
use crate::deploy::pipeline::{Pipeline, PipelineOptions};
use crate::deploy::queue::{JobQueue, JobReceiver};
use crate::deploy::reconciler::Reconciler;
use crate::deploy::status::StatusSynchronizer;
use crate::errors::BerthError;
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::store::{JsonStore, Store};

/// External systems the pipeline talks to
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub builder: Arc<dyn ImageBuilder>,
}

/// Main application state
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub hub: Arc<LogHub>,
    pub coordinator: Arc<Coordinator>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Wire the deployment core around the given collaborators.
    ///
    /// Returns the state and the receiving end of the job queue for the
    /// deployer workers.
    pub fn assemble(options: &AppOptions, collaborators: Collaborators) -> (Self, JobReceiver) {
        let Collaborators {
            store,
            runtime,
            fetcher,
            builder,
        } = collaborators;
        let layout = &options.storage.layout;

        let hub = Arc::new(LogHub::new(options.pipeline.log_topic_capacity));
        let (queue, jobs) = JobQueue::bounded(options.pipeline.queue_capacity);

        let reconciler = Reconciler::new(runtime.clone(), options.runtime.reconciler.clone());
        let status = StatusSynchronizer::new(
            store.clone(),
            options.pipeline.status_retry_attempts,
            options.pipeline.status_retry_base_delay,
        );
        let pipeline = Arc::new(Pipeline::new(
            hub.clone(),
            fetcher,
            builder,
            reconciler,
            status,
            PipelineOptions {
                applications_dir: layout.applications_dir().path().to_path_buf(),
                fetch_failure_blocking: options.pipeline.fetch_failure_blocking,
            },
        ));
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            hub.clone(),
            queue,
            layout.logs_dir().path().to_path_buf(),
        ));

        let state = Self {
            store,
            runtime,
            hub,
            coordinator,
            pipeline,
        };
        (state, jobs)
    }

    /// Initialize application state against Docker and the state file
    pub async fn init(options: &AppOptions) -> Result<(Self, JobReceiver), BerthError> {
        info!("Initializing application state...");

        let layout = &options.storage.layout;
        layout.setup().await?;

        let runtime = DockerRuntime::connect(
            options.runtime.socket_path.as_deref(),
            options.runtime.reconciler.call_timeout.as_secs(),
        )?;
        if let Err(e) = runtime.ping().await {
            warn!("Docker is not answering yet: {}", e);
        }

        let store = JsonStore::open(layout.state_file()).await?;

        Ok(Self::assemble(
            options,
            Collaborators {
                store: Arc::new(store),
                runtime: Arc::new(runtime),
                fetcher: Arc::new(GitCli::new(options.git_bin.clone())),
                builder: Arc::new(ProcessImageBuilder::new(options.builders.clone())),
            },
        ))
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), BerthError> {
        info!("Shutting down application state...");
        Ok(())
    }
}
