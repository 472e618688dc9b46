//! Shared fixtures: fake collaborators and a wired deployment core

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use berth::app::options::AppOptions;
use berth::app::state::{AppState, Collaborators};
use berth::deploy::broadcaster::DeploymentLog;
use berth::deploy::builder::{BuildRequest, ImageBuilder};
use berth::deploy::git::SourceFetcher;
use berth::deploy::queue::JobReceiver;
use berth::errors::BerthError;
use berth::models::application::{Application, ApplicationStatus, BuildType, SourceType};
use berth::models::deployment::Deployment;
use berth::runtime::MemoryRuntime;
use berth::storage::layout::StorageLayout;
use berth::store::{MemoryStore, Store};
use berth::workers::deployer;

pub fn demo_app() -> Application {
    Application {
        id: "app-demo".to_string(),
        name: "demo".to_string(),
        project_id: "proj".to_string(),
        source_type: SourceType::Git,
        repository_url: Some("https://git.example.com/acme/demo.git".to_string()),
        branch: "main".to_string(),
        image: None,
        build_type: BuildType::Nixpacks,
        build_path: None,
        dockerfile_path: None,
        env: Some("PORT=8080\nMODE=production".to_string()),
        target_port: 8080,
        published_port: 3000,
        status: ApplicationStatus::Idle,
    }
}

pub fn image_app() -> Application {
    Application {
        id: "app-web".to_string(),
        name: "web".to_string(),
        source_type: SourceType::Image,
        repository_url: None,
        image: Some("nginx:1.27".to_string()),
        build_type: BuildType::Dockerfile,
        env: None,
        target_port: 80,
        published_port: 8081,
        ..demo_app()
    }
}

/// Fetcher that never touches the network
#[derive(Default)]
pub struct FakeFetcher {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        _branch: &str,
        dest: &Path,
        log: &DeploymentLog,
    ) -> Result<(), BerthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            log.line(format!("Error cloning {}: repository not found ❌", url))
                .await;
            return Err(BerthError::SourceFetch("repository not found".to_string()));
        }
        tokio::fs::create_dir_all(dest).await?;
        log.line(format!("Cloned {} ✅", url)).await;
        Ok(())
    }
}

/// Builder that registers the image in the in-memory runtime
pub struct FakeBuilder {
    runtime: Arc<MemoryRuntime>,
    pub produce_image: AtomicBool,
    pub fail: AtomicBool,
    pub delay: Duration,
    pub builds: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeBuilder {
    pub fn new(runtime: Arc<MemoryRuntime>, delay: Duration) -> Self {
        Self {
            runtime,
            produce_image: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            delay,
            builds: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, request: &BuildRequest, log: &DeploymentLog) -> Result<(), BerthError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        log.line(format!("#1 building {}", request.image_tag())).await;
        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BerthError::Build("nixpacks exited with exit status: 1".to_string()));
        }
        if self.produce_image.load(Ordering::SeqCst) {
            self.runtime.add_image(&request.image_tag());
        }
        Ok(())
    }
}

/// Deployment core wired to in-memory collaborators
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub runtime: Arc<MemoryRuntime>,
    pub fetcher: Arc<FakeFetcher>,
    pub builder: Arc<FakeBuilder>,
    pub state: Arc<AppState>,
    jobs: Option<JobReceiver>,
    workers: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

pub fn test_options(base_dir: &Path) -> AppOptions {
    let mut options = AppOptions::default();
    options.storage.layout = StorageLayout::new(base_dir);
    options.runtime.reconciler.retry_base_delay = Duration::from_millis(1);
    options.runtime.reconciler.call_timeout = Duration::from_secs(5);
    options.pipeline.status_retry_base_delay = Duration::from_millis(1);
    options.deployer.workers = 2;
    options
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(|_| {}, Duration::from_millis(0)).await
    }

    pub async fn build(configure: impl FnOnce(&mut AppOptions), build_delay: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut options = test_options(dir.path());
        configure(&mut options);

        let store = Arc::new(MemoryStore::new());
        store.put_application(demo_app()).await.unwrap();
        store.put_application(image_app()).await.unwrap();

        let runtime = Arc::new(MemoryRuntime::new());
        let fetcher = Arc::new(FakeFetcher::default());
        let builder = Arc::new(FakeBuilder::new(runtime.clone(), build_delay));

        let (state, jobs) = AppState::assemble(
            &options,
            Collaborators {
                store: store.clone(),
                runtime: runtime.clone(),
                fetcher: fetcher.clone(),
                builder: builder.clone(),
            },
        );

        Self {
            dir,
            store,
            runtime,
            fetcher,
            builder,
            state: Arc::new(state),
            jobs: Some(jobs),
            workers: None,
        }
    }

    /// Start the deployer pool on the queued jobs
    pub fn start_workers(&mut self, workers: usize) {
        let jobs = self.jobs.take().expect("workers already started");
        let pipeline = self.state.pipeline.clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            deployer::run(
                &deployer::Options { workers },
                pipeline,
                jobs,
                Box::pin(async move {
                    let _ = stop_rx.await;
                }),
            )
            .await;
        });
        self.workers = Some((stop_tx, handle));
    }

    pub async fn stop_workers(&mut self) {
        if let Some((stop_tx, handle)) = self.workers.take() {
            let _ = stop_tx.send(());
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .expect("deployer did not stop")
                .unwrap();
        }
    }

    /// Wait until the pipeline of a deployment has released its log
    pub async fn wait_for(&self, deployment_id: &str) -> Deployment {
        let wait = async {
            while self.state.hub.is_live(deployment_id) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .expect("deployment did not finish");
        self.store.get_deployment(deployment_id).await.unwrap()
    }

    pub async fn log_text(&self, deployment: &Deployment) -> String {
        tokio::fs::read_to_string(&deployment.log_path)
            .await
            .unwrap_or_default()
    }
}
