//! Application configuration options

use std::time::Duration;

use crate::deploy::builder::BuilderOptions;
use crate::deploy::reconciler::ReconcilerOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::deployer;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Enable local HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Container runtime connection
    pub runtime: RuntimeOptions,

    /// Pipeline behaviour
    pub pipeline: PipelineTuning,

    /// Build backend binaries
    pub builders: BuilderOptions,

    /// git binary used for source fetching
    pub git_bin: String,

    /// Deployer worker options
    pub deployer: deployer::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            enable_server: true,
            server: ServerOptions::default(),
            runtime: RuntimeOptions::default(),
            pipeline: PipelineTuning::default(),
            builders: BuilderOptions::default(),
            git_bin: "git".to_string(),
            deployer: deployer::Options::default(),
        }
    }
}

impl AppOptions {
    /// Build runtime options from the settings file
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions { layout },
            enable_server: settings.enable_server,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            runtime: RuntimeOptions {
                socket_path: settings.runtime.socket_path.clone(),
                reconciler: ReconcilerOptions {
                    call_timeout: Duration::from_secs(settings.runtime.call_timeout_secs),
                    pull_timeout: Duration::from_secs(settings.runtime.pull_timeout_secs),
                    retry_attempts: settings.runtime.retry_attempts,
                    retry_base_delay: Duration::from_millis(settings.runtime.retry_base_delay_ms),
                },
            },
            pipeline: PipelineTuning {
                queue_capacity: settings.pipeline.queue_capacity,
                fetch_failure_blocking: settings.pipeline.fetch_failure_blocking,
                status_retry_attempts: settings.pipeline.status_retry_attempts,
                status_retry_base_delay: PipelineTuning::default().status_retry_base_delay,
                log_topic_capacity: settings.pipeline.log_topic_capacity,
            },
            builders: BuilderOptions {
                nixpacks_bin: settings.builders.nixpacks_bin.clone(),
                docker_bin: settings.builders.docker_bin.clone(),
                pack_bin: settings.builders.pack_bin.clone(),
                pack_builder: settings.builders.pack_builder.clone(),
            },
            git_bin: settings.builders.git_bin.clone(),
            deployer: deployer::Options {
                workers: settings.pipeline.workers,
            },
        }
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(120),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4040,
        }
    }
}

/// Container runtime options
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Docker socket, local defaults when absent
    pub socket_path: Option<String>,

    pub reconciler: ReconcilerOptions,
}

/// Pipeline queue and status options
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    pub queue_capacity: usize,
    pub fetch_failure_blocking: bool,
    pub status_retry_attempts: u32,
    pub status_retry_base_delay: Duration,
    pub log_topic_capacity: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            fetch_failure_blocking: true,
            status_retry_attempts: 5,
            status_retry_base_delay: Duration::from_millis(200),
            log_topic_capacity: crate::deploy::broadcaster::DEFAULT_TOPIC_CAPACITY,
        }
    }
}
