//! Settings file management

use serde::{Deserialize, Serialize};

use crate::deploy::broadcaster::DEFAULT_TOPIC_CAPACITY;
use crate::deploy::builder::DEFAULT_PACK_BUILDER;
use crate::logs::LogLevel;

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log records on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rolling log files under `logs/daemon`
    #[serde(default)]
    pub log_to_file: bool,

    /// Enable local HTTP server
    #[serde(default = "default_true")]
    pub enable_server: bool,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub builders: BuilderSettings,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            enable_server: true,
            server: ServerSettings::default(),
            runtime: RuntimeSettings::default(),
            pipeline: PipelineSettings::default(),
            builders: BuilderSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4040
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Docker socket path. Local defaults when absent.
    #[serde(default)]
    pub socket_path: Option<String>,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_secs: u64,

    /// Total attempts for a runtime call failing with a transient error
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_call_timeout() -> u64 {
    30
}

fn default_pull_timeout() -> u64 {
    600
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    500
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            call_timeout_secs: default_call_timeout(),
            pull_timeout_secs: default_pull_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }
}

/// Pipeline and worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Abort a deployment when its source cannot be fetched
    #[serde(default = "default_true")]
    pub fetch_failure_blocking: bool,

    #[serde(default = "default_status_retry_attempts")]
    pub status_retry_attempts: u32,

    /// Lines buffered per live log topic before slow subscribers lag
    #[serde(default = "default_log_topic_capacity")]
    pub log_topic_capacity: usize,
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    64
}

fn default_status_retry_attempts() -> u32 {
    5
}

fn default_log_topic_capacity() -> usize {
    DEFAULT_TOPIC_CAPACITY
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            fetch_failure_blocking: true,
            status_retry_attempts: default_status_retry_attempts(),
            log_topic_capacity: default_log_topic_capacity(),
        }
    }
}

/// Build backend binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    #[serde(default = "default_nixpacks_bin")]
    pub nixpacks_bin: String,

    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    #[serde(default = "default_pack_bin")]
    pub pack_bin: String,

    #[serde(default = "default_pack_builder")]
    pub pack_builder: String,

    #[serde(default = "default_git_bin")]
    pub git_bin: String,
}

fn default_nixpacks_bin() -> String {
    "nixpacks".to_string()
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_pack_bin() -> String {
    "pack".to_string()
}

fn default_pack_builder() -> String {
    DEFAULT_PACK_BUILDER.to_string()
}

fn default_git_bin() -> String {
    "git".to_string()
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            nixpacks_bin: default_nixpacks_bin(),
            docker_bin: default_docker_bin(),
            pack_bin: default_pack_bin(),
            pack_builder: default_pack_builder(),
            git_bin: default_git_bin(),
        }
    }
}
