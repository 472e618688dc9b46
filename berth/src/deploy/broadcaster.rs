//! Deployment log fan-out
//!
//! Each deployment writes to its own append-only log file and to a broadcast
//! topic keyed by deployment id. Subscribers that fall behind lose lines;
//! publishing never waits on them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// Default number of lines buffered per topic
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Registry of live per-deployment log topics
pub struct LogHub {
    topics: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open the topic for a deployment. Opening an open topic is a no-op.
    pub fn open(&self, deployment_id: &str) {
        self.topics
            .entry(deployment_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    /// Join a live topic. `None` once the deployment has finished.
    pub fn subscribe(&self, deployment_id: &str) -> Option<broadcast::Receiver<String>> {
        self.topics.get(deployment_id).map(|sender| sender.subscribe())
    }

    /// Publish a line to current subscribers
    pub fn publish(&self, deployment_id: &str, line: &str) {
        if let Some(sender) = self.topics.get(deployment_id) {
            // No subscribers is fine
            let _ = sender.send(line.to_string());
        }
    }

    /// Close a topic. Subscribers see the stream end after buffered lines.
    pub fn close(&self, deployment_id: &str) {
        if self.topics.remove(deployment_id).is_some() {
            debug!(deployment_id, "Closed log topic");
        }
    }

    pub fn is_live(&self, deployment_id: &str) -> bool {
        self.topics.contains_key(deployment_id)
    }
}

/// Append-only log writer for one deployment
pub struct DeploymentLog {
    deployment_id: String,
    path: PathBuf,
    hub: Arc<LogHub>,
    file: Mutex<Option<tokio::fs::File>>,
    closed: AtomicBool,
}

impl DeploymentLog {
    pub fn new(deployment_id: &str, path: impl AsRef<Path>, hub: Arc<LogHub>) -> Self {
        hub.open(deployment_id);
        Self {
            deployment_id: deployment_id.to_string(),
            path: path.as_ref().to_path_buf(),
            hub,
            file: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a line to the file and publish it.
    ///
    /// File errors are reported through tracing and never returned.
    pub async fn line(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if self.closed.load(Ordering::SeqCst) {
            warn!(deployment_id = %self.deployment_id, "Dropping log line written after close");
            return;
        }

        {
            let mut file = self.file.lock().await;
            if file.is_none() {
                match OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await
                {
                    Ok(opened) => *file = Some(opened),
                    Err(e) => warn!(
                        deployment_id = %self.deployment_id,
                        "Failed to open log file {}: {}",
                        self.path.display(),
                        e
                    ),
                }
            }
            if let Some(handle) = file.as_mut() {
                let mut entry = String::with_capacity(text.len() + 1);
                entry.push_str(text);
                entry.push('\n');
                if let Err(e) = handle.write_all(entry.as_bytes()).await {
                    warn!(
                        deployment_id = %self.deployment_id,
                        "Failed to append to log file {}: {}",
                        self.path.display(),
                        e
                    );
                }
            }
            // Publish while holding the file lock so file and topic see the same order
            self.hub.publish(&self.deployment_id, text);
        }
    }

    /// Flush and release the file, then close the topic
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut handle) = self.file.lock().await.take() {
            if let Err(e) = handle.flush().await {
                warn!(deployment_id = %self.deployment_id, "Failed to flush log file: {}", e);
            }
        }
        self.hub.close(&self.deployment_id);
    }
}

impl Drop for DeploymentLog {
    fn drop(&mut self) {
        self.hub.close(&self.deployment_id);
    }
}
