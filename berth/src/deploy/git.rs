//! Source fetching through the git CLI

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::broadcaster::DeploymentLog;
use crate::errors::BerthError;

/// Brings a working tree at `dest` up to date with `branch` of `url`
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        log: &DeploymentLog,
    ) -> Result<(), BerthError>;
}

/// Fetcher that shells out to `git`
pub struct GitCli {
    git_bin: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(git_bin: impl Into<String>) -> Self {
        Self {
            git_bin: git_bin.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<(), String> {
        debug!("Running {} {}", self.git_bin, args.join(" "));
        let output = Command::new(&self.git_bin)
            .args(args)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.git_bin, e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("{} ({})", stderr.trim(), output.status))
        }
    }
}

// `--` ends option parsing so a url or branch starting with `-` stays positional

fn pull_args<'a>(dest: &'a str, branch: &'a str) -> [&'a str; 6] {
    ["-C", dest, "pull", "--", "origin", branch]
}

fn clone_args<'a>(url: &'a str, branch: &'a str, dest: &'a str) -> [&'a str; 6] {
    ["clone", "--branch", branch, "--", url, dest]
}

#[async_trait]
impl SourceFetcher for GitCli {
    async fn fetch(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        log: &DeploymentLog,
    ) -> Result<(), BerthError> {
        let dest_str = dest.to_string_lossy();

        if dest.join(".git").exists() {
            log.line(format!("Pulling {} from origin into {}", branch, dest_str))
                .await;
            match self.run(&pull_args(&dest_str, branch)).await {
                Ok(()) => {
                    log.line(format!("Pulled branch {} ✅", branch)).await;
                    info!("Pulled {} into {}", branch, dest_str);
                    Ok(())
                }
                Err(e) => {
                    log.line(format!("Error pulling branch {}: {} ❌", branch, e))
                        .await;
                    Err(BerthError::SourceFetch(format!("git pull failed: {}", e)))
                }
            }
        } else {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            log.line(format!("Cloning {} ({}) into {}", url, branch, dest_str))
                .await;
            match self.run(&clone_args(url, branch, &dest_str)).await {
                Ok(()) => {
                    log.line(format!("Cloned {} ✅", url)).await;
                    info!("Cloned {} into {}", url, dest_str);
                    Ok(())
                }
                Err(e) => {
                    log.line(format!("Error cloning {}: {} ❌", url, e)).await;
                    Err(BerthError::SourceFetch(format!("git clone failed: {}", e)))
                }
            }
        }
    }
}
