//! Image build backends
//!
//! Every backend is an external CLI. Its stdout and stderr are streamed line
//! by line into the deployment log while it runs. The produced image is
//! always tagged `<appName>:latest`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::broadcaster::DeploymentLog;
use crate::errors::BerthError;
use crate::models::application::{Application, BuildType};

pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
pub const DEFAULT_PACK_BUILDER: &str = "heroku/builder:24";

/// Inputs for one image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub app_name: String,
    pub build_type: BuildType,
    pub context_dir: PathBuf,
    pub dockerfile: String,
    pub env: Vec<String>,
}

impl BuildRequest {
    /// Build request for an application checked out under `applications_dir`
    pub fn for_application(app: &Application, applications_dir: &Path, env: Vec<String>) -> Self {
        let mut context_dir = applications_dir.join(&app.name);
        if let Some(build_path) = app.build_path.as_deref() {
            let relative = build_path.trim_start_matches('/');
            if !relative.is_empty() {
                context_dir = context_dir.join(relative);
            }
        }

        Self {
            app_name: app.name.clone(),
            build_type: app.build_type,
            context_dir,
            dockerfile: app
                .dockerfile_path
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DOCKERFILE.to_string()),
            env,
        }
    }

    pub fn image_tag(&self) -> String {
        format!("{}:latest", self.app_name)
    }
}

/// Produces the `<appName>:latest` image for a build request
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, request: &BuildRequest, log: &DeploymentLog) -> Result<(), BerthError>;
}

/// Binaries used by [`ProcessImageBuilder`]
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    pub nixpacks_bin: String,
    pub docker_bin: String,
    pub pack_bin: String,
    pub pack_builder: String,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            nixpacks_bin: "nixpacks".to_string(),
            docker_bin: "docker".to_string(),
            pack_bin: "pack".to_string(),
            pack_builder: DEFAULT_PACK_BUILDER.to_string(),
        }
    }
}

/// Builder that runs the backend CLIs as subprocesses
pub struct ProcessImageBuilder {
    options: BuilderOptions,
}

impl ProcessImageBuilder {
    pub fn new(options: BuilderOptions) -> Self {
        Self { options }
    }

    /// Program and arguments for a request
    pub fn build_command(&self, request: &BuildRequest) -> (String, Vec<String>) {
        let context = request.context_dir.to_string_lossy().to_string();
        match request.build_type {
            BuildType::Nixpacks => {
                let mut args = vec![
                    "build".to_string(),
                    context,
                    "--name".to_string(),
                    request.app_name.clone(),
                ];
                for entry in &request.env {
                    args.push("--env".to_string());
                    args.push(entry.clone());
                }
                (self.options.nixpacks_bin.clone(), args)
            }
            BuildType::Dockerfile => {
                let dockerfile = request.context_dir.join(&request.dockerfile);
                let mut args = vec![
                    "build".to_string(),
                    "-f".to_string(),
                    dockerfile.to_string_lossy().to_string(),
                    "-t".to_string(),
                    request.image_tag(),
                ];
                for entry in &request.env {
                    args.push("--build-arg".to_string());
                    args.push(entry.clone());
                }
                args.push(context);
                (self.options.docker_bin.clone(), args)
            }
            BuildType::Buildpacks => {
                let mut args = vec![
                    "build".to_string(),
                    request.image_tag(),
                    "--path".to_string(),
                    context,
                    "--builder".to_string(),
                    self.options.pack_builder.clone(),
                ];
                for entry in &request.env {
                    args.push("--env".to_string());
                    args.push(entry.clone());
                }
                (self.options.pack_bin.clone(), args)
            }
        }
    }
}

#[async_trait]
impl ImageBuilder for ProcessImageBuilder {
    async fn build(&self, request: &BuildRequest, log: &DeploymentLog) -> Result<(), BerthError> {
        let (program, args) = self.build_command(request);
        info!(
            "Building {} with {:?} in {}",
            request.image_tag(),
            request.build_type,
            request.context_dir.display()
        );
        stream_command(&program, &args, log).await
    }
}

/// Forward output line by line. Bytes that are not UTF-8 are replaced, so one
/// odd line never stops the reader or closes the pipe.
async fn pump_lines<R>(reader: R, log: &DeploymentLog)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                log.line(line.trim_end_matches(['\n', '\r'])).await;
            }
            Err(e) => {
                debug!("Stopped reading build output: {}", e);
                break;
            }
        }
    }
}

/// Run a command, streaming its output into the log, and fail on non-zero exit
pub async fn stream_command(
    program: &str,
    args: &[String],
    log: &DeploymentLog,
) -> Result<(), BerthError> {
    debug!("Running {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BerthError::Build(format!("failed to start {}: {}", program, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let read_stdout = async {
        if let Some(out) = stdout {
            pump_lines(out, log).await;
        }
    };
    let read_stderr = async {
        if let Some(err) = stderr {
            pump_lines(err, log).await;
        }
    };
    tokio::join!(read_stdout, read_stderr);

    let status = child
        .wait()
        .await
        .map_err(|e| BerthError::Build(format!("failed to wait for {}: {}", program, e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(BerthError::Build(format!("{} exited with {}", program, status)))
    }
}
