//! Application models

use serde::{Deserialize, Serialize};

/// Where an application's artifact comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Built from a git repository
    Git,

    /// Pulled from a registry as a ready image
    Image,
}

/// Which build backend turns a working tree into an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildType {
    Dockerfile,
    Nixpacks,
    Buildpacks,
}

/// Application status as seen by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    #[default]
    Idle,

    /// The application's container was started by the last deployment
    Running,

    Done,

    Error,
}

/// A registered application definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Unique application ID
    pub id: String,

    /// Application name, also used as container name and image repository
    pub name: String,

    /// Owning project
    pub project_id: String,

    pub source_type: SourceType,

    #[serde(default)]
    pub repository_url: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Image reference for `IMAGE` sources
    #[serde(default)]
    pub image: Option<String>,

    pub build_type: BuildType,

    /// Build context relative to the working tree root
    #[serde(default)]
    pub build_path: Option<String>,

    /// Dockerfile location relative to the build context
    #[serde(default)]
    pub dockerfile_path: Option<String>,

    /// Raw newline-delimited `KEY=VALUE` environment
    #[serde(default)]
    pub env: Option<String>,

    /// Port the application listens on inside the container
    pub target_port: u16,

    /// Port published on the host
    pub published_port: u16,

    #[serde(default)]
    pub status: ApplicationStatus,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Application {
    pub fn network_name(&self) -> String {
        format!("{}-network", self.project_id)
    }

    pub fn volume_name(&self) -> String {
        format!("{}-data", self.name)
    }

    pub fn container_name(&self) -> &str {
        &self.name
    }

    /// Convention tag every build backend produces
    pub fn image_tag(&self) -> String {
        format!("{}:latest", self.name)
    }
}
