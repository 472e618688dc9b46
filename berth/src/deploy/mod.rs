//! Deployment module

pub mod broadcaster;
pub mod builder;
pub mod coordinator;
pub mod env;
pub mod fsm;
pub mod git;
pub mod pipeline;
pub mod queue;
pub mod reconciler;
pub mod status;

pub use broadcaster::{DeploymentLog, LogHub};
pub use coordinator::Coordinator;
pub use pipeline::{Pipeline, PipelineOptions};
pub use reconciler::{Ensured, Reconciler, ReconcilerOptions};
