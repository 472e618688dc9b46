//! Berth Library
//!
//! Deployment orchestration core for a self-hosted platform-as-a-service:
//! source fetching, image builds, container reconciliation, log fan-out and
//! deployment status tracking.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod runtime;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
