//! Server state

use std::sync::Arc;

use crate::deploy::coordinator::Coordinator;

/// Server state shared across handlers
pub struct ServerState {
    pub coordinator: Arc<Coordinator>,
    pub version: String,
}

impl ServerState {
    pub fn new(coordinator: Arc<Coordinator>, version: String) -> Self {
        Self {
            coordinator,
            version,
        }
    }
}
