//! Integration tests for the deployment core

mod common;
mod test_broadcaster;
mod test_env;
mod test_fsm;
mod test_pipeline;
mod test_server;
mod test_status;
