//! Domain records shared between the pipeline and the persistence collaborator

pub mod application;
pub mod deployment;
