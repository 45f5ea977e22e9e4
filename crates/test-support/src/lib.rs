//! Shared fixtures for integration tests: a toy host and a small
//! tree-walking interpreter that reports its checkpoints to a listener.

pub mod common;
