//! ai-pipeline library crate.
//!
//! Builds a tree of train/deploy/predict steps, flattens it into a graph and
//! renders it as an orchestration script. The binary entry point
//! (src/main.rs) and the integration tests in tests/ use these modules.

pub mod component;
pub mod config;
pub mod descriptor;
pub mod generator;
pub mod pipeline;
pub mod utils;
