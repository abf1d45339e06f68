#![forbid(unsafe_code)]

//! Per-student lab stack lifecycle orchestration.
//!
//! Launches, resumes, and suspends cloud stacks through an asynchronous
//! task client, and suspends idle stacks with a dead man's switch.

pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod tasks;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
