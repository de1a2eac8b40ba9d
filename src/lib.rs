//! Stemforge - resumable stem separation and publishing pipeline
//!
//! This library crate exposes the core functionality for integration testing.

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod resilience;
pub mod services;
