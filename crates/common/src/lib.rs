//! Shared utilities, configuration, and error handling for Enlist
//!
//! This crate provides common functionality used across the Enlist workspace:
//! - Configuration management following 12-factor principles
//! - The caller-visible error taxonomy
//! - Store-level error types shared by every document store backend
//! - Tracing subscriber setup

pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod telemetry;

pub use config::{Config, NotificationMode, StoreBackend};
pub use db::StoreError;
pub use error::{ConflictKind, Error, Result};
pub use state::StateError;
