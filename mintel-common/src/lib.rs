//! # mintel-common
//!
//! Shared code for the marketing-intelligence services:
//! - Common error and result types
//! - Run lifecycle events (`IntelEvent`) and the `EventBus`
//! - Configuration file and data folder resolution
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
