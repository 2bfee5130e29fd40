//! Utility modules for mintel-ri

pub mod db_retry;
pub mod domain;

pub use db_retry::retry_on_lock;
pub use domain::{normalize_domain, same_domain};
