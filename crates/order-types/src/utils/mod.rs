//! Utility functions shared across the pipeline.
//!
//! This module provides string formatting helpers for log output and the
//! clock helpers used for timestamps and store expiry markers.

pub mod formatting;
pub mod time;

pub use formatting::truncate_id;
pub use time::{current_timestamp, expiry_timestamp};
