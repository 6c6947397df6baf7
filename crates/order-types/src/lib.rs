//! Common types module for the order fulfillment pipeline.
//!
//! This module defines the core data types and structures used throughout
//! the pipeline. It provides a centralized location for shared types
//! to ensure consistency across the ingestion, storage, queue and
//! fulfillment components.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Queue delivery types consumed by the fulfillment worker.
pub mod delivery;
/// Event types for inter-component communication.
pub mod events;
/// Order types including line items, lifecycle status and dead-letter records.
pub mod order;
/// Registry trait for configurable implementations.
pub mod registry;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions for formatting and time handling.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use delivery::*;
pub use events::*;
pub use order::*;
pub use registry::*;
pub use storage::*;
pub use utils::{current_timestamp, expiry_timestamp, truncate_id};
pub use validation::*;
