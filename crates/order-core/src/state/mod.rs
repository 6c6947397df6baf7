//! State management for orders in the pipeline.
//!
//! This module provides the store gateway that owns the order lifecycle
//! transition table and every read and write of order, quarantine and
//! execution records.

pub mod order;

pub use order::{OrderStore, OrderStoreError};
