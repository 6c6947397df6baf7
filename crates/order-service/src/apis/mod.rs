//! API endpoint implementations.

pub mod order;
