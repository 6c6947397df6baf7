//! Fulfillment module for the order pipeline.
//!
//! This module decides the outcome of a single fulfillment attempt through a
//! pluggable [`FulfillmentInterface`] and classifies failed attempts into
//! retry or quarantine through the [`RetryPolicy`].

use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry, Order};
use thiserror::Error;

/// Retry/quarantine classification.
pub mod policy;

/// Re-export implementations
pub mod implementations {
	pub mod scripted;
	pub mod simulated;
}

pub use policy::{decide, RetryPolicy};

/// Errors that can occur during fulfillment.
#[derive(Debug, Error)]
pub enum FulfillmentError {
	/// The fulfillment backend could not give a verdict; the attempt should be repeated.
	///
	/// Distinct from a definitive `Ok(false)`, which counts against the retry budget.
	#[error("Fulfillment backend unavailable: {0}")]
	Unavailable(String),
	/// Error that occurs when the implementation configuration is invalid.
	#[error("Invalid configuration: {0}")]
	Configuration(String),
}

/// Trait defining the interface for fulfillment backends.
///
/// A backend receives a stored order and reports whether fulfillment
/// succeeded. It must not touch the store; status bookkeeping belongs to the
/// caller.
#[async_trait]
pub trait FulfillmentInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Attempts to fulfill the order, returning `true` on success.
	async fn attempt(&self, order: &Order) -> Result<bool, FulfillmentError>;
}

/// Type alias for fulfillment factory functions.
pub type FulfillmentFactory =
	fn(&toml::Value) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError>;

/// Registry trait for fulfillment implementations.
pub trait FulfillmentRegistry: ImplementationRegistry<Factory = FulfillmentFactory> {}

/// Get all registered fulfillment implementations.
pub fn get_all_implementations() -> Vec<(&'static str, FulfillmentFactory)> {
	use implementations::{scripted, simulated};

	vec![
		(simulated::Registry::NAME, simulated::Registry::factory()),
		(scripted::Registry::NAME, scripted::Registry::factory()),
	]
}

/// Service pairing a fulfillment backend with the retry policy in force.
pub struct FulfillmentService {
	backend: Box<dyn FulfillmentInterface>,
	policy: RetryPolicy,
}

impl FulfillmentService {
	/// Creates a new FulfillmentService.
	pub fn new(backend: Box<dyn FulfillmentInterface>, policy: RetryPolicy) -> Self {
		Self { backend, policy }
	}

	/// Runs one fulfillment attempt.
	pub async fn attempt(&self, order: &Order) -> Result<bool, FulfillmentError> {
		self.backend.attempt(order).await
	}

	/// The retry policy applied to failed attempts.
	pub fn policy(&self) -> RetryPolicy {
		self.policy
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use implementations::scripted::{ScriptedFulfillment, ScriptedOutcome};

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations().into_iter().map(|(n, _)| n).collect();
		assert_eq!(names, vec!["simulated", "scripted"]);
	}

	#[tokio::test]
	async fn test_service_delegates_to_backend() {
		let backend = ScriptedFulfillment::new(vec![ScriptedOutcome::Fail], ScriptedOutcome::Succeed);
		let service = FulfillmentService::new(Box::new(backend), RetryPolicy::new(5));
		let order = test_support::order();

		assert!(!service.attempt(&order).await.unwrap());
		assert!(service.attempt(&order).await.unwrap());
		assert_eq!(service.policy().max_receive_count(), 5);
	}
}
