//! Stochastic fulfillment backend.
//!
//! Each attempt succeeds independently with a fixed probability. A seed can
//! be configured to make the sequence of outcomes reproducible.

use crate::{FulfillmentError, FulfillmentFactory, FulfillmentInterface, FulfillmentRegistry};
use async_trait::async_trait;
use order_types::{
	truncate_id, ConfigSchema, Field, FieldType, ImplementationRegistry, Order, Schema,
	ValidationError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Default probability that an attempt succeeds.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.7;

/// Fulfillment backend that flips a biased coin per attempt.
pub struct SimulatedFulfillment {
	success_rate: f64,
	rng: Mutex<StdRng>,
}

impl SimulatedFulfillment {
	/// Creates a simulator with the given success probability (0.0 to 1.0).
	pub fn new(success_rate: f64, seed: Option<u64>) -> Self {
		let rng = match seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};
		Self {
			success_rate,
			rng: Mutex::new(rng),
		}
	}
}

#[async_trait]
impl FulfillmentInterface for SimulatedFulfillment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedFulfillmentSchema)
	}

	async fn attempt(&self, order: &Order) -> Result<bool, FulfillmentError> {
		let success = self
			.rng
			.lock()
			.map_err(|e| FulfillmentError::Unavailable(e.to_string()))?
			.gen_bool(self.success_rate);

		tracing::debug!(
			order_id = %truncate_id(&order.order_id),
			success,
			"Simulated fulfillment attempt"
		);
		Ok(success)
	}
}

/// Configuration schema for SimulatedFulfillment.
pub struct SimulatedFulfillmentSchema;

impl ConfigSchema for SimulatedFulfillmentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"success_rate",
					FieldType::Float {
						min: Some(0.0),
						max: Some(1.0),
					},
				),
				Field::new(
					"seed",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
			],
		);

		schema.validate(config)
	}
}

/// Factory function to create a simulator from configuration.
///
/// Configuration parameters:
/// - `success_rate`: probability of success per attempt (default: 0.7)
/// - `seed`: optional RNG seed for reproducible outcomes
pub fn create_fulfillment(
	config: &toml::Value,
) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError> {
	SimulatedFulfillmentSchema
		.validate(config)
		.map_err(|e| FulfillmentError::Configuration(e.to_string()))?;

	let success_rate = config
		.get("success_rate")
		.and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
		.unwrap_or(DEFAULT_SUCCESS_RATE);
	let seed = config
		.get("seed")
		.and_then(|v| v.as_integer())
		.and_then(|v| u64::try_from(v).ok());

	Ok(Box::new(SimulatedFulfillment::new(success_rate, seed)))
}

/// Registry for the simulated fulfillment implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = FulfillmentFactory;

	fn factory() -> Self::Factory {
		create_fulfillment
	}
}

impl FulfillmentRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support;

	#[tokio::test]
	async fn test_extreme_rates_are_deterministic() {
		let order = test_support::order();

		let always = SimulatedFulfillment::new(1.0, None);
		let never = SimulatedFulfillment::new(0.0, None);
		for _ in 0..20 {
			assert!(always.attempt(&order).await.unwrap());
			assert!(!never.attempt(&order).await.unwrap());
		}
	}

	#[tokio::test]
	async fn test_seeded_sequences_repeat() {
		let order = test_support::order();
		let a = SimulatedFulfillment::new(0.5, Some(42));
		let b = SimulatedFulfillment::new(0.5, Some(42));

		let mut first = Vec::new();
		let mut second = Vec::new();
		for _ in 0..32 {
			first.push(a.attempt(&order).await.unwrap());
			second.push(b.attempt(&order).await.unwrap());
		}
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_success_rate_is_roughly_respected() {
		let order = test_support::order();
		let simulator = SimulatedFulfillment::new(DEFAULT_SUCCESS_RATE, Some(7));

		let mut successes = 0;
		for _ in 0..2000 {
			if simulator.attempt(&order).await.unwrap() {
				successes += 1;
			}
		}
		// 0.7 +/- 0.05 over 2000 draws
		assert!((1300..=1500).contains(&successes), "successes = {}", successes);
	}

	#[test]
	fn test_factory_rejects_out_of_range_rate() {
		let config: toml::Value = toml::from_str("success_rate = 1.5").unwrap();
		assert!(matches!(
			create_fulfillment(&config),
			Err(FulfillmentError::Configuration(_))
		));

		let config: toml::Value = toml::from_str("success_rate = 0.9\nseed = 1").unwrap();
		assert!(create_fulfillment(&config).is_ok());
	}
}
