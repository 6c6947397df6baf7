//! Fulfillment backend with a predetermined sequence of outcomes.
//!
//! Outcomes are consumed in order, one per attempt, regardless of which
//! order is being fulfilled. Once the sequence is exhausted every further
//! attempt returns the default outcome.

use crate::{FulfillmentError, FulfillmentFactory, FulfillmentInterface, FulfillmentRegistry};
use async_trait::async_trait;
use order_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Order, Schema, ValidationError,
};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Mutex;

/// A single scripted attempt result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
	Succeed,
	Fail,
	/// The backend reports itself unavailable.
	Unavailable,
}

impl FromStr for ScriptedOutcome {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"succeed" => Ok(Self::Succeed),
			"fail" => Ok(Self::Fail),
			"unavailable" => Ok(Self::Unavailable),
			other => Err(format!(
				"unknown outcome '{}', expected succeed, fail or unavailable",
				other
			)),
		}
	}
}

/// Fulfillment backend replaying a fixed list of outcomes.
pub struct ScriptedFulfillment {
	outcomes: Mutex<VecDeque<ScriptedOutcome>>,
	default: ScriptedOutcome,
}

impl ScriptedFulfillment {
	pub fn new(outcomes: Vec<ScriptedOutcome>, default: ScriptedOutcome) -> Self {
		Self {
			outcomes: Mutex::new(outcomes.into()),
			default,
		}
	}
}

#[async_trait]
impl FulfillmentInterface for ScriptedFulfillment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ScriptedFulfillmentSchema)
	}

	async fn attempt(&self, _order: &Order) -> Result<bool, FulfillmentError> {
		let outcome = self
			.outcomes
			.lock()
			.map_err(|e| FulfillmentError::Unavailable(e.to_string()))?
			.pop_front()
			.unwrap_or(self.default);

		match outcome {
			ScriptedOutcome::Succeed => Ok(true),
			ScriptedOutcome::Fail => Ok(false),
			ScriptedOutcome::Unavailable => Err(FulfillmentError::Unavailable(
				"scripted outage".to_string(),
			)),
		}
	}
}

fn outcome_validator(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(s) => s.parse::<ScriptedOutcome>().map(|_| ()),
		None => Err("expected a string".to_string()),
	}
}

/// Configuration schema for ScriptedFulfillment.
pub struct ScriptedFulfillmentSchema;

impl ConfigSchema for ScriptedFulfillmentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("outcomes", FieldType::Array(Box::new(FieldType::String)))
					.with_validator(|v| {
						v.as_array()
							.map(|items| items.iter().try_for_each(outcome_validator))
							.unwrap_or(Ok(()))
					}),
				Field::new("default", FieldType::String).with_validator(outcome_validator),
			],
		);

		schema.validate(config)
	}
}

/// Factory function to create a scripted backend from configuration.
///
/// Configuration parameters:
/// - `outcomes`: list of `"succeed"`, `"fail"` or `"unavailable"` (default: empty)
/// - `default`: outcome once the list is exhausted (default: `"succeed"`)
pub fn create_fulfillment(
	config: &toml::Value,
) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError> {
	ScriptedFulfillmentSchema
		.validate(config)
		.map_err(|e| FulfillmentError::Configuration(e.to_string()))?;

	let parse = |v: &toml::Value| {
		v.as_str()
			.unwrap_or_default()
			.parse::<ScriptedOutcome>()
			.map_err(FulfillmentError::Configuration)
	};

	let outcomes = config
		.get("outcomes")
		.and_then(|v| v.as_array())
		.map(|items| items.iter().map(parse).collect::<Result<Vec<_>, _>>())
		.transpose()?
		.unwrap_or_default();
	let default = config
		.get("default")
		.map(parse)
		.transpose()?
		.unwrap_or(ScriptedOutcome::Succeed);

	Ok(Box::new(ScriptedFulfillment::new(outcomes, default)))
}

/// Registry for the scripted fulfillment implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "scripted";
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
	async fn test_outcomes_then_default() {
		let config: toml::Value =
			toml::from_str("outcomes = [\"fail\", \"unavailable\"]\ndefault = \"fail\"").unwrap();
		let backend = create_fulfillment(&config).unwrap();
		let order = test_support::order();

		assert!(!backend.attempt(&order).await.unwrap());
		assert!(matches!(
			backend.attempt(&order).await,
			Err(FulfillmentError::Unavailable(_))
		));
		assert!(!backend.attempt(&order).await.unwrap());
		assert!(!backend.attempt(&order).await.unwrap());
	}

	#[tokio::test]
	async fn test_empty_config_always_succeeds() {
		let backend = create_fulfillment(&toml::Value::Table(Default::default())).unwrap();
		assert!(backend.attempt(&test_support::order()).await.unwrap());
	}

	#[test]
	fn test_unknown_outcome_rejected() {
		let config: toml::Value = toml::from_str("outcomes = [\"maybe\"]").unwrap();
		let err = create_fulfillment(&config).err().unwrap();
		assert!(err.to_string().contains("unknown outcome 'maybe'"));
	}
}
