//! Registry trait for self-registering implementations.
//!
//! Every pluggable backend (storage, queue, fulfillment) declares the name it
//! is referenced by in configuration together with its factory function.

/// Base trait for implementation registries.
///
/// Each implementation module must provide a Registry struct that implements
/// this trait, so that the service binary can build its factory maps from
/// the registered names.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This should match the key used in the TOML configuration, for example:
	/// - "memory" for storage.implementations.memory
	/// - "simulated" for fulfillment.implementations.simulated
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
