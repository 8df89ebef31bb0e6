//! Policy registry.
//!
//! Policies are looked up by name from an explicit registry populated at
//! startup. No reflective discovery: adding a policy means registering a
//! factory here or on a registry instance.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::policy::{ReconcilePolicy, WriteBackPolicy};

/// Parameters a policy factory builds from.
#[derive(Debug, Clone, Default)]
pub struct PolicyOptions {
    /// Delay before copying a fresh mutation far; `None` disables.
    pub copy_delay: Option<Duration>,
    /// Delay before evicting a copied near payload; `None` disables.
    pub evict_delay: Option<Duration>,
}

/// A policy constructor.
pub type PolicyFactory = fn(&PolicyOptions) -> Box<dyn ReconcilePolicy>;

/// Name-keyed policy factories.
pub struct PolicyRegistry {
    factories: HashMap<&'static str, PolicyFactory>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in policies registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(WriteBackPolicy::NAME, |options| {
            Box::new(WriteBackPolicy::new(options.copy_delay, options.evict_delay))
        });
        registry
    }

    /// Registers a factory under `name`, replacing any previous one.
    pub fn register(&mut self, name: &'static str, factory: PolicyFactory) {
        self.factories.insert(name, factory);
    }

    /// Builds the policy registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for an unknown name.
    pub fn create(
        &self,
        name: &str,
        options: &PolicyOptions,
    ) -> EngineResult<Box<dyn ReconcilePolicy>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EngineError::unsupported(format!("unknown policy: {name}")))?;
        Ok(factory(options))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
