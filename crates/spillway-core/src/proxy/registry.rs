//! Breaker registry: one circuit breaker per configured provider.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::{BreakerConfig, Provider};
use crate::proxy::circuit_breaker::{BreakerSnapshot, CircuitBreaker};

/// Owns the breakers, created eagerly at startup in provider priority order.
/// Read-only after construction; all mutation is delegated to the individual
/// breakers, which carry their own locks.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Vec<CircuitBreaker>,
    by_name: HashMap<String, usize>,
}

impl BreakerRegistry {
    /// Build one breaker per provider. The last provider is the fallback:
    /// its breaker always reports closed to selection.
    pub fn new(providers: &[Provider], config: &BreakerConfig) -> Self {
        let last = providers.len().saturating_sub(1);
        let breakers: Vec<CircuitBreaker> = providers
            .iter()
            .enumerate()
            .map(|(index, provider)| {
                CircuitBreaker::new(
                    provider.name.clone(),
                    config.failure_threshold,
                    config.reset_timeout(),
                    index == last,
                )
            })
            .collect();
        let by_name =
            breakers.iter().enumerate().map(|(index, b)| (b.name().to_string(), index)).collect();

        Self { breakers, by_name }
    }

    /// Look up a breaker by provider name. Unknown names are a programmer
    /// error: every configured provider gets a breaker at startup.
    pub fn get(&self, name: &str) -> &CircuitBreaker {
        match self.by_name.get(name) {
            Some(&index) => &self.breakers[index],
            None => panic!("no circuit breaker registered for provider '{name}'"),
        }
    }

    pub fn by_index(&self, index: usize) -> &CircuitBreaker {
        &self.breakers[index]
    }

    pub fn is_open(&self, index: usize, now: Instant) -> bool {
        self.breakers[index].is_open(now)
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Hard-reset every breaker.
    pub fn reset_all(&self) {
        for breaker in &self.breakers {
            breaker.reset();
        }
    }

    /// Health snapshot keyed by provider name.
    pub fn status(&self) -> HashMap<String, BreakerSnapshot> {
        self.breakers.iter().map(|b| (b.name().to_string(), b.snapshot())).collect()
    }
}
