//! Availability of values sourced from outside the function catalog.

use crate::core::requirement::ValueRequirement;
use crate::core::target::ComputationTargetSpecification;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Answer of a [`MarketDataAvailabilityProvider`] for one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarketDataAvailability {
    /// The value can be sourced directly.
    Available,
    /// The value would be market data, but none is available.
    Missing,
    /// The value is not market data at all.
    NotAvailable,
}

/// Consulted whenever a requirement has no function candidate.
pub trait MarketDataAvailabilityProvider: Send + Sync {
    /// Availability of a requirement whose target is already resolved.
    fn availability(&self, requirement: &ValueRequirement) -> MarketDataAvailability;

    fn is_available(&self, requirement: &ValueRequirement) -> bool {
        self.availability(requirement) == MarketDataAvailability::Available
    }
}

/// No value is ever market data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMarketData;

impl MarketDataAvailabilityProvider for NoMarketData {
    fn availability(&self, _requirement: &ValueRequirement) -> MarketDataAvailability {
        MarketDataAvailability::NotAvailable
    }
}

/// Fixed availability keyed on value name and target.
#[derive(Debug, Clone, Default)]
pub struct FixedMarketDataAvailability {
    available: HashSet<(String, ComputationTargetSpecification)>,
    missing: HashSet<(String, ComputationTargetSpecification)>,
}

impl FixedMarketDataAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_available(
        mut self,
        value_name: impl Into<String>,
        target: ComputationTargetSpecification,
    ) -> Self {
        self.available.insert((value_name.into(), target));
        self
    }

    pub fn with_missing(
        mut self,
        value_name: impl Into<String>,
        target: ComputationTargetSpecification,
    ) -> Self {
        self.missing.insert((value_name.into(), target));
        self
    }
}

impl MarketDataAvailabilityProvider for FixedMarketDataAvailability {
    fn availability(&self, requirement: &ValueRequirement) -> MarketDataAvailability {
        let Some(target) = requirement.target().specification() else {
            return MarketDataAvailability::NotAvailable;
        };
        let key = (requirement.value_name().to_string(), target.clone());
        if self.available.contains(&key) {
            MarketDataAvailability::Available
        } else if self.missing.contains(&key) {
            MarketDataAvailability::Missing
        } else {
            MarketDataAvailability::NotAvailable
        }
    }
}
