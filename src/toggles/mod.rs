//! Runtime feature toggles
//!
//! The store holds an immutable, versioned snapshot behind a lock. Updates
//! build a new snapshot from the current one and swap it in while holding
//! the write lock, so readers observe either the old or the new value and
//! never a partial merge.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::context::models::BudgetStrategy;
use crate::error::Result;

/// Process-wide rollout switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub enable_context_budget: bool,
    pub enable_aggressive_mode: bool,
    pub enable_quality_monitoring: bool,
    pub default_strategy: BudgetStrategy,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            enable_context_budget: true,
            enable_aggressive_mode: false,
            enable_quality_monitoring: true,
            default_strategy: BudgetStrategy::Balanced,
        }
    }
}

fn parse_flag(val: &str) -> bool {
    let val = val.trim().to_ascii_lowercase();
    val == "true" || val == "1" || val == "yes" || val == "on"
}

impl FeatureToggles {
    /// Override with environment variables if present.
    ///
    /// An unknown `BUDGET_STRATEGY` is rejected rather than defaulted.
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(val) = std::env::var("ENABLE_CONTEXT_BUDGET") {
            self.enable_context_budget = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("ENABLE_AGGRESSIVE_BUDGET") {
            self.enable_aggressive_mode = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("ENABLE_QUALITY_MONITORING") {
            self.enable_quality_monitoring = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("BUDGET_STRATEGY") {
            self.default_strategy = val.parse()?;
        }
        Ok(self)
    }

    fn merged(&self, update: &FeatureToggleUpdate) -> Self {
        Self {
            enable_context_budget: update
                .enable_context_budget
                .unwrap_or(self.enable_context_budget),
            enable_aggressive_mode: update
                .enable_aggressive_mode
                .unwrap_or(self.enable_aggressive_mode),
            enable_quality_monitoring: update
                .enable_quality_monitoring
                .unwrap_or(self.enable_quality_monitoring),
            default_strategy: update.default_strategy.unwrap_or(self.default_strategy),
        }
    }
}

/// Partial update; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggleUpdate {
    #[serde(default)]
    pub enable_context_budget: Option<bool>,
    #[serde(default)]
    pub enable_aggressive_mode: Option<bool>,
    #[serde(default)]
    pub enable_quality_monitoring: Option<bool>,
    #[serde(default)]
    pub default_strategy: Option<BudgetStrategy>,
}

/// Committed configuration with its version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSnapshot {
    pub version: u64,
    pub toggles: FeatureToggles,
}

/// Versioned toggle store, injected into request handlers
#[derive(Debug)]
pub struct FeatureToggleStore {
    current: RwLock<Arc<ToggleSnapshot>>,
}

impl FeatureToggleStore {
    pub fn new(toggles: FeatureToggles) -> Self {
        Self {
            current: RwLock::new(Arc::new(ToggleSnapshot {
                version: 0,
                toggles,
            })),
        }
    }

    /// Latest committed snapshot
    pub fn read(&self) -> Arc<ToggleSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Merge a partial update atomically and return the new snapshot
    pub fn update(&self, update: &FeatureToggleUpdate) -> Arc<ToggleSnapshot> {
        let mut current = self.current.write();
        let next = Arc::new(ToggleSnapshot {
            version: current.version + 1,
            toggles: current.toggles.merged(update),
        });
        *current = Arc::clone(&next);
        drop(current);

        info!(
            version = next.version,
            enable_context_budget = next.toggles.enable_context_budget,
            enable_aggressive_mode = next.toggles.enable_aggressive_mode,
            enable_quality_monitoring = next.toggles.enable_quality_monitoring,
            default_strategy = %next.toggles.default_strategy,
            "Feature toggles updated"
        );
        next
    }
}

impl Default for FeatureToggleStore {
    fn default() -> Self {
        Self::new(FeatureToggles::default())
    }
}
