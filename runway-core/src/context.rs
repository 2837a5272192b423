//! Context window resolution.
//!
//! Priority, first match wins:
//! 1. flat override keyed by `provider:model`
//! 2. nested override keyed by provider then model
//! 3. the catalog entry, when the model is registered
//! 4. the configured default, else [`defaults::CONTEXT_WINDOW`]
//!
//! The agent cap is applied afterwards and never changes `source`.

use crate::catalog::ModelCatalog;
use crate::config::{defaults, ContextWindowConfig};
use crate::types::ModelRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which rule produced the window, before any agent cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextWindowSource {
    Config,
    Catalog,
    AgentCap,
    Default,
}

/// Effective token budget for one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindowResolution {
    pub context_window: u32,
    pub source: ContextWindowSource,
    pub capped_by_agent: bool,
}

/// Resolves context windows against an injected catalog.
#[derive(Clone)]
pub struct ContextWindowResolver {
    catalog: Arc<dyn ModelCatalog>,
}

impl std::fmt::Debug for ContextWindowResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextWindowResolver").finish_non_exhaustive()
    }
}

impl ContextWindowResolver {
    pub fn new(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve the window for `model`. Pure: no I/O, no caching.
    pub fn resolve(&self, model: &ModelRef, config: &ContextWindowConfig) -> ContextWindowResolution {
        resolve(model, config, self.catalog.as_ref())
    }
}

/// Free-function form of [`ContextWindowResolver::resolve`]
pub fn resolve(
    model: &ModelRef,
    config: &ContextWindowConfig,
    catalog: &dyn ModelCatalog,
) -> ContextWindowResolution {
    let (window, source) = base_window(model, config, catalog);

    match config.agent_context_token_cap {
        Some(cap) if cap > 0 && window > cap => ContextWindowResolution {
            context_window: cap,
            source,
            capped_by_agent: true,
        },
        _ => ContextWindowResolution {
            context_window: window,
            source,
            capped_by_agent: false,
        },
    }
}

fn base_window(
    model: &ModelRef,
    config: &ContextWindowConfig,
    catalog: &dyn ModelCatalog,
) -> (u32, ContextWindowSource) {
    if let Some(&window) = config.overrides.get(&model.key()).filter(|w| **w > 0) {
        return (window, ContextWindowSource::Config);
    }

    if let Some(&window) = config
        .provider_overrides
        .get(&model.provider)
        .and_then(|models| models.get(&model.model))
        .filter(|w| **w > 0)
    {
        return (window, ContextWindowSource::Config);
    }

    // Membership decides, not the value: a cataloged model may share the default's number.
    if let Some(entry) = catalog.get(model) {
        return (entry.context_window, ContextWindowSource::Catalog);
    }

    let window = config
        .default_context_window
        .filter(|w| *w > 0)
        .unwrap_or(defaults::CONTEXT_WINDOW);
    (window, ContextWindowSource::Default)
}
