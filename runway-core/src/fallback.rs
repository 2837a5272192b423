//! Fallback chain construction.
//!
//! Both strategies are pure functions of `(primary, config, catalog)` and run
//! the same post-processing pipeline: provider allow list, provider deny list,
//! dedupe by `provider:model` keeping the first occurrence, then truncation.

use crate::catalog::{CatalogEntry, ModelCatalog};
use crate::config::{default_fallbacks, FallbackChainConfig};
use crate::types::ModelRef;
use std::collections::HashSet;
use std::sync::Arc;

/// Builds ordered, duplicate-free candidate lists.
#[derive(Clone)]
pub struct FallbackChainBuilder {
    catalog: Arc<dyn ModelCatalog>,
    builtin_fallbacks: Vec<ModelRef>,
}

impl std::fmt::Debug for FallbackChainBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChainBuilder")
            .field("builtin_fallbacks", &self.builtin_fallbacks)
            .finish_non_exhaustive()
    }
}

impl FallbackChainBuilder {
    pub fn new(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            catalog,
            builtin_fallbacks: default_fallbacks(),
        }
    }

    /// Replace the list used when a config names no fallbacks at all
    pub fn with_builtin_fallbacks(mut self, fallbacks: Vec<ModelRef>) -> Self {
        self.builtin_fallbacks = fallbacks;
        self
    }

    /// Primary, then explicit fallbacks, else configured defaults, else built-ins.
    pub fn build_chain(&self, primary: &ModelRef, config: &FallbackChainConfig) -> Vec<ModelRef> {
        let mut chain = vec![primary.clone()];

        match config.explicit_fallbacks.as_deref() {
            Some(explicit) if !explicit.is_empty() => chain.extend_from_slice(explicit),
            _ => match config.default_fallbacks.as_deref() {
                Some(defaults) => chain.extend_from_slice(defaults),
                None => chain.extend_from_slice(&self.builtin_fallbacks),
            },
        }

        finalize(chain, config)
    }

    /// Primary, then same-provider models by quality tier, then (unless
    /// disabled) every other provider's models by quality tier.
    pub fn build_chain_with_provider_preference(
        &self,
        primary: &ModelRef,
        config: &FallbackChainConfig,
    ) -> Vec<ModelRef> {
        let entries = self.catalog.entries();

        let (mut same, mut other): (Vec<CatalogEntry>, Vec<CatalogEntry>) = entries
            .into_iter()
            .partition(|e| e.model.provider == primary.provider);

        // sort_by_key is stable, so ties keep catalog order
        same.sort_by_key(|e| e.characteristics.quality_tier.rank());

        let mut chain = vec![primary.clone()];
        chain.extend(same.into_iter().map(|e| e.model));

        if config.cross_provider_fallback != Some(false) {
            other.sort_by_key(|e| e.characteristics.quality_tier.rank());
            chain.extend(other.into_iter().map(|e| e.model));
        }

        finalize(chain, config)
    }
}

fn finalize(chain: Vec<ModelRef>, config: &FallbackChainConfig) -> Vec<ModelRef> {
    let allowed = config.allowed_providers.as_deref();
    let excluded = config.excluded_providers.as_deref();
    let mut seen = HashSet::new();

    let mut chain: Vec<ModelRef> = chain
        .into_iter()
        .filter(|m| allowed.map_or(true, |list| list.iter().any(|p| *p == m.provider)))
        .filter(|m| excluded.map_or(true, |list| !list.iter().any(|p| *p == m.provider)))
        .filter(|m| seen.insert(m.key()))
        .collect();

    if let Some(max) = config.max_chain_length {
        chain.truncate(max);
    }
    chain
}
