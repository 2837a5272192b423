//! Model catalog.
//!
//! A read-only registry of `(provider, model)` metadata. Lookups that miss are
//! a normal outcome and return `None`; callers branch on it.

use crate::types::{Capabilities, Characteristics, ModelRef, Tier};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata for one cataloged model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub model: ModelRef,
    pub context_window: u32,
    pub capabilities: Capabilities,
    pub characteristics: Characteristics,
    pub description: String,
}

/// Lookup interface injected into the resolver and chain builder.
pub trait ModelCatalog: Send + Sync {
    /// Look up a model
    fn get(&self, model: &ModelRef) -> Option<CatalogEntry>;

    /// Explicit membership test
    fn contains(&self, model: &ModelRef) -> bool {
        self.get(model).is_some()
    }

    /// All entries in enumeration order
    fn entries(&self) -> Vec<CatalogEntry>;
}

/// Immutable catalog, indexed by `provider:model`.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl StaticCatalog {
    /// Build a catalog. A later entry with a duplicate key is ignored.
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            let key = entry.model.key();
            if entry.context_window == 0 || catalog.index.contains_key(&key) {
                tracing::warn!(model = %key, "skipping invalid or duplicate catalog entry");
                continue;
            }
            catalog.index.insert(key, catalog.entries.len());
            catalog.entries.push(entry);
        }
        catalog
    }

    /// The built-in catalog shipped with the runtime
    pub fn builtin() -> Self {
        Self::new(builtin_entries())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Models registered for one provider, in enumeration order
    pub fn models_for(&self, provider: &str) -> Vec<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| e.model.provider == provider)
            .collect()
    }

    /// Distinct providers, in order of first appearance
    pub fn providers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.model.provider.as_str()) {
                seen.push(entry.model.provider.as_str());
            }
        }
        seen
    }
}

impl ModelCatalog for StaticCatalog {
    fn get(&self, model: &ModelRef) -> Option<CatalogEntry> {
        self.index
            .get(&model.key())
            .map(|&i| self.entries[i].clone())
    }

    fn contains(&self, model: &ModelRef) -> bool {
        self.index.contains_key(&model.key())
    }

    fn entries(&self) -> Vec<CatalogEntry> {
        self.entries.clone()
    }
}

/// A catalog that can be replaced wholesale while readers keep working.
///
/// Readers see either the old or the new catalog, never a mix.
#[derive(Debug)]
pub struct SharedCatalog {
    inner: ArcSwap<StaticCatalog>,
}

impl SharedCatalog {
    pub fn new(catalog: StaticCatalog) -> Self {
        Self {
            inner: ArcSwap::from_pointee(catalog),
        }
    }

    /// Replace the whole catalog
    pub fn reload(&self, catalog: StaticCatalog) {
        tracing::info!(models = catalog.len(), "reloading model catalog");
        self.inner.store(Arc::new(catalog));
    }

    /// Current catalog snapshot
    pub fn snapshot(&self) -> Arc<StaticCatalog> {
        self.inner.load_full()
    }
}

impl ModelCatalog for SharedCatalog {
    fn get(&self, model: &ModelRef) -> Option<CatalogEntry> {
        self.inner.load().get(model)
    }

    fn contains(&self, model: &ModelRef) -> bool {
        self.inner.load().contains(model)
    }

    fn entries(&self) -> Vec<CatalogEntry> {
        self.inner.load().entries()
    }
}

fn entry(
    provider: &str,
    model: &str,
    context_window: u32,
    capabilities: Capabilities,
    (cost_tier, speed_tier, quality_tier): (Tier, Tier, Tier),
    description: &str,
) -> CatalogEntry {
    CatalogEntry {
        model: ModelRef::new(provider, model),
        context_window,
        capabilities,
        characteristics: Characteristics {
            cost_tier,
            speed_tier,
            quality_tier,
        },
        description: description.to_string(),
    }
}

const ALL: Capabilities = Capabilities {
    code: true,
    reasoning: true,
    general: true,
    vision: true,
    tools: true,
};

const TEXT: Capabilities = Capabilities {
    code: true,
    reasoning: true,
    general: true,
    vision: false,
    tools: true,
};

const FAST: Capabilities = Capabilities {
    code: true,
    reasoning: false,
    general: true,
    vision: false,
    tools: true,
};

#[rustfmt::skip]
fn builtin_entries() -> Vec<CatalogEntry> {
    use Tier::*;

    vec![
        // Anthropic
        entry("anthropic", "claude-opus-4", 200_000, ALL, (Premium, Standard, Premium), "Most capable Claude model for deep reasoning"),
        entry("anthropic", "claude-sonnet-4", 200_000, ALL, (High, High, High), "Balanced Claude model for code and general work"),
        entry("anthropic", "claude-3-5-haiku", 200_000, FAST, (Standard, Premium, Standard), "Fast, inexpensive Claude model"),
        // OpenAI
        entry("openai", "o3", 200_000, TEXT, (Premium, Standard, Premium), "OpenAI reasoning model"),
        entry("openai", "gpt-4o", 128_000, ALL, (High, High, High), "OpenAI multimodal flagship"),
        entry("openai", "gpt-4o-mini", 128_000, FAST, (Standard, Premium, Standard), "Small, fast OpenAI model"),
        // Google
        entry("google", "gemini-2.5-pro", 1_048_576, ALL, (High, Standard, Premium), "Gemini long-context reasoning model"),
        entry("google", "gemini-2.5-flash", 1_048_576, ALL, (Standard, Premium, High), "Fast Gemini model with long context"),
        // Azure OpenAI deployments
        entry("azure", "gpt-4o", 128_000, ALL, (High, High, High), "GPT-4o served from an Azure deployment"),
        entry("azure", "o4-mini", 200_000, TEXT, (Standard, High, High), "Azure-hosted reasoning model"),
        // DeepSeek
        entry("deepseek", "deepseek-reasoner", 64_000, TEXT, (Standard, Standard, High), "DeepSeek R1 reasoning model"),
        entry("deepseek", "deepseek-chat", 64_000, FAST, (Standard, High, Standard), "DeepSeek general chat model"),
    ]
}
