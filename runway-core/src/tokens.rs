//! Token estimation and usage history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::defaults;

/// Heuristic characters-per-token ratio
const CHARS_PER_TOKEN: usize = 4;

/// How an estimate was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    Heuristic,
}

/// Token estimate for one piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub tokens: u32,
    pub characters: usize,
    pub method: EstimationMethod,
}

/// Independent estimates for a request's prompt and context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEstimate {
    pub prompt: TokenEstimate,
    pub context: TokenEstimate,
    pub total: u32,
}

/// `ceil(chars / 4)` over Unicode scalar values.
///
/// Text outside the Basic Multilingual Plane (most emoji) counts one
/// character per scalar here, where a UTF-16 length would count two.
pub fn estimate(text: &str) -> TokenEstimate {
    let characters = text.chars().count();
    let tokens = characters.div_ceil(CHARS_PER_TOKEN);
    TokenEstimate {
        tokens: u32::try_from(tokens).unwrap_or(u32::MAX),
        characters,
        method: EstimationMethod::Heuristic,
    }
}

pub fn estimate_for_request(prompt: &str, context: &str) -> RequestEstimate {
    let prompt = estimate(prompt);
    let context = estimate(context);
    RequestEstimate {
        prompt,
        context,
        total: prompt.tokens.saturating_add(context.tokens),
    }
}

/// One tracked request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub context: u32,
    pub total: u32,
    pub timestamp: DateTime<Utc>,
}

impl From<&RequestEstimate> for TokenUsage {
    fn from(estimate: &RequestEstimate) -> Self {
        Self {
            prompt: estimate.prompt.tokens,
            context: estimate.context.tokens,
            total: estimate.total,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregates over the retained history
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: usize,
    pub avg_prompt: f64,
    pub avg_context: f64,
    pub avg_total: f64,
    pub min_total: u32,
    pub max_total: u32,
}

/// Bounded FIFO history of request sizes.
///
/// Appends and reads take the same lock, so stats always see whole records.
#[derive(Debug)]
pub struct UsageTracker {
    history: Mutex<VecDeque<TokenUsage>>,
    max_history_size: usize,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(defaults::USAGE_HISTORY_SIZE)
    }
}

impl UsageTracker {
    pub fn new(max_history_size: usize) -> Self {
        let max_history_size = max_history_size.max(1);
        Self {
            history: Mutex::new(VecDeque::with_capacity(max_history_size.min(1024))),
            max_history_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_history_size
    }

    /// Estimate a request and record it
    pub fn track(&self, prompt: &str, context: &str) -> RequestEstimate {
        let estimate = estimate_for_request(prompt, context);
        self.record(TokenUsage::from(&estimate));
        estimate
    }

    /// Append a record, evicting the oldest when full
    pub fn record(&self, usage: TokenUsage) {
        let mut history = self.lock();
        history.push_back(usage);
        while history.len() > self.max_history_size {
            history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained records, oldest first
    pub fn history(&self) -> Vec<TokenUsage> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> UsageStats {
        let history = self.lock();
        let count = history.len();
        if count == 0 {
            return UsageStats::default();
        }

        let (mut prompt, mut context, mut total) = (0u64, 0u64, 0u64);
        let mut min_total = u32::MAX;
        let mut max_total = 0;
        for usage in history.iter() {
            prompt += u64::from(usage.prompt);
            context += u64::from(usage.context);
            total += u64::from(usage.total);
            min_total = min_total.min(usage.total);
            max_total = max_total.max(usage.total);
        }

        let n = count as f64;
        UsageStats {
            total_requests: count,
            avg_prompt: prompt as f64 / n,
            avg_context: context as f64 / n,
            avg_total: total as f64 / n,
            min_total,
            max_total,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TokenUsage>> {
        self.history.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("usage history lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
