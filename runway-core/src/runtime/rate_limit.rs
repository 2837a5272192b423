//! Sliding-window rate limiter shared by concurrent requests.

use crate::config::{RateLimitConfig, RateLimitScope};
use crate::error::RuntimeError;
use crate::types::ModelRef;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const GLOBAL_SCOPE: &str = "*";

/// Counts attempt starts per scope over a rolling window.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// The counter a model's attempts are charged to
    pub fn scope_key(&self, model: &ModelRef) -> String {
        match self.config.scope {
            RateLimitScope::Model => model.key(),
            RateLimitScope::Provider => model.provider.clone(),
            RateLimitScope::Global => GLOBAL_SCOPE.to_string(),
        }
    }

    /// Take a slot if one is free, else return how long until one frees up
    pub fn try_acquire(&self, model: &ModelRef) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let window = self.config.window();
        let now = Instant::now();
        let mut calls = self.windows.entry(self.scope_key(model)).or_default();

        while calls.front().is_some_and(|&start| start + window <= now) {
            calls.pop_front();
        }

        if calls.len() < self.config.max_calls as usize {
            calls.push_back(now);
            return Ok(());
        }

        let oldest = calls.front().copied().unwrap_or(now);
        Err((oldest + window).saturating_duration_since(now))
    }

    /// Wait for a slot, giving up after `max_wait` or on cancellation
    pub async fn acquire(
        &self,
        model: &ModelRef,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + max_wait;

        loop {
            let wait = match self.try_acquire(model) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            if Instant::now() + wait > deadline {
                return Err(RuntimeError::RateLimited {
                    scope: self.scope_key(model),
                    retry_in: wait,
                });
            }

            tracing::debug!(scope = %self.scope_key(model), wait_ms = wait.as_millis() as u64, "waiting for rate limit slot");

            tokio::select! {
                _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Calls currently counted in the window for the model's scope
    pub fn current(&self, model: &ModelRef) -> usize {
        let window = self.config.window();
        let now = Instant::now();
        self.windows.get(&self.scope_key(model)).map_or(0, |calls| {
            calls.iter().filter(|&&start| start + window > now).count()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitMode;
    use std::sync::Arc;

    fn limiter(max_calls: u32, window_ms: u64, scope: RateLimitScope) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            window_ms,
            max_calls,
            scope,
            mode: RateLimitMode::Skip,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturates_then_rolls_over() {
        let rl = limiter(2, 1_000, RateLimitScope::Model);
        let gpt = ModelRef::new("openai", "gpt-4o");

        assert!(rl.try_acquire(&gpt).is_ok());
        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(rl.try_acquire(&gpt).is_ok());

        let wait = rl.try_acquire(&gpt).unwrap_err();
        assert_eq!(wait, Duration::from_millis(600));
        assert_eq!(rl.current(&gpt), 2);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(rl.current(&gpt), 1);
        assert!(rl.try_acquire(&gpt).is_ok());
    }

    #[test]
    fn test_scopes() {
        let gpt = ModelRef::new("openai", "gpt-4o");
        let mini = ModelRef::new("openai", "gpt-4o-mini");
        let gemini = ModelRef::new("google", "gemini-2.5-flash");

        let per_model = limiter(1, 60_000, RateLimitScope::Model);
        assert!(per_model.try_acquire(&gpt).is_ok());
        assert!(per_model.try_acquire(&mini).is_ok());

        let per_provider = limiter(1, 60_000, RateLimitScope::Provider);
        assert!(per_provider.try_acquire(&gpt).is_ok());
        assert!(per_provider.try_acquire(&mini).is_err());
        assert!(per_provider.try_acquire(&gemini).is_ok());

        let global = limiter(1, 60_000, RateLimitScope::Global);
        assert!(global.try_acquire(&gpt).is_ok());
        assert!(global.try_acquire(&gemini).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_slot() {
        let rl = limiter(1, 1_000, RateLimitScope::Model);
        let gpt = ModelRef::new("openai", "gpt-4o");
        let cancel = CancellationToken::new();

        rl.try_acquire(&gpt).unwrap();
        let start = Instant::now();
        rl.acquire(&gpt, Duration::from_secs(5), &cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_gives_up_past_deadline() {
        let rl = limiter(1, 10_000, RateLimitScope::Model);
        let gpt = ModelRef::new("openai", "gpt-4o");
        let cancel = CancellationToken::new();

        rl.try_acquire(&gpt).unwrap();
        let err = rl
            .acquire(&gpt, Duration::from_secs(1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_honours_cancellation() {
        let rl = limiter(1, 10_000, RateLimitScope::Model);
        let gpt = ModelRef::new("openai", "gpt-4o");
        let cancel = CancellationToken::new();

        rl.try_acquire(&gpt).unwrap();
        cancel.cancel();
        let err = rl
            .acquire(&gpt, Duration::from_secs(60), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_disabled_limiter_always_admits() {
        let rl = RateLimiter::new(RateLimitConfig {
            enabled: false,
            max_calls: 1,
            ..Default::default()
        });
        let gpt = ModelRef::new("openai", "gpt-4o");
        for _ in 0..10 {
            assert!(rl.try_acquire(&gpt).is_ok());
        }
    }

    #[test]
    fn test_concurrent_acquire_never_oversubscribes() {
        let rl = Arc::new(limiter(100, 60_000, RateLimitScope::Global));
        let gpt = ModelRef::new("openai", "gpt-4o");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                let gpt = gpt.clone();
                std::thread::spawn(move || (0..50).filter(|_| rl.try_acquire(&gpt).is_ok()).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
    }
}
