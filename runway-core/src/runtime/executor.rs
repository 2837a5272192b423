//! CascadingExecutor implementation.
//!
//! The executor resolves budgets, builds a fallback chain and walks it one
//! candidate at a time. Candidates are never attempted in parallel, so a
//! request is billed by at most one backend at a time.

use crate::catalog::ModelCatalog;
use crate::config::{FallbackChainConfig, RateLimitMode, RuntimeConfig};
use crate::context::{ContextWindowResolution, ContextWindowResolver};
use crate::error::{AttemptFailure, RuntimeError};
use crate::fallback::FallbackChainBuilder;
use crate::provider::{ChunkStream, Provider};
use crate::runtime::circuit_breaker::CircuitBreakerRegistry;
use crate::runtime::rate_limit::RateLimiter;
use crate::tokens::{RequestEstimate, UsageStats, UsageTracker};
use crate::types::*;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Type-erased provider that can be shared across threads
type BoxedProvider = Arc<dyn Provider>;

/// How the candidate list is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChainStrategy {
    /// Primary, then explicit / default fallbacks
    #[default]
    Configured,
    /// Primary, then catalog models ordered by provider and quality tier
    ProviderPreference,
}

/// Per-call options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub model: Option<ModelRef>,
    pub fallback: Option<FallbackChainConfig>,
    pub strategy: ChainStrategy,
    pub cancel: CancellationToken,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route to this model first
    pub fn model(mut self, model: ModelRef) -> Self {
        self.model = Some(model);
        self
    }

    /// Use this chain config instead of the executor's
    pub fn fallback(mut self, fallback: FallbackChainConfig) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn strategy(mut self, strategy: ChainStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Cancellation signal spanning the whole cascade
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A successful cascade
#[derive(Debug)]
pub struct Execution {
    pub response: RuntimeResponse,
    /// Chain candidates walked, including the one that served
    pub attempts: usize,
    /// Candidates passed over before success
    pub failures: Vec<AttemptFailure>,
}

impl Execution {
    pub fn served_by(&self) -> &ModelRef {
        &self.response.model
    }
}

/// A cascade that ended in an established stream
pub struct StreamExecution {
    pub stream: Box<ChunkStream>,
    pub model: ModelRef,
    pub attempts: usize,
    pub failures: Vec<AttemptFailure>,
}

impl std::fmt::Debug for StreamExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamExecution")
            .field("model", &self.model)
            .field("attempts", &self.attempts)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

/// Builder for the executor's composition root.
///
/// ```ignore
/// let executor = CascadingExecutor::builder(Arc::new(StaticCatalog::builtin()))
///     .config(RuntimeConfig::from_env()?)
///     .provider("google", LoggingLayer::new().layer(gemini))
///     .provider("azure", azure)
///     .finish();
/// ```
pub struct CascadingExecutorBuilder {
    catalog: Arc<dyn ModelCatalog>,
    config: RuntimeConfig,
    providers: HashMap<String, BoxedProvider>,
}

impl CascadingExecutorBuilder {
    pub fn new(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            catalog,
            config: RuntimeConfig::default(),
            providers: HashMap::new(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the adapter serving every model of `provider`
    pub fn provider<P: Provider>(mut self, provider: impl Into<String>, adapter: P) -> Self {
        self.providers.insert(provider.into(), Arc::new(adapter));
        self
    }

    /// Register an already shared adapter
    pub fn shared_provider(mut self, provider: impl Into<String>, adapter: BoxedProvider) -> Self {
        self.providers.insert(provider.into(), adapter);
        self
    }

    /// Finish building and create a CascadingExecutor
    pub fn finish(self) -> CascadingExecutor {
        let config = self.config;
        CascadingExecutor {
            providers: self.providers,
            resolver: ContextWindowResolver::new(self.catalog.clone()),
            chain_builder: FallbackChainBuilder::new(self.catalog),
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            usage: UsageTracker::new(config.usage_history_size),
            config,
        }
    }
}

/// Routes requests across a fallback chain of models.
pub struct CascadingExecutor {
    providers: HashMap<String, BoxedProvider>,
    resolver: ContextWindowResolver,
    chain_builder: FallbackChainBuilder,
    breakers: CircuitBreakerRegistry,
    limiter: RateLimiter,
    usage: UsageTracker,
    config: RuntimeConfig,
}

impl std::fmt::Debug for CascadingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("CascadingExecutor")
            .field("providers", &providers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A candidate that passed every pre-flight check
struct Prepared<'a> {
    provider: BoxedProvider,
    request: RuntimeRequest,
    permit: BreakerPermit<'a>,
}

/// Breaker admission for one attempt.
///
/// Dropping it without recording an outcome hands a half-open trial slot
/// back, so a skipped or cancelled attempt never wedges the breaker.
struct BreakerPermit<'a> {
    breakers: &'a CircuitBreakerRegistry,
    key: String,
    settled: bool,
}

impl BreakerPermit<'_> {
    fn success(mut self) {
        self.settled = true;
        self.breakers.record_success(&self.key);
    }

    fn failure(mut self) -> bool {
        self.settled = true;
        self.breakers.record_failure(&self.key)
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breakers.release(&self.key);
        }
    }
}

impl CascadingExecutor {
    /// Create a new builder
    pub fn builder(catalog: Arc<dyn ModelCatalog>) -> CascadingExecutorBuilder {
        CascadingExecutorBuilder::new(catalog)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.usage.stats()
    }

    /// Effective context window for a model under the executor's config
    pub fn resolve_context_window(&self, model: &ModelRef) -> ContextWindowResolution {
        self.resolver.resolve(model, &self.config.context)
    }

    /// The chain a call with these options would walk
    pub fn chain_for(&self, options: &ExecuteOptions) -> Vec<ModelRef> {
        let primary = options
            .model
            .as_ref()
            .unwrap_or(&self.config.default_model);
        let fallback = options.fallback.as_ref().unwrap_or(&self.config.fallback);

        match options.strategy {
            ChainStrategy::Configured => self.chain_builder.build_chain(primary, fallback),
            ChainStrategy::ProviderPreference => self
                .chain_builder
                .build_chain_with_provider_preference(primary, fallback),
        }
    }

    /// Run a request, falling back across the chain until one model succeeds
    pub async fn execute(
        &self,
        req: &RuntimeRequest,
        options: ExecuteOptions,
    ) -> Result<Execution, RuntimeError> {
        let (response, model, attempts, failures) = self
            .cascade(req, &options, |provider, request, model, cancel| async move {
                provider.call(&request, &model, &cancel).await
            })
            .await?;

        let mut response = response;
        response.model = model;
        Ok(Execution {
            response,
            attempts,
            failures,
        })
    }

    /// Like [`execute`](Self::execute), but returns a chunk stream.
    ///
    /// An attempt succeeds once the backend accepts the request. Errors
    /// after that point are delivered through the stream and never re-route.
    pub async fn execute_stream(
        &self,
        req: &RuntimeRequest,
        options: ExecuteOptions,
    ) -> Result<StreamExecution, RuntimeError> {
        let (stream, model, attempts, failures) = self
            .cascade(req, &options, |provider, request, model, cancel| async move {
                provider.stream(&request, &model, &cancel).await
            })
            .await?;

        Ok(StreamExecution {
            stream,
            model,
            attempts,
            failures,
        })
    }

    async fn cascade<T, F, Fut>(
        &self,
        req: &RuntimeRequest,
        options: &ExecuteOptions,
        attempt: F,
    ) -> Result<(T, ModelRef, usize, Vec<AttemptFailure>), RuntimeError>
    where
        F: Fn(BoxedProvider, RuntimeRequest, ModelRef, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, RuntimeError>>,
    {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("cascade", %request_id);

        async move {
            let cancel = &options.cancel;
            let estimate = self.usage.track(&req.prompt, &req.context);
            let chain = self.chain_for(options);

            if chain.is_empty() {
                return Err(RuntimeError::configuration(
                    "fallback chain is empty after provider filtering",
                ));
            }

            debug!(
                chain = ?chain.iter().map(ModelRef::key).collect::<Vec<_>>(),
                input_tokens = estimate.total,
                "fallback chain built"
            );

            let mut failures = Vec::new();

            for (index, model) in chain.iter().enumerate() {
                if cancel.is_cancelled() {
                    info!("request cancelled before next candidate");
                    return Err(RuntimeError::Cancelled);
                }

                let key = model.key();
                let Prepared {
                    provider,
                    request,
                    permit,
                } = match self.prepare(req, model, &estimate) {
                    Ok(prepared) => prepared,
                    Err(e) => {
                        info!(model = %key, reason = %e, "skipping candidate");
                        failures.push(AttemptFailure {
                            model: model.clone(),
                            error: e,
                        });
                        continue;
                    }
                };

                if let Err(e) = self.admit(model, cancel).await {
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    info!(model = %key, reason = %e, "skipping candidate");
                    failures.push(AttemptFailure {
                        model: model.clone(),
                        error: e,
                    });
                    continue;
                }

                let start = std::time::Instant::now();
                let timeout = self.config.attempt_timeout();
                let call = attempt(
                    provider,
                    request,
                    model.clone(),
                    cancel.clone(),
                );

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
                    outcome = tokio::time::timeout(timeout, call) => match outcome {
                        Ok(result) => result,
                        Err(_) => Err(RuntimeError::timeout(format!(
                            "{} did not respond within {:?}",
                            key, timeout
                        ))),
                    },
                };

                match result {
                    Ok(value) => {
                        permit.success();
                        debug!(
                            model = %key,
                            attempts = index + 1,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "candidate succeeded"
                        );
                        return Ok((value, model.clone(), index + 1, failures));
                    }
                    Err(e) if e.is_cancelled() => {
                        info!(model = %key, "request cancelled mid-attempt");
                        return Err(e);
                    }
                    Err(e) => {
                        if e.trips_breaker() {
                            permit.failure();
                        }
                        warn!(
                            model = %key,
                            status = ?e.status(),
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            error = %e,
                            "candidate failed"
                        );
                        failures.push(AttemptFailure {
                            model: model.clone(),
                            error: e,
                        });
                    }
                }
            }

            error!(attempts = failures.len(), "fallback chain exhausted");
            Err(RuntimeError::ChainExhausted { failures })
        }
        .instrument(span)
        .await
    }

    /// Static checks that need no network: adapter, credentials, budget, breaker
    fn prepare(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        estimate: &RequestEstimate,
    ) -> Result<Prepared<'_>, RuntimeError> {
        let provider = self
            .providers
            .get(&model.provider)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownProvider(model.provider.clone()))?;

        provider.validate()?;

        let resolution = self.resolve_context_window(model);
        let available = resolution.context_window;
        // an input that fills the window leaves no output budget
        if estimate.total >= available {
            return Err(RuntimeError::ContextOverflow {
                model: model.key(),
                required: estimate.total,
                available,
            });
        }

        let key = model.key();
        self.breakers
            .check(&key)
            .map_err(|retry_in| RuntimeError::CircuitOpen {
                model: key.clone(),
                retry_in,
            })?;
        let permit = BreakerPermit {
            breakers: &self.breakers,
            key,
            settled: false,
        };

        let wanted = req
            .max_tokens
            .unwrap_or(self.config.default_max_output_tokens);
        let request = RuntimeRequest {
            max_tokens: Some(wanted.min(available - estimate.total)),
            ..req.clone()
        };

        Ok(Prepared {
            provider,
            request,
            permit,
        })
    }

    async fn admit(&self, model: &ModelRef, cancel: &CancellationToken) -> Result<(), RuntimeError> {
        match self.limiter.config().mode {
            RateLimitMode::Skip => {
                self.limiter
                    .try_acquire(model)
                    .map_err(|retry_in| RuntimeError::RateLimited {
                        scope: self.limiter.scope_key(model),
                        retry_in,
                    })
            }
            RateLimitMode::Wait => {
                self.limiter
                    .acquire(model, self.config.attempt_timeout(), cancel)
                    .await
            }
        }
    }
}
