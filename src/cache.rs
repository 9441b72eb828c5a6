//! Shared result cache
//!
//! Page models and metric estimates are memoized by a SHA-256 fingerprint of
//! the inputs that produced them. Entries are shared futures: concurrent
//! requests for the same key await one computation instead of racing to
//! build their own. CPU-bound work runs on the blocking pool. A computation
//! whose blocking task was aborted is evicted so the next caller retries it.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use ring::digest::{Context, SHA256};
use serde::Serialize;

use crate::config::LanternSettings;
use crate::engine::{LanternEngine, PageModel};
use crate::metrics::{self, LanternReport, Metric, MetricEstimate, MetricOutcome};
use crate::network::NetworkLog;
use crate::trace::Trace;
use crate::utils::{LanternError, Result};

type SharedResult<T> = Shared<BoxFuture<'static, Result<Arc<T>>>>;

/// SHA-256 digest identifying a set of inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn builder() -> FingerprintBuilder {
        FingerprintBuilder {
            context: Context::new(&SHA256),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Digests the canonical JSON encoding of each part, in order
pub struct FingerprintBuilder {
    context: Context,
}

impl FingerprintBuilder {
    pub fn part<T: Serialize + ?Sized>(mut self, part: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(part).map_err(|e| LanternError::InvalidSettings {
            reason: format!("cannot fingerprint input: {}", e),
        })?;
        // length prefix keeps part boundaries unambiguous
        self.context.update(&(bytes.len() as u64).to_le_bytes());
        self.context.update(&bytes);
        Ok(self)
    }

    pub fn finish(self) -> Fingerprint {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(self.context.finish().as_ref());
        Fingerprint(digest)
    }
}

/// A trace and network log, fingerprinted once
#[derive(Debug, Clone)]
pub struct PageInputs {
    trace: Arc<Trace>,
    log: Arc<NetworkLog>,
    fingerprint: Fingerprint,
}

impl PageInputs {
    pub fn new(trace: Trace, log: NetworkLog) -> Result<Self> {
        let fingerprint = Fingerprint::builder().part(&trace)?.part(&log)?.finish();
        Ok(Self {
            trace: Arc::new(trace),
            log: Arc::new(log),
            fingerprint,
        })
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn log(&self) -> &NetworkLog {
        &self.log
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Page inputs, settings, metric
type MetricKey = (Fingerprint, Fingerprint, Metric);

struct ContextInner {
    engine: LanternEngine,
    settings_fingerprint: Fingerprint,
    pages: Mutex<HashMap<Fingerprint, SharedResult<PageModel>>>,
    metrics: Mutex<HashMap<MetricKey, SharedResult<MetricEstimate>>>,
}

/// Audit context sharing page models and estimates across callers
///
/// Cloning is cheap; clones share one cache.
#[derive(Clone)]
pub struct LanternContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for LanternContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanternContext")
            .field("settings", &self.inner.settings_fingerprint)
            .field("pages", &self.cached_pages())
            .field("metrics", &self.cached_metrics())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // entries are only ever inserted whole
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop `key` if it still maps to `shared` and the result was an aborted task
fn evict_aborted<K: Eq + Hash, T>(
    entries: &Mutex<HashMap<K, SharedResult<T>>>,
    key: &K,
    shared: &SharedResult<T>,
    result: &Result<Arc<T>>,
) {
    if !matches!(result, Err(LanternError::TaskAborted { .. })) {
        return;
    }
    let mut entries = lock(entries);
    if entries.get(key).is_some_and(|entry| entry.ptr_eq(shared)) {
        log::debug!("evicting aborted computation");
        entries.remove(key);
    }
}

impl LanternContext {
    pub fn new(engine: LanternEngine) -> Result<Self> {
        let settings_fingerprint = Fingerprint::builder().part(engine.settings())?.finish();
        Ok(Self {
            inner: Arc::new(ContextInner {
                engine,
                settings_fingerprint,
                pages: Mutex::new(HashMap::new()),
                metrics: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn with_settings(settings: LanternSettings) -> Result<Self> {
        settings.validate()?;
        Self::new(LanternEngine::new(settings))
    }

    pub fn engine(&self) -> &LanternEngine {
        &self.inner.engine
    }

    pub fn cached_pages(&self) -> usize {
        lock(&self.inner.pages).len()
    }

    pub fn cached_metrics(&self) -> usize {
        lock(&self.inner.metrics).len()
    }

    /// Drop every cached entry; in-flight computations finish for their waiters
    pub fn clear(&self) {
        lock(&self.inner.pages).clear();
        lock(&self.inner.metrics).clear();
    }

    /// The page model for these inputs, built at most once
    pub async fn page(&self, inputs: &PageInputs) -> Result<Arc<PageModel>> {
        let shared = lock(&self.inner.pages)
            .entry(inputs.fingerprint)
            .or_insert_with(|| {
                log::debug!("building page model {}", inputs.fingerprint);
                let inner = Arc::clone(&self.inner);
                let inputs = inputs.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        inner.engine.build_page(&inputs.trace, &inputs.log).map(Arc::new)
                    })
                    .await?
                }
                .boxed()
                .shared()
            })
            .clone();
        let result = shared.clone().await;
        evict_aborted(&self.inner.pages, &inputs.fingerprint, &shared, &result);
        result
    }

    /// One metric's estimate for these inputs, computed at most once
    pub fn metric(&self, inputs: &PageInputs, metric: Metric) -> BoxFuture<'static, Result<Arc<MetricEstimate>>> {
        self.resolve(inputs, metric, Vec::new())
    }

    fn resolve(
        &self,
        inputs: &PageInputs,
        metric: Metric,
        mut resolving: Vec<Metric>,
    ) -> BoxFuture<'static, Result<Arc<MetricEstimate>>> {
        if resolving.contains(&metric) {
            let err = LanternError::InvalidSettings {
                reason: format!("{} depends on itself", metric.as_str()),
            };
            return futures::future::ready(Err(err)).boxed();
        }
        resolving.push(metric);

        let key = (inputs.fingerprint, self.inner.settings_fingerprint, metric);
        let shared = lock(&self.inner.metrics)
            .entry(key)
            .or_insert_with(|| {
                let context = self.clone();
                let inputs = inputs.clone();
                async move {
                    let strategy = context.engine().strategy(metric)?.clone();
                    let page = context.page(&inputs).await?;
                    let mut dependencies = Vec::with_capacity(strategy.requires.len());
                    for required in strategy.requires {
                        dependencies.push(context.resolve(&inputs, *required, resolving.clone()).await?);
                    }

                    let inner = Arc::clone(&context.inner);
                    tokio::task::spawn_blocking(move || {
                        let dependencies: Vec<&MetricEstimate> = dependencies.iter().map(AsRef::as_ref).collect();
                        metrics::estimate(&strategy, &page, inner.engine.settings(), &dependencies).map(Arc::new)
                    })
                    .await?
                }
                .boxed()
                .shared()
            })
            .clone();
        let inner = Arc::clone(&self.inner);
        async move {
            let result = shared.clone().await;
            evict_aborted(&inner.metrics, &key, &shared, &result);
            result
        }
        .boxed()
    }

    /// Estimate every configured metric
    ///
    /// Errors building the page model fail the whole report; metric errors
    /// are recorded per metric.
    pub async fn report(&self, inputs: &PageInputs) -> Result<LanternReport> {
        self.page(inputs).await?;

        let requested = self.engine().settings().metrics.clone();
        let outcomes = futures::future::join_all(requested.iter().map(|m| self.metric(inputs, *m))).await;

        let mut report = LanternReport::default();
        for (metric, outcome) in requested.into_iter().zip(outcomes) {
            match &outcome {
                Err(err) if err.is_fatal_to_page() => log::error!("{} not estimated: {}", metric.as_str(), err),
                Err(err) => log::warn!("{} not estimated: {}", metric.as_str(), err),
                Ok(_) => {}
            }
            report
                .metrics
                .insert(metric, MetricOutcome::from(outcome.map(|e| MetricEstimate::clone(&e))));
        }
        Ok(report)
    }
}
