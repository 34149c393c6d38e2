use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use domain::rule::RuleTableSource;
use domain::{
    DomainError, FactListener, ListenerResult, Result, RuleSet, ServiceHealth, ServiceState,
    TagChange, TagListener,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::evaluator::evaluate_all;
use crate::cache::TagCache;
use crate::lifecycle::{Service, StateCell};
use crate::observer::{ListenerId, ListenerRegistry};

type FactPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct FactWatch {
    predicate: FactPredicate,
    listener: Arc<dyn FactListener>,
}

impl FactWatch {
    /// The watched subset of `current`, if any watched fact differs from `previous`
    fn changed_subset(
        &self,
        previous: &BTreeMap<String, bool>,
        current: &BTreeMap<String, bool>,
    ) -> Option<BTreeMap<String, bool>> {
        let changed = current
            .keys()
            .chain(previous.keys())
            .filter(|name| (self.predicate)(name))
            .any(|name| previous.get(name) != current.get(name));
        changed.then(|| {
            current
                .iter()
                .filter(|(name, _)| (self.predicate)(name))
                .map(|(name, fact)| (name.clone(), *fact))
                .collect()
        })
    }
}

/// Cache listener that only wakes the evaluator; bursts coalesce into one pass
struct WakeOnChange(Arc<Notify>);

#[async_trait]
impl TagListener for WakeOnChange {
    async fn on_tag_changed(&self, _change: &TagChange) -> ListenerResult {
        self.0.notify_one();
        Ok(())
    }
}

struct EngineInner {
    rules: RwLock<Arc<RuleSet>>,
    facts: RwLock<BTreeMap<String, bool>>,
    failures: Mutex<BTreeMap<String, String>>,
    listeners: ListenerRegistry<FactWatch>,
    passes: AtomicU64,
    /// Serializes passes so listeners observe fact tables in order
    pass_lock: tokio::sync::Mutex<()>,
    init_error: Mutex<Option<String>>,
}

impl EngineInner {
    /// One full pass followed by listener delivery
    async fn run_pass(&self, cache: &TagCache) -> BTreeMap<String, bool> {
        let _pass = self.pass_lock.lock().await;
        let rules = self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let evaluation = evaluate_all(&rules, cache);

        self.log_failures(&evaluation.failures);
        let previous = std::mem::replace(
            &mut *self.facts.write().unwrap_or_else(PoisonError::into_inner),
            evaluation.facts.clone(),
        );
        self.passes.fetch_add(1, Ordering::Relaxed);

        for (name, fact) in &evaluation.facts {
            if previous.get(name) != Some(fact) {
                debug!(fact = %name, value = fact, "Fact changed");
            }
        }

        for watch in self.listeners.snapshot() {
            let Some(subset) = watch.changed_subset(&previous, &evaluation.facts) else {
                continue;
            };
            if let Err(e) = watch.listener.on_facts_changed(&subset).await {
                warn!(error = %e, "Fact listener failed");
            }
        }
        evaluation.facts
    }

    /// Warn once per distinct failure reason, not on every pass
    fn log_failures(&self, current: &BTreeMap<String, String>) {
        let mut known = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        for (rule, reason) in current {
            if known.get(rule) != Some(reason) {
                warn!(rule = %rule, reason = %reason, "Rule evaluated false on bad input");
            }
        }
        for rule in known.keys() {
            if !current.contains_key(rule) {
                debug!(rule = %rule, "Rule input recovered");
            }
        }
        *known = current.clone();
    }
}

struct EngineWorkers {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    subscription: ListenerId,
}

/// Derives named boolean facts from cached tag values.
///
/// Every tag change triggers a full pass in dependency order on a task of
/// its own, so evaluation never blocks the cache's poll loop.
pub struct StateEngine {
    cell: StateCell,
    cache: Arc<TagCache>,
    source: Arc<dyn RuleTableSource>,
    inner: Arc<EngineInner>,
    workers: Mutex<Option<EngineWorkers>>,
}

impl StateEngine {
    pub const SERVICE_NAME: &'static str = "state-engine";

    pub fn new(cache: Arc<TagCache>, source: Arc<dyn RuleTableSource>) -> Self {
        Self {
            cell: StateCell::new(Self::SERVICE_NAME),
            cache,
            source,
            inner: Arc::new(EngineInner {
                rules: RwLock::new(Arc::new(RuleSet::default())),
                facts: RwLock::new(BTreeMap::new()),
                failures: Mutex::new(BTreeMap::new()),
                listeners: ListenerRegistry::new(),
                passes: AtomicU64::new(0),
                pass_lock: tokio::sync::Mutex::new(()),
                init_error: Mutex::new(None),
            }),
            workers: Mutex::new(None),
        }
    }

    /// Current value of a fact; unknown or not yet evaluated is `false`
    pub fn get(&self, name: &str) -> bool {
        self.inner
            .facts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(false)
    }

    pub fn get_all(&self) -> BTreeMap<String, bool> {
        self.inner
            .facts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Call `listener` with the facts matching `predicate` whenever one of them changes
    pub fn on_changed<P>(&self, predicate: P, listener: Arc<dyn FactListener>) -> ListenerId
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(FactWatch {
            predicate: Box::new(predicate),
            listener,
        }))
    }

    /// [`on_changed`](Self::on_changed) for an explicit list of fact names
    pub fn watch(&self, names: &[&str], listener: Arc<dyn FactListener>) -> ListenerId {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        self.on_changed(move |fact| names.iter().any(|n| n == fact), listener)
    }

    pub fn remove_listener(&self, id: &ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Run a full pass now and return the resulting facts
    pub async fn evaluate_now(&self) -> Result<BTreeMap<String, bool>> {
        self.cell.ensure_running()?;
        Ok(self.inner.run_pass(&self.cache).await)
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        self.inner
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Completed evaluation passes since construction
    pub fn pass_count(&self) -> u64 {
        self.inner.passes.load(Ordering::Relaxed)
    }
}

async fn run_evaluator(
    inner: Arc<EngineInner>,
    cache: Arc<TagCache>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Evaluator shutdown signal received");
                return;
            }
            _ = wake.notified() => {
                inner.run_pass(&cache).await;
            }
        }
    }
}

#[async_trait]
impl Service for StateEngine {
    fn name(&self) -> &str {
        self.cell.name()
    }

    fn state(&self) -> ServiceState {
        self.cell.get()
    }

    async fn initialize(&self) -> Result<()> {
        self.cell.check_can_initialize()?;
        if !self.cache.is_running() {
            self.cell.mark_failed();
            return Err(DomainError::NotRunning(format!(
                "{} requires a running {}",
                Self::SERVICE_NAME,
                TagCache::SERVICE_NAME
            )));
        }

        let rules = match RuleSet::load(self.source.as_ref()).and_then(RuleSet::require_rules) {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "Failed to load rule table");
                *self
                    .inner
                    .init_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                self.cell.mark_failed();
                return Err(e);
            }
        };
        for issue in rules.issues() {
            warn!(rule = %issue.name, reason = %issue.reason, "Skipped rule definition");
        }
        let base = rules.base_rules().count();
        let dependent = rules.dependent_rules().count();

        *self
            .inner
            .init_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .inner
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(rules);

        self.cell.mark_initialized()?;
        info!(base, dependent, "✅ State engine initialized");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.cell.check_can_start()?;

        let wake = Arc::new(Notify::new());
        let subscription = self
            .cache
            .subscribe(Arc::new(WakeOnChange(wake.clone())), None)?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_evaluator(
            self.inner.clone(),
            self.cache.clone(),
            wake,
            cancel.clone(),
        ));
        *self.workers.lock().unwrap_or_else(PoisonError::into_inner) = Some(EngineWorkers {
            cancel,
            task,
            subscription,
        });

        let facts = self.inner.run_pass(&self.cache).await;
        self.cell.mark_running()?;
        info!(
            facts = facts.len(),
            active = facts.values().filter(|f| **f).count(),
            "🧠 State engine running"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cell.check_can_stop()?;

        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            // Unsubscribe first so no pass starts against cleared state
            self.cache.unsubscribe(&workers.subscription);
            workers.cancel.cancel();
            if let Err(e) = workers.task.await {
                warn!(error = %e, "Evaluator task ended abnormally");
            }
        }

        self.inner
            .facts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.listeners.clear();

        self.cell.mark_stopped()?;
        info!("🛑 State engine stopped");
        Ok(())
    }

    fn health(&self) -> ServiceHealth {
        let mut details = Vec::new();
        if let Some(e) = self
            .inner
            .init_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            details.push(format!("rule table: {e}"));
        }
        let skipped = self.rules().issues().len();
        if skipped > 0 {
            details.push(format!("{skipped} rule definitions skipped"));
        }
        let failing = self
            .inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if failing > 0 {
            details.push(format!("{failing} rules false on missing input"));
        }
        ServiceHealth::from_state(self.name(), self.cell.get(), details)
    }
}
