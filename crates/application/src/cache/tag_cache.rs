use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::driver::{HardwareLink, ReadBatch};
use domain::tag::{CacheEntry, EntrySource, TagTableSource};
use domain::{
    DomainError, Result, ServiceHealth, ServiceState, TagChange, TagDescriptor, TagListener,
    TagMap, TagValue,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::CacheConfig;
use super::dispatch::{self, ChangeSender, Subscription};
use super::poller::{self, PollSummary};
use crate::lifecycle::{Service, StateCell};
use crate::observer::{ListenerId, ListenerRegistry};

/// A hardware client shared between the poll loop and writers
pub type SharedLink = Arc<tokio::sync::Mutex<Box<dyn HardwareLink>>>;

/// Physical names per link, fixed at initialize
#[derive(Debug, Default)]
pub(super) struct Groups {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

#[derive(Debug, Default)]
pub(super) struct PollStats {
    pub ticks: u64,
    pub failed_batches: u64,
    pub last_poll: Option<DateTime<Utc>>,
    /// Error of the most recent tick, cleared by a clean tick
    pub last_error: Option<String>,
    pub init_error: Option<String>,
}

pub(super) struct CacheInner {
    pub config: CacheConfig,
    pub map: RwLock<Arc<TagMap>>,
    pub values: RwLock<HashMap<String, CacheEntry>>,
    pub primary: SharedLink,
    pub secondary: Option<SharedLink>,
    pub groups: RwLock<Groups>,
    pub subscribers: Arc<ListenerRegistry<Subscription>>,
    pub sender: RwLock<Option<ChangeSender>>,
    pub stats: Mutex<PollStats>,
    /// Serializes poll ticks between the loop and `poll_now`
    pub tick_lock: tokio::sync::Mutex<()>,
    /// Open while running; writers and manual ticks hold a read guard, `stop` takes the write side
    pub io_gate: tokio::sync::RwLock<bool>,
}

impl CacheInner {
    pub fn map(&self) -> Arc<TagMap> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores a batch of raw physical values and refreshes every symbolic
    /// slot they back, all under one write lock.
    pub fn apply_batch(&self, batch: ReadBatch, source: EntrySource) -> Vec<TagChange> {
        let map = self.map();
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let mut changes = Vec::new();
        for (physical, raw) in batch {
            apply_physical(&map, &mut values, &physical, raw, source, &mut changes);
        }
        changes
    }

    pub fn emit(&self, changes: Vec<TagChange>) {
        if changes.is_empty() {
            return;
        }
        let sender = self
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sender) = sender {
            sender.publish(changes);
        }
    }

    pub fn stats(&self) -> std::sync::MutexGuard<'_, PollStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_physical(
    map: &TagMap,
    values: &mut HashMap<String, CacheEntry>,
    physical: &str,
    raw: TagValue,
    source: EntrySource,
    changes: &mut Vec<TagChange>,
) {
    values.insert(physical.to_string(), CacheEntry::new(raw.clone(), source));

    for symbolic in map.symbolic_names(physical) {
        match map.scale(symbolic, &raw) {
            Ok(scaled) => {
                let previous = values
                    .insert(symbolic.clone(), CacheEntry::new(scaled.clone(), source))
                    .map(|e| e.value);
                // Equal values only refresh the timestamp
                if previous.as_ref() != Some(&scaled) {
                    changes.push(TagChange::new(
                        symbolic.clone(),
                        Some(physical.to_string()),
                        scaled,
                        previous,
                    ));
                }
            }
            Err(e) => {
                values.remove(symbolic);
                warn!(tag = %symbolic, physical = %physical, raw = %raw, error = %e, "Dropping unscalable value");
            }
        }
    }
}

struct Workers {
    cancel: CancellationToken,
    poll: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Authoritative in-process snapshot of every tag.
///
/// One background task polls the primary link; writes are routed per link
/// and changes are fanned out to subscribers from a dispatcher task.
pub struct TagCache {
    cell: StateCell,
    source: Arc<dyn TagTableSource>,
    inner: Arc<CacheInner>,
    workers: Mutex<Option<Workers>>,
}

impl TagCache {
    pub const SERVICE_NAME: &'static str = "tag-cache";

    pub fn new(
        source: Arc<dyn TagTableSource>,
        primary: Box<dyn HardwareLink>,
        secondary: Option<Box<dyn HardwareLink>>,
        config: CacheConfig,
    ) -> Self {
        let inner = CacheInner {
            config,
            map: RwLock::new(Arc::new(TagMap::default())),
            values: RwLock::new(HashMap::new()),
            primary: Arc::new(tokio::sync::Mutex::new(primary)),
            secondary: secondary.map(|link| Arc::new(tokio::sync::Mutex::new(link))),
            groups: RwLock::new(Groups::default()),
            subscribers: Arc::new(ListenerRegistry::new()),
            sender: RwLock::new(None),
            stats: Mutex::new(PollStats::default()),
            tick_lock: tokio::sync::Mutex::new(()),
            io_gate: tokio::sync::RwLock::new(false),
        };
        Self {
            cell: StateCell::new(Self::SERVICE_NAME),
            source,
            inner: Arc::new(inner),
            workers: Mutex::new(None),
        }
    }

    /// Latest value of a symbolic or physical tag; never blocks on hardware
    pub fn get(&self, name: &str) -> Option<TagValue> {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| e.value.clone())
    }

    /// Like [`get`](Self::get) but distinguishes unknown tags and a stopped cache
    pub fn try_get(&self, name: &str) -> Result<Option<TagValue>> {
        self.cell.ensure_running()?;
        if !self.inner.map().contains(name) {
            return Err(DomainError::NotMapped(name.to_string()));
        }
        Ok(self.get(name))
    }

    /// Value that must be present, for composing snapshots
    pub fn require(&self, name: &str) -> Result<TagValue> {
        self.try_get(name)?
            .ok_or_else(|| DomainError::Unavailable(format!("No value cached for {name}")))
    }

    pub fn require_f64(&self, name: &str) -> Result<f64> {
        let value = self.require(name)?;
        value
            .as_f64()
            .ok_or_else(|| DomainError::Unavailable(format!("{name} is not numeric: {value}")))
    }

    pub fn require_bool(&self, name: &str) -> Result<bool> {
        let value = self.require(name)?;
        value
            .as_bool()
            .ok_or_else(|| DomainError::Unavailable(format!("{name} is not boolean: {value}")))
    }

    /// Value plus provenance and refresh time
    pub fn entry(&self, name: &str) -> Option<CacheEntry> {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshot of every cached slot, symbolic and physical
    pub fn get_all(&self) -> BTreeMap<String, TagValue> {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.clone()))
            .collect()
    }

    pub fn describe(&self, name: &str) -> Option<TagDescriptor> {
        self.inner.map().describe(name).cloned()
    }

    pub fn tag_map(&self) -> Arc<TagMap> {
        self.inner.map()
    }

    /// Write a symbolic tag in application units.
    ///
    /// Secondary-link tags are read back before returning, so the caller
    /// observes its own write. Primary-link tags become visible on the
    /// next poll tick.
    pub async fn set(&self, name: &str, value: impl Into<TagValue>) -> Result<()> {
        self.cell.ensure_running()?;
        let _io = self.enter_io().await?;
        let value = value.into();
        let map = self.inner.map();
        let descriptor = map
            .describe(name)
            .ok_or_else(|| DomainError::NotMapped(name.to_string()))?;
        if !descriptor.access.can_write() {
            return Err(DomainError::ReadOnly(name.to_string()));
        }

        let Some(physical) = descriptor.physical.as_deref() else {
            self.write_internal(name, value);
            return Ok(());
        };

        let raw = descriptor.unscale(&value)?;
        if self.inner.config.is_secondary(physical) {
            let link = self.inner.secondary.as_ref().ok_or_else(|| {
                DomainError::Hardware(format!("No secondary link configured for {physical}"))
            })?;
            let confirmed = {
                let mut link = link.lock().await;
                link.write_tag(physical, raw.clone()).await?;
                link.read_tag(physical).await?
            };
            if confirmed != raw {
                warn!(tag = %name, written = %raw, read_back = %confirmed, "Read-back differs from written value");
            }
            let changes = self.inner.apply_batch(
                ReadBatch::from([(physical.to_string(), confirmed)]),
                EntrySource::ReadBack,
            );
            self.inner.emit(changes);
            debug!(tag = %name, physical = %physical, "Secondary write confirmed");
        } else {
            self.inner
                .primary
                .lock()
                .await
                .write_tag(physical, raw.clone())
                .await?;
            debug!(tag = %name, physical = %physical, raw = %raw, "Primary write accepted");
        }
        Ok(())
    }

    fn write_internal(&self, name: &str, value: TagValue) {
        let previous = {
            let mut values = self
                .inner
                .values
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            values
                .insert(name.to_string(), CacheEntry::new(value.clone(), EntrySource::Write))
                .map(|e| e.value)
        };
        if previous.as_ref() != Some(&value) {
            self.inner
                .emit(vec![TagChange::new(name, None, value, previous)]);
        }
    }

    /// Register `listener` for one tag (symbolic or physical), or every tag with `None`
    pub fn subscribe(&self, listener: Arc<dyn TagListener>, tag: Option<&str>) -> Result<ListenerId> {
        if let Some(tag) = tag {
            if !self.inner.map().contains(tag) {
                return Err(DomainError::NotMapped(tag.to_string()));
            }
        }
        Ok(self.inner.subscribers.add(Arc::new(Subscription {
            filter: tag.map(str::to_string),
            listener,
        })))
    }

    pub fn unsubscribe(&self, id: &ListenerId) -> bool {
        self.inner.subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Run one poll tick now instead of waiting for the loop
    pub async fn poll_now(&self) -> Result<PollSummary> {
        self.cell.ensure_running()?;
        let _io = self.enter_io().await?;
        Ok(self.inner.poll_tick().await)
    }

    async fn enter_io(&self) -> Result<tokio::sync::RwLockReadGuard<'_, bool>> {
        let open = self.inner.io_gate.read().await;
        if !*open {
            return Err(DomainError::NotRunning(format!("{} is stopping", Self::SERVICE_NAME)));
        }
        Ok(open)
    }

    pub fn poll_count(&self) -> u64 {
        self.inner.stats().ticks
    }

    /// Failed batches summed over every tick since initialize
    pub fn failed_batch_count(&self) -> u64 {
        self.inner.stats().failed_batches
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.inner.stats().last_poll
    }

    async fn seed_group(&self, link: &SharedLink, names: &[String], label: &str) {
        if names.is_empty() {
            return;
        }
        let mut link = link.lock().await;
        if !link.is_connected() {
            if let Err(e) = link.connect().await {
                warn!(link = %link.link_name(), error = %e, "Initial connect failed, poll loop will retry");
                return;
            }
        }

        let mut seeded = 0usize;
        for chunk in names.chunks(self.inner.config.effective_batch_size()) {
            match link.get(chunk).await {
                Ok(batch) => {
                    for missing in chunk.iter().filter(|n| !batch.contains_key(*n)) {
                        debug!(physical = %missing, "No initial value");
                    }
                    seeded += batch.len();
                    self.inner.apply_batch(batch, EntrySource::Poll);
                }
                Err(e) => {
                    warn!(link = %link.link_name(), error = %e, "Initial read failed");
                }
            }
        }
        if seeded < names.len() {
            warn!(group = label, missing = names.len() - seeded, "Some tags have no initial value");
        }
        info!(group = label, seeded, total = names.len(), "📥 Initial values read");
    }
}

#[async_trait]
impl Service for TagCache {
    fn name(&self) -> &str {
        self.cell.name()
    }

    fn state(&self) -> ServiceState {
        self.cell.get()
    }

    async fn initialize(&self) -> Result<()> {
        self.cell.check_can_initialize()?;

        let map = match TagMap::load(self.source.as_ref()) {
            Ok(map) => map,
            Err(e) => {
                error!(error = %e, "Failed to load tag table");
                self.inner.stats().init_error = Some(e.to_string());
                self.cell.mark_failed();
                return Err(e);
            }
        };
        for issue in map.issues() {
            warn!(tag = %issue.name, reason = %issue.reason, "Skipped tag definition");
        }

        let mut groups = Groups::default();
        let mut defaults = HashMap::new();
        for descriptor in map.descriptors() {
            match descriptor.physical.as_deref() {
                Some(physical) if self.inner.config.is_secondary(physical) => {
                    groups.secondary.push(physical.to_string())
                }
                Some(physical) => groups.primary.push(physical.to_string()),
                None => {
                    if let Some(value) = map.default_for(&descriptor.name) {
                        defaults.insert(
                            descriptor.name.clone(),
                            CacheEntry::new(value, EntrySource::Default),
                        );
                    }
                }
            }
        }
        for group in [&mut groups.primary, &mut groups.secondary] {
            group.sort();
            group.dedup();
        }
        if !groups.secondary.is_empty() && self.inner.secondary.is_none() {
            warn!(count = groups.secondary.len(), "Secondary tags mapped but no secondary link configured");
        }

        let tag_count = map.len();
        *self
            .inner
            .map
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(map);
        *self
            .inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner) = defaults;
        {
            let mut stats = self.inner.stats();
            *stats = PollStats::default();
        }

        let primary_names = groups.primary.clone();
        let secondary_names = groups.secondary.clone();
        *self
            .inner
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner) = groups;

        self.seed_group(&self.inner.primary, &primary_names, "primary")
            .await;
        if let Some(secondary) = &self.inner.secondary {
            self.seed_group(secondary, &secondary_names, "secondary")
                .await;
        }

        self.cell.mark_initialized()?;
        info!(
            tags = tag_count,
            primary = primary_names.len(),
            secondary = secondary_names.len(),
            "✅ Tag cache initialized"
        );
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.cell.check_can_start()?;

        let (tx, rx) = dispatch::change_queue(self.inner.config.notify_capacity);
        *self
            .inner
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);

        let cancel = CancellationToken::new();
        let dispatcher = tokio::spawn(dispatch::run_dispatcher(
            rx,
            self.inner.subscribers.clone(),
        ));
        let poll = tokio::spawn(poller::run_poll_loop(
            self.inner.clone(),
            cancel.clone(),
        ));
        *self.workers.lock().unwrap_or_else(PoisonError::into_inner) = Some(Workers {
            cancel,
            poll,
            dispatcher,
        });
        *self.inner.io_gate.write().await = true;

        self.cell.mark_running()?;
        info!(
            interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            "🔄 Tag cache polling started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cell.check_can_stop()?;
        // Waits out in-flight writes and manual ticks; later ones are refused
        *self.inner.io_gate.write().await = false;

        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.cancel.cancel();
            if let Err(e) = workers.poll.await {
                warn!(error = %e, "Poll task ended abnormally");
            }
            // Closing the channel lets the dispatcher drain what is queued
            self.inner
                .sender
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Err(e) = workers.dispatcher.await {
                warn!(error = %e, "Dispatcher task ended abnormally");
            }
        }

        self.inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.subscribers.clear();

        let links = std::iter::once(&self.inner.primary).chain(self.inner.secondary.as_ref());
        for link in links {
            let mut link = link.lock().await;
            if let Err(e) = link.disconnect().await {
                warn!(link = %link.link_name(), error = %e, "Error during disconnect");
            }
        }

        self.cell.mark_stopped()?;
        info!("🛑 Tag cache stopped");
        Ok(())
    }

    fn health(&self) -> ServiceHealth {
        let state = self.cell.get();
        let mut details = Vec::new();
        let stats = self.inner.stats();
        if let Some(e) = &stats.init_error {
            details.push(format!("tag table: {e}"));
        }
        let issues = self.inner.map().issues().len();
        if issues > 0 {
            details.push(format!("{issues} tag definitions skipped"));
        }
        if state.is_running() {
            if let Some(e) = &stats.last_error {
                details.push(format!("last poll: {e}"));
            }
            if let Ok(link) = self.inner.primary.try_lock() {
                if !link.is_connected() {
                    details.push(format!("primary link {} disconnected", link.link_name()));
                }
            }
            let has_secondary_tags = !self
                .inner
                .groups
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .secondary
                .is_empty();
            if has_secondary_tags && self.inner.secondary.is_none() {
                details.push("secondary tags mapped without a secondary link".to_string());
            }
        }
        ServiceHealth::from_state(self.name(), state, details)
    }
}
