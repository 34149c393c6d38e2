use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use application::{
    CacheConfig, EquipmentOrchestrator, MotionConfig, MotionOrchestrator, Service, ServiceManager,
    StateEngine, StationHealth, TagCache,
};
use domain::HealthStatus;
use domain::driver::HardwareLink;
use infrastructure::{JsonRuleTable, JsonTagTable, LinkFactory, StationConfig};
use tracing::{info, warn};

/// Every service of one station, wired and registered in dependency order
pub struct Station {
    pub cache: Arc<TagCache>,
    pub engine: Arc<StateEngine>,
    pub equipment: Arc<EquipmentOrchestrator>,
    pub motion: Arc<MotionOrchestrator>,
    pub manager: ServiceManager,
}

impl Station {
    /// Build links and services from configuration; nothing is started yet
    pub fn build(config: &StationConfig, config_dir: &Path) -> Result<Self> {
        let primary = LinkFactory::create_link(
            config.links.primary.kind,
            config.links.primary.settings.clone(),
            config_dir,
        )
        .context("Failed to create primary link")?;
        let secondary = config
            .links
            .secondary
            .as_ref()
            .map(|link| LinkFactory::create_link(link.kind, link.settings.clone(), config_dir))
            .transpose()
            .context("Failed to create secondary link")?;

        Self::with_links(config, config_dir, primary, secondary)
    }

    /// Like [`build`](Self::build) with links supplied by the caller
    pub fn with_links(
        config: &StationConfig,
        config_dir: &Path,
        primary: Box<dyn HardwareLink>,
        secondary: Option<Box<dyn HardwareLink>>,
    ) -> Result<Self> {
        let tag_table = Arc::new(JsonTagTable::new(config.tag_table_path(config_dir)));
        let rule_table = Arc::new(JsonRuleTable::new(config.rule_table_path(config_dir)));

        let cache = Arc::new(TagCache::new(
            tag_table,
            primary,
            secondary,
            cache_config(config),
        ));
        let engine = Arc::new(StateEngine::new(cache.clone(), rule_table));
        let equipment = Arc::new(EquipmentOrchestrator::new(cache.clone(), engine.clone()));
        let motion = Arc::new(MotionOrchestrator::new(
            cache.clone(),
            engine.clone(),
            MotionConfig {
                max_jog_step: config.motion.max_jog_step,
            },
        ));

        let mut manager = ServiceManager::new();
        manager.register(cache.clone(), &[])?;
        manager.register(engine.clone(), &[TagCache::SERVICE_NAME])?;
        manager.register(
            equipment.clone(),
            &[TagCache::SERVICE_NAME, StateEngine::SERVICE_NAME],
        )?;
        manager.register(
            motion.clone(),
            &[TagCache::SERVICE_NAME, StateEngine::SERVICE_NAME],
        )?;

        Ok(Self {
            cache,
            engine,
            equipment,
            motion,
            manager,
        })
    }

    /// Start everything; the station stays up even if some services fail
    pub async fn start(&self) -> Result<()> {
        let report = self.manager.start_all().await?;
        if report.is_complete() {
            info!(services = report.started.len(), "✅ All services running");
        } else {
            for (name, error) in &report.failed {
                warn!(service = %name, error = %error, "Service failed");
            }
            for (name, dependency) in &report.skipped {
                warn!(service = %name, dependency = %dependency, "Service skipped");
            }
        }
        Ok(())
    }

    pub async fn stop(&self) {
        for (name, error) in self.manager.stop_all().await {
            warn!(service = %name, error = %error, "Stop error");
        }
    }

    pub fn health(&self) -> StationHealth {
        self.manager.health()
    }

    pub fn is_running(&self) -> bool {
        self.cache.is_running()
    }
}

pub fn cache_config(config: &StationConfig) -> CacheConfig {
    CacheConfig {
        poll_interval: config.poll.interval(),
        batch_size: config.poll.batch_size,
        secondary_prefix: config.links.secondary_prefix.clone(),
        notify_capacity: config.poll.notify_capacity,
    }
}

/// One heartbeat line, plus a warning per unhealthy service
pub fn log_health(health: &StationHealth, polls: u64) {
    match health.status {
        HealthStatus::Healthy => info!(polls, "💓 Station healthy"),
        status => warn!(?status, polls, "💓 Station not healthy"),
    }
    for service in &health.services {
        if service.status != HealthStatus::Healthy {
            warn!(
                service = %service.name,
                state = service.state.as_str(),
                details = %service.details.join("; "),
                "Service health"
            );
        }
    }
}
