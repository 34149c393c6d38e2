use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use domain::{DomainError, HealthStatus, Result, ServiceHealth};
use serde::Serialize;
use tracing::{error, info, warn};

use super::Service;

struct Registration {
    service: Arc<dyn Service>,
    depends_on: Vec<String>,
}

/// Outcome of [`ServiceManager::start_all`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupReport {
    pub started: Vec<String>,
    /// Service name and the error that stopped it
    pub failed: Vec<(String, String)>,
    /// Service name and the dependency that was not running
    pub skipped: Vec<(String, String)>,
}

impl StartupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Aggregated health across every registered service
#[derive(Debug, Clone, Serialize)]
pub struct StationHealth {
    pub status: HealthStatus,
    pub services: Vec<ServiceHealth>,
    pub timestamp: DateTime<Utc>,
}

/// Starts services in dependency order and stops them in reverse
pub struct ServiceManager {
    registrations: Vec<Registration>,
    skipped: Mutex<HashMap<String, String>>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            skipped: Mutex::new(HashMap::new()),
        }
    }

    /// Register a service that must start after every service named in `depends_on`
    pub fn register(&mut self, service: Arc<dyn Service>, depends_on: &[&str]) -> Result<()> {
        if self.find(service.name()).is_some() {
            return Err(DomainError::Config(format!(
                "Service {} registered twice",
                service.name()
            )));
        }
        self.registrations.push(Registration {
            service,
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        });
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.find(name).map(|r| r.service.clone())
    }

    /// Registration order, adjusted so dependencies come first
    pub fn startup_order(&self) -> Result<Vec<String>> {
        for reg in &self.registrations {
            for dep in &reg.depends_on {
                if self.find(dep).is_none() {
                    return Err(DomainError::Config(format!(
                        "Service {} depends on unknown service {dep}",
                        reg.service.name()
                    )));
                }
            }
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.registrations.len());
        while order.len() < self.registrations.len() {
            let next = self.registrations.iter().find(|r| {
                !placed.contains(r.service.name())
                    && r.depends_on.iter().all(|d| placed.contains(d.as_str()))
            });
            let Some(reg) = next else {
                let stuck: Vec<&str> = self
                    .registrations
                    .iter()
                    .map(|r| r.service.name())
                    .filter(|n| !placed.contains(n))
                    .collect();
                return Err(DomainError::Config(format!(
                    "Service dependency cycle among: {}",
                    stuck.join(", ")
                )));
            };
            placed.insert(reg.service.name());
            order.push(reg.service.name().to_string());
        }
        Ok(order)
    }

    /// Initialize then start each service in dependency order.
    ///
    /// A failing service does not abort the run; services depending on it
    /// are skipped. Only an invalid dependency graph is an error.
    pub async fn start_all(&self) -> Result<StartupReport> {
        let order = self.startup_order()?;
        let mut report = StartupReport::default();
        self.skipped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        for name in order {
            let Some(reg) = self.find(&name) else {
                continue;
            };

            if let Some(dep) = reg
                .depends_on
                .iter()
                .find(|d| !self.find(d).is_some_and(|r| r.service.is_running()))
            {
                warn!(service = %name, dependency = %dep, "⏭️ Skipping service, dependency not running");
                self.skipped
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.clone(), dep.clone());
                report.skipped.push((name, dep.clone()));
                continue;
            }

            let service = reg.service.clone();
            let outcome = match service.initialize().await {
                Ok(()) => service.start().await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    info!(service = %name, "✅ Service started");
                    report.started.push(name);
                }
                Err(e) => {
                    error!(service = %name, error = %e, "❌ Service failed to start");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Stop running services in reverse dependency order; returns the stop errors
    pub async fn stop_all(&self) -> Vec<(String, DomainError)> {
        let mut order = self.startup_order().unwrap_or_else(|_| {
            self.registrations
                .iter()
                .map(|r| r.service.name().to_string())
                .collect()
        });
        order.reverse();

        let mut errors = Vec::new();
        for name in order {
            let Some(reg) = self.find(&name) else {
                continue;
            };
            if !reg.service.is_running() {
                continue;
            }
            match reg.service.stop().await {
                Ok(()) => info!(service = %name, "🛑 Service stopped"),
                Err(e) => {
                    warn!(service = %name, error = %e, "Service did not stop cleanly");
                    errors.push((name, e));
                }
            }
        }
        errors
    }

    /// Health of every service, worst status first in the summary
    pub fn health(&self) -> StationHealth {
        let skipped = self.skipped.lock().unwrap_or_else(PoisonError::into_inner);
        let services: Vec<ServiceHealth> = self
            .registrations
            .iter()
            .map(|reg| {
                let mut health = reg.service.health();
                if let Some(dep) = skipped.get(reg.service.name()) {
                    health
                        .details
                        .push(format!("not started: dependency {dep} was not running"));
                }
                health
            })
            .collect();
        let status = services
            .iter()
            .map(|h| h.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        StationHealth {
            status,
            services,
            timestamp: Utc::now(),
        }
    }

    fn find(&self, name: &str) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|r| r.service.name() == name)
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}
