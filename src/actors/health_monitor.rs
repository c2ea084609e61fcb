use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use tokio::sync::watch;

use super::health::{ComponentHealth, HealthStatus};
use crate::cache::{CacheError, OrderCache};
use crate::consumer::ConsumerState;
use crate::metrics::Metrics;
use crate::store::OrderStore;
use crate::utils::CircuitState;

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Track health status of postgres, redis and the queue consumer
// - Refresh them from a periodic probe task
// - Aggregate system-wide health for the /api/health endpoint
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub health: ComponentHealth,
}

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone, kameo::Reply)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

// ============================================================================
// Probes
// ============================================================================

/// Everything the periodic probe looks at.
#[derive(Clone)]
pub struct HealthProbes {
    pub store: Arc<dyn OrderStore>,
    pub cache: Arc<dyn OrderCache>,
    pub consumer: watch::Receiver<ConsumerState>,
    pub metrics: Arc<Metrics>,
}

impl HealthProbes {
    pub async fn check(&self) -> Vec<(&'static str, ComponentHealth)> {
        let postgres = match self.store.ping().await {
            Ok(()) => ComponentHealth::new(HealthStatus::Healthy),
            Err(e) => ComponentHealth::new(HealthStatus::Unhealthy(e.to_string())),
        };

        let breaker = self.cache.breaker_state().await;
        self.metrics.update_circuit_breaker_state(breaker);
        let redis = ComponentHealth::new(cache_status(self.cache.ping().await, breaker));

        let state = *self.consumer.borrow();
        let consumer =
            ComponentHealth::new(consumer_status(state)).with_details(state.to_string());

        vec![("postgres", postgres), ("redis", redis), ("consumer", consumer)]
    }
}

/// Reads survive a cache outage, so a failing cache only degrades the service.
fn cache_status(ping: Result<(), CacheError>, breaker: CircuitState) -> HealthStatus {
    match (ping, breaker) {
        (Ok(()), CircuitState::Closed) => HealthStatus::Healthy,
        (Ok(()), _) => HealthStatus::Degraded("circuit breaker recovering".to_string()),
        (Err(CacheError::CircuitOpen), _) => {
            HealthStatus::Degraded("circuit breaker open".to_string())
        }
        (Err(e), _) => HealthStatus::Degraded(e.to_string()),
    }
}

fn consumer_status(state: ConsumerState) -> HealthStatus {
    match state {
        ConsumerState::Running(_) => HealthStatus::Healthy,
        ConsumerState::Idle => HealthStatus::Degraded("waiting to start".to_string()),
        ConsumerState::Stopped => HealthStatus::Unhealthy("consumer stopped".to_string()),
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    probes: Option<HealthProbes>,
    interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(probes: HealthProbes, interval: Duration) -> Self {
        Self {
            components: HashMap::new(),
            probes: Some(probes),
            interval,
        }
    }

    /// A monitor that only reflects explicit `UpdateHealth` messages.
    #[cfg(test)]
    pub fn passive() -> Self {
        Self {
            components: HashMap::new(),
            probes: None,
            interval: Duration::from_secs(10),
        }
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("HealthMonitorActor started");

        if let Some(probes) = state.probes.clone() {
            let interval = state.interval;

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;

                    for (component, health) in probes.check().await {
                        let update = UpdateHealth {
                            component: component.to_string(),
                            health,
                        };
                        // Monitor stopped.
                        if actor_ref.tell(update).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let previous = self
            .components
            .get(&msg.component)
            .map(|h| h.status.clone());

        if previous.as_ref() != Some(&msg.health.status) {
            match &msg.health.status {
                HealthStatus::Healthy => {
                    tracing::info!(component = %msg.component, "Component healthy");
                }
                status => {
                    tracing::warn!(
                        component = %msg.component,
                        status = status.as_str(),
                        reason = status.reason().unwrap_or_default(),
                        "Component health changed"
                    );
                }
            }
        }

        self.components.insert(msg.component, msg.health);
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}
