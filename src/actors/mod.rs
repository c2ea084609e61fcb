// Actor modules
mod health;
mod health_monitor;

pub use health::{ComponentHealth, HealthStatus};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, HealthProbes, SystemHealth, UpdateHealth};
