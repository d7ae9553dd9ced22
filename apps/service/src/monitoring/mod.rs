/// Monitoring engine module - probes targets and annotates the results
///
/// This module is responsible for:
/// - Executing bounded HTTP/HTTPS probes
/// - Reading TLS certificate expiry for HTTPS targets
/// - Tracking up/down transitions per target
/// - Scheduling one check per target on every tick
pub mod certificate;
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod transition;
pub mod types;

pub use executor::MonitoringExecutor;
pub use scheduler::{MonitorHandle, MonitoringScheduler};
pub use transition::TransitionTracker;
pub use types::{Check, CheckResult, Target};
