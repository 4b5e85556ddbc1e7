//! VoidSink server: deceptive HTTP endpoints streaming endless content to
//! scanners and crawlers, under one supervisor.

/// Rate-limited webhook alerts.
pub mod alert;

/// TOML configuration.
pub mod config;

pub mod error;

/// Process-wide logger setup.
pub mod logger;

/// Starts and stops all endpoints together.
pub mod supervisor;

/// Prometheus metrics.
pub mod telemetry;

/// Endpoint lifecycle and trap behaviours.
pub mod trap;

use std::sync::Arc;

use voidsink_core::ChunkPool;

use crate::config::Config;
use crate::trap::{Endpoint, EndpointKind, EndpointSettings, Shared};

/// Builds one endpoint per enabled trap, plus the metrics exporter when
/// enabled.
pub fn build_endpoints(config: &Config, shared: &Shared) -> Vec<Endpoint> {
	let deadline = config.shutdown_timeout();
	let mut endpoints: Vec<Endpoint> = config
		.enabled_traps()
		.into_iter()
		.map(|(kind, trap)| {
			log::info!("trap enabled: type={} addr={}", kind.display_name(), trap.addr);
			Endpoint::new(kind, trap.addr.clone(), EndpointSettings::from(trap), shared.clone(), deadline)
		})
		.collect();

	if config.metrics.enabled {
		let settings = EndpointSettings { workers: 1, ..EndpointSettings::default() };
		endpoints.push(Endpoint::new(EndpointKind::Metrics, config.metrics.addr.clone(), settings, shared.clone(), deadline));
	}
	endpoints
}

/// Pool sized from the configuration.
pub fn build_pool(config: &Config) -> Arc<ChunkPool> {
	Arc::new(ChunkPool::new(config.pool.floor, config.pool.max_idle))
}
