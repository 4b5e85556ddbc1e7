use log::error;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Attacker-facing metrics, exported in Prometheus text format.
///
/// Each `Telemetry` owns its own registry, so several instances (tests) do
/// not collide on metric names.
#[derive(Clone)]
pub struct Telemetry {
	registry: Registry,
	bytes_sent: IntCounter,
	active_connections: IntGauge,
	traps_triggered: IntCounterVec,
	credentials_captured: IntCounter,
}

impl Telemetry {
	pub fn new() -> Result<Self, prometheus::Error> {
		let registry = Registry::new();

		let bytes_sent = IntCounter::new("voidsink_bytes_sent_total", "The total number of bytes sent to trapped clients")?;
		let active_connections = IntGauge::new("voidsink_active_connections", "The number of currently active trapped connections")?;
		let traps_triggered = IntCounterVec::new(
			Opts::new("voidsink_traps_triggered_total", "The total number of times a trap has been hit"),
			&["trap_type", "path"],
		)?;
		let credentials_captured = IntCounter::new("voidsink_credentials_captured_total", "The total number of credential pairs captured")?;

		registry.register(Box::new(bytes_sent.clone()))?;
		registry.register(Box::new(active_connections.clone()))?;
		registry.register(Box::new(traps_triggered.clone()))?;
		registry.register(Box::new(credentials_captured.clone()))?;

		Ok(Self { registry, bytes_sent, active_connections, traps_triggered, credentials_captured })
	}

	pub fn trap_hit(&self, trap_type: &str, path: &str) {
		self.traps_triggered.with_label_values(&[trap_type, path]).inc();
	}

	pub fn bytes_sent(&self, n: usize) {
		self.bytes_sent.inc_by(n as u64);
	}

	pub fn credentials_captured(&self) {
		self.credentials_captured.inc();
	}

	/// Counts a streaming connection as active until the guard drops.
	pub fn connection(&self) -> ConnectionGuard {
		self.active_connections.inc();
		ConnectionGuard { gauge: self.active_connections.clone() }
	}

	pub fn active_connections(&self) -> i64 {
		self.active_connections.get()
	}

	pub fn total_bytes_sent(&self) -> u64 {
		self.bytes_sent.get()
	}

	pub fn hits(&self, trap_type: &str, path: &str) -> u64 {
		self.traps_triggered.with_label_values(&[trap_type, path]).get()
	}

	pub fn total_credentials(&self) -> u64 {
		self.credentials_captured.get()
	}

	/// Renders every metric in the text exposition format.
	pub fn render(&self) -> String {
		let mut out = Vec::new();
		if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut out) {
			error!("failed to encode metrics: {e}");
		}
		String::from_utf8_lossy(&out).into_owned()
	}
}

/// Decrements the active-connection gauge on drop.
pub struct ConnectionGuard {
	gauge: IntGauge,
}

impl Drop for ConnectionGuard {
	fn drop(&mut self) {
		self.gauge.dec();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn guard_tracks_active_connections() {
		let telemetry = Telemetry::new().unwrap();
		let a = telemetry.connection();
		let b = telemetry.connection();
		assert_eq!(telemetry.active_connections(), 2);
		drop(a);
		assert_eq!(telemetry.active_connections(), 1);
		drop(b);
		assert_eq!(telemetry.active_connections(), 0);
	}

	#[test]
	fn render_lists_every_metric() {
		let telemetry = Telemetry::new().unwrap();
		telemetry.trap_hit("http_infinite", "/admin");
		telemetry.bytes_sent(4096);
		telemetry.credentials_captured();
		let text = telemetry.render();
		assert!(text.contains("voidsink_bytes_sent_total 4096"));
		let hit = text.lines().find(|l| l.starts_with("voidsink_traps_triggered_total{")).unwrap();
		assert!(hit.contains("trap_type=\"http_infinite\""));
		assert!(hit.contains("path=\"/admin\""));
		assert!(hit.ends_with(" 1"));
		assert!(text.contains("voidsink_credentials_captured_total 1"));
		assert!(text.contains("voidsink_active_connections 0"));
	}
}
