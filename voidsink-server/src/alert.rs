use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, error};
use serde::Serialize;

/// Webhook payload accepted by both Discord (`content`) and Slack (`text`).
#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
	content: &'a str,
	text: &'a str,
}

/// Sends trap alerts to a chat webhook.
///
/// # Behavior
/// - At most one alert per source address per `rate_limit` window
/// - Delivery runs on a spawned task and never blocks the trap handler
/// - Delivery failures are logged and otherwise ignored
/// - With an empty webhook URL every call is a no-op
pub struct Alerter {
	webhook_url: String,
	client: reqwest::Client,
	last_seen: DashMap<String, Instant>,
	rate_limit: Duration,
}

impl Alerter {
	pub fn new(webhook_url: impl Into<String>, rate_limit: Duration) -> Self {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(5))
			.build()
			.unwrap_or_else(|e| {
				error!("failed to build webhook client, using defaults: {e}");
				reqwest::Client::new()
			});
		Self {
			webhook_url: webhook_url.into(),
			client,
			last_seen: DashMap::new(),
			rate_limit,
		}
	}

	pub fn is_enabled(&self) -> bool {
		!self.webhook_url.is_empty()
	}

	/// Queues an alert for `remote_ip` unless one was sent recently.
	///
	/// Must be called from within the runtime (a request handler).
	pub fn send_alert(&self, trap_name: &str, remote_ip: &str, user_agent: &str) {
		if !self.is_enabled() || !self.should_send(remote_ip, Instant::now()) {
			return;
		}

		let message = format!("🚨 **Trap Triggered!**\n**Trap:** `{trap_name}`\n**IP:** `{remote_ip}`\n**UA:** `{user_agent}`");
		let client = self.client.clone();
		let url = self.webhook_url.clone();
		let trap_name = trap_name.to_owned();

		actix_web::rt::spawn(async move {
			let payload = AlertPayload { content: &message, text: &message };
			match client.post(&url).json(&payload).send().await {
				Ok(response) if response.status().is_client_error() || response.status().is_server_error() => {
					error!("webhook returned error status: status={}", response.status());
				}
				Ok(_) => debug!("alert sent: trap={trap_name}"),
				Err(e) => error!("failed to send webhook alert: {e}"),
			}
		});
	}

	/// Rate-limit check; records `now` when the alert is allowed.
	///
	/// Sources whose window has expired are forgotten whenever a new source
	/// is recorded, so the map only holds addresses seen within `rate_limit`.
	fn should_send(&self, remote_ip: &str, now: Instant) -> bool {
		if let Some(mut last) = self.last_seen.get_mut(remote_ip) {
			if now.saturating_duration_since(*last) < self.rate_limit {
				return false;
			}
			*last = now;
			return true;
		}

		// No shard guard may be held here
		self.last_seen.retain(|_, last| now.saturating_duration_since(*last) < self.rate_limit);
		self.last_seen.insert(remote_ip.to_owned(), now);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn one_alert_per_source_per_window() {
		let alerter = Alerter::new("http://127.0.0.1:1/hook", Duration::from_secs(3600));
		let now = Instant::now();
		assert!(alerter.should_send("10.0.0.1", now));
		assert!(!alerter.should_send("10.0.0.1", now + Duration::from_secs(10)));
		assert!(alerter.should_send("10.0.0.2", now + Duration::from_secs(10)));
		assert!(alerter.should_send("10.0.0.1", now + Duration::from_secs(3601)));
	}

	#[test]
	fn expired_sources_are_forgotten() {
		let alerter = Alerter::new("http://127.0.0.1:1/hook", Duration::from_secs(60));
		let now = Instant::now();
		for i in 0..100 {
			assert!(alerter.should_send(&format!("10.0.1.{i}"), now));
		}
		assert_eq!(alerter.last_seen.len(), 100);

		assert!(alerter.should_send("10.0.2.1", now + Duration::from_secs(30)));
		assert_eq!(alerter.last_seen.len(), 101);

		assert!(alerter.should_send("10.0.2.2", now + Duration::from_secs(61)));
		assert_eq!(alerter.last_seen.len(), 2);
		assert!(!alerter.should_send("10.0.2.1", now + Duration::from_secs(62)));
	}

	#[test]
	fn empty_webhook_disables_alerts() {
		let alerter = Alerter::new("", Duration::from_secs(1));
		assert!(!alerter.is_enabled());
		// No runtime needed: returns before spawning
		alerter.send_alert("HttpInfinite", "10.0.0.1", "curl/8.0");
		assert!(alerter.last_seen.is_empty());
	}
}
