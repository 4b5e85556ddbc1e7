use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::trap::EndpointKind;

/// Top-level configuration, read from a TOML file.
///
/// Every field has a default, so a partial file (or none) still yields a
/// runnable configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
	pub log_level: String,
	/// `console` or `json`.
	pub log_format: String,
	/// Empty means stderr.
	pub log_file: String,
	pub corpus: PathBuf,
	/// Keep `<...>` tags atomic when tokenizing the corpus.
	pub markup_aware: bool,
	pub shutdown_timeout_secs: u64,
	pub pool: PoolConfig,
	pub metrics: MetricsConfig,
	pub notification: NotificationConfig,
	pub traps: TrapsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
	pub floor: usize,
	pub max_idle: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
	pub enabled: bool,
	pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
	/// Discord or Slack compatible webhook; empty disables alerts.
	pub webhook_url: String,
	pub rate_limit_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrapsConfig {
	pub http_infinite: TrapConfig,
	pub json_infinite: TrapConfig,
	pub gzip_infinite: TrapConfig,
	pub spider_trap: TrapConfig,
	pub login_trap: TrapConfig,
}

/// Settings shared by every trap kind.
///
/// `chunk_delay_ms` only matters for streaming kinds, `min_links` and
/// `max_links` only for the spider trap.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
	pub enabled: bool,
	pub addr: String,
	pub server_name: String,
	pub workers: usize,
	pub chunk_delay_ms: u64,
	pub min_links: usize,
	pub max_links: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			log_level: "info".to_owned(),
			log_format: "console".to_owned(),
			log_file: String::new(),
			corpus: PathBuf::from("assets/corpus.txt"),
			markup_aware: false,
			shutdown_timeout_secs: 5,
			pool: PoolConfig::default(),
			metrics: MetricsConfig::default(),
			notification: NotificationConfig::default(),
			traps: TrapsConfig::default(),
		}
	}
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self { floor: 4096, max_idle: 1024 }
	}
}

impl Default for MetricsConfig {
	fn default() -> Self {
		Self { enabled: false, addr: "127.0.0.1:9090".to_owned() }
	}
}

impl Default for NotificationConfig {
	fn default() -> Self {
		Self { webhook_url: String::new(), rate_limit_secs: 3600 }
	}
}

impl Default for TrapConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			addr: "0.0.0.0:8080".to_owned(),
			server_name: "nginx".to_owned(),
			workers: 2,
			chunk_delay_ms: 0,
			min_links: 5,
			max_links: 10,
		}
	}
}

impl Default for TrapsConfig {
	fn default() -> Self {
		let on = |addr: &str, chunk_delay_ms: u64| TrapConfig {
			enabled: true,
			addr: addr.to_owned(),
			chunk_delay_ms,
			..TrapConfig::default()
		};
		Self {
			http_infinite: on("0.0.0.0:8080", 10),
			json_infinite: on("0.0.0.0:8081", 0),
			gzip_infinite: TrapConfig { addr: "0.0.0.0:8082".to_owned(), ..TrapConfig::default() },
			spider_trap: TrapConfig { addr: "0.0.0.0:8083".to_owned(), ..TrapConfig::default() },
			login_trap: TrapConfig { addr: "0.0.0.0:8084".to_owned(), ..TrapConfig::default() },
		}
	}
}

impl Config {
	/// Loads the configuration file at `path`.
	///
	/// A missing file is not an error: it is logged to stderr and defaults
	/// are used. The logger is not installed yet at this point.
	///
	/// # Errors
	/// Returns an error if the file exists but cannot be read or parsed.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = match std::fs::read_to_string(path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				eprintln!("config file {} not found, using defaults", path.display());
				return Ok(Self::default());
			}
			Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
		};
		Self::parse(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
	}

	/// Parses TOML text.
	pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_secs(self.shutdown_timeout_secs)
	}

	/// Enabled traps, in a fixed order.
	pub fn enabled_traps(&self) -> Vec<(EndpointKind, &TrapConfig)> {
		let traps = &self.traps;
		[
			(EndpointKind::HttpInfinite, &traps.http_infinite),
			(EndpointKind::JsonInfinite, &traps.json_infinite),
			(EndpointKind::GzipBomb, &traps.gzip_infinite),
			(EndpointKind::CrawlerMaze, &traps.spider_trap),
			(EndpointKind::CredentialHarvest, &traps.login_trap),
		]
		.into_iter()
		.filter(|(_, trap)| trap.enabled)
		.collect()
	}

	/// Checks the settings that would otherwise fail deep inside a trap.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.enabled_traps().is_empty() {
			return Err(ConfigError::NoEndpoints);
		}
		let spider = &self.traps.spider_trap;
		if spider.enabled && (spider.min_links == 0 || spider.min_links > spider.max_links) {
			warn!("spider_trap link range {}..={} is invalid", spider.min_links, spider.max_links);
			return Err(ConfigError::Invalid(format!(
				"spider_trap.min_links ({}) must be >= 1 and <= max_links ({})",
				spider.min_links, spider.max_links
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_file_gives_defaults() {
		let config = Config::parse("").unwrap();
		assert_eq!(config.log_level, "info");
		assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
		assert_eq!(config.enabled_traps().len(), 2);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn partial_sections_keep_other_defaults() {
		let config = Config::parse(
			r#"
			log_format = "json"
			markup_aware = true

			[traps.http_infinite]
			enabled = false

			[traps.spider_trap]
			enabled = true
			addr = "127.0.0.1:9999"
			max_links = 3
			min_links = 2
			"#,
		)
		.unwrap();
		assert_eq!(config.log_format, "json");
		assert!(config.markup_aware);
		let kinds: Vec<EndpointKind> = config.enabled_traps().into_iter().map(|(k, _)| k).collect();
		assert_eq!(kinds, vec![EndpointKind::JsonInfinite, EndpointKind::CrawlerMaze]);
		assert_eq!(config.traps.spider_trap.server_name, "nginx");
		assert_eq!(config.traps.spider_trap.workers, 2);
	}

	#[test]
	fn alerts_are_rate_limited_hourly_by_default() {
		assert_eq!(Config::parse("").unwrap().notification.rate_limit_secs, 3600);

		let config = Config::parse("[notification]\nwebhook_url = \"http://hooks.local/x\"").unwrap();
		assert_eq!(config.notification.webhook_url, "http://hooks.local/x");
		assert_eq!(config.notification.rate_limit_secs, 3600);

		let config = Config::parse("[notification]\nrate_limit_secs = 60").unwrap();
		assert_eq!(config.notification.rate_limit_secs, 60);
		assert!(config.notification.webhook_url.is_empty());
	}

	#[test]
	fn no_enabled_trap_is_rejected() {
		let config = Config::parse(
			r#"
			[traps.http_infinite]
			enabled = false
			[traps.json_infinite]
			enabled = false
			"#,
		)
		.unwrap();
		assert!(matches!(config.validate(), Err(ConfigError::NoEndpoints)));
	}

	#[test]
	fn inverted_link_range_is_rejected() {
		let mut config = Config::default();
		config.traps.spider_trap.enabled = true;
		config.traps.spider_trap.min_links = 8;
		config.traps.spider_trap.max_links = 4;
		assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn missing_file_falls_back_to_defaults() {
		let config = Config::load("./no/such/config.toml").unwrap();
		assert_eq!(config.corpus, PathBuf::from("assets/corpus.txt"));
	}

	#[test]
	fn bad_toml_is_an_error() {
		assert!(Config::parse("log_level = [").is_err());
	}
}
