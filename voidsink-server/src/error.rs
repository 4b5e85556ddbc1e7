use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by an endpoint's lifecycle.
#[derive(Debug, Error)]
pub enum TrapError {
	/// The listener could not be bound.
	#[error("{name}: cannot listen on {addr}: {source}")]
	Bind {
		name: String,
		addr: String,
		#[source]
		source: io::Error,
	},

	/// The running server failed.
	#[error("{name}: listener failed: {source}")]
	Listener {
		name: String,
		#[source]
		source: io::Error,
	},

	/// Connections were still open when the deadline elapsed and were dropped.
	#[error("{name}: shutdown did not finish within {deadline:?}, connections were force-closed")]
	ShutdownTimeout { name: String, deadline: Duration },
}

/// Startup-fatal configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read config {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("cannot parse config {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("no trap enabled, refusing to run")]
	NoEndpoints,

	#[error("invalid configuration: {0}")]
	Invalid(String),
}
