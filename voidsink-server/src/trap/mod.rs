//! Deceptive endpoints.
//!
//! Every endpoint is one actix-web server with its own address, behaviour
//! (`EndpointKind`) and start/stop state machine. The behaviours form a
//! closed set; they differ only in how a request is answered, so the
//! lifecycle below is shared by all of them.
//!
//! ```text
//! Created -> Starting -> Running -> Stopping -> Stopped
//!               |           |
//!               +-----------+----> Failed(error)
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use actix_web::http::KeepAlive;
use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;
use actix_web::{App, HttpServer, web};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use voidsink_core::{ChunkPool, CorpusModel};

use crate::alert::Alerter;
use crate::config::TrapConfig;
use crate::error::TrapError;
use crate::telemetry::Telemetry;

/// Streaming response bodies.
mod body;

/// Compression-bomb chunk source.
mod gzip;

/// Endless JSON array chunk source.
mod json;

/// Fake administration login page.
mod login;

/// Endless directory listings for crawlers.
mod maze;

/// Request dispatch per endpoint kind.
mod routes;

pub use body::{ChunkSource, TextSource, TrapBody};
pub use gzip::GzipSource;
pub use json::JsonSource;

/// Behaviour of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
	/// Endless generated text.
	HttpInfinite,
	/// Endless JSON array of generated records.
	JsonInfinite,
	/// Endless gzip stream of zeros.
	GzipBomb,
	/// Generated directory listings linking ever deeper.
	CrawlerMaze,
	/// Login form capturing submitted credentials.
	CredentialHarvest,
	/// Prometheus exporter; not a trap, but supervised like one.
	Metrics,
}

impl EndpointKind {
	/// Metric label.
	pub fn label(&self) -> &'static str {
		match self {
			EndpointKind::HttpInfinite => "http_infinite",
			EndpointKind::JsonInfinite => "json_infinite",
			EndpointKind::GzipBomb => "gzip_infinite",
			EndpointKind::CrawlerMaze => "spider_trap",
			EndpointKind::CredentialHarvest => "login_trap",
			EndpointKind::Metrics => "metrics",
		}
	}

	/// Name used in logs and alerts.
	pub fn display_name(&self) -> &'static str {
		match self {
			EndpointKind::HttpInfinite => "HTTPInfinite",
			EndpointKind::JsonInfinite => "JSONInfinite",
			EndpointKind::GzipBomb => "GzipInfinite",
			EndpointKind::CrawlerMaze => "SpiderTrap",
			EndpointKind::CredentialHarvest => "LoginTrap",
			EndpointKind::Metrics => "Metrics",
		}
	}

	pub fn is_trap(&self) -> bool {
		*self != EndpointKind::Metrics
	}
}

/// Where an endpoint is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
	Created,
	Starting,
	Running,
	Stopping,
	Stopped,
	/// The listener could not bind or died; carries the error text.
	Failed(String),
}

impl EndpointState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, EndpointState::Stopped | EndpointState::Failed(_))
	}
}

/// Start/stop contract driven by the `Supervisor`.
pub trait Lifecycle: 'static {
	fn name(&self) -> &str;

	/// Serves until the listener fails or `cancel` fires.
	///
	/// On cancellation the service runs its own bounded `shutdown` and
	/// returns that result.
	fn start(&self, cancel: CancellationToken) -> impl Future<Output = Result<(), TrapError>>;

	/// Stops accepting, waits up to `deadline` for open connections, then
	/// force-closes them and reports a timeout.
	fn shutdown(&self, deadline: Duration) -> impl Future<Output = Result<(), TrapError>>;
}

/// Per-endpoint tuning.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
	/// Value of the `Server` response header.
	pub server_name: String,
	pub workers: usize,
	/// Pause between streamed chunks; zero streams as fast as the peer reads.
	pub chunk_delay: Duration,
	/// How many sub-links a maze page lists.
	pub links: RangeInclusive<usize>,
}

impl Default for EndpointSettings {
	fn default() -> Self {
		Self {
			server_name: "nginx".to_owned(),
			workers: 2,
			chunk_delay: Duration::ZERO,
			links: 5..=10,
		}
	}
}

impl From<&TrapConfig> for EndpointSettings {
	fn from(config: &TrapConfig) -> Self {
		Self {
			server_name: config.server_name.clone(),
			workers: config.workers,
			chunk_delay: Duration::from_millis(config.chunk_delay_ms),
			links: config.min_links..=config.max_links,
		}
	}
}

/// Collaborators shared by every endpoint.
#[derive(Clone)]
pub struct Shared {
	pub model: Arc<CorpusModel>,
	pub pool: Arc<ChunkPool>,
	pub telemetry: Telemetry,
	pub alerter: Option<Arc<Alerter>>,
}

/// Request-handler view of an endpoint, stored as actix app data.
pub(crate) struct TrapContext {
	pub(crate) kind: EndpointKind,
	pub(crate) settings: EndpointSettings,
	pub(crate) shared: Shared,
	/// Cancelled when the endpoint shuts down; ends every open stream.
	pub(crate) streams: CancellationToken,
}

/// One deceptive network service.
///
/// An endpoint runs once: after `Stopped` or `Failed` build a new one.
pub struct Endpoint {
	name: String,
	kind: EndpointKind,
	addr: String,
	settings: EndpointSettings,
	shared: Shared,
	deadline: Duration,
	streams: CancellationToken,
	handle: Mutex<Option<actix_web::dev::ServerHandle>>,
	local_addr: Mutex<Option<SocketAddr>>,
	state: watch::Sender<EndpointState>,
}

impl Endpoint {
	/// Creates an endpoint in the `Created` state.
	///
	/// `deadline` bounds the shutdown triggered by the cancellation signal.
	pub fn new(kind: EndpointKind, addr: impl Into<String>, settings: EndpointSettings, shared: Shared, deadline: Duration) -> Self {
		let (state, _) = watch::channel(EndpointState::Created);
		Self {
			name: kind.display_name().to_owned(),
			kind,
			addr: addr.into(),
			settings,
			shared,
			deadline,
			streams: CancellationToken::new(),
			handle: Mutex::new(None),
			local_addr: Mutex::new(None),
			state,
		}
	}

	pub fn kind(&self) -> EndpointKind {
		self.kind
	}

	/// Configured address.
	pub fn addr(&self) -> &str {
		&self.addr
	}

	/// Bound address, once running. Differs from `addr` for port 0.
	pub fn local_addr(&self) -> Option<SocketAddr> {
		*self.local_addr.lock()
	}

	pub fn state(&self) -> EndpointState {
		self.state.borrow().clone()
	}

	/// Waits until the endpoint leaves `Created`/`Starting`.
	///
	/// Returns the bound address if it reached `Running`.
	pub async fn wait_running(&self) -> Option<SocketAddr> {
		let mut rx = self.state.subscribe();
		let reached = rx
			.wait_for(|s| !matches!(s, EndpointState::Created | EndpointState::Starting))
			.await
			.ok()?
			.clone();
		match reached {
			EndpointState::Running => self.local_addr(),
			_ => None,
		}
	}

	fn transition(&self, next: EndpointState) {
		debug!("{}: {:?} -> {:?}", self.name, *self.state.borrow(), next);
		self.state.send_replace(next);
	}

	fn fail(&self, error: TrapError) -> TrapError {
		self.transition(EndpointState::Failed(error.to_string()));
		error
	}

	fn context(&self) -> web::Data<TrapContext> {
		web::Data::new(TrapContext {
			kind: self.kind,
			settings: self.settings.clone(),
			shared: self.shared.clone(),
			streams: self.streams.clone(),
		})
	}

	async fn serve(&self, cancel: CancellationToken) -> Result<(), TrapError> {
		self.transition(EndpointState::Starting);

		let data = self.context();
		let server_name = self.settings.server_name.clone();
		let server = HttpServer::new(move || {
			App::new()
				.app_data(data.clone())
				.wrap(DefaultHeaders::new().add((header::SERVER, server_name.clone())))
				.configure(routes::configure)
		})
		.workers(self.settings.workers.max(1))
		.disable_signals()
		.keep_alive(KeepAlive::Disabled)
		.client_request_timeout(Duration::from_secs(10))
		.shutdown_timeout(self.deadline.as_secs().max(1))
		.bind(self.addr.as_str())
		.map_err(|source| {
			self.fail(TrapError::Bind {
				name: self.name.clone(),
				addr: self.addr.clone(),
				source,
			})
		})?;

		let bound = server.addrs().first().copied();
		*self.local_addr.lock() = bound;

		let server = server.run();
		*self.handle.lock() = Some(server.handle());
		// The server task processes the stop commands sent through the handle
		let mut running = actix_web::rt::spawn(server);
		self.transition(EndpointState::Running);
		info!("starting {}: address={}", self.name, bound.map(|a| a.to_string()).unwrap_or_else(|| self.addr.clone()));

		tokio::select! {
			joined = &mut running => {
				self.handle.lock().take();
				match joined {
					Ok(Ok(())) => {
						self.transition(EndpointState::Stopped);
						Ok(())
					}
					Ok(Err(source)) => Err(self.fail(TrapError::Listener { name: self.name.clone(), source })),
					Err(e) => Err(self.fail(TrapError::Listener { name: self.name.clone(), source: io::Error::other(e.to_string()) })),
				}
			}
			_ = cancel.cancelled() => {
				let outcome = self.stop(self.deadline).await;
				if let Ok(Err(e)) = running.await {
					warn!("{}: server exited with error after stop: {e}", self.name);
				}
				outcome
			}
		}
	}

	/// Stops the server if this caller holds its handle, otherwise waits for
	/// whoever does.
	async fn stop(&self, deadline: Duration) -> Result<(), TrapError> {
		self.streams.cancel();

		let handle = self.handle.lock().take();
		let Some(handle) = handle else {
			return self.wait_stopped(deadline).await;
		};

		self.transition(EndpointState::Stopping);
		info!("shutting down {}", self.name);

		let outcome = match timeout(deadline, handle.stop(true)).await {
			Ok(()) => Ok(()),
			Err(_) => {
				warn!("{}: connections still open after {deadline:?}, forcing", self.name);
				handle.stop(false).await;
				Err(TrapError::ShutdownTimeout { name: self.name.clone(), deadline })
			}
		};
		self.transition(EndpointState::Stopped);
		outcome
	}

	/// Second caller of `shutdown`, or one racing startup.
	async fn wait_stopped(&self, deadline: Duration) -> Result<(), TrapError> {
		let mut rx = self.state.subscribe();
		if *rx.borrow() == EndpointState::Created {
			return Ok(());
		}
		match timeout(deadline, rx.wait_for(EndpointState::is_terminal)).await {
			Ok(_) => Ok(()),
			Err(_) => Err(TrapError::ShutdownTimeout { name: self.name.clone(), deadline }),
		}
	}
}

impl Lifecycle for Endpoint {
	fn name(&self) -> &str {
		&self.name
	}

	async fn start(&self, cancel: CancellationToken) -> Result<(), TrapError> {
		self.serve(cancel).await
	}

	async fn shutdown(&self, deadline: Duration) -> Result<(), TrapError> {
		self.stop(deadline).await
	}
}
