use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use voidsink_core::{CorpusModel, Tokenizer};
use voidsink_server::alert::Alerter;
use voidsink_server::config::Config;
use voidsink_server::supervisor::Supervisor;
use voidsink_server::telemetry::Telemetry;
use voidsink_server::trap::Shared;
use voidsink_server::{build_endpoints, build_pool, logger};

/// Tarpit serving endless content to scanners and crawlers
#[derive(Parser, Debug)]
#[command(name = "voidsink", version, about)]
struct Cli {
	/// Path to the TOML configuration file
	#[arg(short, long, env = "VOIDSINK_CONFIG", default_value = "configs/config.toml")]
	config: PathBuf,

	/// Overrides `log_level` from the configuration
	#[arg(long, env = "VOIDSINK_LOG_LEVEL")]
	log_level: Option<String>,

	/// Overrides `corpus` from the configuration
	#[arg(long, env = "VOIDSINK_CORPUS")]
	corpus: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let cli = Cli::parse();

	let mut config = Config::load(&cli.config)?;
	if let Some(level) = cli.log_level {
		config.log_level = level;
	}
	if let Some(corpus) = cli.corpus {
		config.corpus = corpus;
	}

	logger::setup(&config.log_level, &config.log_file, &config.log_format);
	info!("VoidSink starting up");
	config.validate()?;

	let tokenizer = if config.markup_aware { Tokenizer::Markup } else { Tokenizer::Whitespace };
	let model = Arc::new(CorpusModel::from_path(&config.corpus, tokenizer)?);

	let alerter = (!config.notification.webhook_url.is_empty()).then(|| {
		Arc::new(Alerter::new(
			config.notification.webhook_url.clone(),
			Duration::from_secs(config.notification.rate_limit_secs),
		))
	});
	let shared = Shared {
		model,
		pool: build_pool(&config),
		telemetry: Telemetry::new()?,
		alerter,
	};

	let mut supervisor = Supervisor::new(build_endpoints(&config, &shared), config.shutdown_timeout());
	supervisor.start();

	tokio::select! {
		_ = shutdown_signal() => info!("shutting down VoidSink"),
		_ = supervisor.closed() => warn!("every endpoint stopped on its own"),
	}

	let report = supervisor.shutdown().await;
	for (name, e) in report.failures() {
		error!("error during {name} shutdown: {e}");
	}
	info!("VoidSink shutdown complete in {:?}", report.elapsed);
	Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			error!("cannot listen for Ctrl-C: {e}");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				error!("cannot listen for SIGTERM: {e}");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}
