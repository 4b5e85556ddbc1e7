use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;

use env_logger::{Builder, Target};
use log::LevelFilter;
use serde_json::json;

/// Installs the process-wide logger.
///
/// - `level`: an unparsable value falls back to `info`
/// - `file`: empty means stderr; if the file cannot be opened, stderr is used
/// - `format`: `json` writes one object per line, anything else is the
///   human-readable console format
///
/// Calling it twice keeps the first logger.
pub fn setup(level: &str, file: &str, format: &str) {
	let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

	let mut builder = Builder::new();
	builder.filter_level(level);

	let mut file_error = None;
	if !file.is_empty() {
		match OpenOptions::new().create(true).append(true).open(file) {
			Ok(f) => {
				builder.target(Target::Pipe(Box::new(f)));
			}
			Err(e) => file_error = Some(e),
		}
	}

	if format == "json" {
		builder.format(|buf, record| {
			let line = json!({
				"time": humantime::format_rfc3339_millis(std::time::SystemTime::now()).to_string(),
				"level": record.level().as_str(),
				"target": record.target(),
				"message": record.args().to_string(),
			});
			writeln!(buf, "{line}")
		});
	} else {
		builder.format_timestamp_millis();
	}

	if builder.try_init().is_err() {
		return;
	}
	if let Some(e) = file_error {
		log::error!("failed to open log file {file}, using stderr: {e}");
	}
}
