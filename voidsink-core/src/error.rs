use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Startup-fatal errors raised while preparing the content engine.
///
/// These are never produced at steady state: once a `CorpusModel` exists,
/// generation cannot fail.
#[derive(Debug, Error)]
pub enum ConfigurationError {
	/// The corpus file could not be opened, read, or is not valid UTF-8.
	#[error("corpus {path} is unreadable: {source}")]
	Unreadable {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}
