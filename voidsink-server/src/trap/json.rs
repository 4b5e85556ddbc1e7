use std::fmt::Write as _;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use log::error;
use voidsink_core::{ChunkPool, CorpusModel, SequenceGenerator};

use super::body::ChunkSource;

/// Approximate length of the `data` text of one record.
const RECORD_TEXT: usize = 500;

/// Space kept free for the record that crosses the fill threshold.
const HEADROOM: usize = 1024;

/// An endless JSON array of `{"id","timestamp","data"}` records.
///
/// The array is opened and never closed. Ids start at 1 and increase by one
/// per record; `data` continues the same token stream from record to record.
pub struct JsonSource {
	model: Arc<CorpusModel>,
	pool: Arc<ChunkPool>,
	generator: SequenceGenerator,
	next_id: u64,
	opened: bool,
	text: String,
}

impl JsonSource {
	pub fn new(model: Arc<CorpusModel>, pool: Arc<ChunkPool>) -> Self {
		let generator = SequenceGenerator::from_entropy(&model);
		Self {
			model,
			pool,
			generator,
			next_id: 1,
			opened: false,
			text: String::with_capacity(RECORD_TEXT + 64),
		}
	}

	fn write_record(&mut self, out: &mut BytesMut) -> Result<(), serde_json::Error> {
		self.text.clear();
		while self.text.len() < RECORD_TEXT {
			self.text.push_str(self.generator.advance(&self.model));
			self.text.push(' ');
		}

		let timestamp = humantime::format_rfc3339_seconds(SystemTime::now());
		// Infallible on BytesMut
		let _ = write!(out, "{{\"id\":{},\"timestamp\":\"{timestamp}\",\"data\":", self.next_id);
		serde_json::to_writer((&mut *out).writer(), &self.text)?;
		out.extend_from_slice(b"},\n");
		self.next_id += 1;
		Ok(())
	}
}

impl ChunkSource for JsonSource {
	fn next_chunk(&mut self) -> Option<Bytes> {
		let pool = Arc::clone(&self.pool);
		let mut buf = pool.acquire();
		if !self.opened {
			buf.extend_from_slice(b"[\n");
			self.opened = true;
		}

		let limit = buf.capacity().saturating_sub(HEADROOM).max(1);
		while buf.len() < limit {
			if let Err(e) = self.write_record(&mut buf) {
				error!("failed to encode json record: {e}");
				return None;
			}
		}
		Some(buf.split().freeze())
	}
}
