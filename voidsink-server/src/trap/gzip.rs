use std::io::Write;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use log::error;

use super::body::ChunkSource;

/// Uncompressed bytes fed to the encoder per chunk.
const BLOCK: usize = 32 * 1024;

static ZEROS: [u8; BLOCK] = [0; BLOCK];

/// An endless gzip member of zeros at maximum compression.
///
/// Each chunk is the compressed form of one `BLOCK` of zeros, flushed so the
/// client can start inflating immediately. The stream is never finished, so
/// no trailer is ever written.
pub struct GzipSource {
	encoder: GzEncoder<Vec<u8>>,
}

impl GzipSource {
	pub fn new() -> Self {
		Self { encoder: GzEncoder::new(Vec::with_capacity(256), Compression::best()) }
	}
}

impl Default for GzipSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ChunkSource for GzipSource {
	fn next_chunk(&mut self) -> Option<Bytes> {
		if let Err(e) = self.encoder.write_all(&ZEROS).and_then(|()| self.encoder.flush()) {
			error!("gzip encoder failed: {e}");
			return None;
		}
		Some(Bytes::from(std::mem::take(self.encoder.get_mut())))
	}

	/// Accounts the decompressed size: what the client has to process.
	fn produced(&self, _sent: usize) -> usize {
		BLOCK
	}
}

#[cfg(test)]
mod tests {
	use std::io::Read;

	use flate2::read::MultiGzDecoder;

	use super::*;

	#[test]
	fn chunks_inflate_to_zeros() {
		let mut source = GzipSource::new();
		let mut compressed = Vec::new();
		for _ in 0..4 {
			compressed.extend_from_slice(&source.next_chunk().unwrap());
		}
		assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
		assert!(compressed.len() < BLOCK);

		// The member is never finished, so read until the decoder runs out
		let mut decoder = MultiGzDecoder::new(compressed.as_slice());
		let mut inflated = vec![0u8; 4 * BLOCK];
		let mut filled = 0;
		while filled < inflated.len() {
			match decoder.read(&mut inflated[filled..]) {
				Ok(0) | Err(_) => break,
				Ok(n) => filled += n,
			}
		}
		assert_eq!(filled, 4 * BLOCK);
		assert!(inflated.iter().all(|&b| b == 0));
	}

	#[test]
	fn telemetry_counts_uncompressed_bytes() {
		let mut source = GzipSource::new();
		let chunk = source.next_chunk().unwrap();
		assert_eq!(source.produced(chunk.len()), BLOCK);
		assert!(chunk.len() < BLOCK / 10);
	}
}
