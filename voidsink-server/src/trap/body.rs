use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use actix_web::body::{BodySize, MessageBody};
use bytes::{BufMut, Bytes};
use log::debug;
use tokio::time::{Sleep, sleep};
use tokio_util::sync::CancellationToken;
use voidsink_core::{ChunkPool, CorpusModel, SequenceGenerator};

use crate::telemetry::{ConnectionGuard, Telemetry};

/// Bytes left free at the end of a buffer for the token that crosses the
/// fill threshold.
const HEADROOM: usize = 256;

/// Produces the next piece of an endless response.
///
/// `next_chunk` is called for as long as the peer keeps reading. `None` ends
/// the stream and is only returned when the source itself broke.
pub trait ChunkSource {
	fn next_chunk(&mut self) -> Option<Bytes>;

	/// Bytes to account for a chunk of `sent` bytes. Sources that expand on
	/// the client side report the expanded size.
	fn produced(&self, sent: usize) -> usize {
		sent
	}
}

/// Response body pulling chunks from a `ChunkSource` on demand.
///
/// The transport polls it only when the socket can take more data, which
/// gives natural backpressure. Every chunk is preceded by one `Pending`
/// (with an immediate wake), so a single stream never holds its worker. The
/// stream ends when `cancel` fires (checked once per chunk) or when the
/// transport drops the body because the peer went away. The active-connection
/// gauge covers the body's lifetime.
pub struct TrapBody<S> {
	source: S,
	cancel: CancellationToken,
	telemetry: Telemetry,
	delay: Duration,
	pause: Option<Pin<Box<Sleep>>>,
	/// Set once this body handed control back to the worker since its last
	/// chunk.
	yielded: bool,
	_connection: ConnectionGuard,
}

impl<S: ChunkSource> TrapBody<S> {
	pub fn new(source: S, cancel: CancellationToken, telemetry: Telemetry, delay: Duration) -> Self {
		let connection = telemetry.connection();
		Self {
			source,
			cancel,
			telemetry,
			delay,
			pause: None,
			yielded: false,
			_connection: connection,
		}
	}
}

impl<S> Drop for TrapBody<S> {
	fn drop(&mut self) {
		debug!("stream closed");
	}
}

impl<S: ChunkSource + Unpin> MessageBody for TrapBody<S> {
	type Error = Infallible;

	fn size(&self) -> BodySize {
		BodySize::Stream
	}

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, Self::Error>>> {
		let this = self.get_mut();

		if this.cancel.is_cancelled() {
			return Poll::Ready(None);
		}

		if let Some(pause) = this.pause.as_mut() {
			ready!(pause.as_mut().poll(cx));
			this.pause = None;
			if this.cancel.is_cancelled() {
				return Poll::Ready(None);
			}
		}

		// A peer that never reads must not keep the worker to itself
		if !this.yielded {
			this.yielded = true;
			cx.waker().wake_by_ref();
			return Poll::Pending;
		}
		this.yielded = false;

		let Some(chunk) = this.source.next_chunk() else {
			return Poll::Ready(None);
		};
		this.telemetry.bytes_sent(this.source.produced(chunk.len()));

		if !this.delay.is_zero() {
			this.pause = Some(Box::pin(sleep(this.delay)));
		}
		Poll::Ready(Some(Ok(chunk)))
	}
}

/// Endless generated text, one pooled buffer per chunk.
pub struct TextSource {
	model: Arc<CorpusModel>,
	pool: Arc<ChunkPool>,
	generator: SequenceGenerator,
}

impl TextSource {
	pub fn new(model: Arc<CorpusModel>, pool: Arc<ChunkPool>) -> Self {
		let generator = SequenceGenerator::from_entropy(&model);
		Self { model, pool, generator }
	}
}

impl ChunkSource for TextSource {
	/// Fills a pooled buffer to near capacity with `token ` pairs and a
	/// trailing newline.
	///
	/// The chunk is split off the pooled buffer, so it shares its allocation;
	/// the buffer goes back to the pool when the guard drops here.
	fn next_chunk(&mut self) -> Option<Bytes> {
		let mut buf = self.pool.acquire();
		let limit = buf.capacity().saturating_sub(HEADROOM);
		self.generator.fill(&self.model, &mut buf, limit, b' ');
		buf.put_u8(b'\n');
		Some(buf.split().freeze())
	}
}
