use bytes::{BufMut, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::corpus_model::{CorpusModel, State, TokenId};

/// Per-stream cursor over a shared `CorpusModel`.
///
/// # Responsibilities
/// - Hold the last two emitted tokens (the cursor)
/// - Own the stream's random source, so the shared model never needs one
/// - Produce one unbounded, lazy token sequence
///
/// A generator is owned by a single task and is never rewound: to restart,
/// drop it and seed a new one. It borrows the model only for the duration of
/// each call, which lets a connection hold an `Arc<CorpusModel>` next to it.
#[derive(Debug, Clone)]
pub struct SequenceGenerator<R = StdRng> {
	cursor: State,
	rng: R,
}

impl SequenceGenerator<StdRng> {
	/// Seeds a generator with a fresh `StdRng` drawn from the thread RNG.
	pub fn from_entropy(model: &CorpusModel) -> Self {
		Self::seed(model, StdRng::from_rng(&mut rand::rng()))
	}
}

impl<R: Rng> SequenceGenerator<R> {
	/// Starts a stream at a random known state of `model`.
	///
	/// With a seeded `rng` the whole sequence is reproducible.
	pub fn seed(model: &CorpusModel, mut rng: R) -> Self {
		let cursor = model.seed(&mut rng);
		Self { cursor, rng }
	}

	/// Emits the next token and shifts the cursor onto it.
	///
	/// Infallible and O(1): unknown states teleport inside the model.
	pub fn advance<'m>(&mut self, model: &'m CorpusModel) -> &'m str {
		let id = self.advance_id(model);
		model.token(id)
	}

	/// Id form of `advance`.
	pub fn advance_id(&mut self, model: &CorpusModel) -> TokenId {
		let next = model.next(self.cursor, &mut self.rng);
		self.cursor = State(self.cursor.1, next);
		next
	}

	/// Infinite iterator over the sequence.
	pub fn tokens<'a, 'm>(&'a mut self, model: &'m CorpusModel) -> impl Iterator<Item = &'m str> + 'a
	where
		'm: 'a,
	{
		std::iter::repeat_with(move || self.advance(model))
	}

	/// Appends `token + separator` to `buf` until its length reaches `limit`.
	///
	/// The last token may overshoot `limit`; callers leave headroom below the
	/// buffer capacity so that does not reallocate in practice.
	pub fn fill(&mut self, model: &CorpusModel, buf: &mut BytesMut, limit: usize, separator: u8) {
		while buf.len() < limit {
			let token = self.advance(model);
			buf.extend_from_slice(token.as_bytes());
			buf.put_u8(separator);
		}
	}

	/// The current two-token cursor.
	pub fn cursor(&self) -> State {
		self.cursor
	}

	/// The stream's random source, for callers that need extra draws
	/// (link counts, ids) consistent with the stream.
	pub fn rng_mut(&mut self) -> &mut R {
		&mut self.rng
	}
}
