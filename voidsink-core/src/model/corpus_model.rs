use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use log::{info, warn};
use rand::Rng;
use serde::Serialize;

use super::tokenizer::Tokenizer;
use super::transitions::Transitions;
use crate::error::ConfigurationError;
use crate::io::{get_filename, read_corpus};

/// Interned token identifier, an index into the model vocabulary.
pub type TokenId = u32;

/// A lookup key: two consecutive tokens, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct State(pub TokenId, pub TokenId);

/// Pair used when a corpus is too small to learn anything from.
const FALLBACK_STATE: (&str, &str) = ("the", "void");

/// Partial tables per CPU when building in parallel.
const CHUNK_FACTOR: usize = 8;

/// Below this many windows per chunk, threads cost more than they save.
const MIN_CHUNK: usize = 4096;

/// Offset/length of one state's run inside the flat candidate array.
#[derive(Debug, Clone, Copy)]
struct Span {
	offset: u32,
	len: u32,
}

/// Summary of a built model, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelStats {
	/// Tokens read from the corpus.
	pub tokens: usize,
	/// Distinct tokens.
	pub vocabulary: usize,
	/// Distinct states (restart points).
	pub states: usize,
	/// Recorded observations, duplicates included.
	pub transitions: usize,
}

/// Immutable second-order word model.
///
/// The `CorpusModel` maps every state (two consecutive tokens) seen in a
/// training corpus to the multiset of tokens observed right after it, and
/// keeps the list of all known states as random restart points.
///
/// # Representation
/// - Tokens are interned once; states and candidates are plain `u32` ids
/// - States are sorted by id pair; `spans[i]` locates the candidates of
///   `states[i]` inside one contiguous `candidates` array
/// - Duplicated observations are stored repeatedly, so a uniform draw over a
///   span is a frequency-weighted draw over followers
///
/// # Invariants
/// - At least one state exists (a degenerate corpus gets a fallback state)
/// - Every span is non-empty
/// - Nothing is mutated after `build`; all queries take `&self`
///
/// Randomness is passed in by the caller. Concurrent readers share the model
/// through an `Arc` without any lock.
#[derive(Debug)]
pub struct CorpusModel {
	/// Token id to text.
	vocabulary: Vec<Box<str>>,
	/// Text to token id.
	lookup: HashMap<Box<str>, TokenId>,
	/// Known states, sorted.
	states: Vec<State>,
	/// State to its position in `states` / `spans`.
	index: HashMap<State, u32>,
	spans: Vec<Span>,
	candidates: Vec<TokenId>,
	/// Number of tokens the corpus contained.
	tokens: usize,
}

impl CorpusModel {
	/// Loads a corpus file and builds a model from it.
	///
	/// # Errors
	/// Returns `ConfigurationError::Unreadable` if the file cannot be read or
	/// is not valid UTF-8.
	pub fn from_path<P: AsRef<Path>>(path: P, tokenizer: Tokenizer) -> Result<Self, ConfigurationError> {
		let text = read_corpus(&path).map_err(|source| ConfigurationError::Unreadable {
			path: path.as_ref().to_path_buf(),
			source,
		})?;

		let model = Self::build(&text, tokenizer);
		match serde_json::to_string(&model.stats()) {
			Ok(stats) => info!("corpus model loaded: corpus={} stats={stats}", get_filename(&path)),
			Err(e) => warn!("corpus model loaded: corpus={} stats unavailable: {e}", get_filename(&path)),
		}
		Ok(model)
	}

	/// Builds a model from raw corpus text.
	///
	/// Slides a 3-token window over the token sequence and records every
	/// `(tok[i], tok[i+1]) -> tok[i+2]` observation.
	///
	/// # Notes
	/// - A corpus with fewer than 3 tokens yields a degenerate model holding
	///   only the `("the", "void") -> {"void"}` fallback state.
	/// - Large corpora are counted on several threads; the result is the same
	///   whatever the thread scheduling was.
	pub fn build(text: &str, tokenizer: Tokenizer) -> Self {
		let words = tokenizer.split(text);
		if words.len() < 3 {
			warn!("corpus has {} token(s), using the fallback state", words.len());
			return Self::fallback(words.len());
		}

		let mut vocabulary: Vec<Box<str>> = Vec::new();
		let mut lookup: HashMap<Box<str>, TokenId> = HashMap::new();
		let ids: Vec<TokenId> = words
			.iter()
			.map(|word| Self::intern(&mut vocabulary, &mut lookup, word))
			.collect();

		let table = Self::count_transitions(&ids);
		Self::freeze(vocabulary, lookup, table, words.len())
	}

	/// Model used when the corpus cannot provide a single window.
	fn fallback(tokens: usize) -> Self {
		let mut vocabulary = Vec::new();
		let mut lookup = HashMap::new();
		let first = Self::intern(&mut vocabulary, &mut lookup, FALLBACK_STATE.0);
		let second = Self::intern(&mut vocabulary, &mut lookup, FALLBACK_STATE.1);

		let key = State(first, second);
		let mut transitions = Transitions::new(key);
		transitions.add(second);

		let mut table = HashMap::new();
		table.insert(key, transitions);
		Self::freeze(vocabulary, lookup, table, tokens)
	}

	fn intern(vocabulary: &mut Vec<Box<str>>, lookup: &mut HashMap<Box<str>, TokenId>, word: &str) -> TokenId {
		if let Some(id) = lookup.get(word) {
			return *id;
		}
		let id = vocabulary.len() as TokenId;
		vocabulary.push(word.into());
		lookup.insert(word.into(), id);
		id
	}

	/// Counts all windows of `ids`, splitting the work across threads.
	///
	/// # Behavior
	/// - Splits the windows into chunks (based on CPU cores * factor).
	/// - Each thread counts its chunk into a partial table; chunks overlap by
	///   two tokens so no window is lost at a boundary.
	/// - Partial tables are collected over an MPSC channel and merged.
	fn count_transitions(ids: &[TokenId]) -> HashMap<State, Transitions> {
		let windows = ids.len() - 2;
		let chunks = num_cpus::get() * CHUNK_FACTOR;
		let chunk_size = windows.div_ceil(chunks).max(MIN_CHUNK);

		let (tx, rx) = mpsc::channel();
		thread::scope(|scope| {
			for start in (0..windows).step_by(chunk_size) {
				let end = (start + chunk_size).min(windows);
				let slice = &ids[start..end + 2];
				let tx = tx.clone();

				scope.spawn(move || {
					let mut partial: HashMap<State, Transitions> = HashMap::new();
					for window in slice.windows(3) {
						let key = State(window[0], window[1]);
						partial.entry(key).or_insert_with(|| Transitions::new(key)).add(window[2]);
					}
					// The receiver outlives the scope, sending cannot fail
					let _ = tx.send(partial);
				});
			}
		});
		drop(tx);

		let mut table: HashMap<State, Transitions> = HashMap::new();
		for partial in rx.iter() {
			for (key, transitions) in partial {
				match table.get_mut(&key) {
					Some(existing) => {
						if let Err(e) = existing.merge(&transitions) {
							warn!("skipping partial transitions: {e}");
						}
					}
					None => {
						table.insert(key, transitions);
					}
				}
			}
		}
		table
	}

	/// Lays the accumulated table out as sorted states and one flat candidate array.
	fn freeze(
		vocabulary: Vec<Box<str>>,
		lookup: HashMap<Box<str>, TokenId>,
		table: HashMap<State, Transitions>,
		tokens: usize,
	) -> Self {
		let mut entries: Vec<(State, Transitions)> = table.into_iter().collect();
		entries.sort_unstable_by_key(|(state, _)| *state);

		let total: usize = entries.iter().map(|(_, t)| t.total()).sum();
		let mut states = Vec::with_capacity(entries.len());
		let mut index = HashMap::with_capacity(entries.len());
		let mut spans = Vec::with_capacity(entries.len());
		let mut candidates = Vec::with_capacity(total);

		for (position, (state, transitions)) in entries.into_iter().enumerate() {
			let offset = candidates.len();
			transitions.expand_into(&mut candidates);
			spans.push(Span {
				offset: offset as u32,
				len: (candidates.len() - offset) as u32,
			});
			index.insert(state, position as u32);
			states.push(state);
		}

		Self { vocabulary, lookup, states, index, spans, candidates, tokens }
	}

	/// Returns a uniformly random known state.
	///
	/// Used to start a new stream.
	pub fn seed<R: Rng + ?Sized>(&self, rng: &mut R) -> State {
		if self.states.is_empty() {
			// `build` always leaves at least the fallback state
			return State(0, 0);
		}
		self.states[rng.random_range(0..self.states.len())]
	}

	/// Draws the token following `state`.
	///
	/// If `state` is unknown, teleports: draws from a uniformly random known
	/// state instead. Never fails, never returns an empty token.
	pub fn next<R: Rng + ?Sized>(&self, state: State, rng: &mut R) -> TokenId {
		match self.index.get(&state) {
			Some(position) => self.sample(*position as usize, rng),
			None => self.teleport(rng),
		}
	}

	/// String form of `next`.
	///
	/// Words that are not in the vocabulary simply make the state unknown,
	/// which triggers a teleport.
	pub fn next_word<R: Rng + ?Sized>(&self, first: &str, second: &str, rng: &mut R) -> &str {
		let id = match self.state_of(first, second) {
			Some(state) => self.next(state, rng),
			None => self.teleport(rng),
		};
		self.token(id)
	}

	/// Builds a state from two words, if both are in the vocabulary.
	///
	/// The state itself may still be unknown to the model.
	pub fn state_of(&self, first: &str, second: &str) -> Option<State> {
		Some(State(*self.lookup.get(first)?, *self.lookup.get(second)?))
	}

	/// Text of a token id.
	///
	/// # Panics
	/// If `id` was not produced by this model.
	pub fn token(&self, id: TokenId) -> &str {
		&self.vocabulary[id as usize]
	}

	/// Both words of a state.
	pub fn words(&self, state: State) -> (&str, &str) {
		(self.token(state.0), self.token(state.1))
	}

	/// Whether the model recorded any follower for `state`.
	pub fn contains(&self, state: State) -> bool {
		self.index.contains_key(&state)
	}

	/// Every candidate recorded for `state`, duplicates included.
	pub fn candidates(&self, state: State) -> &[TokenId] {
		match self.index.get(&state) {
			Some(position) => self.span(*position as usize),
			None => &[],
		}
	}

	/// Iterator over all known states.
	pub fn states(&self) -> impl Iterator<Item = State> + '_ {
		self.states.iter().copied()
	}

	pub fn stats(&self) -> ModelStats {
		ModelStats {
			tokens: self.tokens,
			vocabulary: self.vocabulary.len(),
			states: self.states.len(),
			transitions: self.candidates.len(),
		}
	}

	fn teleport<R: Rng + ?Sized>(&self, rng: &mut R) -> TokenId {
		self.sample(rng.random_range(0..self.states.len()), rng)
	}

	fn sample<R: Rng + ?Sized>(&self, position: usize, rng: &mut R) -> TokenId {
		let span = self.span(position);
		span[rng.random_range(0..span.len())]
	}

	fn span(&self, position: usize) -> &[TokenId] {
		let Span { offset, len } = self.spans[position];
		&self.candidates[offset as usize..(offset + len) as usize]
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;
	use std::sync::Arc;

	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;

	const FOX: &str = "The quick brown fox jumps over the lazy dog";

	fn all_candidates(model: &CorpusModel) -> HashSet<String> {
		model
			.states()
			.flat_map(|s| model.candidates(s).iter().map(|id| model.token(*id).to_owned()).collect::<Vec<_>>())
			.collect()
	}

	#[test]
	fn single_candidate_is_deterministic() {
		let model = CorpusModel::build(FOX, Tokenizer::Whitespace);
		let state = model.state_of("The", "quick").unwrap();
		let followers: Vec<&str> = model.candidates(state).iter().map(|id| model.token(*id)).collect();
		assert_eq!(followers, vec!["brown"]);

		let mut rng = StdRng::seed_from_u64(7);
		for _ in 0..20 {
			assert_eq!(model.next_word("The", "quick", &mut rng), "brown");
		}
	}

	#[test]
	fn unknown_state_teleports_into_known_candidates() {
		let model = CorpusModel::build(FOX, Tokenizer::Whitespace);
		let known = all_candidates(&model);
		let mut rng = StdRng::seed_from_u64(1);
		for _ in 0..200 {
			let word = model.next_word("unknown", "sequence", &mut rng);
			assert!(!word.is_empty());
			assert!(known.contains(word), "{word} is not a known candidate");
		}
	}

	#[test]
	fn known_words_in_unseen_order_also_teleport() {
		let model = CorpusModel::build(FOX, Tokenizer::Whitespace);
		let state = model.state_of("dog", "The").unwrap();
		assert!(!model.contains(state));
		let known = all_candidates(&model);
		let mut rng = StdRng::seed_from_u64(3);
		let id = model.next(state, &mut rng);
		assert!(known.contains(model.token(id)));
	}

	#[test]
	fn next_never_returns_empty_tokens() {
		let text = "a b c a b d a c b d d a b c c c a";
		let model = CorpusModel::build(text, Tokenizer::Whitespace);
		let mut rng = StdRng::seed_from_u64(11);
		let words: Vec<&str> = text.split_whitespace().collect();
		for first in &words {
			for second in &words {
				assert!(!model.next_word(first, second, &mut rng).is_empty());
			}
		}
	}

	#[test]
	fn duplicates_weight_sampling() {
		let model = CorpusModel::build("x y a x y a x y a x y b", Tokenizer::Whitespace);
		let state = model.state_of("x", "y").unwrap();
		let followers: Vec<&str> = model.candidates(state).iter().map(|id| model.token(*id)).collect();
		assert_eq!(followers.iter().filter(|w| **w == "a").count(), 3);
		assert_eq!(followers.iter().filter(|w| **w == "b").count(), 1);

		let mut rng = StdRng::seed_from_u64(5);
		let draws = 4000;
		let a = (0..draws).filter(|_| model.next_word("x", "y", &mut rng) == "a").count();
		// Expected 3000; generous bounds keep the test stable
		assert!((2600..3400).contains(&a), "a drawn {a} times");
	}

	#[test]
	fn tiny_corpus_falls_back() {
		for text in ["", "lonely", "two words"] {
			let model = CorpusModel::build(text, Tokenizer::Whitespace);
			assert_eq!(model.stats().states, 1);
			let mut rng = StdRng::seed_from_u64(0);
			let state = model.seed(&mut rng);
			assert_eq!(model.words(state), ("the", "void"));
			assert_eq!(model.token(model.next(state, &mut rng)), "void");
			assert_eq!(model.next_word("anything", "else", &mut rng), "void");
		}
	}

	#[test]
	fn markup_tokens_survive_in_the_model() {
		let model = CorpusModel::build("<p class=\"a\">hello world</p> <p class=\"a\">hello there</p>", Tokenizer::Markup);
		let state = model.state_of("<p class=\"a\">", "hello").unwrap();
		let mut followers: Vec<&str> = model.candidates(state).iter().map(|id| model.token(*id)).collect();
		followers.sort();
		assert_eq!(followers, vec!["there", "world"]);
	}

	#[test]
	fn stats_count_windows() {
		let model = CorpusModel::build(FOX, Tokenizer::Whitespace);
		let stats = model.stats();
		assert_eq!(stats.tokens, 9);
		assert_eq!(stats.transitions, 7);
		assert_eq!(stats.states, 7);
		// "The" and "the" are distinct tokens
		assert_eq!(stats.vocabulary, 9);
	}

	#[test]
	fn stats_serialize_as_one_flat_object() {
		let stats = CorpusModel::build(FOX, Tokenizer::Whitespace).stats();
		let value = serde_json::to_value(stats).unwrap();
		assert_eq!(value, serde_json::json!({ "tokens": 9, "vocabulary": 9, "states": 7, "transitions": 7 }));
	}

	#[test]
	fn parallel_build_matches_across_runs() {
		// Large enough to span several chunks
		let text: String = (0..60_000).map(|i| format!("w{} ", (i * 7919) % 97)).collect();
		let a = CorpusModel::build(&text, Tokenizer::Whitespace);
		let b = CorpusModel::build(&text, Tokenizer::Whitespace);
		assert_eq!(a.stats(), b.stats());
		assert_eq!(a.stats().transitions, 60_000 - 2);
		for state in a.states().take(500) {
			assert_eq!(a.candidates(state), b.candidates(state));
		}
	}

	#[test]
	fn shared_model_serves_many_threads() {
		let model = Arc::new(CorpusModel::build(FOX, Tokenizer::Whitespace));
		let known = Arc::new(all_candidates(&model));
		let handles: Vec<_> = (0..8)
			.map(|i| {
				let model = Arc::clone(&model);
				let known = Arc::clone(&known);
				thread::spawn(move || {
					let mut rng = StdRng::seed_from_u64(i);
					let mut state = model.seed(&mut rng);
					for _ in 0..10_000 {
						let next = model.next(state, &mut rng);
						assert!(known.contains(model.token(next)));
						state = State(state.1, next);
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}
	}

	#[test]
	fn unreadable_corpus_is_a_configuration_error() {
		let err = CorpusModel::from_path("./no/such/corpus.txt", Tokenizer::Whitespace).unwrap_err();
		assert!(matches!(err, ConfigurationError::Unreadable { .. }));
	}
}
