use std::collections::HashMap;

use super::corpus_model::{State, TokenId};

/// Observed followers of one state, accumulated while a model is built.
///
/// A `Transitions` corresponds to a fixed two-token state (`key`) and counts
/// every token seen right after it in the corpus.
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Responsibilities:
/// - Accumulate follower occurrences during learning
/// - Merge with another accumulator of the same key (parallel learning support)
/// - Expand into a flat, frequency-weighted candidate run when the model freezes
///
/// ## Invariants
/// - All followers belong to the same `key`
/// - Each occurrence count is strictly positive
#[derive(Clone, Debug)]
pub(crate) struct Transitions {
	/// The state these followers were observed after.
	key: State,
	/// Follower token id to number of observations.
	/// Example: { 17 => 42, 3 => 1 }
	followers: HashMap<TokenId, u32>,
}

impl Transitions {
	/// Creates a new empty accumulator for the given state.
	pub(crate) fn new(key: State) -> Self {
		Self {
			key,
			followers: HashMap::new(),
		}
	}

	/// Records one occurrence of `next` following this state.
	pub(crate) fn add(&mut self, next: TokenId) {
		*self.followers.entry(next).or_insert(0) += 1;
	}

	/// Merges another accumulator into this one.
	///
	/// Both must describe the same state. Occurrence counts are summed.
	///
	/// # Errors
	/// Returns an error if the keys do not match.
	pub(crate) fn merge(&mut self, other: &Self) -> Result<(), String> {
		if self.key != other.key {
			return Err(format!("key mismatch: {:?} vs {:?}", self.key, other.key));
		}

		for (next, occurrence) in &other.followers {
			*self.followers.entry(*next).or_insert(0) += *occurrence;
		}

		Ok(())
	}

	/// Total number of recorded observations.
	pub(crate) fn total(&self) -> usize {
		self.followers.values().map(|n| *n as usize).sum()
	}

	/// Appends every follower to `out`, repeated once per observation.
	///
	/// Followers are written in ascending id order so the frozen table does
	/// not depend on hash iteration order. Uniform sampling over the appended
	/// run is then frequency weighted.
	pub(crate) fn expand_into(&self, out: &mut Vec<TokenId>) {
		let mut followers: Vec<(TokenId, u32)> = self.followers.iter().map(|(k, v)| (*k, *v)).collect();
		followers.sort_unstable_by_key(|(id, _)| *id);
		for (id, occurrence) in followers {
			out.extend(std::iter::repeat_n(id, occurrence as usize));
		}
	}
}
