/// Strategy used to split a corpus into tokens.
///
/// # Variants
/// - `Whitespace`: split on any Unicode whitespace.
/// - `Markup`: like `Whitespace`, but an angle-bracket-delimited tag is kept
///   as one atomic token even when it contains whitespace, and a tag glued to
///   surrounding text is split off into its own token.
///
/// An unterminated `<` is treated as ordinary text in `Markup` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tokenizer {
	#[default]
	Whitespace,
	Markup,
}

impl Tokenizer {
	/// Splits `text` into non-empty tokens borrowed from the input.
	pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
		match self {
			Tokenizer::Whitespace => text.split_whitespace().collect(),
			Tokenizer::Markup => split_markup(text),
		}
	}
}

/// Markup-aware splitting.
///
/// Walks the input once, byte offsets only, so tokens stay borrowed slices.
fn split_markup(text: &str) -> Vec<&str> {
	let mut tokens = Vec::new();
	// Start of the current plain-text token, if one is open
	let mut word_start: Option<usize> = None;
	let mut chars = text.char_indices().peekable();

	while let Some((i, c)) = chars.next() {
		if c == '<' {
			if let Some(close) = text[i..].find('>') {
				if let Some(start) = word_start.take() {
					tokens.push(&text[start..i]);
				}
				let end = i + close + 1;
				tokens.push(&text[i..end]);
				// Skip everything inside the tag
				while chars.peek().is_some_and(|(j, _)| *j < end) {
					chars.next();
				}
				continue;
			}
		}

		if c.is_whitespace() {
			if let Some(start) = word_start.take() {
				tokens.push(&text[start..i]);
			}
		} else if word_start.is_none() {
			word_start = Some(i);
		}
	}

	if let Some(start) = word_start {
		tokens.push(&text[start..]);
	}
	tokens
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn whitespace_mode_splits_tags() {
		let tokens = Tokenizer::Whitespace.split("<a href=\"x\">link</a>  text");
		assert_eq!(tokens, vec!["<a", "href=\"x\">link</a>", "text"]);
	}

	#[test]
	fn markup_mode_keeps_tags_atomic() {
		let tokens = Tokenizer::Markup.split("<a href=\"x\">link</a>  text\n<br/>");
		assert_eq!(tokens, vec!["<a href=\"x\">", "link", "</a>", "text", "<br/>"]);
	}

	#[test]
	fn markup_mode_treats_unterminated_bracket_as_text() {
		let tokens = Tokenizer::Markup.split("x < y and z");
		assert_eq!(tokens, vec!["x", "<", "y", "and", "z"]);
	}

	#[test]
	fn empty_input_yields_no_tokens() {
		assert!(Tokenizer::Markup.split("   \n\t ").is_empty());
		assert!(Tokenizer::Whitespace.split("").is_empty());
	}
}
