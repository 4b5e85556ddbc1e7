use std::fmt::Write as _;
use std::ops::RangeInclusive;

use rand::Rng;
use voidsink_core::{CorpusModel, SequenceGenerator};

/// Renders an "Index of" page for `path` listing generated sub-directories.
///
/// The page links to `../` and to a random number (within `links`) of
/// relative sub-directories named after generated words, so a crawler that
/// follows them only ever goes deeper.
pub fn render<R: Rng>(path: &str, model: &CorpusModel, generator: &mut SequenceGenerator<R>, links: RangeInclusive<usize>) -> String {
	let path = html_escape(path);
	let count = generator.rng_mut().random_range(links);

	let mut page = String::with_capacity(256 + count * 48);
	let _ = write!(
		page,
		"<!DOCTYPE html><html><head><title>Index of {path}</title></head><body><h1>Index of {path}</h1><hr><pre>"
	);
	page.push_str("<a href=\"../\">../</a>\n");

	for _ in 0..count {
		let name = directory_name(generator.advance(model));
		let _ = writeln!(page, "<a href=\"{name}/\">{name}/</a>");
	}

	page.push_str("</pre><hr></body></html>");
	page
}

/// Keeps ASCII alphanumerics; short results get a `folder` prefix.
fn directory_name(word: &str) -> String {
	let clean: String = word.chars().filter(char::is_ascii_alphanumeric).collect();
	if clean.len() < 3 { format!("folder{clean}") } else { clean }
}

fn html_escape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			c => out.push(c),
		}
	}
	out
}
