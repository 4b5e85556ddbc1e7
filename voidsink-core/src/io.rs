use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::io;

/// Reads a whole corpus file into memory.
///
/// - The file must be valid UTF-8; invalid data surfaces as `InvalidData`
/// - No line splitting happens here, tokenization is the model's job
pub(crate) fn read_corpus<P: AsRef<Path>>(filename: P) -> io::Result<String> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents)
}

/// Extracts the base filename without extension.
///
/// Examples:
/// - `"./assets/corpus.txt"` → `"corpus"`
/// - `"corpus"` → `"corpus"`
///
/// Falls back to the full path when there is no file stem.
pub(crate) fn get_filename<P: AsRef<Path>>(input_path: P) -> String {
	let path = input_path.as_ref();
	match path.file_stem() {
		Some(stem) => stem.to_string_lossy().to_string(),
		None => path.display().to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filename_strips_directory_and_extension() {
		assert_eq!(get_filename("./assets/corpus.txt"), "corpus");
		assert_eq!(get_filename("corpus"), "corpus");
	}

	#[test]
	fn missing_file_is_an_error() {
		let err = read_corpus("./definitely/not/here.txt").unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotFound);
	}
}
