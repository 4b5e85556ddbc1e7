use bytes::BytesMut;
use rand::SeedableRng;
use rand::rngs::StdRng;
use voidsink_core::{ChunkPool, CorpusModel, SequenceGenerator, Tokenizer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Corpus path from the first argument, or the bundled one
    let path = std::env::args().nth(1).unwrap_or_else(|| "./assets/corpus.txt".to_owned());

    // Build the model once; it is immutable afterwards and can be shared
    // behind an Arc by any number of streams
    let model = CorpusModel::from_path(&path, Tokenizer::Whitespace)?;
    let stats = model.stats();
    println!(
        "{path}: {} tokens, {} distinct, {} states, {} transitions",
        stats.tokens, stats.vocabulary, stats.states, stats.transitions
    );

    // A seeded generator always produces the same stream
    let mut generator = SequenceGenerator::seed(&model, StdRng::seed_from_u64(7));
    let words: Vec<&str> = generator.tokens(&model).take(40).collect();
    println!("seeded: {}", words.join(" "));

    // Single-step lookups; unknown pairs teleport to a random known state
    let mut rng = rand::rng();
    println!("after 'of the': {}", model.next_word("of", "the", &mut rng));
    println!("after 'unknown sequence': {}", model.next_word("unknown", "sequence", &mut rng));

    // What a streaming endpoint does per chunk: fill a pooled buffer
    let pool = ChunkPool::default();
    let mut generator = SequenceGenerator::from_entropy(&model);
    for i in 0..3 {
        let mut buf = pool.acquire();
        let limit = buf.capacity() - 256;
        generator.fill(&model, &mut buf, limit, b' ');
        let chunk = buf.split().freeze();
        println!("chunk {}: {} bytes, starts with {:?}", i + 1, chunk.len(), preview(&chunk));
    }
    println!("pool: {} allocated, {} reused", pool.allocated(), pool.reused());

    // A plain BytesMut works too
    let mut scratch = BytesMut::with_capacity(128);
    generator.fill(&model, &mut scratch, 100, b'\n');
    println!("{}", String::from_utf8_lossy(&scratch));

    Ok(())
}

fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(48)]).into_owned()
}
