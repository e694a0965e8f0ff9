//! Text handling for comments: cleanup before embedding and word counts.

mod normalize;
mod words;

pub use normalize::{MAX_EMBEDDING_CHARS, normalize_for_embedding, truncate_chars};
pub use words::{WordCounter, WordFrequency, word_frequencies};
