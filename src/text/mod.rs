// Text processing module
// Contains narrative chunking and markdown cleanup for speech synthesis

pub mod chunker;
pub mod markdown;

pub use chunker::{split, Chunk};
pub use markdown::clean_for_speech;
