// Audio processing module
// PCM decode/encode plus ordered segment assembly with silence gaps

pub mod assembler;
pub mod format;

pub use assembler::{assemble, AssembledTrack, AudioSegment, ChapterMark};
pub use format::{decode_file, duration_secs, encode_wav};
