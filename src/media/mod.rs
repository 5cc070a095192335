// External media engine module
// ffmpeg/ffprobe location and invocation, transcoding, M4B packaging

pub mod ffmpeg;
pub mod package;
pub mod transcode;

pub use ffmpeg::FfmpegTools;
pub use package::package;
pub use transcode::transcode;
