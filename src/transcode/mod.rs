mod ffmpeg;
mod orchestrator;

pub use ffmpeg::FfmpegError;
pub use orchestrator::{TranscodeError, Transcoder};
