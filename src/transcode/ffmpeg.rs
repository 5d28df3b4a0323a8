use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("ffmpeg not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Run one ffmpeg invocation to completion.
///
/// Blocking and checked: a non-zero exit surfaces the tool's stderr instead
/// of assuming the output file appeared.
pub fn run(args: &[String]) -> Result<(), FfmpegError> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(args)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FfmpegError::NotFound
            } else {
                FfmpegError::Io(e)
            }
        })?;

    if !output.status.success() {
        return Err(FfmpegError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
