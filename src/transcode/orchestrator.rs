use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::ffmpeg::{self, FfmpegError};
use crate::reassembly::VideoSegment;
use crate::timeline;

/// Nominal playback rate for recovered streams. The recorder does not store
/// one; this is the rate the camera captures at.
const NOMINAL_FRAME_RATE: u32 = 10;

const MERGED_FILENAME: &str = "video.mp4";
const CONCAT_LIST_FILENAME: &str = "concat_list.txt";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),
}

/// Drives the external transcoder over recovered segments, one blocking
/// invocation at a time. Intermediate files are deleted only after the call
/// that consumed them succeeded.
pub struct Transcoder {
    output_dir: PathBuf,
}

impl Transcoder {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn elementary_path(&self, sequence: u64) -> PathBuf {
        self.output_dir.join(format!("{sequence}.h264"))
    }

    pub fn container_path(&self, sequence: u64) -> PathBuf {
        self.output_dir.join(format!("{sequence}.mp4"))
    }

    /// Persist a sealed segment's elementary stream.
    pub fn write_elementary(&self, segment: &VideoSegment) -> Result<PathBuf, TranscodeError> {
        let path = self.elementary_path(segment.sequence);
        fs::write(&path, &segment.data)?;
        tracing::debug!(
            sequence = segment.sequence,
            bytes = segment.data.len(),
            path = %path.display(),
            "wrote elementary stream"
        );
        Ok(path)
    }

    /// Repackage one segment's elementary stream into a playable container.
    /// Stream copy only; the compressed payload is never re-encoded. The
    /// elementary file is removed after a successful conversion.
    pub fn convert_segment(&self, sequence: u64) -> Result<PathBuf, TranscodeError> {
        let input = self.elementary_path(sequence);
        let output = self.container_path(sequence);
        ffmpeg::run(&convert_args(&input, &output))?;
        if input.exists() {
            fs::remove_file(&input)?;
        }
        Ok(output)
    }

    /// Extract every frame of a segment as a still image named by its
    /// capture time. Two transcoder calls per frame: isolate the n-th frame
    /// into an intermediate stream, then rasterize it. The intermediate is
    /// removed after each frame; a failed frame is logged and skipped.
    pub fn extract_frames(&self, segment: &VideoSegment) -> Result<usize, TranscodeError> {
        let input = self.elementary_path(segment.sequence);
        let mut extracted = 0;

        for (index, &timestamp_ms) in segment.timestamps_ms.iter().enumerate() {
            let intermediate = self
                .output_dir
                .join(format!("{}_{}.h264", segment.sequence, index));
            let image = self.output_dir.join(format!(
                "{}.png",
                timeline::format_timestamp_filename(timestamp_ms)
            ));

            let result = ffmpeg::run(&isolate_frame_args(&input, index, &intermediate))
                .and_then(|()| ffmpeg::run(&rasterize_args(&intermediate, &image)));
            if intermediate.exists() {
                fs::remove_file(&intermediate)?;
            }
            match result {
                Ok(()) => extracted += 1,
                Err(e) => {
                    tracing::error!(
                        sequence = segment.sequence,
                        frame = index,
                        error = %e,
                        "frame extraction failed, skipping frame"
                    );
                }
            }
        }
        Ok(extracted)
    }

    /// Concatenate the per-segment containers into one file, in sequence
    /// order. The per-segment files are removed only after the merge
    /// succeeded.
    pub fn merge(&self, sequences: &[u64]) -> Result<PathBuf, TranscodeError> {
        let list_path = self.output_dir.join(CONCAT_LIST_FILENAME);
        let output = self.output_dir.join(MERGED_FILENAME);
        fs::write(&list_path, concat_list(sequences))?;

        let result = ffmpeg::run(&merge_args(&list_path, &output));
        if list_path.exists() {
            fs::remove_file(&list_path)?;
        }
        result?;

        for &sequence in sequences {
            let path = self.container_path(sequence);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(output)
    }
}

fn convert_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-f".into(),
        "h264".into(),
        "-r".into(),
        NOMINAL_FRAME_RATE.to_string(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().into_owned(),
    ]
}

fn isolate_frame_args(input: &Path, index: usize, output: &Path) -> Vec<String> {
    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c:v".into(),
        "libx264".into(),
        "-filter:v".into(),
        // The comma is escaped for the filtergraph parser, not for a shell.
        format!("select=gte(n\\,{index})"),
        "-frames:v".into(),
        "1".into(),
        "-f".into(),
        "h264".into(),
        output.to_string_lossy().into_owned(),
    ]
}

fn rasterize_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-frames:v".into(),
        "1".into(),
        "-f".into(),
        "image2".into(),
        output.to_string_lossy().into_owned(),
    ]
}

fn merge_args(list: &Path, output: &Path) -> Vec<String> {
    vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Concat-demuxer list: one `file` directive per segment, sequence order.
fn concat_list(sequences: &[u64]) -> String {
    let mut list = String::new();
    for sequence in sequences {
        list.push_str(&format!("file '{sequence}.mp4'\n"));
    }
    list
}
