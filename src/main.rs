use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod db;
mod publish;
mod reassembly;
mod timeline;
mod transcode;

use db::{FrameDatabase, RawFrameRecord};
use publish::TimelinePublisher;
use reassembly::{Reassembler, SegmentationMode, VideoSegment};
use timeline::TimelineBuilder;
use transcode::{TranscodeError, Transcoder};

#[derive(Parser)]
#[command(
    name = "nestrec",
    version,
    about = "Recover playable video from a camera frame database"
)]
struct Cli {
    /// Path to the frame database file
    #[arg(short, long)]
    database: PathBuf,

    /// Directory for recovered video and the timeline manifest
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Merge all recovered recordings into a single video file
    #[arg(short, long)]
    merge: bool,

    /// Save every recovered frame as a still image instead of videos
    #[arg(short, long)]
    frame: bool,

    /// Upload the recovered timeline to the search index
    #[arg(short = 'a', long)]
    add_timeline: bool,

    /// Search index endpoint used with --add-timeline
    #[arg(long, default_value = "http://localhost:9200")]
    index_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nestrec=debug".parse()?))
        .init();

    let cli = Cli::parse();

    // Fatal before any output is touched.
    let database = FrameDatabase::open(&cli.database)?;
    std::fs::create_dir_all(&cli.output)?;

    let records = database.read_frame_records()?;
    tracing::info!(
        records = records.len(),
        database = %cli.database.display(),
        "loaded frame records"
    );

    if cli.frame {
        export_frames(&records, &cli)?;
    } else {
        recover_videos(&records, &cli).await?;
    }

    Ok(())
}

/// Image-extraction path: every frame of every chunk becomes a still image
/// named by its capture time.
fn export_frames(records: &[RawFrameRecord], cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let segments = reassembly::reassemble(records, SegmentationMode::GopStart)?;
    tracing::info!(chunks = segments.len(), "reassembled frame chunks");

    let transcoder = Transcoder::new(&cli.output);
    let mut images = 0;
    for segment in &segments {
        let elementary = transcoder.write_elementary(segment)?;
        match transcoder.extract_frames(segment) {
            Ok(extracted) => images += extracted,
            Err(e) => {
                tracing::error!(
                    sequence = segment.sequence,
                    error = %e,
                    "frame extraction failed for chunk"
                );
            }
        }
        if elementary.exists() {
            std::fs::remove_file(&elementary)?;
        }
    }

    tracing::info!(images, "saved frame images");
    Ok(())
}

/// Whole-database path: each recording becomes a playable container, with a
/// timeline manifest and optional merge and index upload.
async fn recover_videos(
    records: &[RawFrameRecord],
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    let transcoder = Transcoder::new(&cli.output);
    let mut timeline_builder = TimelineBuilder::new("mp4");
    let mut sequences = Vec::new();

    // Each recording is persisted the moment it seals, so only one chunk is
    // ever held in memory.
    let mut reassembler = Reassembler::new(SegmentationMode::ParameterSets);
    for record in records {
        reassembler.push(record)?;
        while let Some(segment) = reassembler.pop_sealed() {
            persist_segment(&transcoder, &mut timeline_builder, &mut sequences, &segment)?;
        }
    }
    reassembler.finish();
    while let Some(segment) = reassembler.pop_sealed() {
        persist_segment(&transcoder, &mut timeline_builder, &mut sequences, &segment)?;
    }
    tracing::info!(videos = sequences.len(), "extracted video files");

    // A failed conversion loses only that recording.
    let mut converted = Vec::new();
    for &sequence in &sequences {
        match transcoder.convert_segment(sequence) {
            Ok(path) => {
                tracing::debug!(sequence, path = %path.display(), "converted recording");
                converted.push(sequence);
            }
            Err(e) => {
                tracing::error!(sequence, error = %e, "conversion failed, skipping recording");
            }
        }
    }

    if cli.merge {
        match transcoder.merge(&converted) {
            Ok(path) => {
                tracing::info!(
                    videos = converted.len(),
                    path = %path.display(),
                    "merged recordings"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "merge failed, per-recording files kept");
            }
        }
    }

    let entries = timeline_builder.into_entries();
    let manifest = timeline::write_manifest(&cli.output, &entries)?;
    tracing::info!(path = %manifest.display(), "wrote timeline manifest");

    if cli.add_timeline {
        let publisher = TimelinePublisher::new(&cli.index_url);
        if let Err(e) = publisher.publish(&entries, "start_time").await {
            tracing::error!(error = %e, "timeline upload failed; recovered files are unaffected");
        }
    }

    Ok(())
}

fn persist_segment(
    transcoder: &Transcoder,
    timeline_builder: &mut TimelineBuilder,
    sequences: &mut Vec<u64>,
    segment: &VideoSegment,
) -> Result<(), TranscodeError> {
    timeline_builder.add(segment);
    transcoder.write_elementary(segment)?;
    sequences.push(segment.sequence);
    Ok(())
}
