mod reassembler;
mod segment;

pub use reassembler::{reassemble, Reassembler, ReassemblyError, SegmentationMode};
pub use segment::VideoSegment;
