/// A reassembled recording chunk: one elementary-stream buffer plus the
/// capture times of the frames folded into it.
///
/// Mutable only while open in the reassembler; sealing hands it downstream
/// as-is. Payload bytes are appended verbatim, never re-encoded.
#[derive(Debug, Clone)]
pub struct VideoSegment {
    /// 0-based counter assigned in arrival order.
    pub sequence: u64,
    pub data: Vec<u8>,
    pub timestamps_ms: Vec<i64>,
}

impl VideoSegment {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            data: Vec::new(),
            timestamps_ms: Vec::new(),
        }
    }

    /// Seed a fresh segment with the codec parameter sets. The recorder
    /// stores the picture parameter set ahead of the sequence parameter set;
    /// that order is kept in the output stream.
    pub fn seed_parameter_sets(&mut self, sps: &[u8], pps: &[u8]) {
        self.data.extend_from_slice(pps);
        self.data.extend_from_slice(sps);
    }

    /// Append one frame payload and its capture time.
    pub fn append_frame(&mut self, payload: &[u8], timestamp_ms: i64) {
        self.data.extend_from_slice(payload);
        self.timestamps_ms.push(timestamp_ms);
    }

    /// Append a frame, recording its capture time only if this segment has
    /// not seen it yet. Membership is checked against the whole list, which
    /// is quadratic but fine at the chunk sizes these recorders produce.
    pub fn append_frame_deduped(&mut self, payload: &[u8], timestamp_ms: i64) {
        self.data.extend_from_slice(payload);
        if !self.timestamps_ms.contains(&timestamp_ms) {
            self.timestamps_ms.push(timestamp_ms);
        }
    }

    pub fn start_time_ms(&self) -> Option<i64> {
        self.timestamps_ms.first().copied()
    }

    pub fn end_time_ms(&self) -> Option<i64> {
        self.timestamps_ms.last().copied()
    }
}
