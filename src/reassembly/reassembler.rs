use std::collections::VecDeque;

use thiserror::Error;

use super::VideoSegment;
use crate::db::RawFrameRecord;

#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error("record {order_key} continues a chunk, but none is open")]
    OrphanContinuation { order_key: i64 },
    #[error("record {order_key} starts a group but carries no parameter sets")]
    MissingParameterSets { order_key: i64 },
}

/// How chunk boundaries are recognized in the record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// A new chunk starts at each explicit group-of-pictures marker and is
    /// sealed by the record's completion flag. Used for frame extraction.
    GopStart,
    /// A new chunk starts wherever a record carries fresh parameter sets;
    /// the completion flag is not consulted. Used for whole-recording
    /// recovery.
    ParameterSets,
}

/// Folds the ordered record stream back into elementary-stream chunks.
///
/// At most one segment is open at a time. Sealed segments queue up in
/// arrival order and are handed out through [`Reassembler::pop_sealed`], so
/// a caller can persist each one as it completes instead of holding the
/// whole recovery in memory.
pub struct Reassembler {
    mode: SegmentationMode,
    open: Option<VideoSegment>,
    sealed: VecDeque<VideoSegment>,
    next_sequence: u64,
}

impl Reassembler {
    pub fn new(mode: SegmentationMode) -> Self {
        Self {
            mode,
            open: None,
            sealed: VecDeque::new(),
            next_sequence: 0,
        }
    }

    /// Fold one record into the stream.
    pub fn push(&mut self, record: &RawFrameRecord) -> Result<(), ReassemblyError> {
        match self.mode {
            SegmentationMode::GopStart => self.push_gop(record),
            SegmentationMode::ParameterSets => self.push_parameter_sets(record),
        }
    }

    fn push_gop(&mut self, record: &RawFrameRecord) -> Result<(), ReassemblyError> {
        if record.starts_gop() {
            let (sps, pps) =
                record
                    .parameter_sets()
                    .ok_or(ReassemblyError::MissingParameterSets {
                        order_key: record.order_key,
                    })?;
            self.open_chunk(record, sps, pps);
        } else {
            let open = self
                .open
                .as_mut()
                .ok_or(ReassemblyError::OrphanContinuation {
                    order_key: record.order_key,
                })?;
            open.append_frame(&record.payload, record.timestamp_ms);
        }

        if record.chunk_complete {
            self.seal_open();
        }
        Ok(())
    }

    fn push_parameter_sets(&mut self, record: &RawFrameRecord) -> Result<(), ReassemblyError> {
        if let Some((sps, pps)) = record.parameter_sets() {
            self.open_chunk(record, sps, pps);
        } else {
            let open = self
                .open
                .as_mut()
                .ok_or(ReassemblyError::OrphanContinuation {
                    order_key: record.order_key,
                })?;
            open.append_frame_deduped(&record.payload, record.timestamp_ms);
        }
        Ok(())
    }

    /// Seal whatever is open and start a new chunk seeded with this record's
    /// parameter sets and payload.
    fn open_chunk(&mut self, record: &RawFrameRecord, sps: &[u8], pps: &[u8]) {
        self.seal_open();
        let mut segment = VideoSegment::new(self.next_sequence);
        self.next_sequence += 1;
        segment.seed_parameter_sets(sps, pps);
        segment.append_frame(&record.payload, record.timestamp_ms);
        tracing::debug!(
            record = record.order_key,
            sequence = segment.sequence,
            "opening new chunk"
        );
        self.open = Some(segment);
    }

    fn seal_open(&mut self) {
        if let Some(segment) = self.open.take() {
            tracing::debug!(
                sequence = segment.sequence,
                bytes = segment.data.len(),
                frames = segment.timestamps_ms.len(),
                "sealed chunk"
            );
            self.sealed.push_back(segment);
        }
    }

    /// Next completed segment, in arrival order of first contributing record.
    pub fn pop_sealed(&mut self) -> Option<VideoSegment> {
        self.sealed.pop_front()
    }

    /// Seal any still-open tail. Data accumulated since the last completed
    /// chunk must survive an input that ends without a completion flag.
    pub fn finish(&mut self) {
        self.seal_open();
    }
}

/// Reassemble a full record set in one call.
pub fn reassemble(
    records: &[RawFrameRecord],
    mode: SegmentationMode,
) -> Result<Vec<VideoSegment>, ReassemblyError> {
    let mut reassembler = Reassembler::new(mode);
    let mut segments = Vec::new();
    for record in records {
        reassembler.push(record)?;
        while let Some(segment) = reassembler.pop_sealed() {
            segments.push(segment);
        }
    }
    reassembler.finish();
    while let Some(segment) = reassembler.pop_sealed() {
        segments.push(segment);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gop(order_key: i64, ts: i64, sps: &[u8], pps: &[u8], payload: &[u8], complete: bool) -> RawFrameRecord {
        RawFrameRecord {
            order_key,
            timestamp_ms: ts,
            gop_start_rowid: crate::db::GOP_START_SENTINEL,
            sps: Some(sps.to_vec()),
            pps: Some(pps.to_vec()),
            payload: payload.to_vec(),
            chunk_complete: complete,
        }
    }

    fn cont(order_key: i64, ts: i64, payload: &[u8], complete: bool) -> RawFrameRecord {
        RawFrameRecord {
            order_key,
            timestamp_ms: ts,
            gop_start_rowid: order_key,
            sps: None,
            pps: None,
            payload: payload.to_vec(),
            chunk_complete: complete,
        }
    }

    #[test]
    fn two_chunks_second_sealed_by_end_of_input() {
        let records = vec![
            gop(1, 10, b"S1", b"P1", b"A", false),
            cont(2, 20, b"B", true),
            gop(3, 30, b"S2", b"P2", b"C", false),
            cont(4, 40, b"D", false),
        ];
        let segments = reassemble(&records, SegmentationMode::GopStart).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].sequence, 0);
        assert_eq!(segments[0].data, b"P1S1AB");
        assert_eq!(segments[0].timestamps_ms, vec![10, 20]);
        assert_eq!(segments[1].sequence, 1);
        assert_eq!(segments[1].data, b"P2S2CD");
        assert_eq!(segments[1].timestamps_ms, vec![30, 40]);
    }

    #[test]
    fn tail_without_completion_flag_is_not_dropped() {
        let records = vec![gop(1, 10, b"S", b"P", b"A", false), cont(2, 20, b"B", false)];
        let segments = reassemble(&records, SegmentationMode::GopStart).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].data, b"PSAB");
    }

    #[test]
    fn group_start_seals_a_still_open_chunk() {
        // No completion flag anywhere; the boundary itself must flush, so no
        // bytes are lost.
        let records = vec![
            gop(1, 10, b"S1", b"P1", b"A", false),
            gop(2, 20, b"S2", b"P2", b"B", false),
        ];
        let segments = reassemble(&records, SegmentationMode::GopStart).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].data, b"P1S1A");
        assert_eq!(segments[1].data, b"P2S2B");
    }

    #[test]
    fn concatenated_output_preserves_every_input_byte() {
        let records = vec![
            gop(1, 10, b"S1", b"P1", b"aa", false),
            cont(2, 20, b"bb", false),
            cont(3, 30, b"cc", true),
            gop(4, 40, b"S2", b"P2", b"dd", false),
            cont(5, 50, b"ee", false),
        ];
        let segments = reassemble(&records, SegmentationMode::GopStart).unwrap();
        let recovered: Vec<u8> = segments.iter().flat_map(|s| s.data.clone()).collect();
        assert_eq!(recovered, b"P1S1aabbccP2S2ddee");
    }

    #[test]
    fn single_record_chunk() {
        let records = vec![gop(1, 10, b"S", b"P", b"A", true)];
        let segments = reassemble(&records, SegmentationMode::GopStart).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].data, b"PSA");
        assert_eq!(segments[0].timestamps_ms, vec![10]);
    }

    #[test]
    fn leading_continuation_is_reported() {
        let records = vec![cont(1, 10, b"A", false)];
        let err = reassemble(&records, SegmentationMode::GopStart).unwrap_err();
        assert!(matches!(err, ReassemblyError::OrphanContinuation { order_key: 1 }));

        let err = reassemble(&records, SegmentationMode::ParameterSets).unwrap_err();
        assert!(matches!(err, ReassemblyError::OrphanContinuation { order_key: 1 }));
    }

    #[test]
    fn continuation_after_a_sealed_chunk_is_reported() {
        let records = vec![gop(1, 10, b"S", b"P", b"A", true), cont(2, 20, b"B", false)];
        let err = reassemble(&records, SegmentationMode::GopStart).unwrap_err();
        assert!(matches!(err, ReassemblyError::OrphanContinuation { order_key: 2 }));
    }

    #[test]
    fn group_start_without_parameter_sets_is_reported() {
        let mut record = gop(1, 10, b"S", b"P", b"A", false);
        record.sps = None;
        let err = reassemble(&[record], SegmentationMode::GopStart).unwrap_err();
        assert!(matches!(err, ReassemblyError::MissingParameterSets { order_key: 1 }));
    }

    #[test]
    fn parameter_set_mode_splits_on_header_presence_only() {
        // The completion flag on record 1 must not seal the chunk in this
        // mode; only the headers on record 3 do.
        let records = vec![
            gop(1, 10, b"S1", b"P1", b"A", true),
            cont(2, 20, b"B", false),
            gop(3, 30, b"S2", b"P2", b"C", false),
        ];
        let segments = reassemble(&records, SegmentationMode::ParameterSets).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].data, b"P1S1AB");
        assert_eq!(segments[1].data, b"P2S2C");
    }

    #[test]
    fn parameter_set_mode_dedupes_timestamps() {
        let records = vec![
            gop(1, 10, b"S", b"P", b"A", false),
            cont(2, 20, b"B", false),
            cont(3, 10, b"C", false),
            cont(4, 20, b"D", false),
        ];
        let segments = reassemble(&records, SegmentationMode::ParameterSets).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].data, b"PSABCD");
        assert_eq!(segments[0].timestamps_ms, vec![10, 20]);
    }

    #[test]
    fn gop_mode_keeps_duplicate_timestamps() {
        let records = vec![
            gop(1, 10, b"S", b"P", b"A", false),
            cont(2, 10, b"B", false),
        ];
        let segments = reassemble(&records, SegmentationMode::GopStart).unwrap();
        assert_eq!(segments[0].timestamps_ms, vec![10, 10]);
    }

    #[test]
    fn sealed_chunks_stream_out_while_pushing() {
        let mut reassembler = Reassembler::new(SegmentationMode::ParameterSets);
        reassembler
            .push(&gop(1, 10, b"S1", b"P1", b"A", false))
            .unwrap();
        assert!(reassembler.pop_sealed().is_none());

        reassembler
            .push(&gop(2, 20, b"S2", b"P2", b"B", false))
            .unwrap();
        let first = reassembler.pop_sealed().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.data, b"P1S1A");

        reassembler.finish();
        let second = reassembler.pop_sealed().unwrap();
        assert_eq!(second.sequence, 1);
        assert!(reassembler.pop_sealed().is_none());
    }
}
