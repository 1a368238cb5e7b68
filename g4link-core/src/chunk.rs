//! Row-range partitioning of a frame and the binary chunk header.
//!
//! ## Wire format
//!
//! Every binary-channel message is one chunk:
//!
//! ```text
//! row_start:  u16 LE  (2)
//! row_count:  u16 LE  (2)
//! payload:    [u8]    row_count × 320 packed bytes
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::LinkError;
use crate::frame::LevelMatrix;
use crate::pack::pack_rows;
use crate::panel::{PANEL_HEIGHT, ROW_BYTES};

// ── Constants ────────────────────────────────────────────────────

/// Rows per chunk when the requested value is out of range.
pub const DEFAULT_ROWS_PER_CHUNK: u16 = 10;

/// Largest chunk the controller's WebSocket stack accepts without
/// fragmenting (60 × 320 = 19 200 payload bytes).
pub const MAX_ROWS_PER_CHUNK: u16 = 60;

/// Clamp a requested chunk height to `1..=60`, falling back to 10.
pub fn clamp_rows_per_chunk(requested: i64) -> u16 {
    if (1..=MAX_ROWS_PER_CHUNK as i64).contains(&requested) {
        requested as u16
    } else {
        DEFAULT_ROWS_PER_CHUNK
    }
}

// ── RowRange ─────────────────────────────────────────────────────

/// A contiguous `[row_start, row_start + row_count)` slice of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub row_start: u16,
    pub row_count: u16,
}

impl RowRange {
    pub const fn new(row_start: u16, row_count: u16) -> Self {
        Self {
            row_start,
            row_count,
        }
    }

    /// One past the last row.
    pub const fn row_end(&self) -> u16 {
        self.row_start + self.row_count
    }

    /// Packed payload size for this range.
    pub const fn payload_len(&self) -> usize {
        self.row_count as usize * ROW_BYTES
    }
}

// ── ChunkPlan ────────────────────────────────────────────────────

/// Ordered partition of `[0, height)` into row ranges.
///
/// Yields `ceil(height / rows_per_chunk)` ranges; every range has
/// `rows_per_chunk` rows except possibly the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    height: u16,
    rows_per_chunk: u16,
}

impl ChunkPlan {
    /// Plan for `height` rows. `rows_per_chunk` outside `1..=60` becomes 10.
    pub fn new(height: u16, rows_per_chunk: u16) -> Self {
        Self {
            height,
            rows_per_chunk: clamp_rows_per_chunk(rows_per_chunk as i64),
        }
    }

    /// Plan covering the full panel height.
    pub fn panel(rows_per_chunk: u16) -> Self {
        Self::new(PANEL_HEIGHT as u16, rows_per_chunk)
    }

    pub fn rows_per_chunk(&self) -> u16 {
        self.rows_per_chunk
    }

    /// Number of chunks in the plan.
    pub fn len(&self) -> usize {
        (self.height as usize).div_ceil(self.rows_per_chunk as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    /// Row ranges in ascending order.
    pub fn ranges(&self) -> impl Iterator<Item = RowRange> + '_ {
        (0..self.height)
            .step_by(self.rows_per_chunk as usize)
            .map(|start| RowRange::new(start, self.rows_per_chunk.min(self.height - start)))
    }

    /// Pack every range of `matrix` into chunks, in row order.
    pub fn chunks<'a>(&'a self, matrix: &'a LevelMatrix) -> impl Iterator<Item = Chunk> + 'a {
        self.ranges().map(move |range| Chunk {
            range,
            payload: pack_rows(matrix, range),
        })
    }
}

// ── Chunk ────────────────────────────────────────────────────────

/// A packed row range, the unit of network transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub range: RowRange,
    pub payload: Bytes,
}

impl Chunk {
    /// Header plus payload as one binary message.
    pub fn encode(&self) -> Bytes {
        let header = ChunkHeader::from(self.range);
        let mut buf = BytesMut::with_capacity(ChunkHeader::SIZE + self.payload.len());
        buf.put_slice(&header.encode());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a binary message back into a chunk, checking the payload size.
    pub fn decode(msg: &[u8]) -> Result<Self, LinkError> {
        let header = ChunkHeader::decode(msg)?;
        let range = RowRange::new(header.row_start, header.row_count);
        let payload = &msg[ChunkHeader::SIZE..];
        if payload.len() != range.payload_len() {
            return Err(LinkError::Other(format!(
                "chunk payload is {} bytes, header implies {}",
                payload.len(),
                range.payload_len(),
            )));
        }
        Ok(Self {
            range,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

// ── ChunkHeader ──────────────────────────────────────────────────

/// Row-range prefix of a binary-channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub row_start: u16,
    pub row_count: u16,
}

impl ChunkHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 4;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.row_start.to_le_bytes());
        buf[2..4].copy_from_slice(&self.row_count.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < Self::SIZE {
            return Err(LinkError::Other(format!(
                "ChunkHeader too short: {} < {}",
                data.len(),
                Self::SIZE,
            )));
        }
        Ok(Self {
            row_start: u16::from_le_bytes([data[0], data[1]]),
            row_count: u16::from_le_bytes([data[2], data[3]]),
        })
    }
}

impl From<RowRange> for ChunkHeader {
    fn from(r: RowRange) -> Self {
        Self {
            row_start: r.row_start,
            row_count: r.row_count,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PANEL_PIXELS;

    #[test]
    fn every_chunk_size_covers_the_panel() {
        for r in 1..=MAX_ROWS_PER_CHUNK {
            let plan = ChunkPlan::panel(r);
            let ranges: Vec<_> = plan.ranges().collect();
            assert_eq!(ranges.len(), plan.len());
            assert_eq!(ranges.len(), 480usize.div_ceil(r as usize));

            let mut next = 0u16;
            for range in &ranges {
                assert_eq!(range.row_start, next, "gap or overlap at r={r}");
                assert!(range.row_count > 0 && range.row_count <= r);
                next = range.row_end();
            }
            assert_eq!(next, 480);
            assert_eq!(ranges.iter().map(|c| c.row_count as u32).sum::<u32>(), 480);
        }
    }

    #[test]
    fn ten_rows_gives_48_chunks() {
        let plan = ChunkPlan::panel(10);
        assert_eq!(plan.len(), 48);
        assert!(plan.ranges().all(|r| r.row_count == 10));
    }

    #[test]
    fn remainder_lands_in_last_chunk() {
        let ranges: Vec<_> = ChunkPlan::panel(7).ranges().collect();
        assert_eq!(ranges.len(), 69);
        assert_eq!(*ranges.last().unwrap(), RowRange::new(476, 4));
    }

    #[test]
    fn out_of_range_sizes_clamp_to_default() {
        assert_eq!(clamp_rows_per_chunk(0), 10);
        assert_eq!(clamp_rows_per_chunk(-5), 10);
        assert_eq!(clamp_rows_per_chunk(61), 10);
        assert_eq!(clamp_rows_per_chunk(60), 60);
        assert_eq!(clamp_rows_per_chunk(1), 1);
        assert_eq!(ChunkPlan::panel(0).rows_per_chunk(), 10);
        assert_eq!(ChunkPlan::panel(100).len(), 48);
    }

    #[test]
    fn header_roundtrip_is_little_endian() {
        let h = ChunkHeader {
            row_start: 0x0102,
            row_count: 60,
        };
        let bytes = h.encode();
        assert_eq!(bytes, [0x02, 0x01, 60, 0]);
        assert_eq!(ChunkHeader::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn header_too_short() {
        assert!(ChunkHeader::decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn chunk_message_layout() {
        let m = LevelMatrix::from_levels(vec![0xA; PANEL_PIXELS]).unwrap();
        let plan = ChunkPlan::panel(60);
        let chunk = plan.chunks(&m).nth(1).unwrap();
        let msg = chunk.encode();
        assert_eq!(msg.len(), 4 + 60 * 320);
        assert_eq!(&msg[..4], &[60, 0, 60, 0]);
        assert!(msg[4..].iter().all(|&b| b == 0xAA));
        assert_eq!(Chunk::decode(&msg).unwrap(), chunk);
    }

    #[test]
    fn decode_rejects_short_payload() {
        let mut msg = ChunkHeader { row_start: 0, row_count: 2 }.encode().to_vec();
        msg.extend_from_slice(&[0u8; 100]);
        assert!(Chunk::decode(&msg).is_err());
    }
}
