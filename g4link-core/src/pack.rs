//! Nibble packing: two 4-bit levels per byte.
//!
//! ## Wire layout
//!
//! ```text
//! byte[i] = (level[2i] & 0xF) << 4 | (level[2i + 1] & 0xF)
//! ```
//!
//! The earlier (left) pixel lands in the high nibble. Rows are packed
//! independently and concatenated row-major. A row with an odd pixel count
//! packs its last pixel with a zero low nibble; the fixed 640-pixel panel
//! never produces one.

use bytes::{BufMut, Bytes, BytesMut};

use crate::chunk::RowRange;
use crate::frame::LevelMatrix;
use crate::panel::{PANEL_WIDTH, ROW_BYTES};

/// Pack one row of levels, appending to `out`.
pub fn pack_row_into(levels: &[u8], out: &mut impl BufMut) {
    let mut pairs = levels.chunks_exact(2);
    for pair in &mut pairs {
        out.put_u8((pair[0] & 0x0F) << 4 | (pair[1] & 0x0F));
    }
    if let [last] = pairs.remainder() {
        out.put_u8((last & 0x0F) << 4);
    }
}

/// Pack one row of levels into a new buffer of `ceil(len / 2)` bytes.
pub fn pack_row(levels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(levels.len().div_ceil(2));
    pack_row_into(levels, &mut out);
    out
}

/// Expand packed bytes back into one level per byte.
pub fn unpack_row(packed: &[u8]) -> Vec<u8> {
    packed
        .iter()
        .flat_map(|&b| [b >> 4, b & 0x0F])
        .collect()
}

/// Pack the rows covered by `range` into a chunk payload.
pub fn pack_rows(matrix: &LevelMatrix, range: RowRange) -> Bytes {
    let mut out = BytesMut::with_capacity(range.row_count as usize * ROW_BYTES);
    for row in matrix
        .rows(range.row_start, range.row_count)
        .chunks_exact(PANEL_WIDTH as usize)
    {
        pack_row_into(row, &mut out);
    }
    out.freeze()
}

/// Pack the whole matrix (153 600 bytes) for the upload endpoint.
pub fn pack_frame(matrix: &LevelMatrix) -> Bytes {
    let mut out = BytesMut::with_capacity(crate::panel::FRAME_BYTES);
    pack_row_into(matrix.levels(), &mut out);
    out.freeze()
}

// ── Tests ────────────────────────────────────────────────────────
