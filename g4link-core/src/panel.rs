//! Fixed geometry of the target panel.

/// Panel width in pixels. Even, so every row packs into whole bytes.
pub const PANEL_WIDTH: u32 = 640;

/// Panel height in pixels.
pub const PANEL_HEIGHT: u32 = 480;

/// Number of samples in one full frame.
pub const PANEL_PIXELS: usize = PANEL_WIDTH as usize * PANEL_HEIGHT as usize;

/// Bytes in one packed row (two pixels per byte).
pub const ROW_BYTES: usize = PANEL_WIDTH as usize / 2;

/// Bytes in one packed frame: 480 × 320 = 153 600.
pub const FRAME_BYTES: usize = ROW_BYTES * PANEL_HEIGHT as usize;

/// Highest 4-bit level.
pub const MAX_LEVEL: u8 = 15;

const _: () = assert!(PANEL_WIDTH % 2 == 0);
