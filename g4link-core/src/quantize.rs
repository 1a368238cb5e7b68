//! 8-bit intensity → 4-bit level conversion.
//!
//! `level = clamp(round_half_even(15 · f(s / 255)), 0, 15)` where `f`
//! applies the optional gamma curve and then the optional inversion.
//!
//! Because the input domain is only 256 values, [`Quantizer`] precomputes
//! a lookup table once per option set and converts a full frame with a
//! single table lookup per sample.

use serde::{Deserialize, Serialize};

use crate::frame::{Frame, LevelMatrix};
use crate::panel::MAX_LEVEL;

/// Conversion options shared by the streamer and the still-image path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeOptions {
    /// Exponent applied to the normalized sample. `None`, zero, negative or
    /// non-finite values leave the curve linear.
    pub gamma: Option<f32>,
    /// Map bright to dark (`1 - v`) before scaling.
    pub invert: bool,
}

impl QuantizeOptions {
    pub fn new(gamma: Option<f32>, invert: bool) -> Self {
        Self { gamma, invert }
    }

    /// Gamma actually applied after dropping malformed values.
    pub fn effective_gamma(&self) -> Option<f32> {
        self.gamma.filter(|g| g.is_finite() && *g > 0.0)
    }
}

/// Quantize a single sample.
pub fn quantize(sample: u8, gamma: Option<f32>, invert: bool) -> u8 {
    let mut v = sample as f32 / 255.0;
    if let Some(g) = gamma.filter(|g| g.is_finite() && *g > 0.0) {
        v = v.powf(g);
    }
    if invert {
        v = 1.0 - v;
    }
    (v * MAX_LEVEL as f32)
        .round_ties_even()
        .clamp(0.0, MAX_LEVEL as f32) as u8
}

/// Table-driven quantizer for whole frames.
#[derive(Debug, Clone)]
pub struct Quantizer {
    options: QuantizeOptions,
    table: [u8; 256],
}

impl Quantizer {
    pub fn new(options: QuantizeOptions) -> Self {
        let gamma = options.effective_gamma();
        let mut table = [0u8; 256];
        for (s, slot) in table.iter_mut().enumerate() {
            *slot = quantize(s as u8, gamma, options.invert);
        }
        Self { options, table }
    }

    pub fn options(&self) -> QuantizeOptions {
        self.options
    }

    /// Level for one sample.
    pub fn level(&self, sample: u8) -> u8 {
        self.table[sample as usize]
    }

    /// Quantize every sample of a panel frame.
    pub fn apply(&self, frame: &Frame) -> LevelMatrix {
        let levels = frame
            .samples()
            .iter()
            .map(|&s| self.table[s as usize])
            .collect();
        LevelMatrix::from_quantized(levels)
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new(QuantizeOptions::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────
