//! # Output Requests
//!
//! Per-frame description of what each output channel should produce. One
//! [`OutputRequest`] exists per channel of the capability table; channels the frame does
//! not use simply have both output paths disabled.

use mcsc_scale::caps::CapabilityTable;
use mcsc_scale::geometry::{Rect, Size};
use serde::{Deserialize, Serialize};

/// Block width of the compressed output formats, in pixels.
pub const COMPRESSED_BLOCK_WIDTH: u32 = 32;

/// Flip flags of one output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flip {
    #[serde(default)]
    pub horizontal: bool,
    #[serde(default)]
    pub vertical: bool,
}

/// Memory layout of an output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelLayout {
    #[default]
    Yuv420,
    Yuv422,
    Rgb,
}

/// Compression applied by the DMA engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Lossless,
    Lossy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    #[serde(default)]
    pub layout: PixelLayout,
    #[serde(default)]
    pub compression: Compression,
}

/// Alignment of stripe boundaries in output columns for a given output format.
///
/// Compressed outputs are written in fixed-width blocks, so a stripe may only end on a
/// block boundary; chroma-subsampled layouts need even boundaries.
pub fn stripe_align(format: &OutputFormat, caps: &CapabilityTable) -> u32 {
    match (format.compression, format.layout) {
        (Compression::Lossless | Compression::Lossy, _) => COMPRESSED_BLOCK_WIDTH,
        (Compression::None, PixelLayout::Yuv420 | PixelLayout::Yuv422) => caps.width_align.max(2),
        (Compression::None, PixelLayout::Rgb) => caps.width_align.max(1),
    }
}

/// What one output channel should produce this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRequest {
    /// Crop window in full-frame source coordinates.
    pub crop: Rect,
    /// Requested output size.
    pub dst: Size,
    #[serde(default)]
    pub flip: Flip,
    /// On-the-fly output path to the next hardware block.
    #[serde(default)]
    pub otf_out: bool,
    /// Memory output path.
    #[serde(default)]
    pub dma_out: bool,
    /// Restrict each stripe to the part of the output it owns.
    #[serde(default)]
    pub use_out_crop: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

impl OutputRequest {
    /// Memory output of `crop` scaled to `dst`.
    pub fn dma(crop: Rect, dst: Size) -> Self {
        Self {
            crop,
            dst,
            dma_out: true,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.otf_out || self.dma_out
    }
}
