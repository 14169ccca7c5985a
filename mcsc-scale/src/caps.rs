// SPDX-License-Identifier: MIT
//! # Capability Table
//!
//! Per-device constants describing what each output channel of the scaler block can do
//! and the limits every planning stage must respect. The table is built once when the
//! device is opened and is never mutated afterwards; planners only borrow it.
//!
//! ## Ratio Bands
//!
//! The ratio constants are integer factors:
//!
//! | Constant | Meaning |
//! |----------|---------|
//! | `ratio_up` | poly stage alone covers `1/ratio_up ..= ratio_up` |
//! | `quality_ratio_down` | deepest poly downscale that keeps full quality |
//! | `max_ratio_down` | deepest poly downscale the hardware accepts at all |
//! | `post_ratio_down` | deepest downscale of the post stage |
//!
//! Reference tables for known hardware revisions are available through [`HwVariant`].

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Capabilities of a single output channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCaps {
    /// Channel has a poly (first-cascade) scaler.
    pub poly: bool,
    /// Channel has a post (second-cascade) scaler.
    pub post: bool,
    /// Channel can write its result to memory.
    pub dma_out: bool,
    /// Channel supports hardware format conversion on its output.
    pub hwfc: bool,
    /// Widest image the post stage accepts as input.
    pub post_max_width: u32,
}

impl ChannelCaps {
    /// Channel with both scaler stages and DMA output.
    pub const fn full(post_max_width: u32) -> Self {
        Self {
            poly: true,
            post: true,
            dma_out: true,
            hwfc: false,
            post_max_width,
        }
    }

    /// Channel with only the poly stage.
    pub const fn poly_only() -> Self {
        Self {
            poly: true,
            post: false,
            dma_out: true,
            hwfc: false,
            post_max_width: 0,
        }
    }
}

/// Device-wide scaler capabilities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    /// One entry per output channel; the channel count is `channels.len()`.
    pub channels: Vec<ChannelCaps>,
    /// Line buffer width: the widest image one hardware pass can process.
    pub line_buffer_width: u32,
    /// Narrowest image the DMA engine can write.
    pub dma_min_width: u32,
    pub ratio_up: u32,
    pub quality_ratio_down: u32,
    pub max_ratio_down: u32,
    pub post_ratio_down: u32,
    /// Width granularity for crop widths and stage destinations.
    pub width_align: u32,
    /// Granularity for crop offsets.
    pub offset_align: u32,
    /// Fractional bits of every programmed ratio.
    pub precision: u32,
}

impl CapabilityTable {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, id: usize) -> Option<&ChannelCaps> {
        self.channels.get(id)
    }

    /// Check the table for values no hardware revision can have.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            bail!("capability table must describe at least one output channel");
        }
        if self.line_buffer_width == 0 {
            bail!("line_buffer_width must be greater than 0");
        }
        if self.width_align == 0 || self.offset_align == 0 {
            bail!("width_align and offset_align must be greater than 0");
        }
        if self.precision == 0 || self.precision > 24 {
            bail!("precision must be within 1..=24, got {}", self.precision);
        }
        for (name, v) in [
            ("ratio_up", self.ratio_up),
            ("quality_ratio_down", self.quality_ratio_down),
            ("max_ratio_down", self.max_ratio_down),
            ("post_ratio_down", self.post_ratio_down),
        ] {
            if v == 0 {
                bail!("{name} must be at least 1");
            }
        }
        if self.quality_ratio_down > self.max_ratio_down {
            bail!(
                "quality_ratio_down ({}) exceeds max_ratio_down ({})",
                self.quality_ratio_down,
                self.max_ratio_down
            );
        }
        for (id, ch) in self.channels.iter().enumerate() {
            if ch.post && ch.post_max_width == 0 {
                bail!("channel {id} has a post stage with post_max_width 0");
            }
        }
        Ok(())
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        HwVariant::Mcsc5.table()
    }
}

/// Reference capability tables for known scaler revisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HwVariant {
    /// Five outputs, the first two with a post stage, 3840 px line buffer.
    #[value(name = "mcsc5")]
    Mcsc5,
    /// Three outputs without post stages, 2560 px line buffer.
    #[value(name = "mcsc3")]
    Mcsc3,
    /// Six outputs, all with a post stage, 5760 px line buffer and 24 bit ratios.
    #[value(name = "mcsc6-wide")]
    Mcsc6Wide,
}

impl HwVariant {
    pub fn table(self) -> CapabilityTable {
        match self {
            HwVariant::Mcsc5 => CapabilityTable {
                channels: vec![
                    ChannelCaps::full(1920),
                    ChannelCaps::full(1920),
                    ChannelCaps::poly_only(),
                    ChannelCaps::poly_only(),
                    ChannelCaps {
                        hwfc: true,
                        ..ChannelCaps::poly_only()
                    },
                ],
                line_buffer_width: 3840,
                dma_min_width: 16,
                ratio_up: 4,
                quality_ratio_down: 4,
                max_ratio_down: 16,
                post_ratio_down: 2,
                width_align: 2,
                offset_align: 2,
                precision: 20,
            },
            HwVariant::Mcsc3 => CapabilityTable {
                channels: vec![ChannelCaps::poly_only(); 3],
                line_buffer_width: 2560,
                dma_min_width: 16,
                ratio_up: 4,
                quality_ratio_down: 4,
                max_ratio_down: 8,
                post_ratio_down: 1,
                width_align: 2,
                offset_align: 2,
                precision: 16,
            },
            HwVariant::Mcsc6Wide => CapabilityTable {
                channels: vec![ChannelCaps::full(2880); 6],
                line_buffer_width: 5760,
                dma_min_width: 32,
                ratio_up: 8,
                quality_ratio_down: 4,
                max_ratio_down: 16,
                post_ratio_down: 2,
                width_align: 4,
                offset_align: 2,
                precision: 24,
            },
        }
    }
}
