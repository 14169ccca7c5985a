//! Shared fixtures for the planner integration tests.

#![allow(dead_code)]

use mcsc_planner::planning::{Flip, FramePlan, OutputRequest};
use mcsc_scale::caps::{CapabilityTable, HwVariant};
use mcsc_scale::cpu::RgbaImage;
use mcsc_scale::geometry::{Rect, Size};

/// Reference five-output table.
pub fn caps() -> CapabilityTable {
    HwVariant::Mcsc5.table()
}

/// One disabled request per channel.
pub fn idle_outputs(caps: &CapabilityTable) -> Vec<OutputRequest> {
    vec![OutputRequest::default(); caps.channel_count()]
}

/// Memory output restricted to the columns each stripe owns.
pub fn striped_dma(crop: Rect, dst: Size) -> OutputRequest {
    OutputRequest {
        use_out_crop: true,
        ..OutputRequest::dma(crop, dst)
    }
}

pub fn hflipped(crop: Rect, dst: Size) -> OutputRequest {
    OutputRequest {
        flip: Flip {
            horizontal: true,
            vertical: false,
        },
        ..OutputRequest::dma(crop, dst)
    }
}

/// Output columns written for `logical`, one range per configured port, in plan order.
pub fn written_columns(plans: &[FramePlan], logical: usize) -> Vec<(u32, u32)> {
    plans
        .iter()
        .flat_map(|p| p.for_logical(logical))
        .map(|p| (p.dst_x, p.dst_x + p.written().w))
        .collect()
}

/// Assert `ranges` tile `[0, width)` without gap or overlap.
pub fn assert_tiles(ranges: &[(u32, u32)], width: u32) {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();
    let mut cursor = 0;
    for &(start, end) in &sorted {
        assert_eq!(start, cursor, "gap or overlap at column {cursor} in {sorted:?}");
        assert!(end > start, "empty range in {sorted:?}");
        cursor = end;
    }
    assert_eq!(cursor, width, "ranges {sorted:?} do not reach {width}");
}

/// RGBA image whose red channel is the column and green channel the row (mod 256).
pub fn gradient(size: Size) -> RgbaImage {
    let mut img = RgbaImage::new(size);
    for y in 0..size.h as usize {
        for x in 0..size.w as usize {
            let o = (y * size.w as usize + x) * 4;
            img.data[o..o + 4].copy_from_slice(&[x as u8, y as u8, 0, 255]);
        }
    }
    img
}

pub fn pixel(img: &RgbaImage, x: u32, y: u32) -> [u8; 4] {
    let o = ((y * img.size.w + x) * 4) as usize;
    [img.data[o], img.data[o + 1], img.data[o + 2], img.data[o + 3]]
}
