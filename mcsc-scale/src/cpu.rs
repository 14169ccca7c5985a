// SPDX-License-Identifier: MIT
// CPU reference model of the scaler stages built on fast_image_resize (SIMD-accelerated).
// RGBA8 in → RGBA8 out. Crop, poly resize, post resize and flip run in the same order
// the hardware applies them, so a plan can be previewed on a real image.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{ResizeOptions, Resizer};

use crate::geometry::{Rect, Size};
use crate::ratio::StagePlan;

#[derive(Debug)]
pub enum RenderError {
    BufferTooSmall,
    EmptyImage,
    RegionOutOfBounds { region: Rect, bounds: Size },
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for RenderError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for RenderError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::BufferTooSmall => write!(f, "Image buffer too small"),
            RenderError::EmptyImage => write!(f, "Zero-sized image"),
            RenderError::RegionOutOfBounds { region, bounds } => write!(
                f,
                "Region {}x{}+{}+{} outside {}x{} image",
                region.w, region.h, region.x, region.y, bounds.w, bounds.h
            ),
            RenderError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            RenderError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Fir(e) => Some(e),
            RenderError::ImageBuf(e) => Some(e),
            _ => None,
        }
    }
}

/// Pre-allocated scratch for compacting a crop window into tightly packed rows.
pub struct Staging {
    pub(crate) buf: Vec<u8>,
}
impl Staging {
    pub fn with_capacity(cap: usize) -> Self { Self { buf: Vec::with_capacity(cap) } }
    pub fn ensure_len(&mut self, len: usize) { if self.buf.len() < len { self.buf.resize(len, 0); } }
    pub fn as_slice(&self) -> &[u8] { &self.buf }
}

/// Tightly packed RGBA8 image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    pub size: Size,
    pub data: Vec<u8>,
}

impl RgbaImage {
    pub fn new(size: Size) -> Self {
        Self { size, data: vec![0; (size.w as usize) * (size.h as usize) * 4] }
    }

    pub fn from_raw(size: Size, data: Vec<u8>) -> Result<Self, RenderError> {
        if data.len() < (size.w as usize) * (size.h as usize) * 4 {
            return Err(RenderError::BufferTooSmall);
        }
        Ok(Self { size, data })
    }

    fn row_bytes(&self) -> usize { (self.size.w as usize) * 4 }

    /// Copy `region` of `self` into `dst` with its top-left corner at `(at_x, at_y)`.
    pub fn blit(&self, region: Rect, dst: &mut RgbaImage, at_x: u32, at_y: u32) -> Result<(), RenderError> {
        check_region(region, self.size)?;
        check_region(Rect::new(at_x, at_y, region.w, region.h), dst.size)?;
        let n = (region.w as usize) * 4;
        let (src_rb, dst_rb) = (self.row_bytes(), dst.row_bytes());
        for r in 0..region.h as usize {
            let s = (region.y as usize + r) * src_rb + (region.x as usize) * 4;
            let d = (at_y as usize + r) * dst_rb + (at_x as usize) * 4;
            dst.data[d..d + n].copy_from_slice(&self.data[s..s + n]);
        }
        Ok(())
    }

    pub fn flip_horizontal(&mut self) {
        let rb = self.row_bytes();
        let w = self.size.w as usize;
        for row in self.data.chunks_exact_mut(rb) {
            for x in 0..w / 2 {
                let (a, b) = (x * 4, (w - 1 - x) * 4);
                for c in 0..4 {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    pub fn flip_vertical(&mut self) {
        let rb = self.row_bytes();
        let h = self.size.h as usize;
        for y in 0..h / 2 {
            let (top, bottom) = self.data.split_at_mut((h - 1 - y) * rb);
            top[y * rb..(y + 1) * rb].swap_with_slice(&mut bottom[..rb]);
        }
    }
}

fn check_region(region: Rect, bounds: Size) -> Result<(), RenderError> {
    let fits = u64::from(region.x) + u64::from(region.w) <= u64::from(bounds.w)
        && u64::from(region.y) + u64::from(region.h) <= u64::from(bounds.h);
    if fits { Ok(()) } else { Err(RenderError::RegionOutOfBounds { region, bounds }) }
}

/// Extract `roi` from `src` into the tightly packed staging buffer.
fn compact_crop_to_staging(src: &RgbaImage, roi: Rect, staging: &mut Staging) -> Result<(), RenderError> {
    check_region(roi, src.size)?;
    let row_bytes = (roi.w as usize) * 4;
    let pitch = src.row_bytes();
    staging.ensure_len(row_bytes * (roi.h as usize));
    let mut off = 0usize;
    for r in 0..roi.h as usize {
        let row_off = (roi.y as usize + r) * pitch + (roi.x as usize) * 4;
        staging.buf[off..off + row_bytes].copy_from_slice(&src.data[row_off..row_off + row_bytes]);
        off += row_bytes;
    }
    Ok(())
}

/// Resize a tightly packed RGBA8 buffer to `dst_size`.
pub fn resize_rgba(resizer: &mut Resizer, src: &[u8], src_size: Size, dst_size: Size) -> Result<RgbaImage, RenderError> {
    if src_size.is_empty() || dst_size.is_empty() {
        return Err(RenderError::EmptyImage);
    }
    let src_view = TypedImageRef::<U8x4>::from_buffer(src_size.w, src_size.h, src)?;
    let mut out = RgbaImage::new(dst_size);
    let mut dst_image = TypedImage::<U8x4>::from_buffer(dst_size.w, dst_size.h, &mut out.data)?;
    let opts = ResizeOptions::new().use_alpha(false);
    resizer.resize_typed::<U8x4>(&src_view, &mut dst_image, &opts)?;
    Ok(out)
}

/// Run one output's stage chain: crop, poly, post, then flips.
///
/// Disabled stages pass their input through unchanged, matching the hardware bypass.
pub fn run_stages(
    resizer: &mut Resizer,
    src: &RgbaImage,
    crop: Rect,
    poly: &StagePlan,
    post: &StagePlan,
    hflip: bool,
    vflip: bool,
    staging: &mut Staging,
) -> Result<RgbaImage, RenderError> {
    if crop.size().is_empty() {
        return Err(RenderError::EmptyImage);
    }
    compact_crop_to_staging(src, crop, staging)?;
    let crop_len = (crop.w as usize) * (crop.h as usize) * 4;
    let mut current = RgbaImage::from_raw(crop.size(), staging.as_slice()[..crop_len].to_vec())?;

    for stage in [poly, post] {
        if stage.enabled && stage.dst != current.size {
            current = resize_rgba(resizer, &current.data, current.size, stage.dst)?;
        }
    }

    if hflip {
        current.flip_horizontal();
    }
    if vflip {
        current.flip_vertical();
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(size: Size) -> RgbaImage {
        let mut img = RgbaImage::new(size);
        for y in 0..size.h as usize {
            for x in 0..size.w as usize {
                let o = (y * size.w as usize + x) * 4;
                img.data[o..o + 4].copy_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        img
    }

    #[test]
    fn test_run_stages_produces_final_size() {
        let mut resizer = Resizer::new();
        let mut staging = Staging::with_capacity(0);
        let src = gradient(Size::new(64, 32));
        let poly = StagePlan::scaling(Size::new(48, 32), Size::new(24, 16), 20);
        let post = StagePlan::scaling(Size::new(24, 16), Size::new(12, 8), 20);
        let out = run_stages(&mut resizer, &src, Rect::new(8, 0, 48, 32), &poly, &post, false, false, &mut staging).unwrap();
        assert_eq!(out.size, Size::new(12, 8));
        assert_eq!(out.data.len(), 12 * 8 * 4);
    }

    #[test]
    fn test_bypassed_stages_keep_crop() {
        let mut resizer = Resizer::new();
        let mut staging = Staging::with_capacity(0);
        let src = gradient(Size::new(16, 4));
        let pass = StagePlan::bypass(Size::new(4, 2), 20);
        let out = run_stages(&mut resizer, &src, Rect::new(2, 1, 4, 2), &pass, &pass, true, false, &mut staging).unwrap();
        assert_eq!(out.size, Size::new(4, 2));
        // first pixel of the flipped crop is source column 5, row 1
        assert_eq!(&out.data[0..4], &[5, 1, 0, 255]);
    }

    #[test]
    fn test_blit_and_bounds() {
        let src = gradient(Size::new(8, 8));
        let mut dst = RgbaImage::new(Size::new(4, 4));
        src.blit(Rect::new(4, 4, 2, 2), &mut dst, 1, 1).unwrap();
        assert_eq!(&dst.data[(4 + 1) * 4..(4 + 1) * 4 + 4], &[4, 4, 0, 255]);
        assert!(src.blit(Rect::new(4, 4, 2, 2), &mut dst, 3, 3).is_err());
    }

    #[test]
    fn test_vertical_flip() {
        let mut img = gradient(Size::new(2, 3));
        img.flip_vertical();
        assert_eq!(&img.data[0..4], &[0, 2, 0, 255]);
        assert_eq!(&img.data[16..20], &[0, 0, 0, 255]);
    }
}
