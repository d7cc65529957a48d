//! Reduction of color frames to a single luminance channel.
//!
//! Color carries no useful motion information for this metric and only
//! adds sensor noise, so every frame is compared in luminance.

use crate::capture::{Frame, PixelFormat};
use std::borrow::Cow;

// ITU-R BT.601 weights in 16.16 fixed point.
const R_WEIGHT: u32 = 19_595; // 0.299
const G_WEIGHT: u32 = 38_470; // 0.587
const B_WEIGHT: u32 = 7_471; // 0.114
const ROUND: u32 = 1 << 15;

/// Returns the luminance plane of a frame.
///
/// Luma frames are borrowed as-is.
pub fn luminance(frame: &Frame) -> Cow<'_, [u8]> {
    match frame.format() {
        PixelFormat::Luma8 => Cow::Borrowed(frame.pixels()),
        PixelFormat::Rgb8 => Cow::Owned(
            frame
                .pixels()
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
        ),
        PixelFormat::Bgr8 => Cow::Owned(
            frame
                .pixels()
                .chunks_exact(3)
                .map(|px| luma(px[2], px[1], px[0]))
                .collect(),
        ),
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = R_WEIGHT * r as u32 + G_WEIGHT * g as u32 + B_WEIGHT * b as u32 + ROUND;
    (y >> 16).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_passthrough_borrows() {
        let frame = Frame::luma(vec![7u8; 4], 2, 2, 1);
        assert!(matches!(luminance(&frame), Cow::Borrowed(_)));
    }

    #[test]
    fn test_gray_pixels_keep_their_value() {
        let frame = Frame::new(vec![128u8; 12], 2, 2, PixelFormat::Rgb8, 1);
        assert!(luminance(&frame).iter().all(|&y| y == 128));
    }

    #[test]
    fn test_extremes() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
    }

    #[test]
    fn test_bgr_and_rgb_agree() {
        let rgb = Frame::new(vec![200, 50, 10], 1, 1, PixelFormat::Rgb8, 1);
        let bgr = Frame::new(vec![10, 50, 200], 1, 1, PixelFormat::Bgr8, 1);
        assert_eq!(luminance(&rgb), luminance(&bgr));
        // 0.299*200 + 0.587*50 + 0.114*10 = 90.29
        assert_eq!(luminance(&rgb)[0], 90);
    }
}
