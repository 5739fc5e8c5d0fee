//! Luma histogram equalization followed by a gamma/contrast tone curve.
//!
//! Equalization runs in full-range BT.601 YCbCr on the Y plane only; Cb/Cr pass through.

use crate::foundation::{core::Frame, math::clamp_u8};

/// Tone parameters for one frame.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ColorGrade {
    pub gamma: f64,
    pub contrast: f64,
}

impl ColorGrade {
    pub const IDENTITY: Self = Self {
        gamma: 1.0,
        contrast: 1.0,
    };

    pub fn apply(&self, frame: &Frame) -> Frame {
        let mut planes = YCbCrPlanes::from_rgb(frame);
        planes.equalize_luma();
        let mut out = planes.to_rgb();
        let lut = tone_lut(self.gamma, self.contrast);
        for v in out.iter_mut() {
            *v = lut[*v as usize];
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct YCbCrPlanes {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
}

impl YCbCrPlanes {
    pub fn from_rgb(frame: &Frame) -> Self {
        let n = frame.width() as usize * frame.height() as usize;
        let (mut y, mut cb, mut cr) = (
            Vec::with_capacity(n),
            Vec::with_capacity(n),
            Vec::with_capacity(n),
        );
        for px in frame.pixels() {
            let (r, g, b) = (f64::from(px[0]), f64::from(px[1]), f64::from(px[2]));
            y.push(clamp_u8(0.299 * r + 0.587 * g + 0.114 * b));
            cb.push(clamp_u8(128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b));
            cr.push(clamp_u8(128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b));
        }
        Self {
            width: frame.width(),
            height: frame.height(),
            y,
            cb,
            cr,
        }
    }

    pub fn to_rgb(&self) -> Frame {
        let mut out = Vec::with_capacity(self.y.len() * 3);
        for i in 0..self.y.len() {
            let y = f64::from(self.y[i]);
            let cb = f64::from(self.cb[i]) - 128.0;
            let cr = f64::from(self.cr[i]) - 128.0;
            out.push(clamp_u8(y + 1.402 * cr));
            out.push(clamp_u8(y - 0.344_136 * cb - 0.714_136 * cr));
            out.push(clamp_u8(y + 1.772 * cb));
        }
        Frame::from_raw(self.width, self.height, out).unwrap_or_else(|| Frame::new(self.width, self.height))
    }

    pub fn equalize_luma(&mut self) {
        equalize_plane(&mut self.y);
    }
}

/// Histogram equalization of one 8-bit plane.
///
/// The lowest occupied level maps to 0 and the cumulative histogram is stretched to 255.
/// A plane with a single level is left unchanged.
pub fn equalize_plane(plane: &mut [u8]) {
    if plane.is_empty() {
        return;
    }
    let mut hist = [0u64; 256];
    for &v in plane.iter() {
        hist[v as usize] += 1;
    }
    let total = plane.len() as u64;
    let first = hist.iter().position(|&c| c != 0).unwrap_or(0);
    if hist[first] == total {
        return;
    }

    let scale = 255.0 / (total - hist[first]) as f64;
    let mut lut = [0u8; 256];
    let mut sum = 0u64;
    for i in first + 1..256 {
        sum += hist[i];
        lut[i] = clamp_u8(sum as f64 * scale);
    }
    for v in plane.iter_mut() {
        *v = lut[*v as usize];
    }
}

/// `clip(((v / 255) ^ gamma) * contrast * 255)` for every 8-bit level.
pub fn tone_lut(gamma: f64, contrast: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let v = (i as f64 / 255.0).powf(gamma) * contrast * 255.0;
        *slot = clamp_u8(v);
    }
    lut
}
