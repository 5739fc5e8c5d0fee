use crate::{assets::text::TextRaster, foundation::core::Frame, foundation::math::mul_div255_u16};

/// Source-over of one premultiplied RGBA8 pixel onto an opaque RGB8 pixel.
pub fn over_rgb(dst: [u8; 3], src: [u8; 4], opacity: f32) -> [u8; 3] {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u16(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }
    let inv = 255u16 - sa;

    let mut out = [0u8; 3];
    for i in 0..3 {
        let sc = mul_div255_u16(u16::from(src[i]), op);
        let dc = mul_div255_u16(u16::from(dst[i]), inv);
        out[i] = (sc + dc).min(255) as u8;
    }
    out
}

/// `dst = src * opacity + dst * (1 - opacity)` over whole frames of equal size.
pub fn mix_in_place(dst: &mut Frame, src: &Frame, opacity: f32) {
    debug_assert_eq!(dst.dimensions(), src.dimensions());
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return;
    }
    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let inv = 255 - op;
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d = (mul_div255_u16(u16::from(*s), op) + mul_div255_u16(u16::from(*d), inv)).min(255) as u8;
    }
}

/// Draws `raster` with its top-left corner at `(x, y)`, clipped to the frame.
pub fn stamp_raster(dst: &mut Frame, raster: &TextRaster, x: i64, y: i64, opacity: f32) {
    if raster.is_empty() {
        return;
    }
    let (fw, fh) = (i64::from(dst.width()), i64::from(dst.height()));
    for ry in 0..raster.height {
        let dy = y + i64::from(ry);
        if dy < 0 || dy >= fh {
            continue;
        }
        for rx in 0..raster.width {
            let dx = x + i64::from(rx);
            if dx < 0 || dx >= fw {
                continue;
            }
            let src = raster.pixel(rx, ry);
            if src[3] == 0 {
                continue;
            }
            let px = dst.get_pixel_mut(dx as u32, dy as u32);
            px.0 = over_rgb(px.0, src, opacity);
        }
    }
}
