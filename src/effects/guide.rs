use crate::foundation::core::{Frame, Rect};

/// Horizontal line through the vertical middle of `area`, clipped to the frame.
pub fn draw_guide_line(frame: &mut Frame, area: Rect, thickness: u32, rgb: [u8; 3]) {
    if thickness == 0 || area.is_empty() {
        return;
    }
    let (fw, fh) = (f64::from(frame.width()), f64::from(frame.height()));
    let x0 = area.x.max(0.0).floor() as u32;
    let x1 = area.right().min(fw).ceil().max(0.0) as u32;
    let center = area.y + area.h / 2.0;
    let y0 = (center - f64::from(thickness) / 2.0).round().max(0.0) as u32;
    let y1 = (f64::from(y0) + f64::from(thickness)).min(fh) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            frame.put_pixel(x, y, image::Rgb(rgb));
        }
    }
}
