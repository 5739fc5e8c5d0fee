//! CPU compositor: walks a [`CompositionPlan`] and produces one canvas-sized frame.

use std::sync::Arc;

use image::imageops::{self, FilterType};

use crate::{
    composition::plan::{CompositionPlan, LayerDesc, LayerFx, LayerSource},
    effects::{
        blend::{mix_in_place, over_rgb},
        blur::blur_rgb8,
        color::ColorGrade,
        guide::draw_guide_line,
        watermark::{Corner, WatermarkStamper},
    },
    foundation::{
        core::{Frame, Rect},
        error::ReelResult,
    },
};

/// Everything that varies from one output frame to the next.
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs<'a> {
    pub main: &'a Frame,
    /// Indexed like the plan's overlay layers. `None` draws nothing for that layer.
    pub overlays: &'a [Option<Arc<Frame>>],
    pub grade: ColorGrade,
    pub corner: Corner,
}

/// Stateless per frame, so one instance can be shared across render threads.
#[derive(Clone, Debug)]
pub struct Compositor {
    plan: CompositionPlan,
    watermark: Option<WatermarkStamper>,
}

impl Compositor {
    pub fn new(plan: CompositionPlan, watermark: Option<WatermarkStamper>) -> Self {
        Self { plan, watermark }
    }

    pub fn plan(&self) -> &CompositionPlan {
        &self.plan
    }

    pub fn compose(&self, inputs: &FrameInputs<'_>) -> ReelResult<Frame> {
        let canvas = self.plan.canvas;
        let mut out = Frame::new(canvas.width, canvas.height);
        for layer in &self.plan.layers {
            match layer.source {
                LayerSource::Main => draw_layer(&mut out, inputs.main, layer, inputs.grade)?,
                LayerSource::Overlay(i) => {
                    if let Some(Some(frame)) = inputs.overlays.get(i) {
                        draw_layer(&mut out, frame, layer, inputs.grade)?;
                    }
                }
                LayerSource::Watermark => {
                    if let Some(stamper) = &self.watermark {
                        stamper.stamp(&mut out, inputs.corner);
                    }
                }
            }
        }
        Ok(out)
    }
}

fn draw_layer(out: &mut Frame, src: &Frame, layer: &LayerDesc, grade: ColorGrade) -> ReelResult<()> {
    if layer.opacity <= 0.0 || layer.dest.is_empty() || layer.crop.is_empty() {
        return Ok(());
    }
    let Some(visible) = layer.dest.intersect(Rect::full(out.width(), out.height())) else {
        return Ok(());
    };
    let vx0 = visible.x.round().max(0.0) as u32;
    let vy0 = visible.y.round().max(0.0) as u32;
    let vx1 = (visible.right().round() as u32).min(out.width());
    let vy1 = (visible.bottom().round() as u32).min(out.height());
    if vx1 <= vx0 || vy1 <= vy0 {
        return Ok(());
    }
    let (vw, vh) = (vx1 - vx0, vy1 - vy0);

    // Part of the crop that lands inside the visible box.
    let sx = layer.crop.w / layer.dest.w;
    let sy = layer.crop.h / layer.dest.h;
    let sub = Rect::new(
        layer.crop.x + (f64::from(vx0) - layer.dest.x) * sx,
        layer.crop.y + (f64::from(vy0) - layer.dest.y) * sy,
        f64::from(vw) * sx,
        f64::from(vh) * sy,
    );
    let cropped = crop_source(src, sub);

    let blur = layer.effects.iter().find_map(|fx| match *fx {
        LayerFx::Blur {
            radius,
            sigma,
            downsample,
        } => Some((radius, sigma, downsample)),
        _ => None,
    });
    let mut patch = match blur {
        Some((radius, sigma, downsample)) if radius > 0 => {
            blurred_resize(&cropped, vw, vh, radius, sigma, downsample)?
        }
        _ => resize_to(&cropped, vw, vh),
    };

    for fx in &layer.effects {
        match *fx {
            LayerFx::ColorGrade => patch = grade.apply(&patch),
            LayerFx::GuideLine { thickness, color } => {
                let area = Rect::new(
                    layer.dest.x - f64::from(vx0),
                    layer.dest.y - f64::from(vy0),
                    layer.dest.w,
                    layer.dest.h,
                );
                draw_guide_line(&mut patch, area, thickness, color);
            }
            LayerFx::Blur { .. } => {}
        }
    }

    blit(out, &patch, vx0, vy0, layer.opacity);
    Ok(())
}

/// Integer pixel box covering `r`, clamped to the source and never empty.
fn crop_source(src: &Frame, r: Rect) -> Frame {
    let (w, h) = src.dimensions();
    let x0 = (r.x.floor().max(0.0) as u32).min(w.saturating_sub(1));
    let y0 = (r.y.floor().max(0.0) as u32).min(h.saturating_sub(1));
    let x1 = (r.right().ceil().max(0.0) as u32).clamp(x0 + 1, w);
    let y1 = (r.bottom().ceil().max(0.0) as u32).clamp(y0 + 1, h);
    if (x0, y0, x1, y1) == (0, 0, w, h) {
        return src.clone();
    }
    imageops::crop_imm(src, x0, y0, x1 - x0, y1 - y0).to_image()
}

fn resize_to(img: &Frame, w: u32, h: u32) -> Frame {
    if img.dimensions() == (w, h) {
        return img.clone();
    }
    imageops::resize(img, w, h, FilterType::Triangle)
}

/// Blurs at `1/downsample` of the output size, then scales back up.
fn blurred_resize(
    img: &Frame,
    w: u32,
    h: u32,
    radius: u32,
    sigma: f32,
    downsample: u32,
) -> ReelResult<Frame> {
    let d = downsample.max(1);
    let small = resize_to(img, (w / d).max(1), (h / d).max(1));
    let radius = (radius / d).max(1);
    let sigma = sigma / d as f32;
    let blurred = blur_rgb8(&small, radius, sigma)?;
    Ok(resize_to(&blurred, w, h))
}

fn blit(out: &mut Frame, patch: &Frame, x: u32, y: u32, opacity: f32) {
    if opacity >= 1.0 {
        imageops::replace(out, patch, i64::from(x), i64::from(y));
        return;
    }
    if (x, y) == (0, 0) && patch.dimensions() == out.dimensions() {
        mix_in_place(out, patch, opacity);
        return;
    }
    for (px, py, p) in patch.enumerate_pixels() {
        let (dx, dy) = (x + px, y + py);
        if dx >= out.width() || dy >= out.height() {
            continue;
        }
        let d = out.get_pixel_mut(dx, dy);
        d.0 = over_rgb(d.0, [p[0], p[1], p[2], 255], opacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assets::text::TextRaster,
        config::CompositionConfig,
        foundation::core::Canvas,
    };

    fn small_cfg() -> CompositionConfig {
        CompositionConfig {
            target: Canvas {
                width: 36,
                height: 64,
            },
            blur_radius: 4,
            blur_sigma: 2.0,
            blur_downsample: 2,
            ..CompositionConfig::default()
        }
    }

    fn inputs<'a>(main: &'a Frame, overlays: &'a [Option<Arc<Frame>>]) -> FrameInputs<'a> {
        FrameInputs {
            main,
            overlays,
            grade: ColorGrade::IDENTITY,
            corner: Corner::TopLeft,
        }
    }

    #[test]
    fn output_matches_canvas_for_any_source_shape() {
        for (w, h) in [(96, 54), (54, 96), (40, 40), (200, 10), (3, 90)] {
            let plan = CompositionPlan::for_source(w, h, &small_cfg());
            let comp = Compositor::new(plan, None);
            let main = Frame::from_pixel(w, h, image::Rgb([200, 10, 10]));
            let out = comp.compose(&inputs(&main, &[])).unwrap();
            assert_eq!(out.dimensions(), (36, 64));
        }
    }

    #[test]
    fn wide_source_leaves_no_uncovered_pixels() {
        let plan = CompositionPlan::for_source(96, 54, &small_cfg());
        let comp = Compositor::new(plan, None);
        let main = Frame::from_pixel(96, 54, image::Rgb([120, 130, 140]));
        let out = comp.compose(&inputs(&main, &[])).unwrap();
        assert!(out.pixels().all(|p| p.0 == [120, 130, 140]));
    }

    #[test]
    fn foreground_keeps_the_center_of_a_wide_source() {
        // Left half red, right half blue; a narrow portrait slice sits on the seam.
        let main = Frame::from_fn(160, 90, |x, _| {
            if x < 80 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        let plan = CompositionPlan::for_source(160, 90, &small_cfg());
        let comp = Compositor::new(plan, None);
        let out = comp.compose(&inputs(&main, &[])).unwrap();
        assert_eq!(out.get_pixel(2, 32).0, [255, 0, 0]);
        assert_eq!(out.get_pixel(33, 32).0, [0, 0, 255]);
    }

    #[test]
    fn overlay_is_mixed_at_its_opacity() {
        let plan = CompositionPlan::for_source(36, 64, &small_cfg()).with_overlay(0, 36, 64, 0.5);
        let comp = Compositor::new(plan, None);
        let main = Frame::from_pixel(36, 64, image::Rgb([0, 0, 0]));
        let overlay = Arc::new(Frame::from_pixel(36, 64, image::Rgb([200, 200, 200])));
        let out = comp.compose(&inputs(&main, &[Some(overlay)])).unwrap();
        let v = out.get_pixel(18, 32)[0];
        assert!((99..=101).contains(&v), "got {v}");
    }

    #[test]
    fn absent_overlay_frame_is_skipped() {
        let plan = CompositionPlan::for_source(36, 64, &small_cfg()).with_overlay(0, 36, 64, 1.0);
        let comp = Compositor::new(plan, None);
        let main = Frame::from_pixel(36, 64, image::Rgb([7, 7, 7]));
        let out = comp.compose(&inputs(&main, &[None])).unwrap();
        assert!(out.pixels().all(|p| p.0 == [7, 7, 7]));
    }

    #[test]
    fn watermark_lands_in_requested_corner() {
        let raster = TextRaster::from_premul(2, 2, vec![255; 16]).unwrap();
        let stamper = WatermarkStamper {
            raster,
            opacity: 1.0,
            margin_px: 3,
        };
        let plan = CompositionPlan::for_source(36, 64, &small_cfg()).with_watermark();
        let comp = Compositor::new(plan, Some(stamper));
        let main = Frame::from_pixel(36, 64, image::Rgb([0, 0, 0]));
        let mut frame_inputs = inputs(&main, &[]);
        frame_inputs.corner = Corner::BottomRight;
        let out = comp.compose(&frame_inputs).unwrap();
        assert_eq!(out.get_pixel(31, 59).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(3, 3).0, [0, 0, 0]);
    }

    #[test]
    fn guide_line_crosses_the_foreground() {
        let plan = CompositionPlan::for_source(36, 64, &small_cfg()).with_foreground_effect(
            LayerFx::GuideLine {
                thickness: 2,
                color: [255, 255, 255],
            },
        );
        let comp = Compositor::new(plan, None);
        let main = Frame::from_pixel(36, 64, image::Rgb([0, 0, 0]));
        let out = comp.compose(&inputs(&main, &[])).unwrap();
        assert_eq!(out.get_pixel(18, 31).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(18, 10).0, [0, 0, 0]);
    }
}
