//! Layer descriptors for one pipeline run.
//!
//! A plan is computed once per source and never changes during the run. Layers are drawn in
//! list order, so the order here is the stacking order.

use crate::{
    composition::aspect::{AspectBranch, classify},
    config::CompositionConfig,
    foundation::core::{Canvas, Rect},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum LayerSource {
    /// Current frame of the main video.
    Main,
    /// Current frame of overlay track `n`.
    Overlay(usize),
    /// The watermark text raster.
    Watermark,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub enum LayerFx {
    Blur {
        radius: u32,
        sigma: f32,
        downsample: u32,
    },
    ColorGrade,
    GuideLine {
        thickness: u32,
        color: [u8; 3],
    },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct LayerDesc {
    pub name: String,
    pub source: LayerSource,
    /// Region of the source frame, in source pixels.
    pub crop: Rect,
    /// Where `crop` lands on the canvas. May extend past the canvas edges.
    pub dest: Rect,
    pub opacity: f32,
    pub effects: Vec<LayerFx>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CompositionPlan {
    pub canvas: Canvas,
    pub branch: AspectBranch,
    pub layers: Vec<LayerDesc>,
}

impl CompositionPlan {
    /// Background and foreground layers for a `src_w`×`src_h` source.
    pub fn for_source(src_w: u32, src_h: u32, cfg: &CompositionConfig) -> Self {
        let canvas = cfg.target;
        let branch = classify(src_w, src_h, cfg.wide_threshold);
        let full = Rect::full(src_w.max(1), src_h.max(1));

        let fg_crop = foreground_crop(full, branch, cfg);
        let bg_base = match branch {
            AspectBranch::Wide => full,
            // Background shows exactly what the foreground shows.
            AspectBranch::Tall => fg_crop,
        };
        let bg_crop = Rect::centered_in(bg_base, bg_base.w / cfg.zoom_x, bg_base.h / cfg.zoom_y);

        let background = LayerDesc {
            name: "background".to_string(),
            source: LayerSource::Main,
            crop: bg_crop,
            dest: Rect::full(canvas.width, canvas.height),
            opacity: 1.0,
            effects: vec![LayerFx::Blur {
                radius: cfg.blur_radius,
                sigma: cfg.blur_sigma,
                downsample: cfg.blur_downsample,
            }],
        };

        let scale = f64::from(canvas.height) / fg_crop.h;
        let dest_w = fg_crop.w * scale;
        let foreground = LayerDesc {
            name: "foreground".to_string(),
            source: LayerSource::Main,
            crop: fg_crop,
            dest: Rect::centered_in(
                Rect::full(canvas.width, canvas.height),
                dest_w,
                f64::from(canvas.height),
            ),
            opacity: 1.0,
            effects: Vec::new(),
        };

        Self {
            canvas,
            branch,
            layers: vec![background, foreground],
        }
    }

    pub fn with_foreground_effect(mut self, fx: LayerFx) -> Self {
        if let Some(fg) = self.layers.iter_mut().find(|l| l.name == "foreground") {
            fg.effects.push(fx);
        }
        self
    }

    pub fn with_watermark(mut self) -> Self {
        self.layers.push(LayerDesc {
            name: "watermark".to_string(),
            source: LayerSource::Watermark,
            crop: Rect::full(self.canvas.width, self.canvas.height),
            dest: Rect::full(self.canvas.width, self.canvas.height),
            opacity: 1.0,
            effects: Vec::new(),
        });
        self
    }

    /// Full-canvas overlay fed from overlay track `index`, whose frames are `w`×`h`.
    pub fn with_overlay(mut self, index: usize, w: u32, h: u32, opacity: f32) -> Self {
        self.layers.push(LayerDesc {
            name: format!("overlay{index}"),
            source: LayerSource::Overlay(index),
            crop: Rect::full(w.max(1), h.max(1)),
            dest: Rect::full(self.canvas.width, self.canvas.height),
            opacity,
            effects: Vec::new(),
        });
        self
    }

    pub fn layer(&self, name: &str) -> Option<&LayerDesc> {
        self.layers.iter().find(|l| l.name == name)
    }
}

/// Foreground crop inside `full`, clamped to the source bounds.
fn foreground_crop(full: Rect, branch: AspectBranch, cfg: &CompositionConfig) -> Rect {
    let (w, h) = match branch {
        AspectBranch::Wide => (full.h * cfg.wide_crop_aspect, full.h),
        AspectBranch::Tall => {
            let keep = 1.0 - cfg.tall_crop_fraction;
            (full.w * keep, full.h * keep)
        }
    };
    let w = w.clamp(1.0, full.w);
    let h = h.clamp(1.0, full.h);
    Rect::centered_in(full, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CompositionConfig {
        CompositionConfig::default()
    }

    #[test]
    fn wide_source_takes_portrait_slice() {
        let plan = CompositionPlan::for_source(1920, 1080, &cfg());
        assert_eq!(plan.branch, AspectBranch::Wide);
        let fg = plan.layer("foreground").unwrap();
        assert!((fg.crop.w - 607.5).abs() < 1e-9);
        assert_eq!(fg.crop.h, 1080.0);
        assert!((fg.crop.x - 656.25).abs() < 1e-9);
        assert!((fg.dest.w - 720.0).abs() < 1e-6);
        assert_eq!(fg.dest.h, 1280.0);
        assert!(fg.dest.x.abs() < 1e-6);
    }

    #[test]
    fn tall_background_zooms_into_the_foreground_crop() {
        let plan = CompositionPlan::for_source(1080, 1920, &cfg());
        assert_eq!(plan.branch, AspectBranch::Tall);
        let fg = plan.layer("foreground").unwrap();
        let bg = plan.layer("background").unwrap();
        assert!((fg.crop.w - 1047.6).abs() < 1e-6);
        assert!(fg.crop.contains_rect(bg.crop));
        assert!((bg.crop.w - fg.crop.w / 1.15).abs() < 1e-6);
        assert!((bg.crop.h - fg.crop.h / 1.40).abs() < 1e-6);
    }

    #[test]
    fn background_always_covers_canvas() {
        for (w, h) in [(1920, 1080), (1080, 1920), (640, 640), (4000, 200), (100, 3000), (1, 1)] {
            let plan = CompositionPlan::for_source(w, h, &cfg());
            let bg = plan.layer("background").unwrap();
            assert_eq!(bg.dest, Rect::full(720, 1280));
            assert!(Rect::full(w, h).contains_rect(bg.crop));
            let fg = plan.layer("foreground").unwrap();
            assert!(Rect::full(w, h).contains_rect(fg.crop));
            assert!(!fg.crop.is_empty());
            assert_eq!(fg.dest.h, 1280.0);
        }
    }

    #[test]
    fn stacking_order_is_background_foreground_watermark_overlays() {
        let plan = CompositionPlan::for_source(1920, 1080, &cfg())
            .with_foreground_effect(LayerFx::ColorGrade)
            .with_watermark()
            .with_overlay(0, 720, 1280, 0.05)
            .with_overlay(1, 320, 240, 0.05);
        let names: Vec<_> = plan.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            ["background", "foreground", "watermark", "overlay0", "overlay1"]
        );
        assert_eq!(plan.layer("foreground").unwrap().effects, vec![LayerFx::ColorGrade]);
        assert_eq!(plan.layer("overlay1").unwrap().dest, Rect::full(720, 1280));
    }
}
