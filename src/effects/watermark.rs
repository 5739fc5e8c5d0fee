use rand::Rng;

use crate::{
    assets::text::TextRaster,
    effects::blend::stamp_raster,
    foundation::core::{Canvas, Frame},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// Semi-transparent text stamped into one corner of the frame.
#[derive(Clone, Debug)]
pub struct WatermarkStamper {
    pub raster: TextRaster,
    pub opacity: f32,
    pub margin_px: u32,
}

impl WatermarkStamper {
    /// Top-left pixel of the text box for `corner`.
    ///
    /// Inside the canvas whenever the text plus both margins fits; otherwise pinned to the
    /// top/left edge.
    pub fn origin(&self, corner: Corner, canvas: Canvas) -> (i64, i64) {
        let m = i64::from(self.margin_px);
        let (w, h) = (i64::from(canvas.width), i64::from(canvas.height));
        let (tw, th) = (i64::from(self.raster.width), i64::from(self.raster.height));
        let right = (w - tw - m).max(0);
        let bottom = (h - th - m).max(0);
        match corner {
            Corner::TopLeft => (m.min(right), m.min(bottom)),
            Corner::TopRight => (right, m.min(bottom)),
            Corner::BottomLeft => (m.min(right), bottom),
            Corner::BottomRight => (right, bottom),
        }
    }

    pub fn stamp(&self, frame: &mut Frame, corner: Corner) {
        let canvas = Canvas {
            width: frame.width(),
            height: frame.height(),
        };
        let (x, y) = self.origin(corner, canvas);
        stamp_raster(frame, &self.raster, x, y, self.opacity);
    }
}
