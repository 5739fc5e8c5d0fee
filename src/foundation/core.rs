use crate::foundation::error::{ReelError, ReelResult};

/// One decoded or composited picture. Tightly packed RGB8, row-major.
pub type Frame = image::RgbImage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        (secs * self.as_f64() + 1e-9).floor().max(0.0) as u64
    }

    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned rectangle in pixel space. May extend past the surface it refers to.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, f64::from(width), f64::from(height))
    }

    /// A `w`×`h` rectangle centered inside `outer`.
    pub fn centered_in(outer: Rect, w: f64, h: f64) -> Self {
        Self::new(outer.x + (outer.w - w) / 2.0, outer.y + (outer.h - h) / 2.0, w, h)
    }

    pub fn right(self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(self) -> f64 {
        self.y + self.h
    }

    pub fn is_empty(self) -> bool {
        !(self.w > 0.0 && self.h > 0.0)
    }

    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn contains_rect(self, other: Rect) -> bool {
        const EPS: f64 = 1e-6;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_conversions() {
        let fps = Fps::new(30, 1).unwrap();
        assert_eq!(fps.secs_to_frames_floor(1.0), 30);
        assert_eq!(fps.secs_to_frames_round(0.99), 30);
        assert!((fps.frames_to_secs(15) - 0.5).abs() < 1e-12);
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(30, 0).is_err());
    }

    #[test]
    fn rect_intersection_and_containment() {
        let canvas = Rect::full(10, 20);
        let wide = Rect::new(-5.0, 2.0, 20.0, 4.0);
        let hit = canvas.intersect(wide).unwrap();
        assert_eq!(hit, Rect::new(0.0, 2.0, 10.0, 4.0));
        assert!(canvas.contains_rect(hit));
        assert!(!canvas.contains_rect(wide));
        assert!(canvas.intersect(Rect::new(11.0, 0.0, 2.0, 2.0)).is_none());
    }
}
