use std::{path::Path, sync::Arc};

use crate::foundation::error::{ReelError, ReelResult};

/// A line of text rasterized once and reused on every frame.
///
/// Pixels are premultiplied RGBA8, cropped to the tight bounding box of inked pixels, so
/// `width`/`height` are the measured text size.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRaster {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl TextRaster {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            rgba8_premul: Arc::new(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Builds a raster straight from premultiplied pixels (no font involved).
    pub fn from_premul(width: u32, height: u32, rgba8_premul: Vec<u8>) -> ReelResult<Self> {
        if rgba8_premul.len() != width as usize * height as usize * 4 {
            return Err(ReelError::validation(
                "text raster expects width*height*4 bytes",
            ));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(rgba8_premul),
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let p = &self.rgba8_premul[i..i + 4];
        [p[0], p[1], p[2], p[3]]
    }
}

/// Shapes and rasterizes text through `usvg`/`resvg` using system fonts.
pub struct TextRenderer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl TextRenderer {
    pub fn new(font_dir: Option<&Path>) -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        if let Some(dir) = font_dir {
            load_fonts_from_dir(&mut db, dir);
        }
        Self::with_database(db)
    }

    /// Uses exactly the faces in `db`; nothing is loaded from the system.
    pub fn with_database(db: usvg::fontdb::Database) -> Self {
        Self {
            fontdb: Arc::new(db),
        }
    }

    pub fn face_count(&self) -> usize {
        self.fontdb.faces().count()
    }

    pub fn render(&self, text: &str, font_size: f32, rgb: [u8; 3]) -> ReelResult<TextRaster> {
        if text.trim().is_empty() || self.face_count() == 0 {
            return Ok(TextRaster::empty());
        }
        if !font_size.is_finite() || font_size <= 0.0 {
            return Err(ReelError::validation("font size must be > 0"));
        }

        // Generous scratch canvas; the result is cropped to inked pixels below.
        let chars = text.chars().count() as f32;
        let w = (chars * font_size * 1.2 + font_size * 2.0).ceil() as u32;
        let h = (font_size * 2.5).ceil() as u32;
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><text x="{x}" y="{y}" font-family="sans-serif" font-size="{font_size}" fill="rgb({r},{g},{b})">{body}</text></svg>"#,
            x = font_size * 0.5,
            y = font_size * 1.5,
            r = rgb[0],
            g = rgb[1],
            b = rgb[2],
            body = escape_xml(text),
        );

        let opts = usvg::Options {
            fontdb: self.fontdb.clone(),
            font_resolver: make_font_resolver(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(&svg, &opts)
            .map_err(|e| ReelError::evaluation(format!("failed to build text svg: {e}")))?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(w, h)
            .ok_or_else(|| ReelError::evaluation("failed to allocate text pixmap"))?;
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::identity(),
            &mut pixmap.as_mut(),
        );
        Ok(crop_to_ink(pixmap.data(), w, h))
    }
}

fn crop_to_ink(data: &[u8], w: u32, h: u32) -> TextRaster {
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
    for y in 0..h {
        for x in 0..w {
            let a = data[(y as usize * w as usize + x as usize) * 4 + 3];
            if a != 0 {
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x + 1);
                y1 = y1.max(y + 1);
            }
        }
    }
    if x0 >= x1 || y0 >= y1 {
        return TextRaster::empty();
    }

    let (cw, ch) = (x1 - x0, y1 - y0);
    let mut out = Vec::with_capacity(cw as usize * ch as usize * 4);
    for y in y0..y1 {
        let row = (y as usize * w as usize + x0 as usize) * 4;
        out.extend_from_slice(&data[row..row + cw as usize * 4]);
    }
    TextRaster {
        width: cw,
        height: ch,
        rgba8_premul: Arc::new(out),
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "font directory is not readable");
        return;
    };

    for entry in rd.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" && ext != "ttc" {
            continue;
        }
        let _ = db.load_font_file(&path);
    }
}

fn make_font_resolver() -> usvg::FontResolver<'static> {
    use usvg::FontResolver;

    FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families = Vec::<usvg::fontdb::Family<'_>>::new();
            for family in font.families() {
                families.push(match family {
                    usvg::FontFamily::Serif => usvg::fontdb::Family::Serif,
                    usvg::FontFamily::SansSerif => usvg::fontdb::Family::SansSerif,
                    usvg::FontFamily::Cursive => usvg::fontdb::Family::Cursive,
                    usvg::FontFamily::Fantasy => usvg::fontdb::Family::Fantasy,
                    usvg::FontFamily::Monospace => usvg::fontdb::Family::Monospace,
                    usvg::FontFamily::Named(s) => usvg::fontdb::Family::Name(s),
                });
            }
            families.push(usvg::fontdb::Family::SansSerif);

            let query = usvg::fontdb::Query {
                families: &families,
                weight: usvg::fontdb::Weight(font.weight()),
                stretch: usvg::fontdb::Stretch::Normal,
                style: usvg::fontdb::Style::Normal,
            };

            // Any face beats dropping the text when the requested family is missing.
            fontdb
                .query(&query)
                .or_else(|| fontdb.faces().next().map(|f| f.id))
        }),
        select_fallback: FontResolver::default_fallback_selector(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_finds_tight_box() {
        let (w, h) = (5u32, 4u32);
        let mut data = vec![0u8; (w * h * 4) as usize];
        for (x, y) in [(1u32, 1u32), (3, 2)] {
            let i = ((y * w + x) * 4) as usize;
            data[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
        let r = crop_to_ink(&data, w, h);
        assert_eq!((r.width, r.height), (3, 2));
        assert_eq!(r.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(r.pixel(1, 0), [0, 0, 0, 0]);
        assert_eq!(r.pixel(2, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn blank_canvas_crops_to_empty() {
        let data = vec![0u8; 16];
        assert!(crop_to_ink(&data, 2, 2).is_empty());
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_xml("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn empty_text_renders_nothing() {
        let r = TextRenderer::new(None);
        assert!(r.render("   ", 20.0, [255, 255, 255]).unwrap().is_empty());
    }

    #[test]
    fn empty_font_database_renders_nothing() {
        let r = TextRenderer::with_database(usvg::fontdb::Database::new());
        assert_eq!(r.face_count(), 0);
        assert!(r.render("Ep1", 30.0, [255, 255, 255]).unwrap().is_empty());
    }

    #[test]
    fn rendered_text_fits_its_scratch_canvas() {
        let r = TextRenderer::new(None);
        let raster = r.render("Ep12", 30.0, [255, 255, 255]).unwrap();
        if r.face_count() == 0 {
            assert!(raster.is_empty());
            return;
        }
        assert!(!raster.is_empty());
        assert!(raster.height <= 75);
        assert_eq!(
            raster.rgba8_premul.len(),
            (raster.width * raster.height * 4) as usize
        );
    }
}
