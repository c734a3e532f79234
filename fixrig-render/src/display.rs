use anyhow::{Context, Result};
use fixrig_core::{Rgba, Shape, Sprite};
use fixrig_experiment::Display;
use std::collections::HashMap;
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};
use tracing::trace;

/// Key for the sprite pixmap cache: shape geometry as raw bits plus colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SpriteKey {
    kind: u8,
    a: u32,
    b: u32,
    color: Rgba,
}

impl SpriteKey {
    fn of(sprite: &Sprite) -> Self {
        let (kind, a, b) = match sprite.shape {
            Shape::Spot { radius } => (0, radius.to_bits(), 0),
            Shape::Square { size } => (1, size.to_bits(), 0),
            Shape::Ring { radius, width } => (2, radius.to_bits(), width.to_bits()),
        };
        Self {
            kind,
            a,
            b,
            color: sprite.color,
        }
    }
}

fn color(c: Rgba) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

/// Rasterizes one sprite into its own pixmap, centred. `None` for
/// degenerate geometry.
pub fn render_sprite_pixmap(sprite: &Sprite) -> Option<Pixmap> {
    let extent = sprite.extent();
    if !(extent > 0.0) {
        return None;
    }
    let side = (extent * 2.0).ceil() as u32 + 2;
    let c = side as f32 / 2.0;
    let mut pixmap = Pixmap::new(side, side)?;
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(color(sprite.color));

    match sprite.shape {
        Shape::Spot { radius } => {
            let path = PathBuilder::from_circle(c, c, radius)?;
            pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
        Shape::Square { size } => {
            let rect = tiny_skia::Rect::from_xywh(c - size / 2.0, c - size / 2.0, size, size)?;
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
        Shape::Ring { radius, width } => {
            let path = PathBuilder::from_circle(c, c, radius)?;
            let stroke = Stroke {
                width,
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }
    Some(pixmap)
}

/// Software display drawing into a `tiny_skia::Pixmap`. Screen coordinates
/// have their origin at the centre, y pointing down. Flips are quantized to
/// the refresh period, as a real page flip would be.
pub struct SkiaDisplay {
    width: u32,
    height: u32,
    center: (f32, f32),
    canvas: Pixmap,
    sprites: Vec<(&'static str, Sprite)>,
    cache: HashMap<SpriteKey, Pixmap>,
    background: Rgba,
    frame_ms: u64,
    frames: u64,
}

impl SkiaDisplay {
    pub fn new(width: u32, height: u32, frame_ms: u64) -> Result<Self> {
        let canvas = Pixmap::new(width, height)
            .with_context(|| format!("cannot allocate a {width}x{height} canvas"))?;
        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            canvas,
            sprites: Vec::with_capacity(8),
            cache: HashMap::new(),
            background: [0, 0, 0, 255],
            frame_ms,
            frames: 0,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Colour of the last presented frame at screen position `(x, y)`.
    pub fn pixel(&self, x: f32, y: f32) -> Option<Rgba> {
        let px = (self.center.0 + x).floor();
        let py = (self.center.1 + y).floor();
        if px < 0.0 || py < 0.0 {
            return None;
        }
        let c = self.canvas.pixel(px as u32, py as u32)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    /// Last presented frame as PNG bytes.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.canvas.encode_png().context("encoding frame as PNG")
    }

    fn render(&mut self) {
        self.canvas.fill(color(self.background));
        for (_, sprite) in &self.sprites {
            let key = SpriteKey::of(sprite);
            if !self.cache.contains_key(&key) {
                match render_sprite_pixmap(sprite) {
                    Some(pixmap) => {
                        self.cache.insert(key, pixmap);
                    }
                    None => continue,
                }
            }
            if let Some(pixmap) = self.cache.get(&key) {
                let x = (self.center.0 + sprite.pos.0 - pixmap.width() as f32 / 2.0).round();
                let y = (self.center.1 + sprite.pos.1 - pixmap.height() as f32 / 2.0).round();
                self.canvas.draw_pixmap(
                    x as i32,
                    y as i32,
                    pixmap.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
        }
    }
}

impl Display for SkiaDisplay {
    fn show(&mut self, id: &'static str, sprite: Sprite) {
        match self.sprites.iter_mut().find(|(k, _)| *k == id) {
            Some(slot) => slot.1 = sprite,
            None => self.sprites.push((id, sprite)),
        }
    }

    fn hide(&mut self, id: &'static str) {
        self.sprites.retain(|(k, _)| *k != id);
    }

    fn clear(&mut self) {
        self.sprites.clear();
    }

    fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    fn set_background(&mut self, color: Rgba) {
        self.background = color;
    }

    fn flip(&mut self, now_ms: u64) -> u64 {
        self.render();
        self.frames += 1;
        let t = match self.frame_ms {
            0 => now_ms,
            frame => now_ms.div_ceil(frame) * frame,
        };
        trace!(t_ms = t, sprites = self.sprites.len(), "flip");
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixrig_core::FIX_SPOT;

    const GREY: Rgba = [128, 128, 128, 255];
    const WHITE: Rgba = [255, 255, 255, 255];

    #[test]
    fn draws_sprites_over_background() {
        let mut d = SkiaDisplay::new(200, 100, 0).unwrap();
        d.set_background(GREY);
        d.show(FIX_SPOT, Sprite::spot((20.0, -10.0), 5.0, WHITE));
        d.flip(0);
        assert_eq!(d.pixel(20.0, -10.0), Some(WHITE));
        assert_eq!(d.pixel(-50.0, 30.0), Some(GREY));
        assert_eq!(d.pixel(500.0, 0.0), None);
    }

    #[test]
    fn show_replaces_and_clear_removes() {
        let mut d = SkiaDisplay::new(100, 100, 0).unwrap();
        d.show(FIX_SPOT, Sprite::square((0.0, 0.0), 10.0, WHITE));
        d.show(FIX_SPOT, Sprite::square((0.0, 0.0), 10.0, [255, 0, 0, 255]));
        assert_eq!(d.sprite_count(), 1);
        d.flip(0);
        assert_eq!(d.pixel(0.0, 0.0), Some([255, 0, 0, 255]));
        d.clear();
        d.set_background(GREY);
        d.flip(0);
        assert_eq!(d.sprite_count(), 0);
        assert_eq!(d.pixel(0.0, 0.0), Some(GREY));
    }

    #[test]
    fn flips_land_on_frame_boundaries() {
        let mut d = SkiaDisplay::new(10, 10, 16).unwrap();
        assert_eq!(d.flip(0), 0);
        assert_eq!(d.flip(1), 16);
        assert_eq!(d.flip(17), 32);
        assert_eq!(d.frames(), 3);
    }

    #[test]
    fn degenerate_sprite_is_skipped() {
        assert!(render_sprite_pixmap(&Sprite::spot((0.0, 0.0), 0.0, WHITE)).is_none());
        let mut d = SkiaDisplay::new(10, 10, 0).unwrap();
        d.show(FIX_SPOT, Sprite::spot((0.0, 0.0), 0.0, WHITE));
        d.flip(0);
        assert_eq!(d.pixel(0.0, 0.0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn frame_encodes_as_png() {
        let mut d = SkiaDisplay::new(8, 8, 0).unwrap();
        d.flip(0);
        let png = d.encode_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
