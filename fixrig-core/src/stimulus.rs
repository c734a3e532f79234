use serde::{Deserialize, Serialize};

pub type Rgba = [u8; 4];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Spot { radius: f32 },
    Square { size: f32 },
    Ring { radius: f32, width: f32 },
}

/// A drawable item placed on the display, positioned in screen coordinates
/// with the origin at the centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub shape: Shape,
    pub pos: (f32, f32),
    pub color: Rgba,
}

impl Sprite {
    pub fn spot(pos: (f32, f32), radius: f32, color: Rgba) -> Self {
        Self {
            shape: Shape::Spot { radius },
            pos,
            color,
        }
    }

    pub fn square(pos: (f32, f32), size: f32, color: Rgba) -> Self {
        Self {
            shape: Shape::Square { size },
            pos,
            color,
        }
    }

    pub fn with_color(self, color: Rgba) -> Self {
        Self { color, ..self }
    }

    /// Half extent of the bounding box.
    pub fn extent(&self) -> f32 {
        match self.shape {
            Shape::Spot { radius } => radius,
            Shape::Square { size } => size / 2.0,
            Shape::Ring { radius, width } => radius + width / 2.0,
        }
    }
}

/// Display slot of the fixation spot / dimming target.
pub const FIX_SPOT: &str = "fixspot";
