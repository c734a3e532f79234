pub mod display;
pub use display::{render_sprite_pixmap, SkiaDisplay};
