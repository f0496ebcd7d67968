//! Reference renderers for a recorded [`Scene`](crate::surface::Scene).

pub mod bitmap;
pub mod svg;

pub use bitmap::to_png;
pub use svg::to_svg;
