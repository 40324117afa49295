//! Artifact rendering: flame graph SVG and folded stack text

pub mod folded;
pub mod svg;

pub use folded::{render_folded, write_folded_file};
pub use svg::{layout, render_svg, write_svg_file, FlameRect};
