//! Flame graph SVG rendering
//!
//! One depth-first pass lays the tree out as rectangles, then the
//! document is emitted directly as SVG text. No external assets, no
//! scripts; every rectangle carries its metadata in a `<title>` so
//! browsers show it on hover.

// Pixel math casts counts to f64; precision loss is invisible at canvas scale
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::collapse::{NodeId, PathTree};
use crate::domain::RenderError;

/// Canvas width in pixels; rectangle widths scale into this
pub const IMAGE_WIDTH: f64 = 1200.0;
/// Vertical band per stack depth
const FRAME_HEIGHT: f64 = 16.0;
/// Title strip above the flame
const HEADER_HEIGHT: f64 = 40.0;
const FOOTER_HEIGHT: f64 = 10.0;
/// Estimated glyph width used to fit labels into rectangles
const CHAR_WIDTH: f64 = 7.0;

/// One laid-out rectangle of the flame graph
#[derive(Debug, Clone)]
pub struct FlameRect {
    pub x: f64,
    pub width: f64,
    /// Vertical band, 0 for stack roots
    pub depth: usize,
    pub label: String,
    /// Tree node this rectangle was laid out from
    pub node: NodeId,
    pub count: u64,
    pub percent: f64,
}

/// Lay the tree out as rectangles in one depth-first pass
///
/// Widths are proportional to sample counts. Children sit one band
/// above their parent starting from its left edge, ordered by
/// descending count with ties broken by name ascending, so the same
/// tree always lays out identically. The synthetic root is not part of
/// the output.
#[must_use]
pub fn layout(tree: &PathTree) -> Vec<FlameRect> {
    let total = tree.total();
    let mut rects = Vec::new();
    if total == 0 {
        return rects;
    }

    let mut pending: Vec<(NodeId, usize, f64)> = Vec::new();
    push_children(tree, &mut pending, NodeId::ROOT, 0, 0.0, total);

    while let Some((id, depth, x)) = pending.pop() {
        let node = tree.node(id);
        rects.push(FlameRect {
            x,
            width: IMAGE_WIDTH * node.count as f64 / total as f64,
            depth,
            label: node.name.clone(),
            node: id,
            count: node.count,
            percent: 100.0 * node.count as f64 / total as f64,
        });
        push_children(tree, &mut pending, id, depth + 1, x, total);
    }
    rects
}

fn push_children(
    tree: &PathTree,
    pending: &mut Vec<(NodeId, usize, f64)>,
    parent: NodeId,
    depth: usize,
    x: f64,
    total: u64,
) {
    let mut kids: Vec<NodeId> = tree.node(parent).children.values().copied().collect();
    kids.sort_by(|a, b| {
        let (a, b) = (tree.node(*a), tree.node(*b));
        b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name))
    });

    let mut entries = Vec::with_capacity(kids.len());
    let mut child_x = x;
    for kid in kids {
        entries.push((kid, depth, child_x));
        child_x += IMAGE_WIDTH * tree.node(kid).count as f64 / total as f64;
    }
    // Reversed so the leftmost child pops first
    pending.extend(entries.into_iter().rev());
}

/// Render the tree as a self-contained SVG document
///
/// Identical trees render to byte-identical documents. An empty tree
/// renders a "no data" placeholder rather than failing.
///
/// # Errors
/// I/O failures from the underlying writer.
pub fn render_svg<W: Write>(tree: &PathTree, mut writer: W) -> Result<(), RenderError> {
    let rects = layout(tree);
    let max_depth = rects.iter().map(|r| r.depth).max().unwrap_or(0);
    let height = HEADER_HEIGHT + (max_depth + 1) as f64 * FRAME_HEIGHT + FOOTER_HEIGHT;

    writeln!(writer, r#"<?xml version="1.0" standalone="no"?>"#)?;
    writeln!(
        writer,
        r#"<svg version="1.1" width="{IMAGE_WIDTH}" height="{height}" viewBox="0 0 {IMAGE_WIDTH} {height}" xmlns="http://www.w3.org/2000/svg">"#
    )?;
    writeln!(
        writer,
        r#"<rect x="0" y="0" width="{IMAGE_WIDTH}" height="{height}" fill="rgb(248,248,248)"/>"#
    )?;
    writeln!(
        writer,
        r#"<text x="{:.2}" y="24.00" text-anchor="middle" font-family="Verdana" font-size="17">Flame Graph</text>"#,
        IMAGE_WIDTH / 2.0
    )?;
    writeln!(
        writer,
        r#"<text x="{:.2}" y="24.00" text-anchor="end" font-family="Verdana" font-size="12">{} samples</text>"#,
        IMAGE_WIDTH - 10.0,
        tree.total()
    )?;

    if rects.is_empty() {
        writeln!(
            writer,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="Verdana" font-size="14">no data</text>"#,
            IMAGE_WIDTH / 2.0,
            HEADER_HEIGHT + FRAME_HEIGHT / 2.0
        )?;
        writeln!(writer, "</svg>")?;
        return Ok(());
    }

    // Depth 0 sits at the bottom, callees stack upward
    for rect in &rects {
        let y = HEADER_HEIGHT + (max_depth - rect.depth) as f64 * FRAME_HEIGHT;
        let title = format!("{} ({} samples, {:.2}%)", rect.label, rect.count, rect.percent);
        writeln!(writer, "<g>")?;
        writeln!(writer, "<title>{}</title>", escape_xml(&title))?;
        writeln!(
            writer,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}" rx="1"/>"#,
            rect.x,
            y,
            rect.width,
            FRAME_HEIGHT - 1.0,
            frame_color(&rect.label)
        )?;
        if let Some(label) = fit_label(&rect.label, rect.width) {
            writeln!(
                writer,
                r#"<text x="{:.2}" y="{:.2}" font-family="Verdana" font-size="12">{}</text>"#,
                rect.x + 3.0,
                y + 11.5,
                escape_xml(&label)
            )?;
        }
        writeln!(writer, "</g>")?;
    }

    writeln!(writer, "</svg>")?;
    Ok(())
}

/// Render straight to a file, with the path attached to any failure
///
/// # Errors
/// `WriteFailed` when the file cannot be created or written.
pub fn write_svg_file(tree: &PathTree, path: &Path) -> Result<(), RenderError> {
    let file = File::create(path).map_err(|source| RenderError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    render_svg(tree, &mut writer).map_err(|e| attach_path(e, path))?;
    writer.flush().map_err(|source| RenderError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

pub(super) fn attach_path(err: RenderError, path: &Path) -> RenderError {
    match err {
        RenderError::Io(source) => {
            RenderError::WriteFailed { path: path.to_path_buf(), source }
        }
        other => other,
    }
}

/// Stable warm color keyed on the frame name
fn frame_color(name: &str) -> String {
    let mut hash: u32 = 2_166_136_261;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    let r = 205 + hash % 50;
    let g = 30 + (hash >> 8) % 180;
    let b = (hash >> 16) % 55;
    format!("rgb({r},{g},{b})")
}

/// Label text that fits the rectangle, elided with `..` or dropped
fn fit_label(name: &str, width: f64) -> Option<String> {
    let max_chars = (width / CHAR_WIDTH).floor() as usize;
    if max_chars < 3 {
        return None;
    }
    if name.chars().count() <= max_chars {
        return Some(name.to_string());
    }
    let kept: String = name.chars().take(max_chars.saturating_sub(2)).collect();
    Some(format!("{kept}.."))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
