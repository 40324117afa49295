//! Collapsed stack text output, one `path;to;frame count` line per
//! unique call path. The format every flamegraph tool consumes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::svg::attach_path;
use crate::collapse::PathTree;
use crate::domain::RenderError;

/// Write the tree as folded stack lines
///
/// Lines are ordered by descending count with ties broken by path, so
/// identical trees produce identical files. An empty tree writes a
/// single comment line.
///
/// # Errors
/// I/O failures from the underlying writer.
pub fn render_folded<W: Write>(tree: &PathTree, mut writer: W) -> Result<(), RenderError> {
    let mut lines: Vec<(String, u64)> = tree
        .folded_paths()
        .into_iter()
        .map(|(path, count)| (path.join(";"), count))
        .collect();

    if lines.is_empty() {
        writeln!(writer, "# no samples recorded")?;
        return Ok(());
    }

    lines.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (path, count) in lines {
        writeln!(writer, "{path} {count}")?;
    }
    Ok(())
}

/// Write folded stacks to a file, with the path attached to failures
///
/// # Errors
/// `WriteFailed` when the file cannot be created or written.
pub fn write_folded_file(tree: &PathTree, path: &Path) -> Result<(), RenderError> {
    let file = File::create(path).map_err(|source| RenderError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    render_folded(tree, &mut writer).map_err(|e| attach_path(e, path))?;
    writer.flush().map_err(|source| RenderError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}
