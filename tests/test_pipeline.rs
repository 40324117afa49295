//! End-to-end pipeline tests
//!
//! Feed `perf script` text dumps through parsing, resolution, folding,
//! and rendering, through the library and through the built binary.

use flamelet::collapse::{NodeId, PathTree};
use flamelet::render::{render_folded, render_svg};
use flamelet::sampling::spawn_sample_reader;
use flamelet::symbolization::StackResolver;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;

/// Build a perf script dump where each call path repeats `weight` times
///
/// Paths are root-to-leaf; perf prints frames leaf first, so each block
/// lists the path reversed.
fn dump_with_paths(paths: &[(&[&str], u64)]) -> String {
    let mut out = String::new();
    let mut timestamp = 100.0;
    for (path, weight) in paths {
        for _ in 0..*weight {
            out.push_str(&format!("myapp 4242 [000] {timestamp:.6}: cycles:\n"));
            for (depth, name) in path.iter().rev().enumerate() {
                out.push_str(&format!("\t{:x} {name} (/usr/bin/myapp)\n", 0x5000 + depth * 16));
            }
            out.push('\n');
            timestamp += 0.010_101;
        }
    }
    out
}

/// Fold a dump the way a session does, without perf in the loop
fn tree_from_dump(dump: &str) -> (PathTree, u64) {
    let (stream, parser) = spawn_sample_reader(Cursor::new(dump.as_bytes().to_vec()));
    let mut resolver = StackResolver::new(None, None);
    let mut tree = PathTree::new();
    for sample in stream {
        let stack = resolver.resolve_stack(&sample);
        tree.fold(&stack);
    }
    let skipped = parser.join().expect("parser thread panicked");
    (tree, skipped)
}

/// Visit every node reachable from the root
fn visit_all(tree: &PathTree, mut visit: impl FnMut(NodeId)) {
    let mut pending = vec![NodeId::ROOT];
    while let Some(id) = pending.pop() {
        visit(id);
        pending.extend(tree.node(id).children.values().copied());
    }
}

#[test]
fn test_every_count_is_children_sum_plus_terminating() {
    let dump = dump_with_paths(&[
        (&["main", "parse", "lex"], 7),
        (&["main", "parse"], 2),
        (&["main", "render", "rasterize"], 5),
        (&["main"], 1),
        (&["idle"], 3),
    ]);
    let (tree, skipped) = tree_from_dump(&dump);
    assert_eq!(skipped, 0);
    assert_eq!(tree.total(), 18);

    let mut terminating_sum = 0;
    visit_all(&tree, |id| {
        let node = tree.node(id);
        let children_sum: u64 = node.children.values().map(|&c| tree.node(c).count).sum();
        assert!(
            children_sum <= node.count,
            "children of {} outweigh it: {children_sum} > {}",
            node.name,
            node.count
        );
        assert_eq!(node.count, children_sum + tree.terminating(id));
        terminating_sum += tree.terminating(id);
    });

    // Every sample terminates on exactly one node
    assert_eq!(terminating_sum, tree.total());
}

#[test]
fn test_no_samples_lost_under_sustained_stream() {
    // Enough samples to wrap the reader channel several times over
    let dump = dump_with_paths(&[
        (&["main", "hot_loop", "inner"], 200),
        (&["main", "hot_loop"], 150),
        (&["main", "io_wait"], 150),
    ]);
    let (tree, skipped) = tree_from_dump(&dump);

    assert_eq!(tree.total(), 500);
    assert_eq!(skipped, 0);
}

#[test]
fn test_one_unresolvable_frame_keeps_its_sample() {
    let mut dump = dump_with_paths(&[(&["main", "work"], 49)]);
    dump.push_str(
        "myapp 4242 [000] 200.000001: cycles:\n\
         \tdeadbeef [unknown] ([unknown])\n\
         \t5000 main (/usr/bin/myapp)\n\n",
    );
    let (tree, _) = tree_from_dump(&dump);

    assert_eq!(tree.total(), 50);

    let mut sentinel_count = None;
    visit_all(&tree, |id| {
        if tree.node(id).name == "<unknown>" {
            sentinel_count = Some(tree.node(id).count);
        }
    });
    assert_eq!(sentinel_count, Some(1));
}

#[test]
fn test_svg_render_is_byte_identical_for_equal_input() {
    let dump = dump_with_paths(&[
        (&["main", "alpha"], 5),
        (&["main", "beta", "gamma"], 3),
        (&["main", "beta"], 2),
    ]);
    let (first, _) = tree_from_dump(&dump);
    let (second, _) = tree_from_dump(&dump);

    let mut lhs = Vec::new();
    let mut rhs = Vec::new();
    render_svg(&first, &mut lhs).unwrap();
    render_svg(&second, &mut rhs).unwrap();

    assert!(!lhs.is_empty());
    assert_eq!(lhs, rhs);
}

#[test]
fn test_folded_output_weights_sum_to_total() {
    let dump = dump_with_paths(&[
        (&["main", "parse", "lex"], 7),
        (&["main", "render"], 5),
        (&["idle"], 3),
    ]);
    let (tree, _) = tree_from_dump(&dump);

    let mut buffer = Vec::new();
    render_folded(&tree, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();

    let weight_sum: u64 = text
        .lines()
        .map(|line| line.rsplit_once(' ').expect("folded line").1.parse::<u64>().unwrap())
        .sum();
    assert_eq!(weight_sum, tree.total());
    assert!(text.lines().any(|l| l == "main;parse;lex 7"));
}

// ── Binary-level replay tests ──────────────────────────────────────────

fn run_replay(dump_path: &Path, dir: &Path, extra: &[&str]) -> (std::process::Output, String) {
    let svg_path = dir.join("out.svg");
    let output = Command::new(env!("CARGO_BIN_EXE_flamelet"))
        .arg("--input")
        .arg(dump_path)
        .arg("-o")
        .arg(&svg_path)
        .args(extra)
        .output()
        .expect("failed to run flamelet");
    (output, svg_path.to_string_lossy().into_owned())
}

#[test]
fn test_binary_replay_writes_svg_and_folded() {
    let dir = tempfile::tempdir().unwrap();
    let dump_path = dir.path().join("dump.txt");
    std::fs::write(
        &dump_path,
        dump_with_paths(&[(&["main", "render"], 2), (&["main"], 1)]),
    )
    .unwrap();
    let folded_path = dir.path().join("out.folded");

    let (output, svg_path) =
        run_replay(&dump_path, dir.path(), &["--folded", &folded_path.to_string_lossy(), "-q"]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let svg = std::fs::read_to_string(svg_path).unwrap();
    assert!(svg.contains("<svg"));
    assert!(svg.contains("main"));

    let folded = std::fs::read_to_string(folded_path).unwrap();
    assert!(folded.lines().any(|l| l == "main;render 2"));
    assert!(folded.lines().any(|l| l == "main 1"));
}

#[test]
fn test_binary_replay_of_junk_exits_empty_with_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let dump_path = dir.path().join("dump.txt");
    std::fs::write(&dump_path, "not perf output\nstill not\n").unwrap();

    let (output, svg_path) = run_replay(&dump_path, dir.path(), &["-q"]);

    assert_eq!(output.status.code(), Some(4));
    let svg = std::fs::read_to_string(svg_path).unwrap();
    assert!(svg.contains("no data"));
}

#[test]
fn test_binary_replay_prints_summary_and_saved_paths() {
    let dir = tempfile::tempdir().unwrap();
    let dump_path = dir.path().join("dump.txt");
    std::fs::write(&dump_path, dump_with_paths(&[(&["main"], 4)])).unwrap();

    let (output, svg_path) = run_replay(&dump_path, dir.path(), &[]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("saved:"), "stdout: {stdout}");
    assert!(stdout.contains(&svg_path));
    assert!(stderr.contains("4 samples"), "stderr: {stderr}");
    assert!(stderr.contains("dump exhausted"));
}
