//! # Flamelet - Sampling Profiler with Flame Graph Output
//!
//! Flamelet drives Linux `perf` to sample a process's call stacks at a fixed
//! frequency, resolves the captured addresses to function names, folds the
//! resolved stacks into a prefix tree, and renders that tree as a
//! self-contained flame graph SVG.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Target Process                           │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ sampling interrupts (default 99 Hz)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  perf record → perf script                      │
//! │  • DWARF call-graph unwinding (no frame pointers required)      │
//! │  • Text dump: one frame per line, blank line ends a sample      │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ stdout
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Flamelet (This Crate)                        │
//! │                                                                 │
//! │  ┌──────────┐   ┌───────────────┐   ┌──────────┐   ┌────────┐  │
//! │  │ Sampling │──▶│ Symbolization │──▶│ Collapse │──▶│ Render │  │
//! │  │ (parser) │   │ (DWARF/symtab)│   │  (tree)  │   │ (SVG)  │  │
//! │  └──────────┘   └───────────────┘   └──────────┘   └────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core Pipeline Modules
//!
//! - [`sampling`]: perf subprocess control and output parsing
//!   - `perf_session`: spawn `perf record`, stop it cleanly, stream `perf script`
//!   - `script_parser`: turn the perf script text dump into [`sampling::Sample`]s
//!
//! - [`symbolization`]: Convert raw addresses to human-readable function names
//!   - Uses DWARF debug information via `addr2line`, with symbol-table fallback
//!   - Handles PIE (Position Independent Executable) address adjustment
//!   - Degrades per-frame: an unresolvable address never drops its sample
//!
//! - [`collapse`]: Fold resolved stacks into a counted prefix tree
//!   - Equal root-to-leaf paths share nodes; every node counts the samples
//!     that passed through it
//!
//! - [`render`]: Turn the finished tree into output artifacts
//!   - `svg`: self-contained flame graph, deterministic for equal input
//!   - `folded`: collapsed text format compatible with external tooling
//!
//! ### Supporting Modules
//!
//! - [`session`]: Orchestrates one profiling run end to end, including the
//!   sampling loop, Ctrl-C handling, and the collapse worker thread
//!
//! - [`preflight`]: System checks (perf present, `perf_event_paranoid`
//!   policy, binary readable) before anything attaches
//!
//! - [`process_lookup`]: Find a PID by process name via `/proc`
//!
//! - [`cli`]: Command-line argument parsing
//!
//! - [`domain`]: Core domain types ([`domain::Pid`], [`domain::SampleFreq`])
//!   and the error taxonomy
//!
//! ## Operational Modes
//!
//! 1. **Attach Mode** (default): sample an already-running process by PID or name
//! 2. **Launch Mode** (`flamelet -- <cmd>`): spawn a command and profile it
//! 3. **Replay Mode** (`--input dump.txt`): re-render a saved `perf script` dump
//!
//! ## Typical Usage
//!
//! ```bash
//! # Profile a running process for 30 seconds
//! flamelet --pid 1234 -d 30
//!
//! # Auto-detect the PID from a process name
//! flamelet my-server -o my-server.svg
//!
//! # Keep the collapsed stacks alongside the SVG
//! flamelet --pid 1234 --folded out.folded
//! ```
//!
//! ## Key Concepts
//!
//! - **Sample**: one captured call stack, leaf first as perf prints it
//! - **Folding**: merging equal call paths so each tree node carries a count
//! - **PIE/ASLR**: position-independent executables require address relocation
//! - **DWARF**: debug information format for source-level symbolization
//! - **Folded format**: `root;child;leaf count` lines, one per unique path

// Expose modules for testing
pub mod cli;
pub mod collapse;
pub mod domain;
pub mod preflight;
pub mod process_lookup;
pub mod render;
pub mod sampling;
pub mod session;
pub mod symbolization;
