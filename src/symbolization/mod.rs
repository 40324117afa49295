//! # Symbol Resolution and Address Translation
//!
//! This module converts the raw stack frames found in `perf script`
//! output into human-readable function names. perf resolves many frames
//! itself, but frames from binaries without symbol tables, stripped
//! sections, or freshly mapped regions come through as bare instruction
//! pointers like `0x55f3a2b4c780`. Naming those is **symbolization**.
//!
//! ## The Resolution Ladder
//!
//! Every frame walks the same ladder and stops at the first rung that
//! produces a name:
//!
//! ```text
//! 1. Symbol printed by perf       -> demangle and use it
//! 2. DWARF debug info             -> function name (+ inline chain)
//! 3. ELF symbol table (.symtab
//!    and .dynsym)                 -> nearest preceding symbol,
//!                                    annotated `name+0x1a` when the
//!                                    address sits inside its body
//! 4. Originating dso              -> bracketed label like [libc.so.6]
//! 5. Nothing at all               -> the <unknown> sentinel
//! ```
//!
//! A frame that exhausts the ladder never aborts the pipeline; it keeps
//! its position in the stack under the sentinel name so the shape of
//! the flame graph stays truthful.
//!
//! ## DWARF Debug Information
//!
//! **DWARF** is the debugging data format embedded in ELF binaries. It
//! maps instruction addresses to function names, source locations, and
//! inline call chains. Rust release builds omit it unless asked:
//!
//! ```toml
//! # Cargo.toml
//! [profile.release]
//! debug = true
//! ```
//!
//! **Libraries used**:
//! - `gimli`: Low-level DWARF parser
//! - `addr2line`: High-level symbolization built on gimli
//! - `object`: ELF binary parser
//! - `rustc-demangle`: `_ZN3foo3barE` -> `foo::bar`
//!
//! ## PIE and ASLR
//!
//! Modern Linux executables are **position independent** (PIE), so
//! **ASLR** loads them at a randomized base address on every run. DWARF
//! and the symbol table speak file offsets; the sampled stacks speak
//! runtime addresses. The translation is:
//!
//! ```text
//! File Offset = Runtime Address - Base Address
//! ```
//!
//! The base address comes from `/proc/<pid>/maps`. Non-PIE (ET_EXEC)
//! binaries are linked at absolute addresses and skip the subtraction;
//! [`Symbolizer::is_pie`] tells the two apart.
//!
//! ## Module Structure
//!
//! - **`symbolizer`**: DWARF and symbol-table lookup with a per-session
//!   address cache, plus Rust demangling
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing to find the target
//!   binary's runtime memory range
//! - **`stack_resolver`**: drives the ladder for whole stacks and
//!   reorders them root-to-leaf for the fold
//!
//! ## Limitations
//!
//! - DWARF rungs need the target compiled with `debug = true`
//! - Only the target binary is opened; shared-library frames rely on
//!   perf's own resolution or degrade to a dso label
//! - Demangling assumes Rust (and C, which passes through unchanged)

pub mod memory_maps;
pub mod stack_resolver;
pub mod symbolizer;

pub use memory_maps::{parse_memory_maps, MemoryRange};
pub use stack_resolver::{ResolvedStack, StackResolver};
pub use symbolizer::{demangle_symbol, Symbolizer, UNKNOWN_FRAME};
