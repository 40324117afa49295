// String formatting intentionally uses format! for clarity
#![allow(clippy::format_push_string)]

use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianRcSlice, RunTimeEndian};
use log::debug;
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Sentinel frame name for addresses nothing could resolve
pub const UNKNOWN_FRAME: &str = "<unknown>";

/// Symbolizer for resolving instruction pointers to function names and
/// source locations
///
/// Resolution is layered: DWARF debug info gives inline-aware names with
/// file/line, the ELF symbol table covers stripped-of-DWARF binaries,
/// and addresses falling between symbols resolve to the nearest
/// preceding symbol with a `+0x` offset annotation.
///
/// Includes a cache to avoid re-resolving the same addresses repeatedly,
/// which significantly improves performance when symbolizing stack traces.
pub struct Symbolizer {
    ctx: Context<EndianRcSlice<RunTimeEndian>>,
    symbols: SymbolIndex,
    pie: bool,
    /// Cache of resolved frames by address
    cache: RefCell<HashMap<u64, ResolvedFrame>>,
}

impl Symbolizer {
    /// Create a new symbolizer for the given binary
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed.
    /// Missing DWARF or a stripped symbol table is not an error here;
    /// resolution just degrades to the next layer.
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).context("Failed to read binary file")?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse object file")?;

        // Load DWARF debug info
        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        let symbols = SymbolIndex::build(&obj_file);
        debug!("Symbol index: {} function symbols", symbols.len());

        // Position-independent executables link at a zero base, so their
        // runtime addresses must be rebased before lookup. ET_EXEC
        // binaries already use absolute addresses.
        let pie = matches!(obj_file.kind(), ObjectKind::Dynamic);

        Ok(Self { ctx, symbols, pie, cache: RefCell::new(HashMap::new()) })
    }

    /// Whether the binary is position independent (needs rebasing)
    #[must_use]
    pub fn is_pie(&self) -> bool {
        self.pie
    }

    /// Resolve an instruction pointer to function name and source location
    ///
    /// The address is a link-time address (already rebased for PIE).
    /// Uses a cache to avoid re-resolving the same address multiple times.
    pub fn resolve(&self, addr: u64) -> ResolvedFrame {
        // Check cache first
        if let Some(cached) = self.cache.borrow().get(&addr) {
            return cached.clone();
        }

        // Cache miss - perform actual resolution
        let mut result = Vec::new();

        if let Ok(mut frame_iter) = self.ctx.find_frames(addr).skip_all_loads() {
            while let Ok(Some(frame)) = frame_iter.next() {
                let function = frame
                    .function
                    .and_then(|f| f.demangle().ok().map(|s| s.to_string()))
                    .or_else(|| self.symbols.lookup(addr))
                    .unwrap_or_else(|| UNKNOWN_FRAME.to_string());

                let location = frame.location.map(|loc| SourceLocation {
                    file: loc.file.map(std::string::ToString::to_string),
                    line: loc.line,
                    column: loc.column,
                });

                result.push(InlinedFrame { function, location });
            }
        }

        // No DWARF coverage for this address, fall back to the symbol table
        if result.is_empty() {
            if let Some(name) = self.symbols.lookup(addr) {
                result.push(InlinedFrame { function: name, location: None });
            }
        }

        let resolved = ResolvedFrame {
            addr,
            frames: if result.is_empty() {
                vec![InlinedFrame { function: UNKNOWN_FRAME.to_string(), location: None }]
            } else {
                result
            },
        };

        // Store in cache
        self.cache.borrow_mut().insert(addr, resolved.clone());

        resolved
    }
}

/// Demangle a Rust symbol name, stripping the trailing hash so the same
/// function folds into one frame across compilation units
#[must_use]
pub fn demangle_symbol(symbol: &str) -> String {
    format!("{:#}", demangle(symbol))
}

/// Sorted function-symbol index over `.symtab` and `.dynsym`
struct SymbolIndex {
    entries: Vec<SymbolEntry>,
}

struct SymbolEntry {
    addr: u64,
    size: u64,
    name: String,
}

impl SymbolIndex {
    fn build(obj_file: &object::File) -> Self {
        let mut entries: Vec<SymbolEntry> = obj_file
            .symbols()
            .chain(obj_file.dynamic_symbols())
            .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.address() != 0)
            .filter_map(|symbol| {
                let name = symbol.name().ok()?;
                if name.is_empty() {
                    return None;
                }
                Some(SymbolEntry {
                    addr: symbol.address(),
                    size: symbol.size(),
                    name: demangle_symbol(name),
                })
            })
            .collect();

        // On duplicate addresses prefer the sized symbol (symtab over dynsym)
        entries.sort_by(|a, b| a.addr.cmp(&b.addr).then_with(|| b.size.cmp(&a.size)));
        entries.dedup_by(|a, b| a.addr == b.addr);

        Self { entries }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Range lookup with nearest-preceding fallback
    ///
    /// An address inside a symbol's `[addr, addr+size)` range resolves to
    /// the plain name. An address past the last covered byte resolves to
    /// the nearest preceding symbol annotated as `name+0x<offset>`.
    fn lookup(&self, addr: u64) -> Option<String> {
        let idx = match self.entries.binary_search_by(|e| e.addr.cmp(&addr)) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let entry = &self.entries[idx];
        let offset = addr - entry.addr;

        if offset == 0 || (entry.size > 0 && offset < entry.size) {
            Some(entry.name.clone())
        } else {
            Some(format!("{}+0x{offset:x}", entry.name))
        }
    }
}

/// A resolved stack frame (may contain multiple inlined frames)
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub addr: u64,
    pub frames: Vec<InlinedFrame>,
}

/// An inlined frame within a resolved frame
#[derive(Debug, Clone)]
pub struct InlinedFrame {
    pub function: String,
    pub location: Option<SourceLocation>,
}

/// Source code location
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ResolvedFrame {
    /// Whether nothing beyond the sentinel could be determined
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.frames.len() == 1 && self.frames[0].function == UNKNOWN_FRAME
    }

    /// Function names innermost-inlined first, as the fold consumes them
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.function.clone()).collect()
    }
}
