//! Turns raw sampled stacks into named stacks
//!
//! Each frame walks a resolution ladder: the symbol perf already
//! printed wins, then DWARF (with inline expansion) and the ELF symbol
//! table for addresses inside the target binary, then a bracketed dso
//! label, then the `<unknown>` sentinel. A frame never aborts the
//! pipeline; failures degrade to the next rung and are counted.

use std::path::Path;

use super::memory_maps::MemoryRange;
use super::symbolizer::{demangle_symbol, Symbolizer, UNKNOWN_FRAME};
use crate::sampling::Sample;

/// A fully named stack, ordered root (outermost caller) to leaf
pub type ResolvedStack = Vec<String>;

/// Stateful resolver shared by every sample of one session
///
/// Both the symbolizer and the memory range are optional: without a
/// symbolizer only perf-printed symbols and dso labels are available,
/// and without a range addresses are looked up as-is.
pub struct StackResolver {
    symbolizer: Option<Symbolizer>,
    range: Option<MemoryRange>,
    frames_seen: u64,
    unresolved_frames: u64,
}

impl StackResolver {
    pub fn new(symbolizer: Option<Symbolizer>, range: Option<MemoryRange>) -> Self {
        Self { symbolizer, range, frames_seen: 0, unresolved_frames: 0 }
    }

    /// Resolve one sample into a root-to-leaf list of function names
    ///
    /// Addresses with inlined frames expand into one name per inline
    /// level, callers before callees, so the fold sees the same shape a
    /// debugger would print.
    pub fn resolve_stack(&mut self, sample: &Sample) -> ResolvedStack {
        // Collected leaf-first with innermost inline levels first, then
        // reversed once into root-to-leaf order
        let mut names = Vec::with_capacity(sample.frames.len());

        for frame in &sample.frames {
            self.frames_seen += 1;

            if let Some(symbol) = &frame.symbol {
                names.push(demangle_symbol(symbol));
                continue;
            }

            if let Some(resolved) = self.resolve_address(frame.addr) {
                names.extend(resolved);
                continue;
            }

            self.unresolved_frames += 1;
            names.push(match &frame.dso {
                Some(dso) => dso_label(dso),
                None => UNKNOWN_FRAME.to_string(),
            });
        }

        names.reverse();
        names
    }

    /// Total frames pushed through the ladder
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Frames that ended on a dso label or the sentinel
    pub fn unresolved_frames(&self) -> u64 {
        self.unresolved_frames
    }

    fn resolve_address(&self, addr: u64) -> Option<Vec<String>> {
        let symbolizer = self.symbolizer.as_ref()?;

        let lookup = match self.range {
            Some(range) if range.contains(addr) => {
                // ET_EXEC binaries carry absolute addresses, only
                // position-independent ones need rebasing
                if symbolizer.is_pie() {
                    range.rebase(addr)
                } else {
                    addr
                }
            }
            // Outside the target mapping: a shared library or the
            // kernel, which this symbolizer cannot name
            Some(_) => return None,
            None => addr,
        };

        let resolved = symbolizer.resolve(lookup);
        if resolved.is_unresolved() {
            return None;
        }
        Some(resolved.function_names())
    }
}

/// Bracketed binary-of-origin label for frames that resolved no name
fn dso_label(dso: &str) -> String {
    // perf already brackets pseudo-dsos like [kernel.kallsyms]
    if dso.starts_with('[') {
        return dso.to_string();
    }
    let base = Path::new(dso).file_name().and_then(|n| n.to_str()).unwrap_or(dso);
    format!("[{base}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::RawFrame;

    fn frame(addr: u64, symbol: Option<&str>, dso: Option<&str>) -> RawFrame {
        RawFrame {
            addr,
            symbol: symbol.map(str::to_string),
            dso: dso.map(str::to_string),
        }
    }

    #[test]
    fn test_perf_symbols_reversed_to_root_first() {
        let mut resolver = StackResolver::new(None, None);
        let sample = Sample {
            timestamp: 1.0,
            frames: vec![
                frame(0x3000, Some("leaf"), Some("/usr/bin/app")),
                frame(0x2000, Some("middle"), Some("/usr/bin/app")),
                frame(0x1000, Some("main"), Some("/usr/bin/app")),
            ],
        };

        let stack = resolver.resolve_stack(&sample);
        assert_eq!(stack, vec!["main", "middle", "leaf"]);
        assert_eq!(resolver.frames_seen(), 3);
        assert_eq!(resolver.unresolved_frames(), 0);
    }

    #[test]
    fn test_mangled_perf_symbols_are_demangled() {
        let mut resolver = StackResolver::new(None, None);
        let sample = Sample {
            timestamp: 1.0,
            frames: vec![frame(0x1000, Some("_ZN3app4main17h0123456789abcdefE"), None)],
        };

        assert_eq!(resolver.resolve_stack(&sample), vec!["app::main"]);
    }

    #[test]
    fn test_symbolless_frame_degrades_to_dso_label() {
        let mut resolver = StackResolver::new(None, None);
        let sample = Sample {
            timestamp: 1.0,
            frames: vec![
                frame(0x7f00_0000_1000, None, Some("/usr/lib/libc.so.6")),
                frame(0x1000, Some("main"), Some("/usr/bin/app")),
            ],
        };

        let stack = resolver.resolve_stack(&sample);
        assert_eq!(stack, vec!["main", "[libc.so.6]"]);
        assert_eq!(resolver.unresolved_frames(), 1);
    }

    #[test]
    fn test_kernel_pseudo_dso_is_not_rebracketed() {
        let mut resolver = StackResolver::new(None, None);
        let sample = Sample {
            timestamp: 1.0,
            frames: vec![frame(0xffff_ffff_8100_0000, None, Some("[kernel.kallsyms]"))],
        };

        assert_eq!(resolver.resolve_stack(&sample), vec!["[kernel.kallsyms]"]);
    }

    #[test]
    fn test_frame_with_nothing_becomes_sentinel() {
        let mut resolver = StackResolver::new(None, None);
        let sample = Sample {
            timestamp: 1.0,
            frames: vec![frame(0xdead_beef, None, None)],
        };

        assert_eq!(resolver.resolve_stack(&sample), vec![UNKNOWN_FRAME]);
        assert_eq!(resolver.unresolved_frames(), 1);
    }

    #[test]
    fn test_unresolvable_frame_never_drops_the_sample() {
        let mut resolver = StackResolver::new(None, None);
        let sample = Sample {
            timestamp: 1.0,
            frames: vec![
                frame(0xdead_beef, None, None),
                frame(0x2000, Some("helper"), None),
                frame(0x1000, Some("main"), None),
            ],
        };

        let stack = resolver.resolve_stack(&sample);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack, vec!["main", "helper", UNKNOWN_FRAME]);
    }

    #[test]
    fn test_dso_label_variants() {
        assert_eq!(dso_label("/usr/lib/libm.so.6"), "[libm.so.6]");
        assert_eq!(dso_label("[vdso]"), "[vdso]");
        assert_eq!(dso_label("app"), "[app]");
    }
}
