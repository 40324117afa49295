//! Parser for `perf script` text output
//!
//! Normalizes the raw sample dump into `Sample` values, one per stack
//! snapshot. The format is line oriented:
//!
//! ```text
//! comm pid[/tid] [cpu] timestamp: period event:
//!         401234 main+0x54 (/usr/bin/myapp)
//!         7f1234567890 __libc_start_main+0x80 (/lib/libc.so.6)
//! <blank line>
//! ```
//!
//! A non-indented line starts a sample, indented lines are its frames
//! innermost first, and a blank line (or the next header) finalizes it.
//! Malformed lines are counted and skipped, never fatal: one garbled
//! sample must not cost the rest of the profile.

use log::debug;

/// One stack frame as printed by `perf script`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Instruction pointer (runtime address)
    pub addr: u64,
    /// Symbol name when perf resolved one, with its `+0x` instruction
    /// offset already stripped. `None` for `[unknown]` or raw-hex
    /// placeholders, which route through address-based resolution.
    pub symbol: Option<String>,
    /// Backing DSO path, when printed
    pub dso: Option<String>,
}

/// One point-in-time stack snapshot
///
/// Frames are ordered innermost (leaf) to outermost (root), exactly as
/// perf prints them. Immutable once finalized by the parser.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Capture time in seconds, as printed in the sample header
    pub timestamp: f64,
    pub frames: Vec<RawFrame>,
}

/// Streaming parser: feed lines in, get finalized samples out
#[derive(Debug, Default)]
pub struct ScriptParser {
    current: Option<Sample>,
    skipped_lines: u64,
}

impl ScriptParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line of `perf script` output
    ///
    /// Returns a sample when this line completed one (a blank line or a
    /// new header closes the sample under construction).
    pub fn push_line(&mut self, line: &str) -> Option<Sample> {
        // Blank lines and comments finalize the sample in progress
        if line.trim().is_empty() || line.starts_with('#') {
            return self.take_current();
        }

        // Indented lines are stack frames of the current sample
        if line.starts_with('\t') || line.starts_with(' ') {
            match (parse_frame_line(line), &mut self.current) {
                (Some(frame), Some(sample)) => sample.frames.push(frame),
                _ => self.skip(line),
            }
            return None;
        }

        // Anything else should be a sample header
        let finished = self.take_current();
        match parse_header_line(line) {
            Some(timestamp) => {
                self.current = Some(Sample { timestamp, frames: Vec::new() });
            }
            None => self.skip(line),
        }
        finished
    }

    /// Finalize the trailing sample once input is exhausted
    pub fn finish(&mut self) -> Option<Sample> {
        self.take_current()
    }

    /// Lines that could not be interpreted and were dropped
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    fn take_current(&mut self) -> Option<Sample> {
        // Headerless or frameless fragments are dropped silently
        self.current.take().filter(|s| !s.frames.is_empty())
    }

    fn skip(&mut self, line: &str) {
        self.skipped_lines += 1;
        debug!("skipping unparseable perf script line: {line:?}");
    }
}

/// Parse a sample header, returning its timestamp in seconds
///
/// Validated right to left so a comm containing spaces cannot throw the
/// field positions off: the token ending in `:` before the event info is
/// the timestamp, optionally preceded by a `[cpu]` token, preceded by a
/// `pid` or `pid/tid` token.
fn parse_header_line(line: &str) -> Option<f64> {
    let colon = line.find(':')?;
    let before_colon = &line[..colon];

    let tokens: Vec<&str> = before_colon.split_whitespace().collect();
    if tokens.len() < 2 {
        return None;
    }

    let timestamp: f64 = {
        let ts = tokens[tokens.len() - 1];
        if !ts.contains('.') {
            return None;
        }
        ts.parse().ok()?
    };

    // Walk back over the optional [cpu] token
    let mut idx = tokens.len() - 1;
    if idx > 0 && tokens[idx - 1].starts_with('[') && tokens[idx - 1].ends_with(']') {
        idx -= 1;
    }
    if idx == 0 {
        return None;
    }

    parse_pid_tid(tokens[idx - 1])?;

    Some(timestamp)
}

/// Parse `pid` or `pid/tid`
fn parse_pid_tid(s: &str) -> Option<(u32, u32)> {
    match s.split_once('/') {
        Some((pid, tid)) => Some((pid.parse().ok()?, tid.parse().ok()?)),
        // tid defaults to pid when perf prints a single number
        None => {
            let pid = s.parse().ok()?;
            Some((pid, pid))
        }
    }
}

/// Parse a stack frame line: `\t ip symbol+offset (dso)`
fn parse_frame_line(line: &str) -> Option<RawFrame> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // DSO sits in parentheses at the end of the line; symbols may
    // themselves contain parentheses, hence rfind
    let (body, dso) = match (line.rfind('('), line.rfind(')')) {
        (Some(open), Some(close)) if open < close => {
            let dso = &line[open + 1..close];
            let dso = if dso == "[unknown]" { None } else { Some(dso.to_string()) };
            (line[..open].trim(), dso)
        }
        _ => (line, None),
    };

    let (ip, symbol_part) = match body.split_once(char::is_whitespace) {
        Some((ip, rest)) => (ip, Some(rest.trim())),
        None => (body, None),
    };

    let addr = u64::from_str_radix(ip.trim_start_matches("0x"), 16).ok()?;

    let symbol = symbol_part.and_then(|text| {
        if text == "[unknown]" || text.starts_with("0x") {
            return None;
        }
        Some(strip_instruction_offset(text).to_string())
    });

    Some(RawFrame { addr, symbol, dso })
}

/// Drop the trailing `+0x<hex>` instruction offset from a perf symbol
///
/// The offset differs per sample, so keeping it would shatter one
/// function into hundreds of distinct frames. A `+` that is part of the
/// name itself (`operator+`) is preserved.
fn strip_instruction_offset(symbol: &str) -> &str {
    if let Some(plus) = symbol.rfind('+') {
        let offset = &symbol[plus + 1..];
        if let Some(hex) = offset.strip_prefix("0x") {
            if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return &symbol[..plus];
            }
        }
    }
    symbol
}
